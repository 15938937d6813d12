/* 📖 # Why does the order of native calls matter?

On macOS and FreeBSD a file carrying UF_IMMUTABLE rejects chmod (and utimes) with
EPERM, even for its owner. Sealing a file therefore means chmod first and chflags
second; unsealing means chflags first and chmod second. A request that changes the
mode of a file that stays sealed (toggling the executable bit on a read-only file)
needs three calls: unseal, chmod, reseal.

The mutator works in two steps. `compute_delta` is a pure function from the current
raw record and the desired attributes to an ordered list of native operations, so
the ordering rules are testable without a filesystem. `apply_delta` issues those
operations and stops at the first failure.

# What happens when a later call fails?

Nothing is rolled back. The error lists the operations that already succeeded so
the caller can see the file's actual state. A rollback could itself fail halfway
and would hide the original error.
*/

use std::fmt;
use std::path::Path;

use fileattr_base::pal::{LinkMode, Pal, PosixStat, RawStat, WindowsFindData, bsd_flags, mode, win};
use fileattr_base::{FileattrError, FileattrResult};
use tracing::{debug, instrument, warn};

use crate::capability::{Attributes, CapabilitySet};

/// One native mutation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeOp {
    /// chmod with the complete permission bits.
    SetMode(u32),
    /// chflags with the complete flag word.
    SetFlags(u32),
    /// SetFileAttributesW with the complete attribute word.
    SetWindowsAttributes(u32),
}

impl fmt::Display for NativeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeOp::SetMode(mode) => write!(f, "chmod {:04o}", mode),
            NativeOp::SetFlags(flags) => write!(f, "chflags {:#x}", flags),
            NativeOp::SetWindowsAttributes(attributes) => {
                write!(f, "SetFileAttributes {:#x}", attributes)
            }
        }
    }
}

/// Ordered native operations that bring a file to the desired attributes.
///
/// Empty when the file already matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeDelta {
    ops: Vec<NativeOp>,
}

impl AttributeDelta {
    pub fn ops(&self) -> &[NativeOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Partial attribute update: `None` leaves an attribute as it is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeChange {
    pub read_only: Option<bool>,
    pub executable: Option<bool>,
    pub hidden: Option<bool>,
    pub archive: Option<bool>,
}

impl AttributeChange {
    /// The complete desired attribute set, starting from `current`.
    pub fn merge_into(&self, current: Attributes) -> Attributes {
        let mut desired = current;
        for (value, attribute) in [
            (self.read_only, Attributes::READ_ONLY),
            (self.executable, Attributes::EXECUTABLE),
            (self.hidden, Attributes::HIDDEN),
            (self.archive, Attributes::ARCHIVE),
        ] {
            if let Some(enabled) = value {
                desired.set(attribute, enabled);
            }
        }
        desired
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Computes the native operations turning `current` into `desired`.
///
/// Attributes the platform cannot set are ignored, as are bits outside the
/// attribute model. `umask` limits the group and other bits granted when write
/// or execute permission is turned on.
pub fn compute_delta(
    current: &RawStat,
    desired: Attributes,
    caps: &CapabilitySet,
    umask: u32,
) -> AttributeDelta {
    let ops = match current {
        RawStat::Posix(stat) => posix_ops(stat, desired, caps, umask),
        RawStat::Windows(data) => windows_ops(data, desired, caps),
    };
    AttributeDelta { ops }
}

fn posix_ops(stat: &PosixStat, desired: Attributes, caps: &CapabilitySet, umask: u32) -> Vec<NativeOp> {
    let current_mode = stat.mode & mode::PERMISSION_BITS;
    let has_flags = caps.immutable_flag && stat.flags.is_some();
    let current_flags = stat.flags.unwrap_or(0);
    let sealed = has_flags && current_flags & bsd_flags::UF_IMMUTABLE != 0;

    let mut new_mode = current_mode;
    let mut new_flags = current_flags;

    let read_only = current_mode & mode::S_IWUSR == 0 || sealed;
    let want_read_only = desired.contains(Attributes::READ_ONLY);
    if caps.can_set(Attributes::READ_ONLY) && want_read_only != read_only {
        if want_read_only {
            new_mode &= !mode::ALL_WRITE;
            if has_flags {
                new_flags |= bsd_flags::UF_IMMUTABLE;
            }
        } else {
            new_mode |= mode::S_IWUSR | ((mode::S_IWGRP | mode::S_IWOTH) & !umask);
            new_flags &= !bsd_flags::UF_IMMUTABLE;
        }
    } else if caps.can_set(Attributes::READ_ONLY) && want_read_only && has_flags && !sealed {
        // read-only by mode alone; the flag is what makes it stick
        new_flags |= bsd_flags::UF_IMMUTABLE;
    }

    let executable = current_mode & mode::S_IXUSR != 0;
    let want_executable = desired.contains(Attributes::EXECUTABLE);
    if caps.can_set(Attributes::EXECUTABLE) && want_executable != executable {
        if want_executable {
            new_mode |= mode::S_IXUSR | ((mode::S_IXGRP | mode::S_IXOTH) & !umask);
        } else {
            new_mode &= !mode::ALL_EXECUTE;
        }
    }

    if stat.flags.is_some() {
        for (attribute, bit) in [
            (Attributes::HIDDEN, bsd_flags::UF_HIDDEN),
            (Attributes::ARCHIVE, bsd_flags::UF_ARCHIVE),
        ] {
            if caps.can_set(attribute) {
                if desired.contains(attribute) {
                    new_flags |= bit;
                } else {
                    new_flags &= !bit;
                }
            }
        }
    }

    let mode_changes = new_mode != current_mode;
    let flags_change = new_flags != current_flags;
    let sealed_after = has_flags && new_flags & bsd_flags::UF_IMMUTABLE != 0;

    let mut ops = Vec::with_capacity(3);
    if mode_changes && sealed && sealed_after {
        ops.push(NativeOp::SetFlags(new_flags & !bsd_flags::UF_IMMUTABLE));
        ops.push(NativeOp::SetMode(new_mode));
        ops.push(NativeOp::SetFlags(new_flags));
    } else if sealed && !sealed_after {
        // unsealing: chmod is rejected until the flag is gone
        ops.push(NativeOp::SetFlags(new_flags));
        if mode_changes {
            ops.push(NativeOp::SetMode(new_mode));
        }
    } else {
        if mode_changes {
            ops.push(NativeOp::SetMode(new_mode));
        }
        if flags_change {
            ops.push(NativeOp::SetFlags(new_flags));
        }
    }
    ops
}

fn windows_ops(data: &WindowsFindData, desired: Attributes, caps: &CapabilitySet) -> Vec<NativeOp> {
    let current = data.attributes & win::SETTABLE_ATTRIBUTES & !win::FILE_ATTRIBUTE_NORMAL;
    let mut word = current;
    for (attribute, bit) in [
        (Attributes::READ_ONLY, win::FILE_ATTRIBUTE_READONLY),
        (Attributes::HIDDEN, win::FILE_ATTRIBUTE_HIDDEN),
        (Attributes::ARCHIVE, win::FILE_ATTRIBUTE_ARCHIVE),
    ] {
        if caps.can_set(attribute) {
            if desired.contains(attribute) {
                word |= bit;
            } else {
                word &= !bit;
            }
        }
    }
    if word == current {
        return Vec::new();
    }
    if word == 0 {
        word = win::FILE_ATTRIBUTE_NORMAL;
    }
    vec![NativeOp::SetWindowsAttributes(word)]
}

/// Issues the operations of `delta` in order.
///
/// Stops at the first failure; the Mutation error lists the operations that had
/// already been applied. Those are not undone.
#[instrument(skip(pal, delta), fields(path = %path.display(), ops = delta.len()))]
pub fn apply_delta(pal: &dyn Pal, path: &Path, delta: &AttributeDelta) -> FileattrResult<()> {
    let mut applied: Vec<String> = Vec::new();
    for op in delta.ops() {
        let result = match *op {
            NativeOp::SetMode(mode) => pal.set_mode(path, mode),
            NativeOp::SetFlags(flags) => pal.set_flags(path, flags),
            NativeOp::SetWindowsAttributes(attributes) => pal.set_windows_attributes(path, attributes),
        };
        match result {
            Ok(()) => {
                debug!(%op, "applied");
                applied.push(op.to_string());
            }
            Err(e) => {
                if !applied.is_empty() {
                    warn!(%op, error = %e, ?applied, "attribute update left partially applied");
                }
                return Err(Box::new(FileattrError::mutation(
                    path,
                    op.to_string(),
                    applied,
                    e,
                )));
            }
        }
    }
    Ok(())
}

/// Reads the current state of `path`, then applies the operations needed to reach `desired`.
///
/// Returns the delta that was applied, empty if the file already matched.
pub fn apply(
    pal: &dyn Pal,
    caps: &CapabilitySet,
    umask: u32,
    path: &Path,
    desired: Attributes,
) -> FileattrResult<AttributeDelta> {
    let current = pal
        .stat(path, LinkMode::Follow)
        .map_err(|e| Box::new(FileattrError::stat(path, e)))?;
    let delta = compute_delta(&current, desired, caps, umask);
    if delta.is_empty() {
        debug!(path = %path.display(), "attributes already match");
        return Ok(delta);
    }
    apply_delta(pal, path, &delta)?;
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::capabilities_for;
    use fileattr_base::Platform;

    const UMASK: u32 = 0o022;

    fn posix(perm: u32, flags: Option<u32>) -> RawStat {
        RawStat::Posix(PosixStat {
            mode: mode::S_IFREG | perm,
            flags,
            size: 0,
            mtime_secs: 0,
            mtime_nanos: 0,
        })
    }

    fn windows(attributes: u32) -> RawStat {
        RawStat::Windows(WindowsFindData {
            attributes,
            reparse_tag: 0,
            size: 0,
            last_write_time: 0,
        })
    }

    fn delta(raw: RawStat, desired: Attributes, platform: Platform) -> Vec<NativeOp> {
        compute_delta(&raw, desired, &capabilities_for(platform), UMASK)
            .ops()
            .to_vec()
    }

    #[test]
    fn test_enable_read_only_clears_all_write_bits() {
        let ops = delta(posix(0o666, None), Attributes::READ_ONLY, Platform::Linux);
        assert_eq!(ops, vec![NativeOp::SetMode(0o444)]);
    }

    #[test]
    fn test_disable_read_only_respects_umask() {
        let ops = delta(posix(0o444, None), Attributes::empty(), Platform::Linux);
        assert_eq!(ops, vec![NativeOp::SetMode(0o644)]);

        let caps = capabilities_for(Platform::Linux);
        let ops = compute_delta(&posix(0o444, None), Attributes::empty(), &caps, 0o002);
        assert_eq!(ops.ops(), [NativeOp::SetMode(0o664)]);
    }

    #[test]
    fn test_executable_on_and_off() {
        let ops = delta(posix(0o644, None), Attributes::EXECUTABLE, Platform::Linux);
        assert_eq!(ops, vec![NativeOp::SetMode(0o755)]);

        let ops = delta(posix(0o751, None), Attributes::empty(), Platform::Linux);
        assert_eq!(ops, vec![NativeOp::SetMode(0o640)]);
    }

    #[test]
    fn test_bits_outside_model_are_preserved() {
        // setuid, sticky and group write survive
        let ops = delta(posix(0o5474, None), Attributes::EXECUTABLE, Platform::Linux);
        assert_eq!(ops, vec![NativeOp::SetMode(0o5775)]);
    }

    #[test]
    fn test_matching_state_produces_empty_delta() {
        assert!(delta(posix(0o644, None), Attributes::empty(), Platform::Linux).is_empty());
        assert!(delta(posix(0o555, None), Attributes::READ_ONLY | Attributes::EXECUTABLE, Platform::Linux).is_empty());
    }

    #[test]
    fn test_unsupported_attributes_are_ignored() {
        let ops = delta(
            posix(0o644, None),
            Attributes::HIDDEN | Attributes::ARCHIVE | Attributes::SYMLINK,
            Platform::Linux,
        );
        assert!(ops.is_empty());

        let ops = delta(windows(win::FILE_ATTRIBUTE_ARCHIVE), Attributes::ARCHIVE | Attributes::EXECUTABLE, Platform::Windows);
        assert!(ops.is_empty());
    }

    #[test]
    fn test_sealing_chmods_before_chflags() {
        let ops = delta(posix(0o644, Some(0)), Attributes::READ_ONLY, Platform::MacOs);
        assert_eq!(
            ops,
            vec![
                NativeOp::SetMode(0o444),
                NativeOp::SetFlags(bsd_flags::UF_IMMUTABLE),
            ]
        );
    }

    #[test]
    fn test_mode_read_only_file_is_sealed_on_flag_platforms() {
        let ops = delta(posix(0o444, Some(0)), Attributes::READ_ONLY, Platform::MacOs);
        assert_eq!(ops, vec![NativeOp::SetFlags(bsd_flags::UF_IMMUTABLE)]);

        let ops = delta(
            posix(0o444, Some(bsd_flags::UF_HIDDEN)),
            Attributes::READ_ONLY | Attributes::EXECUTABLE | Attributes::HIDDEN,
            Platform::FreeBsd,
        );
        assert_eq!(
            ops,
            vec![
                NativeOp::SetMode(0o555),
                NativeOp::SetFlags(bsd_flags::UF_HIDDEN | bsd_flags::UF_IMMUTABLE),
            ]
        );

        // no flag word on Linux, the mode alone is enough
        assert!(delta(posix(0o444, None), Attributes::READ_ONLY, Platform::Linux).is_empty());
    }

    #[test]
    fn test_unsealing_clears_flag_before_chmod() {
        let ops = delta(
            posix(0o444, Some(bsd_flags::UF_IMMUTABLE | bsd_flags::UF_HIDDEN)),
            Attributes::HIDDEN,
            Platform::MacOs,
        );
        assert_eq!(
            ops,
            vec![
                NativeOp::SetFlags(bsd_flags::UF_HIDDEN),
                NativeOp::SetMode(0o644),
            ]
        );
    }

    #[test]
    fn test_unsealing_writable_mode_only_needs_chflags() {
        let ops = delta(posix(0o644, Some(bsd_flags::UF_IMMUTABLE)), Attributes::empty(), Platform::MacOs);
        assert_eq!(ops, vec![NativeOp::SetFlags(0)]);
    }

    #[test]
    fn test_mode_change_on_sealed_file_reseals() {
        let ops = delta(
            posix(0o444, Some(bsd_flags::UF_IMMUTABLE)),
            Attributes::READ_ONLY | Attributes::EXECUTABLE,
            Platform::MacOs,
        );
        assert_eq!(
            ops,
            vec![
                NativeOp::SetFlags(0),
                NativeOp::SetMode(0o555),
                NativeOp::SetFlags(bsd_flags::UF_IMMUTABLE),
            ]
        );
    }

    #[test]
    fn test_hidden_flag_mirrors_desired_state() {
        let ops = delta(posix(0o644, Some(0)), Attributes::HIDDEN, Platform::MacOs);
        assert_eq!(ops, vec![NativeOp::SetFlags(bsd_flags::UF_HIDDEN)]);

        let ops = delta(posix(0o644, Some(bsd_flags::UF_HIDDEN | bsd_flags::UF_ARCHIVE)), Attributes::ARCHIVE, Platform::FreeBsd);
        assert_eq!(ops, vec![NativeOp::SetFlags(bsd_flags::UF_ARCHIVE)]);
    }

    #[test]
    fn test_macos_leaves_archive_flag_alone() {
        let ops = delta(posix(0o644, Some(bsd_flags::UF_ARCHIVE)), Attributes::empty(), Platform::MacOs);
        assert!(ops.is_empty());
    }

    #[test]
    fn test_windows_single_attribute_word() {
        let ops = delta(
            windows(win::FILE_ATTRIBUTE_ARCHIVE | win::FILE_ATTRIBUTE_SYSTEM),
            Attributes::READ_ONLY | Attributes::HIDDEN | Attributes::ARCHIVE,
            Platform::Windows,
        );
        assert_eq!(
            ops,
            vec![NativeOp::SetWindowsAttributes(
                win::FILE_ATTRIBUTE_READONLY
                    | win::FILE_ATTRIBUTE_HIDDEN
                    | win::FILE_ATTRIBUTE_ARCHIVE
                    | win::FILE_ATTRIBUTE_SYSTEM
            )]
        );
    }

    #[test]
    fn test_windows_empty_word_becomes_normal() {
        let ops = delta(windows(win::FILE_ATTRIBUTE_READONLY), Attributes::empty(), Platform::Windows);
        assert_eq!(ops, vec![NativeOp::SetWindowsAttributes(win::FILE_ATTRIBUTE_NORMAL)]);
    }

    #[test]
    fn test_windows_normal_is_not_combined() {
        let ops = delta(windows(win::FILE_ATTRIBUTE_NORMAL), Attributes::READ_ONLY, Platform::Windows);
        assert_eq!(ops, vec![NativeOp::SetWindowsAttributes(win::FILE_ATTRIBUTE_READONLY)]);
    }

    #[test]
    fn test_windows_directory_bit_is_not_written_back() {
        let ops = delta(windows(win::FILE_ATTRIBUTE_DIRECTORY), Attributes::HIDDEN, Platform::Windows);
        assert_eq!(ops, vec![NativeOp::SetWindowsAttributes(win::FILE_ATTRIBUTE_HIDDEN)]);
    }

    #[test]
    fn test_attribute_change_merge() {
        let change = AttributeChange {
            read_only: Some(false),
            hidden: Some(true),
            ..Default::default()
        };
        assert_eq!(
            change.merge_into(Attributes::READ_ONLY | Attributes::EXECUTABLE),
            Attributes::EXECUTABLE | Attributes::HIDDEN
        );
        assert!(AttributeChange::default().is_empty());
        assert!(!change.is_empty());
    }

    #[test]
    fn test_native_op_display() {
        assert_eq!(NativeOp::SetMode(0o644).to_string(), "chmod 0644");
        assert_eq!(NativeOp::SetFlags(0x8002).to_string(), "chflags 0x8002");
        assert_eq!(
            NativeOp::SetWindowsAttributes(0x21).to_string(),
            "SetFileAttributes 0x21"
        );
    }
}
