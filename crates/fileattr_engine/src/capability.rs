/* 📖 # Why a static capability table?

What a platform can report or change is a property of the platform, not of the file:
Linux has no hidden bit, Windows has no executable bit, only the BSDs carry an
immutable flag. The normalizer and mutator consult this table instead of probing,
so asking for an unsupported attribute is a silent no-op everywhere.

The only runtime input is the one-time symbolic link probe (Windows before Vista,
or a filesystem without reparse support), applied with `with_symlinks`.
*/

use std::sync::OnceLock;

use bitflags::bitflags;
use fileattr_base::pal::{Pal, Platform, RealPal};
use serde::{Deserialize, Serialize};

bitflags! {
    /// Canonical file attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Attributes: u8 {
        const READ_ONLY = 1 << 0;
        const EXECUTABLE = 1 << 1;
        const HIDDEN = 1 << 2;
        const ARCHIVE = 1 << 3;
        const SYMLINK = 1 << 4;
    }
}

/// How a platform expresses attribute changes natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationModel {
    /// chmod on the permission bits.
    PermissionMask,
    /// chmod plus chflags for immutable/hidden/archive.
    PermissionMaskWithFlags,
    /// One Windows attribute word.
    AttributeWord,
}

/// What one platform can report and change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilitySet {
    pub platform: Platform,
    pub reportable: Attributes,
    pub settable: Attributes,
    /// Whether symlink targets can be read.
    pub link_target: bool,
    /// Whether an immutable flag exists and implies read-only.
    pub immutable_flag: bool,
    pub mutation_model: MutationModel,
}

impl CapabilitySet {
    pub fn can_report(&self, attribute: Attributes) -> bool {
        self.reportable.contains(attribute)
    }

    pub fn can_set(&self, attribute: Attributes) -> bool {
        self.settable.contains(attribute)
    }

    /// Applies the result of the symbolic link feature probe.
    pub fn with_symlinks(mut self, supported: bool) -> Self {
        self.reportable.set(Attributes::SYMLINK, supported);
        self.link_target = supported;
        self
    }
}

/// The capability table.
pub fn capabilities_for(platform: Platform) -> CapabilitySet {
    use Attributes as A;
    let posix = A::READ_ONLY | A::EXECUTABLE;
    let (settable, immutable_flag, mutation_model) = match platform {
        Platform::Linux | Platform::OtherUnix => (posix, false, MutationModel::PermissionMask),
        Platform::MacOs => (
            posix | A::HIDDEN,
            true,
            MutationModel::PermissionMaskWithFlags,
        ),
        Platform::FreeBsd => (
            posix | A::HIDDEN | A::ARCHIVE,
            true,
            MutationModel::PermissionMaskWithFlags,
        ),
        Platform::Windows => (
            A::READ_ONLY | A::HIDDEN | A::ARCHIVE,
            false,
            MutationModel::AttributeWord,
        ),
    };
    CapabilitySet {
        platform,
        reportable: settable | A::SYMLINK,
        settable,
        link_target: true,
        immutable_flag,
        mutation_model,
    }
}

static HOST_CAPABILITIES: OnceLock<CapabilitySet> = OnceLock::new();

/// Capabilities of the host, probed once per process.
pub fn host_capabilities() -> &'static CapabilitySet {
    HOST_CAPABILITIES.get_or_init(|| {
        let pal = RealPal::new();
        capabilities_for(pal.platform()).with_symlinks(pal.probe_symlink_support())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn test_linux_capabilities() {
        let caps = capabilities_for(Platform::Linux);
        assert!(caps.can_report(Attributes::SYMLINK));
        assert!(caps.can_set(Attributes::EXECUTABLE));
        assert!(!caps.can_report(Attributes::HIDDEN));
        assert!(!caps.immutable_flag);

        let other = capabilities_for(Platform::OtherUnix);
        assert_eq!(other.reportable, caps.reportable);
        assert_eq!(other.settable, caps.settable);
    }

    #[test]
    fn test_windows_has_no_executable_bit() {
        let caps = capabilities_for(Platform::Windows);
        assert!(!caps.can_report(Attributes::EXECUTABLE));
        assert!(!caps.can_set(Attributes::EXECUTABLE));
        assert!(caps.can_set(Attributes::ARCHIVE));
        assert_eq!(caps.mutation_model, MutationModel::AttributeWord);
    }

    #[test]
    fn test_only_freebsd_sets_archive_among_unixes() {
        assert!(!capabilities_for(Platform::MacOs).can_set(Attributes::ARCHIVE));
        assert!(capabilities_for(Platform::FreeBsd).can_set(Attributes::ARCHIVE));
        assert!(capabilities_for(Platform::MacOs).immutable_flag);
    }

    #[test]
    fn test_symlink_probe_removes_symlink_reporting() {
        let caps = capabilities_for(Platform::Windows).with_symlinks(false);
        assert!(!caps.can_report(Attributes::SYMLINK));
        assert!(!caps.link_target);
        assert!(caps.can_report(Attributes::HIDDEN));
    }

    #[test]
    fn test_symlink_is_never_settable() {
        for platform in [
            Platform::Linux,
            Platform::MacOs,
            Platform::FreeBsd,
            Platform::Windows,
            Platform::OtherUnix,
        ] {
            assert!(!capabilities_for(platform).can_set(Attributes::SYMLINK));
        }
    }

    #[test]
    fn test_host_capabilities_are_stable() {
        let first = host_capabilities();
        let second = host_capabilities();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.platform, Platform::current());
    }

    #[test]
    fn test_macos_table() {
        expect![[r#"
            CapabilitySet {
                platform: MacOs,
                reportable: Attributes(
                    READ_ONLY | EXECUTABLE | HIDDEN | SYMLINK,
                ),
                settable: Attributes(
                    READ_ONLY | EXECUTABLE | HIDDEN,
                ),
                link_target: true,
                immutable_flag: true,
                mutation_model: PermissionMaskWithFlags,
            }
        "#]]
        .assert_debug_eq(&capabilities_for(Platform::MacOs));
    }
}
