use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::FileattrResult;

use super::raw::{
    LinkMode, Platform, PosixStat, RawLinkTarget, RawStat, WindowsFindData, bsd_flags, mode, win,
};
use super::traits::{Pal, unsupported};

/* 📖 # What does MockPal simulate?

MockPal is an in-memory filesystem that answers with the raw records of a chosen
platform: POSIX mode words (Linux), mode words plus BSD flags (macOS, FreeBSD) or
Windows find-data records. It enforces the platform rules the mutator has to respect,
most importantly that an immutable file rejects chmod and utimes until the flag is
cleared. Every native call is appended to a log so tests can assert on the exact
sequence and count of calls.
*/

/// Maximum symlink hops before a lookup fails, as `ELOOP` would.
const MAX_LINK_HOPS: usize = 40;

/// A native call issued against a [`MockPal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCall {
    Stat { path: PathBuf, link_mode: LinkMode },
    ReadLink { path: PathBuf },
    SetMode { path: PathBuf, mode: u32 },
    SetFlags { path: PathBuf, flags: u32 },
    SetWindowsAttributes { path: PathBuf, attributes: u32 },
    SetModified { path: PathBuf, millis: i64 },
}

impl NativeCall {
    /// Whether the call changes state on disk.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, NativeCall::Stat { .. } | NativeCall::ReadLink { .. })
    }

    fn op(&self) -> MockOp {
        match self {
            NativeCall::Stat { .. } => MockOp::Stat,
            NativeCall::ReadLink { .. } => MockOp::ReadLink,
            NativeCall::SetMode { .. } => MockOp::SetMode,
            NativeCall::SetFlags { .. } => MockOp::SetFlags,
            NativeCall::SetWindowsAttributes { .. } => MockOp::SetWindowsAttributes,
            NativeCall::SetModified { .. } => MockOp::SetModified,
        }
    }

    fn path(&self) -> &Path {
        match self {
            NativeCall::Stat { path, .. }
            | NativeCall::ReadLink { path }
            | NativeCall::SetMode { path, .. }
            | NativeCall::SetFlags { path, .. }
            | NativeCall::SetWindowsAttributes { path, .. }
            | NativeCall::SetModified { path, .. } => path,
        }
    }
}

/// Native operation kinds, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Stat,
    ReadLink,
    SetMode,
    SetFlags,
    SetWindowsAttributes,
    SetModified,
}

#[derive(Debug, Clone)]
enum EntryKind {
    File,
    Directory,
    Symlink {
        target: String,
        print_name: Option<String>,
        substitute_name: Option<String>,
    },
}

#[derive(Debug, Clone)]
struct MockEntry {
    kind: EntryKind,
    /// Permission bits only.
    mode: u32,
    flags: u32,
    attributes: u32,
    size: i64,
    modified_millis: i64,
}

#[derive(Debug, Default)]
struct MockState {
    entries: HashMap<PathBuf, MockEntry>,
    calls: Vec<NativeCall>,
    failures: HashMap<(PathBuf, MockOp), io::ErrorKind>,
}

/// In-memory PAL implementation for testing.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use fileattr_base::{LinkMode, MockPal, Pal};
///
/// let mock = MockPal::macos();
/// mock.add_file("/tmp/a.txt", 12);
/// let raw = mock.stat(Path::new("/tmp/a.txt"), LinkMode::Follow).unwrap();
/// assert!(!raw.is_symlink());
/// assert_eq!(mock.calls().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockPal {
    platform: Platform,
    umask: u32,
    symlinks: bool,
    state: Arc<Mutex<MockState>>,
}

impl MockPal {
    /// Create an empty MockPal behaving like `platform`.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            umask: if platform.is_windows_family() { 0 } else { 0o022 },
            symlinks: true,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn linux() -> Self {
        Self::new(Platform::Linux)
    }

    pub fn macos() -> Self {
        Self::new(Platform::MacOs)
    }

    pub fn freebsd() -> Self {
        Self::new(Platform::FreeBsd)
    }

    pub fn windows() -> Self {
        Self::new(Platform::Windows)
    }

    /// Sets the umask reported by [`Pal::umask`].
    pub fn with_umask(mut self, umask: u32) -> Self {
        self.umask = umask & 0o777;
        self
    }

    /// Makes the feature probe report that symbolic links are unavailable.
    pub fn without_symlink_support(mut self) -> Self {
        self.symlinks = false;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, path: &Path, kind: EntryKind, mode: u32, attributes: u32, size: i64) {
        let entry = MockEntry {
            kind,
            mode,
            flags: 0,
            attributes,
            size,
            modified_millis: 0,
        };
        self.state().entries.insert(path.to_path_buf(), entry);
    }

    /// Adds a regular file with mode 0644 (archive bit set on Windows).
    pub fn add_file(&self, path: impl AsRef<Path>, size: i64) {
        let attributes = if self.platform.is_windows_family() {
            win::FILE_ATTRIBUTE_ARCHIVE
        } else {
            0
        };
        self.insert(path.as_ref(), EntryKind::File, 0o644, attributes, size);
    }

    /// Adds a directory with mode 0755.
    pub fn add_directory(&self, path: impl AsRef<Path>) {
        self.insert(path.as_ref(), EntryKind::Directory, 0o755, 0, 0);
    }

    /// Adds a symbolic link. On Windows both reparse names are filled in.
    pub fn add_symlink(&self, path: impl AsRef<Path>, target: &str) {
        let (print_name, substitute_name) = if self.platform.is_windows_family() {
            (Some(target.to_string()), Some(format!(r"\??\{}", target)))
        } else {
            (None, None)
        };
        self.add_reparse_link(path, target, print_name.as_deref(), substitute_name.as_deref());
    }

    /// Adds a link resolving to `target` whose reparse data carries the given names.
    pub fn add_reparse_link(
        &self,
        path: impl AsRef<Path>,
        target: &str,
        print_name: Option<&str>,
        substitute_name: Option<&str>,
    ) {
        let kind = EntryKind::Symlink {
            target: target.to_string(),
            print_name: print_name.map(str::to_string),
            substitute_name: substitute_name.map(str::to_string),
        };
        self.insert(path.as_ref(), kind, 0o777, 0, 0);
    }

    /// Removes an entry, e.g. to break a link.
    pub fn remove(&self, path: impl AsRef<Path>) {
        self.state().entries.remove(path.as_ref());
    }

    pub fn set_entry_mode(&self, path: impl AsRef<Path>, mode: u32) {
        self.with_entry(path.as_ref(), |entry| entry.mode = mode & mode::PERMISSION_BITS);
    }

    pub fn set_entry_flags(&self, path: impl AsRef<Path>, flags: u32) {
        self.with_entry(path.as_ref(), |entry| entry.flags = flags);
    }

    pub fn set_entry_attributes(&self, path: impl AsRef<Path>, attributes: u32) {
        self.with_entry(path.as_ref(), |entry| entry.attributes = attributes);
    }

    pub fn set_entry_modified(&self, path: impl AsRef<Path>, millis: i64) {
        self.with_entry(path.as_ref(), |entry| entry.modified_millis = millis);
    }

    pub fn entry_mode(&self, path: impl AsRef<Path>) -> Option<u32> {
        self.state().entries.get(path.as_ref()).map(|e| e.mode)
    }

    pub fn entry_flags(&self, path: impl AsRef<Path>) -> Option<u32> {
        self.state().entries.get(path.as_ref()).map(|e| e.flags)
    }

    pub fn entry_attributes(&self, path: impl AsRef<Path>) -> Option<u32> {
        self.state().entries.get(path.as_ref()).map(|e| e.attributes)
    }

    pub fn entry_modified(&self, path: impl AsRef<Path>) -> Option<i64> {
        self.state()
            .entries
            .get(path.as_ref())
            .map(|e| e.modified_millis)
    }

    /// Makes every later `op` on `path` fail with `kind`.
    pub fn fail_on(&self, path: impl AsRef<Path>, op: MockOp, kind: io::ErrorKind) {
        self.state()
            .failures
            .insert((path.as_ref().to_path_buf(), op), kind);
    }

    /// All native calls issued so far, oldest first.
    pub fn calls(&self) -> Vec<NativeCall> {
        self.state().calls.clone()
    }

    /// Only the calls that change state on disk.
    pub fn mutation_calls(&self) -> Vec<NativeCall> {
        self.state()
            .calls
            .iter()
            .filter(|call| call.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    fn with_entry(&self, path: &Path, f: impl FnOnce(&mut MockEntry)) {
        if let Some(entry) = self.state().entries.get_mut(path) {
            f(entry);
        }
    }

    /// Logs the call and returns the injected failure for it, if any.
    fn record(&self, state: &mut MockState, call: NativeCall) -> io::Result<()> {
        let key = (call.path().to_path_buf(), call.op());
        state.calls.push(call);
        match state.failures.get(&key) {
            Some(kind) => Err(io::Error::new(*kind, "injected failure")),
            None => Ok(()),
        }
    }

    fn is_immutable(&self, entry: &MockEntry) -> bool {
        self.platform.has_bsd_flags() && entry.flags & bsd_flags::UF_IMMUTABLE != 0
    }

    fn raw_stat(&self, entry: &MockEntry) -> RawStat {
        if self.platform.is_windows_family() {
            let (kind_bits, reparse_tag) = match entry.kind {
                EntryKind::File => (0, 0),
                EntryKind::Directory => (win::FILE_ATTRIBUTE_DIRECTORY, 0),
                EntryKind::Symlink { .. } => (
                    win::FILE_ATTRIBUTE_REPARSE_POINT,
                    win::IO_REPARSE_TAG_SYMLINK,
                ),
            };
            let size = match entry.kind {
                EntryKind::File => entry.size.max(0) as u64,
                _ => 0,
            };
            let ticks = (entry.modified_millis + win::FILETIME_UNIX_EPOCH_MILLIS) * 10_000;
            RawStat::Windows(WindowsFindData {
                attributes: entry.attributes | kind_bits,
                reparse_tag,
                size,
                last_write_time: ticks.max(0) as u64,
            })
        } else {
            let (type_bits, size) = match &entry.kind {
                EntryKind::File => (mode::S_IFREG, entry.size),
                // block-sized, like most real filesystems report
                EntryKind::Directory => (mode::S_IFDIR, 4096),
                EntryKind::Symlink { target, .. } => (mode::S_IFLNK, target.len() as i64),
            };
            RawStat::Posix(PosixStat {
                mode: type_bits | entry.mode,
                flags: self.platform.has_bsd_flags().then_some(entry.flags),
                size,
                mtime_secs: entry.modified_millis.div_euclid(1000),
                mtime_nanos: (entry.modified_millis.rem_euclid(1000) * 1_000_000) as u32,
            })
        }
    }
}

/// Follows symlinks from `path` to a non-link entry.
fn resolve(state: &MockState, path: &Path) -> io::Result<PathBuf> {
    let mut current = path.to_path_buf();
    for _ in 0..MAX_LINK_HOPS {
        let entry = state
            .entries
            .get(&current)
            .ok_or_else(|| not_found(&current))?;
        match &entry.kind {
            EntryKind::Symlink { target, .. } => {
                let target = Path::new(target);
                current = if target.is_absolute() {
                    target.to_path_buf()
                } else {
                    current
                        .parent()
                        .map(|parent| parent.join(target))
                        .unwrap_or_else(|| target.to_path_buf())
                };
            }
            EntryKind::File | EntryKind::Directory => return Ok(current),
        }
    }
    Err(io::Error::other("too many levels of symbolic links"))
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

fn operation_not_permitted() -> io::Error {
    io::Error::new(io::ErrorKind::PermissionDenied, "operation not permitted")
}

impl Pal for MockPal {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn probe_symlink_support(&self) -> bool {
        self.symlinks
    }

    fn umask(&self) -> FileattrResult<u32> {
        Ok(self.umask)
    }

    fn stat(&self, path: &Path, link_mode: LinkMode) -> io::Result<RawStat> {
        let mut state = self.state();
        self.record(
            &mut state,
            NativeCall::Stat {
                path: path.to_path_buf(),
                link_mode,
            },
        )?;
        let resolved = match link_mode {
            LinkMode::Follow => resolve(&state, path)?,
            LinkMode::NoFollow => path.to_path_buf(),
        };
        let entry = state.entries.get(&resolved).ok_or_else(|| not_found(path))?;
        Ok(self.raw_stat(entry))
    }

    fn read_link(&self, path: &Path) -> io::Result<RawLinkTarget> {
        let mut state = self.state();
        self.record(
            &mut state,
            NativeCall::ReadLink {
                path: path.to_path_buf(),
            },
        )?;
        let entry = state.entries.get(path).ok_or_else(|| not_found(path))?;
        match &entry.kind {
            EntryKind::Symlink {
                target,
                print_name,
                substitute_name,
            } => {
                if self.platform.is_windows_family() {
                    Ok(RawLinkTarget::Reparse {
                        print_name: print_name.clone(),
                        substitute_name: substitute_name.clone(),
                    })
                } else {
                    Ok(RawLinkTarget::Path(target.clone()))
                }
            }
            EntryKind::File | EntryKind::Directory => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a symbolic link",
            )),
        }
    }

    fn set_mode(&self, path: &Path, new_mode: u32) -> io::Result<()> {
        let mut state = self.state();
        self.record(
            &mut state,
            NativeCall::SetMode {
                path: path.to_path_buf(),
                mode: new_mode,
            },
        )?;
        if self.platform.is_windows_family() {
            return Err(unsupported("chmod", self.platform));
        }
        let resolved = resolve(&state, path)?;
        let immutable = self.is_immutable(&state.entries[&resolved]);
        if immutable {
            return Err(operation_not_permitted());
        }
        if let Some(entry) = state.entries.get_mut(&resolved) {
            entry.mode = new_mode & mode::PERMISSION_BITS;
        }
        Ok(())
    }

    fn set_flags(&self, path: &Path, flags: u32) -> io::Result<()> {
        let mut state = self.state();
        self.record(
            &mut state,
            NativeCall::SetFlags {
                path: path.to_path_buf(),
                flags,
            },
        )?;
        if !self.platform.has_bsd_flags() {
            return Err(unsupported("chflags", self.platform));
        }
        let resolved = resolve(&state, path)?;
        if let Some(entry) = state.entries.get_mut(&resolved) {
            entry.flags = flags;
        }
        Ok(())
    }

    fn set_windows_attributes(&self, path: &Path, attributes: u32) -> io::Result<()> {
        let mut state = self.state();
        self.record(
            &mut state,
            NativeCall::SetWindowsAttributes {
                path: path.to_path_buf(),
                attributes,
            },
        )?;
        if !self.platform.is_windows_family() {
            return Err(unsupported("SetFileAttributes", self.platform));
        }
        let resolved = resolve(&state, path)?;
        if let Some(entry) = state.entries.get_mut(&resolved) {
            entry.attributes =
                attributes & win::SETTABLE_ATTRIBUTES & !win::FILE_ATTRIBUTE_NORMAL;
        }
        Ok(())
    }

    fn set_modified(&self, path: &Path, millis: i64) -> io::Result<()> {
        let mut state = self.state();
        self.record(
            &mut state,
            NativeCall::SetModified {
                path: path.to_path_buf(),
                millis,
            },
        )?;
        let resolved = resolve(&state, path)?;
        let immutable = self.is_immutable(&state.entries[&resolved]);
        if immutable {
            return Err(operation_not_permitted());
        }
        if let Some(entry) = state.entries.get_mut(&resolved) {
            entry.modified_millis = millis;
        }
        Ok(())
    }
}
