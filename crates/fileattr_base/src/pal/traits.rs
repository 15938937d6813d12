use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::FileattrResult;

use super::raw::{LinkMode, Platform, RawLinkTarget, RawStat};

/* 📖 # Why does the PAL return io::Result instead of FileattrResult?

Every method is a thin pass-through to one native call. The caller needs the raw
outcome: "no such file" becomes `exists = false`, a broken link target becomes
"target absent", anything else becomes a Stat or Mutation error with the path and
the operation attached. `io::Error` carries exactly that (kind plus OS error code)
and leaves the classification to the engine.
*/

/// Platform Abstraction Layer (PAL) trait: the native metadata calls of one platform.
///
/// Two implementations are provided:
/// - `RealPal`: the operating system this binary runs on
/// - `MockPal`: an in-memory filesystem that behaves like a chosen platform and
///   records every native call
pub trait Pal: std::fmt::Debug + Send + Sync + 'static {
    /// The platform whose native representation `stat` returns.
    fn platform(&self) -> Platform;

    /// One-time feature probe: can this system create and report symbolic links?
    fn probe_symlink_support(&self) -> bool;

    /// The process umask. Implementations capture it once and return the same value afterwards.
    fn umask(&self) -> FileattrResult<u32>;

    /// `stat`/`lstat` on POSIX, `FindFirstFileW`/handle metadata on Windows.
    fn stat(&self, path: &Path, link_mode: LinkMode) -> io::Result<RawStat>;

    /// Reads the target of a symbolic link without following it.
    fn read_link(&self, path: &Path) -> io::Result<RawLinkTarget>;

    /// `chmod`: replaces the permission bits (the low 12 bits of `mode`).
    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// `chflags`: replaces the BSD file flags.
    fn set_flags(&self, path: &Path, flags: u32) -> io::Result<()>;

    /// `SetFileAttributesW`: replaces the Windows attribute word.
    fn set_windows_attributes(&self, path: &Path, attributes: u32) -> io::Result<()>;

    /// Sets the last-modified time, in milliseconds since the Unix epoch.
    fn set_modified(&self, path: &Path, millis: i64) -> io::Result<()>;
}

/// Error returned by PAL methods a platform has no native call for.
pub fn unsupported(operation: &str, platform: Platform) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{} is not available on {}", operation, platform),
    )
}

/// Handle to a PAL implementation, enabling shared ownership.
///
/// Internally wraps `Arc<dyn Pal>` for cheap cloning and thread-safe sharing.
///
/// # Examples
///
/// ```no_run
/// use fileattr_base::{RealPal, PalHandle};
///
/// let pal = PalHandle::new(RealPal::new());
/// let pal_clone = pal.clone(); // Cheap clone, shares the same implementation
/// ```
#[derive(Debug, Clone)]
pub struct PalHandle(Arc<dyn Pal>);

impl PalHandle {
    /// Create a new PalHandle from a Pal implementation.
    pub fn new(pal: impl Pal + 'static) -> Self {
        Self(Arc::new(pal))
    }
}

impl std::ops::Deref for PalHandle {
    type Target = dyn Pal;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}
