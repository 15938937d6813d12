/* 📖 # What is the Platform Abstraction Layer?

The PAL is the only code that talks to the operating system's metadata calls:
stat/lstat, readlink, chmod, chflags, FindFirstFileW, FSCTL_GET_REPARSE_POINT and
SetFileAttributesW. It hands back raw records and plain `io::Error`s and makes no
attribute decisions of its own.

`RealPal` is compiled for the host platform. `MockPal` can impersonate any of the
supported platforms, so Windows attribute handling is testable on Linux and vice versa.
*/

pub mod mock;
mod platform;
pub mod raw;
pub mod real_pal;
pub mod reparse;
mod traits;
pub mod umask;

pub use mock::{MockOp, MockPal, NativeCall};
pub use raw::{
    LinkMode, Platform, PosixStat, RawLinkTarget, RawStat, WindowsFindData, bsd_flags, mode, win,
};
pub use real_pal::RealPal;
pub use reparse::parse_reparse_buffer;
pub use traits::{Pal, PalHandle, unsupported};
pub use umask::process_umask;
