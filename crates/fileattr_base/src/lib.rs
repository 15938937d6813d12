/* 📖 # Why have fileattr_base as a separate crate?

fileattr_base holds everything that touches the operating system: the error type,
tracing setup and the Platform Abstraction Layer. The engine crate on top of it is
pure attribute logic and can be exercised entirely against `MockPal`.
*/

pub mod error;
pub mod pal;
pub mod tracing;

pub use error::{ErrorKind, FileattrError, FileattrResult, ResultExt};
pub use pal::{
    LinkMode, MockPal, NativeCall, Pal, PalHandle, Platform, PosixStat, RawLinkTarget, RawStat,
    RealPal, WindowsFindData,
};
