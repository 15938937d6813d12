use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use tracing_error::{SpanTrace, SpanTraceStatus};

/* 📖 # Why distinguish Stat and Mutation errors?

Callers react differently to the two failure families. A metadata read that fails
with anything other than "no such file" is usually transient (I/O error, permission
change racing the call) and callers retry it. A failed chmod/chflags/SetFileAttributes
may have left the file half-updated, so the error carries the operations that were
already applied. Both keep the original `io::Error` so the OS error code survives.

"Not found" is not an error at all: it is reported as `FileInfo { exists: false }`.
*/

/// Error variants that can occur in fileattr operations.
#[derive(Debug)]
pub enum ErrorKind {
    /// Reading metadata failed for a reason other than the file not existing.
    Stat { path: PathBuf, source: io::Error },

    /// A native mutation call (chmod, chflags, SetFileAttributes, utimes) failed.
    ///
    /// `applied` lists the operations of the same request that had already
    /// succeeded. They are not rolled back.
    Mutation {
        path: PathBuf,
        operation: String,
        applied: Vec<String>,
        source: io::Error,
    },

    /// Loading or parsing configuration failed.
    Config { path: PathBuf, message: String },

    /// Catch-all for other errors with a message
    Message { message: String },
}

/// Error type wrapping an [`ErrorKind`] with context and a span trace.
pub struct FileattrError {
    kind: ErrorKind,
    context: Vec<String>,
    span_trace: SpanTrace,
}

impl FileattrError {
    /// Creates a new error from an ErrorKind, capturing the current span trace.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: vec![],
            span_trace: SpanTrace::capture(),
        }
    }

    /// Creates a [`ErrorKind::Message`] error.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Message {
            message: message.into(),
        })
    }

    /// Creates a [`ErrorKind::Stat`] error for the given path.
    pub fn stat(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::new(ErrorKind::Stat {
            path: path.into(),
            source,
        })
    }

    /// Creates a [`ErrorKind::Mutation`] error for the given path.
    pub fn mutation(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        applied: Vec<String>,
        source: io::Error,
    ) -> Self {
        Self::new(ErrorKind::Mutation {
            path: path.into(),
            operation: operation.into(),
            applied,
            source,
        })
    }

    /// Creates a [`ErrorKind::Config`] error.
    pub fn config(path: &Path, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config {
            path: path.to_path_buf(),
            message: message.into(),
        })
    }

    /// Attaches context to an error.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Attaches context using lazy evaluation.
    pub fn with_context<F>(mut self, f: F) -> Self
    where
        F: FnOnce() -> String,
    {
        self.context.push(f());
        self
    }

    /// Returns a reference to the underlying ErrorKind.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns the attached context strings, oldest first.
    pub fn get_context(&self) -> &[String] {
        &self.context
    }

    /// Returns the span trace captured when the error was created.
    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }

    /// Returns the underlying I/O error, if this error wraps one.
    pub fn io_error(&self) -> Option<&io::Error> {
        match &self.kind {
            ErrorKind::Stat { source, .. } | ErrorKind::Mutation { source, .. } => Some(source),
            ErrorKind::Config { .. } | ErrorKind::Message { .. } => None,
        }
    }

    /// Returns the OS error code preserved from the failing native call.
    pub fn raw_os_error(&self) -> Option<i32> {
        self.io_error().and_then(io::Error::raw_os_error)
    }

    fn fmt_kind(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Stat { path, source } => {
                write!(f, "Failed to read metadata of {}: {}", path.display(), source)
            }
            ErrorKind::Mutation {
                path,
                operation,
                applied,
                source,
            } => {
                write!(f, "{} failed on {}: {}", operation, path.display(), source)?;
                if !applied.is_empty() {
                    write!(f, " (already applied: {})", applied.join(", "))?;
                }
                Ok(())
            }
            ErrorKind::Config { path, message } => {
                write!(f, "Invalid configuration in {}: {}", path.display(), message)
            }
            ErrorKind::Message { message } => write!(f, "{}", message),
        }
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_kind(f)?;
        writeln!(f)?;
        for (index, context) in self.context.iter().enumerate() {
            let connector = if index + 1 == self.context.len() { "└─" } else { "├─" };
            writeln!(f, "{} {}", connector, context)?;
        }
        Ok(())
    }
}

impl From<ErrorKind> for FileattrError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl StdError for FileattrError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.kind {
            ErrorKind::Stat { source, .. } | ErrorKind::Mutation { source, .. } => Some(source),
            ErrorKind::Config { .. } | ErrorKind::Message { .. } => None,
        }
    }
}

impl fmt::Display for FileattrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ctx in &self.context {
            write!(f, "{}: ", ctx)?;
        }
        self.fmt_kind(f)
    }
}

impl fmt::Debug for FileattrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f)?;
        if self.span_trace.status() == SpanTraceStatus::CAPTURED {
            writeln!(f, "Trace: {}", self.span_trace)?;
        }
        Ok(())
    }
}

/// Standard result type for fileattr operations.
pub type FileattrResult<T> = std::result::Result<T, Box<FileattrError>>;

/// Extension trait for attaching context to Results.
pub trait ResultExt<T> {
    /// Attaches context to an error, consuming and re-wrapping it.
    fn context(self, context: impl Into<String>) -> FileattrResult<T>;

    /// Attaches context using lazy evaluation.
    fn with_context<F>(self, f: F) -> FileattrResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for FileattrResult<T> {
    fn context(self, context: impl Into<String>) -> FileattrResult<T> {
        self.map_err(|err| Box::new(err.context(context)))
    }

    fn with_context<F>(self, f: F) -> FileattrResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| Box::new(err.with_context(f)))
    }
}

/// Creates a boxed [`FileattrError`] from a format string.
#[macro_export]
macro_rules! err {
    ($($arg:tt)*) => {
        Box::new($crate::FileattrError::message(format!($($arg)*)))
    };
}

/// Returns early with a boxed [`FileattrError`] built from a format string.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::err!($($arg)*))
    };
}
