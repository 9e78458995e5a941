use std::fmt;
use std::io;

/// The closed set of library-defined error kinds.
///
/// Every asynchronous completion carries one of these (or, for
/// [`ErrorKind::Os`], a passthrough `errno`/`GetLastError` value). See the
/// module-level documentation for the mapping from syscall failures to
/// these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No error; present so a `(kind, n)` pair can be constructed uniformly.
    Ok,
    /// The operation was cancelled via `cancel`, `close`, or because its
    /// socket's context was torn down.
    OperationAborted,
    /// Stream peer closed its end cleanly (zero-length read).
    Eof,
    /// The descriptor is not recognized as a socket by the kernel.
    NotSocket,
    /// The socket is closed or was never opened.
    BadDescriptor,
    /// `open`/`assign` was called on a socket that is already open.
    AlreadyOpen,
    /// A `connect` is still in progress (internal; becomes `Ok` on
    /// completion). Never delivered to a user handler.
    InProgress,
    /// `accept` observed an aborted incoming connection and the caller
    /// opted in to see it (`enable_connection_aborted`).
    ConnectionAborted,
    /// A malformed option, length mismatch, or similar caller error.
    InvalidArgument,
    /// Name resolution failed.
    HostNotFound,
    /// Passthrough OS error (`errno` on Unix, `GetLastError` on Windows).
    Os,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Ok => "ok",
            ErrorKind::OperationAborted => "operation aborted",
            ErrorKind::Eof => "end of file",
            ErrorKind::NotSocket => "not a socket",
            ErrorKind::BadDescriptor => "bad descriptor",
            ErrorKind::AlreadyOpen => "already open",
            ErrorKind::InProgress => "operation in progress",
            ErrorKind::ConnectionAborted => "connection aborted",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::HostNotFound => "host not found",
            ErrorKind::Os => "os error",
        };
        f.write_str(s)
    }
}

/// A library error: one of the closed [`ErrorKind`]s, plus the underlying
/// OS error when `kind` is [`ErrorKind::Os`] (or when an OS error is
/// informative alongside a more specific kind, e.g. `BadDescriptor`).
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: Option<io::Error>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Error {
        Error { kind, source: None }
    }

    pub fn with_source(kind: ErrorKind, source: io::Error) -> Error {
        Error {
            kind,
            source: Some(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn raw_os_error(&self) -> Option<i32> {
        self.source.as_ref().and_then(io::Error::raw_os_error)
    }

    pub fn operation_aborted() -> Error {
        Error::new(ErrorKind::OperationAborted)
    }

    pub fn bad_descriptor() -> Error {
        Error::new(ErrorKind::BadDescriptor)
    }

    pub fn would_block() -> Error {
        Error::with_source(ErrorKind::Os, io::Error::from(io::ErrorKind::WouldBlock))
    }

    pub fn is_would_block(&self) -> bool {
        self.source
            .as_ref()
            .map(|e| e.kind() == io::ErrorKind::WouldBlock)
            .unwrap_or(false)
    }

    pub fn is_interrupted(&self) -> bool {
        self.source
            .as_ref()
            .map(|e| e.kind() == io::ErrorKind::Interrupted)
            .unwrap_or(false)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{}: {}", self.kind, src),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        let kind = match e.kind() {
            io::ErrorKind::NotFound => ErrorKind::HostNotFound,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => ErrorKind::InvalidArgument,
            io::ErrorKind::UnexpectedEof => ErrorKind::Eof,
            _ => match e.raw_os_error() {
                #[cfg(unix)]
                Some(code) if code == libc::EBADF => ErrorKind::BadDescriptor,
                #[cfg(unix)]
                Some(code) if code == libc::ENOTSOCK => ErrorKind::NotSocket,
                _ => ErrorKind::Os,
            },
        };
        Error::with_source(kind, e)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error::new(kind)
    }
}

/// `Result` alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, Error>;
