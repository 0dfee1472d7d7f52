use std::fmt;
use std::time::Duration;

/// Flat classification of every failure the OS object layer can report.
///
/// `TimedOut` is the only kind a client should treat as retryable; the
/// rest are fatal to the object (and the channel) that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidName,
    InvalidSize,
    AlreadyExists,
    CreateFailed,
    OpenFailed,
    MapFailed,
    NotifyFailed,
    WaitFailed,
    Abandoned,
    TimedOut,
    InvalidObject,
    TooBig,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidName => "invalid-name",
            ErrorKind::InvalidSize => "invalid-size",
            ErrorKind::AlreadyExists => "already-exists",
            ErrorKind::CreateFailed => "create-failed",
            ErrorKind::OpenFailed => "open-failed",
            ErrorKind::MapFailed => "map-failed",
            ErrorKind::NotifyFailed => "notify-failed",
            ErrorKind::WaitFailed => "wait-failed",
            ErrorKind::Abandoned => "abandoned",
            ErrorKind::TimedOut => "timed-out",
            ErrorKind::InvalidObject => "invalid-object",
            ErrorKind::TooBig => "too-big",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from named segment and signal operations.
#[derive(Debug, thiserror::Error)]
pub enum SysError {
    /// The object name is empty, too long, or contains a forbidden character.
    #[error("invalid object name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Segments must be at least one byte long.
    #[error("invalid segment size: {0}")]
    InvalidSize(usize),

    /// A live object with this name already exists.
    #[error("object {name} already exists")]
    AlreadyExists { name: String },

    /// The OS refused to create the object.
    #[error("failed to create {name}: {source}")]
    CreateFailed {
        name: String,
        source: std::io::Error,
    },

    /// No object with this name exists, or it could not be opened.
    #[error("failed to open {name}: {source}")]
    OpenFailed {
        name: String,
        source: std::io::Error,
    },

    /// The segment could not be mapped into this address space.
    #[error("failed to map {name}: {source}")]
    MapFailed {
        name: String,
        source: std::io::Error,
    },

    /// Posting the signal failed.
    #[error("failed to notify {name}: {source}")]
    NotifyFailed {
        name: String,
        source: std::io::Error,
    },

    /// The OS reported a fatal error while waiting.
    #[error("wait on {name} failed: {source}")]
    WaitFailed {
        name: String,
        source: std::io::Error,
    },

    /// The owner of the object went away while holding it (Windows only).
    #[error("wait on {name} abandoned by its owner")]
    Abandoned { name: String },

    /// The deadline elapsed before the signal was posted.
    #[error("wait on {name} timed out after {timeout:?}")]
    TimedOut { name: String, timeout: Duration },

    /// The handle was released or never initialized.
    ///
    /// Never constructed: `release` consumes the object and `Drop` runs
    /// once, so ownership already rules out using a released handle. The
    /// variant keeps the taxonomy complete for code matching on `ErrorKind`.
    #[error("operation on a released or uninitialized object")]
    InvalidObject,

    /// A write larger than the segment.
    #[error("payload of {len} bytes exceeds segment size of {max} bytes")]
    TooBig { len: usize, max: usize },
}

impl SysError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SysError::InvalidName { .. } => ErrorKind::InvalidName,
            SysError::InvalidSize(_) => ErrorKind::InvalidSize,
            SysError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            SysError::CreateFailed { .. } => ErrorKind::CreateFailed,
            SysError::OpenFailed { .. } => ErrorKind::OpenFailed,
            SysError::MapFailed { .. } => ErrorKind::MapFailed,
            SysError::NotifyFailed { .. } => ErrorKind::NotifyFailed,
            SysError::WaitFailed { .. } => ErrorKind::WaitFailed,
            SysError::Abandoned { .. } => ErrorKind::Abandoned,
            SysError::TimedOut { .. } => ErrorKind::TimedOut,
            SysError::InvalidObject => ErrorKind::InvalidObject,
            SysError::TooBig { .. } => ErrorKind::TooBig,
        }
    }

    /// Whether a caller may retry the operation on the same object.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SysError::TimedOut { .. })
    }
}

pub type Result<T> = std::result::Result<T, SysError>;
