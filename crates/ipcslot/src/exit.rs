use std::fmt;
use std::io;

use ipcslot_channel::ChannelError;
use ipcslot_sys::{ErrorKind, SysError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const CHANNEL_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn sys_error(context: &str, err: SysError) -> CliError {
    let code = match err.kind() {
        ErrorKind::InvalidName | ErrorKind::InvalidSize => USAGE,
        ErrorKind::TimedOut => TIMEOUT,
        ErrorKind::TooBig => DATA_INVALID,
        _ => CHANNEL_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    let code = match &err {
        ChannelError::TimedOut(_) => TIMEOUT,
        ChannelError::TooBig { .. } => DATA_INVALID,
        ChannelError::NoCallbacks
        | ChannelError::WrongRole { .. }
        | ChannelError::UnsupportedTopology { .. } => INTERNAL,
        other => match other.kind() {
            Some(ErrorKind::InvalidName | ErrorKind::InvalidSize) => USAGE,
            _ => CHANNEL_ERROR,
        },
    };
    CliError::new(code, format!("{context}: {err}"))
}
