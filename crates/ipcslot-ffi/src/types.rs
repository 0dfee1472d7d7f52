use std::ffi::c_void;

use ipcslot_channel::{Channel, Requester, ShutdownHandle};

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcslotResult {
    Ok = 0,
    InvalidArgument = 1,
    InvalidName = 2,
    AlreadyExists = 3,
    CreateFailed = 4,
    OpenFailed = 5,
    ChannelNotGood = 6,
    WrongRole = 7,
    TooBig = 8,
    Timeout = 9,
    WaitFailed = 10,
    NotifyFailed = 11,
    AlreadyReplied = 12,
    Protocol = 13,
    Internal = 99,
}

#[allow(dead_code)]
pub const IPCSLOT_OK: IpcslotResult = IpcslotResult::Ok;
#[allow(dead_code)]
pub const IPCSLOT_ERR_INVALID_ARGUMENT: IpcslotResult = IpcslotResult::InvalidArgument;
#[allow(dead_code)]
pub const IPCSLOT_ERR_INVALID_NAME: IpcslotResult = IpcslotResult::InvalidName;
#[allow(dead_code)]
pub const IPCSLOT_ERR_ALREADY_EXISTS: IpcslotResult = IpcslotResult::AlreadyExists;
#[allow(dead_code)]
pub const IPCSLOT_ERR_CREATE_FAILED: IpcslotResult = IpcslotResult::CreateFailed;
#[allow(dead_code)]
pub const IPCSLOT_ERR_OPEN_FAILED: IpcslotResult = IpcslotResult::OpenFailed;
#[allow(dead_code)]
pub const IPCSLOT_ERR_CHANNEL_NOT_GOOD: IpcslotResult = IpcslotResult::ChannelNotGood;
#[allow(dead_code)]
pub const IPCSLOT_ERR_WRONG_ROLE: IpcslotResult = IpcslotResult::WrongRole;
#[allow(dead_code)]
pub const IPCSLOT_ERR_TOO_BIG: IpcslotResult = IpcslotResult::TooBig;
#[allow(dead_code)]
pub const IPCSLOT_ERR_TIMEOUT: IpcslotResult = IpcslotResult::Timeout;
#[allow(dead_code)]
pub const IPCSLOT_ERR_WAIT_FAILED: IpcslotResult = IpcslotResult::WaitFailed;
#[allow(dead_code)]
pub const IPCSLOT_ERR_NOTIFY_FAILED: IpcslotResult = IpcslotResult::NotifyFailed;
#[allow(dead_code)]
pub const IPCSLOT_ERR_ALREADY_REPLIED: IpcslotResult = IpcslotResult::AlreadyReplied;
#[allow(dead_code)]
pub const IPCSLOT_ERR_PROTOCOL: IpcslotResult = IpcslotResult::Protocol;
#[allow(dead_code)]
pub const IPCSLOT_ERR_INTERNAL: IpcslotResult = IpcslotResult::Internal;

/// Pass as `timeout_ms` to wait for a reply forever.
#[allow(dead_code)]
pub const IPCSLOT_TIMEOUT_INFINITE: i64 = -1;

pub type IpcslotChannelHandle = *mut c_void;
pub type IpcslotShutdownHandle = *mut c_void;
pub type IpcslotRequestHandle = *mut c_void;

/// Invoked once per request from inside `ipcslot_listen_until`.
///
/// `request` is only valid for the duration of the call.
pub type IpcslotCallback = extern "C" fn(request: IpcslotRequestHandle, user_data: *mut c_void);

pub(crate) enum Endpoint {
    Server(Channel),
    Client(Requester),
}

impl Endpoint {
    pub(crate) fn channel(&self) -> &Channel {
        match self {
            Endpoint::Server(channel) => channel,
            Endpoint::Client(requester) => requester.channel(),
        }
    }
}

pub(crate) struct ChannelHandle {
    /// `None` once closed, or while a listener has borrowed the channel.
    pub(crate) endpoint: Option<Endpoint>,
}

pub(crate) struct ShutdownHandleBox {
    pub(crate) handle: ShutdownHandle,
}
