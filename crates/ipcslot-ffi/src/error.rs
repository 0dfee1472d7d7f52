use std::any::Any;
use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

use ipcslot_channel::ChannelError;
use ipcslot_sys::ErrorKind;

use crate::types::IpcslotResult;

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

pub(crate) fn clear_error_state() {
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::default();
    });
}

pub(crate) fn set_error_message(message: impl Into<String>) {
    let message = message.into();
    let sanitized = message.replace('\0', "?");
    LAST_ERROR.with(|state| {
        *state.borrow_mut() = CString::new(sanitized).unwrap_or_default();
    });
}

pub(crate) fn set_invalid_argument(message: impl Into<String>) -> IpcslotResult {
    set_error_message(message);
    IpcslotResult::InvalidArgument
}

pub(crate) fn set_panic_error(payload: &(dyn Any + Send)) {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    set_error_message(format!("panic across FFI boundary: {detail}"));
}

pub(crate) fn map_channel_error(err: &ChannelError) -> IpcslotResult {
    set_error_message(err.to_string());
    match err {
        ChannelError::SegmentCreateFailed { .. } | ChannelError::SyncCreateFailed { .. } => {
            match err.kind() {
                Some(ErrorKind::AlreadyExists) => IpcslotResult::AlreadyExists,
                Some(ErrorKind::InvalidName) => IpcslotResult::InvalidName,
                Some(ErrorKind::InvalidSize) => IpcslotResult::InvalidArgument,
                _ => IpcslotResult::CreateFailed,
            }
        }
        ChannelError::SegmentOpenFailed { .. } | ChannelError::SyncOpenFailed { .. } => {
            match err.kind() {
                Some(ErrorKind::InvalidName) => IpcslotResult::InvalidName,
                Some(ErrorKind::InvalidSize) => IpcslotResult::InvalidArgument,
                _ => IpcslotResult::OpenFailed,
            }
        }
        ChannelError::ChannelNotGood { .. } => IpcslotResult::ChannelNotGood,
        ChannelError::WrongRole { .. } => IpcslotResult::WrongRole,
        ChannelError::UnsupportedTopology { .. } => IpcslotResult::InvalidArgument,
        ChannelError::TimedOut(_) => IpcslotResult::Timeout,
        ChannelError::WaitFailed(_) => IpcslotResult::WaitFailed,
        ChannelError::NotifyFailed(_) => IpcslotResult::NotifyFailed,
        ChannelError::TooBig { .. } => IpcslotResult::TooBig,
        ChannelError::NoCallbacks => IpcslotResult::InvalidArgument,
        ChannelError::AlreadyReplied => IpcslotResult::AlreadyReplied,
    }
}

pub(crate) fn last_error_ptr() -> *const c_char {
    LAST_ERROR.with(|state| state.borrow().as_ptr())
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use super::*;

    fn last_error() -> String {
        // SAFETY: The pointer refers to this thread's LAST_ERROR CString.
        unsafe { CStr::from_ptr(last_error_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn maps_taxonomy_and_records_message() {
        let err = ChannelError::TooBig { len: 9, max: 8 };
        assert_eq!(map_channel_error(&err), IpcslotResult::TooBig);
        assert_eq!(
            last_error(),
            "payload of 9 bytes exceeds segment size of 8 bytes"
        );
    }

    #[test]
    fn interior_nul_is_sanitized() {
        set_error_message("bad\0name");
        assert_eq!(last_error(), "bad?name");
        clear_error_state();
        assert!(last_error().is_empty());
    }
}
