//! ipcslot-ffi: C-ABI exports for ipcslot channels.
//!
//! Handles are opaque pointers. Every call clears and, on failure, sets a
//! thread-local message readable through `ipcslot_last_error`. No Rust panic
//! crosses the boundary; a request that no callback answered surfaces as
//! `IPCSLOT_ERR_PROTOCOL`.

mod args;
mod channel;
mod error;
mod listen;
mod types;

use std::panic::AssertUnwindSafe;

pub use channel::{
    ipcslot_channel_free, ipcslot_client_connect, ipcslot_read, ipcslot_send_request,
    ipcslot_server_create, ipcslot_shutdown_create, ipcslot_shutdown_free,
    ipcslot_shutdown_trigger,
};
pub use listen::{
    ipcslot_listen_until, ipcslot_request_ack, ipcslot_request_payload, ipcslot_request_respond,
};
pub use types::{
    IpcslotCallback, IpcslotChannelHandle, IpcslotRequestHandle, IpcslotResult,
    IpcslotShutdownHandle, IPCSLOT_ERR_ALREADY_EXISTS, IPCSLOT_ERR_ALREADY_REPLIED,
    IPCSLOT_ERR_CHANNEL_NOT_GOOD, IPCSLOT_ERR_CREATE_FAILED, IPCSLOT_ERR_INTERNAL,
    IPCSLOT_ERR_INVALID_ARGUMENT, IPCSLOT_ERR_INVALID_NAME, IPCSLOT_ERR_NOTIFY_FAILED,
    IPCSLOT_ERR_OPEN_FAILED, IPCSLOT_ERR_PROTOCOL, IPCSLOT_ERR_TIMEOUT, IPCSLOT_ERR_TOO_BIG,
    IPCSLOT_ERR_WAIT_FAILED, IPCSLOT_ERR_WRONG_ROLE, IPCSLOT_OK, IPCSLOT_TIMEOUT_INFINITE,
};

fn ffi_boundary<T>(on_panic: T, f: impl FnOnce() -> T) -> T {
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            error::set_panic_error(payload.as_ref());
            on_panic
        }
    }
}

#[no_mangle]
pub extern "C" fn ipcslot_last_error() -> *const std::os::raw::c_char {
    ffi_boundary(std::ptr::null(), error::last_error_ptr)
}
