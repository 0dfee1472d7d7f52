use std::ffi::c_void;

use ipcslot_channel::{Listener, Request};

use crate::args;
use crate::channel::with_channel_mut;
use crate::error;
use crate::types::{
    Endpoint, IpcslotCallback, IpcslotChannelHandle, IpcslotRequestHandle, IpcslotResult,
    IpcslotShutdownHandle, ShutdownHandleBox,
};

struct UserData(*mut c_void);

// SAFETY: The pointer is opaque to us and only handed back to the caller's
// callback, on the thread that called `ipcslot_listen_until`.
unsafe impl Send for UserData {}

impl UserData {
    fn as_ptr(&self) -> *mut c_void {
        self.0
    }
}

fn with_request<T>(
    request: IpcslotRequestHandle,
    on_error: T,
    f: impl FnOnce(&mut Request<'_>) -> T,
) -> T {
    if request.is_null() {
        let _ = error::set_invalid_argument("request handle cannot be null");
        return on_error;
    }

    let request = {
        // SAFETY: Request handles are only valid inside the callback that
        // received them, where they point at a live `Request`.
        unsafe { &mut *(request as *mut Request<'_>) }
    };

    f(request)
}

/// Serve requests on a server channel until `shutdown` is triggered.
///
/// `callback` runs once per request and must answer it with
/// `ipcslot_request_respond` or `ipcslot_request_ack`. A request left
/// unanswered is a protocol violation: the channel is torn down and
/// `IPCSLOT_ERR_PROTOCOL` is returned.
///
/// # Safety
/// `channel` must be a valid server handle and `shutdown` a handle created
/// from it that outlives this call. `user_data` is passed through untouched.
#[no_mangle]
pub unsafe extern "C" fn ipcslot_listen_until(
    channel: IpcslotChannelHandle,
    callback: Option<IpcslotCallback>,
    user_data: *mut c_void,
    shutdown: IpcslotShutdownHandle,
) -> IpcslotResult {
    crate::ffi_boundary(IpcslotResult::Protocol, || {
        error::clear_error_state();

        let Some(callback) = callback else {
            return error::set_invalid_argument("callback cannot be null");
        };
        if shutdown.is_null() {
            return error::set_invalid_argument("shutdown handle cannot be null");
        }
        let shutdown = {
            // SAFETY: Pointer validity is guaranteed by the caller.
            unsafe { &*(shutdown as *const ShutdownHandleBox) }
        };

        with_channel_mut(channel, IpcslotResult::InvalidArgument, |handle| {
            let channel = match handle.endpoint.take() {
                Some(Endpoint::Server(channel)) => channel,
                Some(client) => {
                    handle.endpoint = Some(client);
                    error::set_error_message("listen requires a server channel");
                    return IpcslotResult::WrongRole;
                }
                None => return error::set_invalid_argument("channel handle has been closed"),
            };

            let mut listener = match Listener::new(channel) {
                Ok(listener) => listener,
                Err(err) => return error::map_channel_error(&err),
            };
            let user_data = UserData(user_data);
            listener.register(move |request| {
                let request = (request as *mut Request<'_>).cast::<c_void>();
                callback(request, user_data.as_ptr());
            });

            let result = listener.listen_until(shutdown.handle.stop_flag());
            handle.endpoint = Some(Endpoint::Server(listener.into_channel()));
            match result {
                Ok(()) => IpcslotResult::Ok,
                Err(err) => error::map_channel_error(&err),
            }
        })
    })
}

/// Borrow the request bytes (the whole segment).
///
/// The pointer stays valid until the callback returns or replies.
///
/// # Safety
/// `request` must be the handle passed to the running callback; `out_data`
/// and `out_len` must be non-null and writable.
#[no_mangle]
pub unsafe extern "C" fn ipcslot_request_payload(
    request: IpcslotRequestHandle,
    out_data: *mut *const u8,
    out_len: *mut usize,
) -> IpcslotResult {
    crate::ffi_boundary(IpcslotResult::Internal, || {
        error::clear_error_state();

        if out_data.is_null() || out_len.is_null() {
            return error::set_invalid_argument("out_data and out_len cannot be null");
        }

        with_request(request, IpcslotResult::InvalidArgument, |request| {
            let payload = request.payload();
            // SAFETY: Both pointers were checked for null above.
            unsafe {
                *out_data = payload.as_ptr();
                *out_len = payload.len();
            }
            IpcslotResult::Ok
        })
    })
}

/// Write the reply and wake the client.
///
/// # Safety
/// `request` must be the handle passed to the running callback. If `len > 0`,
/// `data` must be non-null and readable for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn ipcslot_request_respond(
    request: IpcslotRequestHandle,
    data: *const u8,
    len: usize,
) -> IpcslotResult {
    crate::ffi_boundary(IpcslotResult::Internal, || {
        error::clear_error_state();

        let payload = {
            // SAFETY: We validate pointer/length pairing in helper.
            match unsafe { args::bytes_arg(data, len, "data") } {
                Some(v) => v,
                None => return IpcslotResult::InvalidArgument,
            }
        };

        with_request(request, IpcslotResult::InvalidArgument, |request| {
            match request.respond(payload) {
                Ok(()) => IpcslotResult::Ok,
                Err(err) => error::map_channel_error(&err),
            }
        })
    })
}

/// Answer the request without content.
///
/// # Safety
/// `request` must be the handle passed to the running callback.
#[no_mangle]
pub unsafe extern "C" fn ipcslot_request_ack(request: IpcslotRequestHandle) -> IpcslotResult {
    crate::ffi_boundary(IpcslotResult::Internal, || {
        error::clear_error_state();

        with_request(request, IpcslotResult::InvalidArgument, |request| {
            match request.acknowledge() {
                Ok(()) => IpcslotResult::Ok,
                Err(err) => error::map_channel_error(&err),
            }
        })
    })
}
