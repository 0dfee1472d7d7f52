use std::os::raw::c_char;

use ipcslot_channel::{Channel, ChannelConfig, Requester, DEFAULT_SEGMENT_SIZE};

use crate::args;
use crate::error;
use crate::types::{
    ChannelHandle, Endpoint, IpcslotChannelHandle, IpcslotResult, IpcslotShutdownHandle,
    ShutdownHandleBox,
};

pub(crate) fn with_channel_mut<T>(
    handle: IpcslotChannelHandle,
    on_error: T,
    f: impl FnOnce(&mut ChannelHandle) -> T,
) -> T {
    if handle.is_null() {
        let _ = error::set_invalid_argument("channel handle cannot be null");
        return on_error;
    }

    let channel_handle = {
        // SAFETY: Pointer validity is guaranteed by the caller.
        unsafe { &mut *(handle as *mut ChannelHandle) }
    };

    f(channel_handle)
}

/// Channel layout from C arguments. The listener and requester only run on
/// the dual-signal layout, so a non-zero `single_signal` is refused.
fn config_arg(size: usize, single_signal: i32) -> Option<ChannelConfig> {
    if single_signal != 0 {
        let _ = error::set_invalid_argument("single-signal channels are not supported");
        return None;
    }
    let size = if size == 0 { DEFAULT_SEGMENT_SIZE } else { size };
    Some(ChannelConfig::default().with_size(size))
}

fn into_handle(endpoint: Endpoint) -> IpcslotChannelHandle {
    let handle = ChannelHandle {
        endpoint: Some(endpoint),
    };
    Box::into_raw(Box::new(handle)) as IpcslotChannelHandle
}

/// Create the server side of channel `name`.
///
/// `size == 0` selects the default segment size (1 MiB). `single_signal`
/// must be 0; any other value fails with `IPCSLOT_ERR_INVALID_ARGUMENT`.
/// Returns null on failure; see `ipcslot_last_error`.
///
/// # Safety
/// `name` must be a non-null pointer to a valid UTF-8, NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn ipcslot_server_create(
    name: *const c_char,
    size: usize,
    single_signal: i32,
) -> IpcslotChannelHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        error::clear_error_state();

        let name = {
            // SAFETY: We validate null and UTF-8 in helper.
            match unsafe { args::required_str_arg(name, "name") } {
                Some(v) => v,
                None => return std::ptr::null_mut(),
            }
        };

        let Some(config) = config_arg(size, single_signal) else {
            return std::ptr::null_mut();
        };

        match Channel::create_server(name, config) {
            Ok(channel) => into_handle(Endpoint::Server(channel)),
            Err(err) => {
                let _ = error::map_channel_error(&err);
                std::ptr::null_mut()
            }
        }
    })
}

/// Open the client side of an existing channel `name`.
///
/// `size` must match the server's; `single_signal` must be 0.
///
/// # Safety
/// `name` must be a non-null pointer to a valid UTF-8, NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn ipcslot_client_connect(
    name: *const c_char,
    size: usize,
    single_signal: i32,
) -> IpcslotChannelHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        error::clear_error_state();

        let name = {
            // SAFETY: We validate null and UTF-8 in helper.
            match unsafe { args::required_str_arg(name, "name") } {
                Some(v) => v,
                None => return std::ptr::null_mut(),
            }
        };

        let Some(config) = config_arg(size, single_signal) else {
            return std::ptr::null_mut();
        };

        match Requester::connect(name, config) {
            Ok(requester) => into_handle(Endpoint::Client(requester)),
            Err(err) => {
                let _ = error::map_channel_error(&err);
                std::ptr::null_mut()
            }
        }
    })
}

/// Close and free a channel handle. The server side also removes the names.
///
/// # Safety
/// `channel` must be null or a handle returned by `ipcslot_server_create` or
/// `ipcslot_client_connect`, not used again afterwards.
#[no_mangle]
pub unsafe extern "C" fn ipcslot_channel_free(channel: IpcslotChannelHandle) {
    crate::ffi_boundary((), || {
        if channel.is_null() {
            return;
        }

        // SAFETY: Caller guarantees this handle was allocated by this library.
        unsafe {
            drop(Box::from_raw(channel as *mut ChannelHandle));
        }
    });
}

/// Send a request and wait for the reply.
///
/// A negative `timeout_ms` waits forever. `IPCSLOT_ERR_TIMEOUT` leaves the
/// channel usable; the call may be repeated.
///
/// # Safety
/// `channel` must be a valid client handle. If `len > 0`, `data` must be
/// non-null and readable for `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn ipcslot_send_request(
    channel: IpcslotChannelHandle,
    data: *const u8,
    len: usize,
    timeout_ms: i64,
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

        with_channel_mut(channel, IpcslotResult::InvalidArgument, |handle| {
            let requester = match handle.endpoint.as_mut() {
                Some(Endpoint::Client(requester)) => requester,
                Some(Endpoint::Server(_)) => {
                    error::set_error_message("send_request requires a client channel");
                    return IpcslotResult::WrongRole;
                }
                None => return error::set_invalid_argument("channel handle has been closed"),
            };

            match requester.send_request(payload, args::timeout_arg(timeout_ms)) {
                Ok(()) => IpcslotResult::Ok,
                Err(err) => error::map_channel_error(&err),
            }
        })
    })
}

/// Copy up to `out_len` bytes from the start of the segment.
///
/// # Safety
/// `channel` must be a valid handle. If `out_len > 0`, `out` must be writable
/// for `out_len` bytes. `out_read` may be null.
#[no_mangle]
pub unsafe extern "C" fn ipcslot_read(
    channel: IpcslotChannelHandle,
    out: *mut u8,
    out_len: usize,
    out_read: *mut usize,
) -> IpcslotResult {
    crate::ffi_boundary(IpcslotResult::Internal, || {
        error::clear_error_state();

        let buffer = {
            // SAFETY: We validate pointer/length pairing in helper.
            match unsafe { args::out_bytes_arg(out, out_len, "out") } {
                Some(v) => v,
                None => return IpcslotResult::InvalidArgument,
            }
        };

        with_channel_mut(channel, IpcslotResult::InvalidArgument, |handle| {
            let Some(endpoint) = handle.endpoint.as_ref() else {
                return error::set_invalid_argument("channel handle has been closed");
            };

            match endpoint.channel().read(buffer) {
                Ok(read) => {
                    if !out_read.is_null() {
                        // SAFETY: Pointer was checked for null above.
                        unsafe { *out_read = read };
                    }
                    IpcslotResult::Ok
                }
                Err(err) => error::map_channel_error(&err),
            }
        })
    })
}

/// Create a handle that stops `ipcslot_listen_until` on this server channel.
///
/// The handle may be triggered from any thread, including a signal-driven
/// one, while the listener runs.
///
/// # Safety
/// `channel` must be a valid server handle.
#[no_mangle]
pub unsafe extern "C" fn ipcslot_shutdown_create(
    channel: IpcslotChannelHandle,
) -> IpcslotShutdownHandle {
    crate::ffi_boundary(std::ptr::null_mut(), || {
        error::clear_error_state();

        with_channel_mut(channel, std::ptr::null_mut(), |handle| {
            let Some(endpoint) = handle.endpoint.as_ref() else {
                let _ = error::set_invalid_argument("channel handle has been closed");
                return std::ptr::null_mut();
            };

            match endpoint.channel().shutdown_handle() {
                Ok(handle) => {
                    Box::into_raw(Box::new(ShutdownHandleBox { handle })) as IpcslotShutdownHandle
                }
                Err(err) => {
                    let _ = error::map_channel_error(&err);
                    std::ptr::null_mut()
                }
            }
        })
    })
}

/// Set the stop flag and wake the listener once.
///
/// # Safety
/// `shutdown` must be a valid handle from `ipcslot_shutdown_create`.
#[no_mangle]
pub unsafe extern "C" fn ipcslot_shutdown_trigger(shutdown: IpcslotShutdownHandle) -> IpcslotResult {
    crate::ffi_boundary(IpcslotResult::Internal, || {
        error::clear_error_state();

        if shutdown.is_null() {
            return error::set_invalid_argument("shutdown handle cannot be null");
        }
        let shutdown = {
            // SAFETY: Pointer validity is guaranteed by the caller.
            unsafe { &*(shutdown as *const ShutdownHandleBox) }
        };

        match shutdown.handle.trigger() {
            Ok(()) => IpcslotResult::Ok,
            Err(err) => error::map_channel_error(&err),
        }
    })
}

/// Free a shutdown handle.
///
/// # Safety
/// `shutdown` must be null or a handle from `ipcslot_shutdown_create`, not
/// used again afterwards and not in use by a running listener.
#[no_mangle]
pub unsafe extern "C" fn ipcslot_shutdown_free(shutdown: IpcslotShutdownHandle) {
    crate::ffi_boundary((), || {
        if shutdown.is_null() {
            return;
        }

        // SAFETY: Caller guarantees this handle was allocated by ipcslot_shutdown_create.
        unsafe {
            drop(Box::from_raw(shutdown as *mut ShutdownHandleBox));
        }
    });
}
