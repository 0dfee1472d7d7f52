use std::ffi::c_void;
use std::io;
use std::ptr::NonNull;
use std::time::Duration;

use tracing::{debug, info, warn};
use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_ALREADY_EXISTS, HANDLE, INVALID_HANDLE_VALUE, WAIT_ABANDONED,
    WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::System::Memory::{
    CreateFileMappingW, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, FILE_MAP_ALL_ACCESS,
    MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READWRITE,
};
use windows_sys::Win32::System::Threading::{
    CreateEventW, OpenEventW, SetEvent, WaitForSingleObject, EVENT_ALL_ACCESS, INFINITE,
};

use crate::error::{Result, SysError};
use crate::name;
use crate::traits::{NamedSegment, NamedSignal};

fn wide_name(name: &str) -> Result<Vec<u16>> {
    name::validate(name)?;
    Ok(name::os_name(name)
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect())
}

/// Milliseconds for `WaitForSingleObject`, rounded up so the wait never ends early.
fn wait_millis(timeout: Option<Duration>) -> u32 {
    match timeout {
        None => INFINITE,
        Some(timeout) => {
            let millis = timeout.as_nanos().div_ceil(1_000_000);
            millis.min(u128::from(INFINITE - 1)) as u32
        }
    }
}

/// Win32 auto-reset event.
pub struct Win32Event {
    handle: HANDLE,
    name: String,
    owner: bool,
}

// SAFETY: Event handles may be used from any thread.
unsafe impl Send for Win32Event {}
unsafe impl Sync for Win32Event {}

impl NamedSignal for Win32Event {
    fn create(name: &str) -> Result<Self> {
        let wide = wide_name(name)?;
        // SAFETY: `wide` is NUL-terminated; auto-reset, initially not signaled.
        let handle = unsafe { CreateEventW(std::ptr::null(), 0, 0, wide.as_ptr()) };
        if handle.is_null() {
            return Err(SysError::CreateFailed {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        // SAFETY: Reads the thread's last-error value set by CreateEventW.
        if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
            // SAFETY: `handle` was just returned by CreateEventW.
            unsafe { CloseHandle(handle) };
            return Err(SysError::AlreadyExists {
                name: name.to_string(),
            });
        }
        info!(name, "created named event");
        Ok(Self {
            handle,
            name: name.to_string(),
            owner: true,
        })
    }

    fn open(name: &str) -> Result<Self> {
        let wide = wide_name(name)?;
        // SAFETY: `wide` is NUL-terminated.
        let handle = unsafe { OpenEventW(EVENT_ALL_ACCESS, 0, wide.as_ptr()) };
        if handle.is_null() {
            return Err(SysError::OpenFailed {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        debug!(name, "opened named event");
        Ok(Self {
            handle,
            name: name.to_string(),
            owner: false,
        })
    }

    fn notify(&self) -> Result<()> {
        // SAFETY: `self.handle` is a live event handle.
        if unsafe { SetEvent(self.handle) } == 0 {
            return Err(SysError::NotifyFailed {
                name: self.name.clone(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        // SAFETY: `self.handle` is a live event handle.
        let code = unsafe { WaitForSingleObject(self.handle, wait_millis(timeout)) };
        match code {
            WAIT_OBJECT_0 => Ok(()),
            WAIT_TIMEOUT => Err(SysError::TimedOut {
                name: self.name.clone(),
                timeout: timeout.unwrap_or(Duration::MAX),
            }),
            WAIT_ABANDONED => Err(SysError::Abandoned {
                name: self.name.clone(),
            }),
            _ => Err(SysError::WaitFailed {
                name: self.name.clone(),
                source: io::Error::last_os_error(),
            }),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_owner(&self) -> bool {
        self.owner
    }

    /// Kernel objects disappear with their last handle; nothing can go stale.
    fn remove(name: &str) -> Result<bool> {
        name::validate(name)?;
        Ok(false)
    }
}

impl Drop for Win32Event {
    fn drop(&mut self) {
        // SAFETY: `self.handle` is closed exactly once here.
        if unsafe { CloseHandle(self.handle) } == 0 {
            warn!(name = %self.name, error = %io::Error::last_os_error(), "failed to close event");
        }
        debug!(name = %self.name, owner = self.owner, "released named event");
    }
}

/// Page-file-backed Win32 file mapping.
pub struct Win32Mapping {
    mapping: HANDLE,
    view: NonNull<u8>,
    len: usize,
    name: String,
    owner: bool,
}

// SAFETY: Mapping and view handles may be used from any thread.
unsafe impl Send for Win32Mapping {}

impl Win32Mapping {
    fn map_view(mapping: HANDLE, name: &str, len: usize) -> Result<NonNull<u8>> {
        // SAFETY: `mapping` is a live file-mapping handle.
        let view = unsafe { MapViewOfFile(mapping, FILE_MAP_ALL_ACCESS, 0, 0, len) };
        match NonNull::new(view.Value.cast::<u8>()) {
            Some(view) => Ok(view),
            None => {
                let source = io::Error::last_os_error();
                // SAFETY: `mapping` is still owned here and not used afterwards.
                unsafe { CloseHandle(mapping) };
                Err(SysError::MapFailed {
                    name: name.to_string(),
                    source,
                })
            }
        }
    }
}

impl NamedSegment for Win32Mapping {
    fn create(name: &str, size: usize) -> Result<Self> {
        let wide = wide_name(name)?;
        if size == 0 {
            return Err(SysError::InvalidSize(size));
        }
        let size64 = size as u64;
        // SAFETY: `wide` is NUL-terminated; INVALID_HANDLE_VALUE selects the page file.
        let mapping = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                std::ptr::null(),
                PAGE_READWRITE,
                (size64 >> 32) as u32,
                size64 as u32,
                wide.as_ptr(),
            )
        };
        if mapping.is_null() {
            return Err(SysError::CreateFailed {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        // SAFETY: Reads the thread's last-error value set by CreateFileMappingW.
        if unsafe { GetLastError() } == ERROR_ALREADY_EXISTS {
            // SAFETY: `mapping` was just returned and is not used afterwards.
            unsafe { CloseHandle(mapping) };
            return Err(SysError::AlreadyExists {
                name: name.to_string(),
            });
        }
        let view = Self::map_view(mapping, name, size)?;
        info!(name, size, "created file mapping");
        Ok(Self {
            mapping,
            view,
            len: size,
            name: name.to_string(),
            owner: true,
        })
    }

    fn open(name: &str, size: usize) -> Result<Self> {
        let wide = wide_name(name)?;
        if size == 0 {
            return Err(SysError::InvalidSize(size));
        }
        // SAFETY: `wide` is NUL-terminated.
        let mapping = unsafe { OpenFileMappingW(FILE_MAP_ALL_ACCESS, 0, wide.as_ptr()) };
        if mapping.is_null() {
            return Err(SysError::OpenFailed {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        let view = Self::map_view(mapping, name, size)?;
        debug!(name, size, "opened file mapping");
        Ok(Self {
            mapping,
            view,
            len: size,
            name: name.to_string(),
            owner: false,
        })
    }

    fn len(&self) -> usize {
        self.len
    }

    fn as_ptr(&self) -> *mut u8 {
        self.view.as_ptr()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_owner(&self) -> bool {
        self.owner
    }

    fn remove(name: &str) -> Result<bool> {
        name::validate(name)?;
        Ok(false)
    }
}

impl Drop for Win32Mapping {
    fn drop(&mut self) {
        let view = MEMORY_MAPPED_VIEW_ADDRESS {
            Value: self.view.as_ptr().cast::<c_void>(),
        };
        // SAFETY: `view` and `mapping` are released exactly once, view first.
        unsafe {
            UnmapViewOfFile(view);
            CloseHandle(self.mapping);
        }
        debug!(name = %self.name, owner = self.owner, "released file mapping");
    }
}
