use crate::error::{Result, SysError};

/// Longest accepted object name, leading `/` included.
///
/// Apple caps semaphore names at `PSEMNAMLEN` (31). Linux semaphores live
/// in `/dev/shm/sem.<name>`, so leave room for that prefix under `NAME_MAX`.
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub const MAX_NAME_LEN: usize = 31;
#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub const MAX_NAME_LEN: usize = 250;

/// Validate a caller-supplied object name.
pub fn validate(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(SysError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("name is empty");
    }
    if name.contains(['/', '\\', '\0']) {
        return invalid("name must not contain '/', '\\' or NUL");
    }
    if os_name(name).len() > MAX_NAME_LEN {
        return invalid("name exceeds the platform length limit");
    }
    Ok(())
}

/// Name as handed to the OS.
///
/// POSIX IPC names must start with a single `/`; Windows kernel object names
/// are used verbatim in the session-local namespace.
pub fn os_name(name: &str) -> String {
    if cfg!(unix) {
        format!("/{name}")
    } else {
        name.to_string()
    }
}
