//! Named shared memory segments and cross-process signals.
//!
//! This is the lowest layer of ipcslot. It wraps the two kinds of named OS
//! object a channel is built from:
//! - [`NamedSegment`]: a fixed-size block of memory mapped by several processes
//! - [`NamedSignal`]: a binary signal one process posts and another waits on
//!
//! POSIX systems use `shm_open`/`mmap` and named semaphores; Windows uses
//! page-file mappings and auto-reset events. [`SharedMemory`] and
//! [`Semaphore`] name the implementation for the build target.
//!
//! On POSIX the objects outlive a process that exits without releasing them.
//! Use [`NamedSignal::remove`] and [`NamedSegment::remove`] to clear such
//! leftovers before creating a channel under the same name again.

pub mod error;
pub mod name;
pub mod traits;

#[cfg(unix)]
pub mod posix;
#[cfg(windows)]
pub mod windows;

pub use error::{ErrorKind, Result, SysError};
pub use traits::{NamedSegment, NamedSignal};

#[cfg(unix)]
pub use posix::{PosixSegment as SharedMemory, PosixSemaphore as Semaphore};
#[cfg(windows)]
pub use windows::{Win32Event as Semaphore, Win32Mapping as SharedMemory};
