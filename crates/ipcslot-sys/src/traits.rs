use std::time::Duration;

use crate::error::Result;

/// A named, cross-process binary signal.
///
/// POSIX backs this with a named semaphore, Windows with an auto-reset event.
/// A freshly created signal is not signaled. Dropping the value closes the
/// handle; the creating side also removes the name from the system namespace.
pub trait NamedSignal: Sized + Send {
    /// Create a new signal. Fails with `AlreadyExists` if the name is live.
    fn create(name: &str) -> Result<Self>;

    /// Open a signal created by another handle or process.
    fn open(name: &str) -> Result<Self>;

    /// Set the signal, waking at most one waiter.
    fn notify(&self) -> Result<()>;

    /// Block until the signal is set. `None` waits forever.
    fn wait(&self, timeout: Option<Duration>) -> Result<()>;

    /// Name as passed to `create`/`open`.
    fn name(&self) -> &str;

    /// Whether this handle created the object (and unlinks it on release).
    fn is_owner(&self) -> bool;

    /// Remove a stale name left behind by a process that did not release it.
    ///
    /// Returns `Ok(false)` when nothing was there to remove.
    fn remove(name: &str) -> Result<bool>;

    /// Release the handle now instead of at end of scope.
    fn release(self) {
        drop(self);
    }
}

/// A named block of memory shared between processes, fixed in size.
pub trait NamedSegment: Sized + Send {
    /// Create and map a new segment of exactly `size` bytes.
    fn create(name: &str, size: usize) -> Result<Self>;

    /// Map an existing segment. Both sides must agree on `size`.
    fn open(name: &str, size: usize) -> Result<Self>;

    /// Mapped length in bytes.
    fn len(&self) -> usize;

    /// Segments are never empty; provided for clippy's sake.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Base address of the mapping.
    fn as_ptr(&self) -> *mut u8;

    fn name(&self) -> &str;

    fn is_owner(&self) -> bool;

    /// Remove a stale name. Returns `Ok(false)` when nothing was there.
    fn remove(name: &str) -> Result<bool>;

    /// Zero the whole segment, then copy `data` to its start.
    ///
    /// A reader that observes the matching signal never sees bytes left over
    /// from an earlier, longer message.
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let max = self.len();
        if data.len() > max {
            return Err(crate::error::SysError::TooBig {
                len: data.len(),
                max,
            });
        }
        // SAFETY: The mapping is `max` bytes long and stays mapped while `self`
        // lives; `data` is a separate allocation so the ranges cannot overlap.
        unsafe {
            std::ptr::write_bytes(self.as_ptr(), 0, max);
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.as_ptr(), data.len());
        }
        Ok(())
    }

    /// Copy up to `out.len()` bytes (bounded by the segment size) into `out`.
    ///
    /// Returns the number of bytes copied.
    fn read(&self, out: &mut [u8]) -> usize {
        let len = out.len().min(self.len());
        // SAFETY: `len` is within both the mapping and `out`.
        unsafe {
            std::ptr::copy_nonoverlapping(self.as_ptr(), out.as_mut_ptr(), len);
        }
        len
    }

    /// Borrow the mapped bytes.
    ///
    /// # Safety
    /// The peer process must not write the segment while the slice is alive.
    /// The request/reply protocol guarantees this between a received signal
    /// and the matching reply signal.
    unsafe fn as_slice(&self) -> &[u8] {
        // SAFETY: Mapping is valid for `len()` bytes; exclusivity is the caller's contract.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len()) }
    }

    fn release(self) {
        drop(self);
    }
}
