use std::ffi::{CStr, CString};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, SysError};
use crate::name;
use crate::traits::{NamedSegment, NamedSignal};

/// Permission bits for every object this module creates.
const OBJECT_MODE: libc::mode_t = libc::S_IRUSR | libc::S_IWUSR;

fn c_name(name: &str) -> Result<CString> {
    name::validate(name)?;
    CString::new(name::os_name(name)).map_err(|_| SysError::InvalidName {
        name: name.to_string(),
        reason: "name must not contain NUL",
    })
}

fn is_errno(err: &io::Error, errno: i32) -> bool {
    err.raw_os_error() == Some(errno)
}

/// POSIX named semaphore (`sem_open`).
pub struct PosixSemaphore {
    sem: NonNull<libc::sem_t>,
    name: String,
    os_name: CString,
    owner: bool,
}

// SAFETY: sem_post/sem_wait are async-signal-safe and thread-safe; the handle
// is only closed from Drop, which requires exclusive ownership.
unsafe impl Send for PosixSemaphore {}
unsafe impl Sync for PosixSemaphore {}

impl PosixSemaphore {
    fn from_raw(sem: NonNull<libc::sem_t>, name: &str, os_name: CString, owner: bool) -> Self {
        Self {
            sem,
            name: name.to_string(),
            os_name,
            owner,
        }
    }

    fn wait_forever(&self) -> Result<()> {
        loop {
            // SAFETY: `self.sem` is a live semaphore returned by sem_open.
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if is_errno(&err, libc::EINTR) {
                continue;
            }
            return Err(SysError::WaitFailed {
                name: self.name.clone(),
                source: err,
            });
        }
    }

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = realtime_deadline(timeout);
        loop {
            // SAFETY: `self.sem` is live and `deadline` is a valid timespec.
            if unsafe { libc::sem_timedwait(self.sem.as_ptr(), &deadline) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if is_errno(&err, libc::EINTR) {
                continue;
            }
            if is_errno(&err, libc::ETIMEDOUT) {
                return Err(SysError::TimedOut {
                    name: self.name.clone(),
                    timeout,
                });
            }
            return Err(SysError::WaitFailed {
                name: self.name.clone(),
                source: err,
            });
        }
    }

    /// Apple has no `sem_timedwait`; poll `sem_trywait` until the deadline.
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        const POLL_INTERVAL: Duration = Duration::from_millis(1);

        let Some(deadline) = std::time::Instant::now().checked_add(timeout) else {
            return self.wait_forever();
        };
        loop {
            // SAFETY: `self.sem` is a live semaphore returned by sem_open.
            if unsafe { libc::sem_trywait(self.sem.as_ptr()) } == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if is_errno(&err, libc::EINTR) {
                continue;
            }
            if !is_errno(&err, libc::EAGAIN) {
                return Err(SysError::WaitFailed {
                    name: self.name.clone(),
                    source: err,
                });
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return Err(SysError::TimedOut {
                    name: self.name.clone(),
                    timeout,
                });
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

/// Absolute `CLOCK_REALTIME` deadline `timeout` from now, as `sem_timedwait` wants.
#[cfg(not(any(target_os = "macos", target_os = "ios")))]
fn realtime_deadline(timeout: Duration) -> libc::timespec {
    const NANOS_PER_SEC: i64 = 1_000_000_000;

    // SAFETY: timespec is plain old data; all-zero is a valid value.
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    // SAFETY: `ts` is a valid, writable timespec.
    unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut ts) };

    let secs = timeout.as_secs().min(i32::MAX as u64) as i64;
    let mut sec = (ts.tv_sec as i64).saturating_add(secs);
    let mut nsec = ts.tv_nsec as i64 + i64::from(timeout.subsec_nanos());
    if nsec >= NANOS_PER_SEC {
        sec = sec.saturating_add(1);
        nsec -= NANOS_PER_SEC;
    }
    ts.tv_sec = sec as libc::time_t;
    ts.tv_nsec = nsec as _;
    ts
}

impl NamedSignal for PosixSemaphore {
    fn create(name: &str) -> Result<Self> {
        let os_name = c_name(name)?;
        // SAFETY: `os_name` is NUL-terminated; variadic mode/value are promoted to c_uint.
        let sem = unsafe {
            libc::sem_open(
                os_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                OBJECT_MODE as libc::c_uint,
                0 as libc::c_uint,
            )
        };
        let sem = match NonNull::new(sem) {
            Some(sem) if sem.as_ptr() != libc::SEM_FAILED => sem,
            _ => {
                let err = io::Error::last_os_error();
                if is_errno(&err, libc::EEXIST) {
                    return Err(SysError::AlreadyExists {
                        name: name.to_string(),
                    });
                }
                return Err(SysError::CreateFailed {
                    name: name.to_string(),
                    source: err,
                });
            }
        };
        info!(name, "created named semaphore");
        Ok(Self::from_raw(sem, name, os_name, true))
    }

    fn open(name: &str) -> Result<Self> {
        let os_name = c_name(name)?;
        // SAFETY: `os_name` is NUL-terminated; no O_CREAT so no variadic args.
        let sem = unsafe { libc::sem_open(os_name.as_ptr(), 0) };
        let Some(sem) = NonNull::new(sem).filter(|sem| sem.as_ptr() != libc::SEM_FAILED) else {
            return Err(SysError::OpenFailed {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        };
        debug!(name, "opened named semaphore");
        Ok(Self::from_raw(sem, name, os_name, false))
    }

    fn notify(&self) -> Result<()> {
        // SAFETY: `self.sem` is a live semaphore returned by sem_open.
        if unsafe { libc::sem_post(self.sem.as_ptr()) } != 0 {
            return Err(SysError::NotifyFailed {
                name: self.name.clone(),
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<()> {
        match timeout {
            None => self.wait_forever(),
            Some(timeout) => self.wait_timeout(timeout),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_owner(&self) -> bool {
        self.owner
    }

    fn remove(name: &str) -> Result<bool> {
        let os_name = c_name(name)?;
        // SAFETY: `os_name` is NUL-terminated.
        if unsafe { libc::sem_unlink(os_name.as_ptr()) } == 0 {
            info!(name, "removed stale semaphore");
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if is_errno(&err, libc::ENOENT) {
            return Ok(false);
        }
        Err(SysError::OpenFailed {
            name: name.to_string(),
            source: err,
        })
    }
}

impl Drop for PosixSemaphore {
    fn drop(&mut self) {
        // SAFETY: `self.sem` came from sem_open and is closed exactly once here.
        unsafe {
            libc::sem_close(self.sem.as_ptr());
        }
        if self.owner {
            // SAFETY: `os_name` is NUL-terminated.
            if unsafe { libc::sem_unlink(self.os_name.as_ptr()) } != 0 {
                warn!(
                    name = %self.name,
                    error = %io::Error::last_os_error(),
                    "failed to unlink semaphore"
                );
            }
        }
        debug!(name = %self.name, owner = self.owner, "released named semaphore");
    }
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
unsafe fn shm_open(name: &CStr, oflag: libc::c_int, mode: libc::mode_t) -> libc::c_int {
    // SAFETY: Forwarded from the caller.
    unsafe { libc::shm_open(name.as_ptr(), oflag, mode) }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
unsafe fn shm_open(name: &CStr, oflag: libc::c_int, mode: libc::mode_t) -> libc::c_int {
    // SAFETY: Forwarded from the caller; Apple declares shm_open variadic.
    unsafe { libc::shm_open(name.as_ptr(), oflag, mode as libc::c_uint) }
}

/// Unlinks a freshly created segment name unless disarmed.
struct PendingUnlink<'a> {
    name: &'a CStr,
    armed: bool,
}

impl PendingUnlink<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingUnlink<'_> {
    fn drop(&mut self) {
        if self.armed {
            // SAFETY: `name` is NUL-terminated.
            unsafe {
                libc::shm_unlink(self.name.as_ptr());
            }
        }
    }
}

fn map_shared(fd: &OwnedFd, len: usize) -> io::Result<NonNull<u8>> {
    // SAFETY: `fd` is an open shm descriptor at least `len` bytes long.
    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd.as_raw_fd(),
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(addr.cast::<u8>()).ok_or_else(|| io::Error::other("mmap returned null"))
}

/// POSIX shared memory object (`shm_open` + `mmap`).
pub struct PosixSegment {
    addr: NonNull<u8>,
    len: usize,
    name: String,
    os_name: CString,
    owner: bool,
}

// SAFETY: The mapping is process-wide; access goes through &self/&mut self.
unsafe impl Send for PosixSegment {}

impl NamedSegment for PosixSegment {
    fn create(name: &str, size: usize) -> Result<Self> {
        let os_name = c_name(name)?;
        if size == 0 {
            return Err(SysError::InvalidSize(size));
        }

        // SAFETY: `os_name` is NUL-terminated.
        let raw = unsafe {
            shm_open(
                &os_name,
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                OBJECT_MODE,
            )
        };
        if raw < 0 {
            let err = io::Error::last_os_error();
            if is_errno(&err, libc::EEXIST) {
                return Err(SysError::AlreadyExists {
                    name: name.to_string(),
                });
            }
            return Err(SysError::CreateFailed {
                name: name.to_string(),
                source: err,
            });
        }
        // SAFETY: `raw` is a fresh descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        let pending = PendingUnlink {
            name: &os_name,
            armed: true,
        };

        // SAFETY: `fd` is open for writing.
        if unsafe { libc::ftruncate(fd.as_raw_fd(), size as libc::off_t) } != 0 {
            return Err(SysError::CreateFailed {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }

        let addr = map_shared(&fd, size).map_err(|source| SysError::MapFailed {
            name: name.to_string(),
            source,
        })?;
        pending.disarm();

        info!(name, size, "created shared segment");
        Ok(Self {
            addr,
            len: size,
            name: name.to_string(),
            os_name,
            owner: true,
        })
    }

    fn open(name: &str, size: usize) -> Result<Self> {
        let os_name = c_name(name)?;
        if size == 0 {
            return Err(SysError::InvalidSize(size));
        }

        // SAFETY: `os_name` is NUL-terminated.
        let raw = unsafe { shm_open(&os_name, libc::O_RDWR, 0) };
        if raw < 0 {
            return Err(SysError::OpenFailed {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        // SAFETY: `raw` is a fresh descriptor owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        // Touching pages past the end of the object raises SIGBUS, so refuse
        // to map more than the creator allocated.
        // SAFETY: stat is plain old data; all-zero is a valid value.
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        // SAFETY: `fd` is open and `stat` is writable.
        if unsafe { libc::fstat(fd.as_raw_fd(), &mut stat) } != 0 {
            return Err(SysError::OpenFailed {
                name: name.to_string(),
                source: io::Error::last_os_error(),
            });
        }
        let actual = stat.st_size as usize;
        if actual < size {
            return Err(SysError::OpenFailed {
                name: name.to_string(),
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("segment is {actual} bytes, {size} requested"),
                ),
            });
        }

        let addr = map_shared(&fd, size).map_err(|source| SysError::MapFailed {
            name: name.to_string(),
            source,
        })?;

        debug!(name, size, "opened shared segment");
        Ok(Self {
            addr,
            len: size,
            name: name.to_string(),
            os_name,
            owner: false,
        })
    }

    fn len(&self) -> usize {
        self.len
    }

    fn as_ptr(&self) -> *mut u8 {
        self.addr.as_ptr()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_owner(&self) -> bool {
        self.owner
    }

    fn remove(name: &str) -> Result<bool> {
        let os_name = c_name(name)?;
        // SAFETY: `os_name` is NUL-terminated.
        if unsafe { libc::shm_unlink(os_name.as_ptr()) } == 0 {
            info!(name, "removed stale shared segment");
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if is_errno(&err, libc::ENOENT) {
            return Ok(false);
        }
        Err(SysError::OpenFailed {
            name: name.to_string(),
            source: err,
        })
    }
}

impl Drop for PosixSegment {
    fn drop(&mut self) {
        // SAFETY: `addr`/`len` describe a mapping created by map_shared.
        unsafe {
            libc::munmap(self.addr.as_ptr().cast(), self.len);
        }
        if self.owner {
            // SAFETY: `os_name` is NUL-terminated.
            if unsafe { libc::shm_unlink(self.os_name.as_ptr()) } != 0 {
                warn!(
                    name = %self.name,
                    error = %io::Error::last_os_error(),
                    "failed to unlink shared segment"
                );
            }
        }
        debug!(name = %self.name, owner = self.owner, "released shared segment");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    use super::*;
    use crate::error::ErrorKind;

    fn unique(tag: &str) -> String {
        static NEXT: AtomicU32 = AtomicU32::new(0);
        format!(
            "is-{tag}-{:x}-{:x}",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn segment_create_then_open_shares_bytes() {
        let name = unique("seg");
        let mut server = PosixSegment::create(&name, 64).expect("segment should be created");
        assert!(server.is_owner());
        assert_eq!(server.len(), 64);

        let client = PosixSegment::open(&name, 64).expect("segment should open");
        assert!(!client.is_owner());

        server.write(b"hello").expect("write should fit");
        let mut buf = [0u8; 5];
        assert_eq!(client.read(&mut buf), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn segment_create_twice_is_already_exists() {
        let name = unique("dup");
        let _first = PosixSegment::create(&name, 32).expect("first create should succeed");
        let err = PosixSegment::create(&name, 32)
            .err()
            .expect("second create should fail");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        // The failed attempt must not unlink the live segment.
        assert!(PosixSegment::open(&name, 32).is_ok());
    }

    #[test]
    fn segment_rejects_zero_size() {
        let err = PosixSegment::create(&unique("zero"), 0).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidSize);
    }

    #[test]
    fn segment_open_missing_fails() {
        let err = PosixSegment::open(&unique("missing"), 16).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::OpenFailed);
    }

    #[test]
    fn segment_open_larger_than_backing_object_fails() {
        let name = unique("short");
        let _server = PosixSegment::create(&name, 16).unwrap();
        let err = PosixSegment::open(&name, 4096).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::OpenFailed);
    }

    #[test]
    fn segment_write_zero_fills_previous_message() {
        let name = unique("zfill");
        let mut seg = PosixSegment::create(&name, 16).unwrap();
        seg.write(b"a much longer..").unwrap();
        seg.write(b"ok").unwrap();

        let mut buf = [0xFFu8; 16];
        seg.read(&mut buf);
        assert_eq!(&buf[..2], b"ok");
        assert!(buf[2..].iter().all(|b| *b == 0));
    }

    #[test]
    fn segment_oversized_write_is_rejected_without_side_effects() {
        let name = unique("big");
        let mut seg = PosixSegment::create(&name, 4).unwrap();
        seg.write(b"abc").unwrap();

        let err = seg.write(b"abcde").unwrap_err();
        assert!(matches!(err, SysError::TooBig { len: 5, max: 4 }));

        let mut buf = [0u8; 4];
        seg.read(&mut buf);
        assert_eq!(&buf, b"abc\0");
    }

    #[test]
    fn segment_release_unlinks_name() {
        let name = unique("rel");
        let seg = PosixSegment::create(&name, 8).unwrap();
        seg.release();
        assert!(PosixSegment::open(&name, 8).is_err());
        let _again = PosixSegment::create(&name, 8).expect("name should be free again");
    }

    #[test]
    fn semaphore_starts_unsignaled() {
        let sem = PosixSemaphore::create(&unique("sem")).unwrap();
        let err = sem.wait(Some(Duration::from_millis(20))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn semaphore_notify_wakes_opened_handle() {
        let name = unique("wake");
        let owner = PosixSemaphore::create(&name).unwrap();
        let opened = PosixSemaphore::open(&name).unwrap();
        assert!(!opened.is_owner());

        let waiter = std::thread::spawn(move || opened.wait(Some(Duration::from_secs(5))));
        owner.notify().unwrap();
        waiter
            .join()
            .expect("waiter thread should finish")
            .expect("wait should observe the notify");
    }

    #[test]
    fn semaphore_create_twice_is_already_exists() {
        let name = unique("sdup");
        let _first = PosixSemaphore::create(&name).unwrap();
        let err = PosixSemaphore::create(&name).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn semaphore_open_missing_fails() {
        let err = PosixSemaphore::open(&unique("nosem")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::OpenFailed);
    }

    #[test]
    fn semaphore_timed_wait_honors_deadline() {
        let sem = PosixSemaphore::create(&unique("dl")).unwrap();
        let timeout = Duration::from_millis(60);
        let start = Instant::now();
        assert!(sem.wait(Some(timeout)).unwrap_err().is_timeout());
        let elapsed = start.elapsed();
        assert!(elapsed >= timeout, "returned early after {elapsed:?}");
        assert!(elapsed < timeout + Duration::from_secs(1));
    }

    #[test]
    fn remove_cleans_up_leaked_names() {
        let name = unique("stale");
        std::mem::forget(PosixSemaphore::create(&name).unwrap());
        std::mem::forget(PosixSegment::create(&name, 8).unwrap());

        assert!(PosixSemaphore::remove(&name).unwrap());
        assert!(PosixSegment::remove(&name).unwrap());
        assert!(!PosixSemaphore::remove(&name).unwrap());
        assert!(!PosixSegment::remove(&name).unwrap());
    }
}
