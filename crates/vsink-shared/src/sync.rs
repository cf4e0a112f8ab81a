// Process-shared POSIX semaphores stored inside the mapping.
//
// `nix` does not wrap unnamed semaphores, so these go straight to libc.

use std::cell::UnsafeCell;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::time::TimeSpec;
use nix::time::{clock_gettime, ClockId};

/// Initialise a semaphore shared between processes.
pub(crate) fn init(sem: &UnsafeCell<libc::sem_t>, value: u32) -> nix::Result<()> {
    // SAFETY: `sem` points into a live, writable mapping owned by the caller.
    let ret = unsafe { libc::sem_init(sem.get(), 1, value) };
    Errno::result(ret).map(drop)
}

/// Block until the count is positive, then decrement it. Retries on `EINTR`.
pub(crate) fn wait(sem: &UnsafeCell<libc::sem_t>) -> nix::Result<()> {
    loop {
        // SAFETY: `sem` was initialised by the producer with `sem_init`.
        let ret = unsafe { libc::sem_wait(sem.get()) };
        match Errno::result(ret) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Like [`wait`], giving up after `timeout`. Returns `false` on timeout.
pub(crate) fn wait_timeout(sem: &UnsafeCell<libc::sem_t>, timeout: Duration) -> nix::Result<bool> {
    let deadline = clock_gettime(ClockId::CLOCK_REALTIME)? + TimeSpec::from_duration(timeout);
    loop {
        // SAFETY: `sem` was initialised by the producer with `sem_init`.
        let ret = unsafe { libc::sem_timedwait(sem.get(), deadline.as_ref()) };
        match Errno::result(ret) {
            Ok(_) => return Ok(true),
            Err(Errno::EINTR) => continue,
            Err(Errno::ETIMEDOUT) => return Ok(false),
            Err(e) => return Err(e),
        }
    }
}

/// Decrement without blocking. Returns `false` when the count is zero.
pub(crate) fn try_wait(sem: &UnsafeCell<libc::sem_t>) -> nix::Result<bool> {
    loop {
        // SAFETY: `sem` was initialised by the producer with `sem_init`.
        let ret = unsafe { libc::sem_trywait(sem.get()) };
        match Errno::result(ret) {
            Ok(_) => return Ok(true),
            Err(Errno::EINTR) => continue,
            Err(Errno::EAGAIN) => return Ok(false),
            Err(e) => return Err(e),
        }
    }
}

pub(crate) fn post(sem: &UnsafeCell<libc::sem_t>) -> nix::Result<()> {
    // SAFETY: `sem` was initialised by the producer with `sem_init`.
    let ret = unsafe { libc::sem_post(sem.get()) };
    Errno::result(ret).map(drop)
}

/// Current semaphore count.
pub(crate) fn value(sem: &UnsafeCell<libc::sem_t>) -> nix::Result<i32> {
    let mut value: libc::c_int = 0;
    // SAFETY: `sem` was initialised by the producer with `sem_init`.
    let ret = unsafe { libc::sem_getvalue(sem.get(), &mut value) };
    Errno::result(ret).map(|_| value)
}

/// Scoped hold on a binary semaphore used as a mutex.
///
/// The semaphore is posted back when the guard is dropped, on every exit path.
pub(crate) struct SemGuard<'a> {
    sem: &'a UnsafeCell<libc::sem_t>,
}

impl<'a> SemGuard<'a> {
    pub(crate) fn lock(sem: &'a UnsafeCell<libc::sem_t>) -> nix::Result<Self> {
        wait(sem)?;
        Ok(Self { sem })
    }
}

impl Drop for SemGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = post(self.sem) {
            tracing::error!("SHM mutex@{:p} unlock failed: {e}", self.sem.get());
        }
    }
}
