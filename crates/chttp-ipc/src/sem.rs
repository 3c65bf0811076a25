//! Named POSIX semaphores.
//!
//! The five semaphores (`mutex`, `empty`, `full`, `stats`, `log`) are
//! created by the master with their classical initial values and
//! opened by name in every worker. `wait` retries EINTR; everything
//! else surfaces as a typed error with the errno attached.

use crate::errno;
use chttp_core::error::IpcError;
use std::ffi::CString;

/// An open handle on a named semaphore. Closing (drop) does not
/// remove the name; only `unlink` does.
pub struct NamedSem {
    sem: *mut libc::sem_t,
}

// sem_t operations are process- and thread-safe by contract.
unsafe impl Send for NamedSem {}
unsafe impl Sync for NamedSem {}

impl NamedSem {
    /// Create with an initial value, replacing any stale object of
    /// the same name from an unclean shutdown.
    pub fn create(name: &str, initial: u32) -> Result<Self, IpcError> {
        let cname = CString::new(name).map_err(|_| IpcError::SemCreate(libc::EINVAL))?;
        unsafe { libc::sem_unlink(cname.as_ptr()) };

        let sem = unsafe {
            libc::sem_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o666 as libc::c_uint,
                initial as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(IpcError::SemCreate(errno()));
        }
        Ok(Self { sem })
    }

    /// Open an existing semaphore by name (worker side).
    pub fn open(name: &str) -> Result<Self, IpcError> {
        let cname = CString::new(name).map_err(|_| IpcError::SemOpen(libc::EINVAL))?;
        let sem = unsafe { libc::sem_open(cname.as_ptr(), 0) };
        if sem == libc::SEM_FAILED {
            return Err(IpcError::SemOpen(errno()));
        }
        Ok(Self { sem })
    }

    /// Block until the semaphore can be decremented.
    pub fn wait(&self) -> Result<(), IpcError> {
        loop {
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(());
            }
            let e = errno();
            if e == libc::EINTR {
                continue;
            }
            return Err(IpcError::SemWait(e));
        }
    }

    /// Decrement without blocking. Ok(false) when the value is zero.
    pub fn try_wait(&self) -> Result<bool, IpcError> {
        loop {
            if unsafe { libc::sem_trywait(self.sem) } == 0 {
                return Ok(true);
            }
            match errno() {
                libc::EINTR => continue,
                libc::EAGAIN => return Ok(false),
                e => return Err(IpcError::SemWait(e)),
            }
        }
    }

    pub fn post(&self) -> Result<(), IpcError> {
        if unsafe { libc::sem_post(self.sem) } == 0 {
            Ok(())
        } else {
            Err(IpcError::SemPost(errno()))
        }
    }

    /// Wait, returning a guard that posts on drop. The critical
    /// section is the guard's lifetime.
    pub fn guard(&self) -> Result<SemGuard<'_>, IpcError> {
        self.wait()?;
        Ok(SemGuard { sem: self })
    }

    /// Remove the name from the system. Absence is not an error.
    pub fn unlink(name: &str) {
        if let Ok(cname) = CString::new(name) {
            unsafe { libc::sem_unlink(cname.as_ptr()) };
        }
    }
}

impl Drop for NamedSem {
    fn drop(&mut self) {
        unsafe { libc::sem_close(self.sem) };
    }
}

/// RAII critical section over a binary semaphore.
pub struct SemGuard<'a> {
    sem: &'a NamedSem,
}

impl Drop for SemGuard<'_> {
    fn drop(&mut self) {
        let _ = self.sem.post();
    }
}
