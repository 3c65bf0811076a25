//! The shared-memory region.
//!
//! One `#[repr(C)]` block mapped into every process: aggregate
//! statistics plus the bounded connection ring. The layout holds
//! only atomics and fixed-size arrays, no pointers, so the mapping
//! is position-independent across address spaces. Joint consistency
//! of compound updates comes from the named semaphores, not from the
//! atomics themselves.

use crate::errno;
use chttp_core::constants::QUEUE_CAPACITY;
use chttp_core::error::IpcError;
use std::ffi::CString;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64};

/// Process-wide request statistics. Mutated only under the `stats`
/// semaphore so multi-field updates are observed whole.
#[repr(C)]
pub struct SharedStats {
    pub total_requests: AtomicU64,
    pub bytes_transferred: AtomicU64,
    pub total_response_time_ms: AtomicU64,
    /// Wall clock at master startup, epoch seconds
    pub start_time: AtomicU64,
    pub status_200: AtomicU32,
    pub status_201: AtomicU32,
    pub status_206: AtomicU32,
    pub status_403: AtomicU32,
    pub status_404: AtomicU32,
    pub status_500: AtomicU32,
    pub status_503: AtomicU32,
    pub active_connections: AtomicU32,
}

/// Bounded ring of accepted descriptors plus rate telemetry.
/// `count` tracks ring occupancy in queue-dispatch mode; the totals
/// and `peak_depth` are maintained in both dispatch modes.
#[repr(C)]
pub struct ConnectionQueue {
    pub slots: [AtomicI32; QUEUE_CAPACITY],
    pub head: AtomicU32,
    pub tail: AtomicU32,
    pub count: AtomicU32,
    /// Configured bound (<= QUEUE_CAPACITY), set once by the master
    pub max: AtomicU32,
    pub peak_depth: AtomicU32,
    pub total_enqueued: AtomicU64,
    pub total_dequeued: AtomicU64,
}

/// Everything the processes share.
#[repr(C)]
pub struct SharedState {
    pub queue: ConnectionQueue,
    pub stats: SharedStats,
}

/// A mapping of the shared region. The creating process owns the
/// named object and unlinks it on drop; attachers only unmap.
pub struct SharedRegion {
    ptr: *mut SharedState,
    name: CString,
    owner: bool,
}

// The region is plain atomics; any thread of any process may touch it.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Create, size and map the named object. Fails if it already
    /// exists; the caller unlinks stale objects first.
    pub fn create(name: &str) -> Result<Self, IpcError> {
        let cname = CString::new(name).map_err(|_| IpcError::ShmCreate(libc::EINVAL))?;

        let fd = unsafe {
            libc::shm_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o666,
            )
        };
        if fd < 0 {
            return Err(IpcError::ShmCreate(errno()));
        }

        let size = std::mem::size_of::<SharedState>();
        if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
            let e = errno();
            unsafe {
                libc::close(fd);
                libc::shm_unlink(cname.as_ptr());
            }
            return Err(IpcError::ShmSize(e));
        }

        let ptr = Self::map(fd, size);
        unsafe { libc::close(fd) };
        match ptr {
            Ok(ptr) => Ok(Self {
                ptr,
                name: cname,
                owner: true,
            }),
            Err(e) => {
                unsafe { libc::shm_unlink(cname.as_ptr()) };
                Err(e)
            }
        }
        // ftruncate delivered zero pages: every counter starts at 0
    }

    /// Map an existing object (worker side).
    pub fn attach(name: &str) -> Result<Self, IpcError> {
        let cname = CString::new(name).map_err(|_| IpcError::ShmAttach(libc::EINVAL))?;

        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0o666) };
        if fd < 0 {
            return Err(IpcError::ShmAttach(errno()));
        }

        let ptr = Self::map(fd, std::mem::size_of::<SharedState>());
        unsafe { libc::close(fd) };
        Ok(Self {
            ptr: ptr?,
            name: cname,
            owner: false,
        })
    }

    fn map(fd: i32, size: usize) -> Result<*mut SharedState, IpcError> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(IpcError::ShmMap(errno()));
        }
        Ok(ptr as *mut SharedState)
    }

    /// Remove the named object. Absence is not an error.
    pub fn unlink(name: &str) {
        if let Ok(cname) = CString::new(name) {
            unsafe { libc::shm_unlink(cname.as_ptr()) };
        }
    }

    #[inline]
    pub fn state(&self) -> &SharedState {
        unsafe { &*self.ptr }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(
                self.ptr as *mut libc::c_void,
                std::mem::size_of::<SharedState>(),
            );
            if self.owner {
                libc::shm_unlink(self.name.as_ptr());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TAG: AtomicUsize = AtomicUsize::new(0);

    fn name(prefix: &str) -> String {
        format!(
            "/chttpd_test_{}_{}_{}",
            prefix,
            std::process::id(),
            TAG.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn test_create_starts_zeroed() {
        let n = name("zero");
        let region = SharedRegion::create(&n).expect("create");
        let state = region.state();
        assert_eq!(state.stats.total_requests.load(Ordering::Relaxed), 0);
        assert_eq!(state.queue.head.load(Ordering::Relaxed), 0);
        assert_eq!(state.queue.count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_attach_sees_writes() {
        let n = name("attach");
        let region = SharedRegion::create(&n).expect("create");
        region
            .state()
            .stats
            .bytes_transferred
            .store(4096, Ordering::Relaxed);

        let other = SharedRegion::attach(&n).expect("attach");
        assert_eq!(
            other.state().stats.bytes_transferred.load(Ordering::Relaxed),
            4096
        );
    }

    #[test]
    fn test_owner_unlinks_on_drop() {
        let n = name("drop");
        drop(SharedRegion::create(&n).expect("create"));
        assert!(SharedRegion::attach(&n).is_err());
    }

    #[test]
    fn test_create_refuses_existing() {
        let n = name("dup");
        let _region = SharedRegion::create(&n).expect("create");
        assert!(matches!(
            SharedRegion::create(&n),
            Err(IpcError::ShmCreate(_))
        ));
    }
}
