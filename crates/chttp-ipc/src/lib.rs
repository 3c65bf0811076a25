//! # chttp-ipc
//!
//! The inter-process fabric of chttpd: a POSIX shared-memory region
//! holding the aggregate statistics and the bounded connection ring,
//! five named semaphores coordinating access to them, and thin
//! raw-fd wrappers for the listening and accepted sockets.
//!
//! The master creates every object; workers attach by name after
//! fork. Only the master unlinks on shutdown.
//!
//! ## Modules
//!
//! - `shm` - the `#[repr(C)]` shared region and its mapping lifecycle
//! - `sem` - named semaphores with RAII guards
//! - `queue` - bounded FIFO of accepted descriptors + rate telemetry
//! - `stats` - statistics engine over the shared region
//! - `socket` - listener and connection streams over raw fds

pub mod queue;
pub mod sem;
pub mod shm;
pub mod socket;
pub mod stats;

pub use queue::{PushError, QUEUE_SHUTDOWN_SENTINEL};
pub use sem::{NamedSem, SemGuard};
pub use shm::{ConnectionQueue, SharedRegion, SharedState, SharedStats};
pub use socket::{Listener, Stream};
pub use stats::{ActiveGuard, StatsView};

use chttp_core::constants::{
    SEM_EMPTY_NAME, SEM_FULL_NAME, SEM_LOG_NAME, SEM_MUTEX_NAME, SEM_STATS_NAME, SHM_NAME,
};
use chttp_core::error::IpcError;
use std::sync::atomic::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

/// Last errno as i32.
#[inline]
pub(crate) fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(-1)
}

/// Names of every IPC object the server touches.
#[derive(Debug, Clone)]
pub struct IpcNames {
    pub shm: String,
    pub mutex: String,
    pub empty: String,
    pub full: String,
    pub stats: String,
    pub log: String,
}

impl Default for IpcNames {
    fn default() -> Self {
        Self {
            shm: SHM_NAME.to_string(),
            mutex: SEM_MUTEX_NAME.to_string(),
            empty: SEM_EMPTY_NAME.to_string(),
            full: SEM_FULL_NAME.to_string(),
            stats: SEM_STATS_NAME.to_string(),
            log: SEM_LOG_NAME.to_string(),
        }
    }
}

impl IpcNames {
    /// Names suffixed with a tag, so parallel test runs never collide
    /// on the system-global namespace.
    pub fn scoped(tag: &str) -> Self {
        Self {
            shm: format!("{}_{}", SHM_NAME, tag),
            mutex: format!("{}_{}", SEM_MUTEX_NAME, tag),
            empty: format!("{}_{}", SEM_EMPTY_NAME, tag),
            full: format!("{}_{}", SEM_FULL_NAME, tag),
            stats: format!("{}_{}", SEM_STATS_NAME, tag),
            log: format!("{}_{}", SEM_LOG_NAME, tag),
        }
    }
}

/// Per-process handles on the shared fabric.
pub struct IpcHandles {
    pub region: SharedRegion,
    pub sem_queue: NamedSem,
    pub sem_empty: NamedSem,
    pub sem_full: NamedSem,
    pub sem_stats: NamedSem,
    pub sem_log: NamedSem,
}

impl IpcHandles {
    /// Master path: create and initialize every object. A failure
    /// partway through unlinks whatever was already created.
    pub fn create(names: &IpcNames, queue_max: u32) -> Result<Self, IpcError> {
        // Clear leftovers from an unclean previous run
        Self::unlink_all(names);

        let region = SharedRegion::create(&names.shm)?;
        let sems: Result<_, IpcError> = (|| {
            Ok((
                NamedSem::create(&names.mutex, 1)?,
                NamedSem::create(&names.empty, queue_max)?,
                NamedSem::create(&names.full, 0)?,
                NamedSem::create(&names.stats, 1)?,
                NamedSem::create(&names.log, 1)?,
            ))
        })();

        let (sem_queue, sem_empty, sem_full, sem_stats, sem_log) = match sems {
            Ok(sems) => sems,
            Err(err) => {
                // region's Drop unlinks the shm object it owns
                Self::unlink_all(names);
                return Err(err);
            }
        };

        let state = region.state();
        state.queue.max.store(queue_max, Ordering::Relaxed);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        state.stats.start_time.store(now, Ordering::Relaxed);

        Ok(Self {
            region,
            sem_queue,
            sem_empty,
            sem_full,
            sem_stats,
            sem_log,
        })
    }

    /// Worker path: attach to the existing objects by name.
    pub fn open(names: &IpcNames) -> Result<Self, IpcError> {
        Ok(Self {
            region: SharedRegion::attach(&names.shm)?,
            sem_queue: NamedSem::open(&names.mutex)?,
            sem_empty: NamedSem::open(&names.empty)?,
            sem_full: NamedSem::open(&names.full)?,
            sem_stats: NamedSem::open(&names.stats)?,
            sem_log: NamedSem::open(&names.log)?,
        })
    }

    /// Remove every named object from the system. Absent objects are
    /// not an error; this runs both before create and at shutdown.
    pub fn unlink_all(names: &IpcNames) {
        SharedRegion::unlink(&names.shm);
        NamedSem::unlink(&names.mutex);
        NamedSem::unlink(&names.empty);
        NamedSem::unlink(&names.full);
        NamedSem::unlink(&names.stats);
        NamedSem::unlink(&names.log);
    }

    /// The shared state this process has mapped.
    #[inline]
    pub fn state(&self) -> &SharedState {
        self.region.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    static TAG: AtomicUsize = AtomicUsize::new(0);

    fn tag() -> String {
        format!(
            "lib{}_{}",
            std::process::id(),
            TAG.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn test_create_then_open() {
        let names = IpcNames::scoped(&tag());
        let master = IpcHandles::create(&names, 10).expect("create");
        assert_eq!(master.state().queue.max.load(Ordering::Relaxed), 10);
        assert!(master.state().stats.start_time.load(Ordering::Relaxed) > 0);

        let worker = IpcHandles::open(&names).expect("open");
        worker
            .state()
            .stats
            .total_requests
            .store(7, Ordering::Relaxed);
        assert_eq!(master.state().stats.total_requests.load(Ordering::Relaxed), 7);

        drop(worker);
        drop(master);
        IpcHandles::unlink_all(&names);
    }

    #[test]
    fn test_open_without_create_fails() {
        let names = IpcNames::scoped(&tag());
        assert!(IpcHandles::open(&names).is_err());
    }

    #[test]
    fn test_scoped_names_differ() {
        let a = IpcNames::scoped("a");
        let b = IpcNames::scoped("b");
        assert_ne!(a.shm, b.shm);
        assert_ne!(a.stats, b.stats);
        assert!(a.shm.starts_with('/'));
    }
}
