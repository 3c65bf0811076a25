//! The bounded connection queue.
//!
//! Classical producer/consumer discipline over the shared ring:
//! producers `try_wait(empty)` then mutate under `mutex` and
//! `post(full)`; consumers mirror it. A full ring is surfaced to the
//! producer; connections are never dropped silently.
//!
//! In the default accept fan-out dispatch the ring carries no
//! descriptors; `record_dispatch`/`record_complete` keep the rate
//! telemetry (totals, peak in-flight depth) alive out-of-band.

use crate::IpcHandles;
use chttp_core::constants::QUEUE_CAPACITY;
use chttp_core::error::IpcError;
use core::fmt;
use std::os::unix::io::RawFd;
use std::sync::atomic::Ordering;

/// Sentinel descriptor pushed once per consumer to end the pop loop.
pub const QUEUE_SHUTDOWN_SENTINEL: RawFd = -1;

/// Producer-side failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// Every slot is occupied; the caller answers 503.
    Full,
    Ipc(IpcError),
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full => write!(f, "connection queue full"),
            PushError::Ipc(e) => write!(f, "{}", e),
        }
    }
}

impl From<IpcError> for PushError {
    fn from(e: IpcError) -> Self {
        PushError::Ipc(e)
    }
}

impl IpcHandles {
    /// Enqueue an accepted descriptor; `Err(Full)` when no slot frees
    /// up immediately.
    pub fn queue_push(&self, fd: RawFd) -> Result<(), PushError> {
        if !self.sem_empty.try_wait()? {
            return Err(PushError::Full);
        }
        self.enqueue_slot(fd)?;
        Ok(())
    }

    /// Enqueue, blocking for a free slot. Used for the shutdown
    /// sentinels, which must reach every consumer.
    pub fn queue_push_blocking(&self, fd: RawFd) -> Result<(), IpcError> {
        self.sem_empty.wait()?;
        self.enqueue_slot(fd)
    }

    fn enqueue_slot(&self, fd: RawFd) -> Result<(), IpcError> {
        {
            let _g = self.sem_queue.guard()?;
            let q = &self.state().queue;
            let tail = q.tail.load(Ordering::Relaxed) as usize;
            q.slots[tail].store(fd, Ordering::Relaxed);
            q.tail
                .store(((tail + 1) % QUEUE_CAPACITY) as u32, Ordering::Relaxed);
            let depth = q.count.load(Ordering::Relaxed) + 1;
            q.count.store(depth, Ordering::Relaxed);
            if fd >= 0 {
                q.total_enqueued.fetch_add(1, Ordering::Relaxed);
                if depth > q.peak_depth.load(Ordering::Relaxed) {
                    q.peak_depth.store(depth, Ordering::Relaxed);
                }
            }
        }
        self.sem_full.post()
    }

    /// Dequeue the next descriptor, blocking until one arrives.
    /// `Ok(None)` on the shutdown sentinel.
    pub fn queue_pop(&self) -> Result<Option<RawFd>, IpcError> {
        self.sem_full.wait()?;
        let fd = {
            let _g = self.sem_queue.guard()?;
            let q = &self.state().queue;
            let head = q.head.load(Ordering::Relaxed) as usize;
            let fd = q.slots[head].load(Ordering::Relaxed);
            q.head
                .store(((head + 1) % QUEUE_CAPACITY) as u32, Ordering::Relaxed);
            let count = q.count.load(Ordering::Relaxed);
            q.count.store(count.saturating_sub(1), Ordering::Relaxed);
            if fd >= 0 {
                q.total_dequeued.fetch_add(1, Ordering::Relaxed);
            }
            fd
        };
        self.sem_empty.post()?;
        if fd < 0 {
            Ok(None)
        } else {
            Ok(Some(fd))
        }
    }

    /// Fan-out telemetry: a thread took a connection off the kernel.
    pub fn queue_record_dispatch(&self) -> Result<(), IpcError> {
        let _g = self.sem_queue.guard()?;
        let q = &self.state().queue;
        let enq = q.total_enqueued.fetch_add(1, Ordering::Relaxed) + 1;
        let deq = q.total_dequeued.load(Ordering::Relaxed);
        let depth = enq.saturating_sub(deq) as u32;
        if depth > q.peak_depth.load(Ordering::Relaxed) {
            q.peak_depth.store(depth, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Fan-out telemetry: the connection's handling finished.
    pub fn queue_record_complete(&self) -> Result<(), IpcError> {
        let _g = self.sem_queue.guard()?;
        self.state()
            .queue
            .total_dequeued
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
