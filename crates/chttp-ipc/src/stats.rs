//! The statistics engine.
//!
//! Every operation runs under the `stats` semaphore, so the tuple
//! (total, per-status, bytes) is jointly consistent at critical
//! section boundaries and snapshots are internally consistent.

use crate::IpcHandles;
use chttp_core::error::IpcError;
use std::sync::atomic::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

/// Value-copy of the shared statistics, taken under one lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsView {
    pub total_requests: u64,
    pub bytes_transferred: u64,
    pub total_response_time_ms: u64,
    pub start_time: u64,
    pub status_200: u32,
    pub status_201: u32,
    pub status_206: u32,
    pub status_403: u32,
    pub status_404: u32,
    pub status_500: u32,
    pub status_503: u32,
    pub active_connections: u32,
    pub uptime_secs: u64,
}

impl StatsView {
    /// Mean response time over all completed requests.
    pub fn avg_response_ms(&self) -> u64 {
        self.total_response_time_ms / self.total_requests.max(1)
    }

    /// Bytes transferred, in MiB.
    pub fn mib_transferred(&self) -> f64 {
        self.bytes_transferred as f64 / (1024.0 * 1024.0)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl IpcHandles {
    /// Count one completed request: total, status bucket, bytes out.
    pub fn stats_update(&self, status: u16, bytes: u64) -> Result<(), IpcError> {
        let _g = self.sem_stats.guard()?;
        let s = &self.state().stats;
        s.total_requests.fetch_add(1, Ordering::Relaxed);
        s.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
        match status {
            200 => s.status_200.fetch_add(1, Ordering::Relaxed),
            201 => s.status_201.fetch_add(1, Ordering::Relaxed),
            206 => s.status_206.fetch_add(1, Ordering::Relaxed),
            403 => s.status_403.fetch_add(1, Ordering::Relaxed),
            404 => s.status_404.fetch_add(1, Ordering::Relaxed),
            500 => s.status_500.fetch_add(1, Ordering::Relaxed),
            503 => s.status_503.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
        Ok(())
    }

    /// Accumulate one request's wall time.
    pub fn stats_record_latency(&self, elapsed_ms: u64) -> Result<(), IpcError> {
        let _g = self.sem_stats.guard()?;
        self.state()
            .stats
            .total_response_time_ms
            .fetch_add(elapsed_ms, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats_inc_active(&self) -> Result<(), IpcError> {
        let _g = self.sem_stats.guard()?;
        self.state()
            .stats
            .active_connections
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Saturating at zero.
    pub fn stats_dec_active(&self) -> Result<(), IpcError> {
        let _g = self.sem_stats.guard()?;
        let active = &self.state().stats.active_connections;
        let v = active.load(Ordering::Relaxed);
        if v > 0 {
            active.store(v - 1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Consistent value-copy under one critical section.
    pub fn stats_snapshot(&self) -> Result<StatsView, IpcError> {
        let _g = self.sem_stats.guard()?;
        let s = &self.state().stats;
        let start_time = s.start_time.load(Ordering::Relaxed);
        Ok(StatsView {
            total_requests: s.total_requests.load(Ordering::Relaxed),
            bytes_transferred: s.bytes_transferred.load(Ordering::Relaxed),
            total_response_time_ms: s.total_response_time_ms.load(Ordering::Relaxed),
            start_time,
            status_200: s.status_200.load(Ordering::Relaxed),
            status_201: s.status_201.load(Ordering::Relaxed),
            status_206: s.status_206.load(Ordering::Relaxed),
            status_403: s.status_403.load(Ordering::Relaxed),
            status_404: s.status_404.load(Ordering::Relaxed),
            status_500: s.status_500.load(Ordering::Relaxed),
            status_503: s.status_503.load(Ordering::Relaxed),
            active_connections: s.active_connections.load(Ordering::Relaxed),
            uptime_secs: epoch_secs().saturating_sub(start_time),
        })
    }

    /// Operator snapshot on stdout.
    pub fn stats_display(&self) {
        let view = match self.stats_snapshot() {
            Ok(view) => view,
            Err(_) => return,
        };
        println!("=== SERVER STATISTICS ===");
        println!("Uptime:             {}s", view.uptime_secs);
        println!("Active Connections: {}", view.active_connections);
        println!("Total Requests:     {}", view.total_requests);
        println!("Bytes Transferred:  {} ({:.2} MiB)", view.bytes_transferred, view.mib_transferred());
        println!("Avg Response Time:  {} ms", view.avg_response_ms());
        println!(
            "200: {} | 201: {} | 206: {} | 403: {} | 404: {} | 500: {} | 503: {}",
            view.status_200,
            view.status_201,
            view.status_206,
            view.status_403,
            view.status_404,
            view.status_500,
            view.status_503
        );
        println!("=========================");
    }

    /// Increment the active counter, returning a guard whose drop
    /// decrements it on every exit path. None when the semaphore is
    /// unusable; the connection is still served.
    pub fn active_guard(&self) -> Option<ActiveGuard<'_>> {
        match self.stats_inc_active() {
            Ok(()) => Some(ActiveGuard { ipc: self }),
            Err(_) => None,
        }
    }
}

/// Scope guard pairing `inc_active` with a guaranteed decrement.
pub struct ActiveGuard<'a> {
    ipc: &'a IpcHandles,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let _ = self.ipc.stats_dec_active();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IpcHandles, IpcNames};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    static TAG: AtomicUsize = AtomicUsize::new(0);

    fn handles() -> (IpcHandles, IpcNames) {
        let names = IpcNames::scoped(&format!(
            "s{}_{}",
            std::process::id(),
            TAG.fetch_add(1, Ordering::Relaxed)
        ));
        (IpcHandles::create(&names, 10).expect("create"), names)
    }

    #[test]
    fn test_update_buckets_sum_to_total() {
        let (ipc, names) = handles();
        ipc.stats_update(200, 100).expect("update");
        ipc.stats_update(200, 50).expect("update");
        ipc.stats_update(404, 300).expect("update");
        ipc.stats_update(500, 0).expect("update");

        let v = ipc.stats_snapshot().expect("snapshot");
        assert_eq!(v.total_requests, 4);
        assert_eq!(v.bytes_transferred, 450);
        assert_eq!(v.status_200, 2);
        assert_eq!(v.status_404, 1);
        assert_eq!(v.status_500, 1);
        let sum = (v.status_200
            + v.status_201
            + v.status_206
            + v.status_403
            + v.status_404
            + v.status_500
            + v.status_503) as u64;
        assert_eq!(sum, v.total_requests);
        drop(ipc);
        IpcHandles::unlink_all(&names);
    }

    #[test]
    fn test_dec_active_saturates() {
        let (ipc, names) = handles();
        ipc.stats_dec_active().expect("dec");
        assert_eq!(ipc.stats_snapshot().expect("snap").active_connections, 0);
        ipc.stats_inc_active().expect("inc");
        ipc.stats_dec_active().expect("dec");
        ipc.stats_dec_active().expect("dec");
        assert_eq!(ipc.stats_snapshot().expect("snap").active_connections, 0);
        drop(ipc);
        IpcHandles::unlink_all(&names);
    }

    #[test]
    fn test_active_guard_decrements_on_drop() {
        let (ipc, names) = handles();
        {
            let _g = ipc.active_guard().expect("guard");
            assert_eq!(ipc.stats_snapshot().expect("snap").active_connections, 1);
        }
        assert_eq!(ipc.stats_snapshot().expect("snap").active_connections, 0);
        drop(ipc);
        IpcHandles::unlink_all(&names);
    }

    #[test]
    fn test_latency_and_average() {
        let (ipc, names) = handles();
        ipc.stats_update(200, 10).expect("update");
        ipc.stats_update(200, 10).expect("update");
        ipc.stats_record_latency(30).expect("latency");
        ipc.stats_record_latency(50).expect("latency");
        let v = ipc.stats_snapshot().expect("snap");
        assert_eq!(v.total_response_time_ms, 80);
        assert_eq!(v.avg_response_ms(), 40);
        drop(ipc);
        IpcHandles::unlink_all(&names);
    }

    #[test]
    fn test_avg_of_no_requests_is_zero() {
        let v = StatsView::default();
        assert_eq!(v.avg_response_ms(), 0);
    }

    #[test]
    fn test_concurrent_updates() {
        let (ipc, names) = handles();
        let ipc = Arc::new(ipc);
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let ipc = Arc::clone(&ipc);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        ipc.stats_update(200, 10).expect("update");
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().expect("join");
        }
        let v = ipc.stats_snapshot().expect("snap");
        assert_eq!(v.total_requests, 400);
        assert_eq!(v.status_200, 400);
        assert_eq!(v.bytes_transferred, 4000);
        drop(ipc);
        IpcHandles::unlink_all(&names);
    }
}
