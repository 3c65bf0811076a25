//! Connection thread pool.
//!
//! N named threads all running the same closure. There is no task
//! queue; each thread's work is implicit in its accept (or dequeue)
//! loop, and shutdown is a shared flag the loops observe between
//! iterations once their blocking call is interrupted.

use chttp_core::error::WorkerError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Pool of connection threads.
pub struct ThreadPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl ThreadPool {
    /// Spawn `count` threads each running `f(index, shutdown_flag)`.
    /// A spawn failure tears down the threads already started.
    pub fn start<F>(count: usize, name_prefix: &str, f: F) -> Result<Self, WorkerError>
    where
        F: Fn(usize, &AtomicBool) + Send + Sync + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let f = Arc::new(f);
        let mut handles = Vec::with_capacity(count);

        for i in 0..count {
            let f = Arc::clone(&f);
            let flag = Arc::clone(&shutdown);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", name_prefix, i))
                .spawn(move || f(i, &flag));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(_) => {
                    shutdown.store(true, Ordering::Release);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(WorkerError::SpawnFailed);
                }
            }
        }

        Ok(Self { handles, shutdown })
    }

    /// Signal shutdown; loops observe it on their next iteration.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every thread to finish.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_all_threads_run() {
        let ran = Arc::new(AtomicUsize::new(0));
        let pool = {
            let ran = Arc::clone(&ran);
            ThreadPool::start(4, "test", move |_, _| {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .expect("start")
        };
        assert_eq!(pool.len(), 4);
        pool.join();
        assert_eq!(ran.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_shutdown_observed_by_loops() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let pool = {
            let iterations = Arc::clone(&iterations);
            ThreadPool::start(2, "test", move |_, shutdown| {
                while !shutdown.load(Ordering::Acquire) {
                    iterations.fetch_add(1, Ordering::Relaxed);
                    thread::sleep(Duration::from_millis(1));
                }
            })
            .expect("start")
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!pool.is_shutdown());
        pool.shutdown();
        assert!(pool.is_shutdown());
        pool.join();
        assert!(iterations.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_thread_index_passed() {
        let seen = Arc::new(AtomicUsize::new(0));
        let pool = {
            let seen = Arc::clone(&seen);
            ThreadPool::start(3, "test", move |id, _| {
                seen.fetch_add(id, Ordering::SeqCst);
            })
            .expect("start")
        };
        pool.join();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
