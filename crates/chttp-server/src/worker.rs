//! Worker process runtime.
//!
//! A worker attaches to the shared fabric by name, builds its own
//! cache and log sink, and runs the connection thread pool. The
//! runtime itself is fork-free; `worker_main` is the thin entry
//! point the master runs in each forked child, and tests drive
//! `WorkerRuntime` directly in-process.

use crate::pipeline::{handle_connection, ServeContext};
use crate::signal;
use crate::thread_pool::ThreadPool;
use crate::{cache::FileCache, logger::AccessLog};
use chttp_core::config::DispatchMode;
use chttp_core::error::ServerResult;
use chttp_core::{srv_debug, srv_error, srv_info, srv_warn, ServerConfig};
use chttp_ipc::{IpcHandles, IpcNames, Listener, Stream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A running worker: context plus its thread pool.
pub struct WorkerRuntime {
    pool: ThreadPool,
    listener: Arc<Listener>,
    ctx: Arc<ServeContext>,
}

impl WorkerRuntime {
    /// Build the per-worker state and start the pool.
    pub fn start(
        config: Arc<ServerConfig>,
        ipc: Arc<IpcHandles>,
        listener: Arc<Listener>,
    ) -> ServerResult<Self> {
        let cache = Arc::new(FileCache::new(config.cache_size_bytes()));
        let access_log = Arc::new(AccessLog::open(&config.log_file)?);
        let ctx = Arc::new(ServeContext {
            config: Arc::clone(&config),
            cache,
            access_log,
            ipc,
        });

        let pool = match config.dispatch_mode {
            DispatchMode::Accept => {
                let ctx = Arc::clone(&ctx);
                let listener = Arc::clone(&listener);
                ThreadPool::start(config.threads_per_worker, "chttpd-conn", move |id, flag| {
                    accept_loop(&ctx, &listener, id, flag)
                })?
            }
            DispatchMode::Queue => {
                let ctx = Arc::clone(&ctx);
                ThreadPool::start(config.threads_per_worker, "chttpd-conn", move |id, flag| {
                    consume_loop(&ctx, id, flag)
                })?
            }
        };

        Ok(Self { pool, listener, ctx })
    }

    /// Shared state, for inspection by tests and the dashboard.
    pub fn context(&self) -> &Arc<ServeContext> {
        &self.ctx
    }

    pub fn threads(&self) -> usize {
        self.pool.len()
    }

    /// Stop the pool and wait for every thread.
    ///
    /// In queue dispatch the consumers additionally need one shutdown
    /// sentinel each in the ring; the master (or test harness) pushes
    /// them, since only it knows the total consumer count across all
    /// worker processes.
    pub fn shutdown(self) {
        self.pool.shutdown();
        self.listener.shutdown();
        self.pool.join();
    }
}

/// Accept fan-out loop: every thread blocks in accept on the shared
/// descriptor and the kernel picks a winner per connection.
fn accept_loop(ctx: &ServeContext, listener: &Listener, id: usize, shutdown: &AtomicBool) {
    chttp_core::srvlog::set_role(&format!("t{}", id));
    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        match listener.accept() {
            Ok(stream) => {
                let _ = ctx.ipc.queue_record_dispatch();
                handle_connection(ctx, &stream);
                let _ = ctx.ipc.queue_record_complete();
            }
            Err(err) if err.is_interrupt() => continue,
            Err(err) => {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                srv_debug!("accept failed: {}", err);
                // Listener may be mid-shutdown; don't spin
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

/// Queue-consumer loop: pop descriptors the master enqueued.
fn consume_loop(ctx: &ServeContext, id: usize, shutdown: &AtomicBool) {
    chttp_core::srvlog::set_role(&format!("t{}", id));
    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        match ctx.ipc.queue_pop() {
            Ok(Some(fd)) => {
                let stream = Stream::from_raw(fd);
                handle_connection(ctx, &stream);
            }
            Ok(None) => break, // shutdown sentinel
            Err(err) => {
                srv_warn!("queue pop failed: {}", err);
                break;
            }
        }
    }
}

/// Entry point of a forked worker process. Returns the exit code.
pub fn worker_main(
    worker_id: usize,
    config: &ServerConfig,
    names: &IpcNames,
    listener: Arc<Listener>,
) -> i32 {
    chttp_core::srvlog::set_role(&format!("w{}", worker_id));
    signal::install_shutdown_handlers();
    signal::ignore_sigpipe();

    let ipc = match IpcHandles::open(names) {
        Ok(ipc) => Arc::new(ipc),
        Err(err) => {
            srv_error!("cannot attach to shared state: {}", err);
            return 1;
        }
    };

    let runtime = match WorkerRuntime::start(Arc::new(config.clone()), ipc, listener) {
        Ok(runtime) => runtime,
        Err(err) => {
            srv_error!("cannot start worker runtime: {}", err);
            return 1;
        }
    };

    srv_info!(
        "worker {} serving with {} threads",
        worker_id,
        runtime.threads()
    );

    while !signal::shutdown_requested() {
        std::thread::sleep(Duration::from_millis(100));
    }

    srv_info!("worker {} shutting down", worker_id);
    runtime.shutdown();
    0
}
