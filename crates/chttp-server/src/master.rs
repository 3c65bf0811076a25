//! The master supervisor.
//!
//! Startup: create the shared fabric, bind the listening socket,
//! fork the workers. Steady state: periodic statistics snapshots and
//! zombie reaping (a dead worker is logged, not respawned; the rest
//! keep serving). Shutdown on SIGINT/SIGTERM: shut the listening
//! socket to wake blocked accepts, SIGTERM and reap every child,
//! unlink the named IPC objects.

use crate::logger::AccessLog;
use crate::signal;
use crate::worker;
use chttp_core::config::DispatchMode;
use chttp_core::constants::STATS_INTERVAL_SECS;
use chttp_core::error::{ServerResult, SocketError, WorkerError};
use chttp_core::http::{error_page, render, StatusCode};
use chttp_core::{srv_error, srv_info, srv_warn, ServerConfig};
use chttp_ipc::{IpcHandles, IpcNames, Listener, PushError, Stream, QUEUE_SHUTDOWN_SENTINEL};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Run the server until a shutdown signal. This is the whole process
/// lifetime of a deployment: Ok means a clean exit.
pub fn run(config: ServerConfig) -> ServerResult<()> {
    chttp_core::srvlog::set_role("master");
    signal::install_shutdown_handlers();
    signal::ignore_sigpipe();
    run_with_names(config, IpcNames::default())
}

/// As `run`, with explicit IPC names (tests use scoped names).
pub fn run_with_names(config: ServerConfig, names: IpcNames) -> ServerResult<()> {
    let config = Arc::new(config);
    let ipc = Arc::new(IpcHandles::create(&names, config.max_queue_size as u32)?);

    let listener = match Listener::bind(config.port) {
        Ok(listener) => Arc::new(listener),
        Err(err) => {
            IpcHandles::unlink_all(&names);
            return Err(err.into());
        }
    };

    // Queue dispatch: the master is the producer and answers 503
    // itself on overflow, so it needs its own log handle. Opened
    // before fork so a failure is a startup failure.
    let master_log = match config.dispatch_mode {
        DispatchMode::Queue => match AccessLog::open(&config.log_file) {
            Ok(log) => Some(log),
            Err(err) => {
                IpcHandles::unlink_all(&names);
                return Err(err.into());
            }
        },
        DispatchMode::Accept => None,
    };

    srv_info!(
        "listening on port {} ({:?} dispatch, {} workers x {} threads)",
        config.port,
        config.dispatch_mode,
        config.num_workers,
        config.threads_per_worker
    );

    let mut children: Vec<Pid> = Vec::with_capacity(config.num_workers);
    for worker_id in 0..config.num_workers {
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                let code = worker::worker_main(worker_id, &config, &names, Arc::clone(&listener));
                // exit() skips destructors: the child must not run the
                // master-owned region's unlinking drop
                std::process::exit(code);
            }
            Ok(ForkResult::Parent { child }) => {
                srv_info!("forked worker {} (pid {})", worker_id, child);
                children.push(child);
            }
            Err(err) => {
                srv_error!("fork failed: {}", err);
                shutdown_children(&mut children);
                IpcHandles::unlink_all(&names);
                return Err(WorkerError::ForkFailed(err as i32).into());
            }
        }
    }

    supervise(&config, &ipc, &listener, master_log.as_ref(), &mut children);

    srv_info!("shutting down");
    listener.shutdown();
    if config.dispatch_mode == DispatchMode::Queue {
        // One sentinel per consumer thread across all workers
        let sentinels = config.num_workers * config.threads_per_worker;
        for _ in 0..sentinels {
            if ipc.queue_push_blocking(QUEUE_SHUTDOWN_SENTINEL).is_err() {
                break;
            }
        }
    }
    shutdown_children(&mut children);
    ipc.stats_display();
    IpcHandles::unlink_all(&names);
    srv_info!("shutdown complete");
    Ok(())
}

fn supervise(
    config: &ServerConfig,
    ipc: &IpcHandles,
    listener: &Listener,
    master_log: Option<&AccessLog>,
    children: &mut Vec<Pid>,
) {
    let mut last_snapshot = Instant::now();
    match config.dispatch_mode {
        DispatchMode::Accept => {
            while !signal::shutdown_requested() {
                std::thread::sleep(Duration::from_secs(1));
                reap_exited(children);
                if last_snapshot.elapsed().as_secs() >= STATS_INTERVAL_SECS {
                    ipc.stats_display();
                    last_snapshot = Instant::now();
                }
            }
        }
        DispatchMode::Queue => {
            // Periodic accept timeouts keep the loop responsive to
            // the shutdown flag and the snapshot clock
            let _ = listener.set_accept_timeout(1);
            while !signal::shutdown_requested() {
                match listener.accept() {
                    Ok(stream) => {
                        if let Some(log) = master_log {
                            enqueue_connection(ipc, log, stream);
                        }
                    }
                    Err(SocketError::Timeout) => {}
                    Err(err) if err.is_interrupt() => {}
                    Err(err) => {
                        if signal::shutdown_requested() {
                            break;
                        }
                        srv_warn!("accept failed: {}", err);
                        std::thread::sleep(Duration::from_millis(10));
                    }
                }
                reap_exited(children);
                if last_snapshot.elapsed().as_secs() >= STATS_INTERVAL_SECS {
                    ipc.stats_display();
                    last_snapshot = Instant::now();
                }
            }
        }
    }
}

/// Producer side of queue dispatch. A full ring answers 503 and
/// closes; the connection is never dropped without a response.
pub fn enqueue_connection(ipc: &IpcHandles, log: &AccessLog, stream: Stream) {
    let peer = stream.peer_ip();
    let fd = stream.into_raw();
    match ipc.queue_push(fd) {
        Ok(()) => {}
        Err(PushError::Full) => {
            let stream = Stream::from_raw(fd);
            let body = error_page(StatusCode::ServiceUnavailable);
            let wire = render(
                StatusCode::ServiceUnavailable,
                "text/html",
                None,
                body.as_bytes(),
                true,
            );
            let bytes = match stream.write_all(&wire) {
                Ok(()) => wire.len() as u64,
                Err(_) => 0,
            };
            let _ = ipc.stats_update(503, bytes);
            log.log_request(ipc, &peer, "-", "-", 503, bytes);
        }
        Err(PushError::Ipc(err)) => {
            srv_warn!("enqueue failed: {}", err);
            drop(Stream::from_raw(fd));
        }
    }
}

/// SIGTERM then wait on every child, in order.
fn shutdown_children(children: &mut Vec<Pid>) {
    for child in children.iter() {
        let _ = kill(*child, Signal::SIGTERM);
    }
    for child in children.drain(..) {
        let _ = waitpid(child, None);
    }
}

/// Non-blocking reap. A worker that died stays dead; the master
/// keeps serving with the remaining ones.
fn reap_exited(children: &mut Vec<Pid>) {
    let mut i = 0;
    while i < children.len() {
        match waitpid(children[i], Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => i += 1,
            Ok(status) => {
                srv_warn!(
                    "worker pid {} exited ({:?}); continuing with remaining workers",
                    children[i],
                    status
                );
                children.remove(i);
            }
            Err(_) => {
                children.remove(i);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;
    use std::net::TcpStream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TAG: AtomicUsize = AtomicUsize::new(0);

    fn scoped() -> IpcNames {
        IpcNames::scoped(&format!(
            "master{}_{}",
            std::process::id(),
            TAG.fetch_add(1, Ordering::Relaxed)
        ))
    }

    #[test]
    fn test_enqueue_full_answers_503() {
        let names = scoped();
        let ipc = IpcHandles::create(&names, 1).expect("ipc");
        let dir = tempfile::tempdir().expect("tempdir");
        let log = AccessLog::open(&dir.path().join("access.log")).expect("log");

        let listener = Listener::bind(0).expect("bind");
        let port = listener.local_port().expect("port");

        let _first = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        let mut second = TcpStream::connect(("127.0.0.1", port)).expect("connect");

        // First fills the single slot; second overflows
        enqueue_connection(&ipc, &log, listener.accept().expect("accept"));
        enqueue_connection(&ipc, &log, listener.accept().expect("accept"));

        let mut response = String::new();
        second.read_to_string(&mut response).expect("read");
        assert!(response.starts_with("HTTP/1.1 503 Service Unavailable"));

        let view = ipc.stats_snapshot().expect("snapshot");
        assert_eq!(view.status_503, 1);
        assert_eq!(view.total_requests, 1);

        let text = std::fs::read_to_string(dir.path().join("access.log")).expect("log text");
        assert!(text.contains("\" 503 "));

        // The enqueued descriptor is still in the ring
        let fd = ipc.queue_pop().expect("pop").expect("queued fd");
        drop(Stream::from_raw(fd));
        drop(ipc);
        IpcHandles::unlink_all(&names);
    }

    #[test]
    fn test_reap_collects_exited_child() {
        let mut children = Vec::new();
        match unsafe { fork() }.expect("fork") {
            ForkResult::Child => std::process::exit(0),
            ForkResult::Parent { child } => children.push(child),
        }

        // The child exits immediately; poll until reaped
        for _ in 0..100 {
            reap_exited(&mut children);
            if children.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(children.is_empty());
    }
}
