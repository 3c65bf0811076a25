//! Access-log sink.
//!
//! One Apache Combined line per completed request:
//! `<ip> - - [<dd/Mon/yyyy:HH:MM:SS ±zzzz>] "<method> <path> HTTP/1.1" <status> <bytes>`
//!
//! Writes happen under the process-shared `log` semaphore and the
//! file handle is flushed before the semaphore is released, so lines
//! from different threads and workers never interleave.

use chrono::Local;
use chttp_core::error::WorkerError;
use chttp_ipc::IpcHandles;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Append-mode handle on the access log.
pub struct AccessLog {
    file: File,
}

impl AccessLog {
    /// Open (creating if absent) in append mode.
    pub fn open(path: &Path) -> Result<Self, WorkerError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(|file| Self { file })
            .map_err(|e| WorkerError::LogOpen(e.raw_os_error().unwrap_or(-1)))
    }

    /// Append one request line. Formatting happens outside the
    /// critical section; only the write+flush holds the semaphore.
    /// Log I/O failures are swallowed: the request was already
    /// served and diagnostics must not take the connection down.
    pub fn log_request(
        &self,
        ipc: &IpcHandles,
        client_ip: &str,
        method: &str,
        path: &str,
        status: u16,
        bytes: u64,
    ) {
        let timestamp = Local::now().format("%d/%b/%Y:%H:%M:%S %z");
        let line = format!(
            "{} - - [{}] \"{} {} HTTP/1.1\" {} {}\n",
            client_ip, timestamp, method, path, status, bytes
        );

        let Ok(_guard) = ipc.sem_log.guard() else {
            return;
        };
        let mut file = &self.file;
        let _ = file.write_all(line.as_bytes());
        let _ = file.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chttp_ipc::{IpcHandles, IpcNames};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    static TAG: AtomicUsize = AtomicUsize::new(0);

    fn ipc() -> (IpcHandles, IpcNames) {
        let names = IpcNames::scoped(&format!(
            "log{}_{}",
            std::process::id(),
            TAG.fetch_add(1, Ordering::Relaxed)
        ));
        (IpcHandles::create(&names, 4).expect("create"), names)
    }

    #[test]
    fn test_line_format() {
        let (ipc, names) = ipc();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("access.log");
        let log = AccessLog::open(&path).expect("open");

        log.log_request(&ipc, "10.0.0.7", "GET", "/index.html", 200, 1234);

        let text = std::fs::read_to_string(&path).expect("read");
        let line = text.lines().next().expect("one line");
        assert!(line.starts_with("10.0.0.7 - - ["));
        assert!(line.contains("] \"GET /index.html HTTP/1.1\" 200 1234"));
        // Timestamp carries a numeric zone offset
        assert!(line.contains('+') || line.contains('-'));
        drop(ipc);
        IpcHandles::unlink_all(&names);
    }

    #[test]
    fn test_append_across_opens() {
        let (ipc, names) = ipc();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("access.log");

        AccessLog::open(&path)
            .expect("open")
            .log_request(&ipc, "1.1.1.1", "GET", "/a", 200, 1);
        AccessLog::open(&path)
            .expect("reopen")
            .log_request(&ipc, "2.2.2.2", "GET", "/b", 404, 2);

        let text = std::fs::read_to_string(&path).expect("read");
        assert_eq!(text.lines().count(), 2);
        drop(ipc);
        IpcHandles::unlink_all(&names);
    }

    #[test]
    fn test_concurrent_lines_not_interleaved() {
        let (ipc, names) = ipc();
        let ipc = Arc::new(ipc);
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("access.log");
        let log = Arc::new(AccessLog::open(&path).expect("open"));

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let log = Arc::clone(&log);
                let ipc = Arc::clone(&ipc);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        log.log_request(&ipc, "127.0.0.1", "GET", &format!("/t{}/{}", t, i), 200, 10);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().expect("join");
        }

        let text = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 200);
        for line in lines {
            assert!(line.starts_with("127.0.0.1 - - ["), "bad line: {}", line);
            assert!(line.ends_with(" 200 10"), "bad line: {}", line);
        }
        drop(log);
        IpcHandles::unlink_all(&names);
    }
}
