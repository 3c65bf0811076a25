//! Error types for the server

use core::fmt;

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Top-level error, one variant per subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Configuration loading or validation failed
    Config(ConfigError),

    /// Shared memory or semaphore operation failed
    Ipc(IpcError),

    /// Socket operation failed
    Socket(SocketError),

    /// Request could not be parsed
    Http(HttpError),

    /// Worker process or thread failure
    Worker(WorkerError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Config(e) => write!(f, "config error: {}", e),
            ServerError::Ipc(e) => write!(f, "ipc error: {}", e),
            ServerError::Socket(e) => write!(f, "socket error: {}", e),
            ServerError::Http(e) => write!(f, "http error: {}", e),
            ServerError::Worker(e) => write!(f, "worker error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration file could not be read
    Read(String),

    /// A recognized key carries a value outside its valid range
    InvalidValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read(path) => write!(f, "cannot read '{}'", path),
            ConfigError::InvalidValue(msg) => write!(f, "invalid value: {}", msg),
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(e: ConfigError) -> Self {
        ServerError::Config(e)
    }
}

/// Shared memory / named semaphore errors, with the failing errno
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcError {
    /// shm_open with O_CREAT failed
    ShmCreate(i32),

    /// shm_open on an existing object failed
    ShmAttach(i32),

    /// ftruncate of the shared region failed
    ShmSize(i32),

    /// mmap of the shared region failed
    ShmMap(i32),

    /// sem_open with O_CREAT failed
    SemCreate(i32),

    /// sem_open on an existing semaphore failed
    SemOpen(i32),

    /// sem_wait / sem_trywait failed
    SemWait(i32),

    /// sem_post failed
    SemPost(i32),
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpcError::ShmCreate(e) => write!(f, "shm create failed (errno {})", e),
            IpcError::ShmAttach(e) => write!(f, "shm attach failed (errno {})", e),
            IpcError::ShmSize(e) => write!(f, "shm resize failed (errno {})", e),
            IpcError::ShmMap(e) => write!(f, "shm map failed (errno {})", e),
            IpcError::SemCreate(e) => write!(f, "semaphore create failed (errno {})", e),
            IpcError::SemOpen(e) => write!(f, "semaphore open failed (errno {})", e),
            IpcError::SemWait(e) => write!(f, "semaphore wait failed (errno {})", e),
            IpcError::SemPost(e) => write!(f, "semaphore post failed (errno {})", e),
        }
    }
}

impl From<IpcError> for ServerError {
    fn from(e: IpcError) -> Self {
        ServerError::Ipc(e)
    }
}

/// Socket errors, with the failing errno
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketError {
    Create(i32),
    Bind { port: u16, errno: i32 },
    Listen(i32),
    Accept(i32),
    SockOpt(i32),
    Name(i32),
    Read(i32),
    Write(i32),

    /// SO_RCVTIMEO expired without a complete request
    Timeout,

    /// Peer went away (EPIPE / ECONNRESET)
    Closed,
}

impl SocketError {
    /// True when the operation was interrupted by a signal and the
    /// caller should re-check the shutdown flag before retrying.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, SocketError::Accept(e) if *e == 4 /* EINTR */)
    }
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketError::Create(e) => write!(f, "socket create failed (errno {})", e),
            SocketError::Bind { port, errno } => {
                write!(f, "bind to port {} failed (errno {})", port, errno)
            }
            SocketError::Listen(e) => write!(f, "listen failed (errno {})", e),
            SocketError::Accept(e) => write!(f, "accept failed (errno {})", e),
            SocketError::SockOpt(e) => write!(f, "setsockopt failed (errno {})", e),
            SocketError::Name(e) => write!(f, "getsockname failed (errno {})", e),
            SocketError::Read(e) => write!(f, "read failed (errno {})", e),
            SocketError::Write(e) => write!(f, "write failed (errno {})", e),
            SocketError::Timeout => write!(f, "receive timed out"),
            SocketError::Closed => write!(f, "connection closed by peer"),
        }
    }
}

impl From<SocketError> for ServerError {
    fn from(e: SocketError) -> Self {
        ServerError::Socket(e)
    }
}

/// Request parsing errors. Every variant surfaces as a 500 per the
/// error taxonomy; they are distinct for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// Request line is not exactly three CRLF-terminated tokens
    MalformedRequestLine,

    /// Method is none of GET/HEAD/POST/PUT
    UnsupportedMethod,

    /// Header block is not valid UTF-8
    InvalidEncoding,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::MalformedRequestLine => write!(f, "malformed request line"),
            HttpError::UnsupportedMethod => write!(f, "unsupported method"),
            HttpError::InvalidEncoding => write!(f, "request is not valid UTF-8"),
        }
    }
}

impl From<HttpError> for ServerError {
    fn from(e: HttpError) -> Self {
        ServerError::Http(e)
    }
}

/// Worker process / thread errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Failed to spawn a pool thread
    SpawnFailed,

    /// fork() failed
    ForkFailed(i32),

    /// Access log could not be opened
    LogOpen(i32),
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::SpawnFailed => write!(f, "failed to spawn pool thread"),
            WorkerError::ForkFailed(e) => write!(f, "fork failed (errno {})", e),
            WorkerError::LogOpen(e) => write!(f, "cannot open access log (errno {})", e),
        }
    }
}

impl From<WorkerError> for ServerError {
    fn from(e: WorkerError) -> Self {
        ServerError::Worker(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = ServerError::Ipc(IpcError::SemCreate(13));
        assert_eq!(format!("{}", e), "ipc error: semaphore create failed (errno 13)");

        let e = ServerError::Http(HttpError::MalformedRequestLine);
        assert_eq!(format!("{}", e), "http error: malformed request line");
    }

    #[test]
    fn test_error_conversion() {
        let sock = SocketError::Bind { port: 80, errno: 13 };
        let err: ServerError = sock.into();
        assert!(matches!(err, ServerError::Socket(SocketError::Bind { port: 80, errno: 13 })));
    }

    #[test]
    fn test_accept_interrupt() {
        assert!(SocketError::Accept(4).is_interrupt());
        assert!(!SocketError::Accept(22).is_interrupt());
        assert!(!SocketError::Timeout.is_interrupt());
    }
}
