//! Domain constants shared across the server crates.

/// Receive buffer per connection. One buffered read, no pipelining.
pub const RECV_BUF_SIZE: usize = 4096;

/// Receive timeout on accepted sockets, in seconds.
pub const RECV_TIMEOUT_SECS: u64 = 5;

/// Listen backlog.
pub const LISTEN_BACKLOG: i32 = 128;

/// Largest file the cache will hold per entry (1 MiB).
pub const MAX_CACHE_ENTRY_BYTES: usize = 1024 * 1024;

/// Fixed entry-table capacity of the file cache.
pub const MAX_CACHE_ENTRIES: usize = 100;

/// Largest POST/PUT body echoed back.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Capacity of the connection ring in shared memory. The configured
/// `MAX_QUEUE_SIZE` is clamped to this.
pub const QUEUE_CAPACITY: usize = 100;

/// Seconds between master statistics snapshots.
pub const STATS_INTERVAL_SECS: u64 = 30;

/// Server token sent on every response.
pub const SERVER_TOKEN: &str = "ConcurrentHTTP/1.0";

/// Meta-refresh interval of the `/stats` dashboard, in seconds.
pub const DASHBOARD_REFRESH_SECS: u64 = 2;

/// Shared memory object name.
pub const SHM_NAME: &str = "/concurrent_http_shm";

/// Named semaphore: queue mutual exclusion.
pub const SEM_MUTEX_NAME: &str = "/concurrent_http_mutex";

/// Named semaphore: free queue slots (counting, initial = queue max).
pub const SEM_EMPTY_NAME: &str = "/concurrent_http_empty";

/// Named semaphore: filled queue slots (counting, initial = 0).
pub const SEM_FULL_NAME: &str = "/concurrent_http_full";

/// Named semaphore: statistics critical section.
pub const SEM_STATS_NAME: &str = "/concurrent_http_stats";

/// Named semaphore: access-log critical section.
pub const SEM_LOG_NAME: &str = "/concurrent_http_log";
