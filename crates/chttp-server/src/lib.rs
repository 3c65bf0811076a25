//! # chttp-server
//!
//! The server proper: a master process that binds the listening
//! socket, creates the shared-memory fabric and forks workers; worker
//! processes that attach by name and multiplex a pool of connection
//! threads over the inherited socket; and the per-connection HTTP
//! pipeline with its byte-budgeted LRU file cache.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        master                            │
//! │   bind socket · create shm + semaphores · fork · reap    │
//! └──────────────────────────────────────────────────────────┘
//!                │ fork                       │ fork
//!                ▼                            ▼
//! ┌───────────────────────────┐  ┌───────────────────────────┐
//! │         worker 0          │  │         worker N          │
//! │  cache · log · N threads  │  │  cache · log · N threads  │
//! └───────────────────────────┘  └───────────────────────────┘
//!                │ accept (kernel fan-out)    │
//!                ▼                            ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │          shared listening socket · shared memory         │
//! │        stats + connection ring, named semaphores         │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `cache` - per-worker LRU file cache
//! - `logger` - access-log sink (Apache Combined)
//! - `pipeline` - per-connection request handling
//! - `dashboard` - the `/stats` HTML page
//! - `thread_pool` - connection thread pool
//! - `signal` - process shutdown flag and handlers
//! - `worker` - worker runtime and fork entry point
//! - `master` - supervisor

pub mod cache;
pub mod dashboard;
pub mod logger;
pub mod master;
pub mod pipeline;
pub mod signal;
pub mod thread_pool;
pub mod worker;

pub use cache::FileCache;
pub use logger::AccessLog;
pub use pipeline::{handle_connection, ServeContext};
pub use thread_pool::ThreadPool;
pub use worker::{worker_main, WorkerRuntime};
