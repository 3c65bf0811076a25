//! # chttp-core
//!
//! Core types for the chttpd concurrent HTTP server.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! The shared-memory fabric and raw sockets live in `chttp-ipc`; the
//! server itself (cache, pipeline, master/worker) lives in `chttp-server`.
//!
//! ## Modules
//!
//! - `config` - server configuration (`server.conf` loader)
//! - `constants` - domain constants and IPC object names
//! - `error` - error types
//! - `http` - request parsing, response emission, MIME table
//! - `srvlog` - leveled stderr diagnostics macros
//! - `env` - environment variable utilities

pub mod config;
pub mod constants;
pub mod env;
pub mod error;
pub mod http;
pub mod srvlog;

// Re-exports for convenience
pub use config::{DispatchMode, ServerConfig, VirtualHost};
pub use env::{env_get, env_get_bool, env_get_str};
pub use error::{
    ConfigError, HttpError, IpcError, ServerError, ServerResult, SocketError, WorkerError,
};
pub use http::{mime_for_path, Method, RangeSpec, Request, StatusCode};
