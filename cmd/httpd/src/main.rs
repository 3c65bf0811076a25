//! # chttpd
//!
//! Concurrent HTTP/1.1 static-file server: one master process, a
//! configurable number of forked workers, a thread pool per worker
//! over one shared listening socket.
//!
//! Reads `server.conf` from the working directory (override with
//! `CHTTPD_CONF`). Exits 0 on clean shutdown, 1 on startup failure.
//! SIGINT and SIGTERM shut down gracefully.

use chttp_core::{env_get_str, srv_error, ServerConfig};
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    chttp_core::srvlog::init();
    chttp_core::srvlog::set_role("master");

    let conf_path = env_get_str("CHTTPD_CONF", "server.conf");
    let config = match ServerConfig::load(Path::new(&conf_path)) {
        Ok(config) => config,
        Err(err) => {
            srv_error!("cannot load '{}': {}", conf_path, err);
            eprintln!("chttpd: check that the configuration file exists and is readable");
            return ExitCode::from(1);
        }
    };
    config.print();

    match chttp_server::master::run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            srv_error!("fatal: {}", err);
            ExitCode::from(1)
        }
    }
}
