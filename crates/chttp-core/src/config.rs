//! Server configuration
//!
//! Loaded once at startup from a flat `KEY=VALUE` file (`server.conf`)
//! and immutable afterwards. `#`-prefixed lines and blank lines are
//! ignored, as are unrecognized keys.
//!
//! Recognized keys: `PORT`, `NUM_WORKERS`, `THREADS_PER_WORKER`,
//! `DOCUMENT_ROOT`, `MAX_QUEUE_SIZE`, `LOG_FILE`, `CACHE_SIZE_MB`,
//! `TIMEOUT_SECONDS`, `DISPATCH_MODE`, plus `VHOST_<alias>=<root>`
//! lines that populate the virtual-host table.

use crate::constants::QUEUE_CAPACITY;
use crate::error::ConfigError;
use crate::srv_warn;
use std::path::{Path, PathBuf};

/// How accepted connections reach the pipeline threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// All pool threads block in accept() on the shared listening
    /// socket; the kernel distributes connections. Default.
    Accept,

    /// The master accepts and enqueues into the shared ring; pool
    /// threads dequeue. A full ring answers 503.
    Queue,
}

/// One virtual-host mapping: Host header alias to document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualHost {
    pub alias: String,
    pub root: PathBuf,
}

/// Immutable server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP listen port, all interfaces
    pub port: u16,
    /// Worker processes to fork
    pub num_workers: usize,
    /// Pool threads per worker
    pub threads_per_worker: usize,
    /// Default document root
    pub document_root: PathBuf,
    /// Bound of the shared connection ring
    pub max_queue_size: usize,
    /// Access log path, opened in append mode
    pub log_file: PathBuf,
    /// Per-worker cache budget in MiB
    pub cache_size_mb: usize,
    /// Reserved for future keep-alive handling; parsed and carried
    pub timeout_seconds: u64,
    /// Connection dispatch design
    pub dispatch_mode: DispatchMode,
    /// Host-header overrides of the document root
    pub vhosts: Vec<VirtualHost>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            num_workers: 4,
            threads_per_worker: 10,
            document_root: PathBuf::from("/var/www/html"),
            max_queue_size: 100,
            log_file: PathBuf::from("access.log"),
            cache_size_mb: 10,
            timeout_seconds: 30,
            dispatch_mode: DispatchMode::Accept,
            vhosts: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load from a `KEY=VALUE` file, applying defaults for absent keys
    /// and clamping out-of-range counts to their minimums.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::Read(path.display().to_string()))?;

        let mut config = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            config.apply(key.trim(), value.trim());
        }

        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "PORT" => {
                if let Ok(v) = value.parse() {
                    self.port = v;
                }
            }
            "NUM_WORKERS" => {
                if let Ok(v) = value.parse() {
                    self.num_workers = v;
                }
            }
            "THREADS_PER_WORKER" => {
                if let Ok(v) = value.parse() {
                    self.threads_per_worker = v;
                }
            }
            "DOCUMENT_ROOT" => self.document_root = PathBuf::from(value),
            "MAX_QUEUE_SIZE" => {
                if let Ok(v) = value.parse() {
                    self.max_queue_size = v;
                }
            }
            "LOG_FILE" => self.log_file = PathBuf::from(value),
            "CACHE_SIZE_MB" => {
                if let Ok(v) = value.parse() {
                    self.cache_size_mb = v;
                }
            }
            "TIMEOUT_SECONDS" => {
                if let Ok(v) = value.parse() {
                    self.timeout_seconds = v;
                }
            }
            "DISPATCH_MODE" => {
                self.dispatch_mode = match value.to_lowercase().as_str() {
                    "queue" => DispatchMode::Queue,
                    _ => DispatchMode::Accept,
                };
            }
            _ => {
                if let Some(alias) = key.strip_prefix("VHOST_") {
                    if !alias.is_empty() && !value.is_empty() {
                        self.vhosts.push(VirtualHost {
                            alias: alias.to_lowercase(),
                            root: PathBuf::from(value),
                        });
                    }
                }
                // Unknown keys ignored
            }
        }
    }

    /// Clamp counts the downstream code cannot tolerate at zero.
    fn normalize(&mut self) {
        if self.num_workers == 0 {
            srv_warn!("NUM_WORKERS=0 clamped to 1");
            self.num_workers = 1;
        }
        if self.threads_per_worker == 0 {
            srv_warn!("THREADS_PER_WORKER=0 clamped to 1");
            self.threads_per_worker = 1;
        }
        if self.max_queue_size == 0 {
            srv_warn!("MAX_QUEUE_SIZE=0 clamped to 1");
            self.max_queue_size = 1;
        }
        if self.max_queue_size > QUEUE_CAPACITY {
            srv_warn!("MAX_QUEUE_SIZE={} clamped to ring capacity {}", self.max_queue_size, QUEUE_CAPACITY);
            self.max_queue_size = QUEUE_CAPACITY;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("PORT must be 1-65535"));
        }
        if self.document_root.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue("DOCUMENT_ROOT must not be empty"));
        }
        if self.log_file.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue("LOG_FILE must not be empty"));
        }
        Ok(())
    }

    /// Cache byte budget.
    pub fn cache_size_bytes(&self) -> usize {
        self.cache_size_mb * 1024 * 1024
    }

    /// Document root for a request, honoring the virtual-host table.
    /// The Host value is matched case-insensitively, port stripped.
    pub fn resolve_root(&self, host: Option<&str>) -> &Path {
        if let Some(host) = host {
            let name = host.split(':').next().unwrap_or(host).to_lowercase();
            for vhost in &self.vhosts {
                if vhost.alias == name {
                    return &vhost.root;
                }
            }
        }
        &self.document_root
    }

    /// Echo the loaded configuration (startup feedback).
    pub fn print(&self) {
        eprintln!("chttpd configuration:");
        eprintln!("  port:               {}", self.port);
        eprintln!("  num_workers:        {}", self.num_workers);
        eprintln!("  threads_per_worker: {}", self.threads_per_worker);
        eprintln!("  document_root:      {}", self.document_root.display());
        eprintln!("  max_queue_size:     {}", self.max_queue_size);
        eprintln!("  log_file:           {}", self.log_file.display());
        eprintln!("  cache_size_mb:      {}", self.cache_size_mb);
        eprintln!("  timeout_seconds:    {}", self.timeout_seconds);
        eprintln!("  dispatch_mode:      {:?}", self.dispatch_mode);
        for vhost in &self.vhosts {
            eprintln!("  vhost:              {} -> {}", vhost.alias, vhost.root.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_conf(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("temp conf");
        f.write_all(body.as_bytes()).expect("write conf");
        f
    }

    #[test]
    fn test_defaults() {
        let c = ServerConfig::default();
        assert_eq!(c.port, 8080);
        assert_eq!(c.num_workers, 4);
        assert_eq!(c.threads_per_worker, 10);
        assert_eq!(c.document_root, PathBuf::from("/var/www/html"));
        assert_eq!(c.max_queue_size, 100);
        assert_eq!(c.log_file, PathBuf::from("access.log"));
        assert_eq!(c.cache_size_mb, 10);
        assert_eq!(c.timeout_seconds, 30);
        assert_eq!(c.dispatch_mode, DispatchMode::Accept);
    }

    #[test]
    fn test_load_full() {
        let f = write_conf(
            "# test config\n\
             PORT=9090\n\
             NUM_WORKERS=2\n\
             THREADS_PER_WORKER=3\n\
             DOCUMENT_ROOT=/srv/www\n\
             MAX_QUEUE_SIZE=50\n\
             LOG_FILE=/tmp/acc.log\n\
             CACHE_SIZE_MB=5\n\
             TIMEOUT_SECONDS=10\n\
             DISPATCH_MODE=queue\n",
        );
        let c = ServerConfig::load(f.path()).expect("load");
        assert_eq!(c.port, 9090);
        assert_eq!(c.num_workers, 2);
        assert_eq!(c.threads_per_worker, 3);
        assert_eq!(c.document_root, PathBuf::from("/srv/www"));
        assert_eq!(c.max_queue_size, 50);
        assert_eq!(c.cache_size_mb, 5);
        assert_eq!(c.dispatch_mode, DispatchMode::Queue);
    }

    #[test]
    fn test_unknown_keys_and_comments_ignored() {
        let f = write_conf("# comment\nBOGUS=1\n\nPORT=8888\n");
        let c = ServerConfig::load(f.path()).expect("load");
        assert_eq!(c.port, 8888);
        assert_eq!(c.num_workers, 4);
    }

    #[test]
    fn test_zero_counts_clamped() {
        let f = write_conf("NUM_WORKERS=0\nTHREADS_PER_WORKER=0\nMAX_QUEUE_SIZE=0\n");
        let c = ServerConfig::load(f.path()).expect("load");
        assert_eq!(c.num_workers, 1);
        assert_eq!(c.threads_per_worker, 1);
        assert_eq!(c.max_queue_size, 1);
    }

    #[test]
    fn test_queue_size_clamped_to_ring() {
        let f = write_conf("MAX_QUEUE_SIZE=5000\n");
        let c = ServerConfig::load(f.path()).expect("load");
        assert_eq!(c.max_queue_size, QUEUE_CAPACITY);
    }

    #[test]
    fn test_missing_file() {
        let err = ServerConfig::load(Path::new("/nonexistent/server.conf"));
        assert!(matches!(err, Err(ConfigError::Read(_))));
    }

    #[test]
    fn test_vhosts() {
        let f = write_conf("VHOST_site1.local=./www/site1\nVHOST_Site2.Local=./www/site2\n");
        let c = ServerConfig::load(f.path()).expect("load");
        assert_eq!(c.vhosts.len(), 2);
        assert_eq!(
            c.resolve_root(Some("site1.local")),
            Path::new("./www/site1")
        );
        assert_eq!(
            c.resolve_root(Some("SITE2.LOCAL:8080")),
            Path::new("./www/site2")
        );
        assert_eq!(c.resolve_root(Some("other.host")), Path::new("/var/www/html"));
        assert_eq!(c.resolve_root(None), Path::new("/var/www/html"));
    }

    #[test]
    fn test_cache_size_bytes() {
        let c = ServerConfig {
            cache_size_mb: 2,
            ..Default::default()
        };
        assert_eq!(c.cache_size_bytes(), 2 * 1024 * 1024);
    }
}
