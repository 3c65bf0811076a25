//! The per-connection pipeline.
//!
//! One buffered read, one parsed request, one response, close.
//! Statistics and the access log are updated for every answered
//! request; connections that never produce a parseable byte (empty
//! read, receive timeout) are closed silently. The active-connection
//! counter is held by a scope guard for the whole handling, so every
//! early return decrements it.

use crate::cache::FileCache;
use crate::dashboard::render_stats_page;
use crate::logger::AccessLog;
use chttp_core::constants::{MAX_BODY_BYTES, MAX_CACHE_ENTRY_BYTES, RECV_BUF_SIZE, RECV_TIMEOUT_SECS};
use chttp_core::error::SocketError;
use chttp_core::http::{error_page, mime_for_path, render, Method, Request, StatusCode};
use chttp_core::{srv_debug, srv_warn, ServerConfig};
use chttp_ipc::{IpcHandles, Stream};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Everything a connection thread needs, shared across the pool.
pub struct ServeContext {
    pub config: Arc<ServerConfig>,
    pub cache: Arc<FileCache>,
    pub access_log: Arc<AccessLog>,
    pub ipc: Arc<IpcHandles>,
}

enum Body {
    Owned(Vec<u8>),
    Shared(Arc<[u8]>),
}

impl Body {
    fn as_slice(&self) -> &[u8] {
        match self {
            Body::Owned(v) => v,
            Body::Shared(a) => a,
        }
    }
}

struct Reply {
    status: StatusCode,
    content_type: &'static str,
    content_range: Option<String>,
    body: Body,
}

impl Reply {
    fn error(status: StatusCode) -> Self {
        Self {
            status,
            content_type: "text/html",
            content_range: None,
            body: Body::Owned(error_page(status).into_bytes()),
        }
    }
}

/// Handle one accepted connection start to finish.
pub fn handle_connection(ctx: &ServeContext, stream: &Stream) {
    let started = Instant::now();
    let _active = ctx.ipc.active_guard();

    let _ = stream.set_recv_timeout(RECV_TIMEOUT_SECS);
    let mut buf = [0u8; RECV_BUF_SIZE];
    let received = match stream.read(&mut buf) {
        Ok(0) => return, // client closed before sending anything
        Ok(n) => n,
        Err(SocketError::Timeout) => return, // no request within the window
        Err(SocketError::Closed) => return,
        Err(err) => {
            srv_debug!("recv failed: {}", err);
            return;
        }
    };

    let (reply, include_body, method, path) = match Request::parse(&buf[..received]) {
        Ok(req) => (
            route(ctx, &req),
            req.method != Method::Head,
            req.method.as_str(),
            req.path.to_string(),
        ),
        Err(err) => {
            srv_debug!("unparseable request: {}", err);
            (Reply::error(StatusCode::InternalError), true, "-", "-".to_string())
        }
    };

    let wire = render(
        reply.status,
        reply.content_type,
        reply.content_range.as_deref(),
        reply.body.as_slice(),
        include_body,
    );

    let (status, bytes_sent) = match stream.write_all(&wire) {
        Ok(()) => (reply.status.as_u16(), wire.len() as u64),
        Err(err) => {
            // Headers may already be on the wire; no further response
            srv_debug!("send failed: {}", err);
            (500, 0)
        }
    };

    if let Err(err) = ctx.ipc.stats_update(status, bytes_sent) {
        srv_warn!("stats update failed: {}", err);
    }
    let _ = ctx
        .ipc
        .stats_record_latency(started.elapsed().as_millis() as u64);
    ctx.access_log
        .log_request(&ctx.ipc, &stream.peer_ip(), method, &path, status, bytes_sent);
    // stream drops here: close
}

/// Route a parsed request to a reply. Path safety comes first; the
/// dashboard and the method split follow.
fn route(ctx: &ServeContext, req: &Request<'_>) -> Reply {
    if !path_is_safe(req.path) {
        return Reply::error(StatusCode::Forbidden);
    }

    if req.path == "/stats" {
        return stats_reply(ctx);
    }

    match req.method {
        Method::Post | Method::Put => echo_reply(req),
        Method::Get | Method::Head => serve_file(ctx, req),
    }
}

/// Reject `..` segments anywhere and paths opening with `//`,
/// regardless of where the resolved path would land.
fn path_is_safe(path: &str) -> bool {
    if path.starts_with("//") {
        return false;
    }
    !path.split('/').any(|segment| segment == "..")
}

fn stats_reply(ctx: &ServeContext) -> Reply {
    match ctx.ipc.stats_snapshot() {
        Ok(view) => Reply {
            status: StatusCode::Ok,
            content_type: "text/html; charset=utf-8",
            content_range: None,
            body: Body::Owned(render_stats_page(&view).into_bytes()),
        },
        Err(err) => {
            srv_warn!("stats snapshot failed: {}", err);
            Reply::error(StatusCode::InternalError)
        }
    }
}

/// POST/PUT: acknowledge up to 64 KiB of body with an HTML echo.
fn echo_reply(req: &Request<'_>) -> Reply {
    let declared = req.content_length.unwrap_or(req.body.len());
    let body_len = req.body.len().min(declared).min(MAX_BODY_BYTES);
    let page = format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><title>201 Created</title></head>\n\
         <body>\n\
         <h1>201 Created</h1>\n\
         <p>{} {} received {} bytes</p>\n\
         </body>\n\
         </html>\n",
        req.method.as_str(),
        req.path,
        body_len
    );
    Reply {
        status: StatusCode::Created,
        content_type: "text/html",
        content_range: None,
        body: Body::Owned(page.into_bytes()),
    }
}

fn serve_file(ctx: &ServeContext, req: &Request<'_>) -> Reply {
    let root = ctx.config.resolve_root(req.host);
    let mut full = root.join(req.path.trim_start_matches('/'));

    let meta = match std::fs::metadata(&full) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return not_found_reply(root);
        }
        Err(err) => {
            srv_debug!("stat {} failed: {}", full.display(), err);
            return Reply::error(StatusCode::InternalError);
        }
    };

    if meta.is_dir() {
        full.push("index.html");
        match std::fs::metadata(&full) {
            Ok(meta) if meta.is_file() => {}
            // A directory without an index is forbidden, not missing
            _ => return Reply::error(StatusCode::Forbidden),
        }
    }

    let mime = mime_for_path(&full);
    let key = std::fs::canonicalize(&full).unwrap_or_else(|_| full.clone());

    let data: Arc<[u8]> = match ctx.cache.get(&key) {
        Some(data) => data,
        None => match std::fs::read(&key) {
            Ok(bytes) => {
                let data: Arc<[u8]> = bytes.into();
                if data.len() <= MAX_CACHE_ENTRY_BYTES {
                    ctx.cache.put(&key, Arc::clone(&data));
                }
                data
            }
            Err(err) => {
                // Present but unreadable
                srv_debug!("read {} failed: {}", key.display(), err);
                return Reply::error(StatusCode::InternalError);
            }
        },
    };

    if let Some(range) = req.range {
        if let Some((start, end)) = range.resolve(data.len() as u64) {
            let slice = data[start as usize..=end as usize].to_vec();
            return Reply {
                status: StatusCode::PartialContent,
                content_type: mime,
                content_range: Some(format!("bytes {}-{}/{}", start, end, data.len())),
                body: Body::Owned(slice),
            };
        }
    }

    Reply {
        status: StatusCode::Ok,
        content_type: mime,
        content_range: None,
        body: Body::Shared(data),
    }
}

/// 404, preferring the site's own `errors/404.html` when present.
fn not_found_reply(root: &Path) -> Reply {
    match std::fs::read(root.join("errors/404.html")) {
        Ok(page) => Reply {
            status: StatusCode::NotFound,
            content_type: "text/html",
            content_range: None,
            body: Body::Owned(page),
        },
        Err(_) => Reply::error(StatusCode::NotFound),
    }
}
