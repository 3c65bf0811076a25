//! Response emission.
//!
//! Every response carries the same header set: status line,
//! `Content-Type`, `Content-Length`, `Date` (RFC 1123, GMT),
//! `Server`, `Connection: close`; 206 adds `Content-Range`.

use crate::constants::SERVER_TOKEN;
use chrono::Utc;
use std::fmt::Write as _;

/// Status codes this server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Created,
    PartialContent,
    Forbidden,
    NotFound,
    InternalError,
    ServiceUnavailable,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::PartialContent => 206,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::InternalError => 500,
            StatusCode::ServiceUnavailable => 503,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::PartialContent => "Partial Content",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalError => "Internal Server Error",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }
}

/// Current time as an RFC 1123 `Date` header value.
pub fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Assemble the full response bytes. `Content-Length` always reflects
/// the body; `include_body` is false for HEAD.
pub fn render(
    status: StatusCode,
    content_type: &str,
    content_range: Option<&str>,
    body: &[u8],
    include_body: bool,
) -> Vec<u8> {
    let mut head = String::with_capacity(256);
    let _ = write!(head, "HTTP/1.1 {} {}\r\n", status.as_u16(), status.reason());
    let _ = write!(head, "Content-Type: {}\r\n", content_type);
    let _ = write!(head, "Content-Length: {}\r\n", body.len());
    if let Some(range) = content_range {
        let _ = write!(head, "Content-Range: {}\r\n", range);
    }
    let _ = write!(head, "Date: {}\r\n", http_date());
    let _ = write!(head, "Server: {}\r\n", SERVER_TOKEN);
    head.push_str("Connection: close\r\n\r\n");

    let mut out = Vec::with_capacity(head.len() + if include_body { body.len() } else { 0 });
    out.extend_from_slice(head.as_bytes());
    if include_body {
        out.extend_from_slice(body);
    }
    out
}

/// Default HTML error body for a status code.
pub fn error_page(status: StatusCode) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head><title>{code} {reason}</title></head>\n\
         <body>\n\
         <h1>{code} {reason}</h1>\n\
         <hr>\n\
         <p>{token}</p>\n\
         </body>\n\
         </html>\n",
        code = status.as_u16(),
        reason = status.reason(),
        token = SERVER_TOKEN,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head_of(bytes: &[u8]) -> String {
        let text = String::from_utf8_lossy(bytes);
        text.split("\r\n\r\n").next().unwrap_or("").to_string()
    }

    #[test]
    fn test_render_headers() {
        let out = render(StatusCode::Ok, "text/html", None, b"hi", true);
        let head = head_of(&out);
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Type: text/html\r\n"));
        assert!(head.contains("Content-Length: 2\r\n"));
        assert!(head.contains("Date: "));
        assert!(head.contains("GMT"));
        assert!(head.contains("Server: ConcurrentHTTP/1.0\r\n"));
        assert!(head.contains("Connection: close"));
        assert!(out.ends_with(b"\r\n\r\nhi"));
    }

    #[test]
    fn test_render_content_range() {
        let out = render(
            StatusCode::PartialContent,
            "text/plain",
            Some("bytes 0-9/100"),
            &[0u8; 10],
            true,
        );
        let head = head_of(&out);
        assert!(head.starts_with("HTTP/1.1 206 Partial Content\r\n"));
        assert!(head.contains("Content-Range: bytes 0-9/100\r\n"));
        assert!(head.contains("Content-Length: 10\r\n"));
    }

    #[test]
    fn test_render_head_omits_body() {
        let out = render(StatusCode::Ok, "text/plain", None, b"hello", false);
        let head = head_of(&out);
        assert!(head.contains("Content-Length: 5\r\n"));
        assert!(out.ends_with(b"\r\n\r\n"));
    }

    #[test]
    fn test_error_page() {
        let page = error_page(StatusCode::NotFound);
        assert!(page.contains("404 Not Found"));
        assert!(page.contains("<html>"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(StatusCode::ServiceUnavailable.as_u16(), 503);
        assert_eq!(StatusCode::Created.reason(), "Created");
    }
}
