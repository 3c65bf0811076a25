//! Request parsing over a single buffered read.
//!
//! The server reads at most one 4 KiB buffer per connection; whatever
//! arrived is parsed here. A request line parses iff it is exactly
//! three whitespace-separated tokens terminated by CRLF.

use crate::error::HttpError;

/// Request methods the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
}

impl Method {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "GET" => Some(Method::Get),
            "HEAD" => Some(Method::Head),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// A `Range: bytes=START-END` request, END optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: Option<u64>,
}

impl RangeSpec {
    /// Resolve against a file size, applying the clamping rules:
    /// a missing END, `END == 0`, or END past the file all mean
    /// "to end of file". Returns inclusive (start, end) byte offsets,
    /// or None when the range cannot be satisfied.
    pub fn resolve(&self, filesize: u64) -> Option<(u64, u64)> {
        if filesize == 0 || self.start >= filesize {
            return None;
        }
        let end = match self.end {
            None | Some(0) => filesize - 1,
            Some(e) if e >= filesize => filesize - 1,
            Some(e) => e,
        };
        if end < self.start {
            return None;
        }
        Some((self.start, end))
    }
}

/// A parsed request, borrowing from the receive buffer.
#[derive(Debug)]
pub struct Request<'a> {
    pub method: Method,
    pub path: &'a str,
    pub version: &'a str,
    pub host: Option<&'a str>,
    pub range: Option<RangeSpec>,
    pub content_length: Option<usize>,
    pub body: &'a [u8],
}

impl<'a> Request<'a> {
    /// Parse the bytes of a single read. Header block runs to the
    /// first CRLF CRLF (or to the end of what arrived); anything
    /// after the terminator is body.
    pub fn parse(buf: &'a [u8]) -> Result<Self, HttpError> {
        let (head, body) = match find_terminator(buf) {
            Some(pos) => (&buf[..pos], &buf[pos + 4..]),
            None => (buf, &buf[buf.len()..]),
        };

        let head = std::str::from_utf8(head).map_err(|_| HttpError::InvalidEncoding)?;

        let (line, header_block) = head
            .split_once("\r\n")
            .ok_or(HttpError::MalformedRequestLine)?;

        let mut tokens = line.split_whitespace();
        let (method, path, version) = match (tokens.next(), tokens.next(), tokens.next(), tokens.next()) {
            (Some(m), Some(p), Some(v), None) => (m, p, v),
            _ => return Err(HttpError::MalformedRequestLine),
        };

        let method = Method::from_token(method).ok_or(HttpError::UnsupportedMethod)?;

        let mut host = None;
        let mut range = None;
        let mut content_length = None;
        for header in header_block.split("\r\n") {
            if header.is_empty() {
                break;
            }
            let Some((name, value)) = header.split_once(':') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("Host") {
                host = Some(value);
            } else if name.eq_ignore_ascii_case("Range") {
                range = parse_range(value);
            } else if name.eq_ignore_ascii_case("Content-Length") {
                content_length = value.parse().ok();
            }
        }

        Ok(Request {
            method,
            path,
            version,
            host,
            range,
            content_length,
            body,
        })
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Parse `bytes=START-END` (END optional). Anything else is ignored
/// and the request is served unrestricted.
fn parse_range(value: &str) -> Option<RangeSpec> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = end.trim();
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().ok()?)
    };
    Some(RangeSpec { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_get() {
        let req = Request::parse(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").expect("parse");
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.host, Some("x"));
        assert!(req.range.is_none());
        assert!(req.body.is_empty());
    }

    #[test]
    fn test_request_line_needs_three_tokens() {
        assert!(Request::parse(b"GET /\r\n\r\n").is_err());
        assert!(Request::parse(b"GET / HTTP/1.1 extra\r\n\r\n").is_err());
        assert!(Request::parse(b"\r\n\r\n").is_err());
    }

    #[test]
    fn test_request_line_needs_crlf() {
        assert!(Request::parse(b"GET / HTTP/1.1").is_err());
    }

    #[test]
    fn test_unsupported_method() {
        let err = Request::parse(b"DELETE /x HTTP/1.1\r\n\r\n").unwrap_err();
        assert_eq!(err, HttpError::UnsupportedMethod);
    }

    #[test]
    fn test_invalid_utf8() {
        let err = Request::parse(b"GET /\xff\xfe HTTP/1.1\r\n\r\n").unwrap_err();
        assert_eq!(err, HttpError::InvalidEncoding);
    }

    #[test]
    fn test_headers_case_insensitive() {
        let req =
            Request::parse(b"GET /f HTTP/1.1\r\nhOsT: a.example\r\nrange: bytes=1-2\r\n\r\n")
                .expect("parse");
        assert_eq!(req.host, Some("a.example"));
        assert_eq!(req.range, Some(RangeSpec { start: 1, end: Some(2) }));
    }

    #[test]
    fn test_content_length_and_body() {
        let req = Request::parse(b"POST /up HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello")
            .expect("parse");
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.content_length, Some(5));
        assert_eq!(req.body, b"hello");
    }

    #[test]
    fn test_parse_range_forms() {
        assert_eq!(parse_range("bytes=0-9"), Some(RangeSpec { start: 0, end: Some(9) }));
        assert_eq!(parse_range("bytes=5-"), Some(RangeSpec { start: 5, end: None }));
        assert_eq!(parse_range("bytes=-5"), None);
        assert_eq!(parse_range("chunks=0-9"), None);
        assert_eq!(parse_range("bytes=a-b"), None);
    }

    #[test]
    fn test_range_resolve_clamping() {
        // END omitted: to end of file
        assert_eq!(RangeSpec { start: 10, end: None }.resolve(100), Some((10, 99)));
        // END == 0: to end of file
        assert_eq!(RangeSpec { start: 0, end: Some(0) }.resolve(100), Some((0, 99)));
        // END past the file: clamped
        assert_eq!(RangeSpec { start: 0, end: Some(500) }.resolve(100), Some((0, 99)));
        // In-bounds
        assert_eq!(RangeSpec { start: 0, end: Some(9) }.resolve(100), Some((0, 9)));
        // Start past the file
        assert_eq!(RangeSpec { start: 100, end: None }.resolve(100), None);
        // Empty file
        assert_eq!(RangeSpec { start: 0, end: None }.resolve(0), None);
        // Inverted after clamping
        assert_eq!(RangeSpec { start: 9, end: Some(3) }.resolve(100), None);
    }
}
