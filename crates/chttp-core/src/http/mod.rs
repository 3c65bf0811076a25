//! HTTP/1.1 subset: request parsing, response emission, MIME mapping.
//!
//! The wire model is deliberately small: one CRLF request line, the
//! three headers the pipeline consumes (`Host`, `Range`,
//! `Content-Length`), and `Connection: close` responses.

pub mod mime;
pub mod request;
pub mod response;

pub use mime::mime_for_path;
pub use request::{Method, RangeSpec, Request};
pub use response::{error_page, http_date, render, StatusCode};
