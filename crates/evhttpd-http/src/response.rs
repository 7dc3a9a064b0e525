//! Response construction
//!
//! Status codes and response head assembly. Bodies are handled by the
//! caller: file responses reference an mmap (`fs::FileMap`), error
//! responses use the small generated pages from [`error_body`]. Keeping
//! the head and the body separate means large files are never copied into
//! a write buffer.

use std::fmt::{self, Write};
use std::path::Path;

/// The subset of status codes this server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    BadRequest,
    Forbidden,
    NotFound,
    InternalServerError,
}

impl StatusCode {
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason())
    }
}

/// Build the status line and headers for a response. The body follows
/// separately.
pub fn build_head(
    status: StatusCode,
    content_length: usize,
    content_type: &str,
    keep_alive: bool,
) -> Vec<u8> {
    let mut head = String::with_capacity(128);
    let _ = write!(head, "HTTP/1.1 {}\r\n", status);
    let _ = write!(head, "Content-Length: {}\r\n", content_length);
    let _ = write!(head, "Content-Type: {}\r\n", content_type);
    let _ = write!(
        head,
        "Connection: {}\r\n\r\n",
        if keep_alive { "keep-alive" } else { "close" }
    );
    head.into_bytes()
}

/// Small generated HTML page for error responses.
pub fn error_body(status: StatusCode) -> String {
    format!(
        "<html><head><title>{status}</title></head>\
         <body><h1>{status}</h1></body></html>\n"
    )
}

/// Content type from the file extension. Unknown extensions are served
/// as opaque bytes.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    match ext.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "txt" => "text/plain",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_build_head_format() {
        let head = build_head(StatusCode::Ok, 12, "text/html", true);
        let head = String::from_utf8(head).unwrap();
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Length: 12\r\n"));
        assert!(head.contains("Content-Type: text/html\r\n"));
        assert!(head.contains("Connection: keep-alive\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_build_head_close() {
        let head = build_head(StatusCode::NotFound, 0, "text/html", false);
        let head = String::from_utf8(head).unwrap();
        assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(head.contains("Connection: close\r\n"));
    }

    #[test]
    fn test_error_body_mentions_status() {
        let body = error_body(StatusCode::Forbidden);
        assert!(body.contains("403 Forbidden"));
    }

    #[test]
    fn test_content_type_lookup() {
        assert_eq!(content_type_for(&PathBuf::from("a/index.html")), "text/html");
        assert_eq!(content_type_for(&PathBuf::from("style.CSS")), "text/css");
        assert_eq!(
            content_type_for(&PathBuf::from("blob.bin")),
            "application/octet-stream"
        );
        assert_eq!(
            content_type_for(&PathBuf::from("no_extension")),
            "application/octet-stream"
        );
    }
}
