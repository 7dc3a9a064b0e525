//! Incremental HTTP request parser
//!
//! Line-oriented: the buffer is scanned for CRLF-delimited lines and each
//! complete line drives one state transition. An incomplete line at the end
//! of the buffer is not an error, it is the signal that the connection
//! needs another read cycle before the parser can make progress.
//!
//! The parser never reparses consumed bytes. It holds cursors into the
//! caller's buffer (`checked`, `line_start`, `body_start`) that only move
//! forward within one request cycle; `advance()` may be called any number
//! of times as the buffer grows.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

/// Longest accepted request/header line, in bytes.
pub const MAX_LINE_BYTES: usize = 4096;

/// Largest accepted `Content-Length`.
pub const MAX_BODY_BYTES: usize = 8192;

/// Request methods this server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    /// Parse a method token, case-insensitively. Unknown methods are
    /// `None`, which the parser turns into a malformed-request error.
    pub fn from_token(token: &str) -> Option<Method> {
        if token.eq_ignore_ascii_case("GET") {
            Some(Method::Get)
        } else if token.eq_ignore_ascii_case("POST") {
            Some(Method::Post)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Protocol versions this server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    pub fn from_token(token: &str) -> Option<Version> {
        if token.eq_ignore_ascii_case("HTTP/1.1") {
            Some(Version::Http11)
        } else if token.eq_ignore_ascii_case("HTTP/1.0") {
            Some(Version::Http10)
        } else {
            None
        }
    }
}

/// Header name/value storage.
///
/// Names are stored lowercased so lookups are case-insensitive. When a
/// header occurs more than once the last occurrence wins.
#[derive(Debug, Default)]
pub struct HeaderMap {
    map: HashMap<String, String>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.map
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    /// Look up a header by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn clear(&mut self) {
        self.map.clear();
    }
}

/// Where the parser is within the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    AwaitingRequestLine,
    AwaitingHeaders,
    AwaitingBody,
    Complete,
    Error,
}

/// Outcome of one `advance()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// No complete unit yet; feed more bytes and call again.
    NeedMore,
    /// A full request has been parsed.
    Complete,
    /// The input is not a well-formed request. Terminal.
    Malformed,
}

/// Result of scanning the buffer for the next CRLF-terminated line.
enum LineStatus {
    /// A full line; the range excludes the CRLF.
    Complete(Range<usize>),
    /// No terminator yet; wait for more bytes.
    Open,
    /// A bare LF, or other framing the scanner cannot accept.
    Bad,
}

/// Incremental request parser. One instance per connection, reset between
/// keep-alive request cycles.
pub struct RequestParser {
    state: ParseState,
    checked: usize,
    line_start: usize,
    body_start: usize,
    content_length: usize,
    body: Option<Range<usize>>,
    method: Option<Method>,
    version: Option<Version>,
    target: String,
    headers: HeaderMap,
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::AwaitingRequestLine,
            checked: 0,
            line_start: 0,
            body_start: 0,
            content_length: 0,
            body: None,
            method: None,
            version: None,
            target: String::new(),
            headers: HeaderMap::new(),
        }
    }

    /// Clear all state and cursors for the next request on a kept-alive
    /// connection. The caller must also discard its buffer.
    pub fn reset(&mut self) {
        self.state = ParseState::AwaitingRequestLine;
        self.checked = 0;
        self.line_start = 0;
        self.body_start = 0;
        self.content_length = 0;
        self.body = None;
        self.method = None;
        self.version = None;
        self.target.clear();
        self.headers.clear();
    }

    #[inline]
    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn method(&self) -> Option<Method> {
        self.method
    }

    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// The request target (path), valid once the request line has parsed.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Byte range of the request body within the caller's buffer, once
    /// the request is complete and a body was present.
    pub fn body_range(&self) -> Option<Range<usize>> {
        self.body.clone()
    }

    /// Whether the peer asked to reuse the connection.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `Connection: close`;
    /// HTTP/1.0 requires an explicit `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        let conn = self.headers.get("connection");
        match self.version {
            Some(Version::Http11) => !matches!(conn, Some(v) if v.eq_ignore_ascii_case("close")),
            Some(Version::Http10) => {
                matches!(conn, Some(v) if v.eq_ignore_ascii_case("keep-alive"))
            }
            None => false,
        }
    }

    /// Drive the parser over `buf`, which must contain every byte received
    /// so far for the current request (the parser resumes from its own
    /// cursors).
    pub fn advance(&mut self, buf: &[u8]) -> Progress {
        loop {
            match self.state {
                ParseState::AwaitingRequestLine | ParseState::AwaitingHeaders => {
                    let line = match self.next_line(buf) {
                        LineStatus::Complete(range) => range,
                        LineStatus::Open => {
                            if buf.len() - self.line_start > MAX_LINE_BYTES {
                                return self.fail();
                            }
                            return Progress::NeedMore;
                        }
                        LineStatus::Bad => return self.fail(),
                    };
                    let ok = if self.state == ParseState::AwaitingRequestLine {
                        self.parse_request_line(&buf[line])
                    } else {
                        self.parse_header_line(&buf[line])
                    };
                    if !ok {
                        return self.fail();
                    }
                    if self.state == ParseState::Complete {
                        return Progress::Complete;
                    }
                }
                ParseState::AwaitingBody => {
                    if buf.len().saturating_sub(self.body_start) < self.content_length {
                        return Progress::NeedMore;
                    }
                    self.body = Some(self.body_start..self.body_start + self.content_length);
                    self.state = ParseState::Complete;
                    return Progress::Complete;
                }
                ParseState::Complete => return Progress::Complete,
                ParseState::Error => return Progress::Malformed,
            }
        }
    }

    fn fail(&mut self) -> Progress {
        self.state = ParseState::Error;
        Progress::Malformed
    }

    /// Scan forward for the next CRLF. Advances `checked` over examined
    /// bytes so they are never scanned twice.
    fn next_line(&mut self, buf: &[u8]) -> LineStatus {
        while self.checked < buf.len() {
            match buf[self.checked] {
                b'\r' => {
                    if self.checked + 1 == buf.len() {
                        // CR at the buffer edge; the LF may still arrive.
                        return LineStatus::Open;
                    }
                    if buf[self.checked + 1] == b'\n' {
                        let line = self.line_start..self.checked;
                        self.checked += 2;
                        self.line_start = self.checked;
                        return LineStatus::Complete(line);
                    }
                    return LineStatus::Bad;
                }
                b'\n' => return LineStatus::Bad,
                _ => self.checked += 1,
            }
        }
        LineStatus::Open
    }

    /// `METHOD SP TARGET SP VERSION`, exactly three tokens.
    fn parse_request_line(&mut self, line: &[u8]) -> bool {
        let line = match std::str::from_utf8(line) {
            Ok(s) => s,
            Err(_) => return false,
        };
        let mut tokens = line.split_ascii_whitespace();
        let (method, target, version) = match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(m), Some(t), Some(v)) => (m, t, v),
            _ => return false,
        };
        if tokens.next().is_some() {
            return false;
        }

        self.method = match Method::from_token(method) {
            Some(m) => Some(m),
            None => return false,
        };
        self.version = match Version::from_token(version) {
            Some(v) => Some(v),
            None => return false,
        };

        // Absolute-form targets ("http://host/path") are reduced to the
        // path component.
        let target = if target.len() >= 7 && target[..7].eq_ignore_ascii_case("http://") {
            match target[7..].find('/') {
                Some(i) => &target[7 + i..],
                None => return false,
            }
        } else {
            target
        };
        if !target.starts_with('/') {
            return false;
        }
        self.target.clear();
        self.target.push_str(target);

        self.state = ParseState::AwaitingHeaders;
        true
    }

    /// One header line, or the empty line that ends the header section.
    fn parse_header_line(&mut self, line: &[u8]) -> bool {
        if line.is_empty() {
            return self.end_of_headers();
        }
        let line = match std::str::from_utf8(line) {
            Ok(s) => s,
            Err(_) => return false,
        };
        let (name, value) = match line.split_once(':') {
            Some(pair) => pair,
            None => return false,
        };
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.headers.insert(name, value.trim());
        true
    }

    /// Decide, from the headers, whether a body follows.
    fn end_of_headers(&mut self) -> bool {
        match self.headers.get("content-length") {
            Some(v) => {
                let n = match v.parse::<usize>() {
                    Ok(n) => n,
                    Err(_) => return false,
                };
                if n > MAX_BODY_BYTES {
                    return false;
                }
                if n == 0 {
                    self.state = ParseState::Complete;
                } else {
                    self.content_length = n;
                    self.body_start = self.checked;
                    self.state = ParseState::AwaitingBody;
                }
                true
            }
            None => {
                // POST mandates a declared body length.
                if self.method == Some(Method::Post) {
                    return false;
                }
                self.state = ParseState::Complete;
                true
            }
        }
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestParser")
            .field("state", &self.state)
            .field("checked", &self.checked)
            .field("method", &self.method)
            .field("target", &self.target)
            .finish()
    }
}
