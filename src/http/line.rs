//! Request-line and status-line tokenizer
//!
//! ```text
//! Request line:  [METHOD] SP [TARGET] SP "HTTP/1." ("0" / "1") CRLF
//! Status line:   "HTTP/1." ("0" / "1") SP 3DIGIT [SP REASON] CRLF
//! ```
//!
//! None of these functions read from the socket. Callers buffer at least one
//! complete line before calling them: running out of bytes is reported as a
//! malformed line.

use crate::{
    errors::InvalidStatusLine,
    http::{
        buffer::MessageBuffer,
        chars::{is_method_byte, is_status_code, is_uri_byte},
        types::{Method, Version},
    },
    limits::{MIN_REQUEST_LINE, MIN_STATUS_LINE},
};
use memchr::memchr;
use tracing::debug;

/// Longest accepted method token.
pub const MAX_METHOD_LEN: usize = 16;

/// Method, origin-form target and version of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub target: String,
    pub version: Version,
}

/// Version and status code of a response. The reason phrase is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine {
    pub version: Version,
    pub code: u16,
}

/// Parses `HTTP/1.0` or `HTTP/1.1` at the cursor and moves past it.
///
/// Anything else, `HTTP/2` included, is not an `HTTP/1.x` message.
pub fn parse_version(buffer: &mut MessageBuffer) -> Result<Version, InvalidStatusLine> {
    let version = match buffer.unread().get(..8) {
        Some(b"HTTP/1.1") => Version::Http11,
        Some(b"HTTP/1.0") => Version::Http10,
        Some([b'H', b'T', b'T', b'P', b'/', b'2', ..]) => {
            debug!("HTTP/2 is not supported");
            return Err(InvalidStatusLine);
        }
        _ => return Err(InvalidStatusLine),
    };

    buffer.advance(8);
    Ok(version)
}

/// Parses `SP 3DIGIT ... CRLF` and moves past the line terminator.
///
/// Whatever follows the digits up to the `CR` is the reason phrase and is
/// skipped unchecked, separator included.
pub fn parse_status_code(buffer: &mut MessageBuffer) -> Result<u16, InvalidStatusLine> {
    let unread = buffer.unread();

    let [b' ', digits @ ..] = unread.get(..4).ok_or(InvalidStatusLine)? else {
        return Err(InvalidStatusLine);
    };
    if !is_status_code(digits) {
        return Err(InvalidStatusLine);
    }

    let rest = &unread[4..];
    let cr = memchr(b'\r', rest).ok_or(InvalidStatusLine)?;
    if rest.get(cr + 1) != Some(&b'\n') {
        return Err(InvalidStatusLine);
    }

    let code = digits
        .iter()
        .fold(0u16, |acc, &d| acc * 10 + u16::from(d - b'0'));

    buffer.advance(4 + cr + 2);
    Ok(code)
}

/// Parses the method token and the space after it.
///
/// Returns `None` for a malformed or overlong token, and when fewer bytes
/// than the shortest possible request line are buffered. The cursor only
/// moves on success.
pub fn parse_method(buffer: &mut MessageBuffer) -> Option<Method> {
    let unread = buffer.unread();
    if unread.len() < MIN_REQUEST_LINE {
        return None;
    }

    let scan = &unread[..unread.len().min(MAX_METHOD_LEN + 1)];
    let end = scan.iter().position(|&b| !is_method_byte(b))?;
    if end == 0 || scan[end] != b' ' {
        return None;
    }

    let method = Method::from_token(simdutf8::basic::from_utf8(&scan[..end]).ok()?);

    buffer.advance(end + 1);
    Some(method)
}

/// Parses the request-target and the version that ends the request line.
///
/// Absolute URLs are collapsed to origin-form:
///
/// ```text
/// /abc?q#f                   -> /abc?q#f
/// http://example.com         -> /
/// https://example.com/abc    -> /abc
/// https://example.com?a=b    -> /?a=b
/// https://example.com#frag   -> /#frag
/// ```
///
/// Returns `None` for anything else (including `*`), for a version other
/// than `HTTP/1.0` or `HTTP/1.1`, and for a missing `CRLF`.
pub fn parse_uri(buffer: &mut MessageBuffer) -> Option<(String, Version)> {
    let unread = buffer.unread();

    let end = unread.iter().position(|&b| !is_uri_byte(b))?;
    if end == 0 || unread[end] != b' ' {
        return None;
    }

    let target = origin_form(simdutf8::basic::from_utf8(&unread[..end]).ok()?)?;

    buffer.advance(end + 1);
    let version = parse_version(buffer).ok()?;
    if buffer.get()? != b'\r' || buffer.get()? != b'\n' {
        return None;
    }

    Some((target, version))
}

fn origin_form(uri: &str) -> Option<String> {
    if uri.starts_with('/') {
        return Some(uri.to_owned());
    }

    let rest = uri
        .strip_prefix("http://")
        .or_else(|| uri.strip_prefix("https://"))?;

    // The authority ends at the first `/`, `?` or `#`
    match rest.find(|c: char| matches!(c, '/' | '?' | '#')) {
        Some(i) if rest.as_bytes()[i] == b'/' => Some(rest[i..].to_owned()),
        Some(i) => Some(format!("/{}", &rest[i..])),
        None => Some("/".to_owned()),
    }
}

/// Parses a complete request line.
pub fn parse_request_line(buffer: &mut MessageBuffer) -> Option<RequestLine> {
    let method = parse_method(buffer)?;
    let (target, version) = parse_uri(buffer)?;

    Some(RequestLine {
        method,
        target,
        version,
    })
}

/// Parses a complete status line.
pub fn parse_status_line(buffer: &mut MessageBuffer) -> Result<StatusLine, InvalidStatusLine> {
    if buffer.remaining() < MIN_STATUS_LINE {
        return Err(InvalidStatusLine);
    }

    let version = parse_version(buffer)?;
    let code = parse_status_code(buffer)?;

    Ok(StatusLine { version, code })
}
