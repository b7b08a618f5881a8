use crate::Version;
use std::io;
use thiserror::Error;

/// Rejections surfaced by the body and request-line parsers.
///
/// Each variant maps to exactly one status line, so the caller can answer the
/// peer without inspecting the reason of the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// 400 - malformed framing, length mismatch, stalled or closed peer
    BadRequest,
    /// 413 - the body does not fit into the configured maximum message size
    PayloadTooLarge,
    /// 415 - content codings and `Expect: 100-continue` misuse
    UnsupportedMediaType,
}

impl Status {
    #[inline]
    pub const fn code(self) -> u16 {
        match self {
            Status::BadRequest => 400,
            Status::PayloadTooLarge => 413,
            Status::UnsupportedMediaType => 415,
        }
    }

    #[inline]
    pub const fn reason(self) -> &'static str {
        match self {
            Status::BadRequest => "Bad Request",
            Status::PayloadTooLarge => "Payload Too Large",
            Status::UnsupportedMediaType => "Unsupported Media Type",
        }
    }
}

/// The bytes at the start of the message are not an `HTTP/1.x` line.
///
/// No response can be written back for this one: drop the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid HTTP/1.x status line")]
pub struct InvalidStatusLine;

/// The header block exceeded the configured byte ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("header block exceeds the {max} byte limit")]
pub struct HeadersTooLarge {
    pub max: usize,
}

/// Errors returned by [`MessageReader`](crate::MessageReader).
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    InvalidStatusLine(#[from] InvalidStatusLine),

    #[error(transparent)]
    HeadersTooLarge(#[from] HeadersTooLarge),

    #[error("message rejected: {} {}", .0.code(), .0.reason())]
    Rejected(Status),

    #[error("connection closed before a complete message was received")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<Status> for ReadError {
    fn from(status: Status) -> Self {
        ReadError::Rejected(status)
    }
}

macro_rules! http_errors {
    ($($name:ident: $status_code:literal;)*) => {
        const fn render(code: u16, version: Version) -> Option<&'static [u8]> {
            match (code, version) { $(
                ($name, Version::Http11) => Some(concat!(
                    "HTTP/1.1 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: 0\r\n\r\n",
                ).as_bytes()),
                ($name, Version::Http10) => Some(concat!(
                    "HTTP/1.0 ", $status_code, "\r\n",
                    "connection: close\r\n",
                    "content-length: 0\r\n\r\n",
                ).as_bytes()),
            )*
                _ => None,
            }
        }
    };
}

const BAD_REQUEST: u16 = 400;
const PAYLOAD_TOO_LARGE: u16 = 413;
const UNSUPPORTED_MEDIA_TYPE: u16 = 415;
const HEADER_FIELDS_TOO_LARGE: u16 = 431;

http_errors! {
    BAD_REQUEST: "400 Bad Request";
    PAYLOAD_TOO_LARGE: "413 Payload Too Large";
    UNSUPPORTED_MEDIA_TYPE: "415 Unsupported Media Type";
    HEADER_FIELDS_TOO_LARGE: "431 Request Header Fields Too Large";
}

impl ReadError {
    /// Status code to answer with, or `None` when the connection should just
    /// be dropped.
    pub const fn status(&self) -> Option<u16> {
        match self {
            ReadError::Rejected(status) => Some(status.code()),
            ReadError::HeadersTooLarge(_) => Some(HEADER_FIELDS_TOO_LARGE),
            ReadError::InvalidStatusLine(_) | ReadError::Closed | ReadError::Io(_) => None,
        }
    }

    /// A complete `connection: close` response for this error.
    pub const fn as_http(&self, version: Version) -> Option<&'static [u8]> {
        match self.status() {
            Some(code) => render(code, version),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        #[rustfmt::skip]
        let cases = [
            (Status::BadRequest,           400, "Bad Request"),
            (Status::PayloadTooLarge,      413, "Payload Too Large"),
            (Status::UnsupportedMediaType, 415, "Unsupported Media Type"),
        ];

        for (status, code, reason) in cases {
            assert_eq!(status.code(), code);
            assert_eq!(status.reason(), reason);
        }
    }

    #[test]
    fn error_responses() {
        let err = ReadError::from(Status::PayloadTooLarge);
        assert_eq!(err.status(), Some(413));
        assert_eq!(
            err.as_http(Version::Http11),
            Some(&b"HTTP/1.1 413 Payload Too Large\r\nconnection: close\r\ncontent-length: 0\r\n\r\n"[..])
        );

        let err = ReadError::from(HeadersTooLarge { max: 8192 });
        assert_eq!(err.status(), Some(431));
        assert_eq!(
            err.as_http(Version::Http10),
            Some(&b"HTTP/1.0 431 Request Header Fields Too Large\r\nconnection: close\r\ncontent-length: 0\r\n\r\n"[..])
        );
        assert_eq!(err.to_string(), "header block exceeds the 8192 byte limit");

        let err = ReadError::from(InvalidStatusLine);
        assert_eq!(err.status(), None);
        assert_eq!(err.as_http(Version::Http11), None);
        assert_eq!(ReadError::Closed.as_http(Version::Http11), None);
    }

    #[test]
    fn rejected_display() {
        let err = ReadError::Rejected(Status::UnsupportedMediaType);
        assert_eq!(err.to_string(), "message rejected: 415 Unsupported Media Type");
    }
}
