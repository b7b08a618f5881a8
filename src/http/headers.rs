use crate::{errors::HeadersTooLarge, http::buffer::MessageBuffer};
use memchr::memchr;
use std::time::Duration;
use tokio::io::AsyncRead;
use tracing::{debug, trace};

pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_ENCODING: &str = "Content-Encoding";
pub const TRANSFER_ENCODING: &str = "Transfer-Encoding";
pub const TRAILER: &str = "Trailer";
pub const EXPECT: &str = "Expect";

/// Destination for raw header lines.
///
/// Lines arrive in wire order, one per call, without the trailing `CRLF`.
/// Duplicate field names are passed through as separate lines.
pub trait HeaderSink {
    fn push_line(&mut self, line: String);
}

impl HeaderSink for Vec<String> {
    #[inline]
    fn push_line(&mut self, line: String) {
        self.push(line);
    }
}

/// Header lines of one message, with case-insensitive lookups.
///
/// Lines are stored as received (ISO-8859-1 decoded) and split into
/// name and value on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    lines: Vec<String>,
}

impl Headers {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `name: value` line.
    #[inline]
    pub fn add(mut self, name: &str, value: &str) -> Self {
        self.lines.push(format!("{name}: {value}"));
        self
    }

    #[inline]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// `(name, value)` pairs in line order. Lines without a colon are skipped.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| split_line(line))
    }

    /// Returns the last value with case-insensitive name matching.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
            .last()
    }

    /// Returns every value with case-insensitive name matching, in line order.
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
            .collect()
    }

    #[inline]
    pub fn has(&self, name: &str) -> bool {
        self.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

impl HeaderSink for Headers {
    #[inline]
    fn push_line(&mut self, line: String) {
        self.lines.push(line);
    }
}

#[inline]
fn split_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    Some((name, value.trim_matches(|c| c == ' ' || c == '\t')))
}

#[inline]
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Accumulates header lines until the empty line ending the block.
///
/// The cursor must be at the first header line. On success the cursor is
/// left just past the terminating `CRLF`.
///
/// Returns `Ok(false)` for a line ending in a bare `LF` and when the peer
/// closes the connection or stalls for longer than `timeout`.
/// Fails with [`HeadersTooLarge`] once more than `max_size` bytes have been
/// scanned, or when a single line does not fit into the buffer.
pub async fn read_headers<S, H>(
    stream: &mut S,
    buffer: &mut MessageBuffer,
    sink: &mut H,
    timeout: Duration,
    max_size: usize,
) -> Result<bool, HeadersTooLarge>
where
    S: AsyncRead + Unpin,
    H: HeaderSink + ?Sized,
{
    let too_large = HeadersTooLarge { max: max_size };

    // Bytes of the current line already searched for `LF`
    let mut offset = 0;
    let mut scanned = 0;

    loop {
        let window = buffer.unread();

        let Some(found) = memchr(b'\n', &window[offset..]) else {
            scanned += window.len() - offset;
            if scanned > max_size {
                return Err(too_large);
            }
            offset = window.len();

            buffer.compact();
            if buffer.is_full() {
                debug!(capacity = buffer.capacity(), "header line does not fit into the buffer");
                return Err(too_large);
            }
            if !buffer.fill_or_close(stream, timeout).await {
                return Ok(false);
            }
            continue;
        };

        let lf = offset + found;
        scanned += found + 1;
        if scanned > max_size {
            return Err(too_large);
        }

        if lf == 0 || window[lf - 1] != b'\r' {
            debug!("header line not terminated by CRLF");
            return Ok(false);
        }

        if lf == 1 {
            buffer.advance(2);
            trace!(scanned, "end of header block");
            return Ok(true);
        }

        sink.push_line(latin1(&window[..lf - 1]));
        buffer.advance(lf + 1);
        offset = 0;
    }
}
