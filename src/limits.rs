//! Buffer sizes, message ceilings and socket timeouts
//!
//! # Security-First Defaults
//!
//! Default limits are intentionally conservative to prevent:
//! - Memory exhaustion through oversized bodies
//! - Header flooding
//! - Slowloris-style stalls (every socket operation carries a timeout)
//!
//! # Memory Consumption
//!
//! Each reader allocates [`ReqLimits::buffer_size`] bytes up front. A message
//! whose body does not fit may trigger **one** replacement allocation of
//! [`ReqLimits::max_message_size`] bytes, released when the next message is read.
//!
//! # Examples
//!
//! ```no_run
//! use h1_wire::{limits::{ConnLimits, ReqLimits}, MessageReader};
//! use tokio::net::TcpStream;
//! use std::time::Duration;
//!
//! # async fn run(stream: TcpStream) {
//! let reader = MessageReader::new(
//!     stream,
//!     ReqLimits {
//!         max_message_size: 64 * 1024, // Larger uploads
//!         ..ReqLimits::default()
//!     },
//!     ConnLimits {
//!         socket_read_timeout: Duration::from_secs(2),
//!         ..ConnLimits::default()
//!     },
//! );
//! # }
//! ```

use std::time::Duration;

/// Shortest possible request line: `GET / HTTP/1.1\r\n`.
pub(crate) const MIN_REQUEST_LINE: usize = 16;

/// Shortest possible status line: `HTTP/1.1 200 \r\n`.
pub(crate) const MIN_STATUS_LINE: usize = 15;

/// Connection-level timeouts
///
/// Every socket read and write made while parsing a message is bounded by one
/// of these. An expired read is handled exactly like a closed connection: the
/// operation is never retried.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum duration to wait for a single socket read (default: `5 seconds`)
    pub socket_read_timeout: Duration,

    /// Maximum duration to wait for a single socket write (default: `5 seconds`)
    ///
    /// Only used to flush the `100 Continue` interim response.
    pub socket_write_timeout: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(5),
            socket_write_timeout: Duration::from_secs(5),

            _priv: (),
        }
    }
}

/// Message parsing limits and buffer allocation strategy
///
/// # Buffer growth
///
/// ```text
///   [ buffer_size ]  ---- body does not fit ---->  [ max_message_size ]  ---- still no fit ----> 413
///      original              (at most once)            replacement
/// ```
///
/// If `max_message_size` is not larger than `buffer_size` no replacement is
/// ever allocated and an oversized body is rejected right away.
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Capacity of the buffer allocated for each reader (default: `4 KB`)
    ///
    /// Holds the request/status line, the header block and, for most
    /// messages, the body.
    pub buffer_size: usize,

    /// Maximum number of header bytes scanned per message (default: `8 KB`)
    ///
    /// Exceeding it fails with [`HeadersTooLarge`](crate::HeadersTooLarge),
    /// which callers should answer with `431`.
    pub header_size: usize,

    /// Maximum body size in bytes (default: `16 KB`)
    ///
    /// Also the size of the single replacement buffer allocated when a body
    /// outgrows [`buffer_size`](Self::buffer_size).
    pub max_message_size: usize,

    /// Maximum length of a chunk-size line, extensions included (default: `1 KB`)
    pub chunk_line_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            buffer_size: 4 * 1024,
            header_size: 8 * 1024,
            max_message_size: 16 * 1024,
            chunk_line_size: 1024,

            _priv: (),
        }
    }
}

impl ReqLimits {
    /// Returns a copy with inconsistent values corrected.
    ///
    /// - `buffer_size` and `header_size` are raised to fit at least one
    ///   request line
    /// - `max_message_size` is raised to `buffer_size`
    /// - `chunk_line_size` is raised to fit `"0\r\n"`
    #[inline]
    pub fn validated(mut self) -> Self {
        self.buffer_size = self.buffer_size.max(MIN_REQUEST_LINE);
        self.header_size = self.header_size.max(MIN_REQUEST_LINE);
        self.max_message_size = self.max_message_size.max(self.buffer_size);
        self.chunk_line_size = self.chunk_line_size.max(3);

        self
    }
}
