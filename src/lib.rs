//! h1_wire - Wire-level HTTP/1.x message parsing over async streams
//!
//! Turns bytes arriving on a socket into a request or response: request and
//! status lines, header lines and a body framed by `Content-Length`, chunked
//! transfer coding or connection close. Limits and timeouts are enforced on
//! every step, so a slow or hostile peer costs a bounded amount of memory
//! and time.
//!
//! # Protocol Support
//!
//! - **HTTP/1.1**: `Content-Length`, chunked bodies (extensions ignored,
//!   trailers rejected) and `Expect: 100-continue`
//! - **HTTP/1.0**: bodies delimited by connection close
//! - **HTTP/2**: detected and rejected
//!
//! # Memory
//!
//! Each reader owns one buffer of [`ReqLimits::buffer_size`](limits::ReqLimits::buffer_size)
//! bytes. A body that does not fit triggers at most **one** replacement
//! allocation of [`ReqLimits::max_message_size`](limits::ReqLimits::max_message_size)
//! bytes; a body that outgrows it is rejected with `413`.
//!
//! # Examples
//!
//! Server side:
//! ```no_run
//! use h1_wire::{limits::{ConnLimits, ReqLimits}, MessageReader, Version};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!
//!     loop {
//!         let (stream, _) = listener.accept().await?;
//!
//!         tokio::spawn(async move {
//!             let mut reader =
//!                 MessageReader::new(stream, ReqLimits::default(), ConnLimits::default())
//!                     .with_continue();
//!
//!             loop {
//!                 match reader.read_request().await {
//!                     Ok(request) => {
//!                         println!("{} {}: {} bytes", request.method, request.target, request.body.len());
//!                     }
//!                     Err(err) => {
//!                         let _ = reader.send_error(&err, Version::Http11).await;
//!                         break;
//!                     }
//!                 }
//!             }
//!         });
//!     }
//! }
//! ```
//! Client side, after writing a `GET` request:
//! ```no_run
//! use h1_wire::{limits::{ConnLimits, ReqLimits}, Method, MessageReader};
//! use tokio::net::TcpStream;
//!
//! # async fn run(stream: TcpStream) -> Result<(), h1_wire::ReadError> {
//! let mut reader = MessageReader::new(stream, ReqLimits::default(), ConnLimits::default());
//!
//! let response = reader.read_response(&Method::Get).await?;
//! println!("{} ({} bytes)", response.code, response.body.len());
//! # Ok(())
//! # }
//! ```
//!
//! The building blocks ([`read_headers`], [`read_body`], the line parsers)
//! work on a caller-owned [`MessageBuffer`] for custom connection loops.

pub(crate) mod http {
    pub(crate) mod body;
    pub(crate) mod buffer;
    pub(crate) mod chars;
    pub(crate) mod headers;
    pub(crate) mod line;
    pub(crate) mod types;
}
pub(crate) mod connection {
    pub(crate) mod reader;
}
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    connection::reader::{MessageReader, Request, Response},
    errors::{HeadersTooLarge, InvalidStatusLine, ReadError, Status},
    http::{
        body::{read_body, BodyRead, MessageContext, CONTINUE_RESPONSE},
        buffer::MessageBuffer,
        chars::{is_method_byte, is_status_code, is_uri_byte},
        headers::{
            read_headers, HeaderSink, Headers, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE,
            EXPECT, TRAILER, TRANSFER_ENCODING,
        },
        line::{
            parse_method, parse_request_line, parse_status_code, parse_status_line, parse_uri,
            parse_version, RequestLine, StatusLine, MAX_METHOD_LEN,
        },
        types::{Method, Version},
    },
};

#[cfg(test)]
pub mod tools {
    use std::time::Duration;
    use tokio_test::io::{Builder, Mock};

    /// A peer sending `data` two bytes at a time.
    pub fn slow(data: &[u8]) -> Mock {
        let mut builder = Builder::new();
        for pair in data.chunks(2) {
            builder.wait(Duration::from_millis(2)).read(pair);
        }
        builder.build()
    }

    /// `len` lowercase letters that do not repeat too often.
    pub fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| b'a' + (i * 7 % 26) as u8).collect()
    }
}
