//! Message body reader
//!
//! ```text
//! Transfer-Encoding: chunked  -> size line -> data CRLF -> ... -> "0" CRLF CRLF
//! Content-Length: N           -> exactly N bytes
//! HTTP/1.0 or Content-Type    -> everything until the peer closes
//! otherwise                   -> no body
//! ```
//!
//! The body is always assembled at offset `0` of a buffer. When it does not
//! fit, a single replacement of `max_size` bytes is allocated; a body that
//! outgrows the replacement too is rejected with `413`.

use crate::{
    errors::Status,
    http::{
        buffer::MessageBuffer,
        headers::{
            Headers, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, EXPECT, TRAILER,
            TRANSFER_ENCODING,
        },
        types::{hex_to_usize, slice_to_usize, Version},
    },
    limits::{ConnLimits, ReqLimits},
};
use memchr::memchr;
use std::{io, ops::Range, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    time::timeout,
};
use tracing::{debug, trace};

/// Interim response sent before reading the body of an
/// `Expect: 100-continue` request.
pub const CONTINUE_RESPONSE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// What the body reader needs to know about the message around the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    pub version: Version,
    /// A non-empty body is a `400` when this is `false`.
    pub body_allowed: bool,
    /// An empty body is a `400` when this is `true`.
    pub body_required: bool,
    /// Capacity of the replacement buffer, and so the largest accepted body.
    pub max_size: usize,
    /// Longest accepted chunk-size line, extensions included.
    pub chunk_line_size: usize,
}

impl MessageContext {
    /// Context allowing, but not requiring, a body.
    #[inline]
    pub fn new(version: Version, limits: &ReqLimits) -> Self {
        Self {
            version,
            body_allowed: true,
            body_required: false,
            max_size: limits.max_message_size,
            chunk_line_size: limits.chunk_line_size,
        }
    }

    #[inline]
    pub fn body_allowed(mut self, allowed: bool) -> Self {
        self.body_allowed = allowed;
        self
    }

    #[inline]
    pub fn body_required(mut self, required: bool) -> Self {
        self.body_required = required;
        self
    }
}

/// Outcome of [`read_body`].
///
/// On success the buffer holding the body has its cursor at `0` and its
/// limit at the end of the body, so `unread()` is exactly the body.
#[derive(Debug, PartialEq)]
pub enum BodyRead {
    /// The body is in the caller's buffer, at this range.
    Fits(Range<usize>),
    /// The body did not fit and was assembled in this replacement buffer.
    Reallocated(MessageBuffer),
    Rejected(Status),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Length,
    Chunked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    SizeLine,
    Data { size: usize },
    LastCrlf,
    Done,
}

/// Reads the body following a header block.
///
/// `buffer` must have its cursor at the first body byte. Bytes already
/// buffered count as the start of the body.
///
/// `continue_response` is written before any body byte is read when the
/// message carries `Expect: 100-continue`; pass `None` to ignore the
/// expectation (responses, or servers that never send `100`).
pub async fn read_body<S>(
    stream: &mut S,
    buffer: &mut MessageBuffer,
    context: &MessageContext,
    headers: &Headers,
    continue_response: Option<&[u8]>,
    limits: &ConnLimits,
) -> BodyRead
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    buffer.compact();

    let max_size = context.max_size.max(buffer.capacity());
    let mut body = BodyBuffer {
        original: buffer,
        grown: None,
        max_size,
    };

    let mut reader = BodyReader {
        stream,
        body: &mut body,
        context,
        headers,
        continue_response,
        limits,
    };

    let result = match framing(headers) {
        Ok(Framing::Length) => reader.read_length().await,
        Ok(Framing::Chunked) => reader.read_chunked().await,
        Err(status) => Err(status),
    };

    let len = match result.and_then(|len| check_presence(context, len)) {
        Ok(len) => len,
        Err(status) => {
            debug!(code = status.code(), "body rejected");
            return BodyRead::Rejected(status);
        }
    };

    trace!(len, reallocated = body.grown.is_some(), "body complete");

    match body.grown {
        Some(mut grown) => {
            grown.truncate(len);
            grown.set_position(0);
            BodyRead::Reallocated(grown)
        }
        None => {
            body.original.truncate(len);
            body.original.set_position(0);
            BodyRead::Fits(0..len)
        }
    }
}

fn framing(headers: &Headers) -> Result<Framing, Status> {
    let tokens = codings(headers, TRANSFER_ENCODING);

    match tokens.as_slice() {
        [] => Ok(Framing::Length),
        [coding] if coding.eq_ignore_ascii_case("identity") => Ok(Framing::Length),
        [coding] if coding.eq_ignore_ascii_case("chunked") => {
            if headers.has(CONTENT_LENGTH) {
                debug!("both Transfer-Encoding and Content-Length present");
                return Err(Status::BadRequest);
            }
            Ok(Framing::Chunked)
        }
        _ => {
            debug!(?tokens, "unsupported transfer coding");
            Err(Status::BadRequest)
        }
    }
}

/// Every coding token of `name`, across repeated lines and comma lists.
fn codings<'h>(headers: &'h Headers, name: &str) -> Vec<&'h str> {
    headers
        .values(name)
        .into_iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .collect()
}

fn check_presence(context: &MessageContext, len: usize) -> Result<usize, Status> {
    if len > 0 && !context.body_allowed {
        debug!(len, "body not allowed");
        return Err(Status::BadRequest);
    }
    if len == 0 && context.body_required {
        debug!("body required");
        return Err(Status::BadRequest);
    }
    Ok(len)
}

fn check_content_coding(headers: &Headers) -> Result<(), Status> {
    match codings(headers, CONTENT_ENCODING)
        .into_iter()
        .find(|coding| !coding.is_empty() && !coding.eq_ignore_ascii_case("identity"))
    {
        Some(coding) => {
            debug!(coding, "unsupported content coding");
            Err(Status::UnsupportedMediaType)
        }
        None => Ok(()),
    }
}

fn content_length(headers: &Headers) -> Result<Option<usize>, Status> {
    let mut declared = None;

    for value in headers.values(CONTENT_LENGTH) {
        let Some(len) = slice_to_usize(value.as_bytes()) else {
            debug!(value, "invalid Content-Length");
            return Err(Status::BadRequest);
        };
        if declared.is_some_and(|prev| prev != len) {
            debug!("conflicting Content-Length values");
            return Err(Status::BadRequest);
        }
        declared = Some(len);
    }

    Ok(declared)
}

#[inline]
fn expects_continue(headers: &Headers) -> bool {
    headers
        .value(EXPECT)
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("100-continue"))
}

#[inline]
fn trim_ows(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}

/// `chunk-size [ ";" chunk-ext ]`, extensions are ignored.
fn parse_chunk_size(line: &[u8]) -> Option<usize> {
    let size = match memchr(b';', line) {
        Some(semi) => &line[..semi],
        None => line,
    };
    hex_to_usize(trim_ows(size))
}

/// The caller's buffer plus the replacement allocated for an oversized body.
struct BodyBuffer<'a> {
    original: &'a mut MessageBuffer,
    grown: Option<MessageBuffer>,
    max_size: usize,
}

impl BodyBuffer<'_> {
    #[inline(always)]
    fn get(&mut self) -> &mut MessageBuffer {
        match self.grown {
            Some(ref mut grown) => grown,
            None => &mut *self.original,
        }
    }

    fn grow(&mut self) -> Result<(), Status> {
        if self.grown.is_some() {
            debug!(max = self.max_size, "body outgrew the replacement buffer");
            return Err(Status::PayloadTooLarge);
        }

        match self.original.grow_into(self.max_size) {
            Some(grown) => {
                self.grown = Some(grown);
                Ok(())
            }
            None => {
                debug!(max = self.max_size, "body outgrew the buffer");
                Err(Status::PayloadTooLarge)
            }
        }
    }

    /// Makes sure the buffer can hold `end` bytes.
    fn reserve(&mut self, end: usize) -> Result<(), Status> {
        if end <= self.get().capacity() {
            return Ok(());
        }

        self.grow()?;
        if end <= self.get().capacity() {
            Ok(())
        } else {
            debug!(end, max = self.max_size, "body does not fit");
            Err(Status::PayloadTooLarge)
        }
    }

    /// One more socket read, growing a full buffer first.
    async fn read_more<S: AsyncRead + Unpin>(
        &mut self,
        stream: &mut S,
        time: Duration,
    ) -> Result<(), Status> {
        if self.get().is_full() {
            self.grow()?;
        }

        if self.get().fill_or_close(stream, time).await {
            Ok(())
        } else {
            Err(Status::BadRequest)
        }
    }

    /// Reads until at least `end` bytes are buffered.
    async fn fill_to<S: AsyncRead + Unpin>(
        &mut self,
        stream: &mut S,
        end: usize,
        time: Duration,
    ) -> Result<(), Status> {
        self.reserve(end)?;

        while self.get().limit() < end {
            if !self.get().fill_or_close(stream, time).await {
                return Err(Status::BadRequest);
            }
        }
        Ok(())
    }
}

struct BodyReader<'a, 'b, S> {
    stream: &'a mut S,
    body: &'a mut BodyBuffer<'b>,
    context: &'a MessageContext,
    headers: &'a Headers,
    continue_response: Option<&'a [u8]>,
    limits: &'a ConnLimits,
}

impl<S> BodyReader<'_, '_, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// `Content-Length`, or read-to-close for HTTP/1.0 and typed bodies.
    async fn read_length(&mut self) -> Result<usize, Status> {
        let declared = content_length(self.headers)?;

        let mut continued = false;
        let len = match declared {
            Some(len) => len,
            None if self.context.version == Version::Http10 || self.headers.has(CONTENT_TYPE) => {
                self.expect_continue().await?;
                continued = true;
                self.read_to_close().await?
            }
            None => 0,
        };

        let buffered = self.body.get().remaining();
        if buffered > len {
            debug!(buffered, len, "more body bytes than announced");
            return Err(Status::BadRequest);
        }
        if len == 0 {
            return Ok(0);
        }

        if !self.context.body_allowed {
            debug!(len, "body not allowed");
            return Err(Status::BadRequest);
        }
        check_content_coding(self.headers)?;

        if len > self.body.max_size {
            debug!(len, max = self.body.max_size, "Content-Length too large");
            return Err(Status::PayloadTooLarge);
        }
        self.body.reserve(len)?;

        if !continued {
            self.expect_continue().await?;
        }

        let time = self.limits.socket_read_timeout;
        while self.body.get().remaining() < len {
            self.body.read_more(self.stream, time).await?;

            if self.body.get().remaining() > len {
                debug!(len, "more body bytes than announced");
                return Err(Status::BadRequest);
            }
        }

        Ok(len)
    }

    async fn read_to_close(&mut self) -> Result<usize, Status> {
        let time = self.limits.socket_read_timeout;

        loop {
            if self.body.get().is_full() {
                self.body.grow()?;
            }
            if !self.body.get().fill_or_close(self.stream, time).await {
                break;
            }
        }

        Ok(self.body.get().remaining())
    }

    /// Decodes a chunked body in place.
    ///
    /// ```text
    /// 0                out            pos           limit
    /// | decoded data    | consumed wire | unread wire  |
    /// ```
    ///
    /// Size lines and chunk terminators are dropped by sliding the unread
    /// wire bytes down to `out`.
    async fn read_chunked(&mut self) -> Result<usize, Status> {
        if !self.context.body_allowed {
            debug!("chunked body not allowed");
            return Err(Status::BadRequest);
        }
        if self.headers.has(TRAILER) {
            debug!("trailer fields are not supported");
            return Err(Status::BadRequest);
        }
        check_content_coding(self.headers)?;
        self.expect_continue().await?;

        let time = self.limits.socket_read_timeout;
        let mut out = 0;
        let mut state = ChunkedState::SizeLine;

        loop {
            state = match state {
                ChunkedState::SizeLine => {
                    let size = self.read_chunk_size(out).await?;
                    self.body.get().slide_unread_to(out);

                    trace!(size, out, "chunk");
                    if size == 0 {
                        ChunkedState::LastCrlf
                    } else {
                        ChunkedState::Data { size }
                    }
                }
                ChunkedState::Data { size } => {
                    let end = out
                        .checked_add(size)
                        .and_then(|end| end.checked_add(2))
                        .ok_or(Status::PayloadTooLarge)?;
                    self.body.fill_to(self.stream, end, time).await?;

                    let buffer = self.body.get();
                    if !buffer.window(out + size).starts_with(b"\r\n") {
                        debug!(size, "chunk data not terminated by CRLF");
                        return Err(Status::BadRequest);
                    }

                    out += size;
                    buffer.set_position(end);
                    ChunkedState::SizeLine
                }
                ChunkedState::LastCrlf => {
                    self.body.fill_to(self.stream, out + 2, time).await?;

                    let buffer = self.body.get();
                    if !buffer.window(out).starts_with(b"\r\n") {
                        debug!("trailer section after the last chunk");
                        return Err(Status::BadRequest);
                    }
                    if buffer.limit() > out + 2 {
                        debug!(extra = buffer.limit() - out - 2, "bytes after the last chunk");
                        return Err(Status::BadRequest);
                    }
                    ChunkedState::Done
                }
                ChunkedState::Done => return Ok(out),
            };
        }
    }

    /// Parses the size line at the cursor and moves past it.
    async fn read_chunk_size(&mut self, out: usize) -> Result<usize, Status> {
        let max_line = self.context.chunk_line_size;
        let time = self.limits.socket_read_timeout;
        let mut offset = 0;

        loop {
            let unread = self.body.get().unread();

            if let Some(found) = memchr(b'\n', &unread[offset..]) {
                let lf = offset + found;
                if lf > max_line {
                    debug!(max_line, "chunk size line too long");
                    return Err(Status::BadRequest);
                }

                let Some(line) = unread[..lf].strip_suffix(b"\r") else {
                    debug!("chunk size line not terminated by CRLF");
                    return Err(Status::BadRequest);
                };
                let Some(size) = parse_chunk_size(line) else {
                    debug!("invalid chunk size");
                    return Err(Status::BadRequest);
                };

                self.body.get().advance(lf + 1);
                return Ok(size);
            }

            offset = unread.len();
            if offset > max_line {
                debug!(max_line, "chunk size line too long");
                return Err(Status::BadRequest);
            }

            self.body.get().slide_unread_to(out);
            self.body.read_more(self.stream, time).await?;
        }
    }

    async fn expect_continue(&mut self) -> Result<(), Status> {
        let Some(response) = self.continue_response else {
            return Ok(());
        };
        if !expects_continue(self.headers) {
            return Ok(());
        }

        if self.body.get().remaining() > 0 {
            debug!("body sent before 100 Continue");
            return Err(Status::UnsupportedMediaType);
        }

        match send(self.stream, response, self.limits.socket_write_timeout).await {
            Ok(()) => {
                trace!("100 Continue sent");
                Ok(())
            }
            Err(err) => {
                debug!(error = %err, "failed to send 100 Continue");
                Err(Status::BadRequest)
            }
        }
    }
}

async fn send<S: AsyncWrite + Unpin>(
    stream: &mut S,
    response: &[u8],
    time: Duration,
) -> io::Result<()> {
    timeout(time, async {
        stream.write_all(response).await?;
        stream.flush().await
    })
    .await?
}
