use crate::{
    errors::{HeadersTooLarge, ReadError, Status},
    http::{
        body::{read_body, BodyRead, MessageContext, CONTINUE_RESPONSE},
        buffer::MessageBuffer,
        headers::{read_headers, Headers},
        line::{parse_request_line, parse_status_line},
        types::{Method, Version},
    },
    limits::{ConnLimits, ReqLimits, MIN_REQUEST_LINE, MIN_STATUS_LINE},
};
use memchr::memchr;
use std::{io, sync::Arc};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    time::timeout,
};
use tracing::{debug, trace};

/// A parsed request. The body borrows the reader's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<'a> {
    pub method: Method,
    /// Origin-form target, absolute URLs are collapsed to their path.
    pub target: String,
    pub version: Version,
    pub headers: Headers,
    pub body: &'a [u8],
}

/// A parsed response. The body borrows the reader's buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<'a> {
    pub version: Version,
    pub code: u16,
    pub headers: Headers,
    pub body: &'a [u8],
}

/// Reads HTTP/1.x messages, one at a time, from a stream.
///
/// The reader owns one buffer of [`ReqLimits::buffer_size`] bytes. A body
/// that does not fit is assembled in a replacement buffer that lives until
/// the next message is read.
///
/// # Examples
///
/// ```no_run
/// use h1_wire::{limits::{ConnLimits, ReqLimits}, MessageReader, Version};
/// use tokio::net::TcpListener;
///
/// # async fn run() -> std::io::Result<()> {
/// let listener = TcpListener::bind("127.0.0.1:8080").await?;
/// let (stream, _) = listener.accept().await?;
///
/// let mut reader =
///     MessageReader::new(stream, ReqLimits::default(), ConnLimits::default()).with_continue();
///
/// let result = reader
///     .read_request()
///     .await
///     .map(|request| format!("{} {} ({} bytes)", request.method, request.target, request.body.len()));
///
/// match result {
///     Ok(summary) => println!("{summary}"),
///     Err(err) => reader.send_error(&err, Version::Http11).await?,
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MessageReader<S> {
    stream: S,
    buffer: MessageBuffer,
    grown: Option<MessageBuffer>,
    /// Unread bytes after an interim response start the next one.
    interim: bool,

    req_limits: ReqLimits,
    conn_limits: ConnLimits,
    continue_response: Option<Arc<[u8]>>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> MessageReader<S> {
    /// Creates a reader. `req_limits` are [validated](ReqLimits::validated).
    #[inline]
    pub fn new(stream: S, req_limits: ReqLimits, conn_limits: ConnLimits) -> Self {
        let req_limits = req_limits.validated();

        Self {
            stream,
            buffer: MessageBuffer::with_capacity(req_limits.buffer_size),
            grown: None,
            interim: false,

            req_limits,
            conn_limits,
            continue_response: None,
        }
    }

    /// Answers `Expect: 100-continue` with `HTTP/1.1 100 Continue`.
    #[inline]
    pub fn with_continue(self) -> Self {
        self.with_continue_response(Arc::from(CONTINUE_RESPONSE))
    }

    /// Answers `Expect: 100-continue` with `response`, shared between readers.
    #[inline]
    pub fn with_continue_response(mut self, response: Arc<[u8]>) -> Self {
        self.continue_response = Some(response);
        self
    }

    #[inline]
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    #[inline]
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Reads the next request.
    ///
    /// A body is accepted for every method except `HEAD`.
    pub async fn read_request(&mut self) -> Result<Request<'_>, ReadError> {
        self.read_line(MIN_REQUEST_LINE).await?;

        let Some(line) = parse_request_line(&mut self.buffer) else {
            debug!("malformed request line");
            return Err(Status::BadRequest.into());
        };
        trace!(method = %line.method, target = %line.target, version = %line.version, "request line");

        let headers = self.read_headers().await?;

        let context = MessageContext::new(line.version, &self.req_limits)
            .body_allowed(line.method != Method::Head);
        let body = self.read_body(&context, &headers).await?;

        Ok(Request {
            method: line.method,
            target: line.target,
            version: line.version,
            headers,
            body,
        })
    }

    /// Reads the next response to a request made with `request_method`.
    ///
    /// Responses to `HEAD` and `1xx`, `204` and `304` responses have no
    /// body, whatever their headers announce. Bytes already buffered after
    /// a `1xx` response are kept for the next call.
    pub async fn read_response(&mut self, request_method: &Method) -> Result<Response<'_>, ReadError> {
        self.read_line(MIN_STATUS_LINE).await?;

        let line = parse_status_line(&mut self.buffer)?;
        trace!(version = %line.version, code = line.code, "status line");

        let headers = self.read_headers().await?;

        let bodiless = *request_method == Method::Head || matches!(line.code, 204 | 304);
        let body = if (100..=199).contains(&line.code) {
            self.interim = true;
            &[][..]
        } else if bodiless {
            if self.buffer.remaining() > 0 {
                debug!(code = line.code, "unexpected body");
                return Err(Status::BadRequest.into());
            }
            &[][..]
        } else {
            let context = MessageContext::new(line.version, &self.req_limits);
            self.read_body(&context, &headers).await?
        };

        Ok(Response {
            version: line.version,
            code: line.code,
            headers,
            body,
        })
    }

    /// Writes the `connection: close` response matching `err`, if any.
    pub async fn send_error(&mut self, err: &ReadError, version: Version) -> io::Result<()> {
        let Some(response) = err.as_http(version) else {
            return Ok(());
        };

        timeout(
            self.conn_limits.socket_write_timeout,
            self.stream.write_all(response),
        )
        .await?
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> MessageReader<S> {
    /// Starts a new message and buffers at least one complete line.
    async fn read_line(&mut self, min_len: usize) -> Result<(), ReadError> {
        self.grown = None;
        if std::mem::take(&mut self.interim) {
            self.buffer.compact();
        } else {
            self.buffer.clear();
        }

        let max = self.req_limits.header_size;
        let time = self.conn_limits.socket_read_timeout;

        loop {
            let unread = self.buffer.unread();
            if unread.len() >= min_len && memchr(b'\n', unread).is_some() {
                return Ok(());
            }
            if unread.len() >= max || self.buffer.is_full() {
                return Err(HeadersTooLarge { max }.into());
            }

            if !self.buffer.fill_or_close(&mut self.stream, time).await {
                return Err(ReadError::Closed);
            }
        }
    }

    async fn read_headers(&mut self) -> Result<Headers, ReadError> {
        let mut headers = Headers::new();

        let complete = read_headers(
            &mut self.stream,
            &mut self.buffer,
            &mut headers,
            self.conn_limits.socket_read_timeout,
            self.req_limits.header_size,
        )
        .await?;

        if !complete {
            debug!("incomplete header block");
            return Err(Status::BadRequest.into());
        }
        Ok(headers)
    }

    async fn read_body(
        &mut self,
        context: &MessageContext,
        headers: &Headers,
    ) -> Result<&[u8], ReadError> {
        let result = read_body(
            &mut self.stream,
            &mut self.buffer,
            context,
            headers,
            self.continue_response.as_deref(),
            &self.conn_limits,
        )
        .await;

        match result {
            BodyRead::Fits(range) => Ok(&self.buffer.window(0)[range]),
            BodyRead::Reallocated(grown) => Ok(self.grown.insert(grown).unread()),
            BodyRead::Rejected(status) => Err(status.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::InvalidStatusLine;
    use std::time::Duration;
    use tokio_test::io::{Builder, Mock};

    fn new_reader(stream: Mock) -> MessageReader<Mock> {
        MessageReader::new(
            stream,
            ReqLimits::default(),
            ConnLimits {
                socket_read_timeout: Duration::from_millis(500),
                socket_write_timeout: Duration::from_millis(500),
                ..ConnLimits::default()
            },
        )
    }

    #[tokio::test]
    async fn get_request() {
        let stream = Builder::new()
            .read(b"GET /hello?x=1 HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\n")
            .build();
        let mut reader = new_reader(stream);

        let request = reader.read_request().await.unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.target, "/hello?x=1");
        assert_eq!(request.version, Version::Http11);
        assert_eq!(request.headers.value("host"), Some("example.com"));
        assert_eq!(request.headers.len(), 2);
        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn fragmented_post() {
        let stream = Builder::new()
            .read(b"POST http://example.com/form HT")
            .read(b"TP/1.1\r\nContent-Length: 11\r\nContent-")
            .read(b"Type: text/plain\r\n\r\nhello")
            .read(b" world")
            .build();
        let mut reader = new_reader(stream);

        let request = reader.read_request().await.unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.target, "/form");
        assert_eq!(request.headers.value("content-type"), Some("text/plain"));
        assert_eq!(request.body, b"hello world");
    }

    #[tokio::test]
    async fn custom_method() {
        let stream = Builder::new()
            .read(b"PROPFIND /dav HTTP/1.0\r\n\r\n")
            .build();
        let mut reader = new_reader(stream);

        let request = reader.read_request().await.unwrap();
        assert_eq!(request.method, Method::Custom("PROPFIND".into()));
        assert_eq!(request.version, Version::Http10);
        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn keep_alive() {
        let body = vec![b'x'; 6000];
        let mut first = b"PUT /big HTTP/1.1\r\nContent-Length: 6000\r\n\r\n".to_vec();
        first.extend_from_slice(&body);

        let stream = Builder::new()
            .read(&first)
            .read(b"POST /small HTTP/1.1\r\nContent-Length: 2\r\n\r\nok")
            .build();
        let mut reader = new_reader(stream);

        let request = reader.read_request().await.unwrap();
        assert_eq!(request.target, "/big");
        assert_eq!(request.body, &body[..]);
        assert!(reader.grown.is_some());

        let request = reader.read_request().await.unwrap();
        assert_eq!(request.target, "/small");
        assert_eq!(request.body, b"ok");
        assert!(reader.grown.is_none());
        assert_eq!(reader.buffer.capacity(), 4096);

        assert!(matches!(reader.read_request().await, Err(ReadError::Closed)));
    }

    #[tokio::test]
    async fn chunked_request() {
        let stream = Builder::new()
            .read(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n")
            .read(b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n")
            .build();
        let mut reader = new_reader(stream);

        let request = reader.read_request().await.unwrap();
        assert_eq!(request.body, b"hello world");
    }

    #[tokio::test]
    async fn expect_continue() {
        let stream = Builder::new()
            .read(b"PUT /upload HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 4\r\n\r\n")
            .write(CONTINUE_RESPONSE)
            .read(b"data")
            .build();
        let mut reader = new_reader(stream).with_continue();

        let request = reader.read_request().await.unwrap();
        assert_eq!(request.body, b"data");
    }

    #[tokio::test]
    async fn rejected_requests() {
        #[rustfmt::skip]
        let cases: [(&[u8], u16); 6] = [
            (b"GET  HTTP/1.1\r\nHost: a\r\n\r\n",               400),
            (b"GET / HTTP/2.0\r\nHost: a\r\n\r\n",              400),
            (b"GET * HTTP/1.1\r\nHost: a\r\n\r\n",              400),
            (b"GET / HTTP/1.1\r\nHost: a\n\r\n",                400),
            (b"HEAD / HTTP/1.1\r\nContent-Length: 1\r\n\r\nx", 400),
            (b"POST / HTTP/1.1\r\nContent-Length: 1\r\nContent-Encoding: br\r\n\r\nx", 415),
        ];

        for (data, code) in cases {
            let mut reader = new_reader(Builder::new().read(data).build());

            let err = reader.read_request().await.unwrap_err();
            assert_eq!(err.status(), Some(code), "{:?}", String::from_utf8_lossy(data));
        }
    }

    #[tokio::test]
    async fn payload_too_large() {
        let stream = Builder::new()
            .read(b"POST / HTTP/1.1\r\nContent-Length: 20000\r\n\r\n")
            .write(b"HTTP/1.1 413 Payload Too Large\r\nconnection: close\r\ncontent-length: 0\r\n\r\n")
            .build();
        let mut reader = new_reader(stream);

        let err = reader.read_request().await.unwrap_err();
        assert!(matches!(err, ReadError::Rejected(Status::PayloadTooLarge)));
        reader.send_error(&err, Version::Http11).await.unwrap();
    }

    #[tokio::test]
    async fn headers_too_large() {
        let mut data = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..100 {
            data.extend_from_slice(format!("X-Header-{i}: value\r\n").as_bytes());
        }

        let stream = Builder::new().read(&data).build();
        let mut reader = MessageReader::new(
            stream,
            ReqLimits {
                header_size: 1024,
                ..ReqLimits::default()
            },
            ConnLimits::default(),
        );

        let err = reader.read_request().await.unwrap_err();
        assert!(matches!(err, ReadError::HeadersTooLarge(HeadersTooLarge { max: 1024 })));
        assert_eq!(err.status(), Some(431));
    }

    #[tokio::test]
    async fn closed() {
        let mut reader = new_reader(Builder::new().build());
        assert!(matches!(reader.read_request().await, Err(ReadError::Closed)));

        let mut reader = new_reader(Builder::new().read(b"GET / HT").build());
        assert!(matches!(reader.read_request().await, Err(ReadError::Closed)));

        // Nothing to answer
        let err = ReadError::Closed;
        reader.send_error(&err, Version::Http11).await.unwrap();
    }

    #[tokio::test]
    async fn response() {
        let stream = Builder::new()
            .read(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nContent-Type: text/plain\r\n\r\nhello")
            .build();
        let mut reader = new_reader(stream);

        let response = reader.read_response(&Method::Get).await.unwrap();
        assert_eq!(response.version, Version::Http11);
        assert_eq!(response.code, 200);
        assert_eq!(response.headers.value("content-length"), Some("5"));
        assert_eq!(response.body, b"hello");
    }

    #[tokio::test]
    async fn response_until_close() {
        let stream = Builder::new()
            .read(b"HTTP/1.0 200\r\n\r\nsome")
            .read(b" bytes")
            .build();
        let mut reader = new_reader(stream);

        let response = reader.read_response(&Method::Get).await.unwrap();
        assert_eq!(response.version, Version::Http10);
        assert_eq!(response.body, b"some bytes");
    }

    #[tokio::test]
    async fn bodiless_responses() {
        #[rustfmt::skip]
        let cases: [(&[u8], Method, u16); 4] = [
            (b"HTTP/1.1 200 OK\r\nContent-Length: 120\r\n\r\n", Method::Head, 200),
            (b"HTTP/1.1 204 No Content\r\n\r\n",                Method::Delete, 204),
            (b"HTTP/1.1 304 Not Modified\r\nContent-Length: 5\r\n\r\n", Method::Get, 304),
            (b"HTTP/1.1 100 Continue\r\n\r\n",                  Method::Post, 100),
        ];

        for (data, method, code) in cases {
            let mut reader = new_reader(Builder::new().read(data).build());

            let response = reader.read_response(&method).await.unwrap();
            assert_eq!(response.code, code);
            assert!(response.body.is_empty());
        }

        let mut reader = new_reader(Builder::new().read(b"HTTP/1.1 204 \r\n\r\nbody").build());
        let err = reader.read_response(&Method::Get).await.unwrap_err();
        assert!(matches!(err, ReadError::Rejected(Status::BadRequest)));
    }

    #[tokio::test]
    async fn interim_and_final_response() {
        const INTERIM: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";
        const FINAL: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";

        // Both in one read, and the final one split after its first bytes
        #[rustfmt::skip]
        let streams = [
            Builder::new().read(&[INTERIM, FINAL].concat()).build(),
            Builder::new().read(&[INTERIM, &FINAL[..11]].concat()).read(&FINAL[11..]).build(),
        ];

        for stream in streams {
            let mut reader = new_reader(stream);

            let interim = reader.read_response(&Method::Post).await.unwrap();
            assert_eq!(interim.code, 100);
            assert!(interim.body.is_empty());

            let response = reader.read_response(&Method::Post).await.unwrap();
            assert_eq!(response.code, 200);
            assert_eq!(response.headers.value("content-length"), Some("2"));
            assert_eq!(response.body, b"ok");
        }
    }

    #[tokio::test]
    async fn invalid_status_lines() {
        #[rustfmt::skip]
        let cases: [&[u8]; 4] = [
            b"HTTP/2 200 OK\r\n\r\n",
            b"HTTP/1.1 20 OK\r\n\r\n",
            b"SSH-2.0-OpenSSH_9.0\r\n\r\n",
            b"HTTP/1.1 2xx OK\r\n\r\n",
        ];

        for data in cases {
            let mut reader = new_reader(Builder::new().read(data).build());

            let err = reader.read_response(&Method::Get).await.unwrap_err();
            assert!(
                matches!(err, ReadError::InvalidStatusLine(InvalidStatusLine)),
                "{:?}",
                String::from_utf8_lossy(data)
            );
            assert_eq!(err.as_http(Version::Http11), None);
        }
    }

    #[tokio::test]
    async fn into_inner() {
        let mut reader = new_reader(Builder::new().read(b"GET / HTTP/1.1\r\n\r\n").build());
        reader.read_request().await.unwrap();

        let _stream: Mock = reader.into_inner();
    }
}
