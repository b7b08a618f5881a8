use std::{io, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    time::sleep,
};
use tracing::{debug, trace};

/// Fixed-capacity byte buffer with a read cursor and a write limit.
///
/// ```text
/// 0           pos             len                 capacity
/// |  consumed  |    unread     |    free space     |
/// ```
///
/// `pos <= len <= capacity` holds after every operation. Socket reads
/// always append at `len`, so a buffer returned from a step that needs more
/// data is ready to be filled again.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageBuffer {
    pos: usize,
    len: usize,
    buffer: Box<[u8]>,
}

impl MessageBuffer {
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        let buffer = vec![0; capacity].into_boxed_slice();

        MessageBuffer {
            pos: 0,
            len: 0,
            buffer,
        }
    }

    /// Buffer of `capacity` bytes pre-filled with `value` as unread data.
    ///
    /// `value` is truncated if it does not fit.
    #[inline]
    pub fn from<V: AsRef<[u8]>>(capacity: usize, value: V) -> Self {
        let mut buffer = Self::with_capacity(capacity);

        let value = value.as_ref();
        let len = value.len().min(capacity);
        buffer.buffer[..len].copy_from_slice(&value[..len]);
        buffer.len = len;

        buffer
    }

    #[inline]
    pub fn clear(&mut self) {
        self.pos = 0;
        self.len = 0;
    }
}

// Cursors
impl MessageBuffer {
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[inline(always)]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline(always)]
    pub fn limit(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn remaining(&self) -> usize {
        self.len - self.pos
    }

    #[inline(always)]
    pub fn is_full(&self) -> bool {
        self.len == self.buffer.len()
    }

    /// Bytes between the cursor and the limit.
    #[inline(always)]
    pub fn unread(&self) -> &[u8] {
        &self.buffer[self.pos..self.len]
    }

    /// Bytes between `start` and the limit, regardless of the cursor.
    #[inline(always)]
    pub(crate) fn window(&self, start: usize) -> &[u8] {
        self.buffer.get(start..self.len).unwrap_or_default()
    }

    /// Reads the byte at the cursor and advances past it.
    #[inline]
    pub fn get(&mut self) -> Option<u8> {
        let byte = self.peek(0)?;
        self.pos += 1;
        Some(byte)
    }

    /// Byte `offset` bytes past the cursor, without consuming it.
    #[inline(always)]
    pub fn peek(&self, offset: usize) -> Option<u8> {
        self.unread().get(offset).copied()
    }

    /// Moves the cursor forward, never past the limit.
    #[inline]
    pub fn advance(&mut self, count: usize) {
        self.pos = (self.pos + count).min(self.len);
    }

    /// Moves the cursor to `pos`, clamped to the limit.
    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.len);
    }

    /// Shrinks the limit to `len`, clamping the cursor.
    #[inline]
    pub(crate) fn truncate(&mut self, len: usize) {
        self.len = len.min(self.len);
        self.pos = self.pos.min(self.len);
    }
}

// Compaction
impl MessageBuffer {
    /// Moves the unread bytes to the front of the buffer.
    #[inline]
    pub fn compact(&mut self) {
        self.slide_unread_to(0);
    }

    /// Moves the unread bytes down so they start at `dst`.
    ///
    /// Bytes in `dst..pos` are overwritten. Returns `false` and leaves the
    /// buffer untouched if `dst` is past the cursor.
    #[inline]
    pub fn slide_unread_to(&mut self, dst: usize) -> bool {
        if dst > self.pos {
            return false;
        }
        if dst == self.pos {
            return true;
        }

        let unread = self.remaining();
        self.buffer.copy_within(self.pos..self.len, dst);
        self.pos = dst;
        self.len = dst + unread;

        true
    }

    /// Copies content and cursors into a new, larger buffer.
    ///
    /// Returns `None` if `capacity` is not larger than the current one.
    #[inline]
    pub fn grow_into(&self, capacity: usize) -> Option<MessageBuffer> {
        if capacity <= self.capacity() {
            return None;
        }

        let mut grown = Self::with_capacity(capacity);
        grown.buffer[..self.len].copy_from_slice(&self.buffer[..self.len]);
        grown.pos = self.pos;
        grown.len = self.len;

        debug!(from = self.capacity(), to = capacity, "message buffer reallocated");
        Some(grown)
    }
}

// Socket
impl MessageBuffer {
    /// Reads once from `stream` into the free space after the limit.
    ///
    /// A read that does not complete within `time` fails with
    /// [`io::ErrorKind::TimedOut`]. Reading into a full buffer returns `Ok(0)`
    /// without touching the stream.
    #[inline]
    pub async fn fill<S: AsyncRead + Unpin>(
        &mut self,
        stream: &mut S,
        time: Duration,
    ) -> Result<usize, io::Error> {
        if self.is_full() {
            return Ok(0);
        }

        tokio::select! {
            biased;

            read_result = stream.read(&mut self.buffer[self.len..]) => {
                let n = read_result?;
                self.len += n;
                trace!(read = n, buffered = self.len, "socket read");
                Ok(n)
            }
            _ = sleep(time) => {
                Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout"))
            },
        }
    }

    /// Like [`fill`](Self::fill), but folds timeouts and socket errors into
    /// a zero-byte read. Returns `false` when no byte arrived.
    #[inline]
    pub(crate) async fn fill_or_close<S: AsyncRead + Unpin>(
        &mut self,
        stream: &mut S,
        time: Duration,
    ) -> bool {
        match self.fill(stream, time).await {
            Ok(0) => {
                debug!("peer closed the connection");
                false
            }
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err, "socket read failed");
                false
            }
        }
    }
}
