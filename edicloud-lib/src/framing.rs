//! Blocking-style read primitives over an async byte stream.
//!
//! Two framings share the relay connection: text headers terminated by a
//! marker (`\r\n\r\n`), and bodies whose length was announced up front.
//! Every individual read is bounded by the receive timeout, and no frame
//! may exceed the stream's length limit.

use crate::constants::{MAX_FRAME_SIZE, READ_CHUNK_SIZE, ZERO_READ_LIMIT};
use crate::error::Error;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::trace;

/// A byte stream with a per-read timeout.
pub struct FramedStream<S> {
    inner: S,
    read_timeout: Duration,
    max_len: usize,
}

impl<S> FramedStream<S> {
    pub fn new(inner: S, read_timeout: Duration) -> Self {
        Self {
            inner,
            read_timeout,
            max_len: MAX_FRAME_SIZE,
        }
    }

    /// Limit the size of any single frame read from this stream.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    fn check_len(&self, len: usize) -> Result<(), Error> {
        if len > self.max_len {
            return Err(Error::Protocol(format!(
                "Frame of {}b exceeds the {}b limit",
                len, self.max_len
            )));
        }
        Ok(())
    }
}

impl<S: AsyncRead + Unpin> FramedStream<S> {
    /// Read exactly `n` bytes.
    ///
    /// Empty reads are tolerated: a stalled or half-closed socket only
    /// counts as dead once more than [`ZERO_READ_LIMIT`] of them happen in
    /// a row, in which case [`Error::ConnectionBroken`] is returned.
    ///
    /// A length above the stream's limit is rejected with
    /// [`Error::Protocol`] before anything is read. The buffer grows with the
    /// data that actually arrives.
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes, Error> {
        self.check_len(n)?;
        let mut buf = BytesMut::with_capacity(n.min(READ_CHUNK_SIZE));
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut zeros = 0u32;
        while buf.len() < n {
            let want = (n - buf.len()).min(READ_CHUNK_SIZE);
            trace!("Waiting for {}b", n - buf.len());
            let read = timeout(self.read_timeout, self.inner.read(&mut chunk[..want])).await??;
            trace!(target: "edicloud::wire::hex", bytes = hex::encode(&chunk[..read]), "<<");
            buf.extend_from_slice(&chunk[..read]);
            if read == 0 {
                zeros += 1;
                if zeros > ZERO_READ_LIMIT {
                    return Err(Error::ConnectionBroken);
                }
            } else {
                zeros = 0;
            }
        }
        Ok(buf.freeze())
    }

    /// Read one byte at a time until the accumulated data ends with `marker`.
    ///
    /// The marker is part of the returned bytes. Fails with
    /// [`Error::Protocol`] once the data outgrows the stream's limit without
    /// a marker.
    pub async fn read_until(&mut self, marker: &[u8]) -> Result<Bytes, Error> {
        trace!("Reading bytes until {}", hex::encode_upper(marker));
        let mut result = BytesMut::with_capacity(64);
        let mut byte = [0u8; 1];
        loop {
            let read = timeout(self.read_timeout, self.inner.read(&mut byte)).await??;
            if read == 0 {
                return Err(Error::EndOfStream);
            }
            self.check_len(result.len() + 1)?;
            result.put_u8(byte[0]);
            if !marker.is_empty() && result.ends_with(marker) {
                break;
            }
        }
        trace!("Received {}b", result.len());
        trace!(target: "edicloud::wire::hex", bytes = hex::encode(&result), "<<");
        Ok(result.freeze())
    }
}

impl<S: AsyncWrite + Unpin> FramedStream<S> {
    /// Write the whole buffer and flush it.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<(), Error> {
        trace!(target: "edicloud::wire::hex", bytes = hex::encode(data), ">>");
        timeout(self.read_timeout, self.inner.write_all(data)).await??;
        timeout(self.read_timeout, self.inner.flush()).await??;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), Error> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Replays a scripted sequence of reads; `None` is an empty read.
    struct Scripted {
        reads: VecDeque<Option<Vec<u8>>>,
    }

    impl Scripted {
        fn new(reads: Vec<Option<Vec<u8>>>) -> Self {
            Self { reads: reads.into() }
        }
    }

    impl AsyncRead for Scripted {
        fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
            match self.reads.pop_front() {
                Some(Some(mut data)) => {
                    let n = data.len().min(buf.remaining());
                    buf.put_slice(&data[..n]);
                    if n < data.len() {
                        let rest = data.split_off(n);
                        self.reads.push_front(Some(rest));
                    }
                }
                Some(None) | None => {}
            }
            Poll::Ready(Ok(()))
        }
    }

    fn framed(reads: Vec<Option<Vec<u8>>>) -> FramedStream<Scripted> {
        FramedStream::new(Scripted::new(reads), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_read_exact_collects_partial_reads() {
        let mut stream = framed(vec![Some(b"ab".to_vec()), None, Some(b"cde".to_vec())]);
        let data = stream.read_exact(5).await.unwrap();
        assert_eq!(data.as_ref(), b"abcde");
    }

    #[tokio::test]
    async fn test_read_exact_survives_hundred_empty_reads() {
        let mut reads = vec![None; 100];
        reads.push(Some(b"xy".to_vec()));
        let mut stream = framed(reads);
        assert_eq!(stream.read_exact(2).await.unwrap().as_ref(), b"xy");
    }

    #[tokio::test]
    async fn test_read_exact_breaks_on_hundred_and_first_empty_read() {
        let mut reads = vec![None; 101];
        reads.push(Some(b"xy".to_vec()));
        let mut stream = framed(reads);
        assert!(matches!(stream.read_exact(2).await, Err(Error::ConnectionBroken)));
    }

    #[tokio::test]
    async fn test_read_exact_progress_resets_counter() {
        let mut reads = vec![None; 99];
        reads.push(Some(b"a".to_vec()));
        reads.extend(vec![None; 99]);
        reads.push(Some(b"b".to_vec()));
        let mut stream = framed(reads);
        assert_eq!(stream.read_exact(2).await.unwrap().as_ref(), b"ab");
    }

    #[tokio::test]
    async fn test_read_exact_zero_length() {
        let mut stream = framed(vec![]);
        assert!(stream.read_exact(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_until_marker() {
        let mut stream = framed(vec![Some(b"PnvDataLen: 12\r\n\r\nrest".to_vec())]);
        let header = stream.read_until(b"\r\n\r\n").await.unwrap();
        assert_eq!(header.as_ref(), b"PnvDataLen: 12\r\n\r\n");
        // The bytes after the marker stay in the stream
        assert_eq!(stream.read_exact(4).await.unwrap().as_ref(), b"rest");
    }

    #[tokio::test]
    async fn test_read_exact_rejects_oversized_length() {
        let mut stream = framed(vec![Some(b"abc".to_vec())]).with_max_len(16);
        assert!(matches!(stream.read_exact(17).await, Err(Error::Protocol(_))));
        // Nothing was consumed
        assert_eq!(stream.read_exact(3).await.unwrap().as_ref(), b"abc");
    }

    #[tokio::test]
    async fn test_read_exact_huge_length_fails_without_allocating() {
        let mut stream = framed(vec![Some(b"abc".to_vec())]);
        assert!(matches!(stream.read_exact(100_000_000_000_000).await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_read_exact_spans_several_chunks() {
        let data: Vec<u8> = (0..READ_CHUNK_SIZE * 2 + 5).map(|i| i as u8).collect();
        let mut stream = framed(vec![Some(data.clone())]);
        assert_eq!(stream.read_exact(data.len()).await.unwrap().as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn test_read_until_stops_at_limit() {
        let mut stream = framed(vec![Some(vec![b'a'; 64])]).with_max_len(32);
        assert!(matches!(stream.read_until(b"\r\n\r\n").await, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_read_until_eof_before_marker() {
        let mut stream = framed(vec![Some(b"PnvDataLen: 12\r\n".to_vec())]);
        assert!(matches!(stream.read_until(b"\r\n\r\n").await, Err(Error::EndOfStream)));
    }
}
