use super::SerialChannel;
use async_trait::async_trait;
use bytes::BytesMut;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tracing::debug;

/// Line- and chunk-oriented reader over any byte stream.
///
/// Owns a receive buffer so that line reads and raw payload reads can be
/// interleaved on the same stream without losing bytes between the two.
/// The real port is `BufferedChannel<SerialStream>`; tests drive the same
/// code over an in-memory duplex stream.
pub struct BufferedChannel<S> {
    stream: S,
    rx: BytesMut,
}

impl<S> BufferedChannel<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            rx: BytesMut::with_capacity(4096),
        }
    }
}

impl<S> BufferedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Pull more bytes from the stream into the receive buffer. Returns
    /// `false` if the deadline expired with nothing read. A zero deadline
    /// still polls the stream once, so already-arrived bytes are surfaced.
    async fn fill(&mut self, deadline: Duration) -> io::Result<bool> {
        match timeout(deadline, self.stream.read_buf(&mut self.rx)).await {
            Ok(Ok(0)) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "serial stream closed",
            )),
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(false),
        }
    }

    /// Detach the next buffered line, if a full one is present.
    fn take_line(&mut self) -> Option<String> {
        let pos = self.rx.iter().position(|&b| b == b'\n')?;
        let mut line = self.rx.split_to(pos + 1);
        line.truncate(pos);
        while line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

#[async_trait]
impl<S> SerialChannel for BufferedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_line(&mut self, deadline: Duration) -> io::Result<Option<String>> {
        let opened = Instant::now();
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            let remaining = deadline.saturating_sub(opened.elapsed());
            if remaining.is_zero() {
                return Ok(None);
            }
            if !self.fill(remaining).await? {
                return Ok(None);
            }
        }
    }

    async fn read_chunk(&mut self, max: usize, deadline: Duration) -> io::Result<Vec<u8>> {
        let opened = Instant::now();
        while self.rx.is_empty() {
            let remaining = deadline.saturating_sub(opened.elapsed());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            if !self.fill(remaining).await? {
                return Ok(Vec::new());
            }
        }
        let take = self.rx.len().min(max);
        Ok(self.rx.split_to(take).to_vec())
    }

    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    async fn flush_input(&mut self) -> io::Result<()> {
        let mut discarded = self.rx.len();
        self.rx.clear();
        while self.fill(Duration::ZERO).await? {
            discarded += self.rx.len();
            self.rx.clear();
        }
        if discarded > 0 {
            debug!(discarded, "discarded stale serial bytes");
        }
        Ok(())
    }

    async fn drain_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            if !self.fill(Duration::ZERO).await? {
                return Ok(None);
            }
        }
    }
}
