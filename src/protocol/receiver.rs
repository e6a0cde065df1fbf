use super::frame::{parse_size_header, FrameCapture};
use crate::capture::FrameStore;
use crate::config::ProtocolConfig;
use crate::error::{ProtocolError, Result};
use crate::serial::SerialChannel;
use chrono::Local;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Decodes exactly one marker-bounded frame per invocation.
///
/// A frame never escapes this type half-finished: the result is either a
/// persisted `FrameCapture` (possibly partial, if the payload window closed
/// early but the end marker still matched) or a `ProtocolError` naming the
/// reason no frame was produced.
pub struct FrameReceiver {
    start_marker: String,
    end_marker: String,
    start_window: Duration,
    payload_window: Duration,
    chunk_size: usize,
    poll_timeout: Duration,
}

impl FrameReceiver {
    pub fn new(config: &ProtocolConfig, poll_timeout: Duration) -> Self {
        Self {
            start_marker: config.start_marker.clone(),
            end_marker: config.end_marker.clone(),
            start_window: Duration::from_secs(config.start_window_secs),
            payload_window: Duration::from_secs(config.payload_window_secs),
            chunk_size: config.chunk_size,
            poll_timeout,
        }
    }

    /// Receive one frame: wait for the start marker, parse the size header,
    /// reassemble the payload in bounded chunks, verify the end marker, and
    /// persist the result through `store`.
    pub async fn receive<C>(&self, channel: &mut C, store: &FrameStore) -> Result<FrameCapture>
    where
        C: SerialChannel,
    {
        // Stale bytes from an aborted cycle would be misread as a header.
        channel.flush_input().await?;
        debug!("waiting for image data");

        self.await_start_marker(channel).await?;
        let size = self.read_size_header(channel).await?;
        let (payload, bytes_read) = self.read_payload(channel, size).await?;

        let end_line = channel
            .read_line(self.poll_timeout)
            .await?
            .unwrap_or_default();
        if !end_line.contains(&self.end_marker) {
            warn!(line = %end_line, "end marker not received, dropping frame");
            return Err(ProtocolError::MissingEndMarker { line: end_line }.into());
        }
        debug!("end marker received");

        let timestamp = Local::now();
        let path = store.persist(&payload, timestamp).await?;
        info!(
            path = %path.display(),
            size,
            bytes_read,
            partial = bytes_read < size,
            "frame received"
        );

        Ok(FrameCapture {
            path,
            size,
            bytes_read,
            timestamp,
        })
    }

    /// Poll line reads until the start marker appears or its window closes.
    async fn await_start_marker<C>(&self, channel: &mut C) -> Result<()>
    where
        C: SerialChannel,
    {
        let opened = Instant::now();
        loop {
            let remaining = self.start_window.saturating_sub(opened.elapsed());
            if remaining.is_zero() {
                warn!("timed out waiting for start marker");
                return Err(ProtocolError::StartTimeout.into());
            }
            let poll = remaining.min(self.poll_timeout);
            if let Some(line) = channel.read_line(poll).await? {
                debug!(%line, "serial line");
                if line.contains(&self.start_marker) {
                    debug!("start marker received");
                    return Ok(());
                }
            }
        }
    }

    /// The line after the start marker declares the payload size.
    async fn read_size_header<C>(&self, channel: &mut C) -> Result<usize>
    where
        C: SerialChannel,
    {
        let line = channel
            .read_line(self.poll_timeout)
            .await?
            .unwrap_or_default();
        match parse_size_header(&line) {
            Some(size) => {
                debug!(size, "image size header");
                Ok(size)
            }
            None => {
                warn!(line = %line, "malformed size header, aborting cycle");
                Err(ProtocolError::BadHeader { line }.into())
            }
        }
    }

    /// Reassemble up to `size` payload bytes from bounded chunks. The window
    /// is measured independently of the start-marker window; on expiry the
    /// partial buffer is forwarded anyway, since a truncated payload may
    /// still be classifiable.
    async fn read_payload<C>(&self, channel: &mut C, size: usize) -> Result<(Vec<u8>, usize)>
    where
        C: SerialChannel,
    {
        let mut payload = Vec::new();
        let mut bytes_read = 0usize;
        let opened = Instant::now();

        while bytes_read < size {
            let remaining = self.payload_window.saturating_sub(opened.elapsed());
            if remaining.is_zero() {
                break;
            }
            let want = self.chunk_size.min(size - bytes_read);
            let chunk = channel
                .read_chunk(want, remaining.min(self.poll_timeout))
                .await?;
            if !chunk.is_empty() {
                bytes_read += chunk.len();
                payload.extend_from_slice(&chunk);
                debug!(bytes_read, size, "payload progress");
            }
        }

        if bytes_read < size {
            warn!(bytes_read, size, "payload incomplete, forwarding partial frame");
        }
        Ok((payload, bytes_read))
    }
}
