mod channel;
mod port;


pub use channel::BufferedChannel;
pub use port::open_port;

use async_trait::async_trait;
use std::io;
use std::time::Duration;

/// Byte-oriented, half-duplex serial link with deadline-bounded reads.
///
/// The device speaks one conversation at a time, so a single owner holds the
/// channel for a full receive/command cycle. No read blocks past its
/// deadline; a hardware disconnect surfaces as an I/O error.
#[async_trait]
pub trait SerialChannel: Send {
    /// Read the next newline-terminated line, trimmed of trailing CR/LF.
    /// Returns `None` if the deadline expires before a full line arrives.
    async fn read_line(&mut self, deadline: Duration) -> io::Result<Option<String>>;

    /// Read up to `max` raw payload bytes. Returns whatever arrived before
    /// the deadline, possibly empty.
    async fn read_chunk(&mut self, max: usize, deadline: Duration) -> io::Result<Vec<u8>>;

    /// Write bytes and flush them to the wire.
    async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Discard any inbound bytes left over from a previous cycle.
    async fn flush_input(&mut self) -> io::Result<()>;

    /// Return the next line formed from bytes already waiting, without
    /// blocking beyond an immediate poll of the underlying stream.
    async fn drain_line(&mut self) -> io::Result<Option<String>>;
}
