// ── Relay session halves ──
//
// Line-framed reader/writer over any byte stream. In production the
// stream is the TLS session from `transport::upgrade_tls`; tests drive
// the same code over `tokio::io::duplex`.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::trace;

use crate::error::Error;
use crate::protocol::{RelayCommand, RelayMessage};

/// `radio list` lines grow with the number of radios on the account.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Split a connected relay stream into its reader and writer halves.
pub fn split<S>(stream: S, idle_timeout: Duration) -> (RelayReader<ReadHalf<S>>, RelayWriter<WriteHalf<S>>)
where
    S: AsyncRead + AsyncWrite,
{
    let (read, write) = tokio::io::split(stream);
    (RelayReader::new(read, idle_timeout), RelayWriter::new(write))
}

// ── Reader ───────────────────────────────────────────────────────────

/// Reads newline-delimited relay messages, failing if the relay goes
/// quiet for longer than the idle timeout.
pub struct RelayReader<R> {
    lines: FramedRead<R, LinesCodec>,
    idle_timeout: Duration,
}

impl<R: AsyncRead + Unpin> RelayReader<R> {
    pub fn new(reader: R, idle_timeout: Duration) -> Self {
        Self {
            lines: FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)),
            idle_timeout,
        }
    }

    /// Wait for the next message.
    ///
    /// Returns `Err(Error::Closed)` when the relay closes the stream.
    pub async fn next_message(&mut self) -> Result<RelayMessage, Error> {
        match tokio::time::timeout(self.idle_timeout, self.lines.next()).await {
            Err(_) => Err(Error::timeout(self.idle_timeout)),
            Ok(None) => Err(Error::Closed),
            Ok(Some(Err(e))) => Err(e.into()),
            Ok(Some(Ok(line))) => {
                trace!(line = %line, "relay line received");
                Ok(RelayMessage::parse_line(&line))
            }
        }
    }
}

// ── Writer ───────────────────────────────────────────────────────────

/// Writes relay commands, one per line.
pub struct RelayWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> RelayWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }

    /// Send one command. `None` means no deadline (used for pings).
    pub async fn send(&mut self, command: &RelayCommand, timeout: Option<Duration>) -> Result<(), Error> {
        let mut line = command.to_line();
        line.push('\n');

        let inner = &mut self.inner;
        let write = async move {
            inner.write_all(line.as_bytes()).await?;
            inner.flush().await
        };

        match timeout {
            Some(after) => tokio::time::timeout(after, write)
                .await
                .map_err(|_| Error::timeout(after))??,
            None => write.await?,
        }
        trace!(command = command.name(), "relay command sent");
        Ok(())
    }

    /// Close the write side (TLS close_notify on a TLS stream).
    pub async fn shutdown(&mut self) -> Result<(), Error> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
