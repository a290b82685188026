use crate::error::Result;
use crate::message::SignalMessage;
use log::trace;
use std::path::Path;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Writes signaling messages, one JSON object per line, flushing after each
/// so the peer on the other end of a pipe sees it immediately.
pub struct SignalWriter {
    out: Box<dyn AsyncWrite + Send + Unpin>,
}

impl SignalWriter {
    pub fn new<W>(out: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self { out: Box::new(out) }
    }

    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }

    /// Creates (or truncates) `path` and writes to it.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Self::new(file))
    }

    pub async fn write(&mut self, msg: &SignalMessage) -> Result<()> {
        let line = msg.to_json_line()?;
        trace!("signal out: {}", line.trim_end());
        self.out.write_all(line.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.out.shutdown().await?;
        Ok(())
    }
}
