//! Line-framed transport to the controller.
//!
//! The Prologix controller speaks a textual protocol over one TCP socket:
//! outbound lines are terminated with `\n`, inbound lines with `\r` or
//! `\r\n`. [`Transport`] captures that contract as a capability trait so
//! the session logic can run unchanged against the production TCP
//! implementation or the in-memory fake used in tests
//! ([`crate::mock::MockController`]).

use crate::error::{GpibError, GpibResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Default TCP port of the Prologix GPIB-Ethernet controller.
pub const DEFAULT_PORT: u16 = 1234;

/// One stream connection to the controller, framed as text lines.
///
/// The session owns its transport exclusively; nothing else reads or
/// writes the stream, which is why the methods take `&mut self`.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Append the outbound terminator (`\n`) and write the line.
    async fn send_line(&mut self, line: &str) -> GpibResult<()>;

    /// Read one inbound line, stripping exactly one terminator occurrence.
    ///
    /// Fails with [`GpibError::Timeout`] if no terminator arrives within
    /// `window`, and [`GpibError::Protocol`] if the stream ends first.
    async fn receive_line(&mut self, window: Duration) -> GpibResult<String>;

    /// Release the underlying stream. Idempotent.
    async fn close(&mut self) -> GpibResult<()>;
}

/// Strip exactly one trailing `\r\n`, `\r`, or `\n`.
pub(crate) fn strip_line_terminator(line: &str) -> &str {
    if let Some(rest) = line.strip_suffix("\r\n") {
        rest
    } else if let Some(rest) = line.strip_suffix('\r') {
        rest
    } else if let Some(rest) = line.strip_suffix('\n') {
        rest
    } else {
        line
    }
}

/// Production TCP transport.
#[derive(Debug)]
pub struct TcpTransport {
    stream: Option<BufReader<TcpStream>>,
    peer: String,
}

impl TcpTransport {
    /// Establish the stream connection to the controller.
    ///
    /// # Arguments
    /// * `host` - Hostname or IP address
    /// * `port` - TCP port (the controller listens on 1234)
    /// * `connect_timeout` - Window for establishing the connection
    pub async fn connect(host: &str, port: u16, connect_timeout: Duration) -> GpibResult<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                GpibError::Connection(format!(
                    "Connection attempt to {host}:{port} timed out after {connect_timeout:?}"
                ))
            })?
            .map_err(|e| GpibError::Connection(format!("Failed to connect to {host}:{port}: {e}")))?;

        // Directive lines are tiny; do not let Nagle batch them.
        stream.set_nodelay(true)?;

        tracing::info!("Connected to Prologix controller at {}:{}", host, port);

        Ok(Self {
            stream: Some(BufReader::new(stream)),
            peer: format!("{host}:{port}"),
        })
    }

    fn stream_mut(&mut self) -> GpibResult<&mut BufReader<TcpStream>> {
        self.stream.as_mut().ok_or(GpibError::Closed)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send_line(&mut self, line: &str) -> GpibResult<()> {
        let stream = self.stream_mut()?;

        tracing::debug!("GPIB tx: {:?}", line);
        stream.get_mut().write_all(line.as_bytes()).await?;
        stream.get_mut().write_all(b"\n").await?;
        stream.get_mut().flush().await?;
        Ok(())
    }

    async fn receive_line(&mut self, window: Duration) -> GpibResult<String> {
        let stream = self.stream_mut()?;

        let mut raw = Vec::new();
        let n = timeout(window, stream.read_until(b'\r', &mut raw))
            .await
            .map_err(|_| GpibError::Timeout(window))??;

        if n == 0 || !raw.ends_with(b"\r") {
            return Err(GpibError::Protocol(
                "stream ended before a terminated response".to_string(),
            ));
        }

        // A CR+LF terminator leaves the LF buffered; consume it so it does
        // not prefix the next response.
        if stream.buffer().first() == Some(&b'\n') {
            stream.consume(1);
        }

        let line = String::from_utf8(raw)
            .map_err(|e| GpibError::Protocol(format!("response is not valid UTF-8: {e}")))?;
        // LF carried over from a CR+LF terminator split across reads.
        let line = line.strip_prefix('\n').unwrap_or(&line);
        let line = strip_line_terminator(line).to_string();
        tracing::debug!("GPIB rx: {:?}", line);
        Ok(line)
    }

    async fn close(&mut self) -> GpibResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.get_mut().shutdown().await;
            tracing::debug!("Transport to {} closed", self.peer);
        }
        Ok(())
    }
}
