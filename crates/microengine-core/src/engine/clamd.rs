//! clamd client over TCP using the null-terminated (`z`) command forms.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use microengine_gateway::ArtifactBody;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::{EngineError, ScanEngine, ScanVerdict};

/// Largest INSTREAM chunk sent in one frame.
pub const INSTREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Scan engine backed by a clamd daemon.
#[derive(Debug, Clone)]
pub struct ClamdEngine {
    addr: String,
    timeout: Duration,
}

impl ClamdEngine {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Timeout for connecting and for awaiting the daemon's reply.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Engine and signature database version, e.g. `ClamAV 0.103.8/26830/...`.
    pub async fn version(&self) -> Result<String, EngineError> {
        self.command(b"zVERSION\0").await
    }

    async fn connect(&self) -> Result<TcpStream, EngineError> {
        tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| timed_out("connect"))?
            .map_err(EngineError::from)
    }

    async fn command(&self, cmd: &[u8]) -> Result<String, EngineError> {
        let mut conn = self.connect().await?;
        conn.write_all(cmd).await?;
        let reply = self.read_reply(&mut conn).await?;
        Ok(reply_lines(&reply).join("\n"))
    }

    async fn read_reply(&self, conn: &mut TcpStream) -> Result<Vec<u8>, EngineError> {
        let mut reply = Vec::new();
        tokio::time::timeout(self.timeout, conn.read_to_end(&mut reply))
            .await
            .map_err(|_| timed_out("reply"))??;
        Ok(reply)
    }

    async fn stream_body(conn: &mut TcpStream, mut body: ArtifactBody) -> std::io::Result<u64> {
        conn.write_all(b"zINSTREAM\0").await?;

        let mut sent = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for frame in chunk.chunks(INSTREAM_CHUNK_SIZE) {
                conn.write_all(&(frame.len() as u32).to_be_bytes()).await?;
                conn.write_all(frame).await?;
                sent += frame.len() as u64;
            }
        }

        conn.write_all(&0u32.to_be_bytes()).await?;
        conn.flush().await?;
        Ok(sent)
    }
}

#[async_trait]
impl ScanEngine for ClamdEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        let reply = self.command(b"zPING\0").await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(EngineError::Protocol { reply })
        }
    }

    async fn scan(&self, body: ArtifactBody) -> Result<Vec<ScanVerdict>, EngineError> {
        let mut conn = self.connect().await?;

        // clamd hangs up early (e.g. size limit) and explains why in the reply,
        // so a failed write still gets its reply read.
        let streamed = Self::stream_body(&mut conn, body).await;
        let reply = self.read_reply(&mut conn).await;

        match (streamed, reply) {
            (Ok(sent), Ok(reply)) => {
                debug!(bytes = sent, "streamed artifact to clamd");
                parse_scan_reply(&reply)
            }
            (Err(e), Ok(reply)) => match parse_scan_reply(&reply) {
                Err(daemon @ EngineError::Daemon { .. }) => Err(daemon),
                _ => Err(EngineError::Io(e)),
            },
            (Err(e), Err(_)) => Err(EngineError::Io(e)),
            (Ok(_), Err(e)) => Err(e),
        }
    }
}

fn timed_out(what: &str) -> EngineError {
    EngineError::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("clamd {} timed out", what),
    ))
}

fn reply_lines(reply: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(reply)
        .split(['\0', '\n'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Parse an INSTREAM reply into one verdict per result line.
///
/// `stream: OK` → clean, `stream: <sig> FOUND` → match, `... ERROR` → error.
pub(crate) fn parse_scan_reply(reply: &[u8]) -> Result<Vec<ScanVerdict>, EngineError> {
    let lines = reply_lines(reply);
    if lines.is_empty() {
        return Err(EngineError::Protocol {
            reply: String::new(),
        });
    }

    lines
        .iter()
        .map(|line| {
            let result = line.split_once(": ").map(|(_, r)| r).unwrap_or(line);

            if let Some(message) = result.strip_suffix(" ERROR") {
                Err(EngineError::Daemon {
                    message: message.to_string(),
                })
            } else if let Some(signature) = result.strip_suffix(" FOUND") {
                Ok(ScanVerdict::found(signature))
            } else if result == "OK" {
                Ok(ScanVerdict::clean())
            } else {
                Err(EngineError::Protocol {
                    reply: line.clone(),
                })
            }
        })
        .collect()
}
