use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::SessionError;
use crate::protocol::{ACK, AUTH_REPLY_LEN, AuthReply, CHUNK_SIZE, FRAME_IDLE_TIMEOUT};

/// How long the server may take to answer the secret.
const AUTH_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// A byte stream to the task server.
///
/// A connection that failed authentication is consumed, so a
/// half-authenticated socket can never be reused.
#[derive(Debug)]
pub struct Connection<S = TcpStream> {
    stream: S,
}

/// Open a TCP connection to the task server. A single attempt; retrying is
/// up to the caller.
pub async fn connect(address: &str, timeout: Duration) -> Result<Connection, SessionError> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
        .await
        .map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connecting to {} timed out", address),
            )
        })??;

    if let Err(e) = stream.set_nodelay(true) {
        log::debug!("Failed to set TCP_NODELAY: {}", e);
    }

    Ok(Connection::new(stream))
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Send the shared secret and classify the server's reply.
    ///
    /// On any failure the stream is shut down and dropped.
    pub async fn authenticate(mut self, secret: &str) -> Result<Self, SessionError> {
        match self.exchange_secret(secret).await {
            Ok(()) => Ok(self),
            Err(e) => {
                let _ = self.stream.shutdown().await;
                Err(e)
            }
        }
    }

    async fn exchange_secret(&mut self, secret: &str) -> Result<(), SessionError> {
        self.stream.write_all(secret.as_bytes()).await?;
        self.stream.flush().await?;

        let mut reply = [0u8; AUTH_REPLY_LEN];
        match tokio::time::timeout(AUTH_REPLY_TIMEOUT, self.stream.read_exact(&mut reply)).await {
            Err(_) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "no authentication reply",
                )
                .into());
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(SessionError::ConnectionClosed);
            }
            Ok(result) => {
                result?;
            }
        }

        match AuthReply::classify(&reply) {
            AuthReply::Accepted => Ok(()),
            AuthReply::Rejected => Err(SessionError::WrongSecret),
            AuthReply::Unknown(bytes) => Err(SessionError::ProtocolViolation(bytes)),
        }
    }

    /// Read one frame.
    ///
    /// The frame ends at the first read shorter than [`CHUNK_SIZE`], or when
    /// the stream stays silent for [`FRAME_IDLE_TIMEOUT`]. Returns `None`
    /// when nothing arrived within the timeout.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, SessionError> {
        let mut frame = Vec::new();
        let mut buf = [0u8; CHUNK_SIZE];

        loop {
            let read = match tokio::time::timeout(FRAME_IDLE_TIMEOUT, self.stream.read(&mut buf)).await {
                Err(_) => break,
                Ok(result) => result?,
            };

            if read == 0 {
                if frame.is_empty() {
                    return Err(SessionError::ConnectionClosed);
                }
                break;
            }

            frame.extend_from_slice(&buf[..read]);
            if read < CHUNK_SIZE {
                break;
            }
        }

        if frame.is_empty() {
            log::trace!("No task update within {:?}", FRAME_IDLE_TIMEOUT);
            return Ok(None);
        }

        Ok(Some(frame))
    }

    /// Confirm receipt of a frame.
    pub async fn acknowledge(&mut self) -> Result<(), SessionError> {
        self.stream.write_all(ACK).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
