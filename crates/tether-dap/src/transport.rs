//! The byte channel to a debug adapter.
//!
//! [`Transport`] is the seam the receiver and client are written against;
//! [`StreamTransport`] implements it over any async reader/writer pair.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;

use crate::codec;
use crate::error::DapError;
use crate::protocol::Message;

/// Outcome of one [`Transport::receive_message`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    /// A complete message arrived.
    Message(Message),
    /// The channel is gone; no further messages will arrive.
    Disconnected(String),
    /// The read timed out without data. Not a failure.
    Timeout,
    /// A frame could not be read or decoded. The channel may still be usable.
    Error(String),
}

/// Bidirectional message channel to a debug adapter.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the channel is believed to be open.
    fn is_connected(&self) -> bool;

    /// Wait for the next message, disconnect or read failure.
    async fn receive_message(&self) -> Received;

    /// Write one message.
    ///
    /// Fails immediately with [`DapError::NotConnected`] on a closed channel.
    async fn send_message(&self, message: &Message) -> Result<(), DapError>;

    /// Close the channel. Idempotent.
    async fn close(&self);
}

/// [`Transport`] over an `AsyncRead`/`AsyncWrite` pair.
///
/// Reader and writer sit behind separate locks so a pending receive never
/// blocks a send.
pub struct StreamTransport<R, W> {
    reader: Mutex<BufReader<R>>,
    writer: Mutex<W>,
    connected: AtomicBool,
}

/// A transport connected to a socket adapter.
pub type TcpTransport = StreamTransport<OwnedReadHalf, OwnedWriteHalf>;

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap an already-open reader/writer pair.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(writer),
            connected: AtomicBool::new(true),
        }
    }

    async fn read_frame(&self) -> Received {
        let mut reader = self.reader.lock().await;

        let mut header = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => return self.disconnected("adapter closed the stream"),
                Ok(_) => {}
                Err(e) => return self.classify_io(e),
            }
            if line.trim_end_matches(['\r', '\n']).is_empty() {
                if header.is_empty() {
                    // Stray blank line between frames.
                    continue;
                }
                break;
            }
            header.push_str(line.trim_end_matches(['\r', '\n']));
            header.push_str("\r\n");
        }

        let len = match codec::parse_content_length(&header) {
            Ok(len) => len,
            Err(e) => return Received::Error(e.to_string()),
        };

        // The oversized body stays unread, so the stream cannot be re-framed.
        if let Err(e) = codec::check_content_length(len) {
            return self.disconnected(e.to_string());
        }

        let mut body = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut body).await {
            return self.classify_io(e);
        }

        match codec::decode_body(&body) {
            Ok(value) => Received::Message(Message::from_value(value)),
            Err(e) => Received::Error(e.to_string()),
        }
    }

    fn disconnected(&self, reason: impl Into<String>) -> Received {
        self.connected.store(false, Ordering::SeqCst);
        Received::Disconnected(reason.into())
    }

    fn classify_io(&self, err: io::Error) -> Received {
        if is_disconnect(&err) {
            self.disconnected(err.to_string())
        } else if err.kind() == io::ErrorKind::TimedOut {
            Received::Timeout
        } else {
            Received::Error(err.to_string())
        }
    }
}

impl TcpTransport {
    /// Connect to an adapter listening on `addr`.
    pub async fn connect_tcp(addr: impl ToSocketAddrs) -> Result<Self, DapError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self::new(read_half, write_half))
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn receive_message(&self) -> Received {
        if !self.is_connected() {
            return Received::Disconnected("transport closed".into());
        }
        self.read_frame().await
    }

    async fn send_message(&self, message: &Message) -> Result<(), DapError> {
        if !self.is_connected() {
            return Err(DapError::NotConnected);
        }
        let bytes = codec::encode_message(&message.to_value());

        let mut writer = self.writer.lock().await;
        let written = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        }
        .await;

        match written {
            Ok(()) => Ok(()),
            Err(e) if is_disconnect(&e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(DapError::ConnectionLost(e.to_string()))
            }
            Err(e) => Err(DapError::Io(e)),
        }
    }

    async fn close(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            tracing::debug!("transport shutdown: {e}");
        }
    }
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
    )
}
