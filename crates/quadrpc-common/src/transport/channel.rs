use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::protocol::error::{Result, RpcError};
use crate::protocol::Frame;
use crate::transport::codec::Codec;

/// Default maximum encoded frame size (16 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Settings shared by both halves of a [`MessageChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub codec: Codec,
    pub max_frame_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            codec: Codec::default(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ChannelConfig {
    pub fn with_codec(codec: Codec) -> Self {
        Self {
            codec,
            ..Self::default()
        }
    }
}

/// A framed, bidirectional message channel for one call.
///
/// The channel owns the two halves of an established byte stream. Sending
/// and receiving are guarded by separate locks, so one task may be blocked
/// in [`recv`](Self::recv) while another task sends: the expected access
/// pattern for streaming calls. Cloning is cheap and shares the halves.
///
/// # Wire Format
///
/// ```text
/// [4-byte length as u32 big-endian] [codec-encoded Frame]
/// ```
///
/// # Example
///
/// ```
/// use quadrpc_common::transport::{Codec, MessageChannel};
/// use quadrpc_common::protocol::Frame;
///
/// # #[tokio::main]
/// # async fn main() {
/// let (a, b) = MessageChannel::pair(Codec::default(), 4096);
/// a.send(&Frame::HalfClose).await.unwrap();
/// assert_eq!(b.recv().await.unwrap(), Some(Frame::HalfClose));
/// # }
/// ```
#[derive(Clone)]
pub struct MessageChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    reader: Mutex<BoxedReader>,
    writer: Arc<Mutex<WriteHalf>>,
    config: ChannelConfig,
    peer: String,
}

struct WriteHalf {
    io: BoxedWriter,
    shut_down: bool,
}

impl MessageChannel {
    /// Builds a channel from separate read and write halves.
    pub fn new<R, W>(reader: R, writer: W, config: ChannelConfig, peer: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Arc::new(ChannelInner {
                reader: Mutex::new(Box::new(reader)),
                writer: Arc::new(Mutex::new(WriteHalf {
                    io: Box::new(writer),
                    shut_down: false,
                })),
                config,
                peer: peer.into(),
            }),
        }
    }

    /// Builds a channel from a single duplex IO object.
    pub fn from_io<S>(io: S, config: ChannelConfig, peer: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        Self::new(reader, writer, config, peer)
    }

    /// Wraps an established TCP connection.
    pub fn from_tcp(stream: TcpStream, config: ChannelConfig) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY: {}", e);
        }
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "tcp".to_string());
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer, config, peer)
    }

    /// Creates two connected in-memory channels.
    ///
    /// `buffer` bounds the bytes in flight per direction; a sender that
    /// fills it waits until the other end reads (backpressure).
    pub fn pair(codec: Codec, buffer: usize) -> (Self, Self) {
        let config = ChannelConfig::with_codec(codec);
        let (left, right) = tokio::io::duplex(buffer);
        (
            Self::from_io(left, config, "memory"),
            Self::from_io(right, config, "memory"),
        )
    }

    pub fn codec(&self) -> Codec {
        self.inner.config.codec
    }

    pub fn config(&self) -> ChannelConfig {
        self.inner.config
    }

    /// Label of the remote end, for logs.
    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    /// Sends one frame.
    ///
    /// May wait if the underlying stream applies backpressure. Frames are
    /// written whole: once the write has started it finishes in its own task,
    /// even if the returned future is dropped, and the next frame waits for it.
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        let encoded = self.inner.config.codec.encode_frame(frame)?;
        let max = self.inner.config.max_frame_size;
        if encoded.len() > max {
            return Err(RpcError::FrameTooLarge {
                len: encoded.len(),
                max,
            });
        }

        let mut buf = Vec::with_capacity(4 + encoded.len());
        buf.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
        buf.extend_from_slice(&encoded);

        let mut writer = self.inner.writer.clone().lock_owned().await;
        if writer.shut_down {
            return Err(RpcError::Connection("write half already closed".to_string()));
        }
        let write = tokio::spawn(async move {
            writer
                .io
                .write_all(&buf)
                .await
                .map_err(|e| map_io_error(e, "writing frame"))?;
            writer
                .io
                .flush()
                .await
                .map_err(|e| map_io_error(e, "flushing frame"))
        });
        write
            .await
            .map_err(|e| RpcError::Transport(format!("frame writer failed: {}", e)))??;

        tracing::trace!(peer = %self.inner.peer, kind = frame.kind(), bytes = encoded.len(), "frame sent");
        Ok(())
    }

    /// Receives one frame.
    ///
    /// Returns `Ok(None)` if the peer closed the stream cleanly on a frame
    /// boundary.
    pub async fn recv(&self) -> Result<Option<Frame>> {
        let mut reader = self.inner.reader.lock().await;

        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                tracing::trace!(peer = %self.inner.peer, "channel closed by peer");
                return Ok(None);
            }
            Err(e) => return Err(map_io_error(e, "reading length prefix")),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        let max = self.inner.config.max_frame_size;
        if len > max {
            return Err(RpcError::FrameTooLarge { len, max });
        }

        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                RpcError::ConnectionClosed
            } else {
                map_io_error(e, "reading frame")
            }
        })?;
        drop(reader);

        let frame = self.inner.config.codec.decode_frame(&buf)?;
        tracing::trace!(peer = %self.inner.peer, kind = frame.kind(), bytes = len, "frame received");
        Ok(Some(frame))
    }

    /// Closes the write half of the underlying stream.
    ///
    /// The read half stays usable. Calling this more than once is a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        let mut writer = self.inner.writer.lock().await;
        if writer.shut_down {
            return Ok(());
        }
        writer.shut_down = true;
        writer
            .io
            .shutdown()
            .await
            .map_err(|e| map_io_error(e, "shutting down write half"))
    }
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel")
            .field("peer", &self.inner.peer)
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Map IO errors to `RpcError` variants
///
/// - Lost or timed-out connections -> `Connection`
/// - Other IO errors -> `Io`
///
/// Socket timeouts are transport failures, not call deadlines.
fn map_io_error(err: std::io::Error, context: &str) -> RpcError {
    match err.kind() {
        std::io::ErrorKind::TimedOut => {
            RpcError::Connection(format!("{}: socket timed out", context))
        }
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::BrokenPipe => {
            RpcError::Connection(format!("{}: connection lost", context))
        }
        _ => RpcError::Io(err),
    }
}
