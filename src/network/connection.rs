use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;

use crate::network::{Frame, FrameDecoder};
use crate::service::NetConfig;
use crate::{AppError, AppResult};

/// Largest possible UDP payload (65535 minus IP and UDP headers).
const MAX_DATAGRAM_SIZE: usize = 65507;

#[derive(Debug)]
enum TransportReader {
    Tcp(OwnedReadHalf),
    Udp(Arc<UdpSocket>),
}

/// The receive side of one live socket.
///
/// Owns the transport read half and the accumulated receive buffer. Reads are
/// sequential per connection: `read_frame` is only re-entered after the
/// previous frame has been decoded and dispatched, so the buffer needs no
/// synchronization.
#[derive(Debug)]
pub struct Connection {
    reader: TransportReader,
    decoder: FrameDecoder,
    peer_addr: Option<SocketAddr>,
}

impl Connection {
    /// Splits a connected TCP stream into a read-side `Connection` and its
    /// write half.
    pub fn pair_from_tcp(socket: TcpStream, config: &NetConfig) -> (Connection, FrameWriter) {
        let peer_addr = socket.peer_addr().ok();
        let (reader, writer) = socket.into_split();
        let connection = Connection {
            reader: TransportReader::Tcp(reader),
            decoder: FrameDecoder::new(config.conn_read_buffer_size, config.max_frame_size),
            peer_addr,
        };
        (connection, FrameWriter::Tcp(BufWriter::new(writer)))
    }

    /// Wraps a UDP socket already `connect`ed to `peer`. Datagram payloads
    /// run through the same frame decoder as stream bytes.
    pub fn pair_from_udp(
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        config: &NetConfig,
    ) -> (Connection, FrameWriter) {
        let connection = Connection {
            reader: TransportReader::Udp(socket.clone()),
            decoder: FrameDecoder::new(config.conn_read_buffer_size, config.max_frame_size),
            peer_addr: Some(peer),
        };
        (connection, FrameWriter::Udp { socket })
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Reads the next complete frame from the connection.
    ///
    /// Loops between parsing the buffered bytes and reading more from the
    /// socket until a full frame is available. Returns `Ok(None)` when the
    /// peer closes gracefully; a close in the middle of a frame is an error.
    /// Fatal framing errors (negative or oversize length) propagate and the
    /// connection should be dropped.
    pub async fn read_frame(&mut self) -> AppResult<Option<Frame>> {
        loop {
            if let Some(frame) = self.decoder.try_next()? {
                return Ok(Some(frame));
            }
            let n = match &mut self.reader {
                TransportReader::Tcp(reader) => {
                    reader.read_buf(self.decoder.buffer_mut()).await?
                }
                TransportReader::Udp(socket) => {
                    // recv_buf fills spare capacity only and the OS drops the
                    // rest of the datagram, so make room for a full one first
                    let buffer = self.decoder.buffer_mut();
                    buffer.reserve(MAX_DATAGRAM_SIZE);
                    socket.recv_buf(buffer).await?
                }
            };
            if n == 0 {
                match &self.reader {
                    TransportReader::Tcp(_) => {
                        return if self.decoder.pending() == 0 {
                            // peer has closed the connection gracefully
                            Ok(None)
                        } else {
                            // peer closed the connection while sending a frame
                            Err(io::Error::new(
                                ErrorKind::ConnectionReset,
                                "connection reset by peer",
                            )
                            .into())
                        };
                    }
                    // an empty datagram is not a close
                    TransportReader::Udp(_) => continue,
                }
            }
        }
    }
}

/// The send side of one live socket.
///
/// `Delegate` routes encoded frames through an injected channel instead of a
/// socket, for callers that supply their own transport.
#[derive(Debug)]
pub enum FrameWriter {
    Tcp(BufWriter<OwnedWriteHalf>),
    Udp { socket: Arc<UdpSocket> },
    Delegate(mpsc::Sender<Bytes>),
}

impl FrameWriter {
    /// Hands one encoded frame to the OS (or the delegate). The only contract
    /// on return is that the bytes left this process's buffers, not that they
    /// were delivered.
    pub async fn write(&mut self, bytes: Bytes) -> AppResult<()> {
        match self {
            FrameWriter::Tcp(writer) => {
                writer.write_all(&bytes).await?;
                writer.flush().await?;
            }
            FrameWriter::Udp { socket } => {
                socket.send(&bytes).await?;
            }
            FrameWriter::Delegate(tx) => {
                tx.send(bytes)
                    .await
                    .map_err(|e| AppError::ChannelSendError(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Flushes and shuts down the write half where the transport supports it.
    pub async fn shutdown(&mut self) -> AppResult<()> {
        if let FrameWriter::Tcp(writer) = self {
            writer.shutdown().await?;
        }
        Ok(())
    }
}
