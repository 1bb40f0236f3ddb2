//! Framed TCP connection with connect and read timeouts.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::FrameError;

/// Bytes reserved ahead of each socket read.
const READ_CHUNK: usize = 8 * 1024;

/// A TCP stream paired with a frame codec.
///
/// Every read and write is bounded by `io_timeout`, so a silent peer
/// cannot stall the owning task indefinitely.
pub struct FramedConnection<C> {
    stream: TcpStream,
    codec: C,
    read_buf: BytesMut,
    write_buf: BytesMut,
    io_timeout: Duration,
}

impl<C> FramedConnection<C> {
    /// Dials `host:port` within `connect_timeout`.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        io_timeout: Duration,
        codec: C,
    ) -> Result<Self, FrameError> {
        debug!(host, port, ?connect_timeout, "Opening connection");

        let stream = timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| FrameError::Timeout(connect_timeout))??;
        stream.set_nodelay(true)?;

        Ok(Self::from_stream(stream, io_timeout, codec))
    }

    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream, io_timeout: Duration, codec: C) -> Self {
        Self {
            stream,
            codec,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::new(),
            io_timeout,
        }
    }

    /// Encodes and writes one message.
    pub async fn send<I>(&mut self, item: I) -> Result<(), FrameError>
    where
        C: Encoder<I, Error = FrameError>,
    {
        self.write_buf.clear();
        self.codec.encode(item, &mut self.write_buf)?;

        let io_timeout = self.io_timeout;
        timeout(io_timeout, self.stream.write_all(&self.write_buf))
            .await
            .map_err(|_| FrameError::Timeout(io_timeout))??;
        Ok(())
    }

    /// Reads until the codec yields one complete frame.
    pub async fn recv(&mut self) -> Result<Bytes, FrameError>
    where
        C: Decoder<Item = Bytes, Error = FrameError>,
    {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.read_buf)? {
                return Ok(frame);
            }

            self.read_buf.reserve(READ_CHUNK);
            let io_timeout = self.io_timeout;
            let n = timeout(io_timeout, self.stream.read_buf(&mut self.read_buf))
                .await
                .map_err(|_| FrameError::Timeout(io_timeout))??;

            if n == 0 {
                return Err(FrameError::Closed);
            }
        }
    }

    /// Sends `item` and waits for the reply frame.
    pub async fn request<I>(&mut self, item: I) -> Result<Bytes, FrameError>
    where
        C: Encoder<I, Error = FrameError> + Decoder<Item = Bytes, Error = FrameError>,
    {
        self.send(item).await?;
        self.recv().await
    }

    /// Closes the write side; errors are irrelevant at this point.
    pub async fn shutdown(mut self) {
        let _ = self.stream.shutdown().await;
    }
}
