use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::sync::WaitForCancellationFutureOwned;
use tracing::trace;

use super::handle::{BoxReader, BoxWriter, ConnectionHandle, UpgradeParts};
use super::ConnectionId;

/// The raw byte stream of a connection that switched protocols.
///
/// Bytes the peer sent right after the `101` or `CONNECT` response, and which
/// were already buffered while the response was read, come out first. No HTTP
/// framing is applied in either direction.
///
/// Shutting the stream down or dropping it closes the connection. Closing the
/// connection through its handle releases the transport: pending and later
/// reads and writes fail with [`io::ErrorKind::NotConnected`].
pub struct Upgraded {
    conn: ConnectionHandle,
    read_buf: BytesMut,
    io: Option<(BoxReader, BoxWriter)>,
    closed: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl Upgraded {
    pub(crate) fn new(conn: ConnectionHandle, parts: UpgradeParts, writer: BoxWriter) -> Self {
        let UpgradeParts { reader, read_buf } = parts;
        let closed = Box::pin(conn.scope().token().clone().cancelled_owned());
        Self { conn, read_buf, io: Some((reader, writer)), closed }
    }

    /// The transport halves, or `NotConnected` once the connection was closed.
    ///
    /// Polling registers the task for closure so a read or write parked on a
    /// silent peer wakes up when the connection closes.
    fn transport(&mut self, cx: &mut Context<'_>) -> io::Result<&mut (BoxReader, BoxWriter)> {
        if self.io.is_some() && self.closed.as_mut().poll(cx).is_ready() {
            trace!(id = %self.conn.id(), "connection closed, releasing upgraded transport");
            self.io = None;
        }

        if self.io.is_none() {
            return Err(io::Error::new(io::ErrorKind::NotConnected, self.conn.scope().error()));
        }
        self.io.as_mut().ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    /// Bytes received before the switch that have not been read yet.
    pub fn buffered(&self) -> &[u8] {
        &self.read_buf
    }
}

impl AsyncRead for Upgraded {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.transport(cx)?;

        if !this.read_buf.is_empty() {
            let n = this.read_buf.len().min(buf.remaining());
            buf.put_slice(&this.read_buf[..n]);
            this.read_buf.advance(n);
            return Poll::Ready(Ok(()));
        }

        let (reader, _) = this.transport(cx)?;
        Pin::new(reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for Upgraded {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let (_, writer) = self.get_mut().transport(cx)?;
        Pin::new(writer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let (_, writer) = self.get_mut().transport(cx)?;
        Pin::new(writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let Some((_, writer)) = this.io.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let result = ready!(Pin::new(writer).poll_shutdown(cx));
        this.conn.close(None);
        this.io = None;
        Poll::Ready(result)
    }
}

impl Drop for Upgraded {
    fn drop(&mut self) {
        self.conn.close(None);
    }
}

impl fmt::Debug for Upgraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upgraded").field("id", &self.conn.id()).field("buffered", &self.read_buf.len()).finish()
    }
}
