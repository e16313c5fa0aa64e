use std::mem;
use std::sync::Arc;

use bytes::Bytes;
use futures::channel::{mpsc, oneshot};
use futures::StreamExt;
use http_body::Frame;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::{debug, trace};

use crate::codec::ResponseDecoder;
use crate::protocol::{CancelScope, HttpError, Message, ParseError, PayloadItem};

/// One answer to a frame request: a frame, `None` at the end of the body, or
/// the error that broke the connection.
pub(crate) type BodyReply = Result<Option<Frame<Bytes>>, HttpError>;

/// Why the read loop stopped serving a body with an error.
///
/// `None` is a clean close of the connection.
pub(crate) type StopCause = Option<Arc<HttpError>>;

/// Serves frame requests of one [`RespBody`](super::RespBody) from the
/// connection's framed reader.
///
/// The sender borrows the reader for as long as the body is open, so the read
/// loop cannot decode the next response head before the body is released.
pub(crate) struct BodySender<'conn, R> {
    framed: &'conn mut FramedRead<R, ResponseDecoder>,
    receiver: mpsc::Receiver<oneshot::Sender<BodyReply>>,
    root: &'conn CancelScope,
    eof: bool,
}

impl<'conn, R> BodySender<'conn, R>
where
    R: AsyncRead + Unpin,
{
    pub(crate) fn new(
        framed: &'conn mut FramedRead<R, ResponseDecoder>,
        receiver: mpsc::Receiver<oneshot::Sender<BodyReply>>,
        root: &'conn CancelScope,
    ) -> Self {
        Self { framed, receiver, root, eof: false }
    }

    /// Answers frame requests until the body ends or `scope` is cancelled.
    ///
    /// Returns `Ok(())` once the transport is positioned at the next message.
    pub(crate) async fn serve(&mut self, scope: &CancelScope) -> Result<(), StopCause> {
        loop {
            let reply_to = tokio::select! {
                biased;
                _ = scope.cancelled() => break,
                reply_to = self.receiver.next() => match reply_to {
                    Some(reply_to) => reply_to,
                    None => break,
                },
            };

            let frame = tokio::select! {
                biased;
                _ = scope.cancelled() => break,
                frame = self.next_frame() => frame,
            };

            match frame {
                Ok(Some(frame)) => {
                    // the body may have been closed while waiting
                    let _ = reply_to.send(Ok(Some(frame)));
                }
                Ok(None) => {
                    let _ = reply_to.send(Ok(None));
                    trace!("response body fully read");
                    return Ok(());
                }
                Err(cause) => {
                    let _ = reply_to.send(Err(HttpError::closed(Some(Arc::clone(&cause)))));
                    return Err(Some(cause));
                }
            }
        }

        self.release(scope)
    }

    /// Reads and discards the rest of a body nobody is going to read.
    pub(crate) async fn skip_body(&mut self) -> Result<(), StopCause> {
        let mut size: usize = 0;
        while !self.eof {
            let next = tokio::select! {
                biased;
                _ = self.root.cancelled() => return Err(self.root.cause().flatten()),
                next = self.framed.next() => next,
            };

            match next {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => size += bytes.len(),
                Some(Ok(Message::Payload(PayloadItem::Eof))) => self.eof = true,
                Some(Ok(Message::Header(_))) => return Err(Some(unexpected_head())),
                Some(Err(e)) => return Err(Some(Arc::new(e.into()))),
                None => return Err(Some(Arc::new(HttpError::PeerClosed))),
            }
        }

        self.framed.decoder_mut().take_trailers();
        debug!(size, "skipped orphaned response body");
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<Frame<Bytes>>, Arc<HttpError>> {
        if !self.eof {
            match self.framed.next().await {
                Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => return Ok(Some(Frame::data(bytes))),
                Some(Ok(Message::Payload(PayloadItem::Eof))) => self.eof = true,
                Some(Ok(Message::Header(_))) => return Err(unexpected_head()),
                Some(Err(e)) => return Err(Arc::new(e.into())),
                None => return Err(Arc::new(HttpError::PeerClosed)),
            }
        }

        Ok(self.framed.decoder_mut().take_trailers().map(Frame::trailers))
    }

    /// Decides what a released body leaves behind.
    fn release(&mut self, scope: &CancelScope) -> Result<(), StopCause> {
        if self.root.is_cancelled() {
            return Err(self.root.cause().flatten());
        }

        if let Some(Some(cause)) = scope.cause() {
            return Err(Some(cause));
        }

        if self.eof {
            return Ok(());
        }

        let mut buffer = mem::take(self.framed.read_buffer_mut());
        let finished = self.framed.decoder_mut().finish_buffered(&mut buffer);
        *self.framed.read_buffer_mut() = buffer;

        match finished {
            Ok(true) => {
                trace!("released response body was already buffered");
                self.framed.decoder_mut().take_trailers();
                Ok(())
            }
            Ok(false) => {
                debug!("response body released before it was fully read");
                Err(Some(Arc::new(HttpError::BodyNotConsumed)))
            }
            Err(e) => Err(Some(Arc::new(e.into()))),
        }
    }
}

fn unexpected_head() -> Arc<HttpError> {
    Arc::new(ParseError::invalid_body("response head inside a response body").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use tokio::io::AsyncWriteExt;

    async fn framed_with(input: &'static [u8]) -> FramedRead<tokio::io::DuplexStream, ResponseDecoder> {
        let (client, mut server) = tokio::io::duplex(1024);
        server.write_all(input).await.unwrap();
        drop(server);

        let mut framed = FramedRead::new(client, ResponseDecoder::new());
        assert!(framed.next().await.unwrap().unwrap().is_header());
        framed
    }

    async fn request(signal: &mut mpsc::Sender<oneshot::Sender<BodyReply>>) -> oneshot::Receiver<BodyReply> {
        let (tx, rx) = oneshot::channel();
        signal.send(tx).await.unwrap();
        rx
    }

    fn data(reply: BodyReply) -> Bytes {
        reply.unwrap().unwrap().into_data().unwrap()
    }

    #[tokio::test]
    async fn serves_frames_then_end() {
        let mut framed = framed_with(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\nX-Sum: 1\r\n\r\n").await;
        let root = CancelScope::new();
        let scope = root.child();
        let (mut signal, receiver) = mpsc::channel(1);

        let consumer = tokio::spawn(async move {
            let first = request(&mut signal).await.await.unwrap();
            let second = request(&mut signal).await.await.unwrap();
            let third = request(&mut signal).await.await.unwrap();
            (first, second, third)
        });

        let mut sender = BodySender::new(&mut framed, receiver, &root);
        sender.serve(&scope).await.unwrap();

        let (first, second, third) = consumer.await.unwrap();
        assert_eq!(data(first), "abc");
        let trailers: Frame<Bytes> = second.unwrap().unwrap();
        assert_eq!(trailers.into_trailers().unwrap().get("x-sum").unwrap(), "1");
        assert!(third.unwrap().is_none());
    }

    #[tokio::test]
    async fn release_with_buffered_rest() {
        let mut framed = framed_with(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nbody").await;
        let root = CancelScope::new();
        let scope = root.child();
        let (_signal, receiver) = mpsc::channel(1);

        scope.cancel(None);
        let mut sender = BodySender::new(&mut framed, receiver, &root);
        assert!(sender.serve(&scope).await.is_ok());
    }

    #[tokio::test]
    async fn release_before_body_arrived() {
        let (client, mut server) = tokio::io::duplex(1024);
        server.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nbo").await.unwrap();

        let mut framed = FramedRead::new(client, ResponseDecoder::new());
        assert!(framed.next().await.unwrap().unwrap().is_header());

        let root = CancelScope::new();
        let scope = root.child();
        let (_signal, receiver) = mpsc::channel(1);
        scope.cancel(None);

        let mut sender = BodySender::new(&mut framed, receiver, &root);
        let cause = sender.serve(&scope).await.unwrap_err().unwrap();
        assert!(matches!(*cause, HttpError::BodyNotConsumed));
    }

    #[tokio::test]
    async fn skip_orphaned_body() {
        let mut framed = framed_with(b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\nfoobarHTTP/1.1 204 No Content\r\n\r\n").await;
        let root = CancelScope::new();
        let (_signal, receiver) = mpsc::channel(1);

        let mut sender = BodySender::new(&mut framed, receiver, &root);
        sender.skip_body().await.unwrap();

        assert!(framed.next().await.unwrap().unwrap().is_header());
    }

    #[tokio::test]
    async fn truncated_body_reports_error() {
        let mut framed = framed_with(b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort").await;
        let root = CancelScope::new();
        let scope = root.child();
        let (mut signal, receiver) = mpsc::channel(1);

        let consumer = tokio::spawn(async move {
            let first = request(&mut signal).await.await.unwrap();
            let second = request(&mut signal).await.await.unwrap();
            (first, second)
        });

        let mut sender = BodySender::new(&mut framed, receiver, &root);
        let cause = sender.serve(&scope).await.unwrap_err().unwrap();
        assert!(matches!(*cause, HttpError::ResponseError { source: ParseError::Io { .. } }));

        let (first, second) = consumer.await.unwrap();
        assert_eq!(data(first), "short");
        assert!(matches!(second, Err(HttpError::ConnectionClosed { cause: Some(_) })));
    }
}
