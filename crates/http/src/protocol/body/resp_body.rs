use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::channel::{mpsc, oneshot};
use futures::FutureExt;
use http_body::{Body, Frame, SizeHint};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::BodyReply;
use crate::connection::{ConnectionHandle, Upgraded};
use crate::protocol::{CancelScope, HttpError, PayloadSize};

/// The body of a response delivered by a
/// [`ClientConnection`](crate::connection::ClientConnection).
///
/// Frames are decoded off the connection only when they are polled. The body
/// must be read to the end or closed before the connection can deliver the
/// next response; dropping it closes it.
///
/// Closing a body that was not fully read keeps the connection only when the
/// rest of the body is already buffered. Otherwise the connection is torn
/// down with [`HttpError::BodyNotConsumed`]. Closing with an error always
/// tears the connection down with that error as the cause.
pub struct RespBody {
    kind: Kind,
    conn: ConnectionHandle,
    scope: Option<CancelScope>,
    write_done: Option<CancellationToken>,
    payload_size: PayloadSize,
    force_close: bool,
    upgrade: bool,
    eof: bool,
    closed: bool,
}

enum Kind {
    Empty,
    Streaming { signal: mpsc::Sender<oneshot::Sender<BodyReply>>, receiving: Option<oneshot::Receiver<BodyReply>> },
}

impl RespBody {
    pub(crate) fn empty(conn: ConnectionHandle, force_close: bool) -> Self {
        Self {
            kind: Kind::Empty,
            conn,
            scope: None,
            write_done: None,
            payload_size: PayloadSize::Empty,
            force_close,
            upgrade: false,
            eof: true,
            closed: false,
        }
    }

    pub(crate) fn streaming(
        conn: ConnectionHandle,
        scope: CancelScope,
        signal: mpsc::Sender<oneshot::Sender<BodyReply>>,
        payload_size: PayloadSize,
        force_close: bool,
    ) -> Self {
        Self {
            kind: Kind::Streaming { signal, receiving: None },
            conn,
            scope: Some(scope),
            write_done: None,
            payload_size,
            force_close,
            upgrade: false,
            eof: false,
            closed: false,
        }
    }

    /// The body of a response that switched the connection to another protocol.
    pub(crate) fn switched(conn: ConnectionHandle) -> Self {
        Self {
            kind: Kind::Empty,
            conn,
            scope: None,
            write_done: None,
            payload_size: PayloadSize::Empty,
            force_close: true,
            upgrade: true,
            eof: true,
            closed: false,
        }
    }

    /// Records the completion signal of the request write this body answers.
    pub(crate) fn set_write_done(&mut self, write_done: CancellationToken) {
        self.write_done = Some(write_done);
    }

    /// Disarms the body so dropping it has no effect on the connection.
    pub(crate) fn detach(&mut self) {
        self.closed = true;
    }

    /// Returns true if this body belongs to a response that switched protocols.
    pub fn is_upgrade(&self) -> bool {
        self.upgrade
    }

    /// The scope cancelled when this body is closed or its connection is torn
    /// down.
    ///
    /// Bodies without payload share the scope of their connection.
    pub fn context(&self) -> CancelScope {
        match &self.scope {
            Some(scope) => scope.clone(),
            None => self.conn.scope().clone(),
        }
    }

    /// Releases the body, handing the connection back for the next response.
    pub fn close(&mut self) {
        self.close_inner(None);
    }

    /// Releases the body and tears the connection down with `err` as the cause.
    pub fn close_with_error(&mut self, err: HttpError) {
        self.close_inner(Some(Arc::new(err)));
    }

    /// Turns the body of a `101 Switching Protocols` response, or of a
    /// successful `CONNECT`, into the raw stream of the connection.
    ///
    /// Waits for the request write to finish before taking the write half.
    pub async fn upgrade(mut self) -> Result<Upgraded, HttpError> {
        if !self.upgrade {
            return Err(HttpError::NotUpgraded);
        }

        // the stream takes over closing the connection
        self.closed = true;
        self.conn.stream().await
    }

    fn write_pending(&self) -> bool {
        self.write_done.as_ref().is_some_and(|write_done| !write_done.is_cancelled())
    }

    fn close_inner(&mut self, cause: Option<Arc<HttpError>>) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(cause) = &cause {
            self.conn.close(Some(Arc::clone(cause)));
        } else if self.write_pending() {
            trace!(id = %self.conn.id(), "response body closed while the request was still being written");
            self.conn.close(Some(Arc::new(HttpError::WriteNotDone)));
        }

        // the connection must be gone before the read loop sees the body scope end
        if self.force_close {
            self.conn.close(None);
        }

        if let Some(scope) = &self.scope {
            scope.cancel(cause);
        }

        if let Kind::Streaming { receiving, .. } = &mut self.kind {
            receiving.take();
        }
    }

    fn closed_error(&self) -> HttpError {
        HttpError::closed(self.context().cause().flatten())
    }
}

impl Drop for RespBody {
    fn drop(&mut self) {
        self.close_inner(None);
    }
}

impl fmt::Debug for RespBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RespBody")
            .field("connection", &self.conn.id())
            .field("payload_size", &self.payload_size)
            .field("upgrade", &self.upgrade)
            .field("eof", &self.eof)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Body for RespBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if this.closed {
            return Poll::Ready(Some(Err(this.closed_error())));
        }

        loop {
            if this.eof {
                return Poll::Ready(None);
            }

            let Kind::Streaming { signal, receiving } = &mut this.kind else {
                return Poll::Ready(None);
            };

            if let Some(oneshot_receiver) = receiving {
                let reply = ready!(oneshot_receiver.poll_unpin(cx));
                receiving.take();

                return match reply {
                    Ok(Ok(Some(frame))) => Poll::Ready(Some(Ok(frame))),
                    Ok(Ok(None)) => {
                        this.eof = true;
                        Poll::Ready(None)
                    }
                    Ok(Err(e)) => {
                        this.eof = true;
                        Poll::Ready(Some(Err(e)))
                    }
                    Err(_canceled) => {
                        this.eof = true;
                        Poll::Ready(Some(Err(this.closed_error())))
                    }
                };
            }

            let sent = match ready!(signal.poll_ready(cx)) {
                Ok(()) => {
                    let (tx, rx) = oneshot::channel();
                    signal.start_send(tx).map(|()| rx)
                }
                Err(e) => Err(e),
            };

            match sent {
                Ok(rx) => *receiving = Some(rx),
                Err(_disconnected) => {
                    this.eof = true;
                    return Poll::Ready(Some(Err(this.closed_error())));
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.eof
    }

    fn size_hint(&self) -> SizeHint {
        self.payload_size.into()
    }
}
