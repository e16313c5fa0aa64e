use std::sync::Arc;

use futures::channel::{mpsc, oneshot};
use futures::StreamExt;
use http::{Method, Response, StatusCode};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::handle::{BoxReader, ConnectionHandle, UpgradeParts};
use crate::codec::ResponseDecoder;
use crate::protocol::body::BodySender;
use crate::protocol::{HttpError, Message, ParseError, PayloadSize, RespBody, ResponseHeader};

pub(crate) type ResponseResult = Result<Response<RespBody>, HttpError>;

/// A written request waiting for its response.
pub(crate) struct Waiter {
    pub(crate) method: Method,
    pub(crate) tx: oneshot::Sender<ResponseResult>,
}

/// What the read loop does after one exchange.
enum Flow {
    Continue,
    Close,
    Upgrade(Response<RespBody>, Waiter),
}

type StopCause = Option<Arc<HttpError>>;

/// Reads responses off a connection and hands each one to the request that
/// was written first and has not been answered yet.
///
/// There is exactly one read loop per connection. It owns the read half until
/// the connection closes or switches protocols.
pub(crate) struct ReadLoop {
    framed: FramedRead<BoxReader, ResponseDecoder>,
    conn: ConnectionHandle,
    waiters: mpsc::Receiver<Waiter>,
    handles_gone: CancellationToken,
}

impl ReadLoop {
    pub(crate) fn new(
        framed: FramedRead<BoxReader, ResponseDecoder>,
        conn: ConnectionHandle,
        waiters: mpsc::Receiver<Waiter>,
        handles_gone: CancellationToken,
    ) -> Self {
        Self { framed, conn, waiters, handles_gone }
    }

    pub(crate) async fn run(mut self) {
        trace!(id = %self.conn.id(), "read loop started");

        let cause = loop {
            match self.next_exchange().await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => break None,
                Ok(Flow::Upgrade(response, waiter)) => {
                    self.switch_protocols(response, waiter);
                    return;
                }
                Err(cause) => break cause,
            }
        };

        if let Some(cause) = &cause {
            debug!(id = %self.conn.id(), cause = %cause, "read loop stopped");
        }
        self.conn.close(cause);
        self.conn.shutdown_writer().await;
    }

    async fn next_exchange(&mut self) -> Result<Flow, StopCause> {
        let Some((header, mut payload_size)) = self.read_head().await? else {
            return Ok(Flow::Close);
        };

        let root = self.conn.scope();
        let waiter = tokio::select! {
            biased;
            _ = root.cancelled() => return Err(root.cause().flatten()),
            waiter = self.waiters.next() => waiter,
        };
        let Some(waiter) = waiter else {
            debug!(id = %self.conn.id(), status = %header.status(), "response without a request waiting for it");
            return Ok(Flow::Close);
        };

        let tunnel = waiter.method == Method::CONNECT && header.status().is_success();
        if waiter.method == Method::HEAD || tunnel {
            payload_size = PayloadSize::Empty;
            self.framed.decoder_mut().override_payload(payload_size);
        }

        if header.is_upgrade() || tunnel {
            let body = RespBody::switched(self.conn.clone());
            return Ok(Flow::Upgrade(header.body(body), waiter));
        }

        let close_after = header.wants_close() || payload_size.is_until_close();
        trace!(id = %self.conn.id(), status = %header.status(), ?payload_size, close_after, "received response");

        if payload_size.is_empty() {
            let body = RespBody::empty(self.conn.clone(), close_after);
            if let Err(Ok(response)) = waiter.tx.send(Ok(header.body(body))) {
                trace!(id = %self.conn.id(), "response orphaned");
                response.into_body().detach();
            }
            return Ok(if close_after { Flow::Close } else { Flow::Continue });
        }

        let scope = root.child();
        let (signal, receiver) = mpsc::channel(1);
        let body = RespBody::streaming(self.conn.clone(), scope.clone(), signal, payload_size, close_after);
        let mut body_sender = BodySender::new(&mut self.framed, receiver, root);

        match waiter.tx.send(Ok(header.body(body))) {
            Ok(()) => body_sender.serve(&scope).await?,
            Err(response) => {
                if let Ok(response) = response {
                    response.into_body().detach();
                }
                if close_after {
                    debug!(id = %self.conn.id(), "orphaned response is delimited by close");
                    return Ok(Flow::Close);
                }
                body_sender.skip_body().await?;
            }
        }

        Ok(if close_after { Flow::Close } else { Flow::Continue })
    }

    /// Reads the next final response head, skipping informational ones.
    ///
    /// Returns `None` when every handle of the connection is gone.
    async fn read_head(&mut self) -> Result<Option<(ResponseHeader, PayloadSize)>, StopCause> {
        let root = self.conn.scope();
        loop {
            let next = tokio::select! {
                biased;
                _ = root.cancelled() => return Err(root.cause().flatten()),
                _ = self.handles_gone.cancelled() => return Ok(None),
                next = self.framed.next() => next,
            };

            match next {
                Some(Ok(Message::Header((header, payload_size)))) => {
                    let status = header.status();
                    if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
                        trace!(id = %self.conn.id(), %status, "skip informational response");
                        continue;
                    }
                    return Ok(Some((header, payload_size)));
                }
                Some(Ok(Message::Payload(_))) => {
                    return Err(Some(Arc::new(ParseError::invalid_body("response body without a head").into())));
                }
                Some(Err(e)) => {
                    warn!(id = %self.conn.id(), cause = %e, "failed to read response");
                    return Err(Some(Arc::new(e.into())));
                }
                None => {
                    debug!(id = %self.conn.id(), "peer closed the connection");
                    return Err(Some(Arc::new(HttpError::PeerClosed)));
                }
            }
        }
    }

    /// Leaves the transport to the upgraded stream and delivers the response.
    fn switch_protocols(self, response: Response<RespBody>, waiter: Waiter) {
        let ReadLoop { mut framed, conn, .. } = self;

        let read_buf = framed.read_buffer_mut().split();
        conn.stash_upgrade(UpgradeParts { reader: framed.into_inner(), read_buf });

        if waiter.tx.send(Ok(response)).is_err() {
            debug!(id = %conn.id(), "upgrade response orphaned");
            conn.close(None);
        }
    }
}
