use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Buf;
use futures::channel::{mpsc, oneshot};
use futures::SinkExt;
use http::{Request, Response};
use http_body::Body;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::OwnedMutexGuard;
use tokio_util::codec::FramedRead;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace, warn};

use super::handle::{BoxReader, BoxWriter, CloseHook, ConnectionHandle};
use super::read_loop::{ReadLoop, Waiter};
use super::{ConnectionId, Http1Config, MessageWriter, Upgraded};
use crate::codec::ResponseDecoder;
use crate::protocol::{CancelScope, HeaderOrder, HttpError, RespBody};

/// A client connection speaking HTTP/1.x over one established transport.
///
/// Requests can be sent from any number of clones of the connection. They are
/// written one after another, and their responses are matched back in the
/// same order. A request may be written while earlier responses are still
/// outstanding, but each response must have its body read to the end or
/// closed before the next one can be delivered.
///
/// Any failure of the transport or of the protocol tears the whole connection
/// down. Every pending and later operation then fails with
/// [`HttpError::ConnectionClosed`] carrying the cause.
///
/// The connection closes on its own once every clone is dropped and no
/// response is in flight.
///
/// # Example
///
/// ```no_run
/// use http::Request;
/// use http_body_util::{BodyExt, Empty};
/// use bytes::Bytes;
/// use micro_h1::connection::ClientConnection;
/// use tokio::net::TcpStream;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
/// let stream = TcpStream::connect("example.com:80").await?;
/// let (reader, writer) = stream.into_split();
/// let connection = ClientConnection::new(reader, writer);
///
/// let request = Request::get("http://example.com/").body(Empty::<Bytes>::new())?;
/// let response = connection.send(request).await?;
/// let body = response.into_body().collect().await?.to_bytes();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ClientConnection {
    conn: ConnectionHandle,
    waiters: mpsc::Sender<Waiter>,
    handles: Arc<DropGuard>,
}

/// Per-request settings for [`ClientConnection::send_request`].
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    header_order: Option<HeaderOrder>,
    cancel: Option<CancellationToken>,
    timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the request headers in this order.
    pub fn header_order(mut self, header_order: HeaderOrder) -> Self {
        self.header_order = Some(header_order);
        self
    }

    /// Gives up waiting for the response once `cancel` is cancelled.
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Gives up waiting for the response after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Builder for a [`ClientConnection`] with non-default settings.
pub struct ClientConnectionBuilder {
    config: Http1Config,
    close_hook: Option<CloseHook>,
    parent: Option<CancelScope>,
}

impl ClientConnectionBuilder {
    fn new() -> Self {
        Self { config: Http1Config::default(), close_hook: None, parent: None }
    }

    pub fn config(mut self, config: Http1Config) -> Self {
        self.config = config;
        self
    }

    /// Runs `close_hook` exactly once when the connection closes.
    ///
    /// The hook receives the cause of the close, or `None` when the connection
    /// was closed without error.
    pub fn on_close<F>(mut self, close_hook: F) -> Self
    where
        F: Fn(Option<&HttpError>) + Send + Sync + 'static,
    {
        self.close_hook = Some(Box::new(close_hook));
        self
    }

    /// Ties the connection to `parent`: cancelling it closes the connection.
    pub fn parent(mut self, parent: &CancelScope) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Starts the connection over an established transport.
    ///
    /// The response reading task is spawned on the current tokio runtime.
    pub fn build<R, W>(self, reader: R, writer: W) -> ClientConnection
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let Self { config, close_hook, parent } = self;

        let root = parent.as_ref().map_or_else(CancelScope::new, CancelScope::child);
        let writer: BoxWriter = Box::new(writer);
        let writer = MessageWriter::with_capacity(writer, config.write_capacity());
        let conn = ConnectionHandle::new(Arc::new(tokio::sync::Mutex::new(Some(writer))), root, close_hook);

        let reader: BoxReader = Box::new(reader);
        let framed = FramedRead::with_capacity(reader, ResponseDecoder::with_limits(config.header_limits()), config.read_capacity());

        let (waiters, waiters_rx) = mpsc::channel(config.queue_depth());
        let handles_gone = CancellationToken::new();
        tokio::spawn(ReadLoop::new(framed, conn.clone(), waiters_rx, handles_gone.clone()).run());

        debug!(id = %conn.id(), "connection started");
        ClientConnection { conn, waiters, handles: Arc::new(handles_gone.drop_guard()) }
    }
}

impl fmt::Debug for ClientConnectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnectionBuilder")
            .field("config", &self.config)
            .field("close_hook", &self.close_hook.is_some())
            .field("parent", &self.parent)
            .finish()
    }
}

impl ClientConnection {
    /// Starts a connection with the default settings.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::builder().build(reader, writer)
    }

    pub fn builder() -> ClientConnectionBuilder {
        ClientConnectionBuilder::new()
    }

    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    /// The root scope of the connection, cancelled when it closes.
    pub fn context(&self) -> CancelScope {
        self.conn.scope().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }

    /// Closes the connection. Only the first cause is recorded.
    pub fn close(&self, cause: Option<HttpError>) {
        self.conn.close(cause.map(Arc::new));
    }

    /// Takes the raw stream of a connection that switched protocols.
    ///
    /// Fails with [`HttpError::NotUpgraded`] unless a `101` response or a
    /// successful `CONNECT` has been delivered and its stream not taken yet.
    pub async fn stream(&self) -> Result<Upgraded, HttpError> {
        self.conn.stream().await
    }

    /// Sends a request with the default options.
    pub async fn send<B>(&self, request: Request<B>) -> Result<Response<RespBody>, HttpError>
    where
        B: Body + Send + 'static,
        B::Data: Buf + Send,
        B::Error: Into<Box<dyn Error + Send + Sync>> + Send,
    {
        self.send_request(request, RequestOptions::default()).await
    }

    /// Writes `request` and waits for its response head.
    ///
    /// The request is written by a task of its own, so a response may arrive
    /// while the body is still being sent. Closing such a response's body
    /// before the write finished tears the connection down with
    /// [`HttpError::WriteNotDone`].
    ///
    /// Giving up through the options' cancellation token or timeout returns
    /// [`HttpError::Canceled`] or [`HttpError::Timeout`] and leaves the
    /// connection usable: the request is still written, and its response is
    /// read and discarded when it arrives.
    pub async fn send_request<B>(&self, request: Request<B>, options: RequestOptions) -> Result<Response<RespBody>, HttpError>
    where
        B: Body + Send + 'static,
        B::Data: Buf + Send,
        B::Error: Into<Box<dyn Error + Send + Sync>> + Send,
    {
        let root = self.conn.scope();
        if root.is_cancelled() {
            return Err(root.error());
        }

        let RequestOptions { header_order, cancel, timeout } = options;
        let cancel = cancel.unwrap_or_default();

        let exchange = self.exchange(request, header_order, &cancel);
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, exchange).await.unwrap_or_else(|_elapsed| {
                debug!(id = %self.id(), ?timeout, "request timed out");
                Err(HttpError::Timeout)
            }),
            None => exchange.await,
        }
    }

    async fn exchange<B>(
        &self,
        mut request: Request<B>,
        header_order: Option<HeaderOrder>,
        cancel: &CancellationToken,
    ) -> Result<Response<RespBody>, HttpError>
    where
        B: Body + Send + 'static,
        B::Data: Buf + Send,
        B::Error: Into<Box<dyn Error + Send + Sync>> + Send,
    {
        if let Some(header_order) = header_order {
            request.extensions_mut().insert(header_order);
        }

        let root = self.conn.scope();
        let writer = tokio::select! {
            biased;
            _ = root.cancelled() => return Err(root.error()),
            _ = cancel.cancelled() => return Err(HttpError::Canceled),
            writer = Arc::clone(self.conn.writer()).lock_owned() => writer,
        };
        if writer.is_none() {
            return Err(root.error());
        }

        let (tx, mut response_rx) = oneshot::channel();
        let waiter = Waiter { method: request.method().clone(), tx };
        let mut waiters = self.waiters.clone();
        let registered = tokio::select! {
            biased;
            _ = root.cancelled() => return Err(root.error()),
            _ = cancel.cancelled() => return Err(HttpError::Canceled),
            registered = waiters.send(waiter) => registered,
        };
        if registered.is_err() {
            return Err(root.error());
        }

        trace!(id = %self.id(), method = %request.method(), uri = %request.uri(), "sending request");
        let write_done = CancellationToken::new();
        let (write_tx, mut write_rx) = oneshot::channel();
        tokio::spawn(write_request(
            self.conn.clone(),
            writer,
            request,
            write_done.clone().drop_guard(),
            Arc::clone(&self.handles),
            write_tx,
        ));

        let mut written = false;
        loop {
            tokio::select! {
                biased;
                response = &mut response_rx => {
                    return match response {
                        Ok(Ok(mut response)) => {
                            response.body_mut().set_write_done(write_done);
                            Ok(response)
                        }
                        Ok(Err(e)) => Err(e),
                        Err(_canceled) => Err(root.error()),
                    };
                }
                write = &mut write_rx, if !written => match write {
                    Ok(Ok(size)) => {
                        trace!(id = %self.id(), size, "request written");
                        written = true;
                    }
                    Ok(Err(e)) => return Err(e),
                    Err(_canceled) => return Err(root.error()),
                },
                _ = root.cancelled() => return Err(root.error()),
                _ = cancel.cancelled() => return Err(HttpError::Canceled),
            }
        }
    }
}

/// Writes one request while holding the write half.
///
/// A failed write leaves the peer with a partial message, so it closes the
/// connection.
async fn write_request<B>(
    conn: ConnectionHandle,
    mut writer: OwnedMutexGuard<Option<MessageWriter<BoxWriter>>>,
    request: Request<B>,
    write_done: DropGuard,
    _handles: Arc<DropGuard>,
    result_tx: oneshot::Sender<Result<u64, HttpError>>,
) where
    B: Body,
    B::Error: Into<Box<dyn Error + Send + Sync>> + Send,
{
    let root = conn.scope();
    let result = match writer.as_mut() {
        Some(message_writer) => tokio::select! {
            biased;
            _ = root.cancelled() => Err(root.error()),
            written = message_writer.write_request(request) => written.map_err(|e| {
                let cause = Arc::new(HttpError::from(e));
                warn!(id = %conn.id(), cause = %cause, "failed to write request");
                conn.close(Some(Arc::clone(&cause)));
                HttpError::closed(Some(cause))
            }),
        },
        None => Err(root.error()),
    };

    drop(write_done);
    drop(writer);
    let _ = result_tx.send(result);
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection").field("id", &self.id()).field("closed", &self.is_closed()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::{Bytes, BytesMut};
    use futures::{stream, StreamExt};
    use http::{Method, StatusCode};
    use http_body::Frame;
    use http_body_util::{BodyExt, Empty, StreamBody};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    use super::*;
    use crate::codec::{RequestDecoder, ResponseEncoder};
    use crate::protocol::{Message, PayloadItem, PayloadSize, RequestHeader, ResponseHead};
    use tokio_util::codec::Encoder;

    /// The server end of an in-memory connection.
    struct Peer {
        requests: FramedRead<ReadHalf<DuplexStream>, RequestDecoder>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Peer {
        async fn request(&mut self) -> RequestHeader {
            match self.requests.next().await {
                Some(Ok(Message::Header((header, _payload_size)))) => header,
                other => panic!("expected a request head, got {other:?}"),
            }
        }

        async fn body(&mut self) -> Bytes {
            let mut body = BytesMut::new();
            loop {
                match self.requests.next().await {
                    Some(Ok(Message::Payload(PayloadItem::Chunk(bytes)))) => body.extend_from_slice(&bytes),
                    Some(Ok(Message::Payload(PayloadItem::Eof))) => return body.freeze(),
                    other => panic!("expected request payload, got {other:?}"),
                }
            }
        }

        async fn respond(&mut self, raw: &str) {
            self.writer.write_all(raw.as_bytes()).await.unwrap();
        }

        async fn reply(&mut self, head: ResponseHead, payload_size: PayloadSize, chunks: &[&'static [u8]]) {
            let mut encoder = ResponseEncoder::new();
            let mut raw = BytesMut::new();
            encoder.encode(Message::<_, Bytes>::Header((head, payload_size)), &mut raw).unwrap();
            if !payload_size.is_empty() {
                for chunk in chunks {
                    let item = PayloadItem::Chunk(Bytes::from_static(chunk));
                    encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(item), &mut raw).unwrap();
                }
                encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Eof), &mut raw).unwrap();
            }
            self.writer.write_all(&raw).await.unwrap();
        }

        async fn hang_up(&mut self) {
            self.writer.shutdown().await.unwrap();
        }
    }

    fn connect() -> (ClientConnection, Peer) {
        connect_with(ClientConnection::builder())
    }

    fn connect_with(builder: ClientConnectionBuilder) -> (ClientConnection, Peer) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(client);
        let connection = builder.build(reader, writer);

        let (server_reader, server_writer) = tokio::io::split(server);
        let peer = Peer { requests: FramedRead::new(server_reader, RequestDecoder::new()), writer: server_writer };
        (connection, peer)
    }

    fn get(uri: &str) -> Request<Empty<Bytes>> {
        Request::get(uri).body(Empty::new()).unwrap()
    }

    async fn body_string(response: Response<RespBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn closed_cause(connection: &ClientConnection) -> Option<Arc<HttpError>> {
        let scope = connection.context();
        scope.cancelled().await;
        scope.cause().flatten()
    }

    #[tokio::test]
    async fn get_with_content_length() {
        let (connection, mut peer) = connect();

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/hello?x=1")), async {
            let request = peer.request().await;
            assert_eq!(request.method(), Method::GET);
            assert_eq!(request.uri().path(), "/hello");
            assert_eq!(request.headers().get("host").unwrap(), "example.com");
            peer.respond("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello").await;
        });

        let response = response.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "hello");

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/again")), async {
            assert_eq!(peer.request().await.uri().path(), "/again");
            peer.respond("HTTP/1.1 204 No Content\r\n\r\n").await;
        });
        assert_eq!(response.unwrap().status(), StatusCode::NO_CONTENT);
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn zero_length_body() {
        let (connection, mut peer) = connect();

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/")), async {
            peer.request().await;
            peer.respond("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await;
        });

        let response = response.unwrap();
        assert!(response.body().is_end_stream());
        assert_eq!(body_string(response).await, "");
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn close_delimited_body_reads_to_eof() {
        let (connection, mut peer) = connect();

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/")), async {
            peer.request().await;
            peer.respond("HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nuntil the end").await;
            peer.hang_up().await;
        });

        assert_eq!(body_string(response.unwrap()).await, "until the end");
        assert!(closed_cause(&connection).await.is_none());

        let err = connection.send(get("http://example.com/")).await.unwrap_err();
        assert!(matches!(err, HttpError::ConnectionClosed { cause: None }));
    }

    #[tokio::test]
    async fn next_response_waits_for_body() {
        let (connection, mut peer) = connect();

        let (first, ()) = tokio::join!(connection.send(get("http://example.com/1")), async {
            peer.request().await;
            peer.respond("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nfirstHTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\nsecond").await;
        });
        let first = first.unwrap();

        let second_connection = connection.clone();
        let mut second = tokio::spawn(async move { second_connection.send(get("http://example.com/2")).await });
        assert_eq!(peer.request().await.uri().path(), "/2");

        let pending = tokio::time::timeout(Duration::from_millis(50), &mut second).await;
        assert!(pending.is_err(), "second response delivered while the first body was open");

        assert_eq!(body_string(first).await, "first");
        let second = second.await.unwrap().unwrap();
        assert_eq!(body_string(second).await, "second");
    }

    #[tokio::test]
    async fn released_body_with_buffered_rest_keeps_connection() {
        let (connection, mut peer) = connect();

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/")), async {
            peer.request().await;
            peer.respond("HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nskip").await;
        });
        let mut response = response.unwrap();
        tokio::task::yield_now().await;
        response.body_mut().close();

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/next")), async {
            peer.request().await;
            peer.respond("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await;
        });
        assert_eq!(body_string(response.unwrap()).await, "ok");
    }

    #[tokio::test]
    async fn early_close_tears_down() {
        let (connection, mut peer) = connect();

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/")), async {
            peer.request().await;
            peer.respond("HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc").await;
        });
        drop(response.unwrap());

        let cause = closed_cause(&connection).await.unwrap();
        assert!(matches!(*cause, HttpError::BodyNotConsumed));

        let err = connection.send(get("http://example.com/")).await.unwrap_err();
        assert!(matches!(err.close_cause(), Some(HttpError::BodyNotConsumed)));
    }

    #[tokio::test]
    async fn malformed_status_line() {
        let (connection, mut peer) = connect();

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/")), async {
            peer.request().await;
            peer.respond("HTTP/1.1 abc OK\r\n\r\n").await;
        });

        let err = response.unwrap_err();
        assert!(matches!(err.close_cause(), Some(HttpError::ResponseError { source: crate::protocol::ParseError::InvalidStatusCode { .. } })));
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn peer_close_at_boundary() {
        let (connection, mut peer) = connect();

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/")), async {
            peer.request().await;
            peer.respond("HTTP/1.1 204 No Content\r\n\r\n").await;
            peer.hang_up().await;
        });
        assert_eq!(response.unwrap().status(), StatusCode::NO_CONTENT);

        let cause = closed_cause(&connection).await.unwrap();
        assert!(matches!(*cause, HttpError::PeerClosed));
    }

    #[tokio::test]
    async fn informational_responses_are_skipped() {
        let (connection, mut peer) = connect();

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/")), async {
            peer.request().await;
            peer.respond("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 103 Early Hints\r\nLink: </a.css>\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await;
        });

        let response = response.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");
    }

    #[tokio::test]
    async fn chunked_response_with_trailers() {
        let (connection, mut peer) = connect();

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/")), async {
            peer.request().await;
            peer.respond("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\nX-Checksum: abc\r\n\r\n").await;
        });

        let collected = response.unwrap().into_body().collect().await.unwrap();
        assert_eq!(collected.trailers().unwrap().get("x-checksum").unwrap(), "abc");
        assert_eq!(collected.to_bytes(), "hello world");
    }

    #[tokio::test]
    async fn chunked_request_body() {
        let (connection, mut peer) = connect();

        let chunks = vec![Ok::<_, std::io::Error>(Frame::data(Bytes::from_static(b"hello "))), Ok(Frame::data(Bytes::from_static(b"world")))];
        let request = Request::post("http://example.com/upload").body(StreamBody::new(stream::iter(chunks))).unwrap();

        let (response, ()) = tokio::join!(connection.send(request), async {
            let request = peer.request().await;
            assert_eq!(request.headers().get("transfer-encoding").unwrap(), "chunked");
            assert_eq!(peer.body().await, "hello world");
            peer.respond("HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n").await;
        });

        assert_eq!(response.unwrap().status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn head_response_has_no_body() {
        let (connection, mut peer) = connect();

        let head = Request::head("http://example.com/").body(Empty::<Bytes>::new()).unwrap();
        let (response, ()) = tokio::join!(connection.send(head), async {
            peer.request().await;
            peer.respond("HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n").await;
        });

        let response = response.unwrap();
        assert_eq!(response.headers().get("content-length").unwrap(), "100");
        assert!(response.body().is_end_stream());
        drop(response);

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/")), async {
            peer.request().await;
            peer.respond("HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nyes").await;
        });
        assert_eq!(body_string(response.unwrap()).await, "yes");
    }

    #[tokio::test]
    async fn timeout_leaves_connection_usable() {
        let (connection, mut peer) = connect();

        let options = RequestOptions::new().timeout(Duration::from_millis(20));
        let (response, ()) = tokio::join!(connection.send_request(get("http://example.com/slow"), options), async {
            peer.request().await;
        });
        assert!(matches!(response, Err(HttpError::Timeout)));
        assert!(!connection.is_closed());

        peer.respond("HTTP/1.1 200 OK\r\nContent-Length: 6\r\n\r\norphan").await;

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/fast")), async {
            assert_eq!(peer.request().await.uri().path(), "/fast");
            peer.respond("HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nfast").await;
        });
        assert_eq!(body_string(response.unwrap()).await, "fast");
    }

    #[tokio::test]
    async fn caller_cancel_leaves_connection_open() {
        let (connection, mut peer) = connect();

        let cancel = CancellationToken::new();
        let options = RequestOptions::new().cancel(cancel.clone());
        let (response, ()) = tokio::join!(connection.send_request(get("http://example.com/"), options), async {
            peer.request().await;
            cancel.cancel();
        });

        assert!(matches!(response, Err(HttpError::Canceled)));
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn close_hook_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let builder = ClientConnection::builder().on_close(move |cause| {
            assert!(cause.is_none());
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (connection, _peer) = connect_with(builder);

        connection.close(None);
        connection.close(Some(HttpError::PeerClosed));
        connection.context().cancelled().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(connection.context().cause().unwrap().is_none());
    }

    #[tokio::test]
    async fn body_error_closes_connection() {
        let (connection, mut peer) = connect();

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/")), async {
            peer.request().await;
            peer.respond("HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\ndata").await;
        });
        let mut response = response.unwrap();
        response.body_mut().close_with_error(HttpError::body("checksum mismatch"));

        let cause = closed_cause(&connection).await.unwrap();
        assert!(matches!(*cause, HttpError::Body { .. }));
    }

    #[tokio::test]
    async fn parent_scope_closes_connection() {
        let parent = CancelScope::new();
        let (connection, _peer) = connect_with(ClientConnection::builder().parent(&parent));

        parent.cancel(Some(Arc::new(HttpError::Canceled)));

        let cause = closed_cause(&connection).await.unwrap();
        assert!(matches!(*cause, HttpError::Canceled));
    }

    #[tokio::test]
    async fn switching_protocols() {
        let (connection, mut peer) = connect();

        let request = Request::get("http://example.com/chat")
            .header("connection", "upgrade")
            .header("upgrade", "echo")
            .body(Empty::<Bytes>::new())
            .unwrap();
        let (response, ()) = tokio::join!(connection.send(request), async {
            peer.request().await;
            peer.respond("HTTP/1.1 101 Switching Protocols\r\nConnection: upgrade\r\nUpgrade: echo\r\n\r\nearly").await;
        });

        let response = response.unwrap();
        assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
        assert!(response.body().is_upgrade());

        let mut upgraded = response.into_body().upgrade().await.unwrap();
        let mut early = [0u8; 5];
        upgraded.read_exact(&mut early).await.unwrap();
        assert_eq!(&early, b"early");

        upgraded.write_all(b"ping").await.unwrap();
        let mut ping = [0u8; 4];
        peer.requests.get_mut().read_exact(&mut ping).await.unwrap();
        assert_eq!(&ping, b"ping");

        peer.respond("pong").await;
        let mut pong = [0u8; 4];
        upgraded.read_exact(&mut pong).await.unwrap();
        assert_eq!(&pong, b"pong");

        assert!(!connection.is_closed());
        drop(upgraded);
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn close_releases_upgraded_stream() {
        let (connection, mut peer) = connect();

        let request = Request::get("http://example.com/chat")
            .header("connection", "upgrade")
            .header("upgrade", "echo")
            .body(Empty::<Bytes>::new())
            .unwrap();
        let (response, ()) = tokio::join!(connection.send(request), async {
            peer.request().await;
            peer.respond("HTTP/1.1 101 Switching Protocols\r\nConnection: upgrade\r\nUpgrade: echo\r\n\r\n").await;
        });
        let mut upgraded = response.unwrap().into_body().upgrade().await.unwrap();

        let parked = tokio::spawn(async move {
            let mut byte = [0u8; 1];
            let read = upgraded.read(&mut byte).await;
            (upgraded, read)
        });
        tokio::task::yield_now().await;
        connection.close(Some(HttpError::Canceled));

        let (mut upgraded, read) = parked.await.unwrap();
        assert_eq!(read.unwrap_err().kind(), io::ErrorKind::NotConnected);
        assert_eq!(upgraded.write_all(b"ping").await.unwrap_err().kind(), io::ErrorKind::NotConnected);

        let mut rest = Vec::new();
        peer.requests.get_mut().read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn spawned_send_with_streaming_body() {
        let (connection, mut peer) = connect();

        let chunks = stream::iter([Ok::<_, io::Error>(Frame::data(Bytes::from_static(b"spawned")))]);
        let request = Request::post("http://example.com/upload").body(StreamBody::new(chunks)).unwrap();
        let sender = connection.clone();
        let response = tokio::spawn(async move { sender.send(request).await });

        peer.request().await;
        assert_eq!(peer.body().await, Bytes::from_static(b"spawned"));
        peer.respond("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await;

        assert_eq!(body_string(response.await.unwrap().unwrap()).await, "ok");
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn body_closed_while_request_still_written() {
        let (connection, mut peer) = connect();

        let (mut body_tx, body_rx) = mpsc::channel::<Result<Frame<Bytes>, io::Error>>(1);
        body_tx.send(Ok(Frame::data(Bytes::from_static(b"part")))).await.unwrap();
        let request = Request::post("http://example.com/upload").body(StreamBody::new(body_rx)).unwrap();

        let (response, ()) = tokio::join!(connection.send(request), async {
            peer.request().await;
            peer.respond("HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await;
        });
        assert_eq!(body_string(response.unwrap()).await, "ok");

        let cause = closed_cause(&connection).await.unwrap();
        assert!(matches!(*cause, HttpError::WriteNotDone));
        drop(body_tx);
    }

    #[tokio::test]
    async fn dropping_close_delimited_body_closes_cleanly() {
        let (connection, mut peer) = connect();

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/")), async {
            peer.request().await;
            peer.respond("HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 10\r\n\r\nabc").await;
        });
        drop(response.unwrap());

        assert!(connection.is_closed());
        assert!(closed_cause(&connection).await.is_none());
    }

    #[tokio::test]
    async fn encoded_chunked_and_close_delimited_responses() {
        let (connection, mut peer) = connect();

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/a")), async {
            peer.request().await;
            peer.reply(ResponseHead::default(), PayloadSize::Chunked, &[b"hello ", b"world"]).await;
        });
        let response = response.unwrap();
        assert_eq!(response.headers()["transfer-encoding"], "chunked");
        assert_eq!(body_string(response).await, "hello world");

        let (response, ()) = tokio::join!(connection.send(get("http://example.com/b")), async {
            peer.request().await;
            peer.reply(ResponseHead::default(), PayloadSize::UntilClose, &[b"until ", b"close"]).await;
            peer.hang_up().await;
        });
        let response = response.unwrap();
        assert_eq!(response.headers()["connection"], "close");
        assert_eq!(body_string(response).await, "until close");
        assert!(closed_cause(&connection).await.is_none());
    }

    #[tokio::test]
    async fn connect_tunnel() {
        let (connection, mut peer) = connect();

        let request = Request::connect("example.com:443").body(Empty::<Bytes>::new()).unwrap();
        let (response, ()) = tokio::join!(connection.send(request), async {
            let request = peer.request().await;
            assert_eq!(request.method(), Method::CONNECT);
            assert_eq!(request.host(), Some("example.com:443"));
            peer.respond("HTTP/1.1 200 Connection Established\r\nContent-Length: 10\r\n\r\n").await;
        });

        let response = response.unwrap();
        assert!(response.body().is_upgrade());

        let mut tunnel = connection.stream().await.unwrap();
        peer.respond("raw").await;
        let mut raw = [0u8; 3];
        tunnel.read_exact(&mut raw).await.unwrap();
        assert_eq!(&raw, b"raw");

        assert!(matches!(connection.stream().await, Err(HttpError::NotUpgraded)));
        drop(response);
    }

    #[tokio::test]
    async fn stream_without_upgrade() {
        let (connection, _peer) = connect();
        assert!(matches!(connection.stream().await, Err(HttpError::NotUpgraded)));
    }
}
