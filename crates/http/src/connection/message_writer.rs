use std::error::Error;
use std::pin::pin;

use bytes::{Buf, BytesMut};
use http::Request;
use http_body::Body;
use http_body_util::BodyExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::codec::RequestEncoder;
use crate::protocol::{Message, PayloadItem, PayloadSize, RequestHeader, SendError};

/// Buffered bytes that force a flush while a fixed-length body is copied.
const FLUSH_THRESHOLD: usize = 8 * 1024;

/// The write half of a connection with its encode buffer.
#[derive(Debug)]
pub struct MessageWriter<W> {
    writer: W,
    buffer: BytesMut,
    encoder: RequestEncoder,
}

impl<W> MessageWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn with_capacity(writer: W, buffer_size: usize) -> Self {
        Self { writer, buffer: BytesMut::with_capacity(buffer_size), encoder: RequestEncoder::new() }
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    #[inline]
    pub fn write<D>(&mut self, item: Message<(RequestHeader, PayloadSize), D>) -> Result<(), SendError>
    where
        D: Buf,
    {
        self.encoder.encode(item, &mut self.buffer)
    }

    #[inline]
    pub async fn flush(&mut self) -> Result<(), SendError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        self.writer.write_all_buf(&mut self.buffer).await?;
        Ok(self.writer.flush().await?)
    }

    /// Writes a whole request: the head, then the body framed as its size hint
    /// dictates.
    ///
    /// Chunked bodies are flushed chunk by chunk so a streaming producer is
    /// never held back by the buffer. Returns the number of body bytes written.
    pub async fn write_request<B>(&mut self, request: Request<B>) -> Result<u64, SendError>
    where
        B: Body,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        let (parts, body) = request.into_parts();
        let payload_size = PayloadSize::classify(&parts.method, &body.size_hint());

        self.write(Message::<_, B::Data>::Header((RequestHeader::from(parts), payload_size)))?;
        if payload_size.is_empty() {
            self.flush().await?;
            return Ok(0);
        }

        let mut body = pin!(body);
        let mut written: u64 = 0;
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| SendError::invalid_body(format!("request body error: {}", e.into())))?;

            match frame.into_data() {
                Ok(data) => {
                    written += data.remaining() as u64;
                    self.write(Message::<(RequestHeader, PayloadSize), _>::Payload(PayloadItem::Chunk(data)))?;
                    if payload_size.is_chunked() || self.buffer.len() >= FLUSH_THRESHOLD {
                        self.flush().await?;
                    }
                }
                Err(_trailers) => trace!("request trailers are not sent"),
            }
        }

        self.write(Message::<(RequestHeader, PayloadSize), B::Data>::Payload(PayloadItem::Eof))?;
        self.flush().await?;
        trace!(size = written, "request body written");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::stream;
    use http_body::Frame;
    use http_body_util::{Full, StreamBody};
    use indoc::indoc;
    use tokio::io::AsyncReadExt;

    use super::*;

    async fn written<B>(request: Request<B>) -> (Result<u64, SendError>, String)
    where
        B: Body,
        B::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        let mut writer = MessageWriter::with_capacity(client, 1024);
        let result = writer.write_request(request).await;
        drop(writer);

        let mut output = String::new();
        server.read_to_string(&mut output).await.unwrap();
        (result, output)
    }

    #[tokio::test]
    async fn get_without_body() {
        let request = Request::get("http://example.com/index.html?q=1").body(Full::new(Bytes::new())).unwrap();
        let (result, output) = written(request).await;

        assert_eq!(result.unwrap(), 0);
        assert_eq!(
            output,
            indoc! {"\
            GET /index.html?q=1 HTTP/1.1\r
            host: example.com\r
            \r
            "}
        );
    }

    #[tokio::test]
    async fn post_with_length() {
        let request = Request::post("http://example.com/").body(Full::new(Bytes::from_static(b"hello"))).unwrap();
        let (result, output) = written(request).await;

        assert_eq!(result.unwrap(), 5);
        assert!(output.starts_with("POST / HTTP/1.1\r\n"));
        assert!(output.contains("content-length: 5\r\n"));
        assert!(output.ends_with("\r\n\r\nhello"));
    }

    #[tokio::test]
    async fn streaming_body_is_chunked() {
        let chunks = vec![
            Ok::<_, std::io::Error>(Frame::data(Bytes::from_static(b"abc"))),
            Ok(Frame::data(Bytes::from_static(b"defgh"))),
        ];
        let body = StreamBody::new(stream::iter(chunks));
        let request = Request::put("http://example.com/upload").body(body).unwrap();
        let (result, output) = written(request).await;

        assert_eq!(result.unwrap(), 8);
        assert!(output.contains("transfer-encoding: chunked\r\n"));
        assert!(output.ends_with("\r\n\r\n3\r\nabc\r\n5\r\ndefgh\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn body_error_is_send_error() {
        let chunks = vec![
            Ok(Frame::data(Bytes::from_static(b"abc"))),
            Err(std::io::Error::other("producer failed")),
        ];
        let body = StreamBody::new(stream::iter(chunks));
        let request = Request::post("http://example.com/").body(body).unwrap();
        let (result, _output) = written(request).await;

        assert!(matches!(result, Err(SendError::InvalidBody { .. })));
    }
}
