//! HTTP request encoder
//!
//! Turns a request head and its body items into wire bytes. The framing
//! chosen for the head decides how payload items are encoded:
//!
//! - `Content-Length`: bytes are written as they are, and the total must
//!   match the announced length
//! - chunked: every item becomes one chunk, and `Eof` writes the last chunk
//! - empty: no payload items are expected

use crate::codec::body::PayloadEncoder;
use crate::codec::header::RequestHeaderEncoder;
use crate::protocol::{Message, PayloadSize, RequestHeader, SendError};
use bytes::{Buf, BytesMut};
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

#[derive(Debug, Default)]
pub struct RequestEncoder {
    header_encoder: RequestHeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl RequestEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while a body is expected for the last written head.
    pub fn in_payload(&self) -> bool {
        self.payload_encoder.is_some()
    }
}

impl<D: Buf> Encoder<Message<(RequestHeader, PayloadSize), D>> for RequestEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(RequestHeader, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive request head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                self.header_encoder.encode((head, payload_size), dst)?;
                if !payload_size.is_empty() {
                    self.payload_encoder = Some(payload_size.into());
                }
                Ok(())
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect request header but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let result = payload_encoder.encode(payload_item, dst);

                if result.is_err() || payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }

                result
            }
        }
    }
}
