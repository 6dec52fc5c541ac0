//! Frame decoder for use with [`monoio_codec::FramedRead`].

use bytes::{Buf, BytesMut};
use monoio_codec::{Decoded, Decoder};

use crate::{
    error::{CapacityError, Error, ProtocolError},
    protocol::frame::{Frame, FrameHeader},
};

/// Streaming decoder that reassembles one [`Frame`] at a time out of the
/// read buffer.
///
/// A frame may arrive split over any number of transport reads; the decoder
/// reports [`Decoded::Insufficient`] until the buffer holds the whole frame.
/// Conversely, several frames packed into a single read are decoded one per
/// call, in arrival order.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    max_frame_size: Option<usize>,
}

impl FrameDecoder {
    /// Creates a decoder enforcing the given payload size limit.
    pub fn new(max_frame_size: Option<usize>) -> Self {
        Self { max_frame_size }
    }

    /// Returns the configured payload size limit.
    pub fn max_frame_size(&self) -> Option<usize> {
        self.max_frame_size
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(Some(16 << 20))
    }
}

impl Decoder for FrameDecoder {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Decoded<Frame>, Self::Error> {
        let Some((header, header_len, length)) = FrameHeader::parse(src) else {
            return Ok(Decoded::Insufficient);
        };

        if header.masked {
            // A client MUST close a connection if it detects a masked frame. (RFC 6455)
            return Err(Error::Protocol(ProtocolError::MaskedFrameFromServer));
        }

        // MUST be 0 unless an extension is negotiated that defines meanings
        // for non-zero values. (RFC 6455)
        if header.rsv1 || header.rsv2 || header.rsv3 {
            return Err(Error::Protocol(ProtocolError::NonZeroReservedBits));
        }

        let length = usize::try_from(length).map_err(|_| {
            Error::Capacity(CapacityError::FrameTooLong {
                size: usize::MAX,
                max_size: self.max_frame_size.unwrap_or(usize::MAX),
            })
        })?;

        if let Some(max_size) = self.max_frame_size {
            if length > max_size {
                return Err(Error::Capacity(CapacityError::FrameTooLong {
                    size: length,
                    max_size,
                }));
            }
        }

        if src.len() < header_len + length {
            return Ok(Decoded::Insufficient);
        }

        src.advance(header_len);
        let payload = src.split_to(length).freeze();

        Ok(Decoded::Some(Frame { header, payload }))
    }
}
