//! Relay frame codec - frames a byte stream into `RelayFrame`s.
//!
//! Reads the fixed header, waits for the full body, then parses. Oversized
//! or malformed headers fail the stream; the connection is expected to close.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use linx_core::LinxError;

use crate::{FrameHeader, RelayFrame, HEADER_SIZE};

/// A tokio codec for relay frames
#[derive(Debug, Default, Clone, Copy)]
pub struct RelayCodec;

impl Decoder for RelayCodec {
    type Item = RelayFrame;
    type Error = LinxError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let header = FrameHeader::parse(&src[..HEADER_SIZE])?;
        let total = HEADER_SIZE + header.body_len as usize;

        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let body = src.split_to(header.body_len as usize);
        RelayFrame::parse_body(header.kind, &body).map(Some)
    }
}

impl Encoder<RelayFrame> for RelayCodec {
    type Error = LinxError;

    fn encode(&mut self, item: RelayFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linx_core::{ParentChain, PublicKey, Scope};

    use crate::{Announcement, FrameKind, WIRE_VERSION};

    fn subscribe(name: &str) -> RelayFrame {
        RelayFrame::Subscribe {
            scope: Scope::new(name).unwrap(),
        }
    }

    #[test]
    fn decode_waits_for_complete_frame() {
        let mut codec = RelayCodec;
        let bytes = subscribe("swarm1").serialize().unwrap();

        let mut buf = BytesMut::from(&bytes[..4]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[4..bytes.len() - 1]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[bytes.len() - 1..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(subscribe("swarm1")));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_multiple_frames_in_one_buffer() {
        let mut codec = RelayCodec;
        let join = RelayFrame::JoinRequest(Announcement {
            scope: Scope::new("swarm1").unwrap(),
            public_key: PublicKey::from_bytes([1; 32]),
            parents: ParentChain::new(),
        });

        let mut buf = BytesMut::new();
        codec.encode(subscribe("a"), &mut buf).unwrap();
        codec.encode(join.clone(), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(subscribe("a")));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(join));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn decode_rejects_bad_header_early() {
        let mut codec = RelayCodec;
        let mut buf = BytesMut::from(&[WIRE_VERSION, 0xEE, 0, 0, 0, 0][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(LinxError::UnknownFrameKind(0xEE))
        ));
    }

    #[test]
    fn decode_rejects_oversized_length_before_buffering() {
        let mut codec = RelayCodec;
        let len = u32::MAX.to_le_bytes();
        let mut buf = BytesMut::from(
            &[WIRE_VERSION, FrameKind::Offer.to_byte(), len[0], len[1], len[2], len[3]][..],
        );
        assert!(matches!(
            codec.decode(&mut buf),
            Err(LinxError::FrameTooLarge { .. })
        ));
    }
}
