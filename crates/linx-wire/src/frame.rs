//! Relay frames
//!
//! Frame = Fixed Header + Body. Body layouts:
//! - Subscribe / Unsubscribe: scope
//! - Announce / JoinRequest: scope, public key, parent chain
//! - SendOffer: recipient key, sender key, nonce, ciphertext
//! - Offer: sender key, nonce, ciphertext
//!
//! Scopes are `u16`-prefixed UTF-8, chains are a `u16` count of 32-byte keys,
//! ciphertexts are `u32`-prefixed.

use bytes::{BufMut, BytesMut};

use linx_core::{
    LinxError, LinxResult, ParentChain, PublicKey, Scope, MAX_PARENT_CHAIN, PUBLIC_KEY_SIZE,
};

use crate::{FrameHeader, FrameKind, HEADER_SIZE};

/// Envelope nonce size
pub const ENVELOPE_NONCE_SIZE: usize = 12;

/// Join announcement as broadcast within a scope
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Announcement {
    pub scope: Scope,
    pub public_key: PublicKey,
    pub parents: ParentChain,
}

/// Encrypted signaling envelope carried verbatim by the relay
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Ciphertext with appended auth tag
    pub ciphertext: Vec<u8>,
    /// Single-use nonce
    pub nonce: [u8; ENVELOPE_NONCE_SIZE],
    /// Sender public key
    pub sender: PublicKey,
}

/// A frame exchanged with the relay
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayFrame {
    Subscribe { scope: Scope },
    Unsubscribe { scope: Scope },
    Announce(Announcement),
    JoinRequest(Announcement),
    SendOffer { to: PublicKey, envelope: Envelope },
    Offer(Envelope),
}

impl RelayFrame {
    pub fn kind(&self) -> FrameKind {
        match self {
            RelayFrame::Subscribe { .. } => FrameKind::Subscribe,
            RelayFrame::Unsubscribe { .. } => FrameKind::Unsubscribe,
            RelayFrame::Announce(_) => FrameKind::Announce,
            RelayFrame::JoinRequest(_) => FrameKind::JoinRequest,
            RelayFrame::SendOffer { .. } => FrameKind::SendOffer,
            RelayFrame::Offer(_) => FrameKind::Offer,
        }
    }

    /// Serialize the frame (header + body)
    pub fn serialize(&self) -> LinxResult<Vec<u8>> {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf)?;
        Ok(buf.to_vec())
    }

    /// Append the serialized frame to `dst`
    pub fn encode_into(&self, dst: &mut BytesMut) -> LinxResult<()> {
        let mut body = BytesMut::new();
        match self {
            RelayFrame::Subscribe { scope } | RelayFrame::Unsubscribe { scope } => {
                put_scope(&mut body, scope);
            }
            RelayFrame::Announce(a) | RelayFrame::JoinRequest(a) => {
                put_scope(&mut body, &a.scope);
                body.put_slice(a.public_key.as_bytes());
                put_chain(&mut body, &a.parents);
            }
            RelayFrame::SendOffer { to, envelope } => {
                body.put_slice(to.as_bytes());
                put_envelope(&mut body, envelope);
            }
            RelayFrame::Offer(envelope) => {
                put_envelope(&mut body, envelope);
            }
        }

        let header = FrameHeader::new(self.kind(), body.len())?;
        dst.reserve(HEADER_SIZE + body.len());
        dst.put_slice(&header.to_bytes());
        dst.put_slice(&body);
        Ok(())
    }

    /// Parse one complete frame. Trailing bytes are an error.
    pub fn parse(buf: &[u8]) -> LinxResult<Self> {
        let header = FrameHeader::parse(buf)?;
        let total = HEADER_SIZE + header.body_len as usize;
        if buf.len() < total {
            return Err(LinxError::BufferTooShort {
                expected: total,
                actual: buf.len(),
            });
        }
        if buf.len() > total {
            return Err(LinxError::InvalidWireFormat("trailing bytes after frame".into()));
        }
        Self::parse_body(header.kind, &buf[HEADER_SIZE..total])
    }

    /// Parse a body whose kind is already known
    pub fn parse_body(kind: FrameKind, body: &[u8]) -> LinxResult<Self> {
        let mut r = Reader::new(body);
        let frame = match kind {
            FrameKind::Subscribe => RelayFrame::Subscribe { scope: r.scope()? },
            FrameKind::Unsubscribe => RelayFrame::Unsubscribe { scope: r.scope()? },
            FrameKind::Announce => RelayFrame::Announce(r.announcement()?),
            FrameKind::JoinRequest => RelayFrame::JoinRequest(r.announcement()?),
            FrameKind::SendOffer => {
                let to = r.key()?;
                RelayFrame::SendOffer {
                    to,
                    envelope: r.envelope()?,
                }
            }
            FrameKind::Offer => RelayFrame::Offer(r.envelope()?),
        };
        r.finish()?;
        Ok(frame)
    }
}

fn put_scope(buf: &mut BytesMut, scope: &Scope) {
    let bytes = scope.as_str().as_bytes();
    buf.put_u16_le(bytes.len() as u16);
    buf.put_slice(bytes);
}

fn put_chain(buf: &mut BytesMut, chain: &ParentChain) {
    buf.put_u16_le(chain.len() as u16);
    for key in chain.iter() {
        buf.put_slice(key.as_bytes());
    }
}

fn put_envelope(buf: &mut BytesMut, envelope: &Envelope) {
    buf.put_slice(envelope.sender.as_bytes());
    buf.put_slice(&envelope.nonce);
    buf.put_u32_le(envelope.ciphertext.len() as u32);
    buf.put_slice(&envelope.ciphertext);
}

/// Bounds-checked body reader
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> LinxResult<&'a [u8]> {
        let end = self.pos + n;
        if end > self.buf.len() {
            return Err(LinxError::BufferTooShort {
                expected: end,
                actual: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> LinxResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> LinxResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn key(&mut self) -> LinxResult<PublicKey> {
        PublicKey::from_slice(self.take(PUBLIC_KEY_SIZE)?)
    }

    fn scope(&mut self) -> LinxResult<Scope> {
        let len = self.u16()? as usize;
        let raw = self.take(len)?;
        let name = std::str::from_utf8(raw)
            .map_err(|_| LinxError::InvalidWireFormat("scope is not UTF-8".into()))?;
        Scope::new(name).map_err(|e| LinxError::InvalidWireFormat(e.to_string()))
    }

    fn chain(&mut self) -> LinxResult<ParentChain> {
        let count = self.u16()? as usize;
        if count > MAX_PARENT_CHAIN {
            return Err(LinxError::InvalidWireFormat(format!(
                "parent chain of {} exceeds {}",
                count, MAX_PARENT_CHAIN
            )));
        }
        let mut keys = Vec::with_capacity(count);
        for _ in 0..count {
            keys.push(self.key()?);
        }
        Ok(ParentChain::from_keys(keys))
    }

    fn announcement(&mut self) -> LinxResult<Announcement> {
        Ok(Announcement {
            scope: self.scope()?,
            public_key: self.key()?,
            parents: self.chain()?,
        })
    }

    fn envelope(&mut self) -> LinxResult<Envelope> {
        let sender = self.key()?;
        let mut nonce = [0u8; ENVELOPE_NONCE_SIZE];
        nonce.copy_from_slice(self.take(ENVELOPE_NONCE_SIZE)?);
        let len = self.u32()? as usize;
        let ciphertext = self.take(len)?.to_vec();
        Ok(Envelope {
            ciphertext,
            nonce,
            sender,
        })
    }

    fn finish(&self) -> LinxResult<()> {
        if self.pos != self.buf.len() {
            return Err(LinxError::InvalidWireFormat(format!(
                "{} unread body bytes",
                self.buf.len() - self.pos
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(b: u8) -> PublicKey {
        PublicKey::from_bytes([b; 32])
    }

    fn announcement() -> Announcement {
        Announcement {
            scope: Scope::new("swarm1").unwrap(),
            public_key: key(1),
            parents: ParentChain::from_keys([key(2), key(3)]),
        }
    }

    fn envelope() -> Envelope {
        Envelope {
            ciphertext: vec![0xAA; 40],
            nonce: [7u8; ENVELOPE_NONCE_SIZE],
            sender: key(4),
        }
    }

    #[test]
    fn test_announce_layout() {
        let frame = RelayFrame::Announce(announcement());
        let bytes = frame.serialize().unwrap();

        let header = FrameHeader::parse(&bytes).unwrap();
        assert_eq!(header.kind, FrameKind::Announce);
        // scope(2+6) + key(32) + chain(2 + 2*32)
        assert_eq!(header.body_len as usize, 8 + 32 + 2 + 64);
        assert_eq!(RelayFrame::parse(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_send_offer_and_offer_carry_envelope_verbatim() {
        let send = RelayFrame::SendOffer {
            to: key(9),
            envelope: envelope(),
        };
        let parsed = RelayFrame::parse(&send.serialize().unwrap()).unwrap();
        assert_eq!(parsed, send);

        let offer = RelayFrame::Offer(envelope());
        assert_eq!(RelayFrame::parse(&offer.serialize().unwrap()).unwrap(), offer);
    }

    #[test]
    fn test_truncated_body() {
        let bytes = RelayFrame::JoinRequest(announcement()).serialize().unwrap();
        assert!(matches!(
            RelayFrame::parse(&bytes[..bytes.len() - 1]),
            Err(LinxError::BufferTooShort { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = RelayFrame::Subscribe {
            scope: Scope::new("a").unwrap(),
        }
        .serialize()
        .unwrap();
        bytes.push(0);
        assert!(RelayFrame::parse(&bytes).is_err());
    }

    #[test]
    fn test_empty_scope_rejected_on_wire() {
        // header(Subscribe, body_len = 2) + zero-length scope
        let bytes = [crate::WIRE_VERSION, 0x01, 2, 0, 0, 0, 0, 0];
        assert!(matches!(
            RelayFrame::parse(&bytes),
            Err(LinxError::InvalidWireFormat(_))
        ));
    }

    #[test]
    fn test_oversized_chain_rejected() {
        let mut body = BytesMut::new();
        put_scope(&mut body, &Scope::new("s").unwrap());
        body.put_slice(key(1).as_bytes());
        body.put_u16_le((MAX_PARENT_CHAIN + 1) as u16);
        assert!(matches!(
            RelayFrame::parse_body(FrameKind::Announce, &body),
            Err(LinxError::InvalidWireFormat(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = RelayFrame::parse(&bytes);
        }

        #[test]
        fn prop_body_parse_never_panics(kind in 1u8..=6, body in proptest::collection::vec(any::<u8>(), 0..256)) {
            let kind = FrameKind::from_byte(kind).unwrap();
            let _ = RelayFrame::parse_body(kind, &body);
        }
    }
}
