//! Fixed header for LINX relay frames
//!
//! Fixed header is 6 bytes:
//! - Byte 0: Wire version
//! - Byte 1: Frame kind
//! - Bytes 2-5: Body length (LE)

use linx_core::{LinxError, LinxResult};

/// Fixed header size in bytes
pub const HEADER_SIZE: usize = 6;

/// Current wire protocol version
pub const WIRE_VERSION: u8 = 1;

/// Maximum body size accepted on the wire
pub const MAX_FRAME_BODY: usize = 64 * 1024;

/// Frame kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// peer → relay: join a scope
    Subscribe = 0x01,
    /// peer → relay: leave a scope
    Unsubscribe = 0x02,
    /// peer → relay: solicit connections within a scope
    Announce = 0x03,
    /// relay → peers: fan-out of an announcement
    JoinRequest = 0x04,
    /// peer → relay: point-to-point envelope
    SendOffer = 0x05,
    /// relay → peer: delivered envelope
    Offer = 0x06,
}

impl FrameKind {
    pub fn from_byte(b: u8) -> LinxResult<Self> {
        match b {
            0x01 => Ok(FrameKind::Subscribe),
            0x02 => Ok(FrameKind::Unsubscribe),
            0x03 => Ok(FrameKind::Announce),
            0x04 => Ok(FrameKind::JoinRequest),
            0x05 => Ok(FrameKind::SendOffer),
            0x06 => Ok(FrameKind::Offer),
            _ => Err(LinxError::UnknownFrameKind(b)),
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Kinds a peer may send to the relay
    pub fn is_peer_to_relay(self) -> bool {
        matches!(
            self,
            FrameKind::Subscribe | FrameKind::Unsubscribe | FrameKind::Announce | FrameKind::SendOffer
        )
    }
}

/// Fixed header structure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub kind: FrameKind,
    pub body_len: u32,
}

impl FrameHeader {
    pub fn new(kind: FrameKind, body_len: usize) -> LinxResult<Self> {
        if body_len > MAX_FRAME_BODY {
            return Err(LinxError::FrameTooLarge {
                size: body_len,
                max: MAX_FRAME_BODY,
            });
        }
        Ok(FrameHeader {
            version: WIRE_VERSION,
            kind,
            body_len: body_len as u32,
        })
    }

    /// Parse header from bytes
    pub fn parse(buf: &[u8]) -> LinxResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(LinxError::BufferTooShort {
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let version = buf[0];
        if version != WIRE_VERSION {
            return Err(LinxError::UnsupportedVersion(version));
        }

        let kind = FrameKind::from_byte(buf[1])?;
        let body_len = u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]);

        if body_len as usize > MAX_FRAME_BODY {
            return Err(LinxError::FrameTooLarge {
                size: body_len as usize,
                max: MAX_FRAME_BODY,
            });
        }

        Ok(FrameHeader {
            version,
            kind,
            body_len,
        })
    }

    /// Serialize header into a 6-byte array
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let len = self.body_len.to_le_bytes();
        [self.version, self.kind.to_byte(), len[0], len[1], len[2], len[3]]
    }
}
