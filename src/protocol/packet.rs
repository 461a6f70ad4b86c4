use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Largest packet body; a longer message continues in follow-up packets.
pub const MAX_PACKET_BODY: usize = 0xFF_FFFF;

/// MySQL packet header (zero-copy)
///
/// Layout matches the wire protocol:
/// - length: 3 bytes (little-endian, body length)
/// - sequence_id: 1 byte
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PacketHeader {
    length: [u8; 3],
    pub sequence_id: u8,
}

impl PacketHeader {
    pub fn encode(body_length: usize, sequence_id: u8) -> Self {
        debug_assert!(body_length <= MAX_PACKET_BODY);
        let bytes = (body_length as u32).to_le_bytes();
        Self {
            length: [bytes[0], bytes[1], bytes[2]],
            sequence_id,
        }
    }

    /// Get body length as usize
    pub fn length(&self) -> usize {
        u32::from_le_bytes([self.length[0], self.length[1], self.length[2], 0]) as usize
    }
}

/// Fragment `body` into packets and append the framed bytes to `frame_buf`.
///
/// Each fragment carries at most [`MAX_PACKET_BODY`] bytes and the next
/// sequence number. When `body.len()` is a multiple of the fragment size
/// (including an empty body) a trailing empty packet terminates the message.
pub fn build_frames(frame_buf: &mut Vec<u8>, body: &[u8], sequence_id: &mut u8) {
    let num_fragments = body.len() / MAX_PACKET_BODY + 1;
    frame_buf.reserve(num_fragments * 4 + body.len());

    let mut remaining = body;
    loop {
        let chunk_size = remaining.len().min(MAX_PACKET_BODY);
        let (chunk, rest) = remaining.split_at(chunk_size);
        remaining = rest;

        let header = PacketHeader::encode(chunk_size, *sequence_id);
        frame_buf.extend_from_slice(header.as_bytes());
        frame_buf.extend_from_slice(chunk);
        *sequence_id = sequence_id.wrapping_add(1);

        // a short fragment (possibly empty) terminates the message
        if chunk_size < MAX_PACKET_BODY {
            break;
        }
    }
}

/// The body of an OK packet (tag 0x00, or 0xFE when it replaces EOF under
/// `CLIENT_DEPRECATE_EOF`), still unparsed.
#[derive(Debug, Clone, Copy)]
pub struct OkPayloadBytes<'a>(pub(crate) &'a [u8]);

impl<'a> OkPayloadBytes<'a> {
    pub fn try_from_payload(payload: &'a [u8]) -> Option<Self> {
        match payload.first() {
            Some(0x00) | Some(0xFE) => Some(Self(payload)),
            _ => None,
        }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.0
    }
}

/// The body of an ERR packet (tag 0xFF), still unparsed.
#[derive(Debug, Clone, Copy)]
pub struct ErrPayloadBytes<'a>(pub(crate) &'a [u8]);

impl<'a> ErrPayloadBytes<'a> {
    pub fn try_from_payload(payload: &'a [u8]) -> Option<Self> {
        match payload.first() {
            Some(0xFF) => Some(Self(payload)),
            _ => None,
        }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.0
    }
}

/// Whether this packet terminates a resultset.
///
/// With `CLIENT_DEPRECATE_EOF` the terminator is an OK packet tagged 0xFE;
/// without it, an EOF packet (0xFE, body shorter than 9 bytes).
pub fn is_resultset_terminator(payload: &[u8], deprecate_eof: bool) -> bool {
    match payload.first() {
        Some(0xFE) if deprecate_eof => payload.len() < MAX_PACKET_BODY,
        Some(0xFE) => payload.len() < 9,
        _ => false,
    }
}
