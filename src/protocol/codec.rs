//! Encoder/Decoder untuk wire format
//!
//! Pure functions, tidak ada I/O. Decoder tidak pernah mengkonsumsi bytes
//! yang belum bisa di-resolve menjadi message utuh.

use thiserror::Error;

use super::message::{Header, Message, MessageType, HEADER_SIZE, MAX_PAYLOAD_SIZE};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Not an error for the stream: wait for more bytes.
    #[error("incomplete message: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },

    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    #[error("payload of {0} bytes exceeds the {max} byte limit", max = MAX_PAYLOAD_SIZE)]
    PayloadTooLarge(usize),
}

impl CodecError {
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }
}

/// Encode message: header diikuti payload.
///
/// Output length is always `HEADER_SIZE + payload.len()`.
pub fn encode(msg: &Message) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(msg.encoded_len());
    encode_into(msg, &mut out)?;
    Ok(out)
}

/// Append the encoding of `msg` to `out`.
pub fn encode_into(msg: &Message, out: &mut Vec<u8>) -> Result<(), CodecError> {
    if msg.payload.len() > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(msg.payload.len()));
    }

    let header = msg.header();
    out.reserve(msg.encoded_len());
    out.push(header.kind as u8);
    out.extend_from_slice(&header.sender_id.to_le_bytes());
    out.extend_from_slice(&header.recipient_id.to_le_bytes());
    out.extend_from_slice(&header.payload_size.to_le_bytes());
    out.extend_from_slice(&msg.payload);
    Ok(())
}

#[inline(always)]
fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(raw)
}

/// Decode header dari awal buffer.
pub fn decode_header(buf: &[u8]) -> Result<Header, CodecError> {
    if buf.len() < HEADER_SIZE {
        return Err(CodecError::Incomplete {
            needed: HEADER_SIZE,
            available: buf.len(),
        });
    }

    let kind = MessageType::from_u8(buf[0]).ok_or(CodecError::UnknownMessageType(buf[0]))?;
    let payload_size = read_u32(buf, 9);
    if payload_size as usize > MAX_PAYLOAD_SIZE {
        return Err(CodecError::PayloadTooLarge(payload_size as usize));
    }

    Ok(Header {
        kind,
        sender_id: read_u32(buf, 1),
        recipient_id: read_u32(buf, 5),
        payload_size,
    })
}

/// Decode satu message utuh dan buang bytes-nya dari depan buffer.
///
/// On `Incomplete` or a malformed header the buffer is left untouched.
pub fn decode_message(buf: &mut Vec<u8>) -> Result<Message, CodecError> {
    let header = decode_header(buf)?;
    let total = header.total_size();
    if buf.len() < total {
        return Err(CodecError::Incomplete {
            needed: total,
            available: buf.len(),
        });
    }

    let payload = buf[HEADER_SIZE..total].to_vec();
    buf.drain(..total);

    Ok(Message {
        kind: header.kind,
        sender_id: header.sender_id,
        recipient_id: header.recipient_id,
        payload,
    })
}
