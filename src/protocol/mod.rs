//! Protocol Layer: Length-Prefixed Binary Framing
//!
//! Prinsip desain:
//! - Fixed-size header dengan layout kanonik (little-endian)
//! - Payload raw bytes, panjang dideklarasikan di header
//! - Pure encode/decode, tanpa I/O

mod codec;
mod message;

pub use codec::{decode_header, decode_message, encode, encode_into, CodecError};
pub use message::{
    Header, Message, MessageType, HEADER_SIZE, MAX_PAYLOAD_SIZE, SERVER_ID,
};
