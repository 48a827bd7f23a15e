//! Message Format
//!
//! Layout (little-endian, tanpa padding):
//! ┌──────┬────────────┬───────────────┬──────────────┬─────────────────┐
//! │ type │ sender_id  │ recipient_id  │ payload_size │ payload ...     │
//! │ u8   │ u32        │ u32           │ u32          │ payload_size B  │
//! └──────┴────────────┴───────────────┴──────────────┴─────────────────┘
//!
//! Header 13 bytes, fixed. Tidak ada magic number, versi, atau checksum.

use std::borrow::Cow;

/// Tipe pesan dalam protokol chat
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Chat text dari client
    Text = 0,
    /// Client baru bergabung
    Joined = 1,
    /// Client keluar
    Left = 2,
    /// Server akan berhenti
    ServerShutdown = 3,
    FileTransferRequest = 4,
    FileTransferData = 5,
    FileTransferAck = 6,
    /// Error report dari server
    Error = 7,
}

impl MessageType {
    pub const ALL: [MessageType; 8] = [
        Self::Text,
        Self::Joined,
        Self::Left,
        Self::ServerShutdown,
        Self::FileTransferRequest,
        Self::FileTransferData,
        Self::FileTransferAck,
        Self::Error,
    ];

    #[inline(always)]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Text),
            1 => Some(Self::Joined),
            2 => Some(Self::Left),
            3 => Some(Self::ServerShutdown),
            4 => Some(Self::FileTransferRequest),
            5 => Some(Self::FileTransferData),
            6 => Some(Self::FileTransferAck),
            7 => Some(Self::Error),
            _ => None,
        }
    }

    /// File-transfer types are routed to the transfer extension point.
    #[inline]
    pub fn is_file_transfer(self) -> bool {
        matches!(
            self,
            Self::FileTransferRequest | Self::FileTransferData | Self::FileTransferAck
        )
    }
}

/// Size of the encoded header: type + sender + recipient + payload_size.
pub const HEADER_SIZE: usize = 1 + 4 + 4 + 4;

/// Upper bound for a single payload (1 MiB). Anything larger is treated as a corrupt stream.
pub const MAX_PAYLOAD_SIZE: usize = 1 << 20;

/// Id reserved for the server itself, and for "broadcast" as a recipient.
pub const SERVER_ID: u32 = 0;

/// Decoded fixed-size header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: MessageType,
    pub sender_id: u32,
    pub recipient_id: u32,
    pub payload_size: u32,
}

impl Header {
    /// Total message size (header + payload)
    #[inline(always)]
    pub fn total_size(&self) -> usize {
        HEADER_SIZE + self.payload_size as usize
    }
}

/// Complete message dengan header fields dan payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub sender_id: u32,
    pub recipient_id: u32,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(
        kind: MessageType,
        sender_id: u32,
        recipient_id: u32,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            kind,
            sender_id,
            recipient_id,
            payload: payload.into(),
        }
    }

    /// Chat text addressed to everyone.
    pub fn text(sender_id: u32, text: &str) -> Self {
        Self::new(MessageType::Text, sender_id, SERVER_ID, text)
    }

    /// Broadcast notice that `client_id` joined.
    pub fn joined(client_id: u32) -> Self {
        Self::new(
            MessageType::Joined,
            client_id,
            SERVER_ID,
            format!("Client {} joined.", client_id),
        )
    }

    /// Direct notice to a freshly accepted client carrying its assigned id.
    pub fn welcome(client_id: u32) -> Self {
        Self::new(
            MessageType::Joined,
            SERVER_ID,
            client_id,
            format!("Welcome, you are client {}", client_id),
        )
    }

    pub fn left(client_id: u32) -> Self {
        Self::new(
            MessageType::Left,
            client_id,
            SERVER_ID,
            format!("Client {} left.", client_id),
        )
    }

    pub fn server_shutdown(reason: &str) -> Self {
        Self::new(MessageType::ServerShutdown, SERVER_ID, SERVER_ID, reason)
    }

    /// Header yang sesuai dengan message ini.
    ///
    /// `payload_size` is truncated for payloads beyond `u32::MAX`; the codec rejects
    /// those long before that point.
    #[inline]
    pub fn header(&self) -> Header {
        Header {
            kind: self.kind,
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            payload_size: self.payload.len() as u32,
        }
    }

    /// Payload sebagai text (lossy UTF-8).
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    #[inline(always)]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(HEADER_SIZE, 13);
    }

    #[test]
    fn test_type_codes_roundtrip() {
        for (code, kind) in MessageType::ALL.iter().enumerate() {
            assert_eq!(*kind as u8, code as u8);
            assert_eq!(MessageType::from_u8(code as u8), Some(*kind));
        }
        assert_eq!(MessageType::from_u8(8), None);
        assert_eq!(MessageType::from_u8(0xFF), None);
    }

    #[test]
    fn test_notices() {
        let welcome = Message::welcome(4);
        assert_eq!(welcome.kind, MessageType::Joined);
        assert_eq!(welcome.sender_id, SERVER_ID);
        assert_eq!(welcome.recipient_id, 4);

        let joined = Message::joined(4);
        assert_eq!(joined.sender_id, 4);
        assert_eq!(joined.recipient_id, SERVER_ID);
        assert_eq!(joined.payload_str(), "Client 4 joined.");

        let msg = Message::text(7, "hi");
        assert_eq!(msg.header().payload_size, 2);
        assert_eq!(msg.encoded_len(), HEADER_SIZE + 2);
    }
}
