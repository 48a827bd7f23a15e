//! Framing Buffer: byte stream → message utuh
//!
//! Akumulator per-connection. Setiap `append` harus diikuti drain penuh
//! via `try_extract_next` sampai `None`, supaya beberapa message yang datang
//! dalam satu receive ter-extract semua sebelum receive berikutnya.

use crate::error::ChatError;
use crate::protocol::{decode_message, Message};

/// Initial capacity, sized for a handful of typical chat lines.
const INITIAL_CAPACITY: usize = 4 * 1024;

pub struct FrameBuffer {
    pending: Vec<u8>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            pending: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Tambah bytes hasil receive ke akhir buffer
    #[inline]
    pub fn append(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Coba extract satu message.
    ///
    /// - `Ok(Some(msg))`: satu message utuh, bytes-nya sudah dibuang
    /// - `Ok(None)`: tunggu bytes berikutnya
    /// - `Err(CorruptStream)`: header tidak valid, buffer dibuang; fatal untuk connection
    pub fn try_extract_next(&mut self) -> Result<Option<Message>, ChatError> {
        match decode_message(&mut self.pending) {
            Ok(msg) => Ok(Some(msg)),
            Err(e) if e.is_incomplete() => Ok(None),
            Err(e) => {
                self.pending.clear();
                Err(ChatError::CorruptStream(e))
            }
        }
    }

    /// Bytes yang belum menjadi message
    #[inline(always)]
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}
