//! Error taxonomy
//!
//! Semua error fatal per-connection (socket, short write, corrupt stream)
//! berakhir di jalur terminasi session yang sama; tidak ada yang menyeberang
//! ke session lain.

use std::io;

use thiserror::Error;

use crate::protocol::CodecError;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    /// A send that did not write the whole frame; treated like a socket failure.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("corrupt stream: {0}")]
    CorruptStream(CodecError),

    #[error("session {0} is not running")]
    SessionClosed(u32),

    #[error("already started")]
    AlreadyStarted,

    #[error("payload of {0} bytes is too large")]
    PayloadTooLarge(usize),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(io::Error),

    #[error("not connected")]
    NotConnected,

    #[error("shutting down")]
    ShuttingDown,

    #[error("session ids exhausted")]
    IdsExhausted,
}

pub type Result<T> = std::result::Result<T, ChatError>;
