//! Parley - Multi-client TCP Chat Service
//!
//! Arsitektur:
//! - Binary Protocol: header 13 byte (little-endian) + raw payload
//! - Framing: byte stream → message utuh, tahan partial/pipelined reads
//! - Session: satu thread receive + satu thread send per koneksi
//! - Registry: live map, broadcast, reaper untuk session yang selesai
//!
//! ```no_run
//! use parley::config::ServerConfig;
//! use parley::network::Server;
//!
//! let server = Server::bind(ServerConfig::default())?;
//! server.start()?;
//! // ...
//! server.stop();
//! # Ok::<(), parley::error::ChatError>(())
//! ```

pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod network;
pub mod protocol;

pub use config::{ClientConfig, ServerConfig};
pub use error::{ChatError, Result};
pub use network::{Client, ClientContext, Server};
pub use protocol::{Message, MessageType};
