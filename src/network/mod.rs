//! Network Layer: thread-per-direction connection handling
//!
//! - `socket`: capability traits + implementasi TCP (`std::net`)
//! - `session`: satu koneksi, receive worker + send worker
//! - `registry`: live sessions, broadcast, reaper
//! - `server` / `client`: owner di masing-masing sisi

mod client;
mod registry;
mod server;
mod session;
mod socket;

pub use client::{Client, ClientContext, ConsoleCommand};
pub use registry::{Hub, SessionRegistry};
pub use server::Server;
pub use session::{Session, SessionHooks, SessionState};
pub use socket::{Listener, Socket, TcpAcceptor, TcpSocket};
