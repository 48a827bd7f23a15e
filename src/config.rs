//! Server dan client configuration

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Scratch buffer per receive call
pub const DEFAULT_RECEIVE_CHUNK: usize = 4096;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
    /// SO_SNDBUF / SO_RCVBUF for accepted sockets (unix only). `None` keeps the OS default.
    pub socket_buffer_size: Option<usize>,
    pub receive_chunk: usize,
    /// How long graceful shutdown waits for the ServerShutdown notice to flush.
    pub shutdown_linger: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            socket_buffer_size: None,
            receive_chunk: DEFAULT_RECEIVE_CHUNK,
            shutdown_linger: Duration::from_millis(200),
        }
    }
}

impl ServerConfig {
    /// Loopback server on an ephemeral port; used by tests and local tooling.
    pub fn loopback() -> Self {
        Self {
            bind_host: DEFAULT_HOST.to_string(),
            port: 0,
            ..Self::default()
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub socket_buffer_size: Option<usize>,
    pub receive_chunk: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            socket_buffer_size: None,
            receive_chunk: DEFAULT_RECEIVE_CHUNK,
        }
    }
}

impl ClientConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let server = ServerConfig::default();
        assert_eq!(server.addr(), "0.0.0.0:8080");
        assert_eq!(server.receive_chunk, 4096);

        let client = ClientConfig::default();
        assert_eq!(client.addr(), "127.0.0.1:8080");
        assert_eq!(ServerConfig::loopback().addr(), "127.0.0.1:0");
    }
}
