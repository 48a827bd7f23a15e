//! Chat Server
//!
//! Acceptor thread: blocking accept → `SessionRegistry::register`.
//! `stop()` menutup listener, join acceptor, lalu mematikan registry
//! (notice `ServerShutdown`, linger, stop semua session).

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::registry::SessionRegistry;
use super::{Listener, TcpAcceptor};
use crate::config::ServerConfig;
use crate::core::WorkerGauge;
use crate::dispatch::{broadcast_policy, Dispatcher};
use crate::error::{ChatError, Result};
use crate::network::Hub;
use crate::protocol::Message;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);
const SHUTDOWN_NOTICE: &str = "Server shutting down";

pub struct Server {
    config: ServerConfig,
    listener: Arc<dyn Listener>,
    registry: Arc<SessionRegistry>,
    gauge: WorkerGauge,
    running: Arc<AtomicBool>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Bind TCP listener dengan dispatcher default (broadcast Text).
    pub fn bind(config: ServerConfig) -> Result<Self> {
        Self::with_dispatcher(config, broadcast_policy())
    }

    pub fn with_dispatcher(config: ServerConfig, dispatcher: Dispatcher<Hub>) -> Result<Self> {
        let listener = TcpAcceptor::bind(&config.addr(), config.socket_buffer_size)?;
        Self::with_listener(config, Arc::new(listener), dispatcher)
    }

    /// Server di atas listener apa pun (dipakai test dengan socket in-memory).
    pub fn with_listener(
        config: ServerConfig,
        listener: Arc<dyn Listener>,
        dispatcher: Dispatcher<Hub>,
    ) -> Result<Self> {
        let gauge = WorkerGauge::new();
        let registry = SessionRegistry::new(dispatcher, gauge.clone(), config.receive_chunk)?;
        Ok(Self {
            config,
            listener,
            registry: Arc::new(registry),
            gauge,
            running: Arc::new(AtomicBool::new(false)),
            acceptor: Mutex::new(None),
        })
    }

    /// Spawn acceptor thread.
    pub fn start(&self) -> Result<()> {
        let mut acceptor = self.acceptor.lock();
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(ChatError::AlreadyStarted);
        }

        let listener = Arc::clone(&self.listener);
        let registry = Arc::clone(&self.registry);
        let running = Arc::clone(&self.running);
        let handle = self
            .gauge
            .spawn("acceptor".to_string(), move || {
                accept_loop(listener.as_ref(), &registry, &running)
            })
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                ChatError::Spawn(e)
            })?;
        *acceptor = Some(handle);

        match self.listener.local_addr() {
            Ok(addr) => info!(%addr, "server listening"),
            Err(e) => debug!(error = %e, "local address unavailable"),
        }
        Ok(())
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Threads still alive: acceptor, reaper, session workers.
    pub fn active_workers(&self) -> usize {
        self.gauge.live()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Idempotent. Returns after every worker has been joined.
    pub fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        self.listener.close();

        if let Some(handle) = self.acceptor.lock().take() {
            if handle.join().is_err() {
                error!("acceptor thread panicked");
            }
        }

        self.registry.shutdown_with_notice(
            Message::server_shutdown(SHUTDOWN_NOTICE),
            self.config.shutdown_linger,
        );

        if was_running {
            info!(workers = self.gauge.live(), "server stopped");
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: &dyn Listener, registry: &SessionRegistry, running: &AtomicBool) {
    debug!("acceptor started");
    while running.load(Ordering::Acquire) {
        let socket = match listener.accept() {
            Ok(socket) => socket,
            Err(e) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                warn!(error = %e, "accept failed");
                thread::sleep(ACCEPT_BACKOFF);
                continue;
            }
        };

        if !running.load(Ordering::Acquire) {
            socket.close();
            break;
        }

        let peer = socket.peer_label();
        match registry.register(socket) {
            Ok(id) => info!(session = id, %peer, "client connected"),
            Err(ChatError::ShuttingDown) => break,
            Err(e) => warn!(%peer, error = %e, "failed to register client"),
        }
    }
    debug!("acceptor finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::session::tests::{wait_until, ScriptedSocket};
    use crate::network::Socket;
    use crate::protocol::MessageType;
    use parking_lot::Condvar;
    use std::collections::VecDeque;

    /// Hands out queued sockets; blocks otherwise until closed.
    #[derive(Default)]
    struct ScriptedListener {
        queue: Mutex<(VecDeque<Arc<ScriptedSocket>>, bool)>,
        ready: Condvar,
    }

    impl ScriptedListener {
        fn offer(&self, socket: Arc<ScriptedSocket>) {
            self.queue.lock().0.push_back(socket);
            self.ready.notify_all();
        }
    }

    impl Listener for ScriptedListener {
        fn accept(&self) -> io::Result<Arc<dyn Socket>> {
            let mut queue = self.queue.lock();
            loop {
                if queue.1 {
                    return Err(io::Error::new(io::ErrorKind::NotConnected, "closed"));
                }
                if let Some(socket) = queue.0.pop_front() {
                    return Ok(socket);
                }
                self.ready.wait(&mut queue);
            }
        }

        fn close(&self) {
            self.queue.lock().1 = true;
            self.ready.notify_all();
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
        }
    }

    fn server() -> (Server, Arc<ScriptedListener>) {
        let listener = Arc::new(ScriptedListener::default());
        let server = Server::with_listener(
            ServerConfig::loopback(),
            listener.clone(),
            broadcast_policy(),
        )
        .unwrap();
        (server, listener)
    }

    #[test]
    fn test_accepts_and_registers() {
        let (server, listener) = server();
        server.start().unwrap();
        assert!(matches!(server.start(), Err(ChatError::AlreadyStarted)));

        listener.offer(ScriptedSocket::new());
        listener.offer(ScriptedSocket::new());

        assert!(wait_until(Duration::from_secs(5), || server.registry().live_count() == 2));
        assert_eq!(server.registry().live_ids(), vec![1, 2]);
        server.stop();
    }

    #[test]
    fn test_stop_notifies_and_joins_everything() {
        let (server, listener) = server();
        server.start().unwrap();

        let socket = ScriptedSocket::new();
        listener.offer(socket.clone());
        assert!(wait_until(Duration::from_secs(5), || server.registry().live_count() == 1));

        server.stop();
        server.stop();

        assert!(!server.is_running());
        assert_eq!(server.active_workers(), 0);
        assert_eq!(server.registry().live_count(), 0);
        assert!(socket
            .written_messages()
            .iter()
            .any(|m| m.kind == MessageType::ServerShutdown));
    }

    #[test]
    fn test_stop_without_start() {
        let (server, _listener) = server();
        server.stop();
        assert_eq!(server.active_workers(), 0);
    }
}
