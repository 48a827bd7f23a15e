//! Chat Client
//!
//! Satu `Session` (id 0) di atas koneksi ke server. Pesan masuk di-render
//! lewat `Dispatcher<ClientContext>`; putusnya koneksi dan `ServerShutdown`
//! sama-sama men-trigger `Shutdown` handle milik client.

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::session::{Session, SessionHooks};
use super::{Socket, TcpSocket};
use crate::config::ClientConfig;
use crate::core::{Shutdown, WorkerGauge};
use crate::dispatch::{Dispatcher, FileTransferHandler};
use crate::error::{ChatError, Result};
use crate::protocol::{Message, SERVER_ID};

/// State yang dilihat handler render di sisi client.
pub struct ClientContext {
    shutdown: Shutdown,
    client_id: AtomicU32,
    transfers: Arc<dyn FileTransferHandler>,
    console: Mutex<Box<dyn Write + Send>>,
}

impl ClientContext {
    pub fn new(
        shutdown: Shutdown,
        transfers: Arc<dyn FileTransferHandler>,
        console: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            shutdown,
            client_id: AtomicU32::new(SERVER_ID),
            transfers,
            console: Mutex::new(console),
        }
    }

    /// Tulis satu baris ke console.
    pub fn render(&self, line: &str) {
        let mut console = self.console.lock();
        if let Err(e) = writeln!(console, "{}", line).and_then(|_| console.flush()) {
            debug!(error = %e, "console write failed");
        }
    }

    /// Id assigned by the server's welcome message; `0` until then.
    pub fn client_id(&self) -> u32 {
        self.client_id.load(Ordering::Acquire)
    }

    pub fn set_client_id(&self, id: u32) {
        self.client_id.store(id, Ordering::Release);
    }

    #[inline]
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    #[inline]
    pub fn transfers(&self) -> &Arc<dyn FileTransferHandler> {
        &self.transfers
    }
}

struct ClientHooks {
    context: ClientContext,
    dispatcher: Dispatcher<ClientContext>,
}

impl SessionHooks for ClientHooks {
    fn on_message(&self, _session: &Session, msg: Message) {
        self.dispatcher.dispatch(&self.context, msg);
    }

    fn on_finished(&self, _session_id: u32) {
        if self.context.shutdown.trigger() {
            info!("connection to server closed");
        }
    }
}

/// One line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Quit,
    Transfer { recipient_id: u32, resource_id: String },
    Text(String),
    Empty,
    Invalid(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Self::Empty;
        }

        let trimmed = line.trim();
        if trimmed == "/quit" {
            return Self::Quit;
        }

        if let Some(rest) = trimmed.strip_prefix("/file") {
            if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
                return Self::Text(line.to_string());
            }
            let mut parts = rest.split_whitespace();
            let recipient = parts.next().and_then(|s| s.parse::<u32>().ok());
            let resource = parts.collect::<Vec<_>>().join(" ");
            return match recipient {
                Some(recipient_id) if !resource.is_empty() => Self::Transfer {
                    recipient_id,
                    resource_id: resource,
                },
                _ => Self::Invalid("usage: /file <recipient_id> <resource>".to_string()),
            };
        }

        Self::Text(line.to_string())
    }
}

pub struct Client {
    session: Arc<Session>,
    hooks: Arc<ClientHooks>,
    gauge: WorkerGauge,
}

impl Client {
    /// Connect ke server dan start kedua worker.
    pub fn connect(
        config: &ClientConfig,
        context: ClientContext,
        dispatcher: Dispatcher<ClientContext>,
    ) -> Result<Self> {
        let socket = TcpSocket::connect(&config.addr(), config.socket_buffer_size)?;
        info!(addr = %config.addr(), "connected to server");
        Self::with_socket(Arc::new(socket), context, dispatcher, config.receive_chunk)
    }

    pub fn with_socket(
        socket: Arc<dyn Socket>,
        context: ClientContext,
        dispatcher: Dispatcher<ClientContext>,
        receive_chunk: usize,
    ) -> Result<Self> {
        let hooks = Arc::new(ClientHooks {
            context,
            dispatcher,
        });
        let weak: Arc<dyn SessionHooks> = hooks.clone();
        let session = Session::new(SERVER_ID, socket, Arc::downgrade(&weak), receive_chunk);

        let gauge = WorkerGauge::new();
        session.start(&gauge)?;
        Ok(Self {
            session,
            hooks,
            gauge,
        })
    }

    #[inline]
    pub fn context(&self) -> &ClientContext {
        &self.hooks.context
    }

    pub fn client_id(&self) -> u32 {
        self.hooks.context.client_id()
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.hooks.context.shutdown.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_running() && !self.hooks.context.shutdown.is_triggered()
    }

    pub fn send(&self, msg: Message) -> Result<()> {
        if !self.is_connected() {
            return Err(ChatError::NotConnected);
        }
        self.session.send(msg)
    }

    pub fn send_text(&self, text: &str) -> Result<()> {
        self.send(Message::text(self.client_id(), text))
    }

    pub fn request_transfer(&self, recipient_id: u32, resource_id: &str) -> Result<()> {
        self.hooks
            .context
            .transfers
            .request_transfer(recipient_id, resource_id)
    }

    pub fn active_workers(&self) -> usize {
        self.gauge.live()
    }

    /// Baca command dari `input` sampai `/quit`, EOF, atau koneksi putus.
    pub fn run_console<R: BufRead>(&self, input: R) -> Result<()> {
        let shutdown = self.shutdown_handle();
        for line in input.lines() {
            if shutdown.is_triggered() {
                break;
            }
            let line = line?;
            match ConsoleCommand::parse(&line) {
                ConsoleCommand::Quit => break,
                ConsoleCommand::Empty => {}
                ConsoleCommand::Text(text) => {
                    if let Err(e) = self.send_text(&text) {
                        warn!(error = %e, "message not sent");
                        break;
                    }
                }
                ConsoleCommand::Transfer {
                    recipient_id,
                    resource_id,
                } => {
                    if let Err(e) = self.request_transfer(recipient_id, &resource_id) {
                        self.context().render(&format!("[Error]: {}", e));
                    }
                }
                ConsoleCommand::Invalid(usage) => self.context().render(&usage),
            }
        }
        shutdown.trigger();
        Ok(())
    }

    /// Idempotent. Returns after both workers have been joined.
    pub fn disconnect(&self) {
        self.session.stop();
        self.hooks.context.shutdown.trigger();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}
