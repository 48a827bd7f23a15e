//! Dispatcher: routing message yang sudah utuh ke handler per tipe
//!
//! Handler table di-inject saat konstruksi (server: `Hub`, client:
//! `ClientContext`). Tipe tanpa handler di-log, tidak fatal.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::network::{ClientContext, Hub};
use crate::protocol::{Message, MessageType, SERVER_ID};

pub type Handler<C> = Box<dyn Fn(&C, Message) + Send + Sync>;

pub struct Dispatcher<C> {
    routes: HashMap<MessageType, Handler<C>>,
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Dispatcher<C> {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Register handler untuk satu tipe; handler lama diganti.
    pub fn on<F>(mut self, kind: MessageType, handler: F) -> Self
    where
        F: Fn(&C, Message) + Send + Sync + 'static,
    {
        self.routes.insert(kind, Box::new(handler));
        self
    }

    /// Same handler for several types.
    pub fn on_each<F>(mut self, kinds: &[MessageType], handler: F) -> Self
    where
        F: Fn(&C, Message) + Send + Sync + 'static,
        C: 'static,
    {
        let handler = Arc::new(handler);
        for kind in kinds {
            let handler = Arc::clone(&handler);
            self.routes
                .insert(*kind, Box::new(move |ctx: &C, msg: Message| (*handler)(ctx, msg)));
        }
        self
    }

    #[inline]
    pub fn handles(&self, kind: MessageType) -> bool {
        self.routes.contains_key(&kind)
    }

    /// Returns `false` when no handler matched.
    pub fn dispatch(&self, ctx: &C, msg: Message) -> bool {
        match self.routes.get(&msg.kind) {
            Some(handler) => {
                handler(ctx, msg);
                true
            }
            None => {
                warn!(
                    kind = ?msg.kind,
                    sender = msg.sender_id,
                    "unhandled message type"
                );
                false
            }
        }
    }
}

/// Server default: Text di-broadcast ke semua session kecuali pengirim.
pub fn broadcast_policy() -> Dispatcher<Hub> {
    Dispatcher::new().on(MessageType::Text, |hub: &Hub, msg: Message| {
        let from = msg.sender_id;
        let delivered = hub.broadcast(&msg, from);
        tracing::debug!(sender = from, delivered, "relayed text");
    })
}

/// Client default: render per tipe ke console.
pub fn render_policy() -> Dispatcher<ClientContext> {
    Dispatcher::new()
        .on(MessageType::Text, |ctx: &ClientContext, msg: Message| {
            let who = if msg.sender_id == SERVER_ID {
                "Server".to_string()
            } else {
                format!("User {}", msg.sender_id)
            };
            ctx.render(&format!("[{}]: {}", who, msg.payload_str()));
        })
        .on(MessageType::Joined, |ctx: &ClientContext, msg: Message| {
            if msg.sender_id == SERVER_ID && msg.recipient_id != SERVER_ID {
                ctx.set_client_id(msg.recipient_id);
            }
            ctx.render(&format!("[Notification]: {}", msg.payload_str()));
        })
        .on(MessageType::Left, |ctx: &ClientContext, msg: Message| {
            ctx.render(&format!("[Notification]: {}", msg.payload_str()));
        })
        .on(MessageType::ServerShutdown, |ctx: &ClientContext, msg: Message| {
            ctx.render(&format!("[Server]: {}. Disconnecting.", msg.payload_str()));
            ctx.shutdown().trigger();
        })
        .on(MessageType::Error, |ctx: &ClientContext, msg: Message| {
            ctx.render(&format!("[Error from Server]: {}", msg.payload_str()));
        })
        .on_each(&file_transfer_kinds(), |ctx: &ClientContext, msg: Message| {
            ctx.transfers().handle_message(&msg)
        })
}

fn file_transfer_kinds() -> Vec<MessageType> {
    MessageType::ALL
        .into_iter()
        .filter(|kind| kind.is_file_transfer())
        .collect()
}

/// Extension point for file transfer. No transfer protocol is defined here.
pub trait FileTransferHandler: Send + Sync {
    fn handle_message(&self, msg: &Message);

    fn request_transfer(&self, recipient_id: u32, resource_id: &str) -> Result<()>;
}

/// Stub handler: hanya log.
#[derive(Debug, Default)]
pub struct LoggingTransferHandler;

impl FileTransferHandler for LoggingTransferHandler {
    fn handle_message(&self, msg: &Message) {
        info!(
            kind = ?msg.kind,
            sender = msg.sender_id,
            bytes = msg.payload.len(),
            "file transfer message ignored (not implemented)"
        );
    }

    fn request_transfer(&self, recipient_id: u32, resource_id: &str) -> Result<()> {
        info!(
            recipient = recipient_id,
            resource = resource_id,
            "file transfer requested (not implemented)"
        );
        Ok(())
    }
}
