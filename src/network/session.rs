//! Connection Session: satu socket, dua worker
//!
//! State machine: `Created → Running → Stopping → Stopped`.
//!
//! - Receive worker: blocking receive → `FrameBuffer` → drain penuh → hooks
//! - Send worker: tidur di `OutboundQueue`, tulis satu frame per message (FIFO)
//!
//! Worker mana pun yang melihat socket gagal menutup socket dan queue, jadi
//! worker lainnya ikut keluar. Owner diberi tahu tepat sekali lewat
//! `SessionHooks::on_finished`; `stop()` lalu join kedua worker.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::Socket;
use crate::core::{FrameBuffer, OutboundQueue, WorkerGauge};
use crate::error::{ChatError, Result};
use crate::protocol::{encode, Message, MAX_PAYLOAD_SIZE};

/// Callbacks from a session to whoever hosts it. Held as a `Weak`, never as an owner.
pub trait SessionHooks: Send + Sync {
    /// Called on the receive worker for every complete inbound message.
    fn on_message(&self, session: &Session, msg: Message);

    /// Called once, from whichever worker noticed the session ending.
    fn on_finished(&self, session_id: u32);
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl SessionState {
    #[inline(always)]
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

pub struct Session {
    id: u32,
    socket: Arc<dyn Socket>,
    state: AtomicU8,
    outbound: OutboundQueue,
    hooks: Weak<dyn SessionHooks>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    finished: AtomicBool,
    receive_chunk: usize,
}

impl Session {
    /// Membuat session baru (state `Created`, belum ada worker).
    pub fn new(
        id: u32,
        socket: Arc<dyn Socket>,
        hooks: Weak<dyn SessionHooks>,
        receive_chunk: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            socket,
            state: AtomicU8::new(SessionState::Created as u8),
            outbound: OutboundQueue::new(),
            hooks,
            workers: Mutex::new(Vec::with_capacity(2)),
            finished: AtomicBool::new(false),
            receive_chunk: receive_chunk.max(1),
        })
    }

    #[inline(always)]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub fn peer_label(&self) -> String {
        self.socket.peer_label()
    }

    /// `Created → Running`, spawn receive dan send worker.
    ///
    /// Fails with `SessionClosed` once `stop()` has run, even if it ran first.
    pub fn start(self: &Arc<Self>, gauge: &WorkerGauge) -> Result<()> {
        // Held across the transition and the spawns; `stop()` takes it too.
        let mut workers = self.workers.lock();
        if let Err(current) = self.state.compare_exchange(
            SessionState::Created as u8,
            SessionState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(match SessionState::from_u8(current) {
                SessionState::Running => ChatError::AlreadyStarted,
                _ => ChatError::SessionClosed(self.id),
            });
        }

        let session = Arc::clone(self);
        let spawned = gauge.spawn(format!("session-{}-recv", self.id), move || {
            session.receive_loop()
        });
        match spawned {
            Ok(handle) => workers.push(handle),
            Err(e) => {
                drop(workers);
                self.terminate();
                return Err(ChatError::Spawn(e));
            }
        }

        let session = Arc::clone(self);
        let spawned = gauge.spawn(format!("session-{}-send", self.id), move || {
            session.send_loop()
        });
        match spawned {
            Ok(handle) => workers.push(handle),
            Err(e) => {
                drop(workers);
                self.terminate();
                return Err(ChatError::Spawn(e));
            }
        }

        debug!(session = self.id, peer = %self.peer_label(), "session started");
        Ok(())
    }

    /// Enqueue message untuk dikirim. Tidak pernah block pada socket I/O.
    ///
    /// Allowed before `start`; those messages are written first.
    pub fn send(&self, msg: Message) -> Result<()> {
        if msg.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ChatError::PayloadTooLarge(msg.payload.len()));
        }
        if !matches!(self.state(), SessionState::Created | SessionState::Running) {
            return Err(ChatError::SessionClosed(self.id));
        }
        self.outbound
            .push(msg)
            .map_err(|_| ChatError::SessionClosed(self.id))
    }

    /// Wait until everything queued so far has been written, up to `timeout`.
    pub fn wait_flushed(&self, timeout: Duration) -> bool {
        self.outbound.wait_idle(timeout)
    }

    /// Stop session dan join kedua worker. Idempotent, aman dipanggil dari thread lain.
    ///
    /// Must not be called from this session's own hooks: it joins the worker running them.
    pub fn stop(&self) {
        let mut workers = self.workers.lock();
        for from in [SessionState::Created, SessionState::Running] {
            let _ = self.state.compare_exchange(
                from as u8,
                SessionState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        self.socket.close();
        self.outbound.close();

        for handle in workers.drain(..) {
            let name = handle.thread().name().unwrap_or("session-worker").to_string();
            if handle.join().is_err() {
                error!(session = self.id, worker = %name, "session worker panicked");
            }
        }
        self.state
            .store(SessionState::Stopped as u8, Ordering::Release);
    }

    /// Jalur terminasi bersama untuk semua error fatal per-connection.
    fn terminate(&self) {
        let _ = self.state.compare_exchange(
            SessionState::Running as u8,
            SessionState::Stopping as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.socket.close();
        self.outbound.close();

        if !self.finished.swap(true, Ordering::AcqRel) {
            if let Some(hooks) = self.hooks.upgrade() {
                hooks.on_finished(self.id);
            }
        }
    }

    fn deliver(&self, msg: Message) {
        match self.hooks.upgrade() {
            Some(hooks) => hooks.on_message(self, msg),
            None => debug!(session = self.id, "owner gone, dropping inbound message"),
        }
    }

    fn receive_loop(&self) {
        let mut scratch = vec![0u8; self.receive_chunk];
        let mut frames = FrameBuffer::new();

        let reason = 'recv: loop {
            if !self.is_running() {
                break "stopped";
            }

            let n = match self.socket.receive(&mut scratch) {
                Ok(0) => break "peer closed",
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    if self.is_running() {
                        warn!(session = self.id, error = %e, "receive failed");
                    }
                    break "receive error";
                }
            };

            frames.append(&scratch[..n]);
            loop {
                match frames.try_extract_next() {
                    Ok(Some(msg)) => self.deliver(msg),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(session = self.id, error = %e, "dropping connection");
                        break 'recv "corrupt stream";
                    }
                }
            }
        };

        info!(session = self.id, reason, "receive worker finished");
        self.terminate();
    }

    fn send_loop(&self) {
        while let Some(msg) = self.outbound.next() {
            let frame = match encode(&msg) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(session = self.id, error = %e, "skipping unencodable message");
                    self.outbound.complete();
                    continue;
                }
            };

            let result = self.write_frame(&frame);
            self.outbound.complete();
            if let Err(e) = result {
                if self.is_running() {
                    warn!(session = self.id, error = %e, "send failed");
                }
                break;
            }
        }

        let dropped = self.outbound.abandon();
        if dropped > 0 {
            debug!(session = self.id, dropped, "discarded unsent messages");
        }
        debug!(session = self.id, "send worker finished");
        self.terminate();
    }

    /// Satu blocking send; short write dianggap socket failure.
    fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let written = self.socket.send(frame)?;
        if written != frame.len() {
            return Err(ChatError::ShortWrite {
                written,
                expected: frame.len(),
            });
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.socket.close();
    }
}
