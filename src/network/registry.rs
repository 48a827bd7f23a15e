//! Session Registry (server)
//!
//! - `Hub`: state bersama (live map, pending-removal queue, dispatcher)
//! - `SessionRegistry`: owner dari `Hub` dan reaper thread
//!
//! Lock live map hanya dipegang untuk operasi map (snapshot, insert,
//! remove), tidak pernah selama socket I/O atau `Session::stop`.
//! Session yang berhenti sendiri hanya push id ke pending queue; reaper yang
//! melepas ownership setelah kedua worker-nya di-join.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use super::session::{Session, SessionHooks};
use super::Socket;
use crate::core::WorkerGauge;
use crate::dispatch::Dispatcher;
use crate::error::{ChatError, Result};
use crate::protocol::{Message, SERVER_ID};

struct PendingRemovals {
    ids: VecDeque<u32>,
    shutting_down: bool,
}

/// Shared registry state. Dispatcher handlers receive a `&Hub`.
pub struct Hub {
    sessions: Mutex<HashMap<u32, Arc<Session>>>,
    next_id: AtomicU32,
    pending: Mutex<PendingRemovals>,
    pending_signal: Condvar,
    dispatcher: Dispatcher<Hub>,
    gauge: WorkerGauge,
    receive_chunk: usize,
}

impl Hub {
    fn snapshot(&self, exclude_id: u32) -> Vec<Arc<Session>> {
        self.sessions
            .lock()
            .values()
            .filter(|s| s.is_running() && (exclude_id == SERVER_ID || s.id() != exclude_id))
            .cloned()
            .collect()
    }

    /// Enqueue `msg` ke semua session yang running kecuali `exclude_id`
    /// (`0` tidak meng-exclude siapa pun). Returns jumlah session yang menerima.
    pub fn broadcast(&self, msg: &Message, exclude_id: u32) -> usize {
        let mut delivered = 0;
        for session in self.snapshot(exclude_id) {
            match session.send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => debug!(session = session.id(), error = %e, "broadcast skipped session"),
            }
        }
        delivered
    }

    /// Session melaporkan dirinya selesai. Tidak menghapus secara sinkron.
    pub fn mark_finished(&self, session_id: u32) {
        let mut pending = self.pending.lock();
        if pending.shutting_down {
            debug!(session = session_id, "registry shutting down, ignoring finish");
            return;
        }
        pending.ids.push_back(session_id);
        drop(pending);
        self.pending_signal.notify_one();
    }

    pub fn live_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Sorted ids of every session still in the live map.
    pub fn live_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.sessions.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn reaper_loop(&self) {
        debug!("reaper started");
        loop {
            let next = {
                let mut pending = self.pending.lock();
                loop {
                    if let Some(id) = pending.ids.pop_front() {
                        break Some(id);
                    }
                    if pending.shutting_down {
                        break None;
                    }
                    self.pending_signal.wait(&mut pending);
                }
            };

            match next {
                Some(id) => self.reap(id),
                None => break,
            }
        }
        debug!("reaper finished");
    }

    fn reap(&self, session_id: u32) {
        let removed = self.sessions.lock().remove(&session_id);
        let Some(session) = removed else {
            debug!(session = session_id, "session not found for removal, already removed");
            return;
        };

        // Join both workers before the last owning reference goes away.
        session.stop();
        info!(session = session_id, peer = %session.peer_label(), "client removed");
        drop(session);

        self.broadcast(&Message::left(session_id), SERVER_ID);
    }
}

impl SessionHooks for Hub {
    fn on_message(&self, session: &Session, mut msg: Message) {
        // Clients cannot speak for anyone else.
        msg.sender_id = session.id();
        debug!(
            session = session.id(),
            kind = ?msg.kind,
            bytes = msg.payload.len(),
            "message received"
        );
        self.dispatcher.dispatch(self, msg);
    }

    fn on_finished(&self, session_id: u32) {
        self.mark_finished(session_id);
    }
}

pub struct SessionRegistry {
    hub: Arc<Hub>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl SessionRegistry {
    /// Membuat registry dan menjalankan reaper thread.
    pub fn new(
        dispatcher: Dispatcher<Hub>,
        gauge: WorkerGauge,
        receive_chunk: usize,
    ) -> Result<Self> {
        let hub = Arc::new(Hub {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            pending: Mutex::new(PendingRemovals {
                ids: VecDeque::new(),
                shutting_down: false,
            }),
            pending_signal: Condvar::new(),
            dispatcher,
            gauge,
            receive_chunk,
        });

        let reaper_hub = Arc::clone(&hub);
        let reaper = hub
            .gauge
            .spawn("reaper".to_string(), move || reaper_hub.reaper_loop())
            .map_err(ChatError::Spawn)?;

        Ok(Self {
            hub,
            reaper: Mutex::new(Some(reaper)),
        })
    }

    /// Assign id baru, simpan ownership, start session, lalu umumkan.
    pub fn register(&self, socket: Arc<dyn Socket>) -> Result<u32> {
        // Lock order: pending, then sessions. `stop()` cannot miss this insert.
        let session = {
            let pending = self.hub.pending.lock();
            if pending.shutting_down {
                socket.close();
                return Err(ChatError::ShuttingDown);
            }

            // Never wraps: 0 is the server and ids are not reused.
            let id = self
                .hub
                .next_id
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
                .map_err(|_| {
                    socket.close();
                    ChatError::IdsExhausted
                })?;
            let hooks: Arc<dyn SessionHooks> = self.hub.clone();
            let session = Session::new(id, socket, Arc::downgrade(&hooks), self.hub.receive_chunk);

            // Insert before start: a session that dies immediately must find itself in the map.
            self.hub.sessions.lock().insert(id, Arc::clone(&session));
            session
        };
        let id = session.id();

        // Queued while still `Created`: broadcasts only reach running sessions,
        // so the welcome is always the first frame this client sees.
        if let Err(e) = session.send(Message::welcome(id)) {
            debug!(session = id, error = %e, "welcome not queued");
        }

        if let Err(e) = session.start(&self.hub.gauge) {
            self.hub.sessions.lock().remove(&id);
            session.stop();
            return Err(e);
        }

        self.hub.broadcast(&Message::joined(id), id);
        Ok(id)
    }

    #[inline]
    pub fn broadcast(&self, msg: &Message, exclude_id: u32) -> usize {
        self.hub.broadcast(msg, exclude_id)
    }

    #[inline]
    pub fn mark_finished(&self, session_id: u32) {
        self.hub.mark_finished(session_id)
    }

    pub fn live_count(&self) -> usize {
        self.hub.live_count()
    }

    pub fn live_ids(&self) -> Vec<u32> {
        self.hub.live_ids()
    }

    /// Broadcast `notice`, beri waktu sampai `linger` untuk flush, lalu `stop()`.
    pub fn shutdown_with_notice(&self, notice: Message, linger: Duration) {
        let notified = self.hub.broadcast(&notice, SERVER_ID);
        if notified > 0 {
            let deadline = Instant::now() + linger;
            for session in self.hub.snapshot(SERVER_ID) {
                let left = deadline.saturating_duration_since(Instant::now());
                if !session.wait_flushed(left) {
                    debug!(session = session.id(), "shutdown notice not flushed in time");
                }
            }
        }
        self.stop();
    }

    /// Stop reaper, stop semua session yang tersisa, kosongkan map. Idempotent.
    pub fn stop(&self) {
        {
            let mut pending = self.hub.pending.lock();
            pending.shutting_down = true;
        }
        self.hub.pending_signal.notify_all();

        if let Some(handle) = self.reaper.lock().take() {
            if handle.join().is_err() {
                error!("reaper thread panicked");
            }
        }

        let remaining: Vec<Arc<Session>> = self
            .hub
            .sessions
            .lock()
            .drain()
            .map(|(_, session)| session)
            .collect();
        let count = remaining.len();
        for session in remaining {
            session.stop();
        }
        self.hub.pending.lock().ids.clear();

        if count > 0 {
            info!(sessions = count, "registry stopped");
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.stop();
    }
}
