//! Outbound queue per session
//!
//! Unbounded FIFO dengan satu consumer (send worker) dan banyak producer
//! (broadcast dari session lain). Producer tidak pernah block pada socket I/O;
//! consumer tidur di condvar sampai ada item atau queue ditutup.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::protocol::Message;

struct QueueState {
    items: VecDeque<Message>,
    /// Pushed but not yet written (or abandoned).
    unfinished: usize,
    closed: bool,
}

pub struct OutboundQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
    idle: Condvar,
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                unfinished: 0,
                closed: false,
            }),
            ready: Condvar::new(),
            idle: Condvar::new(),
        }
    }

    /// Enqueue message dan bangunkan consumer.
    ///
    /// Returns the message back once the queue is closed.
    pub fn push(&self, msg: Message) -> Result<(), Message> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(msg);
        }
        state.items.push_back(msg);
        state.unfinished += 1;
        drop(state);
        self.ready.notify_one();
        Ok(())
    }

    /// Ambil message berikutnya, block sampai ada item atau queue ditutup.
    ///
    /// Items queued before `close` are still handed out; `None` means closed and empty.
    pub fn next(&self) -> Option<Message> {
        let mut state = self.state.lock();
        loop {
            if let Some(msg) = state.items.pop_front() {
                return Some(msg);
            }
            if state.closed {
                return None;
            }
            self.ready.wait(&mut state);
        }
    }

    /// Tandai satu message dari `next` sudah selesai ditulis.
    pub fn complete(&self) {
        let mut state = self.state.lock();
        state.unfinished = state.unfinished.saturating_sub(1);
        if state.unfinished == 0 {
            self.idle.notify_all();
        }
    }

    /// Tutup queue: push berikutnya ditolak, consumer dibangunkan.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.ready.notify_all();
    }

    /// Close and drop everything still queued. Returns how many messages were dropped.
    pub fn abandon(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let dropped = state.items.len();
        state.items.clear();
        state.unfinished = 0;
        drop(state);
        self.ready.notify_all();
        self.idle.notify_all();
        dropped
    }

    /// Tunggu sampai semua message ter-flush, maksimal `timeout`.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.unfinished > 0 {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return state.unfinished == 0;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let q = OutboundQueue::new();
        for i in 0..4 {
            q.push(Message::text(i, "x")).unwrap();
        }
        q.close();

        let order: Vec<u32> = std::iter::from_fn(|| q.next()).map(|m| m.sender_id).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_push_after_close_is_rejected() {
        let q = OutboundQueue::new();
        q.close();
        let rejected = q.push(Message::text(1, "late")).unwrap_err();
        assert_eq!(rejected.sender_id, 1);
        assert!(q.next().is_none());
    }

    #[test]
    fn test_consumer_wakes_on_push_and_close() {
        let q = Arc::new(OutboundQueue::new());
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(msg) = q.next() {
                    seen.push(msg.sender_id);
                    q.complete();
                }
                seen
            })
        };

        q.push(Message::text(10, "a")).unwrap();
        q.push(Message::text(11, "b")).unwrap();
        assert!(q.wait_idle(Duration::from_secs(5)));
        q.close();

        assert_eq!(consumer.join().unwrap(), vec![10, 11]);
    }

    #[test]
    fn test_wait_idle_times_out_without_consumer() {
        let q = OutboundQueue::new();
        q.push(Message::text(1, "stuck")).unwrap();
        assert!(!q.wait_idle(Duration::from_millis(20)));

        assert_eq!(q.abandon(), 1);
        assert!(q.wait_idle(Duration::from_millis(20)));
        assert!(q.push(Message::text(2, "after abandon")).is_err());
    }
}
