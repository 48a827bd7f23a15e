//! Live Session Test - server + client di atas loopback TCP
//!
//! Usage:
//!   cargo test --test live_session_test -- --nocapture

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use parley::config::{ClientConfig, ServerConfig};
use parley::core::{FrameBuffer, Shutdown};
use parley::dispatch::{render_policy, LoggingTransferHandler};
use parley::network::{Client, ClientContext, Server};
use parley::protocol::{encode, Message, MessageType, HEADER_SIZE};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Raw protocol peer, no library session underneath.
struct Peer {
    stream: TcpStream,
    frames: FrameBuffer,
}

impl Peer {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(TIMEOUT)).unwrap();
        Self {
            stream,
            frames: FrameBuffer::new(),
        }
    }

    /// Connect and consume the welcome; returns the assigned id.
    fn join(addr: SocketAddr) -> (Self, u32) {
        let mut peer = Self::connect(addr);
        let welcome = peer.next_of(MessageType::Joined).expect("welcome");
        assert_eq!(welcome.sender_id, 0);
        (peer, welcome.recipient_id)
    }

    fn send(&mut self, msg: &Message) {
        self.stream.write_all(&encode(msg).unwrap()).unwrap();
    }

    /// `None` on EOF, timeout or a corrupt stream.
    fn next(&mut self) -> Option<Message> {
        let mut chunk = [0u8; 512];
        loop {
            match self.frames.try_extract_next() {
                Ok(Some(msg)) => return Some(msg),
                Ok(None) => {}
                Err(_) => return None,
            }
            match self.stream.read(&mut chunk) {
                Ok(0) => return None,
                Ok(n) => self.frames.append(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(_) => return None,
            }
        }
    }

    fn next_of(&mut self, kind: MessageType) -> Option<Message> {
        while let Some(msg) = self.next() {
            if msg.kind == kind {
                return Some(msg);
            }
        }
        None
    }
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn start_server() -> (Server, SocketAddr) {
    let server = Server::bind(ServerConfig::loopback()).unwrap();
    server.start().unwrap();
    let addr = server.local_addr().unwrap();
    (server, addr)
}

fn connect_client(addr: SocketAddr) -> (Client, SharedBuf) {
    let out = SharedBuf::default();
    let context = ClientContext::new(
        Shutdown::new(),
        Arc::new(LoggingTransferHandler),
        Box::new(out.clone()),
    );
    let config = ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..ClientConfig::default()
    };
    let client = Client::connect(&config, context, render_policy()).unwrap();
    (client, out)
}

#[test]
fn test_broadcast_excludes_sender() {
    let (server, addr) = start_server();
    let (mut a, a_id) = Peer::join(addr);
    let (mut b, b_id) = Peer::join(addr);
    let (mut c, _) = Peer::join(addr);
    assert!(wait_until(|| server.registry().live_count() == 3));

    a.send(&Message::text(a_id, "from a"));
    let got_b = b.next_of(MessageType::Text).unwrap();
    let got_c = c.next_of(MessageType::Text).unwrap();
    assert_eq!((got_b.sender_id, got_b.payload.as_slice()), (a_id, &b"from a"[..]));
    assert_eq!((got_c.sender_id, got_c.payload.as_slice()), (a_id, &b"from a"[..]));

    // A never sees its own line, so its first Text is B's.
    b.send(&Message::text(b_id, "from b"));
    let got_a = a.next_of(MessageType::Text).unwrap();
    assert_eq!(got_a.sender_id, b_id);
    assert_eq!(got_a.payload, b"from b");

    server.stop();
}

#[test]
fn test_relay_between_sessions_seven_and_nine() {
    let (server, addr) = start_server();

    let mut peers = Vec::new();
    for expected in 1..=9u32 {
        let (peer, id) = Peer::join(addr);
        assert_eq!(id, expected);
        peers.push(peer);
    }

    peers[6].send(&Message::text(7, "hi"));
    let got = peers[8].next_of(MessageType::Text).unwrap();
    assert_eq!(got.kind, MessageType::Text);
    assert_eq!(got.sender_id, 7);
    assert_eq!(got.payload, b"hi");

    server.stop();
}

#[test]
fn test_spoofed_sender_is_rewritten() {
    let (server, addr) = start_server();
    let (mut a, a_id) = Peer::join(addr);
    let (mut b, _) = Peer::join(addr);

    a.send(&Message::text(4242, "not me"));
    let got = b.next_of(MessageType::Text).unwrap();
    assert_eq!(got.sender_id, a_id);

    server.stop();
}

#[test]
fn test_ids_unique_across_connect_cycles() {
    let (server, addr) = start_server();

    let mut seen = Vec::new();
    for _ in 0..10 {
        let (peer, id) = Peer::join(addr);
        assert!(!seen.contains(&id), "id {} reused", id);
        seen.push(id);
        drop(peer);
    }
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert!(wait_until(|| server.registry().live_count() == 0));

    server.stop();
}

#[test]
fn test_join_and_leave_notices() {
    let (server, addr) = start_server();
    let (mut a, _) = Peer::join(addr);
    let (b, b_id) = Peer::join(addr);

    let joined = a.next_of(MessageType::Joined).unwrap();
    assert_eq!(joined.sender_id, b_id);
    assert_eq!(joined.payload_str(), format!("Client {} joined.", b_id));

    drop(b);
    let left = a.next_of(MessageType::Left).unwrap();
    assert_eq!(left.sender_id, b_id);
    assert!(wait_until(|| server.registry().live_count() == 1));

    server.stop();
}

#[test]
fn test_corrupt_stream_only_drops_offender() {
    let (server, addr) = start_server();
    let (mut bad, bad_id) = Peer::join(addr);
    let (mut b, b_id) = Peer::join(addr);
    let (mut c, _) = Peer::join(addr);

    let mut garbage = vec![200u8];
    garbage.extend_from_slice(&[0u8; HEADER_SIZE - 1]);
    bad.stream.write_all(&garbage).unwrap();

    // Offender is cut off, the others are told and keep talking.
    while bad.next().is_some() {}
    let left = b.next_of(MessageType::Left).unwrap();
    assert_eq!(left.sender_id, bad_id);
    assert!(wait_until(|| server.registry().live_count() == 2));

    b.send(&Message::text(b_id, "still here"));
    let got = c.next_of(MessageType::Text).unwrap();
    assert_eq!(got.payload, b"still here");

    server.stop();
}

#[test]
fn test_stop_joins_every_worker() {
    let (server, addr) = start_server();
    let mut peers: Vec<Peer> = (0..4).map(|_| Peer::join(addr).0).collect();
    assert!(wait_until(|| server.registry().live_count() == 4));
    assert_eq!(server.active_workers(), 2 + 4 * 2);

    server.stop();

    assert_eq!(server.active_workers(), 0);
    assert_eq!(server.registry().live_count(), 0);
    for peer in &mut peers {
        let notice = peer.next_of(MessageType::ServerShutdown).unwrap();
        assert_eq!(notice.payload_str(), "Server shutting down");
        assert!(peer.next().is_none());
    }
}

#[test]
fn test_clients_chat_and_learn_ids() {
    let (server, addr) = start_server();
    let (alice, _) = connect_client(addr);
    assert!(wait_until(|| alice.client_id() != 0));
    let (bob, bob_out) = connect_client(addr);
    assert!(wait_until(|| bob.client_id() != 0));
    assert_ne!(alice.client_id(), bob.client_id());

    alice.send_text("hello bob").unwrap();
    let expected = format!("[User {}]: hello bob", alice.client_id());
    assert!(wait_until(|| bob_out.text().contains(&expected)));
    assert!(bob_out.text().contains("[Notification]: Welcome, you are client"));

    alice.disconnect();
    bob.disconnect();
    assert_eq!(alice.active_workers() + bob.active_workers(), 0);
    server.stop();
}

#[test]
fn test_client_handles_server_shutdown() {
    let (server, addr) = start_server();
    let (client, out) = connect_client(addr);
    assert!(wait_until(|| client.client_id() != 0));

    server.stop();

    assert!(client.shutdown_handle().wait_timeout(TIMEOUT));
    assert!(wait_until(|| out.text().contains("Disconnecting.")));
    assert!(!client.is_connected());

    client.disconnect();
    assert_eq!(client.active_workers(), 0);
}

#[test]
fn test_client_connect_refused() {
    let addr = {
        let (server, addr) = start_server();
        server.stop();
        addr
    };
    let out = SharedBuf::default();
    let context = ClientContext::new(
        Shutdown::new(),
        Arc::new(LoggingTransferHandler),
        Box::new(out),
    );
    let config = ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..ClientConfig::default()
    };
    assert!(Client::connect(&config, context, render_policy()).is_err());
}
