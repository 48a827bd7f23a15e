//! Socket capability
//!
//! Session hanya melihat trait `Socket` (send, receive, close, is_valid);
//! server hanya melihat `Listener`. Implementasi TCP di bawah memakai
//! `std::net` dengan tuning yang sama untuk kedua sisi.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

/// One connected byte stream, shared by a receive worker and a send worker.
pub trait Socket: Send + Sync {
    /// Blocking send. Returns bytes written.
    fn send(&self, buf: &[u8]) -> io::Result<usize>;

    /// Blocking receive. `Ok(0)` means the peer closed the stream.
    fn receive(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Close the socket, unblocking any receive in flight. Idempotent.
    fn close(&self);

    fn is_valid(&self) -> bool;

    fn peer_label(&self) -> String {
        "unknown".to_string()
    }
}

pub trait Listener: Send + Sync {
    /// Blocking accept. Fails once the listener is closed.
    fn accept(&self) -> io::Result<Arc<dyn Socket>>;

    /// Close the listener, unblocking a pending `accept`. Idempotent.
    fn close(&self);

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// TCP_NODELAY + optional kernel buffer sizes
fn tune(stream: &TcpStream, buffer_size: Option<usize>) -> io::Result<()> {
    // Chat lines are small; Nagle only adds latency here.
    stream.set_nodelay(true)?;

    #[cfg(unix)]
    {
        if let Some(size) = buffer_size {
            set_buffer_sizes(stream, size);
        }
    }
    #[cfg(not(unix))]
    let _ = buffer_size;

    Ok(())
}

/// Ignore errors - not all platforms accept every size
#[cfg(unix)]
fn set_buffer_sizes(stream: &TcpStream, size: usize) {
    use std::os::unix::io::AsRawFd;

    let fd = stream.as_raw_fd();
    let optval = size.min(libc::c_int::MAX as usize) as libc::c_int;
    for opt in [libc::SO_SNDBUF, libc::SO_RCVBUF] {
        // SAFETY: fd is owned by `stream` and optval outlives the call.
        let rc = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                opt,
                &optval as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            debug!(option = opt, error = %io::Error::last_os_error(), "setsockopt failed");
        }
    }
}

/// TCP stream wrapper implementing `Socket`
pub struct TcpSocket {
    stream: TcpStream,
    peer: Option<SocketAddr>,
    closed: AtomicBool,
}

impl TcpSocket {
    /// Connect ke server (`host:port`).
    pub fn connect(addr: &str, buffer_size: Option<usize>) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        let peer = stream.peer_addr().ok();
        Self::from_stream(stream, peer, buffer_size)
    }

    pub fn from_stream(
        stream: TcpStream,
        peer: Option<SocketAddr>,
        buffer_size: Option<usize>,
    ) -> io::Result<Self> {
        tune(&stream, buffer_size)?;
        Ok(Self {
            stream,
            peer,
            closed: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }
}

impl Socket for TcpSocket {
    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "socket closed"));
        }
        (&self.stream).write_all(buf)?;
        Ok(buf.len())
    }

    fn receive(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.stream).read(buf)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            // NotConnected here just means the peer got there first.
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }

    fn is_valid(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn peer_label(&self) -> String {
        match self.peer {
            Some(addr) => addr.to_string(),
            None => "unknown".to_string(),
        }
    }
}

/// Listening TCP socket implementing `Listener`
pub struct TcpAcceptor {
    listener: TcpListener,
    buffer_size: Option<usize>,
    closed: AtomicBool,
}

impl TcpAcceptor {
    pub fn bind(addr: &str, buffer_size: Option<usize>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            buffer_size,
            closed: AtomicBool::new(false),
        })
    }

    /// Loopback connection whose only job is to make a blocked `accept` return.
    fn wake_acceptor(&self) {
        let Ok(mut addr) = self.listener.local_addr() else {
            return;
        };
        if addr.ip().is_unspecified() {
            addr.set_ip(match addr {
                SocketAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
                SocketAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
            });
        }
        let _ = TcpStream::connect(addr);
    }
}

impl Listener for TcpAcceptor {
    fn accept(&self) -> io::Result<Arc<dyn Socket>> {
        let (stream, peer) = self.listener.accept()?;
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "listener closed",
            ));
        }
        let socket = TcpSocket::from_stream(stream, Some(peer), self.buffer_size)?;
        Ok(Arc::new(socket))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            // SAFETY: the fd stays owned by `self.listener`; shutdown does not close it.
            let rc = unsafe { libc::shutdown(self.listener.as_raw_fd(), libc::SHUT_RDWR) };
            if rc == 0 {
                return;
            }
            debug!(error = %io::Error::last_os_error(), "listener shutdown failed, waking acceptor");
        }

        self.wake_acceptor();
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
