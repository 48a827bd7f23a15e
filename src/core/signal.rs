//! SIGINT/SIGTERM → `Shutdown`
//!
//! Signals di-block di thread utama sebelum worker apa pun di-spawn (mask
//! diwarisi semua thread), lalu satu thread khusus menunggu via `sigwait`.
//! Tidak ada signal handler dan tidak ada global state.

use std::io;

use tracing::{info, warn};

use super::Shutdown;

pub struct TerminationSignals {
    #[cfg(unix)]
    set: libc::sigset_t,
}

impl TerminationSignals {
    /// Block SIGINT and SIGTERM for the calling thread and every thread it spawns later.
    #[cfg(unix)]
    pub fn block() -> io::Result<Self> {
        // SAFETY: sigset_t is plain data initialised by sigemptyset before use.
        unsafe {
            let mut set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, libc::SIGINT);
            libc::sigaddset(&mut set, libc::SIGTERM);
            let rc = libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut());
            if rc != 0 {
                return Err(io::Error::from_raw_os_error(rc));
            }
            Ok(Self { set })
        }
    }

    #[cfg(not(unix))]
    pub fn block() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Spawn thread yang men-trigger `shutdown` saat signal pertama datang.
    #[cfg(unix)]
    pub fn spawn_listener(self, shutdown: Shutdown) -> io::Result<()> {
        let set = self.set;
        std::thread::Builder::new()
            .name("signals".to_string())
            .spawn(move || {
                let mut signum: libc::c_int = 0;
                // SAFETY: `set` was built in `block` and is blocked in this thread.
                let rc = unsafe { libc::sigwait(&set, &mut signum) };
                if rc != 0 {
                    warn!(error = %io::Error::from_raw_os_error(rc), "sigwait failed");
                    return;
                }
                info!(signal = signum, "termination signal received");
                shutdown.trigger();
            })?;
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn spawn_listener(self, _shutdown: Shutdown) -> io::Result<()> {
        warn!("signal handling not supported on this platform");
        Ok(())
    }
}
