//! Parley Server Binary
//!
//! Usage:
//!   cargo run --release --bin parley_server [PORT] [OPTIONS]
//!
//! SIGINT/SIGTERM → graceful stop (ServerShutdown notice ke semua client).

use std::io;

use clap::Parser;
use tracing::error;

use parley::config::{ServerConfig, DEFAULT_PORT};
use parley::core::{Shutdown, TerminationSignals};
use parley::network::Server;

#[derive(Parser, Debug)]
#[command(name = "parley_server", version, about = "Multi-client TCP chat server")]
struct Args {
    /// Port to listen on
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// SO_SNDBUF / SO_RCVBUF size in bytes for client sockets
    #[arg(long, value_name = "BYTES")]
    sndbuf: Option<usize>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={level},parley_server={level}")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init()
        .ok();
}

fn run(args: Args) -> parley::Result<()> {
    let config = ServerConfig {
        bind_host: args.bind,
        port: args.port,
        socket_buffer_size: args.sndbuf,
        ..ServerConfig::default()
    };

    // Mask must be in place before any worker thread exists.
    let signals = TerminationSignals::block()?;
    let shutdown = Shutdown::new();

    let server = Server::bind(config)?;
    server.start()?;
    signals.spawn_listener(shutdown.clone())?;

    println!("💬 PARLEY SERVER");
    println!("================\n");
    println!("🔌 Listening on {}", server.local_addr()?);
    println!("⚡ TCP_NODELAY: ENABLED");
    println!("\n📡 Waiting for connections... (Ctrl+C to stop)\n");

    shutdown.wait();

    println!("\n🛑 Shutting down ({} clients)...", server.registry().live_count());
    server.stop();
    println!("✅ Server stopped");
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        error!(error = %e, "server failed");
        eprintln!("❌ Server error: {}", e);
        std::process::exit(1);
    }
}
