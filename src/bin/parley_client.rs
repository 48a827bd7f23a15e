//! Parley Client Binary
//!
//! Usage:
//!   cargo run --release --bin parley_client [HOST] [PORT]
//!
//! Commands:
//!   /quit                      keluar (atau EOF)
//!   /file <recipient> <name>   request file transfer (belum diimplementasi)
//!   teks lain                  dikirim sebagai chat message

use std::io;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use tracing::warn;

use parley::config::{ClientConfig, DEFAULT_HOST, DEFAULT_PORT};
use parley::core::Shutdown;
use parley::dispatch::{render_policy, LoggingTransferHandler};
use parley::network::{Client, ClientContext};

#[derive(Parser, Debug)]
#[command(name = "parley_client", version, about = "Multi-client TCP chat client")]
struct Args {
    /// Server host
    #[arg(default_value = DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    // Chat output owns stdout; logs stay quiet unless asked for.
    let level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={level},parley_client={level}")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init()
        .ok();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = ClientConfig {
        host: args.host,
        port: args.port,
        ..ClientConfig::default()
    };

    let context = ClientContext::new(
        Shutdown::new(),
        Arc::new(LoggingTransferHandler),
        Box::new(io::stdout()),
    );

    let client = match Client::connect(&config, context, render_policy()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("❌ Could not connect to {}: {}", config.addr(), e);
            std::process::exit(1);
        }
    };

    println!("✅ Connected to {}. Type /quit to exit.", config.addr());

    let shutdown = client.shutdown_handle();
    let console = {
        let client = Arc::clone(&client);
        thread::Builder::new()
            .name("console".to_string())
            .spawn(move || {
                let stdin = io::stdin();
                if let Err(e) = client.run_console(stdin.lock()) {
                    warn!(error = %e, "console input failed");
                }
                client.shutdown_handle().trigger();
            })
    };
    if let Err(e) = console {
        eprintln!("❌ Could not start console: {}", e);
        client.disconnect();
        std::process::exit(1);
    }

    // Console thread may still be parked on stdin; it is not joined.
    shutdown.wait();
    client.disconnect();
    println!("👋 Disconnected");
}
