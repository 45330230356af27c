//! Push gateway binary
//!
//! Run with: wspush [BIND_ADDR]
//!
//! Examples:
//!   wspush                    # binds to 127.0.0.1:29999
//!   wspush localhost:8080     # binds to 127.0.0.1:8080
//!   wspush 0.0.0.0            # binds to 0.0.0.0:29999
//!
//! Connect with `ws://HOST:PORT/ws?user_id=<id>`, then push with
//! `curl -d '{"text":"hi"}' -H 'content-type: application/json' http://HOST:PORT/message`.

use std::net::{IpAddr, SocketAddr};

use tracing_subscriber::EnvFilter;
use wspush_rs::{PushServer, ServerConfig};

/// Parse a bind address argument
///
/// Accepts `IP:PORT`, `IP`, or `localhost` with an optional port.
fn parse_bind_addr(arg: &str, default_port: u16) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: wspush [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 127.0.0.1:29999)");
    eprintln!();
    eprintln!("Set RUST_LOG to adjust logging (default: wspush_rs=info)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut config = ServerConfig::default();
    if let Some(arg) = args.get(1) {
        match parse_bind_addr(arg, config.bind_addr.port()) {
            Ok(addr) => config = config.bind(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wspush_rs=info")),
        )
        .init();

    let server = PushServer::new(config);
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
