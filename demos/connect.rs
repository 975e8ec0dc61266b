//! Connect to a gateway, print events and call `status`.
//!
//! Demonstrates:
//! - Loading persisted gateway settings
//! - Authenticating with a token or a device identity
//! - Lifecycle callbacks and stream subscriptions
//! - A request/response round-trip
//!
//! Settings are read from the default settings file, then overridden by
//! `GATEWAY_URL` and `GATEWAY_TOKEN`.
//!
//! Usage:
//!   cargo run --example connect
//!   cargo run --example connect -- --device
//!   cargo run --example connect -- --debug --no-wait

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use anyhow::{Context, bail};
use gateway_client::{
    ClientOptions, ConnectionState, FileAuthCache, FileKeyStore, GatewayClient, GatewaySettings,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_URL: &str = "ws://127.0.0.1:18789";
const CONNECT_WAIT: Duration = Duration::from_secs(15);

// ============================================================================
// Args
// ============================================================================

#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    no_wait: bool,
    device: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            no_wait: args.iter().any(|a| a == "--no-wait"),
            device: args.iter().any(|a| a == "--device"),
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    println!("=== Gateway Connect ===\n");

    let settings = load_settings().await?;
    println!("[Setup] Gateway: {}", settings.gateway_url);

    let mut builder = GatewayClient::builder()
        .settings(settings)
        .options(ClientOptions::new().with_challenge_timeout(Duration::from_millis(500)))
        .on_hello(|hello| {
            println!(
                "[Hello] {} protocol {} role {}",
                hello.generation, hello.protocol, hello.auth.role
            );
        })
        .on_close(|close| println!("[Close] {close} (retry: {})", close.will_retry));

    if args.device {
        builder = builder
            .key_store(FileKeyStore::at_default_path())
            .auth_cache(FileAuthCache::at_default_path());
    }

    let client = builder.build().context("invalid client configuration")?;
    client.on("*", |event| println!("[Event] {}: {}", event.stream, event.data));
    client.start();

    // ========================================================================
    // Wait for Connection
    // ========================================================================

    let mut states = client.subscribe_state();
    let connected =
        tokio::time::timeout(CONNECT_WAIT, states.wait_for(ConnectionState::is_connected)).await;
    if !matches!(connected, Ok(Ok(_))) {
        client.stop().await;
        bail!("not connected after {CONNECT_WAIT:?} (state: {})", client.state());
    }

    // ========================================================================
    // Request
    // ========================================================================

    let status = client
        .request("status", json!({}))
        .await
        .context("status request failed")?;
    println!("[Status] {status}\n");

    if args.no_wait {
        println!("[--no-wait] Skipping wait");
    } else {
        println!("Press Ctrl+C to exit...");
        tokio::signal::ctrl_c().await.ok();
    }

    client.stop().await;
    println!("\n=== Done ===");
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn init_logging(debug: bool) {
    let filter = if debug {
        "gateway_client=debug"
    } else {
        "gateway_client=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn load_settings() -> anyhow::Result<GatewaySettings> {
    let path = GatewaySettings::default_path();
    let mut settings = GatewaySettings::load(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?
        .unwrap_or_else(|| GatewaySettings::new(DEFAULT_URL));

    if let Ok(url) = std::env::var("GATEWAY_URL") {
        settings.gateway_url = url;
    }
    if let Ok(token) = std::env::var("GATEWAY_TOKEN") {
        settings.token = Some(token);
    }
    if settings.gateway_url.is_empty() {
        bail!("no gateway URL configured");
    }

    Ok(settings)
}
