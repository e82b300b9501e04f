//! Drives a call against the in-memory loopback SDK and prints every
//! emitted event as one JSON line on stdout.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokcall_core::loopback::LoopbackSdk;
use tokcall_core::{CallClient, CallConfig, CallError};

#[derive(Debug, Parser)]
#[command(name = "tokcall", about = "Simulate a call and print its state events")]
struct Args {
    /// JSON config file (sessionId, token and SDK pass-through keys).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Session id, overrides the config file.
    #[arg(long, env = "TOKCALL_SESSION_ID")]
    session_id: Option<String>,

    /// Session token, overrides the config file.
    #[arg(long, env = "TOKCALL_TOKEN")]
    token: Option<String>,

    /// Number of remote peers that join the call.
    #[arg(long, default_value_t = 1)]
    peers: usize,

    /// Skip publishing local media.
    #[arg(long)]
    no_publish: bool,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("tokcall_core=debug,tokcall=info")
            }),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn load_config(args: &Args) -> Result<CallConfig, CallError> {
    let mut config = match &args.config {
        Some(path) => CallConfig::load(path)?,
        None => CallConfig::default(),
    };
    if let Some(session_id) = &args.session_id {
        config.session_id = session_id.clone();
    }
    if let Some(token) = &args.token {
        config.token = token.clone();
    }
    Ok(config)
}

/// Scripted call: connect, publish, peers join and leave, unpublish.
fn run_call(
    client: &CallClient,
    sdk: &LoopbackSdk,
    config: &CallConfig,
    args: &Args,
) -> Result<(), CallError> {
    client.connect(&config.session_id, &config.token)?;
    if !args.no_publish {
        client.publish()?;
    }

    let session = sdk
        .last_session()
        .ok_or_else(|| CallError::Session("loopback session missing".into()))?;
    let peers: Vec<_> = (0..args.peers).map(|_| session.peer_joins()).collect();
    tracing::info!(
        "call established: calling={} goes={}",
        client.is_calling(),
        client.is_call_goes()
    );

    for (connection, stream) in &peers {
        session.peer_leaves(connection, stream);
    }
    if client.has_publisher() {
        client.unpublish()?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), CallError> {
    init_logging();
    let args = Args::parse();
    let config = load_config(&args)?;

    let sdk = Arc::new(LoopbackSdk::new());
    let client = CallClient::new(config.clone(), sdk.clone(), sdk.clone());
    let mut events = client.subscribe();

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", event.to_json());
        }
    });

    let result = run_call(&client, &sdk, &config, &args);
    if let Err(e) = &result {
        tracing::error!("call failed: {e}");
    }

    // Disconnect even after a failure so the loopback session is closed.
    if let Err(e) = client.disconnect() {
        tracing::warn!("disconnect failed: {e}");
    }
    drop(client);
    drop(sdk);
    if let Err(e) = printer.await {
        tracing::warn!("event printer stopped: {e}");
    }
    result
}
