//! Adapter entry point.
//!
//! Runs `<command>` as the sandboxed app, waits for it to listen on
//! `127.0.0.1:<port>`, then serves the host's capability socket on
//! inherited fd 3 and the application side channel on a Unix socket. Exits
//! nonzero with a diagnostic when the app exits.

use std::os::fd::FromRawFd;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use gangway::bridge::{self, SIDE_CHANNEL_PATH};
use gangway::config::{self, CONFIG_PATH};
use gangway::gateway::{BridgeApiImpl, MainViewImpl};
use gangway::registry::SessionRegistry;
use gangway::supervisor;
use gangway::wire::{self, MainViewTarget, RemoteSandstormApi};

/// The file descriptor the supervising host hands us for capability RPC.
const HOST_SOCKET_FD: i32 = 3;

#[derive(Parser)]
#[command(
    name = "gangway",
    about = "Runs <command> as a sandboxed HTTP app and bridges typed \
             session calls to it over loopback HTTP"
)]
struct Args {
    /// Loopback port the app will listen on.
    port: u16,

    /// The app's argv.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = config::load(CONFIG_PATH).context("loading bridge config")?;

    let child = supervisor::spawn_app(&args.command)?;
    supervisor::wait_for_app(args.port).await;

    let registry = SessionRegistry::new();
    let main_view = MainViewImpl::new(args.port, config, registry.clone());

    // The host socket arrives as an already-connected fd.
    match host_socket() {
        Ok(stream) => {
            let host_conn = wire::serve(stream, Arc::new(MainViewTarget(main_view)));
            let api = RemoteSandstormApi::new(host_conn);
            let bridge_api = BridgeApiImpl::new(api, registry);
            let listener = bridge::bind_side_channel(SIDE_CHANNEL_PATH)?;
            tokio::spawn(bridge::serve_side_channel(listener, bridge_api));
        }
        Err(error) => {
            // Keep running so the app itself still works; only the
            // capability surface is missing.
            warn!(%error, "no host capability socket on fd 3");
        }
    }

    let diagnostic = supervisor::watch_app(child).await;
    bail!("** HTTP-BRIDGE: {diagnostic}");
}

fn host_socket() -> std::io::Result<tokio::net::UnixStream> {
    let std_stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(HOST_SOCKET_FD) };
    std_stream.set_nonblocking(true)?;
    tokio::net::UnixStream::from_std(std_stream)
}
