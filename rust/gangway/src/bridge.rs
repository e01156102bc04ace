//! The side channel: a Unix socket the application connects to for
//! introspection — the host API capability and the context of any live
//! session, looked up by the `X-Sandstorm-Session-Id` value it received.

use std::path::Path;
use std::sync::Arc;

use tokio::net::UnixListener;
use tracing::{debug, warn};

use gangway_types::{BridgeApi, BridgeError};

use crate::wire::{self, BridgeApiTarget};

/// Fixed socket path the application knows to connect to.
pub const SIDE_CHANNEL_PATH: &str = "/tmp/sandstorm-api";

/// Bind the side-channel socket, clearing any stale one first.
pub fn bind_side_channel(path: &str) -> Result<UnixListener, BridgeError> {
    if Path::new(path).exists() {
        let _ = std::fs::remove_file(path);
    }
    UnixListener::bind(path)
        .map_err(|error| BridgeError::Config(format!("cannot bind {path}: {error}")))
}

/// Accept loop: every application connection gets the bridge capability as
/// its bootstrap.
pub async fn serve_side_channel(listener: UnixListener, bridge: Arc<dyn BridgeApi>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                debug!("app connected to side channel");
                wire::serve(stream, Arc::new(BridgeApiTarget(bridge.clone())));
            }
            Err(error) => {
                warn!(%error, "side channel accept failed");
                return;
            }
        }
    }
}
