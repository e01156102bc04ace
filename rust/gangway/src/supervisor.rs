//! Child process lifecycle.
//!
//! The adapter is the init process of its sandbox: it launches the app,
//! waits for it to start accepting on the loopback port, and exits with a
//! diagnostic when the app dies.

use std::os::fd::FromRawFd;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::info;

use gangway_types::BridgeError;

/// Backoff between connect attempts while the app is starting.
const CONNECT_RETRY: Duration = Duration::from_millis(10);

/// Launch the application with the operator-supplied argv.
///
/// The child gets a cleared signal mask and default SIGPIPE disposition;
/// the async runtime's signal handling must not leak into it.
pub fn spawn_app(command: &[String]) -> Result<Child, BridgeError> {
    let (program, args) = command
        .split_first()
        .ok_or(BridgeError::Contract("empty app command"))?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    let pre_exec = || {
        use nix::sys::signal::{sigprocmask, SigHandler, SigSet, SigmaskHow, Signal};

        // The host capability socket must not leak into the app.
        drop(unsafe { std::fs::File::from_raw_fd(3) });

        let empty = SigSet::empty();
        sigprocmask(SigmaskHow::SIG_SETMASK, Some(&empty), None).map_err(std::io::Error::from)?;
        unsafe { nix::sys::signal::signal(Signal::SIGPIPE, SigHandler::SigDfl) }
            .map_err(std::io::Error::from)?;
        Ok(())
    };
    unsafe {
        cmd.pre_exec(pre_exec);
    }

    let child = cmd
        .spawn()
        .map_err(|error| BridgeError::Config(format!("cannot start app {program:?}: {error}")))?;
    info!(app = %program, pid = child.id().unwrap_or(0), "app launched");
    Ok(child)
}

/// Poll the loopback port until the app accepts a connection.
pub async fn wait_for_app(port: u16) {
    loop {
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(_) => return,
            Err(_) => tokio::time::sleep(CONNECT_RETRY).await,
        }
    }
}

/// Wait for the child to exit and describe how it went.
pub async fn watch_app(mut child: Child) -> String {
    match child.wait().await {
        Ok(status) => {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                if let Some(signal) = status.signal() {
                    return format!("app server exited due to signal {signal}");
                }
            }
            format!(
                "app server exited with status code: {}",
                status.code().unwrap_or(-1)
            )
        }
        Err(error) => format!("failed waiting for app server: {error}"),
    }
}
