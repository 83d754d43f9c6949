//! Child output forwarding.
//!
//! Every stdout line is logged at info, every stderr line at warn, both under
//! the `pocketbase` target. Stdout is also scanned for the readiness marker.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Forward stdout, signalling `ready` the first time a line contains `marker`
pub(crate) fn forward_stdout<R>(stdout: R, marker: String, ready: oneshot::Sender<()>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut ready = Some(ready);
        let mut lines = BufReader::new(stdout).split(b'\n');

        loop {
            match lines.next_segment().await {
                Ok(Some(raw)) => {
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim_end();
                    info!(target: "pocketbase", "{}", line);

                    if line.contains(marker.as_str()) {
                        if let Some(tx) = ready.take() {
                            let _ = tx.send(());
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(target: "pocketbase", "stdout read failed: {}", e);
                    break;
                }
            }
        }
    })
}

/// Forward stderr as warnings
pub(crate) fn forward_stderr<R>(stderr: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).split(b'\n');

        loop {
            match lines.next_segment().await {
                Ok(Some(raw)) => {
                    let line = String::from_utf8_lossy(&raw);
                    warn!(target: "pocketbase", "{}", line.trim_end());
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(target: "pocketbase", "stderr read failed: {}", e);
                    break;
                }
            }
        }
    })
}
