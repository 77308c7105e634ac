//! JSON-lines event output
//!
//! Development stand-in for the publishing pipeline: every event received
//! from the engine's sinks is written to a writer as one JSON object per line.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use wmibeat_core::Event;

/// Drain `rx` into `writer` until every sender is gone
///
/// Returns the number of events written.
pub fn spawn_writer<W>(mut rx: mpsc::UnboundedReceiver<Event>, mut writer: W) -> JoinHandle<u64>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut written = 0u64;

        while let Some(event) = rx.recv().await {
            let mut line = match serde_json::to_vec(&event) {
                Ok(line) => line,
                Err(e) => {
                    error!(class = %event.class, error = %e, "failed to encode event");
                    continue;
                }
            };
            line.push(b'\n');

            if let Err(e) = writer.write_all(&line).await {
                error!(error = %e, "failed to write event, stopping output");
                break;
            }
            written += 1;
        }

        if let Err(e) = writer.flush().await {
            error!(error = %e, "failed to flush output");
        }
        debug!(written, "event output closed");

        written
    })
}
