//! File polling on the predecessor's out-file.

use std::{path::Path, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{error::EntrypointError, state::TerminalRecord};

/// Polling interval for out-file appearance. The rename-based write makes a
/// visible file a complete record, so polling needs no further coordination.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of waiting on a predecessor.
#[derive(Debug)]
pub enum WaitOutcome {
    /// The predecessor finished; its terminal record.
    Ready(TerminalRecord),
    /// Cancellation arrived before the record appeared.
    Cancelled,
}

/// Block until `path` holds a terminal record or the token fires.
pub async fn wait_for_record(
    path: &Path,
    cancel: &CancellationToken,
) -> Result<WaitOutcome, EntrypointError> {
    loop {
        if tokio::fs::try_exists(path).await? {
            trace!(path = %path.display(), "predecessor record visible");
            return Ok(WaitOutcome::Ready(TerminalRecord::read(path).await?));
        }
        tokio::select! {
            _ = cancel.cancelled() => return Ok(WaitOutcome::Cancelled),
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }
}
