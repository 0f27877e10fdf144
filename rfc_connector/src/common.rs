use tokio_util::sync::CancellationToken;

use crate::error::{RfcError, RfcResult};

/// Checkpoint between units of blocking work.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> RfcResult<()> {
    if cancel.is_cancelled() {
        return Err(RfcError::Cancelled);
    }
    Ok(())
}
