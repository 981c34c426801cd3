//! Delivery of events the ledger queued alongside its commits.

use tracing::{trace, warn};
use volbal_core::{EventLogger, Ledger};

/// Hands every queued event to `journal`.
///
/// A journal failure is logged and swallowed: the commit it belongs to has
/// already happened, and the events stay queued for the next flush.
pub async fn flush_events(ledger: &dyn Ledger, journal: &dyn EventLogger) {
    match ledger.publish_pending(journal).await {
        Ok(0) => {}
        Ok(delivered) => trace!(delivered, "events published"),
        Err(e) => warn!(error = %e, "journal append failed, events stay queued"),
    }
}
