//! Periodic certificate refresh
//!
//! Re-fetches linked peers' certificates on a fixed schedule, independent
//! of interactive operations. The loop holds no lock against a concurrent
//! local analysis reading the same import files: imports are replaced
//! atomically as whole files, so last-successful-write-wins is good enough.

use std::time::Duration;

use tracing::{info, warn};

use crate::service::RiskService;
use crate::transport::Transport;

/// How often linked peers' certificates are re-fetched.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Run the refresh schedule forever. The first fetch happens immediately;
/// any failure is logged and the loop keeps its schedule.
pub async fn run_refresh_loop<T: Transport>(
    service: &RiskService,
    transport: &T,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        match service.fetch_imports(transport).await {
            Ok(updated) => info!(updated, "peer certificate refresh complete"),
            Err(e) => warn!(error = %e, "peer certificate refresh failed"),
        }
    }
}
