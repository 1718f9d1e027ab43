//! Analytics delivery
//!
//! Default sink logs action events through tracing. Delivery is
//! fire-and-forget from the action service; a sink must never propagate
//! errors back into the action path.

use crate::domain::action::{ActionEvent, AnalyticsSink};
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Default, Clone)]
pub struct LogAnalyticsSink;

#[async_trait]
impl AnalyticsSink for LogAnalyticsSink {
    async fn record(&self, event: ActionEvent) {
        let outcome = if event.success { "success" } else { "error" };
        info!(
            "📊 action {:?} on {} -> {} (tx: {})",
            event.kind,
            event.entity_id,
            outcome,
            event.tx_id.as_deref().unwrap_or("-")
        );
    }
}
