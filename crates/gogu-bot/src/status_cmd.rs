//! `status`: one line per home-lab service.

use crate::BotState;
use crate::commands::Replier;
use crate::error::BotResult;
use lab_health::render_report;

pub async fn handle_status(state: &BotState, replier: &dyn Replier) -> BotResult<()> {
    replier.send("🔍 Checking services...").await?;
    let results = state.aggregator.check_all(&state.probes).await;
    replier.send(&render_report(&results)).await
}
