use std::sync::Arc;

use futures::Stream;
use shared::protocol::TelemetryUpdate;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use crate::registry::Registry;

/// Merges one telemetry sample. Returns `false` if the target no longer exists.
pub async fn apply_update(registry: &Registry, update: &TelemetryUpdate) -> bool {
    let applied = match update {
        TelemetryUpdate::Flow { flow_id, patch } => registry.update_flow(flow_id, patch).await,
        TelemetryUpdate::Process { process_id, patch } => {
            registry.update_process(process_id, patch).await
        }
    };
    if !applied {
        trace!(?update, "telemetry: dropped update for unknown entity");
    }
    applied
}

/// Drains `feed` into the registry on a background task. The task ends with
/// the stream and yields the number of updates that matched an entity.
pub fn spawn_ingest<S>(registry: Arc<Registry>, feed: S) -> JoinHandle<usize>
where
    S: Stream<Item = TelemetryUpdate> + Send + 'static,
{
    tokio::spawn(async move {
        let mut feed = Box::pin(feed);
        let mut applied = 0usize;
        while let Some(update) = feed.next().await {
            if apply_update(&registry, &update).await {
                applied += 1;
            }
        }
        debug!(applied, "telemetry: feed ended");
        applied
    })
}
