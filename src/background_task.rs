use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::repositories::gateway::{GatewayState, PersistenceGateway};

/// Corrects drifted comment counters; only meaningful on the remote backend.
pub async fn recount_all_comments(gateway: &PersistenceGateway) -> usize {
    let photos = match gateway.fetch_photos().await {
        Ok(photos) => photos,
        Err(e) => {
            tracing::error!("Comment recount skipped, photos unavailable: {}", e);
            return 0;
        }
    };

    let mut corrected = 0;
    for photo in &photos {
        match gateway.recount_comments(photo.record_id()).await {
            Ok(count) if photo.comment_count != Some(count) => corrected += 1,
            Ok(_) => {}
            Err(e) => tracing::warn!("Recount of {} failed: {}", photo.record_id(), e),
        }
    }
    corrected
}

pub async fn start_recount_task(gateway: Arc<PersistenceGateway>, every: Duration) {
    let mut interval = interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        if gateway.state() != GatewayState::RemoteActive {
            continue;
        }
        let corrected = recount_all_comments(&gateway).await;
        tracing::info!("Comment recount finished, {} photos corrected", corrected);
    }
}
