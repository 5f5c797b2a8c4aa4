//! Campaign cancellation flags.
//!
//! Cancellation is advisory and best-effort: workers check the flag just
//! before dispatching a job, and jobs already past that check run to
//! completion.

use herald_redis::Store;
use std::time::Duration;
use tracing::warn;

use crate::Result;

/// Store key holding a campaign's cancellation flag.
pub fn cancellation_key(campaign_id: &str) -> String {
    format!("worker:cancel:campaign:{}", campaign_id)
}

/// Raise the cancellation flag for a campaign.
///
/// Flag lifetime is operator policy: pass a TTL to let the flag lapse, or
/// none to keep it until explicitly cleared.
pub async fn cancel_campaign(store: &Store, campaign_id: &str, ttl: Option<Duration>) -> Result<()> {
    let key = cancellation_key(campaign_id);
    match ttl {
        Some(ttl) => store.set_ex(&key, "true", ttl).await?,
        None => store.set(&key, "true").await?,
    }
    Ok(())
}

/// Clear the cancellation flag for a campaign.
pub async fn clear_cancellation(store: &Store, campaign_id: &str) -> Result<()> {
    store.delete(&cancellation_key(campaign_id)).await?;
    Ok(())
}

/// Check whether a campaign is cancelled.
///
/// Only the literal value `"true"` cancels. Store read errors are logged
/// and treated as not cancelled so a flaky store cannot silently drop
/// jobs.
pub async fn is_cancelled(store: &Store, campaign_id: &str) -> bool {
    match store.get(&cancellation_key(campaign_id)).await {
        Ok(value) => value.as_deref() == Some("true"),
        Err(e) => {
            warn!(
                component = "worker",
                campaign_id,
                error = %e,
                "cancellation check failed, treating as not cancelled"
            );
            false
        }
    }
}
