//! Staleness-driven refresh of an item's streams.
//!
//! A refresh is billed per item, so it is only requested when a stream's last
//! successful update is at least as old as the caller's threshold.

use crate::core::activity::{ItemStatus, Stream};
use crate::core::config::ItemConfig;
use crate::core::provider::ActivityProvider;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshThreshold(Duration);

impl RefreshThreshold {
    /// Thresholds at or above one week disable refresh checking entirely.
    pub const LIMIT: Duration = Duration::hours(168);

    pub fn new(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn is_disabled(&self) -> bool {
        self.0 >= Self::LIMIT
    }

    /// Age of the last update when it is stale. Streams that never synced are
    /// never stale.
    pub fn stale_age(
        &self,
        last_successful_update: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let last = last_successful_update?;
        let age = now - last;
        (age >= self.0).then_some(age)
    }
}

impl Default for RefreshThreshold {
    fn default() -> Self {
        Self(Self::LIMIT)
    }
}

/// Fetches the item status and refreshes every stale stream. Returns the
/// streams a refresh was requested for.
#[instrument(name = "CheckRefresh", skip_all, fields(item = %item_id))]
pub async fn check_refresh(
    provider: &dyn ActivityProvider,
    item_id: &str,
    item: &ItemConfig,
    threshold: &RefreshThreshold,
    now: DateTime<Utc>,
) -> Result<Vec<Stream>> {
    let status = provider
        .item_status(item)
        .await
        .with_context(|| format!("request item {item_id:?} status"))?;

    let mut refreshed = Vec::new();
    for stream in stale_streams(&status, threshold, now) {
        provider
            .refresh(item, stream)
            .await
            .with_context(|| format!("request item {item_id:?} {stream} refresh"))?;
        refreshed.push(stream);
    }

    if refreshed.is_empty() {
        debug!("No stale streams");
    }
    Ok(refreshed)
}

fn stale_streams(
    status: &ItemStatus,
    threshold: &RefreshThreshold,
    now: DateTime<Utc>,
) -> Vec<Stream> {
    [Stream::Transactions, Stream::Investments]
        .into_iter()
        .filter(|stream| {
            let last = status.stream(*stream).last_successful_update;
            match (last, threshold.stale_age(last, now)) {
                (Some(last), Some(age)) => {
                    info!(
                        %stream,
                        last_successful_update = %last.to_rfc3339(),
                        age = %format_age(age),
                        "Stream is stale, requesting refresh"
                    );
                    true
                }
                _ => false,
            }
        })
        .collect()
}

fn format_age(age: Duration) -> String {
    let secs = age.num_seconds();
    format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}
