//! The synchronization loop.
//!
//! One run goes through four phases:
//!
//! 1. **Flush** - if the set was last flushed a week or more ago, empty it
//!    and restart the feed from the beginning.
//! 2. **FULL** - an operator-requested restart from the beginning.
//! 3. **Fetch** - up to [`MAX_PAGES`] pages: each page's addresses are added
//!    in order, then the cursor moves to the page's next cursor.
//! 4. **Finalize** - when the page budget runs out, re-list the set.
//!
//! The cursor is written to disk only when the feed reports no new data.
//! A run that stops earlier re-fetches the same pages next time; the set
//! absorbs the duplicates.

use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::ApibanConfig;
use crate::enforcer::{Firewall, SetHandle};
use crate::error::ApibanError;
use crate::fetcher::{FeedClient, FetchError};

/// Seconds between set flushes (7 days)
pub const FLUSH_INTERVAL_SECS: i64 = 604_800;

/// Maximum feed requests per run
pub const MAX_PAGES: usize = 24;

const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// Sync loop settings
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Restart the feed from the beginning (the `FULL` argument)
    pub full: bool,
    pub max_pages: usize,
    pub flush_interval_secs: i64,
    /// First backoff after a transient feed error; doubles on each repeat
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            full: false,
            max_pages: MAX_PAGES,
            flush_interval_secs: FLUSH_INTERVAL_SECS,
            retry_base_delay: RETRY_BASE_DELAY,
            retry_max_delay: RETRY_MAX_DELAY,
        }
    }
}

/// How the fetch phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The feed had nothing newer than the cursor; config persisted
    NoChange,
    /// The feed advanced its cursor but sent no addresses
    EndOfData,
    /// The page budget ran out
    PageLimit,
}

/// Summary of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    pub flushed: bool,
    pub fetches: usize,
    pub pages_applied: usize,
    pub added: usize,
    pub failed: usize,
    /// Set size after the run, when it was re-listed
    pub element_count: Option<usize>,
}

impl SyncReport {
    fn new() -> Self {
        Self {
            outcome: SyncOutcome::PageLimit,
            flushed: false,
            fetches: 0,
            pages_applied: 0,
            added: 0,
            failed: 0,
            element_count: None,
        }
    }
}

/// Whether the set is due for a flush at `now`.
pub fn flush_due(flush_epoch: i64, now: i64, interval_secs: i64) -> bool {
    now.saturating_sub(flush_epoch) >= interval_secs
}

/// Drives one synchronization run against a firewall and a feed.
pub struct Syncer<'a, F: ?Sized, C: ?Sized> {
    firewall: &'a F,
    feed: &'a C,
    options: SyncOptions,
}

impl<'a, F, C> Syncer<'a, F, C>
where
    F: Firewall + ?Sized,
    C: FeedClient + ?Sized,
{
    pub fn new(firewall: &'a F, feed: &'a C, options: SyncOptions) -> Self {
        Self {
            firewall,
            feed,
            options,
        }
    }

    /// Run all phases. `set` must be a verified handle for `config.set_name`.
    pub async fn run(
        &self,
        config: &mut ApibanConfig,
        set: &SetHandle,
        now: i64,
    ) -> Result<SyncReport, ApibanError> {
        let mut report = SyncReport::new();

        report.flushed = self.apply_flush_policy(config, set, now).await?;

        if self.options.full {
            info!("CLI of FULL received, resetting LKID");
            config.reset_cursor();
        }

        let mut transient_streak: u32 = 0;
        for iteration in 0..self.options.max_pages {
            info!(
                "Checking banned list with ID: {} and dataset: {}",
                config.cursor, config.dataset
            );
            report.fetches += 1;

            let page = match self
                .feed
                .fetch(config.api_key.as_str(), &config.cursor, &config.dataset)
                .await
            {
                Ok(page) => {
                    transient_streak = 0;
                    page
                }
                Err(FetchError::Transient(msg)) => {
                    transient_streak += 1;
                    warn!("Failed to get banned list (attempt {}): {}", iteration + 1, msg);
                    if iteration + 1 < self.options.max_pages {
                        self.backoff(transient_streak).await;
                    }
                    continue;
                }
                Err(FetchError::Permanent(msg)) => {
                    error!("Failed to get banned list: {}", msg);
                    return Err(ApibanError::FetchPermanent(msg));
                }
            };

            if page.next_cursor == config.cursor {
                info!("Great news... no new bans to add. Exiting...");
                config.persist()?;
                report.element_count = self.log_element_count(&set.name).await;
                report.outcome = SyncOutcome::NoChange;
                return Ok(report);
            }

            if page.addresses.is_empty() {
                info!("No IP addresses detected. Exiting.");
                report.outcome = SyncOutcome::EndOfData;
                return Ok(report);
            }

            for ip in &page.addresses {
                match self.firewall.add_element(set, ip).await {
                    Ok(()) => {
                        report.added += 1;
                        info!("+ added {} to {}", ip, set.name);
                    }
                    Err(e) => {
                        report.failed += 1;
                        warn!("error adding {}: {:#}", ip, e);
                    }
                }
            }

            config.cursor = page.next_cursor;
            report.pages_applied += 1;
        }

        let set = self.firewall.list_set(&set.name).await.map_err(|e| {
            error!("Cannot verify nftables set {}", set.name);
            ApibanError::SetUnavailable {
                set: set.name.clone(),
                reason: format!("{:#}", e),
            }
        })?;
        info!("{} now has {} elements.", set.name, set.element_count);
        report.element_count = Some(set.element_count);
        report.outcome = SyncOutcome::PageLimit;
        Ok(report)
    }

    /// Flush the set if the flush interval has elapsed. Returns whether it flushed.
    async fn apply_flush_policy(
        &self,
        config: &mut ApibanConfig,
        set: &SetHandle,
        now: i64,
    ) -> Result<bool, ApibanError> {
        let last_flush = config.flush_epoch_secs();
        if !flush_due(last_flush, now, self.options.flush_interval_secs) {
            debug!("Set last flushed {}s ago", now.saturating_sub(last_flush));
            return Ok(false);
        }

        self.firewall.flush_set(set).await.map_err(|e| {
            error!("flushing nftables set failed. {:#}", e);
            ApibanError::FlushFailed {
                set: set.name.clone(),
                reason: format!("{:#}", e),
            }
        })?;

        info!("set flushed. resetting LKID and FLUSH");
        config.mark_flushed(now);
        Ok(true)
    }

    /// Re-list the set for the closing log line; failures only warn.
    async fn log_element_count(&self, set_name: &str) -> Option<usize> {
        match self.firewall.list_set(set_name).await {
            Ok(set) => {
                info!("{} now has {} elements.", set_name, set.element_count);
                Some(set.element_count)
            }
            Err(e) => {
                warn!("Cannot list set {} after run: {:#}", set_name, e);
                None
            }
        }
    }

    async fn backoff(&self, streak: u32) {
        let delay = backoff_delay(
            self.options.retry_base_delay,
            self.options.retry_max_delay,
            streak,
        );
        if !delay.is_zero() {
            debug!("Retrying feed in {}ms", delay.as_millis());
            tokio::time::sleep(delay).await;
        }
    }
}

/// Exponential backoff: `base * 2^(streak-1)`, capped at `max`.
pub fn backoff_delay(base: Duration, max: Duration, streak: u32) -> Duration {
    let exponent = streak.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(max)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_flush_due_matches_interval(now in 0i64..4_000_000_000, age in 0i64..2_000_000) {
            prop_assert_eq!(flush_due(now - age, now, FLUSH_INTERVAL_SECS), age >= FLUSH_INTERVAL_SECS);
        }

        #[test]
        fn prop_backoff_never_exceeds_max(streak in 0u32..1000, base_ms in 0u64..10_000) {
            let max = Duration::from_secs(30);
            prop_assert!(backoff_delay(Duration::from_millis(base_ms), max, streak) <= max);
        }
    }
}
