//! # Listing Pipeline Module
//!
//! One tick fetches the current listings for every subscriber, applies their
//! filter criteria, drops listings they have already been sent, records the rest
//! and then notifies. Seen rows are written before any message goes out, so a
//! failed send is never retried (at-most-once delivery).

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashSet;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::bot::ui_builder::format_listing_message;
use crate::config::{PipelineConfig, SearchQuery};
use crate::errors::FetchError;
use crate::listing_filter::{apply_filter, normalize_listings};
use crate::listing_model::{NormalizedListing, RawListing};
use crate::store::{FilterStore, ListingHistoryStore, Store, SubscriberStore};

/// Provider of current listings
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_listings(&self, query: &SearchQuery) -> Result<Vec<RawListing>, FetchError>;
}

/// Outbound text channel to a subscriber
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Why a subscriber's unit of work was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The previous tick is still working on this subscriber
    InFlight,
    FetchFailed,
    EmptyFetch,
    StoreFailed,
}

/// Outcome of processing one subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberOutcome {
    Notified { sent: usize, failed: usize },
    NothingNew,
    Skipped(SkipReason),
}

/// Summary of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub subscribers: usize,
    pub skipped: usize,
    pub notified: usize,
    pub failed_sends: usize,
}

impl TickReport {
    fn record(&mut self, outcome: SubscriberOutcome) {
        self.subscribers += 1;
        match outcome {
            SubscriberOutcome::Notified { sent, failed } => {
                self.notified += sent;
                self.failed_sends += failed;
            }
            SubscriberOutcome::NothingNew => {}
            SubscriberOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Marks a subscriber as in flight until dropped
struct InFlightGuard {
    in_flight: Arc<DashSet<i64>>,
    chat_id: i64,
}

impl InFlightGuard {
    fn acquire(in_flight: &Arc<DashSet<i64>>, chat_id: i64) -> Option<Self> {
        in_flight.insert(chat_id).then(|| Self {
            in_flight: Arc::clone(in_flight),
            chat_id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.chat_id);
    }
}

#[derive(Clone)]
pub struct ListingPipeline {
    store: Arc<dyn Store>,
    source: Arc<dyn ListingSource>,
    notifier: Arc<dyn Notifier>,
    config: Arc<PipelineConfig>,
    in_flight: Arc<DashSet<i64>>,
    /// Shared by every tick, so overlapping ticks stay within the limit together
    permits: Arc<Semaphore>,
}

impl ListingPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn ListingSource>,
        notifier: Arc<dyn Notifier>,
        config: PipelineConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_parallel_subscribers.max(1)));
        Self {
            store,
            source,
            notifier,
            config: Arc::new(config),
            in_flight: Arc::new(DashSet::new()),
            permits,
        }
    }

    /// Process every current subscriber once. At most
    /// `max_parallel_subscribers` are processed at a time across all running ticks.
    pub async fn run_tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let subscribers = match self.store.list_subscribers().await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                error!(error = %e, "Failed to list subscribers, skipping tick");
                return report;
            }
        };
        debug!(count = subscribers.len(), "Starting listing tick");

        let mut tasks = JoinSet::new();

        for chat_id in subscribers {
            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "Subscriber semaphore closed");
                    break;
                }
            };
            let pipeline = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                pipeline.process_subscriber(chat_id).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!(error = %e, "Subscriber task panicked");
                    report.record(SubscriberOutcome::Skipped(SkipReason::StoreFailed));
                }
            }
        }

        report
    }

    /// Run the whole pipeline for one subscriber.
    ///
    /// Any fetch or store failure abandons this subscriber for the current tick
    /// without affecting the others.
    pub async fn process_subscriber(&self, chat_id: i64) -> SubscriberOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, chat_id) else {
            debug!(user_id = chat_id, "Previous tick still running, skipping");
            return SubscriberOutcome::Skipped(SkipReason::InFlight);
        };

        let listings = match timeout(
            self.config.fetch_timeout,
            self.source.fetch_listings(&self.config.query),
        )
        .await
        {
            Ok(Ok(listings)) if listings.is_empty() => {
                info!(user_id = chat_id, "Listing source returned nothing");
                return SubscriberOutcome::Skipped(SkipReason::EmptyFetch);
            }
            Ok(Ok(listings)) => listings,
            Ok(Err(e)) => {
                warn!(user_id = chat_id, error = %e, "Failed to fetch listings");
                return SubscriberOutcome::Skipped(SkipReason::FetchFailed);
            }
            Err(_) => {
                let e = FetchError::Timeout(self.config.fetch_timeout.as_secs());
                warn!(user_id = chat_id, error = %e, "Failed to fetch listings");
                return SubscriberOutcome::Skipped(SkipReason::FetchFailed);
            }
        };

        let criteria = match self.store.get_filter(chat_id).await {
            Ok(criteria) => criteria,
            Err(e) => {
                error!(user_id = chat_id, error = %e, "Failed to read filter criteria");
                return SubscriberOutcome::Skipped(SkipReason::StoreFailed);
            }
        };

        let matching = apply_filter(normalize_listings(listings), criteria.as_ref());
        let novel = match self.select_novel(chat_id, matching).await {
            Ok(novel) => novel,
            Err(e) => {
                error!(user_id = chat_id, error = %e, "Failed to read listing history");
                return SubscriberOutcome::Skipped(SkipReason::StoreFailed);
            }
        };

        if !novel.is_empty() {
            let ids: Vec<String> = novel
                .iter()
                .map(|n| n.listing.external_id.clone())
                .collect();
            if let Err(e) = self.store.record_seen(chat_id, &ids, Utc::now()).await {
                error!(user_id = chat_id, error = %e, "Failed to record seen listings");
                return SubscriberOutcome::Skipped(SkipReason::StoreFailed);
            }
        }

        // Recorded rows stay recorded; pruning problems must not block delivery
        if let Err(e) = self
            .store
            .prune_history(chat_id, &self.config.retention, Utc::now())
            .await
        {
            warn!(user_id = chat_id, error = %e, "Failed to prune listing history");
        }

        if novel.is_empty() {
            debug!(user_id = chat_id, "No new listings");
            return SubscriberOutcome::NothingNew;
        }

        let (sent, failed) = self.notify(chat_id, &novel).await;
        info!(user_id = chat_id, sent, failed, "Delivered new listings");
        SubscriberOutcome::Notified { sent, failed }
    }

    /// Drop batch duplicates and listings already in the subscriber's history
    async fn select_novel(
        &self,
        chat_id: i64,
        listings: Vec<NormalizedListing>,
    ) -> Result<Vec<NormalizedListing>> {
        let mut batch_ids = HashSet::new();
        let unique: Vec<NormalizedListing> = listings
            .into_iter()
            .filter(|n| batch_ids.insert(n.listing.external_id.clone()))
            .collect();

        let ids: Vec<String> = unique
            .iter()
            .map(|n| n.listing.external_id.clone())
            .collect();
        let seen = self.store.seen_ids(chat_id, &ids).await?;

        Ok(unique
            .into_iter()
            .filter(|n| !seen.contains(&n.listing.external_id))
            .collect())
    }

    async fn notify(&self, chat_id: i64, listings: &[NormalizedListing]) -> (usize, usize) {
        let language = Some(self.config.notification_language.as_str());
        let mut sent = 0;
        let mut failed = 0;

        for normalized in listings {
            let text = format_listing_message(&normalized.listing, language);
            match timeout(
                self.config.send_timeout,
                self.notifier.send_message(chat_id, &text),
            )
            .await
            {
                Ok(Ok(())) => sent += 1,
                Ok(Err(e)) => {
                    warn!(
                        user_id = chat_id,
                        listing_id = %normalized.listing.external_id,
                        error = %e,
                        "Failed to send notification"
                    );
                    failed += 1;
                }
                Err(_) => {
                    warn!(
                        user_id = chat_id,
                        listing_id = %normalized.listing.external_id,
                        timeout_secs = self.config.send_timeout.as_secs(),
                        "Notification send timed out"
                    );
                    failed += 1;
                }
            }
        }

        (sent, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard_releases_on_drop() {
        let in_flight = Arc::new(DashSet::new());
        let guard = InFlightGuard::acquire(&in_flight, 7);
        assert!(guard.is_some());
        assert!(InFlightGuard::acquire(&in_flight, 7).is_none());
        drop(guard);
        assert!(InFlightGuard::acquire(&in_flight, 7).is_some());
    }

    #[test]
    fn test_report_counts_outcomes() {
        let mut report = TickReport::default();
        report.record(SubscriberOutcome::Notified { sent: 2, failed: 1 });
        report.record(SubscriberOutcome::NothingNew);
        report.record(SubscriberOutcome::Skipped(SkipReason::FetchFailed));
        assert_eq!(
            report,
            TickReport {
                subscribers: 3,
                skipped: 1,
                notified: 2,
                failed_sends: 1,
            }
        );
    }
}
