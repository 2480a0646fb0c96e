//! # Store Module
//!
//! Persistence contracts shared by the conversation and the listing pipeline,
//! plus a process-local implementation.
//!
//! Every operation is keyed by the chat identifier and is atomic on its own:
//! writes for different users never block each other, writes for the same user
//! are serialized.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};

use crate::config::RetentionPolicy;
use crate::listing_model::{FilterCriteria, FilterField, FilterUpdate, SeenListing};

/// Chats enrolled for listing notifications
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    /// Idempotent insert; returns `true` when the chat was not subscribed before
    async fn add_subscriber(&self, chat_id: i64) -> Result<bool>;
    /// Returns `true` when a subscription was removed
    async fn remove_subscriber(&self, chat_id: i64) -> Result<bool>;
    async fn list_subscribers(&self) -> Result<Vec<i64>>;
}

/// Per-user filter criteria
#[async_trait]
pub trait FilterStore: Send + Sync {
    async fn get_filter(&self, user_id: i64) -> Result<Option<FilterCriteria>>;
    /// Upsert one field group, creating the record if needed
    async fn update_filter(&self, user_id: i64, update: &FilterUpdate) -> Result<()>;
    /// Clear one field group; a missing record is left missing
    async fn reset_filter_field(&self, user_id: i64, field: FilterField) -> Result<()>;
    /// Delete the whole record; returns `true` when one existed
    async fn delete_filter(&self, user_id: i64) -> Result<bool>;
}

/// Listings already delivered to each user
#[async_trait]
pub trait ListingHistoryStore: Send + Sync {
    /// Subset of `external_ids` already recorded for the user
    async fn seen_ids(&self, user_id: i64, external_ids: &[String]) -> Result<HashSet<String>>;
    /// Insert-many; already recorded ids are ignored. Returns the number of new rows.
    async fn record_seen(
        &self,
        user_id: i64,
        external_ids: &[String],
        seen_at: DateTime<Utc>,
    ) -> Result<u64>;
    /// Apply the retention policy to one user's history. Returns the number of deleted rows.
    async fn prune_history(
        &self,
        user_id: i64,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<u64>;
    /// Rows for one user, most recent first
    async fn history(&self, user_id: i64) -> Result<Vec<SeenListing>>;
}

/// Everything the bot needs from persistence
pub trait Store: SubscriberStore + FilterStore + ListingHistoryStore {}

impl<T: SubscriberStore + FilterStore + ListingHistoryStore> Store for T {}

/// Reject criteria that break the price ordering invariant
pub fn validate_criteria(criteria: &FilterCriteria) -> Result<()> {
    if let (Some(min), Some(max)) = (criteria.min_price, criteria.max_price) {
        if min > max {
            bail!("min_price {min} is greater than max_price {max}");
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct HistoryRow {
    external_id: String,
    seen_at: DateTime<Utc>,
    /// Insertion order, breaks ties between equal timestamps
    seq: u64,
}

/// Process-local store
///
/// Each user's rows live in their own `DashMap` entry, so the entry lock gives
/// per-user serialization without a global lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    subscribers: DashSet<i64>,
    filters: DashMap<i64, FilterCriteria>,
    history: DashMap<i64, Vec<HistoryRow>>,
    next_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriberStore for MemoryStore {
    async fn add_subscriber(&self, chat_id: i64) -> Result<bool> {
        Ok(self.subscribers.insert(chat_id))
    }

    async fn remove_subscriber(&self, chat_id: i64) -> Result<bool> {
        Ok(self.subscribers.remove(&chat_id).is_some())
    }

    async fn list_subscribers(&self) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = self.subscribers.iter().map(|id| *id).collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[async_trait]
impl FilterStore for MemoryStore {
    async fn get_filter(&self, user_id: i64) -> Result<Option<FilterCriteria>> {
        Ok(self.filters.get(&user_id).map(|entry| entry.value().clone()))
    }

    async fn update_filter(&self, user_id: i64, update: &FilterUpdate) -> Result<()> {
        match self.filters.entry(user_id) {
            Entry::Occupied(mut occupied) => {
                let mut updated = occupied.get().clone();
                update.apply_to(&mut updated);
                validate_criteria(&updated)?;
                occupied.insert(updated);
            }
            Entry::Vacant(vacant) => {
                let mut created = FilterCriteria::default();
                update.apply_to(&mut created);
                validate_criteria(&created)?;
                vacant.insert(created);
            }
        }
        Ok(())
    }

    async fn reset_filter_field(&self, user_id: i64, field: FilterField) -> Result<()> {
        if let Some(mut entry) = self.filters.get_mut(&user_id) {
            entry.clear(field);
        }
        Ok(())
    }

    async fn delete_filter(&self, user_id: i64) -> Result<bool> {
        Ok(self.filters.remove(&user_id).is_some())
    }
}

#[async_trait]
impl ListingHistoryStore for MemoryStore {
    async fn seen_ids(&self, user_id: i64, external_ids: &[String]) -> Result<HashSet<String>> {
        let Some(rows) = self.history.get(&user_id) else {
            return Ok(HashSet::new());
        };
        let wanted: HashSet<&str> = external_ids.iter().map(String::as_str).collect();
        Ok(rows
            .iter()
            .filter(|row| wanted.contains(row.external_id.as_str()))
            .map(|row| row.external_id.clone())
            .collect())
    }

    async fn record_seen(
        &self,
        user_id: i64,
        external_ids: &[String],
        seen_at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut rows = self.history.entry(user_id).or_default();
        let mut inserted = 0;
        for external_id in external_ids {
            if rows.iter().any(|row| &row.external_id == external_id) {
                continue;
            }
            rows.push(HistoryRow {
                external_id: external_id.clone(),
                seen_at,
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn prune_history(
        &self,
        user_id: i64,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let cutoff = policy.age_cutoff(now)?;
        let Some(mut rows) = self.history.get_mut(&user_id) else {
            return Ok(0);
        };
        let before = rows.len();

        if let Some(cutoff) = cutoff {
            rows.retain(|row| row.seen_at >= cutoff);
        }
        if let Some(cap) = policy.max_per_user {
            rows.sort_by(|a, b| b.seen_at.cmp(&a.seen_at).then(b.seq.cmp(&a.seq)));
            rows.truncate(cap);
        }

        Ok((before - rows.len()) as u64)
    }

    async fn history(&self, user_id: i64) -> Result<Vec<SeenListing>> {
        let Some(rows) = self.history.get(&user_id) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<HistoryRow> = rows.value().clone();
        rows.sort_by(|a, b| b.seen_at.cmp(&a.seen_at).then(b.seq.cmp(&a.seq)));
        Ok(rows
            .into_iter()
            .map(|row| SeenListing {
                user_id,
                external_id: row.external_id,
                seen_at: row.seen_at,
            })
            .collect())
    }
}
