//! # Database Module
//!
//! PostgreSQL persistence for subscribers, filter criteria and delivered-listing history.
//! Every write is a single statement, so Postgres row locking gives per-user
//! serialization while different users proceed in parallel.

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use tracing::{debug, info};

use crate::config::RetentionPolicy;
use crate::listing_model::{FilterCriteria, FilterField, FilterUpdate, SeenListing};
use crate::store::{FilterStore, ListingHistoryStore, SubscriberStore};

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS subscribers (
            chat_id BIGINT PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create subscribers table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS user_filters (
            user_id BIGINT PRIMARY KEY,
            min_price BIGINT,
            max_price BIGINT,
            rooms INTEGER,
            metro TEXT,
            near_metro BOOLEAN,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT price_range_ordered CHECK (
                min_price IS NULL OR max_price IS NULL OR min_price <= max_price
            )
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create user_filters table")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS seen_listings (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL,
            external_id TEXT NOT NULL,
            seen_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (user_id, external_id)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create seen_listings table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS seen_listings_user_recent_idx
         ON seen_listings (user_id, seen_at DESC, id DESC)",
    )
    .execute(pool)
    .await
    .context("Failed to create seen_listings index")?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// Store backed by a PostgreSQL connection pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the schema exists
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        init_database_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SubscriberStore for PgStore {
    async fn add_subscriber(&self, chat_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO subscribers (chat_id) VALUES ($1) ON CONFLICT (chat_id) DO NOTHING",
        )
        .bind(chat_id)
        .execute(&self.pool)
        .await
        .context("Failed to insert subscriber")?;

        debug!(user_id = chat_id, inserted = result.rows_affected(), "Subscriber upserted");
        Ok(result.rows_affected() > 0)
    }

    async fn remove_subscriber(&self, chat_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscribers WHERE chat_id = $1")
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete subscriber")?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_subscribers(&self) -> Result<Vec<i64>> {
        let ids: Vec<(i64,)> = sqlx::query_as("SELECT chat_id FROM subscribers ORDER BY chat_id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list subscribers")?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}

#[async_trait]
impl FilterStore for PgStore {
    async fn get_filter(&self, user_id: i64) -> Result<Option<FilterCriteria>> {
        sqlx::query_as::<_, FilterCriteria>(
            "SELECT min_price, max_price, rooms, metro, near_metro
             FROM user_filters WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read filter criteria")
    }

    async fn update_filter(&self, user_id: i64, update: &FilterUpdate) -> Result<()> {
        let query = match update {
            FilterUpdate::PriceRange {
                min_price,
                max_price,
            } => sqlx::query(
                "INSERT INTO user_filters (user_id, min_price, max_price) VALUES ($1, $2, $3)
                 ON CONFLICT (user_id) DO UPDATE SET
                     min_price = EXCLUDED.min_price,
                     max_price = EXCLUDED.max_price,
                     updated_at = NOW()",
            )
            .bind(user_id)
            .bind(*min_price)
            .bind(*max_price),
            FilterUpdate::Rooms(rooms) => sqlx::query(
                "INSERT INTO user_filters (user_id, rooms) VALUES ($1, $2)
                 ON CONFLICT (user_id) DO UPDATE SET rooms = EXCLUDED.rooms, updated_at = NOW()",
            )
            .bind(user_id)
            .bind(*rooms),
            FilterUpdate::Metro(metro) => sqlx::query(
                "INSERT INTO user_filters (user_id, metro) VALUES ($1, $2)
                 ON CONFLICT (user_id) DO UPDATE SET metro = EXCLUDED.metro, updated_at = NOW()",
            )
            .bind(user_id)
            .bind(metro.clone()),
            FilterUpdate::NearMetro(near) => sqlx::query(
                "INSERT INTO user_filters (user_id, near_metro) VALUES ($1, $2)
                 ON CONFLICT (user_id) DO UPDATE SET
                     near_metro = EXCLUDED.near_metro,
                     updated_at = NOW()",
            )
            .bind(user_id)
            .bind(*near),
        };

        query
            .execute(&self.pool)
            .await
            .context("Failed to upsert filter criteria")?;
        Ok(())
    }

    async fn reset_filter_field(&self, user_id: i64, field: FilterField) -> Result<()> {
        let sql = match field {
            FilterField::Price => {
                "UPDATE user_filters SET min_price = NULL, max_price = NULL, updated_at = NOW()
                 WHERE user_id = $1"
            }
            FilterField::Rooms => {
                "UPDATE user_filters SET rooms = NULL, updated_at = NOW() WHERE user_id = $1"
            }
            FilterField::Metro => {
                "UPDATE user_filters SET metro = NULL, updated_at = NOW() WHERE user_id = $1"
            }
            FilterField::NearMetro => {
                "UPDATE user_filters SET near_metro = NULL, updated_at = NOW() WHERE user_id = $1"
            }
        };

        sqlx::query(sql)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to reset filter field")?;
        Ok(())
    }

    async fn delete_filter(&self, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_filters WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete filter criteria")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ListingHistoryStore for PgStore {
    async fn seen_ids(&self, user_id: i64, external_ids: &[String]) -> Result<HashSet<String>> {
        if external_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT external_id FROM seen_listings
             WHERE user_id = $1 AND external_id = ANY($2)",
        )
        .bind(user_id)
        .bind(external_ids)
        .fetch_all(&self.pool)
        .await
        .context("Failed to read listing history")?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn record_seen(
        &self,
        user_id: i64,
        external_ids: &[String],
        seen_at: DateTime<Utc>,
    ) -> Result<u64> {
        if external_ids.is_empty() {
            return Ok(0);
        }
        // WITH ORDINALITY keeps the batch order in the id sequence
        let result = sqlx::query(
            "INSERT INTO seen_listings (user_id, external_id, seen_at)
             SELECT $1, ids.external_id, $3
             FROM UNNEST($2::TEXT[]) WITH ORDINALITY AS ids(external_id, position)
             ORDER BY ids.position
             ON CONFLICT (user_id, external_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(external_ids)
        .bind(seen_at)
        .execute(&self.pool)
        .await
        .context("Failed to record seen listings")?;
        Ok(result.rows_affected())
    }

    async fn prune_history(
        &self,
        user_id: i64,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut deleted = 0;

        if let Some(cutoff) = policy.age_cutoff(now)? {
            deleted += sqlx::query("DELETE FROM seen_listings WHERE user_id = $1 AND seen_at < $2")
                .bind(user_id)
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .context("Failed to prune history by age")?
                .rows_affected();
        }

        if let Some(cap) = policy.max_per_user {
            deleted += sqlx::query(
                "DELETE FROM seen_listings
                 WHERE user_id = $1 AND id NOT IN (
                     SELECT id FROM seen_listings
                     WHERE user_id = $1
                     ORDER BY seen_at DESC, id DESC
                     LIMIT $2
                 )",
            )
            .bind(user_id)
            .bind(cap as i64)
            .execute(&self.pool)
            .await
            .context("Failed to prune history by count")?
            .rows_affected();
        }

        if deleted > 0 {
            debug!(user_id, deleted, "Pruned listing history");
        }
        Ok(deleted)
    }

    async fn history(&self, user_id: i64) -> Result<Vec<SeenListing>> {
        sqlx::query_as::<_, SeenListing>(
            "SELECT user_id, external_id, seen_at FROM seen_listings
             WHERE user_id = $1
             ORDER BY seen_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to read listing history")
    }
}
