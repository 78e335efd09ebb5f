use std::collections::HashMap;

use async_trait::async_trait;
use metrics_core::MetricKind;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tokio_util::sync::CancellationToken;

use crate::engine::{check_cancelled, MetricValue, StorageEngine};
use crate::error::StorageError;

/// Relational storage backend. Tables are created at startup if absent;
/// writes use `ON CONFLICT` upserts so a single round trip both inserts and
/// accumulates.
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn connect(dsn: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(dsn).await?;
        let storage = PostgresStorage { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS gauge (id TEXT PRIMARY KEY, val DOUBLE PRECISION NOT NULL)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS counter (id TEXT PRIMARY KEY, val BIGINT NOT NULL)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Races `future` against cancellation so a dropped context stops the
    /// driver round trip promptly instead of completing silently.
    async fn run_cancellable<T>(
        &self,
        cancel: &CancellationToken,
        future: impl std::future::Future<Output = Result<T, sqlx::Error>>,
    ) -> Result<T, StorageError> {
        check_cancelled(cancel)?;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StorageError::Cancelled),
            result = future => Ok(result?),
        }
    }
}

#[async_trait]
impl StorageEngine for PostgresStorage {
    async fn store(
        &self,
        cancel: &CancellationToken,
        id: &str,
        value: MetricValue,
    ) -> Result<(), StorageError> {
        match value {
            MetricValue::Gauge(v) => {
                self.run_cancellable(
                    cancel,
                    sqlx::query(
                        "INSERT INTO gauge (id, val) VALUES ($1, $2) \
                         ON CONFLICT (id) DO UPDATE SET val = EXCLUDED.val",
                    )
                    .bind(id)
                    .bind(v)
                    .execute(&self.pool),
                )
                .await?;
            }
            MetricValue::Counter(delta) => {
                self.run_cancellable(
                    cancel,
                    sqlx::query(
                        "INSERT INTO counter (id, val) VALUES ($1, $2) \
                         ON CONFLICT (id) DO UPDATE SET val = counter.val + EXCLUDED.val",
                    )
                    .bind(id)
                    .bind(delta)
                    .execute(&self.pool),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn load(
        &self,
        cancel: &CancellationToken,
        kind: MetricKind,
        id: &str,
    ) -> Result<MetricValue, StorageError> {
        match kind {
            MetricKind::Gauge => {
                let row = self
                    .run_cancellable(
                        cancel,
                        sqlx::query("SELECT val FROM gauge WHERE id = $1")
                            .bind(id)
                            .fetch_optional(&self.pool),
                    )
                    .await?;
                row.map(|r| MetricValue::Gauge(r.get::<f64, _>("val")))
                    .ok_or_else(|| StorageError::NotFound { kind: "gauge", id: id.to_string() })
            }
            MetricKind::Counter => {
                let row = self
                    .run_cancellable(
                        cancel,
                        sqlx::query("SELECT val FROM counter WHERE id = $1")
                            .bind(id)
                            .fetch_optional(&self.pool),
                    )
                    .await?;
                row.map(|r| MetricValue::Counter(r.get::<i64, _>("val")))
                    .ok_or_else(|| StorageError::NotFound { kind: "counter", id: id.to_string() })
            }
        }
    }

    async fn load_all_gauge(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, f64>, StorageError> {
        let rows = self
            .run_cancellable(cancel, sqlx::query("SELECT id, val FROM gauge").fetch_all(&self.pool))
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("id"), r.get::<f64, _>("val")))
            .collect())
    }

    async fn load_all_counter(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, i64>, StorageError> {
        let rows = self
            .run_cancellable(cancel, sqlx::query("SELECT id, val FROM counter").fetch_all(&self.pool))
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("id"), r.get::<i64, _>("val")))
            .collect())
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<(), StorageError> {
        self.run_cancellable(cancel, sqlx::query("SELECT 1").execute(&self.pool))
            .await?;
        Ok(())
    }
}
