use super::models::{split_annotation, Network, ReleaseRecord};
use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

/// Reported by [`EscrowStore::insert_if_absent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    pub already_existed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueBoundary {
    /// Earliest due_at in the store
    Next,
    /// Latest due_at in the store
    Last,
}

/// Sentinel returned by [`EscrowStore::due_boundary`] when the store is empty
pub const NO_DUE_RECORDS: i64 = -1;

/// Durable store of pending release records.
///
/// All key lookups compare on the annotation-stripped base identity, so a
/// caller never needs to know whether a record carries an embedded memo.
/// Every operation is a single atomic statement; records are independent and
/// no multi-record transactions are required.
#[async_trait]
pub trait EscrowStore: Send + Sync {
    /// Idempotent insert. Duplicate keys are a no-op reported through
    /// `already_existed`, never an error.
    async fn insert_if_absent(&self, record: ReleaseRecord) -> AppResult<InsertOutcome>;

    /// All records for an owner on one network, due_at descending
    async fn find_by_account(
        &self,
        identity: &str,
        network: Network,
    ) -> AppResult<Vec<ReleaseRecord>>;

    /// Records with `from <= due_at < to`, due_at descending
    async fn find_due(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<ReleaseRecord>>;

    /// Returns the number of records removed
    async fn delete(&self, identity: &str, sequence: i64, network: Network) -> AppResult<u64>;

    async fn exists(&self, identity: &str, sequence: i64, network: Network) -> AppResult<bool>;

    async fn count(&self) -> AppResult<i64>;

    /// Earliest or latest due timestamp in epoch milliseconds, or
    /// [`NO_DUE_RECORDS`] when the store is empty
    async fn due_boundary(&self, direction: DueBoundary) -> AppResult<i64>;
}

/// Postgres-backed store
pub struct PgEscrowStore {
    pool: PgPool,
}

impl PgEscrowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EscrowStore for PgEscrowStore {
    async fn insert_if_absent(&self, record: ReleaseRecord) -> AppResult<InsertOutcome> {
        debug!(
            "Saving release record {}#{} ({})",
            record.base_identity(),
            record.sequence,
            record.network
        );

        let result = sqlx::query(
            r#"
            INSERT INTO release_records (identity, identity_base, sequence, due_at, network)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (identity_base, sequence, network) DO NOTHING
            "#,
        )
        .bind(&record.identity)
        .bind(record.base_identity())
        .bind(record.sequence)
        .bind(record.due_at)
        .bind(record.network)
        .execute(&self.pool)
        .await?;

        Ok(InsertOutcome {
            already_existed: result.rows_affected() == 0,
        })
    }

    async fn find_by_account(
        &self,
        identity: &str,
        network: Network,
    ) -> AppResult<Vec<ReleaseRecord>> {
        let records = sqlx::query_as::<_, ReleaseRecord>(
            r#"
            SELECT identity, sequence, due_at, network
            FROM release_records
            WHERE identity_base = $1 AND network = $2
            ORDER BY due_at DESC
            "#,
        )
        .bind(split_annotation(identity).0)
        .bind(network)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn find_due(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<ReleaseRecord>> {
        let records = sqlx::query_as::<_, ReleaseRecord>(
            r#"
            SELECT identity, sequence, due_at, network
            FROM release_records
            WHERE due_at >= $1 AND due_at < $2
            ORDER BY due_at DESC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn delete(&self, identity: &str, sequence: i64, network: Network) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM release_records
            WHERE identity_base = $1 AND sequence = $2 AND network = $3
            "#,
        )
        .bind(split_annotation(identity).0)
        .bind(sequence)
        .bind(network)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn exists(&self, identity: &str, sequence: i64, network: Network) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM release_records
                WHERE identity_base = $1 AND sequence = $2 AND network = $3
            )
            "#,
        )
        .bind(split_annotation(identity).0)
        .bind(sequence)
        .bind(network)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn count(&self) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM release_records")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn due_boundary(&self, direction: DueBoundary) -> AppResult<i64> {
        let query = match direction {
            DueBoundary::Next => "SELECT due_at FROM release_records ORDER BY due_at ASC LIMIT 1",
            DueBoundary::Last => "SELECT due_at FROM release_records ORDER BY due_at DESC LIMIT 1",
        };

        let boundary = sqlx::query_scalar::<_, DateTime<Utc>>(query)
            .fetch_optional(&self.pool)
            .await?;

        Ok(boundary.map_or(NO_DUE_RECORDS, |t| t.timestamp_millis()))
    }
}

/// In-memory store with the same contract as [`PgEscrowStore`].
///
/// Backs the test suites only, so it is compiled out of release builds.
/// Single-statement atomicity holds because every operation takes the write
/// lock for its full duration.
#[cfg(test)]
pub struct MemoryEscrowStore {
    records: tokio::sync::RwLock<Vec<ReleaseRecord>>,
}

#[cfg(test)]
impl MemoryEscrowStore {
    pub fn new() -> Self {
        Self {
            records: tokio::sync::RwLock::new(Vec::new()),
        }
    }
}

#[cfg(test)]
impl Default for MemoryEscrowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
fn same_key(record: &ReleaseRecord, identity_base: &str, sequence: i64, network: Network) -> bool {
    record.base_identity() == identity_base
        && record.sequence == sequence
        && record.network == network
}

#[cfg(test)]
#[async_trait]
impl EscrowStore for MemoryEscrowStore {
    async fn insert_if_absent(&self, record: ReleaseRecord) -> AppResult<InsertOutcome> {
        let mut records = self.records.write().await;
        let already_existed = records
            .iter()
            .any(|r| same_key(r, record.base_identity(), record.sequence, record.network));

        if !already_existed {
            records.push(record);
        }

        Ok(InsertOutcome { already_existed })
    }

    async fn find_by_account(
        &self,
        identity: &str,
        network: Network,
    ) -> AppResult<Vec<ReleaseRecord>> {
        let base = split_annotation(identity).0;
        let records = self.records.read().await;
        let mut matched: Vec<ReleaseRecord> = records
            .iter()
            .filter(|r| r.base_identity() == base && r.network == network)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.due_at.cmp(&a.due_at));
        Ok(matched)
    }

    async fn find_due(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<ReleaseRecord>> {
        let records = self.records.read().await;
        let mut due: Vec<ReleaseRecord> = records
            .iter()
            .filter(|r| r.due_at >= from && r.due_at < to)
            .cloned()
            .collect();
        due.sort_by(|a, b| b.due_at.cmp(&a.due_at));
        Ok(due)
    }

    async fn delete(&self, identity: &str, sequence: i64, network: Network) -> AppResult<u64> {
        let base = split_annotation(identity).0;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !same_key(r, base, sequence, network));
        Ok((before - records.len()) as u64)
    }

    async fn exists(&self, identity: &str, sequence: i64, network: Network) -> AppResult<bool> {
        let base = split_annotation(identity).0;
        let records = self.records.read().await;
        Ok(records.iter().any(|r| same_key(r, base, sequence, network)))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.records.read().await.len() as i64)
    }

    async fn due_boundary(&self, direction: DueBoundary) -> AppResult<i64> {
        let records = self.records.read().await;
        let boundary = match direction {
            DueBoundary::Next => records.iter().map(|r| r.due_at).min(),
            DueBoundary::Last => records.iter().map(|r| r.due_at).max(),
        };
        Ok(boundary.map_or(NO_DUE_RECORDS, |t| t.timestamp_millis()))
    }
}
