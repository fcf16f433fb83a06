#[cfg(any(test, feature = "test-utils"))]
use std::str::FromStr;

use std::time::Duration;

use chrono::Utc;
use sqlx::{
    Sqlite, SqliteConnection, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};

use crate::{
    error::StoreError,
    models::{Batch, Chunk, NewBatch, NewChunk, NewProverTask, ProverTask},
    status::{FailureType, ProofType, ProverTaskStatus, RollupStatus, StatusEvent},
    trace::BlockTrace,
};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS batch (
        hash                TEXT PRIMARY KEY,
        batch_index         INTEGER NOT NULL UNIQUE,
        parent_hash         TEXT NOT NULL,
        status              INTEGER NOT NULL,
        commit_tx_hash      TEXT,
        finalize_tx_hash    TEXT,
        proof               BLOB,
        created_at          TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_batch_status ON batch(status);

    CREATE TABLE IF NOT EXISTS chunk (
        hash                    TEXT PRIMARY KEY,
        batch_hash              TEXT NOT NULL,
        chunk_index             INTEGER NOT NULL,
        start_block_number      INTEGER NOT NULL,
        end_block_number        INTEGER NOT NULL,
        parent_chunk_state_root TEXT NOT NULL,
        state_root              TEXT NOT NULL,
        withdraw_root           TEXT NOT NULL,
        status                  INTEGER NOT NULL,
        proof                   BLOB
    );
    CREATE INDEX IF NOT EXISTS idx_chunk_batch_hash ON chunk(batch_hash);
    CREATE INDEX IF NOT EXISTS idx_chunk_status ON chunk(status);

    CREATE TABLE IF NOT EXISTS block_trace (
        number      INTEGER PRIMARY KEY,
        hash        TEXT NOT NULL,
        batch_hash  TEXT NOT NULL,
        chunk_hash  TEXT NOT NULL,
        trace       TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_block_trace_batch_hash ON block_trace(batch_hash);
    CREATE INDEX IF NOT EXISTS idx_block_trace_chunk_hash ON block_trace(chunk_hash);

    CREATE TABLE IF NOT EXISTS prover_task (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id             TEXT NOT NULL,
        task_type           INTEGER NOT NULL,
        prover_public_key   TEXT NOT NULL,
        prover_name         TEXT NOT NULL,
        proving_status      INTEGER NOT NULL,
        failure_type        INTEGER NOT NULL,
        assigned_at         TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_prover_task_task ON prover_task(task_id, task_type);
    CREATE INDEX IF NOT EXISTS idx_prover_task_status ON prover_task(proving_status);
"#;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const BATCH_COLUMNS: &str =
    "hash, batch_index, parent_hash, status, commit_tx_hash, finalize_tx_hash";

const CHUNK_COLUMNS: &str = "hash, batch_hash, chunk_index, start_block_number, end_block_number, \
     parent_chunk_state_root, state_root, withdraw_root, status, proof";

/// Handle to the pipeline store.
///
/// Reads go straight to the pool. Operations that must be atomic with other
/// writes are associated functions taking a connection, so callers can run
/// them on a transaction obtained from [`DataBase::begin`].
#[derive(Debug, Clone)]
pub struct DataBase {
    pool: SqlitePool,
}

impl DataBase {
    pub async fn new(db_filename: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .filename(db_filename)
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Single-connection in-memory store.
    #[cfg(any(test, feature = "test-utils"))]
    pub async fn new_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Starts a write transaction.
    ///
    /// The write lock is taken up front (`BEGIN IMMEDIATE`), so a transaction
    /// that reads before it writes waits on the busy timeout instead of
    /// failing with `SQLITE_BUSY` when another connection commits first.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    pub async fn insert_batch(&self, batch: NewBatch) -> Result<(), StoreError> {
        let batch_index = i64::try_from(batch.batch_index)
            .map_err(|_| StoreError::OutOfRange(batch.batch_index))?;

        let result = sqlx::query(
            r#"
            INSERT INTO batch (hash, batch_index, parent_hash, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&batch.hash)
        .bind(batch_index)
        .bind(&batch.parent_hash)
        .bind(RollupStatus::Unassigned)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => tracing::debug!("Batch inserted: hash {} index {}", batch.hash, batch_index),
            Err(sqlx::error::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tracing::error!("Duplicate batch {}, insert skipped", batch.hash);
            }
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }

    pub async fn insert_chunk(&self, chunk: NewChunk) -> Result<(), StoreError> {
        let to_i64 = |value: u64| i64::try_from(value).map_err(|_| StoreError::OutOfRange(value));

        sqlx::query(
            r#"
            INSERT INTO chunk (
                hash, batch_hash, chunk_index, start_block_number, end_block_number,
                parent_chunk_state_root, state_root, withdraw_root, status
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.hash)
        .bind(&chunk.batch_hash)
        .bind(to_i64(chunk.chunk_index)?)
        .bind(to_i64(chunk.start_block_number)?)
        .bind(to_i64(chunk.end_block_number)?)
        .bind(&chunk.parent_chunk_state_root)
        .bind(&chunk.state_root)
        .bind(&chunk.withdraw_root)
        .bind(RollupStatus::Unassigned)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_block_trace(
        &self,
        batch_hash: &str,
        chunk_hash: &str,
        trace: &BlockTrace,
    ) -> Result<(), StoreError> {
        let number = i64::try_from(trace.header.number)
            .map_err(|_| StoreError::OutOfRange(trace.header.number))?;
        let json = serde_json::to_string(trace)
            .map_err(|source| StoreError::MalformedTrace { number, source })?;

        sqlx::query(
            r#"
            INSERT INTO block_trace (number, hash, batch_hash, chunk_hash, trace)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(number)
        .bind(trace.header.hash.to_string())
        .bind(batch_hash)
        .bind(chunk_hash)
        .bind(json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Oldest unassigned batches whose chunks are all proved.
    pub async fn get_unassigned_batches(&self, limit: u32) -> Result<Vec<Batch>, StoreError> {
        let query = format!(
            r#"
            SELECT {BATCH_COLUMNS} FROM batch b
            WHERE b.status = ?
              AND NOT EXISTS (
                  SELECT 1 FROM chunk c WHERE c.batch_hash = b.hash AND c.status <> ?
              )
            ORDER BY b.batch_index ASC
            LIMIT ?
            "#
        );
        Ok(sqlx::query_as(&query)
            .bind(RollupStatus::Unassigned)
            .bind(RollupStatus::Proved)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn get_unassigned_chunks(&self, limit: u32) -> Result<Vec<Chunk>, StoreError> {
        let query = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunk WHERE status = ? \
             ORDER BY start_block_number ASC LIMIT ?"
        );
        Ok(sqlx::query_as(&query)
            .bind(RollupStatus::Unassigned)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn get_chunks_by_batch_hash(
        &self,
        batch_hash: &str,
    ) -> Result<Vec<Chunk>, StoreError> {
        let query = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunk WHERE batch_hash = ? ORDER BY chunk_index ASC"
        );
        Ok(sqlx::query_as(&query)
            .bind(batch_hash)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn get_block_hashes_by_chunk_hash(
        &self,
        chunk_hash: &str,
    ) -> Result<Vec<String>, StoreError> {
        Ok(sqlx::query_scalar(
            "SELECT hash FROM block_trace WHERE chunk_hash = ? ORDER BY number ASC",
        )
        .bind(chunk_hash)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_batch_by_hash(&self, hash: &str) -> Result<Option<Batch>, StoreError> {
        let query = format!("SELECT {BATCH_COLUMNS} FROM batch WHERE hash = ?");
        Ok(sqlx::query_as(&query)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Block traces of a batch in ascending block number.
    pub async fn get_block_traces_by_batch_hash(
        &self,
        batch_hash: &str,
    ) -> Result<Vec<BlockTrace>, StoreError> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT number, trace FROM block_trace WHERE batch_hash = ? ORDER BY number ASC",
        )
        .bind(batch_hash)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(number, trace)| {
                serde_json::from_str(&trace)
                    .map_err(|source| StoreError::MalformedTrace { number, source })
            })
            .collect()
    }

    /// Hashes of proved batches that may be committed now, in index order.
    ///
    /// A proved batch is only eligible while no lower-index batch is still
    /// waiting for a proof, so commitments never skip ahead of the chain.
    pub async fn get_pending_batches(&self, limit: u32) -> Result<Vec<String>, StoreError> {
        Ok(sqlx::query_scalar(
            r#"
            SELECT hash FROM batch
            WHERE status = ?
              AND batch_index < COALESCE(
                  (SELECT MIN(batch_index) FROM batch WHERE status IN (?, ?, ?)),
                  9223372036854775807
              )
            ORDER BY batch_index ASC
            LIMIT ?
            "#,
        )
        .bind(RollupStatus::Proved)
        .bind(RollupStatus::Unassigned)
        .bind(RollupStatus::Assigned)
        .bind(RollupStatus::Failed)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_batches_by_rollup_status(
        &self,
        status: RollupStatus,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Batch>, StoreError> {
        let query = format!(
            "SELECT {BATCH_COLUMNS} FROM batch WHERE status = ? \
             ORDER BY batch_index ASC LIMIT ? OFFSET ?"
        );
        Ok(sqlx::query_as(&query)
            .bind(status)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn get_status(
        &self,
        proof_type: ProofType,
        hash: &str,
    ) -> Result<Option<RollupStatus>, StoreError> {
        let query = format!("SELECT status FROM {} WHERE hash = ?", proof_type.table());
        Ok(sqlx::query_scalar(&query)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Records the commit transaction and applies `event` in one statement.
    /// Returns `false` if the batch was not in a source status of `event`.
    pub async fn update_commit_tx_hash_and_rollup_status(
        &self,
        hash: &str,
        commit_tx_hash: &str,
        event: StatusEvent,
    ) -> Result<bool, StoreError> {
        let query = format!(
            "UPDATE batch SET commit_tx_hash = ?, status = ? WHERE hash = ? AND status IN ({})",
            placeholders(event.sources().len())
        );
        let mut sql = sqlx::query(&query)
            .bind(commit_tx_hash)
            .bind(event.target())
            .bind(hash);
        for status in event.sources() {
            sql = sql.bind(*status);
        }

        Ok(sql.execute(&self.pool).await?.rows_affected() == 1)
    }

    /// Replaces the commit transaction of a batch that is still committing,
    /// e.g. after the original transaction was re-broadcast.
    pub async fn update_commit_tx_hash(
        &self,
        hash: &str,
        commit_tx_hash: &str,
    ) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE batch SET commit_tx_hash = ? WHERE hash = ? AND status = ?")
                .bind(commit_tx_hash)
                .bind(hash)
                .bind(RollupStatus::Committing)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Applies `event` to a chunk or batch. Returns `false` when the unit was
    /// not in one of the event's source statuses, i.e. another actor got
    /// there first.
    pub async fn transition_status(
        conn: &mut SqliteConnection,
        proof_type: ProofType,
        hash: &str,
        event: StatusEvent,
    ) -> Result<bool, StoreError> {
        let query = format!(
            "UPDATE {} SET status = ? WHERE hash = ? AND status IN ({})",
            proof_type.table(),
            placeholders(event.sources().len())
        );
        let mut sql = sqlx::query(&query).bind(event.target()).bind(hash);
        for status in event.sources() {
            sql = sql.bind(*status);
        }

        Ok(sql.execute(&mut *conn).await?.rows_affected() == 1)
    }

    pub async fn update_proof(
        conn: &mut SqliteConnection,
        proof_type: ProofType,
        hash: &str,
        proof: &[u8],
    ) -> Result<(), StoreError> {
        let query = format!("UPDATE {} SET proof = ? WHERE hash = ?", proof_type.table());
        sqlx::query(&query)
            .bind(proof)
            .bind(hash)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn set_prover_task(
        conn: &mut SqliteConnection,
        task: &NewProverTask,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO prover_task (
                task_id, task_type, prover_public_key, prover_name,
                proving_status, failure_type, assigned_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.task_id)
        .bind(task.task_type)
        .bind(&task.prover_public_key)
        .bind(&task.prover_name)
        .bind(ProverTaskStatus::Assigned)
        .bind(FailureType::Undefined)
        .bind(task.assigned_at)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Number of assignments of a unit that did not end in a proof.
    pub async fn count_attempts(
        conn: &mut SqliteConnection,
        task_id: &str,
        task_type: ProofType,
    ) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM prover_task \
             WHERE task_id = ? AND task_type = ? AND proving_status <> ?",
        )
        .bind(task_id)
        .bind(task_type)
        .bind(ProverTaskStatus::Proved)
        .fetch_one(&mut *conn)
        .await?)
    }

    pub async fn get_assigned_prover_task(
        conn: &mut SqliteConnection,
        task_id: &str,
        task_type: ProofType,
        prover_public_key: &str,
    ) -> Result<Option<ProverTask>, StoreError> {
        Ok(sqlx::query_as(
            r#"
            SELECT * FROM prover_task
            WHERE task_id = ? AND task_type = ? AND prover_public_key = ? AND proving_status = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(task_id)
        .bind(task_type)
        .bind(prover_public_key)
        .bind(ProverTaskStatus::Assigned)
        .fetch_optional(&mut *conn)
        .await?)
    }

    pub async fn get_assigned_prover_tasks(&self) -> Result<Vec<ProverTask>, StoreError> {
        Ok(
            sqlx::query_as("SELECT * FROM prover_task WHERE proving_status = ? ORDER BY id ASC")
                .bind(ProverTaskStatus::Assigned)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn get_prover_tasks(
        &self,
        task_id: &str,
        task_type: ProofType,
    ) -> Result<Vec<ProverTask>, StoreError> {
        Ok(sqlx::query_as(
            "SELECT * FROM prover_task WHERE task_id = ? AND task_type = ? ORDER BY id ASC",
        )
        .bind(task_id)
        .bind(task_type)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Closes an assignment record that is still `Assigned`.
    pub async fn update_prover_task_status(
        conn: &mut SqliteConnection,
        id: i64,
        status: ProverTaskStatus,
        failure_type: FailureType,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE prover_task SET proving_status = ?, failure_type = ? \
             WHERE id = ? AND proving_status = ?",
        )
        .bind(status)
        .bind(failure_type)
        .bind(id)
        .bind(ProverTaskStatus::Assigned)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
