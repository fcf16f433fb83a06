use chrono::{DateTime, Utc};

use crate::status::{FailureType, ProofType, ProverTaskStatus, RollupStatus};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Batch {
    pub hash: String,
    pub batch_index: i64,
    /// Hash preceding the first block of this batch.
    pub parent_hash: String,
    pub status: RollupStatus,
    pub commit_tx_hash: Option<String>,
    pub finalize_tx_hash: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Chunk {
    pub hash: String,
    pub batch_hash: String,
    pub chunk_index: i64,
    pub start_block_number: i64,
    pub end_block_number: i64,
    pub parent_chunk_state_root: String,
    pub state_root: String,
    pub withdraw_root: String,
    pub status: RollupStatus,
    /// JSON encoded chunk proof, set once proved.
    pub proof: Option<Vec<u8>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProverTask {
    pub id: i64,
    pub task_id: String,
    pub task_type: ProofType,
    pub prover_public_key: String,
    pub prover_name: String,
    pub proving_status: ProverTaskStatus,
    pub failure_type: FailureType,
    pub assigned_at: DateTime<Utc>,
}

/// Assignment record written by the task collector.
#[derive(Debug, Clone)]
pub struct NewProverTask {
    pub task_id: String,
    pub task_type: ProofType,
    pub prover_public_key: String,
    pub prover_name: String,
    pub assigned_at: DateTime<Utc>,
}

/// Batch row as created by the batch proposer.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub hash: String,
    pub batch_index: u64,
    pub parent_hash: String,
}

/// Chunk row as created by the batch proposer.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub hash: String,
    pub batch_hash: String,
    pub chunk_index: u64,
    pub start_block_number: u64,
    pub end_block_number: u64,
    pub parent_chunk_state_root: String,
    pub state_root: String,
    pub withdraw_root: String,
}
