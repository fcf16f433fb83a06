//! Task collectors: pick an unassigned unit, assign it to the requesting
//! prover and build the payload the prover works on.

use std::str::FromStr;

use alloy::primitives::B256;
use async_trait::async_trait;
use batch_pipeline_common::{
    DataBase, StoreError,
    message::ProverTaskSchema,
    models::NewProverTask,
    status::{ProofType, StatusEvent},
};
use chrono::Utc;

use crate::{
    attempt_guard::AttemptGuard,
    context::{MissingIdentity, ProverContext},
};

mod batch;
mod chunk;

pub use batch::BatchProverTask;
pub use chunk::ChunkProverTask;

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error(transparent)]
    MissingIdentity(#[from] MissingIdentity),
    #[error("the {0} task id:{1} check attempts have reach the maximum")]
    AttemptsExceeded(ProofType, String),
    #[error("{proof_type} {hash} is inconsistent: {reason}")]
    DataIntegrity {
        proof_type: ProofType,
        hash: String,
        reason: String,
    },
    #[error("failed to encode task payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CollectError {
    fn integrity(proof_type: ProofType, hash: &str, reason: impl Into<String>) -> Self {
        CollectError::DataIntegrity {
            proof_type,
            hash: hash.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait ProverTaskCollector: Send + Sync {
    fn proof_type(&self) -> ProofType;

    /// Assigns one unit to the calling prover. `Ok(None)` means there is no
    /// work right now.
    async fn collect(&self, ctx: &ProverContext) -> Result<Option<ProverTaskSchema>, CollectError>;
}

/// State shared by the chunk and batch collectors.
#[derive(Debug, Clone)]
pub struct BaseCollector {
    db: DataBase,
    chain_id: u64,
    attempt_guard: AttemptGuard,
}

impl BaseCollector {
    pub fn new(db: DataBase, chain_id: u64, attempt_guard: AttemptGuard) -> Self {
        Self {
            db,
            chain_id,
            attempt_guard,
        }
    }

    /// Moves the unit to `Assigned` and records the assignment in one
    /// transaction. Returns `false` if another request assigned it first.
    async fn assign(
        &self,
        proof_type: ProofType,
        hash: &str,
        ctx: &ProverContext,
    ) -> Result<bool, CollectError> {
        let (public_key, prover_name) = ctx.identity()?;
        let mut tx = self.db.begin().await?;

        if !self
            .attempt_guard
            .check_attempts_exceeded(&mut tx, hash, proof_type)
            .await?
        {
            // Keep the status flip done by the guard.
            tx.commit().await.map_err(StoreError::from)?;
            return Err(CollectError::AttemptsExceeded(proof_type, hash.to_string()));
        }

        if !DataBase::transition_status(&mut tx, proof_type, hash, StatusEvent::Assign).await? {
            tracing::debug!("{} {} was assigned by a concurrent request", proof_type, hash);
            return Ok(false);
        }

        let task = NewProverTask {
            task_id: hash.to_string(),
            task_type: proof_type,
            prover_public_key: public_key.to_string(),
            prover_name: prover_name.to_string(),
            assigned_at: Utc::now(),
        };
        DataBase::set_prover_task(&mut tx, &task).await?;
        tx.commit().await.map_err(StoreError::from)?;

        tracing::info!("{} {} assigned to prover {}", proof_type, hash, prover_name);
        Ok(true)
    }
}

fn parse_hash(
    proof_type: ProofType,
    hash: &str,
    field: &str,
    value: &str,
) -> Result<B256, CollectError> {
    B256::from_str(value).map_err(|e| {
        CollectError::integrity(proof_type, hash, format!("invalid {field} {value}: {e}"))
    })
}
