use batch_pipeline_common::{
    DataBase, StoreError,
    message::{ChunkProof, ProofStatus, SubmitProofMessage},
    status::{FailureType, ProofType, ProverTaskStatus, StatusError, StatusEvent},
};

use crate::context::{MissingIdentity, ProverContext};

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    MissingIdentity(#[from] MissingIdentity),
    #[error(transparent)]
    InvalidProofType(#[from] StatusError),
    #[error("{0} {1} is not assigned to this prover")]
    NotAssigned(ProofType, String),
    #[error("proof missing for {0} {1}")]
    MissingProof(ProofType, String),
    #[error("invalid proof for {proof_type} {hash}: {source}")]
    InvalidProof {
        proof_type: ProofType,
        hash: String,
        source: serde_json::Error,
    },
    #[error("{0} {1} is no longer assigned")]
    StatusConflict(ProofType, String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Applies proving results reported by workers.
#[derive(Debug, Clone)]
pub struct ProofReceiver {
    db: DataBase,
}

impl ProofReceiver {
    pub fn new(db: DataBase) -> Self {
        Self { db }
    }

    pub async fn submit_proof(
        &self,
        ctx: &ProverContext,
        msg: SubmitProofMessage,
    ) -> Result<(), SubmitError> {
        let (public_key, prover_name) = ctx.identity()?;
        let proof_type = ProofType::try_from(msg.proof_type)?;
        let hash = msg.task_id;

        let mut tx = self.db.begin().await?;
        let task = DataBase::get_assigned_prover_task(&mut tx, &hash, proof_type, public_key)
            .await?
            .ok_or_else(|| SubmitError::NotAssigned(proof_type, hash.clone()))?;

        match msg.status {
            ProofStatus::Ok => {
                let proof = msg
                    .proof
                    .ok_or_else(|| SubmitError::MissingProof(proof_type, hash.clone()))?;
                if proof_type == ProofType::Chunk {
                    serde_json::from_str::<ChunkProof>(&proof).map_err(|source| {
                        SubmitError::InvalidProof {
                            proof_type,
                            hash: hash.clone(),
                            source,
                        }
                    })?;
                }

                DataBase::update_prover_task_status(
                    &mut tx,
                    task.id,
                    ProverTaskStatus::Proved,
                    FailureType::Undefined,
                )
                .await?;
                DataBase::update_proof(&mut tx, proof_type, &hash, proof.as_bytes()).await?;
                let accepted = DataBase::transition_status(
                    &mut tx,
                    proof_type,
                    &hash,
                    StatusEvent::ProofAccepted,
                )
                .await?;
                if !accepted {
                    return Err(SubmitError::StatusConflict(proof_type, hash));
                }
                tx.commit().await.map_err(StoreError::from)?;

                tracing::info!("{} {} proved by {}", proof_type, hash, prover_name);
            }
            ProofStatus::Failed => {
                DataBase::update_prover_task_status(
                    &mut tx,
                    task.id,
                    ProverTaskStatus::Failed,
                    FailureType::ProverReported,
                )
                .await?;
                let released =
                    DataBase::transition_status(&mut tx, proof_type, &hash, StatusEvent::Release)
                        .await?;
                if !released {
                    return Err(SubmitError::StatusConflict(proof_type, hash));
                }
                tx.commit().await.map_err(StoreError::from)?;

                tracing::warn!(
                    "{} {} failed on prover {}: {}",
                    proof_type,
                    hash,
                    prover_name,
                    msg.failure_msg.unwrap_or_default()
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::B256;
    use batch_pipeline_common::{
        status::RollupStatus,
        test_utils::{batch_hash, chunk_proof, force_status, seed_batch},
    };

    use super::*;
    use crate::{
        attempt_guard::AttemptGuard,
        collector::{BaseCollector, ChunkProverTask, ProverTaskCollector},
    };

    async fn assigned_chunk(db: &DataBase, ctx: &ProverContext) -> String {
        seed_batch(db, 1, B256::ZERO, 1..=3).await;
        let collector =
            ChunkProverTask::new(BaseCollector::new(db.clone(), 1, AttemptGuard::new(5)));
        collector.collect(ctx).await.unwrap().unwrap().task_id
    }

    fn message(task_id: &str, status: ProofStatus, proof: Option<String>) -> SubmitProofMessage {
        SubmitProofMessage {
            task_id: task_id.to_string(),
            proof_type: ProofType::Chunk.as_u8(),
            status,
            proof,
            failure_msg: None,
        }
    }

    #[tokio::test]
    async fn accepted_proof_marks_unit_proved() {
        let db = DataBase::new_in_memory().await.unwrap();
        let ctx = ProverContext::new("pk", "prover");
        let hash = assigned_chunk(&db, &ctx).await;
        let proof = serde_json::to_string(&chunk_proof(7)).unwrap();

        ProofReceiver::new(db.clone())
            .submit_proof(&ctx, message(&hash, ProofStatus::Ok, Some(proof)))
            .await
            .unwrap();

        assert_eq!(
            db.get_status(ProofType::Chunk, &hash).await.unwrap(),
            Some(RollupStatus::Proved)
        );
        let chunks = db.get_chunks_by_batch_hash(&batch_hash(1)).await.unwrap();
        let stored: ChunkProof =
            serde_json::from_slice(chunks[0].proof.as_deref().unwrap()).unwrap();
        assert_eq!(stored, chunk_proof(7));
        let tasks = db.get_prover_tasks(&hash, ProofType::Chunk).await.unwrap();
        assert_eq!(tasks[0].proving_status, ProverTaskStatus::Proved);
    }

    #[tokio::test]
    async fn reported_failure_releases_unit() {
        let db = DataBase::new_in_memory().await.unwrap();
        let ctx = ProverContext::new("pk", "prover");
        let hash = assigned_chunk(&db, &ctx).await;

        ProofReceiver::new(db.clone())
            .submit_proof(&ctx, message(&hash, ProofStatus::Failed, None))
            .await
            .unwrap();

        assert_eq!(
            db.get_status(ProofType::Chunk, &hash).await.unwrap(),
            Some(RollupStatus::Unassigned)
        );
        let tasks = db.get_prover_tasks(&hash, ProofType::Chunk).await.unwrap();
        assert_eq!(tasks[0].proving_status, ProverTaskStatus::Failed);
        assert_eq!(tasks[0].failure_type, FailureType::ProverReported);
    }

    #[tokio::test]
    async fn other_prover_cannot_submit() {
        let db = DataBase::new_in_memory().await.unwrap();
        let hash = assigned_chunk(&db, &ProverContext::new("pk", "prover")).await;
        let proof = serde_json::to_string(&chunk_proof(7)).unwrap();

        let err = ProofReceiver::new(db.clone())
            .submit_proof(
                &ProverContext::new("other", "intruder"),
                message(&hash, ProofStatus::Ok, Some(proof)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::NotAssigned(ProofType::Chunk, _)));
    }

    #[tokio::test]
    async fn invalid_proof_is_rejected_without_changes() {
        let db = DataBase::new_in_memory().await.unwrap();
        let ctx = ProverContext::new("pk", "prover");
        let hash = assigned_chunk(&db, &ctx).await;

        let err = ProofReceiver::new(db.clone())
            .submit_proof(&ctx, message(&hash, ProofStatus::Ok, Some("{}".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidProof { .. }));
        assert_eq!(
            db.get_status(ProofType::Chunk, &hash).await.unwrap(),
            Some(RollupStatus::Assigned)
        );
    }

    #[tokio::test]
    async fn conflicting_status_rolls_back() {
        let db = DataBase::new_in_memory().await.unwrap();
        let ctx = ProverContext::new("pk", "prover");
        let hash = assigned_chunk(&db, &ctx).await;
        force_status(&db, ProofType::Chunk, &hash, RollupStatus::Failed).await;
        let proof = serde_json::to_string(&chunk_proof(7)).unwrap();

        let err = ProofReceiver::new(db.clone())
            .submit_proof(&ctx, message(&hash, ProofStatus::Ok, Some(proof)))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::StatusConflict(..)));
        let tasks = db.get_prover_tasks(&hash, ProofType::Chunk).await.unwrap();
        assert_eq!(tasks[0].proving_status, ProverTaskStatus::Assigned);
    }
}
