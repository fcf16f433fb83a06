use async_trait::async_trait;
use batch_pipeline_common::{
    message::{ChunkTaskDetail, ProverTaskSchema},
    status::ProofType,
};

use super::{BaseCollector, CollectError, ProverTaskCollector, parse_hash};
use crate::context::ProverContext;

/// Collector for chunk proofs.
#[derive(Debug, Clone)]
pub struct ChunkProverTask {
    base: BaseCollector,
}

impl ChunkProverTask {
    pub fn new(base: BaseCollector) -> Self {
        Self { base }
    }

    async fn format_prover_task(&self, task_id: &str) -> Result<ProverTaskSchema, CollectError> {
        let hashes = self.base.db.get_block_hashes_by_chunk_hash(task_id).await?;
        if hashes.is_empty() {
            return Err(CollectError::integrity(ProofType::Chunk, task_id, "chunk has no blocks"));
        }

        let block_hashes = hashes
            .iter()
            .map(|hash| parse_hash(ProofType::Chunk, task_id, "block hash", hash))
            .collect::<Result<Vec<_>, _>>()?;

        let proof_data = serde_json::to_string(&ChunkTaskDetail { block_hashes })?;
        Ok(ProverTaskSchema::new(task_id.to_string(), ProofType::Chunk, proof_data))
    }
}

#[async_trait]
impl ProverTaskCollector for ChunkProverTask {
    fn proof_type(&self) -> ProofType {
        ProofType::Chunk
    }

    async fn collect(&self, ctx: &ProverContext) -> Result<Option<ProverTaskSchema>, CollectError> {
        ctx.identity()?;

        let chunk_tasks = self.base.db.get_unassigned_chunks(1).await?;
        let Some(chunk_task) = chunk_tasks.into_iter().next() else {
            return Ok(None);
        };

        tracing::info!("start chunk proof generation session, id: {}", chunk_task.hash);

        if !self.base.assign(ProofType::Chunk, &chunk_task.hash, ctx).await? {
            return Ok(None);
        }

        // The assignment stands even if formatting fails; the timeout sweeper
        // releases it later.
        let task = self
            .format_prover_task(&chunk_task.hash)
            .await
            .inspect_err(|e| {
                tracing::error!("format prover failure, id:{} error:{}", chunk_task.hash, e)
            })?;

        Ok(Some(task))
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::B256;
    use batch_pipeline_common::{
        DataBase,
        status::RollupStatus,
        test_utils::{block_hash, chunk_hash, new_batch, new_chunk, seed_batch},
    };

    use super::*;
    use crate::attempt_guard::AttemptGuard;

    fn collector(db: &DataBase) -> ChunkProverTask {
        ChunkProverTask::new(BaseCollector::new(db.clone(), 534352, AttemptGuard::new(3)))
    }

    #[tokio::test]
    async fn no_work_is_not_an_error() {
        let db = DataBase::new_in_memory().await.unwrap();
        let task = collector(&db)
            .collect(&ProverContext::new("pk", "prover"))
            .await
            .unwrap();
        assert!(task.is_none());
    }

    #[tokio::test]
    async fn chunk_payload_lists_blocks_in_order() {
        let db = DataBase::new_in_memory().await.unwrap();
        seed_batch(&db, 1, B256::ZERO, 10..=12).await;

        let task = collector(&db)
            .collect(&ProverContext::new("pk", "prover"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(task.task_id, chunk_hash(1, 0));
        assert_eq!(task.proof_type, 1);
        let detail: ChunkTaskDetail = serde_json::from_str(&task.proof_data).unwrap();
        assert_eq!(detail.block_hashes, vec![block_hash(10), block_hash(11), block_hash(12)]);
    }

    #[tokio::test]
    async fn chunk_without_blocks_stays_assigned() {
        let db = DataBase::new_in_memory().await.unwrap();
        db.insert_batch(new_batch(1, B256::ZERO)).await.unwrap();
        db.insert_chunk(new_chunk(1, 0, 1, 1)).await.unwrap();

        let err = collector(&db)
            .collect(&ProverContext::new("pk", "prover"))
            .await
            .unwrap_err();
        assert!(matches!(err, CollectError::DataIntegrity { .. }));
        assert_eq!(
            db.get_status(ProofType::Chunk, &chunk_hash(1, 0)).await.unwrap(),
            Some(RollupStatus::Assigned)
        );
    }
}
