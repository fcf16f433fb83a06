use async_trait::async_trait;
use batch_pipeline_common::{
    message::{BatchTaskDetail, ChunkInfo, ChunkProof, ProverTaskSchema},
    status::ProofType,
};

use super::{BaseCollector, CollectError, ProverTaskCollector, parse_hash};
use crate::context::ProverContext;

/// Collector for batch proofs, aggregating the proofs of the batch's chunks.
#[derive(Debug, Clone)]
pub struct BatchProverTask {
    base: BaseCollector,
}

impl BatchProverTask {
    pub fn new(base: BaseCollector) -> Self {
        Self { base }
    }

    async fn format_prover_task(&self, task_id: &str) -> Result<ProverTaskSchema, CollectError> {
        let chunks = self.base.db.get_chunks_by_batch_hash(task_id).await?;
        if chunks.is_empty() {
            return Err(CollectError::integrity(ProofType::Batch, task_id, "batch has no chunks"));
        }

        let mut chunk_infos = Vec::with_capacity(chunks.len());
        let mut chunk_proofs = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let blob = chunk.proof.as_deref().ok_or_else(|| {
                CollectError::integrity(
                    ProofType::Batch,
                    task_id,
                    format!("chunk {} has no proof", chunk.hash),
                )
            })?;
            let proof: ChunkProof = serde_json::from_slice(blob).map_err(|e| {
                CollectError::integrity(
                    ProofType::Batch,
                    task_id,
                    format!("unmarshal proof of chunk {}: {}", chunk.hash, e),
                )
            })?;
            chunk_proofs.push(proof);

            chunk_infos.push(ChunkInfo {
                chain_id: self.base.chain_id,
                prev_state_root: parse_hash(
                    ProofType::Batch,
                    task_id,
                    "parent chunk state root",
                    &chunk.parent_chunk_state_root,
                )?,
                post_state_root: parse_hash(
                    ProofType::Batch,
                    task_id,
                    "state root",
                    &chunk.state_root,
                )?,
                withdraw_root: parse_hash(
                    ProofType::Batch,
                    task_id,
                    "withdraw root",
                    &chunk.withdraw_root,
                )?,
                data_hash: parse_hash(ProofType::Batch, task_id, "chunk hash", &chunk.hash)?,
                is_padding: false,
            });
        }

        let proof_data = serde_json::to_string(&BatchTaskDetail {
            chunk_infos,
            chunk_proofs,
        })?;
        Ok(ProverTaskSchema::new(task_id.to_string(), ProofType::Batch, proof_data))
    }
}

#[async_trait]
impl ProverTaskCollector for BatchProverTask {
    fn proof_type(&self) -> ProofType {
        ProofType::Batch
    }

    async fn collect(&self, ctx: &ProverContext) -> Result<Option<ProverTaskSchema>, CollectError> {
        ctx.identity()?;

        let batch_tasks = self.base.db.get_unassigned_batches(1).await?;
        let Some(batch_task) = batch_tasks.into_iter().next() else {
            return Ok(None);
        };

        tracing::info!("start batch proof generation session, id: {}", batch_task.hash);

        if !self.base.assign(ProofType::Batch, &batch_task.hash, ctx).await? {
            return Ok(None);
        }

        let task = self
            .format_prover_task(&batch_task.hash)
            .await
            .inspect_err(|e| {
                tracing::error!("format prover failure, id:{} error:{}", batch_task.hash, e)
            })?;

        Ok(Some(task))
    }
}
