use std::time::Duration;

use batch_pipeline_common::{
    DataBase, StoreError,
    status::{FailureType, ProverTaskStatus, StatusEvent},
};
use chrono::Utc;
use tokio::sync::watch;

/// Releases units whose prover never answered.
///
/// This also covers assignments whose payload could not be built, since the
/// worker never received anything to answer.
#[derive(Debug, Clone)]
pub struct TimeoutSweeper {
    db: DataBase,
    timeout: Duration,
}

impl TimeoutSweeper {
    pub fn new(db: DataBase, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    /// Returns the number of units released.
    pub async fn sweep(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut released = 0;

        for task in self.db.get_assigned_prover_tasks().await? {
            let expired = (now - task.assigned_at)
                .to_std()
                .is_ok_and(|age| age >= self.timeout);
            if !expired {
                continue;
            }

            let mut tx = self.db.begin().await?;
            if !DataBase::update_prover_task_status(
                &mut tx,
                task.id,
                ProverTaskStatus::Failed,
                FailureType::Timeout,
            )
            .await?
            {
                // Answered in the meantime.
                continue;
            }
            let moved = DataBase::transition_status(
                &mut tx,
                task.task_type,
                &task.task_id,
                StatusEvent::Release,
            )
            .await?;
            tx.commit().await?;

            tracing::warn!(
                "prover task {} for {} {} timed out on prover {}",
                task.id,
                task.task_type,
                task.task_id,
                task.prover_name
            );
            if moved {
                released += 1;
            }
        }

        Ok(released)
    }

    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep().await {
                        Ok(0) => {}
                        Ok(released) => tracing::info!("Released {} timed out tasks", released),
                        Err(e) => tracing::error!("Failed to sweep timed out tasks: {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("Timeout sweeper stopped");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::B256;
    use batch_pipeline_common::{
        status::{ProofType, RollupStatus},
        test_utils::{chunk_hash, seed_batch},
    };

    use super::*;
    use crate::{
        attempt_guard::AttemptGuard,
        collector::{BaseCollector, ChunkProverTask, CollectError, ProverTaskCollector},
        context::ProverContext,
    };

    #[tokio::test]
    async fn fresh_assignments_are_kept() {
        let db = DataBase::new_in_memory().await.unwrap();
        seed_batch(&db, 1, B256::ZERO, 1..=2).await;
        let collector =
            ChunkProverTask::new(BaseCollector::new(db.clone(), 1, AttemptGuard::new(3)));
        collector.collect(&ProverContext::new("pk", "prover")).await.unwrap().unwrap();

        let sweeper = TimeoutSweeper::new(db.clone(), Duration::from_secs(3600));
        assert_eq!(sweeper.sweep().await.unwrap(), 0);
        assert_eq!(
            db.get_status(ProofType::Chunk, &chunk_hash(1, 0)).await.unwrap(),
            Some(RollupStatus::Assigned)
        );
    }

    #[tokio::test]
    async fn expired_assignments_count_towards_the_attempt_bound() {
        let db = DataBase::new_in_memory().await.unwrap();
        seed_batch(&db, 1, B256::ZERO, 1..=2).await;
        let max_attempts = 3;
        let base = BaseCollector::new(db.clone(), 1, AttemptGuard::new(max_attempts));
        let collector = ChunkProverTask::new(base);
        let sweeper = TimeoutSweeper::new(db.clone(), Duration::ZERO);
        let ctx = ProverContext::new("pk", "prover");
        let hash = chunk_hash(1, 0);

        for _ in 0..max_attempts {
            assert!(collector.collect(&ctx).await.unwrap().is_some());
            assert_eq!(sweeper.sweep().await.unwrap(), 1);
        }

        let err = collector.collect(&ctx).await.unwrap_err();
        assert!(matches!(err, CollectError::AttemptsExceeded(ProofType::Chunk, _)));
        assert_eq!(
            db.get_status(ProofType::Chunk, &hash).await.unwrap(),
            Some(RollupStatus::Failed)
        );
        assert!(collector.collect(&ctx).await.unwrap().is_none());

        let tasks = db.get_prover_tasks(&hash, ProofType::Chunk).await.unwrap();
        assert_eq!(tasks.len(), 3);
        assert!(tasks.iter().all(|task| task.failure_type == FailureType::Timeout));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let db = DataBase::new_in_memory().await.unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(
            TimeoutSweeper::new(db, Duration::from_secs(60)).run(Duration::from_millis(10), rx),
        );
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
