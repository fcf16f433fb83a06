use std::{str::FromStr, sync::Arc};

use alloy::primitives::{Address, B256, U256};
use batch_pipeline_common::{
    DataBase, StoreError,
    status::{RollupStatus, StatusEvent},
};
use dashmap::DashMap;
use tokio::{
    sync::{mpsc, watch},
    time::{Duration, interval},
};

use crate::{
    commit::{CommitError, commit_tx_id, committed_pack},
    sender::{Confirmation, SenderError, TxSender},
};

#[derive(Debug, thiserror::Error)]
pub enum RelayerError {
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Sender(#[from] SenderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Commits proved batches to the L1 rollup contract.
pub struct Layer2Relayer {
    db: DataBase,
    sender: Arc<dyn TxSender>,
    rollup_contract: Address,
    /// Commit tx id -> batch hash, for commits awaiting confirmation.
    /// Rebuilt from the `Committing` batches on recovery.
    processing_commitment: Arc<DashMap<String, String>>,
    recovery_page_size: u32,
}

impl Layer2Relayer {
    pub fn new(
        db: DataBase,
        sender: Arc<dyn TxSender>,
        rollup_contract: Address,
        recovery_page_size: u32,
    ) -> Self {
        Self {
            db,
            sender,
            rollup_contract,
            processing_commitment: Arc::new(DashMap::new()),
            recovery_page_size,
        }
    }

    /// Sends the commit of the lowest pending batch, if any. Returns the hash
    /// of the batch that was sent.
    pub async fn process_pending_batches(&self) -> Result<Option<String>, RelayerError> {
        let Some(hash) = self.db.get_pending_batches(1).await?.into_iter().next() else {
            return Ok(None);
        };

        let (batch, data) = committed_pack(&self.db, &hash).await?;
        let tx_id = commit_tx_id(&hash);
        let tx_hash = match self
            .sender
            .send_transaction(&tx_id, self.rollup_contract, U256::ZERO, data)
            .await
        {
            Ok(tx_hash) => {
                tracing::info!(
                    "commitBatch sent for batch {} (index {}): {}",
                    hash,
                    batch.batch_index,
                    tx_hash
                );
                tx_hash
            }
            Err(SenderError::NoAvailableAccount) => {
                tracing::debug!("No relayer account available for batch {}", hash);
                return Ok(None);
            }
            // Sent on an earlier tick whose status update did not land.
            Err(SenderError::DuplicateId { tx_hash, .. }) => {
                tracing::warn!("Commit of batch {} already in flight: {}", hash, tx_hash);
                tx_hash
            }
            Err(e) => return Err(e.into()),
        };

        // Registered first so the confirmation is handled even if the
        // status update below fails.
        self.processing_commitment.insert(tx_id, hash.clone());
        if !self
            .db
            .update_commit_tx_hash_and_rollup_status(
                &hash,
                &tx_hash.to_string(),
                StatusEvent::CommitSent,
            )
            .await?
        {
            tracing::warn!("Batch {} left the proved status while committing", hash);
        }

        Ok(Some(hash))
    }

    /// Resumes every batch stuck in `Committing`, e.g. after a restart.
    ///
    /// The calldata is rebuilt from the stored traces and handed to the
    /// sender's resume path, so nothing is sent twice for a transaction the
    /// node already knows. Returns the number of batches resumed.
    pub async fn recover_pending_commits(&self) -> Result<usize, RelayerError> {
        let mut recovered = 0;
        let mut offset = 0;

        loop {
            let batches = self
                .db
                .get_batches_by_rollup_status(
                    RollupStatus::Committing,
                    self.recovery_page_size,
                    offset,
                )
                .await?;
            let page_len = batches.len();

            for batch in batches {
                match self.resume_commit(&batch.hash, batch.commit_tx_hash.as_deref()).await {
                    Ok(()) => recovered += 1,
                    Err(e) => {
                        tracing::error!("Failed to resume commit of batch {}: {}", batch.hash, e)
                    }
                }
            }

            if page_len < usize::try_from(self.recovery_page_size).unwrap_or(usize::MAX) {
                break;
            }
            offset = offset.saturating_add(self.recovery_page_size);
        }

        Ok(recovered)
    }

    async fn resume_commit(
        &self,
        hash: &str,
        commit_tx_hash: Option<&str>,
    ) -> Result<(), RelayerError> {
        let known_hash = commit_tx_hash
            .and_then(|tx_hash| B256::from_str(tx_hash).ok())
            .unwrap_or_default();

        let (_, data) = committed_pack(&self.db, hash).await?;
        let tx_id = commit_tx_id(hash);
        let tx_hash = self
            .sender
            .load_or_send_tx(known_hash, &tx_id, self.rollup_contract, U256::ZERO, data)
            .await?;

        if tx_hash != known_hash {
            self.db.update_commit_tx_hash(hash, &tx_hash.to_string()).await?;
        }
        self.processing_commitment.insert(tx_id, hash.to_string());
        Ok(())
    }

    pub async fn handle_confirmation(&self, confirmation: Confirmation) -> Result<(), StoreError> {
        let Some((_, hash)) = self.processing_commitment.remove(&confirmation.id) else {
            tracing::warn!(
                "Confirmation for unknown tx {} ({})",
                confirmation.tx_hash,
                confirmation.id
            );
            return Ok(());
        };

        let event = if confirmation.is_successful {
            StatusEvent::CommitConfirmed
        } else {
            StatusEvent::CommitReverted
        };
        let tx_hash = confirmation.tx_hash.to_string();
        let mut applied = self
            .db
            .update_commit_tx_hash_and_rollup_status(&hash, &tx_hash, event)
            .await?;
        if !applied
            && self
                .db
                .update_commit_tx_hash_and_rollup_status(&hash, &tx_hash, StatusEvent::CommitSent)
                .await?
        {
            // The batch was still proved: its CommitSent update was lost.
            applied = self
                .db
                .update_commit_tx_hash_and_rollup_status(&hash, &tx_hash, event)
                .await?;
        }

        if applied {
            tracing::info!("Batch {} commit {:?}: {}", hash, event, confirmation.tx_hash);
        } else {
            tracing::warn!(
                "Batch {} was not committing when {} confirmed",
                hash,
                confirmation.tx_hash
            );
        }
        Ok(())
    }

    async fn recover(&self) {
        match self.recover_pending_commits().await {
            Ok(0) => {}
            Ok(recovered) => tracing::info!("Resumed {} pending commits", recovered),
            Err(e) => tracing::error!("Failed to recover pending commits: {}", e),
        }
    }

    pub async fn run(
        self,
        commit_interval: Duration,
        recovery_interval: Duration,
        mut confirmations: mpsc::UnboundedReceiver<Confirmation>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        self.recover().await;

        let mut commit_ticker = interval(commit_interval);
        let mut recovery_ticker = interval(recovery_interval);
        // The first tick completes immediately; recovery just ran.
        recovery_ticker.tick().await;

        loop {
            tokio::select! {
                _ = recovery_ticker.tick() => self.recover().await,
                _ = commit_ticker.tick() => {
                    if let Err(e) = self.process_pending_batches().await {
                        tracing::error!("Failed to process pending batches: {}", e);
                    }
                }
                Some(confirmation) = confirmations.recv() => {
                    if let Err(e) = self.handle_confirmation(confirmation).await {
                        tracing::error!("Failed to handle confirmation: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("Relayer stopped");
                    break;
                }
            }
        }
    }
}
