use std::str::FromStr;

use alloy::{
    primitives::{Address, B256, Bytes, U256},
    sol_types::SolCall,
};
use batch_pipeline_common::{DataBase, StoreError, models::Batch, trace::BlockTrace};

use crate::zk_rollup_binding::IZKRollup::{
    Layer2Batch, Layer2BlockHeader, Layer2Transaction, commitBatchCall,
};

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("batch {0} not found")]
    BatchNotFound(String),
    #[error("batch {0} has no block traces")]
    EmptyTraces(String),
    #[error("block {number} has {txs} transactions but {results} execution results")]
    ExecutionResultsMismatch {
        number: u64,
        txs: usize,
        results: usize,
    },
    #[error("gas used overflows in block {0}")]
    GasOverflow(u64),
    #[error("batch {hash} has an invalid {field}: {value}")]
    InvalidField {
        hash: String,
        field: &'static str,
        value: String,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Logical id of the commit transaction of a batch.
pub fn commit_tx_id(batch_hash: &str) -> String {
    format!("{batch_hash}-commit")
}

/// Builds the ledger representation of a batch from its traces.
///
/// Each block's parent is the hash of the block before it, starting from the
/// batch's own parent hash.
pub fn build_layer2_batch(
    batch: &Batch,
    traces: &[BlockTrace],
) -> Result<Layer2Batch, CommitError> {
    let invalid = |field: &'static str, value: String| CommitError::InvalidField {
        hash: batch.hash.clone(),
        field,
        value,
    };

    let batch_index = u64::try_from(batch.batch_index)
        .map_err(|_| invalid("index", batch.batch_index.to_string()))?;
    let batch_parent = B256::from_str(&batch.parent_hash)
        .map_err(|_| invalid("parent hash", batch.parent_hash.clone()))?;

    let mut parent_hash = batch_parent;
    let mut blocks = Vec::with_capacity(traces.len());
    for trace in traces {
        let number = trace.header.number;
        if trace.execution_results.len() != trace.transactions.len() {
            return Err(CommitError::ExecutionResultsMismatch {
                number,
                txs: trace.transactions.len(),
                results: trace.execution_results.len(),
            });
        }

        let txs = trace
            .transactions
            .iter()
            .map(|tx| Layer2Transaction {
                caller: tx.from,
                nonce: tx.nonce,
                target: tx.to.unwrap_or(Address::ZERO),
                gas: tx.gas,
                gasPrice: tx.gas_price,
                value: tx.value,
                data: tx.data.clone(),
                r: tx.r,
                s: tx.s,
                v: tx.v,
            })
            .collect();

        blocks.push(Layer2BlockHeader {
            blockHash: trace.header.hash,
            parentHash: parent_hash,
            baseFee: trace.header.base_fee.unwrap_or(U256::ZERO),
            stateRoot: trace.state_root,
            blockHeight: number,
            gasUsed: trace.gas_used().ok_or(CommitError::GasOverflow(number))?,
            timestamp: trace.header.timestamp,
            extraData: Bytes::new(),
            txs,
        });

        parent_hash = trace.header.hash;
    }

    Ok(Layer2Batch {
        batchIndex: batch_index,
        parentHash: batch_parent,
        blocks,
    })
}

/// Loads a batch and its traces and returns the `commitBatch` calldata.
///
/// Only persisted data is read, so the same batch always yields the same
/// calldata.
pub async fn committed_pack(
    db: &DataBase,
    batch_hash: &str,
) -> Result<(Batch, Bytes), CommitError> {
    let batch = db
        .get_batch_by_hash(batch_hash)
        .await?
        .ok_or_else(|| CommitError::BatchNotFound(batch_hash.to_string()))?;

    let traces = db.get_block_traces_by_batch_hash(batch_hash).await?;
    if traces.is_empty() {
        return Err(CommitError::EmptyTraces(batch_hash.to_string()));
    }

    let layer2_batch = build_layer2_batch(&batch, &traces)?;
    let data = commitBatchCall { batch: layer2_batch }.abi_encode();
    Ok((batch, Bytes::from(data)))
}

#[cfg(test)]
mod tests {
    use batch_pipeline_common::{
        status::RollupStatus,
        test_utils::{batch_hash, block_trace, new_batch, seed_batch, transaction},
    };

    use super::*;

    fn batch(index: i64, parent_hash: B256) -> Batch {
        Batch {
            hash: batch_hash(u64::try_from(index).unwrap()),
            batch_index: index,
            parent_hash: parent_hash.to_string(),
            status: RollupStatus::Proved,
            commit_tx_hash: None,
            finalize_tx_hash: None,
        }
    }

    #[test]
    fn gas_used_is_summed_per_block() {
        let parent = B256::repeat_byte(0x09);
        let trace = block_trace(10, parent, &[21_000, 50_000, 100_000]);

        let layer2 = build_layer2_batch(&batch(1, parent), &[trace]).unwrap();
        assert_eq!(layer2.blocks[0].gasUsed, 171_000);
        assert_eq!(layer2.blocks[0].txs.len(), 3);
    }

    #[test]
    fn blocks_chain_to_the_previous_block() {
        let parent = B256::repeat_byte(0x09);
        let first = block_trace(10, parent, &[21_000]);
        let second = block_trace(11, first.header.hash, &[21_000]);

        let layer2 = build_layer2_batch(&batch(3, parent), &[first.clone(), second]).unwrap();
        assert_eq!(layer2.batchIndex, 3);
        assert_eq!(layer2.parentHash, parent);
        assert_eq!(layer2.blocks[0].parentHash, parent);
        assert_eq!(layer2.blocks[1].parentHash, first.header.hash);
        assert_eq!(layer2.blocks[1].blockHeight, 11);
    }

    #[test]
    fn optional_fields_use_zero_values() {
        let mut trace = block_trace(10, B256::ZERO, &[53_000]);
        trace.header.base_fee = None;
        trace.transactions[0] = transaction(0, None);

        let layer2 = build_layer2_batch(&batch(1, B256::ZERO), &[trace]).unwrap();
        let block = &layer2.blocks[0];
        assert_eq!(block.baseFee, U256::ZERO);
        assert!(block.extraData.is_empty());
        assert_eq!(block.txs[0].target, Address::ZERO);
        assert_eq!(block.txs[0].caller, Address::repeat_byte(0x11));
    }

    #[test]
    fn missing_execution_results_are_rejected() {
        let mut trace = block_trace(10, B256::ZERO, &[21_000, 21_000]);
        trace.execution_results.pop();

        let err = build_layer2_batch(&batch(1, B256::ZERO), &[trace]).unwrap_err();
        assert!(matches!(
            err,
            CommitError::ExecutionResultsMismatch { number: 10, txs: 2, results: 1 }
        ));
    }

    #[test]
    fn gas_overflow_is_rejected() {
        let trace = block_trace(10, B256::ZERO, &[u64::MAX, 1]);
        let err = build_layer2_batch(&batch(1, B256::ZERO), &[trace]).unwrap_err();
        assert!(matches!(err, CommitError::GasOverflow(10)));
    }

    #[tokio::test]
    async fn calldata_is_rebuilt_identically() {
        let db = DataBase::new_in_memory().await.unwrap();
        seed_batch(&db, 1, B256::repeat_byte(0x09), 1..=3).await;

        let (batch, first) = committed_pack(&db, &batch_hash(1)).await.unwrap();
        let (_, second) = committed_pack(&db, &batch_hash(1)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(&first[..4], commitBatchCall::SELECTOR.as_slice());

        let decoded = commitBatchCall::abi_decode(&first).unwrap();
        assert_eq!(decoded.batch.batchIndex, 1);
        assert_eq!(decoded.batch.blocks.len(), 3);
        assert_eq!(batch.hash, batch_hash(1));
    }

    #[tokio::test]
    async fn batch_without_traces_is_rejected() {
        let db = DataBase::new_in_memory().await.unwrap();
        db.insert_batch(new_batch(1, B256::ZERO)).await.unwrap();

        let err = committed_pack(&db, &batch_hash(1)).await.unwrap_err();
        assert!(matches!(err, CommitError::EmptyTraces(hash) if hash == batch_hash(1)));
    }

    #[tokio::test]
    async fn unknown_batch_is_reported() {
        let db = DataBase::new_in_memory().await.unwrap();
        let err = committed_pack(&db, &batch_hash(9)).await.unwrap_err();
        assert!(matches!(err, CommitError::BatchNotFound(_)));
    }
}
