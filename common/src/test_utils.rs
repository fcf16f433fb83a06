#![allow(clippy::unwrap_used)]

//! Fixtures for tests across the workspace.

use alloy::primitives::{Address, B256, Bytes, U256};

use crate::{
    DataBase,
    message::ChunkProof,
    models::{NewBatch, NewChunk},
    status::{ProofType, RollupStatus},
    trace::{BlockHeader, BlockTrace, ExecutionResult, TransactionTrace},
};

pub fn batch_hash(index: u64) -> String {
    B256::left_padding_from(&index.to_be_bytes()).to_string()
}

pub fn chunk_hash(batch_index: u64, chunk_index: u64) -> String {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&batch_index.to_be_bytes());
    bytes[24..].copy_from_slice(&chunk_index.to_be_bytes());
    B256::from(bytes).to_string()
}

pub fn block_hash(number: u64) -> B256 {
    let mut bytes = [0xbbu8; 32];
    bytes[24..].copy_from_slice(&number.to_be_bytes());
    B256::from(bytes)
}

pub fn new_batch(index: u64, parent_hash: B256) -> NewBatch {
    NewBatch {
        hash: batch_hash(index),
        batch_index: index,
        parent_hash: parent_hash.to_string(),
    }
}

pub fn new_chunk(batch_index: u64, chunk_index: u64, start_block: u64, end_block: u64) -> NewChunk {
    NewChunk {
        hash: chunk_hash(batch_index, chunk_index),
        batch_hash: batch_hash(batch_index),
        chunk_index,
        start_block_number: start_block,
        end_block_number: end_block,
        parent_chunk_state_root: B256::repeat_byte(0x01).to_string(),
        state_root: B256::repeat_byte(0x02).to_string(),
        withdraw_root: B256::repeat_byte(0x03).to_string(),
    }
}

pub fn chunk_proof(tag: u8) -> ChunkProof {
    ChunkProof {
        protocol: Bytes::from(vec![tag; 4]),
        proof: Bytes::from(vec![tag; 8]),
        instances: Bytes::from(vec![tag; 2]),
        vk: Bytes::from(vec![tag; 3]),
        chunk_info: None,
        git_version: Some("v0.0.1".to_string()),
    }
}

pub fn transaction(nonce: u64, to: Option<Address>) -> TransactionTrace {
    TransactionTrace {
        from: Address::repeat_byte(0x11),
        to,
        nonce,
        gas: 200_000,
        gas_price: U256::from(1_000_000_000u64),
        value: U256::from(nonce),
        data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
        r: U256::from(1u64),
        s: U256::from(2u64),
        v: 27,
    }
}

/// A block whose transactions used the given amounts of gas.
pub fn block_trace(number: u64, parent_hash: B256, gas: &[u64]) -> BlockTrace {
    let transactions = gas
        .iter()
        .zip(0u64..)
        .map(|(_, nonce)| transaction(nonce, Some(Address::repeat_byte(0x22))))
        .collect();
    BlockTrace {
        header: BlockHeader {
            hash: block_hash(number),
            parent_hash,
            base_fee: Some(U256::from(7u64)),
            number,
            timestamp: 1_700_000_000 + number,
        },
        state_root: B256::repeat_byte(0x44),
        transactions,
        execution_results: gas.iter().map(|gas| ExecutionResult { gas: *gas }).collect(),
    }
}

/// Inserts a batch covering `blocks` as a single chunk and returns the hash
/// of its last block.
pub async fn seed_batch(
    db: &DataBase,
    index: u64,
    parent_hash: B256,
    blocks: std::ops::RangeInclusive<u64>,
) -> B256 {
    let (start, end) = (*blocks.start(), *blocks.end());
    db.insert_batch(new_batch(index, parent_hash)).await.unwrap();
    db.insert_chunk(new_chunk(index, 0, start, end)).await.unwrap();

    let mut parent = parent_hash;
    for number in blocks {
        let trace = block_trace(number, parent, &[21_000, 50_000]);
        db.insert_block_trace(&batch_hash(index), &chunk_hash(index, 0), &trace)
            .await
            .unwrap();
        parent = trace.header.hash;
    }
    parent
}

/// Overwrites a unit's status, bypassing the transition table.
pub async fn force_status(db: &DataBase, proof_type: ProofType, hash: &str, status: RollupStatus) {
    let query = format!("UPDATE {} SET status = ? WHERE hash = ?", proof_type.table());
    sqlx::query(&query)
        .bind(status)
        .bind(hash)
        .execute(db.pool())
        .await
        .unwrap();
}

/// Stores a proof and marks the unit proved, bypassing the transition table.
pub async fn force_proved(db: &DataBase, proof_type: ProofType, hash: &str, proof: &[u8]) {
    let mut conn = db.pool().acquire().await.unwrap();
    DataBase::update_proof(&mut conn, proof_type, hash, proof).await.unwrap();
    drop(conn);
    force_status(db, proof_type, hash, RollupStatus::Proved).await;
}
