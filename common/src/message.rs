//! Payloads exchanged with prover workers.

use alloy::primitives::{B256, Bytes};
use serde::{Deserialize, Serialize};

use crate::status::ProofType;

/// Public inputs of one chunk as seen by the batch circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkInfo {
    pub chain_id: u64,
    pub prev_state_root: B256,
    pub post_state_root: B256,
    pub withdraw_root: B256,
    pub data_hash: B256,
    pub is_padding: bool,
}

/// Proof produced by a chunk prover, stored verbatim on the chunk row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkProof {
    pub protocol: Bytes,
    pub proof: Bytes,
    pub instances: Bytes,
    pub vk: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_info: Option<ChunkInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_version: Option<String>,
}

/// Body of a batch task: chunk infos and chunk proofs, index-aligned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTaskDetail {
    pub chunk_infos: Vec<ChunkInfo>,
    pub chunk_proofs: Vec<ChunkProof>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkTaskDetail {
    pub block_hashes: Vec<B256>,
}

/// Task handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProverTaskSchema {
    #[serde(rename = "taskID")]
    pub task_id: String,
    #[serde(rename = "proofType")]
    pub proof_type: u8,
    /// JSON encoded [`BatchTaskDetail`] or [`ChunkTaskDetail`].
    #[serde(rename = "proofData")]
    pub proof_data: String,
}

impl ProverTaskSchema {
    pub fn new(task_id: String, proof_type: ProofType, proof_data: String) -> Self {
        Self {
            task_id,
            proof_type: proof_type.as_u8(),
            proof_data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofStatus {
    Ok,
    Failed,
}

/// Result reported by a worker for a task it was assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitProofMessage {
    #[serde(rename = "taskID")]
    pub task_id: String,
    #[serde(rename = "proofType")]
    pub proof_type: u8,
    pub status: ProofStatus,
    /// JSON encoded proof, required when `status` is `ok`.
    #[serde(default)]
    pub proof: Option<String>,
    #[serde(rename = "failureMsg", default)]
    pub failure_msg: Option<String>,
}
