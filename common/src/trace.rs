use alloy::primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Execution record of a single L2 block, as persisted by the batch proposer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTrace {
    pub header: BlockHeader,
    /// State root after executing the block.
    pub state_root: B256,
    pub transactions: Vec<TransactionTrace>,
    /// Per-transaction results, positionally matching `transactions`.
    pub execution_results: Vec<ExecutionResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub hash: B256,
    pub parent_hash: B256,
    /// Absent for blocks before the base fee was introduced.
    #[serde(default)]
    pub base_fee: Option<U256>,
    pub number: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionTrace {
    pub from: Address,
    /// `None` for contract creation.
    #[serde(default)]
    pub to: Option<Address>,
    pub nonce: u64,
    pub gas: u64,
    pub gas_price: U256,
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
    pub r: U256,
    pub s: U256,
    pub v: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub gas: u64,
}

impl BlockTrace {
    /// Total gas used by the block's transactions, or `None` on overflow.
    pub fn gas_used(&self) -> Option<u64> {
        self.execution_results
            .iter()
            .try_fold(0u64, |acc, result| acc.checked_add(result.gas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_trace_without_optional_fields() {
        let json = r#"{
            "header": {
                "hash": "0x0101010101010101010101010101010101010101010101010101010101010101",
                "parentHash": "0x0000000000000000000000000000000000000000000000000000000000000000",
                "number": 7,
                "timestamp": 1700000000
            },
            "stateRoot": "0x0202020202020202020202020202020202020202020202020202020202020202",
            "transactions": [{
                "from": "0x0000000000000000000000000000000000000001",
                "nonce": 0,
                "gas": 53000,
                "gasPrice": "0x1",
                "value": "0x0",
                "r": "0x1",
                "s": "0x2",
                "v": 27
            }],
            "executionResults": [{ "gas": 53000 }]
        }"#;

        let trace: BlockTrace = serde_json::from_str(json).unwrap();
        assert_eq!(trace.header.number, 7);
        assert_eq!(trace.header.base_fee, None);
        assert_eq!(trace.transactions[0].to, None);
        assert!(trace.transactions[0].data.is_empty());
        assert_eq!(trace.gas_used(), Some(53000));
    }

    #[test]
    fn gas_used_detects_overflow() {
        let trace = BlockTrace {
            header: BlockHeader {
                hash: B256::ZERO,
                parent_hash: B256::ZERO,
                base_fee: None,
                number: 1,
                timestamp: 1,
            },
            state_root: B256::ZERO,
            transactions: Vec::new(),
            execution_results: vec![ExecutionResult { gas: u64::MAX }, ExecutionResult { gas: 1 }],
        };
        assert_eq!(trace.gas_used(), None);
    }
}
