use alloy::sol;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IZKRollup {
        struct Layer2Transaction {
            address caller;
            uint64 nonce;
            address target;
            uint64 gas;
            uint256 gasPrice;
            uint256 value;
            bytes data;
            uint256 r;
            uint256 s;
            uint64 v;
        }

        struct Layer2BlockHeader {
            bytes32 blockHash;
            bytes32 parentHash;
            uint256 baseFee;
            bytes32 stateRoot;
            uint64 blockHeight;
            uint64 gasUsed;
            uint64 timestamp;
            bytes extraData;
            Layer2Transaction[] txs;
        }

        struct Layer2Batch {
            uint64 batchIndex;
            bytes32 parentHash;
            Layer2BlockHeader[] blocks;
        }

        function commitBatch(Layer2Batch memory batch) external;
    }
}
