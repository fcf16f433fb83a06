//! Idempotent transaction submission towards the L1 rollup contract.

use alloy::{
    primitives::{Address, B256, Bytes, U256},
    transports::TransportError,
};
use async_trait::async_trait;

mod provider;

pub use provider::ProviderSender;

/// Outcome of a transaction the sender was tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    /// Logical id the transaction was sent under.
    pub id: String,
    pub tx_hash: B256,
    pub is_successful: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    /// Every account has a transaction in flight. Callers retry later.
    #[error("no available account to send transaction")]
    NoAvailableAccount,
    /// A transaction is already in flight under this id; `tx_hash` is the
    /// one being tracked.
    #[error("transaction with id {id} is already pending: {tx_hash}")]
    DuplicateId { id: String, tx_hash: B256 },
    #[error(transparent)]
    Rpc(#[from] TransportError),
}

#[async_trait]
pub trait TxSender: Send + Sync {
    /// Signs and broadcasts a new transaction under the logical `id`.
    async fn send_transaction(
        &self,
        id: &str,
        to: Address,
        value: U256,
        data: Bytes,
    ) -> Result<B256, SenderError>;

    /// Resumes tracking of a transaction sent before a restart.
    ///
    /// Nothing new is broadcast while `known_hash` is pending or mined; the
    /// transaction is only sent again when the node does not know it. Returns
    /// the hash being tracked afterwards.
    async fn load_or_send_tx(
        &self,
        known_hash: B256,
        id: &str,
        to: Address,
        value: U256,
        data: Bytes,
    ) -> Result<B256, SenderError>;
}
