use std::{str::FromStr, sync::Arc, time::Duration};

use alloy::{
    network::{
        Ethereum, EthereumWallet, ReceiptResponse, TransactionBuilder, TransactionResponse,
    },
    primitives::{Address, B256, Bytes, U256},
    providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
};
use anyhow::Error;
use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::mpsc;

use super::{Confirmation, SenderError, TxSender};

/// How long a broadcast transaction is watched before its account is freed.
/// A transaction still known to the node is picked up again on recovery.
const WATCH_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Clone)]
struct Account {
    address: Address,
    provider: DynProvider,
}

/// Sends transactions from a pool of local accounts, at most one in flight
/// per account.
pub struct ProviderSender {
    accounts: Vec<Account>,
    /// Account -> logical id of its in-flight transaction.
    busy: Arc<DashMap<Address, String>>,
    /// Logical id -> hash of the tracked transaction.
    pending: Arc<DashMap<String, B256>>,
    confirmations: mpsc::UnboundedSender<Confirmation>,
    required_confirmations: u64,
}

impl ProviderSender {
    pub fn new(
        rpc_url: &str,
        private_keys: &[String],
        required_confirmations: u64,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Confirmation>), Error> {
        let mut accounts = Vec::with_capacity(private_keys.len());
        for key in private_keys {
            let signer = PrivateKeySigner::from_str(key)?;
            let address = signer.address();
            let provider = ProviderBuilder::new()
                .wallet(EthereumWallet::from(signer))
                .connect_http(rpc_url.parse()?)
                .erased();
            tracing::info!("Relayer account {} loaded", address);
            accounts.push(Account { address, provider });
        }
        if accounts.is_empty() {
            anyhow::bail!("at least one relayer account is required");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        Ok((
            Self {
                accounts,
                busy: Arc::new(DashMap::new()),
                pending: Arc::new(DashMap::new()),
                confirmations: tx,
                required_confirmations,
            },
            rx,
        ))
    }

    /// Marks the first idle account busy with `id`.
    fn reserve_account(&self, id: &str) -> Result<Account, SenderError> {
        for account in &self.accounts {
            if let Entry::Vacant(entry) = self.busy.entry(account.address) {
                entry.insert(id.to_string());
                return Ok(account.clone());
            }
        }
        Err(SenderError::NoAvailableAccount)
    }

    /// Marks `account` busy with `id` for a transaction found on the node.
    /// An account already tracking another id keeps its reservation.
    fn claim_account(&self, account: Address, id: &str) -> bool {
        match self.busy.entry(account) {
            Entry::Vacant(entry) => {
                entry.insert(id.to_string());
                true
            }
            Entry::Occupied(entry) if entry.get() == id => true,
            Entry::Occupied(entry) => {
                tracing::warn!(
                    "Account {} is busy with {}, {} is watched without it",
                    account,
                    entry.get(),
                    id
                );
                false
            }
        }
    }

    fn watch(&self, pending: PendingTransactionBuilder<Ethereum>, id: String, account: Address) {
        let busy = self.busy.clone();
        let pending_txs = self.pending.clone();
        let confirmations = self.confirmations.clone();
        let required = self.required_confirmations;

        tokio::spawn(async move {
            let tx_hash = *pending.tx_hash();
            let result = pending
                .with_required_confirmations(required)
                .with_timeout(Some(WATCH_TIMEOUT))
                .get_receipt()
                .await;

            pending_txs.remove(&id);
            busy.remove_if(&account, |_, owner| *owner == id);

            match result {
                Ok(receipt) => {
                    let confirmation = Confirmation {
                        id,
                        tx_hash,
                        is_successful: receipt.status(),
                    };
                    if confirmations.send(confirmation).is_err() {
                        tracing::warn!("Confirmation receiver dropped for tx {}", tx_hash);
                    }
                }
                Err(e) => tracing::error!("Failed to watch tx {} ({}): {}", tx_hash, id, e),
            }
        });
    }

    fn any_provider(&self) -> Result<&DynProvider, SenderError> {
        self.accounts
            .first()
            .map(|account| &account.provider)
            .ok_or(SenderError::NoAvailableAccount)
    }
}

#[async_trait]
impl TxSender for ProviderSender {
    async fn send_transaction(
        &self,
        id: &str,
        to: Address,
        value: U256,
        data: Bytes,
    ) -> Result<B256, SenderError> {
        if let Some(tx_hash) = self.pending.get(id).map(|entry| *entry) {
            return Err(SenderError::DuplicateId {
                id: id.to_string(),
                tx_hash,
            });
        }
        let account = self.reserve_account(id)?;

        let request = TransactionRequest::default()
            .with_from(account.address)
            .with_to(to)
            .with_value(value)
            .with_input(data);
        let pending = match account.provider.send_transaction(request).await {
            Ok(pending) => pending,
            Err(e) => {
                self.busy.remove(&account.address);
                return Err(e.into());
            }
        };

        let tx_hash = *pending.tx_hash();
        tracing::debug!("Sent tx {} ({}) from {}", tx_hash, id, account.address);
        self.pending.insert(id.to_string(), tx_hash);
        self.watch(pending, id.to_string(), account.address);
        Ok(tx_hash)
    }

    async fn load_or_send_tx(
        &self,
        known_hash: B256,
        id: &str,
        to: Address,
        value: U256,
        data: Bytes,
    ) -> Result<B256, SenderError> {
        if let Some(tx_hash) = self.pending.get(id).map(|entry| *entry) {
            return Ok(tx_hash);
        }

        let provider = self.any_provider()?;
        if let Some(receipt) = provider.get_transaction_receipt(known_hash).await? {
            let confirmation = Confirmation {
                id: id.to_string(),
                tx_hash: known_hash,
                is_successful: receipt.status(),
            };
            if self.confirmations.send(confirmation).is_err() {
                tracing::warn!("Confirmation receiver dropped for tx {}", known_hash);
            }
            return Ok(known_hash);
        }

        if let Some(tx) = provider.get_transaction_by_hash(known_hash).await? {
            let from = tx.from();
            self.claim_account(from, id);
            self.pending.insert(id.to_string(), known_hash);
            let pending = PendingTransactionBuilder::new(provider.root().clone(), known_hash);
            self.watch(pending, id.to_string(), from);
            tracing::info!("Resumed watching tx {} ({})", known_hash, id);
            return Ok(known_hash);
        }

        tracing::warn!("Tx {} ({}) is unknown to the node, sending again", known_hash, id);
        self.send_transaction(id, to, value, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development keys; nothing is sent in these tests.
    const KEYS: [&str; 2] = [
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
    ];

    fn sender() -> ProviderSender {
        let keys: Vec<String> = KEYS.iter().map(|key| key.to_string()).collect();
        ProviderSender::new("http://127.0.0.1:8545", &keys, 1).unwrap().0
    }

    #[test]
    fn accounts_are_reserved_one_id_each() {
        let sender = sender();
        let first = sender.reserve_account("1-commit").unwrap();
        let second = sender.reserve_account("2-commit").unwrap();
        assert_ne!(first.address, second.address);

        assert!(matches!(
            sender.reserve_account("3-commit"),
            Err(SenderError::NoAvailableAccount)
        ));

        sender.busy.remove(&first.address);
        assert_eq!(sender.reserve_account("3-commit").unwrap().address, first.address);
    }

    #[test]
    fn resumed_tx_keeps_existing_reservation() {
        let sender = sender();
        let busy = sender.reserve_account("1-commit").unwrap().address;

        assert!(!sender.claim_account(busy, "2-commit"));
        assert_eq!(sender.busy.get(&busy).map(|owner| owner.clone()), Some("1-commit".to_string()));
        assert!(sender.claim_account(busy, "1-commit"));

        let idle = sender.accounts[1].address;
        assert!(sender.claim_account(idle, "2-commit"));
        assert!(matches!(
            sender.reserve_account("3-commit"),
            Err(SenderError::NoAvailableAccount)
        ));
    }

    #[tokio::test]
    async fn pending_id_is_not_sent_twice() {
        let sender = sender();
        sender.pending.insert("1-commit".to_string(), B256::repeat_byte(1));

        let err = sender
            .send_transaction("1-commit", Address::ZERO, U256::ZERO, Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SenderError::DuplicateId { tx_hash, .. } if tx_hash == B256::repeat_byte(1)
        ));

        let tracked = sender
            .load_or_send_tx(B256::ZERO, "1-commit", Address::ZERO, U256::ZERO, Bytes::new())
            .await
            .unwrap();
        assert_eq!(tracked, B256::repeat_byte(1));
    }

    #[test]
    fn empty_key_list_is_rejected() {
        assert!(ProviderSender::new("http://127.0.0.1:8545", &[], 1).is_err());
    }

    #[test]
    fn invalid_key_is_rejected() {
        let keys = vec!["not-a-key".to_string()];
        assert!(ProviderSender::new("http://127.0.0.1:8545", &keys, 1).is_err());
    }
}
