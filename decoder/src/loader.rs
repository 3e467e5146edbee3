//! Snapshot loading of accounts through a ledger RPC endpoint.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_program::pubkey::Pubkey;
use solana_sdk::account::Account;
use tracing::debug;

use crate::{
    account::AccountInfo,
    config::{ClientConfig, MAX_ACCOUNTS_PER_CALL},
    error::{MangoError, MangoResult},
    state::AccountLayout,
};

/// Where raw accounts come from.
#[async_trait]
pub trait AccountSource: Send + Sync {
    /// `None` when the account does not exist.
    async fn get_account(&self, address: &Pubkey) -> MangoResult<Option<Account>>;

    /// One entry per address, in the same order.
    async fn get_multiple_accounts(&self, addresses: &[Pubkey])
        -> MangoResult<Vec<Option<Account>>>;
}

#[async_trait]
impl AccountSource for RpcClient {
    async fn get_account(&self, address: &Pubkey) -> MangoResult<Option<Account>> {
        let response = self
            .get_account_with_commitment(address, self.commitment())
            .await?;
        Ok(response.value)
    }

    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> MangoResult<Vec<Option<Account>>> {
        let response = self
            .get_multiple_accounts_with_commitment(addresses, self.commitment())
            .await?;
        Ok(response.value)
    }
}

/// A nonblocking RPC client on the configured endpoint and commitment.
pub fn rpc_client(config: &ClientConfig) -> RpcClient {
    RpcClient::new_with_commitment(config.rpc_url.clone(), config.commitment)
}

/// Loads snapshots from an [`AccountSource`], batching multi-account requests.
pub struct AccountLoader<S> {
    source: S,
    chunk_size: usize,
    chunk_pause: Duration,
}

impl<S: AccountSource> AccountLoader<S> {
    /// A loader using full-size chunks and no pause.
    pub fn new(source: S) -> Self {
        AccountLoader {
            source,
            chunk_size: MAX_ACCOUNTS_PER_CALL,
            chunk_pause: Duration::ZERO,
        }
    }

    /// A loader using the configured chunk size and pause.
    pub fn from_config(source: S, config: &ClientConfig) -> Self {
        Self::new(source)
            .with_chunk_size(config.account_chunk_size)
            .with_chunk_pause(config.chunk_pause)
    }

    /// Clamped to what a single call accepts.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_ACCOUNTS_PER_CALL);
        self
    }

    /// Sleep for `chunk_pause` between two chunks.
    pub fn with_chunk_pause(mut self, chunk_pause: Duration) -> Self {
        self.chunk_pause = chunk_pause;
        self
    }

    #[allow(missing_docs)]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// `None` when the account does not exist.
    pub async fn load_account(&self, address: &Pubkey) -> MangoResult<Option<AccountInfo>> {
        let account = self.source.get_account(address).await?;
        Ok(account.map(|account| AccountInfo::from_account(*address, account)))
    }

    /// Loads `addresses` in chunks, pausing between chunks. The result lines up
    /// with `addresses`.
    pub async fn load_multiple(
        &self,
        addresses: &[Pubkey],
    ) -> MangoResult<Vec<Option<AccountInfo>>> {
        let mut result = Vec::with_capacity(addresses.len());
        let chunk_count = (addresses.len() + self.chunk_size - 1) / self.chunk_size;
        for (index, chunk) in addresses.chunks(self.chunk_size).enumerate() {
            if index > 0 && !self.chunk_pause.is_zero() {
                tokio::time::sleep(self.chunk_pause).await;
            }
            debug!(
                chunk = index + 1,
                chunks = chunk_count,
                accounts = chunk.len(),
                "loading accounts"
            );
            let accounts = self.source.get_multiple_accounts(chunk).await?;
            if accounts.len() != chunk.len() {
                return Err(MangoError::SizeMismatch {
                    layout: "account batch",
                    expected: chunk.len(),
                    actual: accounts.len(),
                });
            }
            result.extend(
                chunk
                    .iter()
                    .zip(accounts)
                    .map(|(address, account)| {
                        account.map(|account| AccountInfo::from_account(*address, account))
                    }),
            );
        }
        Ok(result)
    }

    /// Load and decode one account, `None` when it does not exist.
    pub async fn load_typed<T: AccountLayout>(&self, address: &Pubkey) -> MangoResult<Option<T>> {
        self.load_account(address)
            .await?
            .map(|info| info.decode())
            .transpose()
    }

    /// Like [`Self::load_typed`], but a missing account is an error.
    pub async fn load_required<T: AccountLayout>(&self, address: &Pubkey) -> MangoResult<T> {
        self.load_typed(address)
            .await?
            .ok_or(MangoError::AccountNotFound(*address))
    }

    /// Load and decode several accounts. Any decode failure fails the batch.
    pub async fn load_multiple_typed<T: AccountLayout>(
        &self,
        addresses: &[Pubkey],
    ) -> MangoResult<Vec<Option<T>>> {
        self.load_multiple(addresses)
            .await?
            .into_iter()
            .map(|info| info.map(|info| info.decode()).transpose())
            .collect()
    }
}

/// In-memory account source for tests and offline tooling.
#[derive(Debug, Default, Clone)]
pub struct MockAccountSource {
    accounts: HashMap<Pubkey, Account>,
    calls: Arc<Mutex<Vec<usize>>>,
}

impl MockAccountSource {
    /// An empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `account` at `address`.
    pub fn with_account(mut self, address: Pubkey, account: Account) -> Self {
        self.accounts.insert(address, account);
        self
    }

    /// Sizes of the `get_multiple_accounts` requests served so far.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AccountSource for MockAccountSource {
    async fn get_account(&self, address: &Pubkey) -> MangoResult<Option<Account>> {
        Ok(self.accounts.get(address).cloned())
    }

    async fn get_multiple_accounts(
        &self,
        addresses: &[Pubkey],
    ) -> MangoResult<Vec<Option<Account>>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(addresses.len());
        }
        Ok(addresses
            .iter()
            .map(|address| self.accounts.get(address).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{bank::NodeBankLayout, DataType, MetaData, NodeBank};
    use bytemuck::Zeroable;

    fn account(lamports: u64, data: Vec<u8>) -> Account {
        Account {
            lamports,
            data,
            owner: Pubkey::new_unique(),
            executable: false,
            rent_epoch: 0,
        }
    }

    fn node_bank_account() -> Account {
        let mut layout = NodeBankLayout::zeroed();
        layout.meta_data = MetaData::new(DataType::NodeBank, 0, true);
        account(1, bytemuck::bytes_of(&layout).to_vec())
    }

    #[tokio::test]
    async fn load_single_account() {
        let present = Pubkey::new_unique();
        let loader =
            AccountLoader::new(MockAccountSource::new().with_account(present, account(7, vec![1])));

        let info = loader.load_account(&present).await.unwrap().unwrap();
        assert_eq!(info.address, present);
        assert_eq!(info.lamports, 7);
        assert_eq!(info.data, vec![1]);
        assert_eq!(loader.load_account(&Pubkey::new_unique()).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn load_multiple_chunks_and_preserves_order() {
        let addresses: Vec<Pubkey> = (0..7).map(|_| Pubkey::new_unique()).collect();
        let mut source = MockAccountSource::new();
        for (i, address) in addresses.iter().enumerate() {
            if i != 4 {
                source = source.with_account(*address, account(i as u64, vec![]));
            }
        }
        let loader = AccountLoader::new(source)
            .with_chunk_size(3)
            .with_chunk_pause(Duration::from_millis(500));

        let start = tokio::time::Instant::now();
        let infos = loader.load_multiple(&addresses).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1000));

        assert_eq!(loader.source().batch_sizes(), vec![3, 3, 1]);
        assert_eq!(infos.len(), 7);
        for (i, info) in infos.iter().enumerate() {
            match info {
                Some(info) => {
                    assert_eq!(info.address, addresses[i]);
                    assert_eq!(info.lamports, i as u64);
                }
                None => assert_eq!(i, 4),
            }
        }
    }

    #[tokio::test]
    async fn load_multiple_empty() {
        let loader = AccountLoader::new(MockAccountSource::new());
        assert!(loader.load_multiple(&[]).await.unwrap().is_empty());
        assert!(loader.source().batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn chunk_size_is_clamped() {
        let addresses: Vec<Pubkey> = (0..250).map(|_| Pubkey::new_unique()).collect();
        let loader = AccountLoader::new(MockAccountSource::new()).with_chunk_size(1000);
        let infos = loader.load_multiple(&addresses).await.unwrap();
        assert!(infos.iter().all(Option::is_none));
        assert_eq!(loader.source().batch_sizes(), vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn typed_loads() {
        let bank = Pubkey::new_unique();
        let garbage = Pubkey::new_unique();
        let missing = Pubkey::new_unique();
        let loader = AccountLoader::new(
            MockAccountSource::new()
                .with_account(bank, node_bank_account())
                .with_account(garbage, account(1, vec![0; 3])),
        );

        assert!(loader.load_typed::<NodeBank>(&bank).await.unwrap().is_some());
        assert!(loader.load_typed::<NodeBank>(&missing).await.unwrap().is_none());
        assert!(matches!(
            loader.load_required::<NodeBank>(&missing).await,
            Err(MangoError::AccountNotFound(address)) if address == missing
        ));
        assert!(matches!(
            loader.load_typed::<NodeBank>(&garbage).await,
            Err(MangoError::SizeMismatch { actual: 3, .. })
        ));

        let banks = loader
            .load_multiple_typed::<NodeBank>(&[missing, bank])
            .await
            .unwrap();
        assert!(banks[0].is_none());
        assert!(banks[1].is_some());
    }
}
