use solana_program::pubkey::Pubkey;
use solana_sdk::account::Account;

use crate::{error::MangoResult, state::AccountLayout};

/// A snapshot of one ledger account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    /// The account's public key.
    pub address: Pubkey,
    /// The program owning the account.
    pub owner: Pubkey,
    #[allow(missing_docs)]
    pub executable: bool,
    #[allow(missing_docs)]
    pub lamports: u64,
    #[allow(missing_docs)]
    pub rent_epoch: u64,
    /// Raw account data, decoded with an [`AccountLayout`].
    pub data: Vec<u8>,
}

impl AccountInfo {
    /// Attach an address to an account returned by the RPC node.
    pub fn from_account(address: Pubkey, account: Account) -> Self {
        AccountInfo {
            address,
            owner: account.owner,
            executable: account.executable,
            lamports: account.lamports,
            rent_epoch: account.rent_epoch,
            data: account.data,
        }
    }

    /// Decode the account data as `T`.
    pub fn decode<T: AccountLayout>(&self) -> MangoResult<T> {
        T::decode(&self.data)
    }
}

impl From<AccountInfo> for Account {
    fn from(info: AccountInfo) -> Self {
        Account {
            lamports: info.lamports,
            data: info.data,
            owner: info.owner,
            executable: info.executable,
            rent_epoch: info.rent_epoch,
        }
    }
}

/// An account decoded together with the snapshot it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<T> {
    #[allow(missing_docs)]
    pub address: Pubkey,
    #[allow(missing_docs)]
    pub lamports: u64,
    /// The decoded account data.
    pub value: T,
}

impl<T: AccountLayout> Decoded<T> {
    /// Decode a snapshot, keeping its address and balance.
    pub fn from_account_info(info: &AccountInfo) -> MangoResult<Self> {
        Ok(Decoded {
            address: info.address,
            lamports: info.lamports,
            value: info.decode()?,
        })
    }
}
