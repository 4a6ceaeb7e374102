//! Account Directory
//!
//! The signer looks up an account's derivation path by address. The
//! in-memory directory is seeded at startup and grows through
//! `btc_addAccount`; new accounts are native SegWit (BIP84).

use std::sync::RwLock;

use bitcoin::secp256k1::{All, Secp256k1};

use crate::error::SignerResult;
use crate::tx::classifier::ScriptType;
use crate::types::{Account, BtcNetwork};

use super::{bip_purposes, derive, AccountPath, RootSecret};

/// Ordered list of known accounts
pub trait AccountDirectory: Send + Sync {
    fn accounts(&self) -> Vec<Account>;

    fn find(&self, address: &str) -> Option<Account> {
        self.accounts().into_iter().find(|a| a.address == address)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    accounts: RwLock<Vec<Account>>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        Self {
            accounts: RwLock::new(accounts),
        }
    }

    /// Directory holding the first `count` BIP84 accounts of `network`
    pub fn bootstrap(
        secp: &Secp256k1<All>,
        root: &RootSecret,
        network: BtcNetwork,
        count: u32,
    ) -> SignerResult<Self> {
        let accounts = (0..count)
            .map(|index| derive_account(secp, root, network, ScriptType::NativeSegwit, index))
            .collect::<SignerResult<Vec<_>>>()?;
        Ok(Self::with_accounts(accounts))
    }

    pub fn insert(&self, account: Account) {
        let mut accounts = match self.accounts.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !accounts.iter().any(|a| a.address == account.address) {
            accounts.push(account);
        }
    }

    /// Derive and store the next BIP84 account for `network`
    pub fn add_account(
        &self,
        secp: &Secp256k1<All>,
        root: &RootSecret,
        network: BtcNetwork,
    ) -> SignerResult<Account> {
        let next_index = self
            .accounts()
            .iter()
            .filter_map(|a| AccountPath::from_segments(&a.derivation_path).ok())
            .filter(|p| p.purpose() == bip_purposes::BIP84 && p.coin_type() == network.coin_type())
            .map(|p| p.account() + 1)
            .max()
            .unwrap_or(0);

        let account = derive_account(secp, root, network, ScriptType::NativeSegwit, next_index)?;
        self.insert(account.clone());
        Ok(account)
    }
}

impl AccountDirectory for InMemoryAccounts {
    fn accounts(&self) -> Vec<Account> {
        match self.accounts.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Account at `m/purpose'/coin'/index'/0/0` for the given script type
pub fn derive_account(
    secp: &Secp256k1<All>,
    root: &RootSecret,
    network: BtcNetwork,
    script_type: ScriptType,
    index: u32,
) -> SignerResult<Account> {
    let path = AccountPath::new(script_type.purpose(), network.coin_type(), index, 0, 0);
    let key = derive(secp, root, network, &path)?;
    let address = script_type.address_for(secp, &key.public_key(), network);
    Ok(Account::new(address.to_string(), path.to_segments()))
}
