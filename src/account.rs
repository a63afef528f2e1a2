use std::collections::BTreeMap;

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{bytes_to_hex, hex_to_bytes, parse_word, word_to_hex};
use crate::error::RegistryError;
use crate::hash::sha3_word;
use crate::machine::ExecutionResult;
use crate::storage::Storage;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub address: U256,
    pub nonce: U256,
    pub balance: U256,
    pub code: Vec<u8>,
    pub storage: Storage,
}

impl Account {
    /// A fresh account with zero nonce and balance.
    pub fn new(address: U256) -> Self {
        Self { address, ..Self::default() }
    }
}

/// Derives a contract address by hashing the concatenated lowercase hex forms
/// (no prefix, no padding) of the sender and nonce. The full 256-bit digest is
/// the address.
pub fn create_address(sender: U256, nonce: U256) -> U256 {
    let preimage = format!("{}{}", word_to_hex(sender), word_to_hex(nonce));
    sha3_word(preimage.as_bytes())
}

/// Accounts keyed by address. Owned by the driver and handed to the engine
/// read-only; it only changes between runs.
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    accounts: BTreeMap<U256, Account>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn contains(&self, address: U256) -> bool {
        self.accounts.contains_key(&address)
    }

    /// Creates (or resets) an account with zero nonce and balance.
    pub fn create_account(&mut self, address: U256) -> &mut Account {
        debug!("creating account 0x{address:x}");
        let account = self.accounts.entry(address).or_default();
        *account = Account::new(address);
        account
    }

    /// Returns the account, or a zero-valued one when it does not exist.
    pub fn get_account(&self, address: U256) -> Account {
        self.accounts.get(&address).cloned().unwrap_or_else(|| Account::new(address))
    }

    pub fn account(&self, address: U256) -> Option<&Account> {
        self.accounts.get(&address)
    }

    pub fn insert(&mut self, account: Account) {
        self.accounts.insert(account.address, account);
    }

    pub fn set_code(&mut self, address: U256, code: Vec<u8>) -> Result<(), RegistryError> {
        let account = self.accounts.get_mut(&address).ok_or(RegistryError::UnknownAccount(address))?;
        account.code = code;
        Ok(())
    }

    pub fn set_balance(&mut self, address: U256, balance: U256) -> Result<(), RegistryError> {
        let account = self.accounts.get_mut(&address).ok_or(RegistryError::UnknownAccount(address))?;
        account.balance = balance;
        Ok(())
    }

    /// Applies a run's storage to `address`. Reverted runs change nothing.
    /// Returns whether the storage was applied.
    pub fn commit(&mut self, address: U256, result: &ExecutionResult) -> bool {
        if !result.halt.is_success() {
            return false;
        }
        let account = self.accounts.entry(address).or_insert_with(|| Account::new(address));
        account.storage = result.storage.clone();
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let file: WorldFile = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for (key, entry) in file.accounts {
            let address = parse_word(&key)?;
            let mut account = Account::new(address);
            if let Some(nonce) = entry.nonce {
                account.nonce = nonce.to_word()?;
            }
            if let Some(balance) = entry.balance {
                account.balance = balance.to_word()?;
            }
            if let Some(code) = entry.code {
                account.code = hex_to_bytes(&code)?;
            }
            for (k, v) in entry.storage {
                account.storage.store(parse_word(&k)?, parse_word(&v)?);
            }
            registry.insert(account);
        }
        Ok(registry)
    }

    pub fn to_json(&self) -> Result<String, RegistryError> {
        let accounts = self
            .accounts
            .values()
            .map(|a| {
                let entry = AccountEntry {
                    nonce: Some(Quantity::Str(format!("0x{:x}", a.nonce))),
                    balance: Some(Quantity::Str(format!("0x{:x}", a.balance))),
                    code: Some(bytes_to_hex(&a.code)),
                    storage: a.storage.iter().map(|(k, v)| (format!("0x{k:x}"), format!("0x{v:x}"))).collect(),
                };
                (format!("0x{:x}", a.address), entry)
            })
            .collect();
        Ok(serde_json::to_string_pretty(&WorldFile { accounts })?)
    }
}

/// A JSON number or a `0x`/decimal string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Quantity {
    Num(u64),
    Str(String),
}

impl Quantity {
    fn to_word(&self) -> Result<U256, RegistryError> {
        match self {
            Quantity::Num(n) => Ok(U256::from(*n)),
            Quantity::Str(s) => Ok(parse_word(s)?),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WorldFile {
    #[serde(default)]
    accounts: BTreeMap<String, AccountEntry>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nonce: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    balance: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(default)]
    storage: BTreeMap<String, String>,
}
