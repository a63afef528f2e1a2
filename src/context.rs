use primitive_types::U256;

use crate::account::Account;

/// The incoming message: who called, with what value and input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub caller: U256,
    pub value: U256,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    pub origin: U256,
    pub gas_price: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockEnv {
    pub coinbase: U256,
    pub timestamp: U256,
    pub number: U256,
    pub difficulty: U256,
    pub gas_limit: U256,
    pub basefee: U256,
}

/// Everything environment-reading opcodes can see. Built once by the driver
/// and never mutated by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Snapshot of the executing account. Its storage seeds the run.
    pub account: Account,
    pub message: Message,
    pub transaction: Transaction,
    pub block: BlockEnv,
    pub chain_id: U256,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            account: Account::default(),
            message: Message::default(),
            transaction: Transaction::default(),
            block: BlockEnv::default(),
            chain_id: U256::one(),
        }
    }
}

impl ExecutionContext {
    pub fn for_account(account: Account) -> Self {
        Self { account, ..Self::default() }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.message = message;
        self
    }

    pub fn with_calldata(mut self, data: Vec<u8>) -> Self {
        self.message.data = data;
        self
    }

    pub fn address(&self) -> U256 {
        self.account.address
    }
}
