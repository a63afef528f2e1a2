//! Gas costs and the running gas total.

use primitive_types::U256;

use crate::error::{EvmError, EvmResult};
use crate::opcodes::*;

/// Flat per-instruction costs.
pub mod cost {
    pub const ZERO: u64 = 0;
    pub const JUMPDEST: u64 = 1;
    pub const BASE: u64 = 2;
    pub const VERYLOW: u64 = 3;
    pub const LOW: u64 = 5;
    pub const MID: u64 = 8;
    pub const HIGH: u64 = 10;

    /// Flat, independent of the exponent's size.
    pub const EXP: u64 = 10;
    pub const SHA3: u64 = 30;
    pub const SHA3_BYTE: u64 = 6;
    pub const BLOCKHASH: u64 = 20;
    pub const SLOAD: u64 = 200;
    pub const SSTORE_SET: u64 = 20_000;
    pub const SSTORE_RESET: u64 = 5_000;
    pub const BALANCE: u64 = 400;
    pub const EXTCODEHASH: u64 = 400;
    pub const EXTCODE: u64 = 700;
    pub const COPY_BASE: u64 = 2;
    pub const COPY_BYTE: u64 = 3;
}

/// Cost of the opcodes whose price does not depend on operands. Opcodes with
/// dynamic pricing return their base cost.
pub fn static_gas(op: u8) -> u64 {
    match op {
        STOP | RETURN | REVERT => cost::ZERO,
        JUMPDEST => cost::JUMPDEST,
        ADD | SUB | LT | GT | SLT | SGT | EQ | ISZERO | AND | OR | XOR | NOT | BYTE | SHL
        | SHR | SAR | CALLDATALOAD | MLOAD | MSTORE | MSTORE8 => cost::VERYLOW,
        MUL | DIV | SDIV | MOD | SMOD | SIGNEXTEND => cost::LOW,
        ADDMOD | MULMOD | JUMP => cost::MID,
        JUMPI => cost::HIGH,
        EXP => cost::EXP,
        SHA3 => cost::SHA3,
        ADDRESS | ORIGIN | CALLER | CALLVALUE | CALLDATASIZE | CODESIZE | GASPRICE
        | RETURNDATASIZE | COINBASE | TIMESTAMP | NUMBER | DIFFICULTY | GASLIMIT | CHAINID
        | SELFBALANCE | BASEFEE | POP | PC | MSIZE | GAS | PUSH0 => cost::BASE,
        CALLDATACOPY | CODECOPY | RETURNDATACOPY => cost::COPY_BASE,
        BALANCE => cost::BALANCE,
        EXTCODEHASH => cost::EXTCODEHASH,
        EXTCODESIZE | EXTCODECOPY => cost::EXTCODE,
        BLOCKHASH => cost::BLOCKHASH,
        SLOAD => cost::SLOAD,
        x if (PUSH1..=PUSH32).contains(&x) => cost::VERYLOW,
        x if (DUP1..=DUP16).contains(&x) => cost::VERYLOW,
        x if (SWAP1..=SWAP16).contains(&x) => cost::VERYLOW,
        _ => cost::ZERO,
    }
}

pub fn sha3_gas(length: usize) -> u64 {
    cost::SHA3.saturating_add(cost::SHA3_BYTE.saturating_mul(length as u64))
}

/// Cost of a copy into memory on top of the instruction's base cost.
pub fn copy_gas(base: u64, length: usize) -> u64 {
    base.saturating_add(cost::COPY_BYTE.saturating_mul(length as u64))
}

/// Setting a zero slot to nonzero is priced higher than every other write.
pub fn sstore_gas(current: U256, new: U256) -> u64 {
    if current.is_zero() && !new.is_zero() {
        cost::SSTORE_SET
    } else {
        cost::SSTORE_RESET
    }
}

/// Running gas total with an optional ceiling.
#[derive(Debug, Clone, Default)]
pub struct Gasometer {
    used: u64,
    limit: Option<u64>,
}

impl Gasometer {
    pub fn new(limit: Option<u64>) -> Self {
        Self { used: 0, limit }
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    /// Gas left under the limit, or everything that has not been spent when
    /// no limit is set.
    pub fn remaining(&self) -> u64 {
        self.limit.unwrap_or(u64::MAX).saturating_sub(self.used)
    }

    pub fn charge(&mut self, amount: u64) -> EvmResult<()> {
        let needed = self.used.saturating_add(amount);
        if let Some(limit) = self.limit {
            if needed > limit {
                return Err(EvmError::OutOfGas { limit, needed });
            }
        }
        self.used = needed;
        Ok(())
    }
}
