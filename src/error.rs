use primitive_types::U256;
use thiserror::Error;

/// Faults that abort a run. Every variant discards the run's stack, memory
/// and storage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvmError {
    #[error("stack overflow (max {0})")]
    StackOverflow(usize),
    #[error("stack underflow")]
    StackUnderflow,
    #[error("unknown opcode 0x{opcode:02x} at pc={pc}")]
    UnknownOpcode { opcode: u8, pc: usize },
    #[error("invalid memory range (offset {offset}, length {length})")]
    InvalidMemoryRange { offset: U256, length: U256 },
    #[error("invalid jump destination {0}")]
    InvalidJump(U256),
    #[error("return data out of bounds")]
    ReturnDataOutOfBounds,
    #[error("out of gas (limit {limit}, needed {needed})")]
    OutOfGas { limit: u64, needed: u64 },
    #[error("unsupported opcode {mnemonic} at pc={pc}")]
    Unsupported { mnemonic: &'static str, pc: usize },
    #[error("execution reverted: 0x{}", hex::encode(.0))]
    Revert(Vec<u8>),
    #[error("execution cancelled by step observer at pc={0}")]
    Cancelled(usize),
}

/// Errors raised by the hex/word helpers at the crate boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("invalid number: {0}")]
    InvalidNumber(String),
    #[error("value does not fit in {bits} bits: {input}")]
    TooLarge { bits: usize, input: String },
}

/// Errors raised by the account registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown account 0x{0:x}")]
    UnknownAccount(U256),
    #[error("invalid world file: {0}")]
    InvalidWorld(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type EvmResult<T> = Result<T, EvmError>;

/// Errors raised while loading an [`EvmConfig`](crate::config::EvmConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("parse config {path}: {source}")]
    Json { path: String, source: serde_json::Error },
}
