pub mod account;
pub mod codec;
pub mod config;
pub mod context;
pub mod disasm;
pub mod error;
pub mod gas;
pub mod hash;
pub mod machine;
pub mod memory;
pub mod opcodes;
pub mod stack;
pub mod storage;
pub mod trace;
pub mod word;

pub use account::{create_address, Account, AccountRegistry};
pub use config::EvmConfig;
pub use context::{BlockEnv, ExecutionContext, Message, Transaction};
pub use error::{CodecError, ConfigError, EvmError, EvmResult, RegistryError};
pub use machine::{run, Evm, ExecutionResult, Halt};
pub use memory::{Memory, MemoryWrite};
pub use stack::Stack;
pub use storage::Storage;
pub use trace::{NoopObserver, RecordingObserver, Step, StepObserver, StepSignal, StepSnapshot};
