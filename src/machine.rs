use std::collections::HashSet;

use primitive_types::U256;
use tracing::{debug, trace, warn};

use crate::account::AccountRegistry;
use crate::codec::{word_from_be_bytes, word_to_be_bytes, word_to_usize};
use crate::config::EvmConfig;
use crate::context::ExecutionContext;
use crate::error::{EvmError, EvmResult};
use crate::gas::{copy_gas, cost, sha3_gas, sstore_gas, static_gas, Gasometer};
use crate::hash::sha3_word;
use crate::memory::Memory;
use crate::opcodes::*;
use crate::stack::Stack;
use crate::storage::Storage;
use crate::trace::{Step, StepObserver, StepSignal};
use crate::word;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Halt {
    Stop,
    Return,
    Revert,
}

impl Halt {
    /// Whether the run's effects may be kept.
    pub fn is_success(&self) -> bool {
        !matches!(self, Halt::Revert)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Halt::Stop => "STOP",
            Halt::Return => "RETURN",
            Halt::Revert => "REVERT",
        }
    }
}

/// Final state of a run that halted normally.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub halt: Halt,
    /// Return data, or the revert payload.
    pub output: Vec<u8>,
    pub gas_used: u64,
    pub pc: usize,
    pub steps: usize,
    pub stack: Stack,
    pub memory: Memory,
    /// Storage after the run. A reverted run reports the storage it started with.
    pub storage: Storage,
}

impl ExecutionResult {
    /// The returned bytes, with a revert turned into [`EvmError::Revert`].
    pub fn into_output(self) -> EvmResult<Vec<u8>> {
        match self.halt {
            Halt::Revert => Err(EvmError::Revert(self.output)),
            Halt::Stop | Halt::Return => Ok(self.output),
        }
    }
}

/// One run of bytecode against a fixed context. Stack, memory and storage
/// belong to the run and are dropped with it unless it halts normally.
#[derive(Debug)]
pub struct Evm<'a> {
    pub pc: usize,
    code: Vec<u8>,
    stack: Stack,
    memory: Memory,
    storage: Storage,
    gas: Gasometer,
    ctx: &'a ExecutionContext,
    accounts: &'a AccountRegistry,
    config: EvmConfig,
    jumpdests: HashSet<usize>,
    halted: Option<Halt>,
    output: Vec<u8>,
}

impl<'a> Evm<'a> {
    pub fn new(code: Vec<u8>, ctx: &'a ExecutionContext, accounts: &'a AccountRegistry, config: EvmConfig) -> Self {
        let jumpdests = if config.validate_jumps { scan_jumpdests(&code) } else { HashSet::new() };
        Self {
            pc: 0,
            code,
            stack: Stack::new(),
            memory: Memory::new(config.max_range_len),
            storage: ctx.account.storage.clone(),
            gas: Gasometer::new(config.gas_limit),
            ctx,
            accounts,
            config,
            jumpdests,
            halted: None,
            output: Vec::new(),
        }
    }

    /// Executes until the code ends, a terminal opcode runs, a fault occurs or
    /// the observer cancels. The observer sees every executed instruction
    /// except the terminal one, then a final step once the run has halted.
    pub fn run<O: StepObserver + ?Sized>(mut self, observer: &mut O) -> EvmResult<ExecutionResult> {
        let initial_storage = self.storage.clone();
        let mut steps = 0usize;
        let mut last_op = STOP;

        while self.pc < self.code.len() && self.halted.is_none() {
            let pc = self.pc;
            last_op = self.step().inspect_err(|e| {
                warn!(pc, gas_used = self.gas.used(), "run faulted: {e}");
            })?;
            steps += 1;
            trace!(
                pc,
                op = mnemonic(last_op).unwrap_or("UNKNOWN"),
                gas_used = self.gas.used(),
                depth = self.stack.len(),
                "step"
            );
            if self.halted.is_none() && self.notify(observer, last_op, false) == StepSignal::Cancel {
                warn!(pc = self.pc, "run cancelled by observer");
                return Err(EvmError::Cancelled(self.pc));
            }
        }

        let halt = self.halted.unwrap_or(Halt::Stop);
        if halt == Halt::Revert {
            self.storage = initial_storage;
        }
        // Nothing runs after the final step, so its signal has no effect.
        let _ = self.notify(observer, last_op, true);
        debug!(halt = halt.as_str(), gas_used = self.gas.used(), steps, output_len = self.output.len(), "run halted");

        Ok(ExecutionResult {
            halt,
            output: self.output,
            gas_used: self.gas.used(),
            pc: self.pc,
            steps,
            stack: self.stack,
            memory: self.memory,
            storage: self.storage,
        })
    }

    fn notify<O: StepObserver + ?Sized>(&self, observer: &mut O, opcode: u8, is_final: bool) -> StepSignal {
        observer.on_step(&Step {
            pc: self.pc,
            opcode,
            gas_used: self.gas.used(),
            stack: &self.stack,
            memory: &self.memory,
            storage: &self.storage,
            is_final,
        })
    }

    /// Executes the instruction at `pc`, charges its gas and advances `pc`.
    fn step(&mut self) -> EvmResult<u8> {
        let pc = self.pc;
        let op = self.code[pc];
        let mut next = pc + 1;
        let mut gas = static_gas(op);

        match op {
            STOP => self.halt(Halt::Stop, Vec::new()),

            // Arithmetic
            ADD => self.binop(word::add)?,
            MUL => self.binop(word::mul)?,
            SUB => self.binop(word::sub)?,
            DIV => self.binop(word::div)?,
            SDIV => self.binop(word::sdiv)?,
            MOD => self.binop(word::rem)?,
            SMOD => self.binop(word::smod)?,
            ADDMOD => self.ternop(word::addmod)?,
            MULMOD => self.ternop(word::mulmod)?,
            EXP => self.binop(word::exp)?,
            SIGNEXTEND => self.binop(word::signextend)?,

            // Logic/compare
            LT => self.binop(word::lt)?,
            GT => self.binop(word::gt)?,
            SLT => self.binop(word::slt)?,
            SGT => self.binop(word::sgt)?,
            EQ => self.binop(word::eq)?,
            ISZERO => self.unop(word::iszero)?,
            AND => self.binop(word::and)?,
            OR => self.binop(word::or)?,
            XOR => self.binop(word::xor)?,
            NOT => self.unop(word::not)?,
            BYTE => self.binop(word::byte)?,
            SHL => self.binop(word::shl)?,
            SHR => self.binop(word::shr)?,
            SAR => self.binop(word::sar)?,

            SHA3 => {
                let (offset, len) = self.pop_range()?;
                let data = self.memory.read(offset, len);
                self.stack.push(sha3_word(&data))?;
                gas = sha3_gas(len);
            }

            // Env opcodes
            ADDRESS => self.stack.push(self.ctx.account.address)?,
            BALANCE => {
                let addr = self.stack.pop()?;
                let balance = self.accounts.account(addr).map(|a| a.balance).unwrap_or_default();
                self.stack.push(balance)?;
            }
            ORIGIN => self.stack.push(self.ctx.transaction.origin)?,
            CALLER => self.stack.push(self.ctx.message.caller)?,
            CALLVALUE => self.stack.push(self.ctx.message.value)?,
            CALLDATALOAD => {
                let offset = self.stack.pop()?;
                let bytes = padded_slice(&self.ctx.message.data, offset, 32);
                self.stack.push(word_from_be_bytes(&bytes))?;
            }
            CALLDATASIZE => self.stack.push(U256::from(self.ctx.message.data.len()))?,
            CALLDATACOPY => {
                let len = self.copy_to_memory(|evm, offset, len| padded_slice(&evm.ctx.message.data, offset, len))?;
                gas = copy_gas(cost::COPY_BASE, len);
            }
            CODESIZE => self.stack.push(U256::from(self.code.len()))?,
            CODECOPY => {
                let len = self.copy_to_memory(|evm, offset, len| padded_slice(&evm.code, offset, len))?;
                gas = copy_gas(cost::COPY_BASE, len);
            }
            GASPRICE => self.stack.push(self.ctx.transaction.gas_price)?,
            EXTCODESIZE => {
                let addr = self.stack.pop()?;
                let size = self.accounts.account(addr).map(|a| a.code.len()).unwrap_or(0);
                self.stack.push(U256::from(size))?;
            }
            EXTCODECOPY => {
                let addr = self.stack.pop()?;
                let accounts = self.accounts;
                let code = accounts.account(addr).map(|a| a.code.as_slice()).unwrap_or(&[]);
                let len = self.copy_to_memory(|_, offset, len| padded_slice(code, offset, len))?;
                gas = copy_gas(cost::EXTCODE, len);
            }
            // No calls are made, so the return data buffer is always empty.
            RETURNDATASIZE => self.stack.push(U256::zero())?,
            RETURNDATACOPY => {
                let dest = self.stack.pop()?;
                let offset = self.stack.pop()?;
                let length = self.stack.pop()?;
                if !offset.is_zero() || !length.is_zero() {
                    return Err(EvmError::ReturnDataOutOfBounds);
                }
                self.memory.resolve(dest, length)?;
            }
            EXTCODEHASH => {
                let addr = self.stack.pop()?;
                let hash = self.accounts.account(addr).map(|a| sha3_word(&a.code)).unwrap_or_default();
                self.stack.push(hash)?;
            }

            // Block env
            BLOCKHASH => {
                self.stack.pop()?;
                self.stack.push(U256::zero())?;
            }
            COINBASE => self.stack.push(self.ctx.block.coinbase)?,
            TIMESTAMP => self.stack.push(self.ctx.block.timestamp)?,
            NUMBER => self.stack.push(self.ctx.block.number)?,
            DIFFICULTY => self.stack.push(self.ctx.block.difficulty)?,
            GASLIMIT => self.stack.push(self.ctx.block.gas_limit)?,
            CHAINID => self.stack.push(self.ctx.chain_id)?,
            SELFBALANCE => self.stack.push(self.ctx.account.balance)?,
            BASEFEE => self.stack.push(self.ctx.block.basefee)?,

            // Stack/Memory/Storage
            POP => {
                self.stack.pop()?;
            }
            MLOAD => {
                let offset = self.stack.pop()?;
                let (o, _) = self.memory.resolve(offset, U256::from(32))?;
                let value = word_from_be_bytes(&self.memory.read(o, 32));
                self.stack.push(value)?;
            }
            MSTORE => {
                let offset = self.stack.pop()?;
                let value = self.stack.pop()?;
                let (o, _) = self.memory.resolve(offset, U256::from(32))?;
                self.memory.write(o, &word_to_be_bytes(value), 32);
            }
            MSTORE8 => {
                let offset = self.stack.pop()?;
                let value = self.stack.pop()?;
                let (o, _) = self.memory.resolve(offset, U256::one())?;
                self.memory.write(o, &[value.byte(0)], 1);
            }
            SLOAD => {
                let key = self.stack.pop()?;
                self.stack.push(self.storage.load(key))?;
            }
            SSTORE => {
                let key = self.stack.pop()?;
                let value = self.stack.pop()?;
                gas = sstore_gas(self.storage.load(key), value);
                self.storage.store(key, value);
            }

            // Flow
            JUMP => {
                let dest = self.stack.pop()?;
                next = self.jump_target(dest)?;
            }
            JUMPI => {
                let dest = self.stack.pop()?;
                let cond = self.stack.pop()?;
                if !cond.is_zero() {
                    next = self.jump_target(dest)?;
                }
            }
            JUMPDEST => {}

            // Introspection
            PC => self.stack.push(U256::from(pc))?,
            MSIZE => self.stack.push(U256::from(self.memory.size()))?,
            GAS => self.stack.push(U256::from(self.gas.remaining().saturating_sub(gas)))?,

            // PUSH
            PUSH0 => self.stack.push(U256::zero())?,
            x if (PUSH1..=PUSH32).contains(&x) => {
                let n = immediate_len(x);
                let start = pc + 1;
                let end = (start + n).min(self.code.len());
                // Immediate bytes cut off by the end of code read as zero.
                let mut buf = vec![0u8; n];
                buf[..end - start].copy_from_slice(&self.code[start..end]);
                self.stack.push(word_from_be_bytes(&buf))?;
                next = start + n;
            }

            x if (DUP1..=DUP16).contains(&x) => self.stack.dup((x - DUP1 + 1) as usize)?,
            x if (SWAP1..=SWAP16).contains(&x) => self.stack.swap_top((x - SWAP1 + 1) as usize)?,

            // RETURN / REVERT
            RETURN => {
                let (offset, len) = self.pop_range()?;
                let data = self.memory.read(offset, len);
                self.halt(Halt::Return, data);
            }
            REVERT => {
                let (offset, len) = self.pop_range()?;
                let data = self.memory.read(offset, len);
                self.halt(Halt::Revert, data);
            }

            x if (LOG0..=LOG4).contains(&x) => return Err(self.unsupported(x)),
            CREATE | CALL | CALLCODE | DELEGATECALL | CREATE2 | STATICCALL | INVALID | SELFDESTRUCT => {
                return Err(self.unsupported(op))
            }

            _ => return Err(EvmError::UnknownOpcode { opcode: op, pc }),
        }

        self.gas.charge(gas)?;
        self.pc = next;
        Ok(op)
    }

    fn halt(&mut self, halt: Halt, output: Vec<u8>) {
        self.halted = Some(halt);
        self.output = output;
    }

    fn unsupported(&self, op: u8) -> EvmError {
        EvmError::Unsupported { mnemonic: mnemonic(op).unwrap_or("UNKNOWN"), pc: self.pc }
    }

    fn unop(&mut self, f: fn(U256) -> U256) -> EvmResult<()> {
        let a = self.stack.pop()?;
        self.stack.push(f(a))
    }

    /// `a` is the top of the stack, `b` the element below it.
    fn binop(&mut self, f: fn(U256, U256) -> U256) -> EvmResult<()> {
        let a = self.stack.pop()?;
        let b = self.stack.pop()?;
        self.stack.push(f(a, b))
    }

    fn ternop(&mut self, f: fn(U256, U256, U256) -> U256) -> EvmResult<()> {
        let a = self.stack.pop()?;
        let b = self.stack.pop()?;
        let n = self.stack.pop()?;
        self.stack.push(f(a, b, n))
    }

    /// Pops `offset, length` and resolves them to a memory range.
    fn pop_range(&mut self) -> EvmResult<(usize, usize)> {
        let offset = self.stack.pop()?;
        let length = self.stack.pop()?;
        self.memory.resolve(offset, length)
    }

    /// Pops `dest, offset, length`, fetches the source bytes and writes them to
    /// memory at `dest`. Returns the number of bytes copied.
    fn copy_to_memory<F>(&mut self, source: F) -> EvmResult<usize>
    where
        F: FnOnce(&Self, U256, usize) -> Vec<u8>,
    {
        let dest = self.stack.pop()?;
        let offset = self.stack.pop()?;
        let length = self.stack.pop()?;
        let (m, len) = self.memory.resolve(dest, length)?;
        let data = source(&*self, offset, len);
        self.memory.write(m, &data, len);
        Ok(len)
    }

    /// Without validation any target is taken as is, and one past the end of
    /// the code halts the run.
    fn jump_target(&self, dest: U256) -> EvmResult<usize> {
        match word_to_usize(dest) {
            Some(d) if !self.config.validate_jumps || self.jumpdests.contains(&d) => Ok(d),
            None if !self.config.validate_jumps => Ok(self.code.len()),
            _ => Err(EvmError::InvalidJump(dest)),
        }
    }
}

/// Runs `code` once against `ctx`.
pub fn run<O: StepObserver + ?Sized>(
    code: &[u8],
    ctx: &ExecutionContext,
    accounts: &AccountRegistry,
    config: EvmConfig,
    observer: &mut O,
) -> EvmResult<ExecutionResult> {
    Evm::new(code.to_vec(), ctx, accounts, config).run(observer)
}

/// `len` bytes of `src` from `offset`, zero filled past its end.
fn padded_slice(src: &[u8], offset: U256, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    if let Some(start) = word_to_usize(offset) {
        if start < src.len() {
            let end = src.len().min(start.saturating_add(len));
            out[..end - start].copy_from_slice(&src[start..end]);
        }
    }
    out
}

fn scan_jumpdests(code: &[u8]) -> HashSet<usize> {
    let mut set = HashSet::new();
    let mut pc = 0usize;
    while pc < code.len() {
        let op = code[pc];
        if op == JUMPDEST {
            set.insert(pc);
        }
        pc += 1 + immediate_len(op);
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::NoopObserver;

    fn exec(code: Vec<u8>) -> EvmResult<ExecutionResult> {
        let ctx = ExecutionContext::default();
        let accounts = AccountRegistry::new();
        Evm::new(code, &ctx, &accounts, EvmConfig::default()).run(&mut NoopObserver)
    }

    #[test]
    fn simple_add() {
        // PUSH1 0x42; PUSH1 0xFF; ADD
        let result = exec(vec![0x60, 0x42, 0x60, 0xFF, 0x01]).unwrap();
        assert_eq!(result.stack.len(), 1);
        assert_eq!(result.stack.as_slice()[0], U256::from(0x42u64 + 0xFFu64));
        assert_eq!(result.gas_used, 9);
        assert_eq!(result.halt, Halt::Stop);
    }

    #[test]
    fn push32_and_pop() {
        // PUSH32 0x01.. then POP
        let mut code = vec![0x7f];
        code.extend(std::iter::repeat(0u8).take(31));
        code.push(1);
        code.push(0x50); // POP
        let result = exec(code).unwrap();
        assert!(result.stack.is_empty());
    }

    #[test]
    fn truncated_push_pads_right() {
        let result = exec(vec![0x61, 0xff]).unwrap();
        assert_eq!(result.stack.as_slice(), &[U256::from(0xff00)]);
    }

    #[test]
    fn sub_uses_top_as_minuend() {
        // PUSH1 3; PUSH1 10; SUB -> 10 - 3
        let result = exec(vec![0x60, 0x03, 0x60, 0x0a, 0x03]).unwrap();
        assert_eq!(result.stack.as_slice(), &[U256::from(7)]);
    }

    #[test]
    fn unknown_opcode_faults() {
        assert_eq!(exec(vec![0x60, 0x01, 0x0c]).unwrap_err(), EvmError::UnknownOpcode { opcode: 0x0c, pc: 2 });
    }

    #[test]
    fn binop_underflow_faults() {
        assert_eq!(exec(vec![0x60, 0x01, 0x01]).unwrap_err(), EvmError::StackUnderflow);
    }

    #[test]
    fn call_family_is_unsupported() {
        let err = exec(vec![0xf1]).unwrap_err();
        assert_eq!(err, EvmError::Unsupported { mnemonic: "CALL", pc: 0 });
        assert!(matches!(exec(vec![0xa0]).unwrap_err(), EvmError::Unsupported { mnemonic: "LOG0", .. }));
    }

    #[test]
    fn mstore_mload_round_trip() {
        // PUSH1 0x2a; PUSH1 0; MSTORE; PUSH1 0; MLOAD; MSIZE
        let result = exec(vec![0x60, 0x2a, 0x60, 0x00, 0x52, 0x60, 0x00, 0x51, 0x59]).unwrap();
        assert_eq!(result.stack.as_slice(), &[U256::from(0x2a), U256::from(32)]);
    }

    #[test]
    fn jumpdest_scan_skips_push_data() {
        let dests = scan_jumpdests(&[0x60, 0x5b, 0x5b]);
        assert!(!dests.contains(&1));
        assert!(dests.contains(&2));
    }
}
