//! Per-instruction observation.
//!
//! After every executed instruction, and once more when the run ends, the
//! engine hands a [`Step`] to a [`StepObserver`] and does not continue until
//! the observer returns. The observer may take as long as it likes; returning
//! [`StepSignal::Cancel`] stops the run before any further instruction.

use std::collections::BTreeMap;

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;

use crate::memory::Memory;
use crate::opcodes::mnemonic;
use crate::stack::Stack;
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSignal {
    Continue,
    Cancel,
}

/// Borrowed view of the machine right after an instruction.
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    /// Offset of the next instruction to decode.
    pub pc: usize,
    /// The instruction just executed.
    pub opcode: u8,
    pub gas_used: u64,
    pub stack: &'a Stack,
    pub memory: &'a Memory,
    pub storage: &'a Storage,
    /// Set on the extra observation made after the run has halted.
    pub is_final: bool,
}

impl Step<'_> {
    pub fn snapshot(&self) -> StepSnapshot {
        StepSnapshot {
            pc: self.pc,
            opcode: self.opcode,
            mnemonic: mnemonic(self.opcode).unwrap_or("UNKNOWN"),
            gas_used: self.gas_used,
            stack: self.stack.as_slice().iter().map(|v| format!("0x{v:x}")).collect(),
            memory: self
                .memory
                .pages()
                .map(|(base, page)| (format!("0x{base:x}"), format!("0x{}", hex::encode(page))))
                .collect(),
            storage: self.storage.iter().map(|(k, v)| (format!("0x{k:x}"), format!("0x{v:x}"))).collect(),
            is_final: self.is_final,
        }
    }
}

/// Owned copy of a [`Step`], detached from the running machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSnapshot {
    pub pc: usize,
    pub opcode: u8,
    pub mnemonic: &'static str,
    pub gas_used: u64,
    /// Bottom to top.
    pub stack: Vec<String>,
    /// Written 32-byte pages, keyed by offset.
    pub memory: BTreeMap<String, String>,
    pub storage: BTreeMap<String, String>,
    pub is_final: bool,
}

pub trait StepObserver {
    fn on_step(&mut self, step: &Step<'_>) -> StepSignal;
}

impl<F> StepObserver for F
where
    F: FnMut(&Step<'_>) -> StepSignal,
{
    fn on_step(&mut self, step: &Step<'_>) -> StepSignal {
        self(step)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StepObserver for NoopObserver {
    fn on_step(&mut self, _step: &Step<'_>) -> StepSignal {
        StepSignal::Continue
    }
}

/// Keeps a snapshot of every step, optionally cancelling after `max_steps`.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    pub steps: Vec<StepSnapshot>,
    pub max_steps: Option<usize>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_steps(max_steps: usize) -> Self {
        Self { steps: Vec::new(), max_steps: Some(max_steps) }
    }
}

impl StepObserver for RecordingObserver {
    fn on_step(&mut self, step: &Step<'_>) -> StepSignal {
        self.steps.push(step.snapshot());
        match self.max_steps {
            Some(max) if self.steps.len() >= max && !step.is_final => StepSignal::Cancel,
            _ => StepSignal::Continue,
        }
    }
}

/// Creates an observer that forwards each step to another thread and blocks
/// until that thread answers through the returned handle.
pub fn channel() -> (ChannelObserver, ObserverHandle) {
    let (step_tx, step_rx) = bounded(1);
    let (ack_tx, ack_rx) = bounded(1);
    (ChannelObserver { steps: step_tx, acks: ack_rx }, ObserverHandle { steps: step_rx, acks: ack_tx })
}

/// Engine side of [`channel`]. A dropped handle counts as a cancellation.
#[derive(Debug)]
pub struct ChannelObserver {
    steps: Sender<StepSnapshot>,
    acks: Receiver<StepSignal>,
}

impl StepObserver for ChannelObserver {
    fn on_step(&mut self, step: &Step<'_>) -> StepSignal {
        if self.steps.send(step.snapshot()).is_err() {
            return StepSignal::Cancel;
        }
        self.acks.recv().unwrap_or(StepSignal::Cancel)
    }
}

/// Driver side of [`channel`].
#[derive(Debug)]
pub struct ObserverHandle {
    steps: Receiver<StepSnapshot>,
    acks: Sender<StepSignal>,
}

impl ObserverHandle {
    /// Waits for the next step. `None` once the run has finished.
    pub fn next_step(&self) -> Option<StepSnapshot> {
        self.steps.recv().ok()
    }

    pub fn resume(&self) {
        let _ = self.acks.send(StepSignal::Continue);
    }

    pub fn cancel(&self) {
        let _ = self.acks.send(StepSignal::Cancel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::U256;

    #[test]
    fn snapshot_renders_hex() {
        let mut stack = Stack::default();
        stack.push(U256::from(8)).unwrap();
        let mut memory = Memory::default();
        memory.write(0, &[0xab], 1);
        let mut storage = Storage::new();
        storage.store(U256::zero(), U256::from(0x2a));
        let step = Step {
            pc: 5,
            opcode: 0x01,
            gas_used: 9,
            stack: &stack,
            memory: &memory,
            storage: &storage,
            is_final: false,
        };
        let snap = step.snapshot();
        assert_eq!(snap.mnemonic, "ADD");
        assert_eq!(snap.stack, vec!["0x8"]);
        assert_eq!(snap.memory.get("0x0").map(String::as_str), Some(format!("0xab{}", "0".repeat(62)).as_str()));
        assert_eq!(snap.storage.get("0x0").map(String::as_str), Some("0x2a"));
    }
}
