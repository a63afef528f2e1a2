use std::fmt;

use crate::opcodes::{immediate_len, mnemonic};

/// A decoded view over one instruction of raw bytecode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    /// `None` for bytes with no catalog entry.
    pub mnemonic: Option<&'static str>,
    /// Opcode byte followed by whatever immediate bytes were present.
    pub bytes: Vec<u8>,
}

impl Instruction {
    pub fn opcode(&self) -> u8 {
        self.bytes[0]
    }

    pub fn immediate(&self) -> &[u8] {
        &self.bytes[1..]
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}: ", self.offset)?;
        match self.mnemonic {
            Some(name) if self.bytes.len() > 1 => write!(f, "{} 0x{}", name, hex::encode(self.immediate())),
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:02x}", self.opcode()),
        }
    }
}

/// Splits bytecode into instructions. A PUSH truncated by the end of the code
/// keeps only the bytes that exist.
pub fn decode(code: &[u8]) -> Vec<Instruction> {
    let mut out = Vec::new();
    let mut pc = 0usize;
    while pc < code.len() {
        let op = code[pc];
        let end = (pc + 1 + immediate_len(op)).min(code.len());
        out.push(Instruction { offset: pc, mnemonic: mnemonic(op), bytes: code[pc..end].to_vec() });
        pc = end;
    }
    out
}

pub fn disassemble(code: &[u8]) -> Vec<String> {
    decode(code).iter().map(ToString::to_string).collect()
}
