// Opcode byte values and the read-only catalog mapping each byte to its
// mnemonic and immediate length.

// 0x00 range - arithmetic/stop
pub const STOP: u8 = 0x00;
pub const ADD: u8 = 0x01;
pub const MUL: u8 = 0x02;
pub const SUB: u8 = 0x03;
pub const DIV: u8 = 0x04;
pub const SDIV: u8 = 0x05;
pub const MOD: u8 = 0x06;
pub const SMOD: u8 = 0x07;
pub const ADDMOD: u8 = 0x08;
pub const MULMOD: u8 = 0x09;
pub const EXP: u8 = 0x0A;
pub const SIGNEXTEND: u8 = 0x0B;
// 0x10 range - comparison/bitwise
pub const LT: u8 = 0x10;
pub const GT: u8 = 0x11;
pub const SLT: u8 = 0x12;
pub const SGT: u8 = 0x13;
pub const EQ: u8 = 0x14;
pub const ISZERO: u8 = 0x15;
pub const AND: u8 = 0x16;
pub const OR: u8 = 0x17;
pub const XOR: u8 = 0x18;
pub const NOT: u8 = 0x19;
pub const BYTE: u8 = 0x1A;
pub const SHL: u8 = 0x1B;
pub const SHR: u8 = 0x1C;
pub const SAR: u8 = 0x1D;
// SHA3
pub const SHA3: u8 = 0x20;

// 0x30 range - environment
pub const ADDRESS: u8 = 0x30;
pub const BALANCE: u8 = 0x31;
pub const ORIGIN: u8 = 0x32;
pub const CALLER: u8 = 0x33;
pub const CALLVALUE: u8 = 0x34;
pub const CALLDATALOAD: u8 = 0x35;
pub const CALLDATASIZE: u8 = 0x36;
pub const CALLDATACOPY: u8 = 0x37;
pub const CODESIZE: u8 = 0x38;
pub const CODECOPY: u8 = 0x39;
pub const GASPRICE: u8 = 0x3A;
pub const EXTCODESIZE: u8 = 0x3B;
pub const EXTCODECOPY: u8 = 0x3C;
pub const RETURNDATASIZE: u8 = 0x3D;
pub const RETURNDATACOPY: u8 = 0x3E;
pub const EXTCODEHASH: u8 = 0x3F;

// 0x40 range - block
pub const BLOCKHASH: u8 = 0x40;
pub const COINBASE: u8 = 0x41;
pub const TIMESTAMP: u8 = 0x42;
pub const NUMBER: u8 = 0x43;
pub const DIFFICULTY: u8 = 0x44;
pub const GASLIMIT: u8 = 0x45;
pub const CHAINID: u8 = 0x46;
pub const SELFBALANCE: u8 = 0x47;
pub const BASEFEE: u8 = 0x48;

// 0x50 range - stack/memory/storage/flow
pub const POP: u8 = 0x50;
pub const MLOAD: u8 = 0x51;
pub const MSTORE: u8 = 0x52;
pub const MSTORE8: u8 = 0x53;
pub const SLOAD: u8 = 0x54;
pub const SSTORE: u8 = 0x55;
pub const JUMP: u8 = 0x56;
pub const JUMPI: u8 = 0x57;
pub const PC: u8 = 0x58;
pub const MSIZE: u8 = 0x59;
pub const GAS: u8 = 0x5A;
pub const JUMPDEST: u8 = 0x5B;
pub const PUSH0: u8 = 0x5F; // Shanghai

// 0x60..0x7f - PUSH1..PUSH32
pub const PUSH1: u8 = 0x60; // start
pub const PUSH32: u8 = 0x7F; // end

// 0x80..0x8f - DUP1..DUP16
pub const DUP1: u8 = 0x80;
pub const DUP16: u8 = 0x8F;

// 0x90..0x9f - SWAP1..SWAP16
pub const SWAP1: u8 = 0x90;
pub const SWAP16: u8 = 0x9F;

// 0xa0..0xa4 - LOG0..LOG4
pub const LOG0: u8 = 0xA0;
pub const LOG4: u8 = 0xA4;

// 0xf0 range - system
pub const CREATE: u8 = 0xF0;
pub const CALL: u8 = 0xF1;
pub const CALLCODE: u8 = 0xF2;
pub const RETURN: u8 = 0xF3;
pub const DELEGATECALL: u8 = 0xF4;
pub const CREATE2: u8 = 0xF5;
pub const STATICCALL: u8 = 0xFA;
pub const REVERT: u8 = 0xFD;
pub const INVALID: u8 = 0xFE;
pub const SELFDESTRUCT: u8 = 0xFF;

const PUSH_NAMES: [&str; 32] = [
    "PUSH1", "PUSH2", "PUSH3", "PUSH4", "PUSH5", "PUSH6", "PUSH7", "PUSH8", "PUSH9", "PUSH10",
    "PUSH11", "PUSH12", "PUSH13", "PUSH14", "PUSH15", "PUSH16", "PUSH17", "PUSH18", "PUSH19",
    "PUSH20", "PUSH21", "PUSH22", "PUSH23", "PUSH24", "PUSH25", "PUSH26", "PUSH27", "PUSH28",
    "PUSH29", "PUSH30", "PUSH31", "PUSH32",
];

const DUP_NAMES: [&str; 16] = [
    "DUP1", "DUP2", "DUP3", "DUP4", "DUP5", "DUP6", "DUP7", "DUP8", "DUP9", "DUP10", "DUP11",
    "DUP12", "DUP13", "DUP14", "DUP15", "DUP16",
];

const SWAP_NAMES: [&str; 16] = [
    "SWAP1", "SWAP2", "SWAP3", "SWAP4", "SWAP5", "SWAP6", "SWAP7", "SWAP8", "SWAP9", "SWAP10",
    "SWAP11", "SWAP12", "SWAP13", "SWAP14", "SWAP15", "SWAP16",
];

const LOG_NAMES: [&str; 5] = ["LOG0", "LOG1", "LOG2", "LOG3", "LOG4"];

/// Catalog entry for an assigned opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub code: u8,
    pub mnemonic: &'static str,
    /// Number of immediate bytes following the opcode (PUSH1..PUSH32 only).
    pub immediate_len: usize,
}

impl OpcodeInfo {
    /// Bytes spanned by the instruction, opcode included.
    pub fn byte_len(&self) -> usize {
        1 + self.immediate_len
    }
}

pub fn immediate_len(op: u8) -> usize {
    if (PUSH1..=PUSH32).contains(&op) {
        (op - PUSH1 + 1) as usize
    } else {
        0
    }
}

pub fn mnemonic(op: u8) -> Option<&'static str> {
    let name = match op {
        STOP => "STOP",
        ADD => "ADD",
        MUL => "MUL",
        SUB => "SUB",
        DIV => "DIV",
        SDIV => "SDIV",
        MOD => "MOD",
        SMOD => "SMOD",
        ADDMOD => "ADDMOD",
        MULMOD => "MULMOD",
        EXP => "EXP",
        SIGNEXTEND => "SIGNEXTEND",
        LT => "LT",
        GT => "GT",
        SLT => "SLT",
        SGT => "SGT",
        EQ => "EQ",
        ISZERO => "ISZERO",
        AND => "AND",
        OR => "OR",
        XOR => "XOR",
        NOT => "NOT",
        BYTE => "BYTE",
        SHL => "SHL",
        SHR => "SHR",
        SAR => "SAR",
        SHA3 => "SHA3",
        ADDRESS => "ADDRESS",
        BALANCE => "BALANCE",
        ORIGIN => "ORIGIN",
        CALLER => "CALLER",
        CALLVALUE => "CALLVALUE",
        CALLDATALOAD => "CALLDATALOAD",
        CALLDATASIZE => "CALLDATASIZE",
        CALLDATACOPY => "CALLDATACOPY",
        CODESIZE => "CODESIZE",
        CODECOPY => "CODECOPY",
        GASPRICE => "GASPRICE",
        EXTCODESIZE => "EXTCODESIZE",
        EXTCODECOPY => "EXTCODECOPY",
        RETURNDATASIZE => "RETURNDATASIZE",
        RETURNDATACOPY => "RETURNDATACOPY",
        EXTCODEHASH => "EXTCODEHASH",
        BLOCKHASH => "BLOCKHASH",
        COINBASE => "COINBASE",
        TIMESTAMP => "TIMESTAMP",
        NUMBER => "NUMBER",
        DIFFICULTY => "DIFFICULTY",
        GASLIMIT => "GASLIMIT",
        CHAINID => "CHAINID",
        SELFBALANCE => "SELFBALANCE",
        BASEFEE => "BASEFEE",
        POP => "POP",
        MLOAD => "MLOAD",
        MSTORE => "MSTORE",
        MSTORE8 => "MSTORE8",
        SLOAD => "SLOAD",
        SSTORE => "SSTORE",
        JUMP => "JUMP",
        JUMPI => "JUMPI",
        PC => "PC",
        MSIZE => "MSIZE",
        GAS => "GAS",
        JUMPDEST => "JUMPDEST",
        PUSH0 => "PUSH0",
        x if (PUSH1..=PUSH32).contains(&x) => PUSH_NAMES[(x - PUSH1) as usize],
        x if (DUP1..=DUP16).contains(&x) => DUP_NAMES[(x - DUP1) as usize],
        x if (SWAP1..=SWAP16).contains(&x) => SWAP_NAMES[(x - SWAP1) as usize],
        x if (LOG0..=LOG4).contains(&x) => LOG_NAMES[(x - LOG0) as usize],
        CREATE => "CREATE",
        CALL => "CALL",
        CALLCODE => "CALLCODE",
        RETURN => "RETURN",
        DELEGATECALL => "DELEGATECALL",
        CREATE2 => "CREATE2",
        STATICCALL => "STATICCALL",
        REVERT => "REVERT",
        INVALID => "INVALID",
        SELFDESTRUCT => "SELFDESTRUCT",
        _ => return None,
    };
    Some(name)
}

/// Looks up an opcode byte. Unassigned bytes return `None`.
pub fn lookup(op: u8) -> Option<OpcodeInfo> {
    mnemonic(op).map(|mnemonic| OpcodeInfo { code: op, mnemonic, immediate_len: immediate_len(op) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_immediates() {
        assert_eq!(immediate_len(PUSH1), 1);
        assert_eq!(immediate_len(PUSH32), 32);
        assert_eq!(immediate_len(PUSH0), 0);
        assert_eq!(lookup(0x61).unwrap().mnemonic, "PUSH2");
        assert_eq!(lookup(0x61).unwrap().byte_len(), 3);
    }

    #[test]
    fn distinct_modular_and_shift_bytes() {
        assert_eq!(mnemonic(0x08), Some("ADDMOD"));
        assert_eq!(mnemonic(0x09), Some("MULMOD"));
        assert_eq!(mnemonic(0x1B), Some("SHL"));
        assert_eq!(mnemonic(0x1C), Some("SHR"));
        assert_eq!(mnemonic(0x1D), Some("SAR"));
    }

    #[test]
    fn unassigned_bytes() {
        assert_eq!(lookup(0x0C), None);
        assert_eq!(lookup(0x21), None);
        assert_eq!(lookup(0xEF), None);
        assert_eq!(mnemonic(0x8F), Some("DUP16"));
        assert_eq!(mnemonic(0x9F), Some("SWAP16"));
        assert_eq!(mnemonic(0xA4), Some("LOG4"));
    }
}
