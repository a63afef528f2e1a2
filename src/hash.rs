use primitive_types::U256;
use tiny_keccak::{Hasher, Sha3};

/// SHA3-256, the one hash primitive of the engine. Backs both the SHA3
/// opcode and contract address derivation.
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut hasher = Sha3::v256();
    hasher.update(data);
    hasher.finalize(&mut out);
    out
}

pub fn sha3_word(data: &[u8]) -> U256 {
    U256::from_big_endian(&sha3_256(data))
}
