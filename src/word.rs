//! 256-bit word arithmetic.
//!
//! Every operator takes canonical unsigned words and returns a canonical
//! unsigned word. Signed operators reinterpret their operands as two's
//! complement through [`I256`] and convert back before returning.

use std::cmp::Ordering;

use primitive_types::{U256, U512};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Sign {
    Plus,
    Minus,
    Zero,
}

const SIGN_BIT_MASK: U256 = U256([
    0xffffffffffffffff,
    0xffffffffffffffff,
    0xffffffffffffffff,
    0x7fffffffffffffff,
]);

/// Sign and magnitude view of a two's-complement word.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct I256(pub Sign, pub U256);

impl I256 {
    pub const fn zero() -> Self {
        Self(Sign::Zero, U256::zero())
    }

    /// -2^255, the one value whose magnitude has the sign bit set.
    pub fn min_value() -> Self {
        Self(Sign::Minus, (U256::MAX & SIGN_BIT_MASK) + U256::one())
    }
}

impl Default for I256 {
    fn default() -> Self {
        Self::zero()
    }
}

impl Ord for I256 {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0, other.0) {
            (Sign::Zero, Sign::Zero) => Ordering::Equal,
            (Sign::Zero, Sign::Plus) => Ordering::Less,
            (Sign::Zero, Sign::Minus) => Ordering::Greater,
            (Sign::Minus, Sign::Zero) => Ordering::Less,
            (Sign::Minus, Sign::Plus) => Ordering::Less,
            (Sign::Minus, Sign::Minus) => self.1.cmp(&other.1).reverse(),
            (Sign::Plus, Sign::Minus) => Ordering::Greater,
            (Sign::Plus, Sign::Zero) => Ordering::Greater,
            (Sign::Plus, Sign::Plus) => self.1.cmp(&other.1),
        }
    }
}

impl PartialOrd for I256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<U256> for I256 {
    fn from(val: U256) -> Self {
        as_signed256(val)
    }
}

impl From<I256> for U256 {
    fn from(val: I256) -> Self {
        as_unsigned256(val)
    }
}

/// Reinterprets an unsigned word as two's complement.
pub fn as_signed256(val: U256) -> I256 {
    if val.is_zero() {
        I256::zero()
    } else if val & SIGN_BIT_MASK == val {
        I256(Sign::Plus, val)
    } else {
        I256(Sign::Minus, (!val).overflowing_add(U256::one()).0)
    }
}

/// Canonicalizes a signed value back to its unsigned 256-bit encoding.
pub fn as_unsigned256(val: I256) -> U256 {
    match val.0 {
        Sign::Zero => U256::zero(),
        Sign::Plus => val.1,
        Sign::Minus => (!val.1).overflowing_add(U256::one()).0,
    }
}

fn bool_word(b: bool) -> U256 {
    if b {
        U256::one()
    } else {
        U256::zero()
    }
}

fn low_u256(v: U512) -> U256 {
    let mut buf = [0u8; 64];
    v.to_big_endian(&mut buf);
    U256::from_big_endian(&buf[32..])
}

pub fn add(a: U256, b: U256) -> U256 {
    a.overflowing_add(b).0
}

pub fn sub(a: U256, b: U256) -> U256 {
    a.overflowing_sub(b).0
}

pub fn mul(a: U256, b: U256) -> U256 {
    a.overflowing_mul(b).0
}

pub fn div(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        U256::zero()
    } else {
        a / b
    }
}

pub fn rem(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        U256::zero()
    } else {
        a % b
    }
}

pub fn sdiv(a: U256, b: U256) -> U256 {
    let a = as_signed256(a);
    let b = as_signed256(b);
    if b.0 == Sign::Zero {
        return U256::zero();
    }
    // MIN / -1 overflows back to MIN.
    if a == I256::min_value() && b == I256(Sign::Minus, U256::one()) {
        return as_unsigned256(I256::min_value());
    }
    let q = a.1 / b.1;
    if q.is_zero() {
        return U256::zero();
    }
    let sign = if a.0 == b.0 { Sign::Plus } else { Sign::Minus };
    as_unsigned256(I256(sign, q))
}

/// Signed remainder; the result takes the sign of the dividend.
pub fn smod(a: U256, b: U256) -> U256 {
    let a = as_signed256(a);
    let b = as_signed256(b);
    if b.0 == Sign::Zero {
        return U256::zero();
    }
    let r = a.1 % b.1;
    if r.is_zero() {
        return U256::zero();
    }
    as_unsigned256(I256(a.0, r))
}

pub fn addmod(a: U256, b: U256, n: U256) -> U256 {
    if n.is_zero() {
        return U256::zero();
    }
    low_u256((U512::from(a) + U512::from(b)) % U512::from(n))
}

pub fn mulmod(a: U256, b: U256, n: U256) -> U256 {
    if n.is_zero() {
        return U256::zero();
    }
    low_u256(a.full_mul(b) % U512::from(n))
}

pub fn exp(base: U256, exponent: U256) -> U256 {
    base.overflowing_pow(exponent).0
}

/// Extends the sign bit of the low `b + 1` bytes of `x` over the whole word.
pub fn signextend(b: U256, x: U256) -> U256 {
    if b >= U256::from(31) {
        return x;
    }
    let bit = b.low_u64() as usize * 8 + 7;
    let mask = (U256::one() << bit) - U256::one();
    if x.bit(bit) {
        x | !mask
    } else {
        x & mask
    }
}

pub fn lt(a: U256, b: U256) -> U256 {
    bool_word(a < b)
}

pub fn gt(a: U256, b: U256) -> U256 {
    bool_word(a > b)
}

pub fn slt(a: U256, b: U256) -> U256 {
    bool_word(as_signed256(a) < as_signed256(b))
}

pub fn sgt(a: U256, b: U256) -> U256 {
    bool_word(as_signed256(a) > as_signed256(b))
}

pub fn eq(a: U256, b: U256) -> U256 {
    bool_word(a == b)
}

pub fn iszero(a: U256) -> U256 {
    bool_word(a.is_zero())
}

pub fn and(a: U256, b: U256) -> U256 {
    a & b
}

pub fn or(a: U256, b: U256) -> U256 {
    a | b
}

pub fn xor(a: U256, b: U256) -> U256 {
    a ^ b
}

pub fn not(a: U256) -> U256 {
    !a
}

/// The `i`-th most significant byte of `x`, or zero when `i >= 32`.
pub fn byte(i: U256, x: U256) -> U256 {
    if i >= U256::from(32) {
        return U256::zero();
    }
    // U256::byte indexes from the least significant end.
    U256::from(x.byte(31 - i.low_u64() as usize))
}

pub fn shl(shift: U256, value: U256) -> U256 {
    if value.is_zero() || shift >= U256::from(256) {
        U256::zero()
    } else {
        value << shift.low_u64() as usize
    }
}

pub fn shr(shift: U256, value: U256) -> U256 {
    if value.is_zero() || shift >= U256::from(256) {
        U256::zero()
    } else {
        value >> shift.low_u64() as usize
    }
}

pub fn sar(shift: U256, value: U256) -> U256 {
    let value = as_signed256(value);

    if value.0 == Sign::Zero || shift >= U256::from(256) {
        match value.0 {
            Sign::Plus | Sign::Zero => U256::zero(),
            Sign::Minus => U256::MAX,
        }
    } else {
        let shift = shift.low_u64() as usize;
        match value.0 {
            Sign::Plus | Sign::Zero => value.1 >> shift,
            Sign::Minus => {
                let shifted = ((value.1.overflowing_sub(U256::one()).0) >> shift)
                    .overflowing_add(U256::one())
                    .0;
                as_unsigned256(I256(Sign::Minus, shifted))
            }
        }
    }
}
