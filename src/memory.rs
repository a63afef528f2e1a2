use std::collections::BTreeMap;

use primitive_types::U256;

use crate::codec::word_to_usize;
use crate::error::{EvmError, EvmResult};

/// Default ceiling on the number of bytes one instruction may read or copy.
pub const DEFAULT_MAX_RANGE_LEN: usize = 16 * 1024 * 1024;

const PAGE: usize = 32;

/// One recorded store into memory, kept for observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryWrite {
    pub offset: usize,
    pub bytes: Vec<u8>,
    pub length: usize,
}

/// Byte-addressed scratch memory with no capacity of its own. Only the
/// 32-byte pages that were written are stored; everything else reads as zero.
#[derive(Debug, Clone)]
pub struct Memory {
    pages: BTreeMap<usize, [u8; PAGE]>,
    // Highest touched offset, rounded up to a whole 32-byte word.
    active: usize,
    writes: Vec<MemoryWrite>,
    max_range_len: usize,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RANGE_LEN)
    }
}

impl Memory {
    pub fn new(max_range_len: usize) -> Self {
        Self { pages: BTreeMap::new(), active: 0, writes: Vec::new(), max_range_len }
    }

    /// Active size in bytes, as reported by MSIZE.
    pub fn size(&self) -> usize {
        self.active
    }

    /// Written pages in address order, keyed by their first byte offset.
    pub fn pages(&self) -> impl Iterator<Item = (usize, &[u8; PAGE])> {
        self.pages.iter().map(|(base, page)| (*base, page))
    }

    pub fn writes(&self) -> &[MemoryWrite] {
        &self.writes
    }

    /// Converts a word-sized range to machine indices and marks it active.
    /// Empty ranges are always valid and touch nothing. Any offset is
    /// accepted as long as the end of the range fits in `usize`; only the
    /// length is held to `max_range_len`.
    pub fn resolve(&mut self, offset: U256, length: U256) -> EvmResult<(usize, usize)> {
        if length.is_zero() {
            return Ok((0, 0));
        }
        let invalid = || EvmError::InvalidMemoryRange { offset, length };
        let start = word_to_usize(offset).ok_or_else(invalid)?;
        let len = word_to_usize(length).filter(|len| *len <= self.max_range_len).ok_or_else(invalid)?;
        let end = start.checked_add(len).and_then(|end| end.checked_next_multiple_of(PAGE)).ok_or_else(invalid)?;
        self.active = self.active.max(end);
        Ok((start, len))
    }

    /// Reads `length` bytes starting at `offset`, zero for unwritten bytes.
    pub fn read(&self, offset: usize, length: usize) -> Vec<u8> {
        let mut out = vec![0u8; length];
        let end = offset.saturating_add(length);
        let first = offset - offset % PAGE;
        for (&base, page) in self.pages.range(first..end) {
            let from = base.max(offset);
            let to = base.saturating_add(PAGE).min(end);
            out[from - offset..to - offset].copy_from_slice(&page[from - base..to - base]);
        }
        out
    }

    /// Writes `length` bytes at `offset`. A short `bytes` is zero padded on
    /// the right; a long one is truncated.
    pub fn write(&mut self, offset: usize, bytes: &[u8], length: usize) {
        let length = length.min(usize::MAX - offset);
        if length == 0 {
            return;
        }
        let mut pos = 0;
        while pos < length {
            let addr = offset + pos;
            let base = addr - addr % PAGE;
            let start = addr - base;
            let n = (PAGE - start).min(length - pos);
            let page = self.pages.entry(base).or_insert([0u8; PAGE]);
            for (k, slot) in page[start..start + n].iter_mut().enumerate() {
                *slot = bytes.get(pos + k).copied().unwrap_or(0);
            }
            pos += n;
        }
        let end = (offset + length).checked_next_multiple_of(PAGE).unwrap_or(usize::MAX);
        self.active = self.active.max(end);
        let n = bytes.len().min(length);
        self.writes.push(MemoryWrite { offset, bytes: bytes[..n].to_vec(), length });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_reads_zero() {
        let memory = Memory::default();
        assert_eq!(memory.read(1000, 4), vec![0, 0, 0, 0]);
        assert_eq!(memory.pages().count(), 0);
    }

    #[test]
    fn write_then_read_pads() {
        let mut memory = Memory::default();
        memory.write(2, &[0xaa, 0xbb], 4);
        assert_eq!(memory.read(0, 8), vec![0, 0, 0xaa, 0xbb, 0, 0, 0, 0]);
        assert_eq!(memory.size(), 32);
        assert_eq!(memory.writes().len(), 1);
        assert_eq!(memory.writes()[0].length, 4);
    }

    #[test]
    fn overwrite_clears_tail() {
        let mut memory = Memory::default();
        memory.write(0, &[1, 2, 3, 4], 4);
        memory.write(0, &[9], 4);
        assert_eq!(memory.read(0, 4), vec![9, 0, 0, 0]);
    }

    #[test]
    fn writes_across_page_boundaries() {
        let mut memory = Memory::default();
        let bytes: Vec<u8> = (1..=40).collect();
        memory.write(30, &bytes, 40);
        assert_eq!(memory.read(30, 40), bytes);
        assert_eq!(memory.read(28, 4), vec![0, 0, 1, 2]);
        assert_eq!(memory.pages().map(|(base, _)| base).collect::<Vec<_>>(), vec![0, 32, 64]);
        assert_eq!(memory.size(), 96);
    }

    #[test]
    fn far_offsets_stay_sparse() {
        let mut memory = Memory::default();
        let (offset, len) = memory.resolve(U256::from(0x0200_0000u64), U256::from(32)).unwrap();
        assert_eq!(memory.read(offset, len), vec![0u8; 32]);
        memory.write(offset, &[0x2a; 32], 32);
        assert_eq!(memory.read(offset, len), vec![0x2a; 32]);
        assert_eq!(memory.pages().count(), 1);
        assert_eq!(memory.size(), 0x0200_0020);
    }

    #[test]
    fn resolve_rejects_unrepresentable_ranges() {
        let mut memory = Memory::new(1024);
        assert!(memory.resolve(U256::MAX, U256::one()).is_err());
        assert!(memory.resolve(U256::from(usize::MAX), U256::one()).is_err());
        assert!(memory.resolve(U256::zero(), U256::from(1025)).is_err());
        assert_eq!(memory.resolve(U256::MAX, U256::zero()).unwrap(), (0, 0));
        assert_eq!(memory.resolve(U256::from(40), U256::from(1)).unwrap(), (40, 1));
        assert_eq!(memory.size(), 64);
    }
}
