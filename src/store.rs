//! Concat-direct sequence sets: one contiguous buffer plus record limits.

use serde::{Deserialize, Serialize};
use std::str;

use crate::error::*;

/// A concat-direct set of byte sequences: record `i` is
/// `concat[limits[i]..limits[i+1]]`. `limits` is monotone, starts at 0 and
/// ends at `concat.len()`. Built once, read-only thereafter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeqStore {
    concat: Vec<u8>,
    limits: Vec<u64>,
}

impl Default for SeqStore {
    fn default() -> Self {
        SeqStore::new()
    }
}

impl SeqStore {
    pub fn new() -> SeqStore {
        SeqStore { concat: Vec::new(), limits: vec![0] }
    }

    pub fn push(&mut self, seq: &[u8]) {
        self.concat.extend_from_slice(seq);
        self.limits.push(self.concat.len() as u64);
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.limits.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> &[u8] {
        &self.concat[self.limits[i] as usize..self.limits[i + 1] as usize]
    }

    pub fn get_str(&self, i: usize) -> LocustResult<&str> {
        Ok(str::from_utf8(self.get(i))?)
    }

    pub fn seq_len(&self, i: usize) -> usize {
        (self.limits[i + 1] - self.limits[i]) as usize
    }

    pub fn concat(&self) -> &[u8] {
        &self.concat
    }

    pub fn limits(&self) -> &[u64] {
        &self.limits
    }

    /// Total residue count across all records.
    pub fn total(&self) -> u64 {
        *self.limits.last().unwrap()
    }

    /// Map a concat offset to (record, offset-within-record).
    pub fn rank(&self, pos: u64) -> (u32, u32) {
        let rec = self.limits.partition_point(|&l| l <= pos) - 1;
        (rec as u32, (pos - self.limits[rec]) as u32)
    }

    /// Validate the limit invariants after loading from disk.
    pub fn check(&self) -> LocustResult<()> {
        if self.limits.is_empty() || self.limits[0] != 0 {
            return Err(LocustError::IndexIncompatible("sequence set limits must start at 0"
                .to_string()));
        }
        if self.limits.windows(2).any(|w| w[0] > w[1]) {
            return Err(LocustError::IndexIncompatible("sequence set limits not monotone"
                .to_string()));
        }
        if *self.limits.last().unwrap() != self.concat.len() as u64 {
            return Err(LocustError::IndexIncompatible(
                "sequence set limits do not cover the buffer".to_string(),
            ));
        }
        Ok(())
    }
}

const OFFSET_BITS: u32 = 26;
const SEQ_BITS: u32 = 22;

/// A database position, (record, offset) packed into the low 48 bits of a
/// word: 22 bits of record id, 26 bits of offset.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PackedPos(u64);

impl PackedPos {
    pub fn new(seq: u32, offset: u32) -> PackedPos {
        debug_assert!(seq < (1 << SEQ_BITS));
        debug_assert!(offset < (1 << OFFSET_BITS));
        PackedPos(((seq as u64) << OFFSET_BITS) | offset as u64)
    }

    pub fn seq(&self) -> u32 {
        (self.0 >> OFFSET_BITS) as u32
    }

    pub fn offset(&self) -> u32 {
        (self.0 & ((1 << OFFSET_BITS) - 1)) as u32
    }
}

/// A concat-direct set of positions, used for the masking interval files.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PosStore {
    concat: Vec<u64>,
    limits: Vec<u64>,
}

impl PosStore {
    pub fn new() -> PosStore {
        PosStore { concat: Vec::new(), limits: vec![0] }
    }

    pub fn push(&mut self, positions: &[u64]) {
        self.concat.extend_from_slice(positions);
        self.limits.push(self.concat.len() as u64);
    }

    pub fn len(&self) -> usize {
        self.limits.len().saturating_sub(1)
    }

    pub fn get(&self, i: usize) -> &[u64] {
        &self.concat[self.limits[i] as usize..self.limits[i + 1] as usize]
    }

    pub fn check(&self) -> LocustResult<()> {
        if self.limits.is_empty() || self.limits[0] != 0 {
            return Err(LocustError::IndexIncompatible("position set limits must start at 0"
                .to_string()));
        }
        if self.limits.windows(2).any(|w| w[0] > w[1]) {
            return Err(LocustError::IndexIncompatible("position set limits not monotone"
                .to_string()));
        }
        if *self.limits.last().unwrap() != self.concat.len() as u64 {
            return Err(LocustError::IndexIncompatible(
                "position set limits do not cover the buffer".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn push_and_get_roundtrip() {
        let mut store = SeqStore::new();
        store.push(b"ACGT");
        store.push(b"");
        store.push(b"TTTTT");

        assert_eq!(3, store.len());
        assert_eq!(b"ACGT", store.get(0));
        assert_eq!(b"", store.get(1));
        assert_eq!(b"TTTTT", store.get(2));
        assert_eq!(9, store.total());
        assert_eq!(&[0, 4, 4, 9], store.limits());
        store.check().unwrap();
    }

    #[test]
    fn rank_maps_offsets_to_records() {
        let mut store = SeqStore::new();
        store.push(b"AAAA");
        store.push(b"CC");
        store.push(b"GGG");

        assert_eq!((0, 0), store.rank(0));
        assert_eq!((0, 3), store.rank(3));
        assert_eq!((1, 0), store.rank(4));
        assert_eq!((1, 1), store.rank(5));
        assert_eq!((2, 2), store.rank(8));
    }

    #[test]
    fn packed_pos_roundtrip() {
        let p = PackedPos::new(123_456, 7_890_123);
        assert_eq!(123_456, p.seq());
        assert_eq!(7_890_123, p.offset());

        let z = PackedPos::new(0, 0);
        assert_eq!(0, z.seq());
        assert_eq!(0, z.offset());
    }

    #[test]
    fn corrupt_limits_fail_check() {
        let broken = SeqStore { concat: b"ACGT".to_vec(), limits: vec![0, 5, 4] };
        assert!(broken.check().is_err());

        let short = SeqStore { concat: b"ACGT".to_vec(), limits: vec![0, 2] };
        assert!(short.check().is_err());
    }

    quickcheck! {
        fn store_roundtrips_any_records(records: Vec<Vec<u8>>) -> bool {
            let mut store = SeqStore::new();
            for r in &records {
                store.push(r);
            }
            store.check().unwrap();
            records.iter().enumerate().all(|(i, r)| store.get(i) == r.as_slice())
        }
    }

    #[test]
    fn random_records_roundtrip_and_rank() {
        use rand::{Rng, XorShiftRng};
        let mut rng = XorShiftRng::new_unseeded();

        let mut store = SeqStore::new();
        let mut records = Vec::new();
        for _ in 0..500 {
            let len: usize = rng.gen_range(0, 80);
            let seq: Vec<u8> = (0..len).map(|_| b"ACGTN"[rng.gen::<usize>() % 5]).collect();
            store.push(&seq);
            records.push(seq);
        }

        store.check().unwrap();
        for (i, r) in records.iter().enumerate() {
            assert_eq!(store.get(i), r.as_slice());
        }

        // rank inverts the limit arithmetic for any interior position
        assert!(store.total() > 0);
        for _ in 0..200 {
            let pos = rng.gen_range(0, store.total());
            let (rec, off) = store.rank(pos);
            assert_eq!(store.limits()[rec as usize] + off as u64, pos);
            assert!((off as usize) < store.seq_len(rec as usize));
        }
    }
}
