//! Low-complexity masking: per-subject interval sets and the windowed
//! entropy scan the indexer uses to produce them.

use serde::{Deserialize, Serialize};

use crate::error::*;
use crate::store::PosStore;

/// Per-subject masked ranges, kept as two parallel concat-direct position
/// sets (the `binseg_s`/`binseg_e` artifacts).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Masking {
    starts: PosStore,
    ends: PosStore,
}

impl Masking {
    pub fn new() -> Masking {
        Masking { starts: PosStore::new(), ends: PosStore::new() }
    }

    pub fn from_parts(starts: PosStore, ends: PosStore) -> LocustResult<Masking> {
        starts.check()?;
        ends.check()?;
        if starts.len() != ends.len() {
            return Err(LocustError::IndexIncompatible(
                "masking start/end sets disagree on record count".to_string(),
            ));
        }
        for i in 0..starts.len() {
            if starts.get(i).len() != ends.get(i).len() {
                return Err(LocustError::IndexIncompatible(format!(
                    "masking interval mismatch in record {}",
                    i
                )));
            }
        }
        Ok(Masking { starts, ends })
    }

    pub fn into_parts(self) -> (PosStore, PosStore) {
        (self.starts, self.ends)
    }

    pub fn push_record(&mut self, intervals: &[(u64, u64)]) {
        let starts: Vec<u64> = intervals.iter().map(|iv| iv.0).collect();
        let ends: Vec<u64> = intervals.iter().map(|iv| iv.1).collect();
        self.starts.push(&starts);
        self.ends.push(&ends);
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// True when `[start, end)` of record `rec` lies entirely inside one
    /// masked interval.
    pub fn is_masked(&self, rec: usize, start: u64, end: u64) -> bool {
        if rec >= self.starts.len() {
            return false;
        }
        let starts = self.starts.get(rec);
        let ends = self.ends.get(rec);
        for (&s, &e) in starts.iter().zip(ends.iter()) {
            if s <= start && end <= e {
                return true;
            }
        }
        false
    }
}

/// Find low-complexity ranges: windows whose Shannon entropy (bits per
/// residue) falls below `max_entropy` are marked and overlapping marks are
/// merged.
pub fn low_complexity_intervals(seq: &[u8],
                                window: usize,
                                max_entropy: f64)
                                -> Vec<(u64, u64)> {
    if seq.len() < window || window == 0 {
        return Vec::new();
    }

    let mut counts = [0u32; 256];
    for &b in &seq[..window] {
        counts[b as usize] += 1;
    }

    let mut intervals: Vec<(u64, u64)> = Vec::new();
    let mut mark = |intervals: &mut Vec<(u64, u64)>, start: usize| {
        let (s, e) = (start as u64, (start + window) as u64);
        if let Some(last) = intervals.last_mut() {
            if s <= last.1 {
                last.1 = e;
                return;
            }
        }
        intervals.push((s, e));
    };

    if window_entropy(&counts, window) < max_entropy {
        mark(&mut intervals, 0);
    }
    for start in 1..=seq.len() - window {
        counts[seq[start - 1] as usize] -= 1;
        counts[seq[start + window - 1] as usize] += 1;
        if window_entropy(&counts, window) < max_entropy {
            mark(&mut intervals, start);
        }
    }
    intervals
}

fn window_entropy(counts: &[u32; 256], window: usize) -> f64 {
    let n = window as f64;
    let mut h = 0.0;
    for &c in counts.iter() {
        if c > 0 {
            let p = c as f64 / n;
            h -= p * p.log2();
        }
    }
    h
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn homopolymer_run_is_masked() {
        let seq = b"MKVLATTREWAAAAAAAAAAAAAAAAAAAAMKVLATTREW";
        let ivs = low_complexity_intervals(seq, 10, 1.0);
        assert_eq!(1, ivs.len());
        let (s, e) = ivs[0];
        // the run spans positions 10..30
        assert!(s >= 1 && s <= 10, "start = {}", s);
        assert!(e >= 30 && e <= 39, "end = {}", e);
    }

    #[test]
    fn complex_sequence_is_untouched() {
        let seq = b"MKVLATTREWQHIDNCYGSPMKVLATTREWQHIDNCYGSP";
        assert!(low_complexity_intervals(seq, 10, 1.0).is_empty());
    }

    #[test]
    fn short_sequences_yield_nothing() {
        assert!(low_complexity_intervals(b"AAAA", 10, 1.0).is_empty());
    }

    #[test]
    fn containment_query() {
        let mut masking = Masking::new();
        masking.push_record(&[(5, 20), (40, 50)]);
        masking.push_record(&[]);

        assert!(masking.is_masked(0, 5, 20));
        assert!(masking.is_masked(0, 10, 15));
        assert!(masking.is_masked(0, 42, 50));
        assert!(!masking.is_masked(0, 4, 10));
        assert!(!masking.is_masked(0, 18, 22));
        assert!(!masking.is_masked(1, 0, 1));
        assert!(!masking.is_masked(7, 0, 1));
    }

    #[test]
    fn parts_roundtrip_and_validation() {
        let mut masking = Masking::new();
        masking.push_record(&[(1, 3)]);
        masking.push_record(&[(0, 2), (8, 12)]);

        let (starts, ends) = masking.into_parts();
        let rebuilt = Masking::from_parts(starts, ends).unwrap();
        assert!(rebuilt.is_masked(1, 9, 11));

        let mut lopsided_starts = PosStore::new();
        lopsided_starts.push(&[1, 2]);
        let mut lopsided_ends = PosStore::new();
        lopsided_ends.push(&[3]);
        assert!(Masking::from_parts(lopsided_starts, lopsided_ends).is_err());
    }
}
