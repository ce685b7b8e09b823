//! Seed generation and index search.
//!
//! Seeds are fixed-length substrings of the reduced query taken at a fixed
//! stride. The searcher locates their occurrences in the database index
//! within a small Hamming budget, either one seed at a time (single-index)
//! or for a whole block of queries at once through a seed trie
//! (double-index). Traversals are explicit stacks, no recursion.

use bio::data_structures::bwt::{Less, BWT, Occ};
use bio::data_structures::fmindex::{BackwardSearchResult, FMIndex, FMIndexable};
use bio::data_structures::suffix_array::{SampledSuffixArray, SuffixArray};
use itertools::Itertools;

use crate::index::{Database, LoadedIndex};
use crate::store::PackedPos;

/// Seeding knobs: `-sl`, `-so`, `-sd`.
#[derive(Clone, Copy, Debug)]
pub struct SeedConfig {
    pub seed_len: usize,
    pub seed_offset: usize,
    pub max_seed_dist: u32,
}

/// Start offsets of every seed of a record of length `len`: `j * offset`
/// while the seed still fits.
pub fn seed_offsets(len: usize, cfg: &SeedConfig) -> Vec<usize> {
    if len < cfg.seed_len {
        return Vec::new();
    }
    (0..len + 1 - cfg.seed_len).step(cfg.seed_offset).collect()
}

/// A seed reference carried through the trie: owning translated query
/// record and start offset within it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SeedRef {
    pub query: u32,
    pub offset: u32,
}

/// Prefix trie over a block of seeds. For the FM-index the seeds are
/// inserted reversed so that trie descent and backward search consume
/// residues in the same order.
pub struct SeedTrie {
    nodes: Vec<TrieNode>,
    seed_len: usize,
    reversed: bool,
}

#[derive(Default)]
struct TrieNode {
    children: Vec<(u8, u32)>,
    seeds: Vec<SeedRef>,
}

impl SeedTrie {
    pub fn new(seed_len: usize, reversed: bool) -> SeedTrie {
        SeedTrie { nodes: vec![TrieNode::default()], seed_len, reversed }
    }

    pub fn seed_len(&self) -> usize {
        self.seed_len
    }

    pub fn insert(&mut self, seed: &[u8], query: u32, offset: u32) {
        debug_assert_eq!(self.seed_len, seed.len());
        let mut node = 0usize;
        for i in 0..seed.len() {
            let c = if self.reversed { seed[seed.len() - 1 - i] } else { seed[i] };
            node = match self.nodes[node].children.iter().find(|&&(sym, _)| sym == c) {
                Some(&(_, child)) => child as usize,
                None => {
                    let child = self.nodes.len() as u32;
                    self.nodes.push(TrieNode::default());
                    self.nodes[node].children.push((c, child));
                    child as usize
                },
            };
        }
        self.nodes[node].seeds.push(SeedRef { query, offset });
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }
}

/// Search interface over the loaded database index.
pub struct IndexSearcher<'a> {
    db: &'a Database,
    fm: Option<FMIndex<&'a BWT, &'a Less, &'a Occ>>,
}

impl<'a> IndexSearcher<'a> {
    pub fn new(db: &'a Database) -> IndexSearcher<'a> {
        let fm = match db.index {
            LoadedIndex::Fm(ref sampled) => {
                Some(FMIndex::new(sampled.bwt(), sampled.less(), sampled.occ()))
            },
            LoadedIndex::Sa(_) => None,
        };
        IndexSearcher { db, fm }
    }

    /// Seed tries for this index must reverse their seeds when the index
    /// is searched backwards.
    pub fn wants_reversed_seeds(&self) -> bool {
        self.fm.is_some()
    }

    fn symbols(&self) -> &'static [u8] {
        self.db.reduction.index_alphabet(self.db.program).symbols()
    }

    /// Push every occurrence of `seed` within `max_dist` Hamming errors.
    pub fn seed_occurrences(&self, seed: &[u8], max_dist: u32, out: &mut Vec<PackedPos>) {
        let db = self.db;
        match db.index {
            LoadedIndex::Sa(ref sa) => {
                if let Some(ref text) = db.text {
                    sa_find(text, sa, self.symbols(), seed, max_dist, &mut |pos| {
                        if let Some(p) = db.locate(pos) {
                            out.push(p);
                        }
                    });
                }
            },
            LoadedIndex::Fm(ref sampled) => {
                let fm = self.fm.as_ref().unwrap();
                fm_find(fm, sampled, self.symbols(), seed, max_dist, &mut |pos| {
                    if let Some(p) = db.locate(pos) {
                        out.push(p);
                    }
                });
            },
        }
    }

    /// Double-index search: descend the seed trie and the database index in
    /// lockstep, emitting every (seed, occurrence) pair at full depth.
    pub fn search_trie(&self,
                       trie: &SeedTrie,
                       max_dist: u32,
                       on_hit: &mut dyn FnMut(SeedRef, PackedPos)) {
        debug_assert_eq!(self.wants_reversed_seeds(), trie.reversed);
        let db = self.db;
        match db.index {
            LoadedIndex::Sa(ref sa) => {
                if let Some(ref text) = db.text {
                    sa_find_trie(text, sa, self.symbols(), trie, max_dist, &mut |seed, pos| {
                        if let Some(p) = db.locate(pos) {
                            on_hit(seed, p);
                        }
                    });
                }
            },
            LoadedIndex::Fm(ref sampled) => {
                let fm = self.fm.as_ref().unwrap();
                fm_find_trie(fm, sampled, self.symbols(), trie, max_dist, &mut |seed, pos| {
                    if let Some(p) = db.locate(pos) {
                        on_hit(seed, p);
                    }
                });
            },
        }
    }
}

fn char_at(text: &[u8], i: usize) -> u8 {
    if i < text.len() { text[i] } else { 0 }
}

/// Narrow a suffix-array row range to the suffixes whose `depth`-th symbol
/// is `c`. All rows in `[lo, hi)` share their first `depth` symbols.
fn sa_step(text: &[u8],
           sa: &[usize],
           lo: usize,
           hi: usize,
           depth: usize,
           c: u8)
           -> (usize, usize) {
    let range = &sa[lo..hi];
    let l = lo + range.partition_point(|&p| char_at(text, p + depth) < c);
    let u = lo + range.partition_point(|&p| char_at(text, p + depth) <= c);
    (l, u)
}

/// Narrow an FM interval by prepending symbol `c` (backward search step).
fn fm_step(fm: &FMIndex<&BWT, &Less, &Occ>,
           lower: usize,
           upper: usize,
           c: u8)
           -> (usize, usize) {
    let less = fm.less(c);
    let l = less + if lower > 0 { fm.occ(lower - 1, c) } else { 0 };
    let u = less + fm.occ(upper - 1, c);
    (l, u)
}

struct Frame {
    depth: usize,
    errs: u32,
    lower: usize,
    upper: usize,
}

/// Approximate seed search over a plain suffix array: top-down descent,
/// matching edges cost 0, mismatching edges cost 1, no indels.
pub fn sa_find(text: &[u8],
               sa: &[usize],
               symbols: &[u8],
               seed: &[u8],
               max_dist: u32,
               emit: &mut dyn FnMut(u64)) {
    let mut stack = vec![Frame { depth: 0, errs: 0, lower: 0, upper: sa.len() }];
    while let Some(f) = stack.pop() {
        if f.depth == seed.len() {
            for &pos in &sa[f.lower..f.upper] {
                emit(pos as u64);
            }
            continue;
        }
        let want = seed[f.depth];
        for &c in symbols {
            let cost = (c != want) as u32;
            if f.errs + cost > max_dist {
                continue;
            }
            let (l, u) = sa_step(text, sa, f.lower, f.upper, f.depth, c);
            if l < u {
                stack.push(Frame { depth: f.depth + 1, errs: f.errs + cost, lower: l, upper: u });
            }
        }
    }
}

/// Approximate seed search via FM backward search. Exact lookups take the
/// library fast path; the budgeted descent branches per symbol.
pub fn fm_find(fm: &FMIndex<&BWT, &Less, &Occ>,
               sampled: &SampledSuffixArray<BWT, Less, Occ>,
               symbols: &[u8],
               seed: &[u8],
               max_dist: u32,
               emit: &mut dyn FnMut(u64)) {
    if max_dist == 0 {
        if let BackwardSearchResult::Complete(interval) = fm.backward_search(seed.iter()) {
            for pos in interval.occ(sampled) {
                emit(pos as u64);
            }
        }
        return;
    }

    let mut stack = vec![Frame { depth: 0, errs: 0, lower: 0, upper: fm.bwt().len() }];
    while let Some(f) = stack.pop() {
        if f.depth == seed.len() {
            for row in f.lower..f.upper {
                if let Some(pos) = sampled.get(row) {
                    emit(pos as u64);
                }
            }
            continue;
        }
        // backward search consumes the seed right to left
        let want = seed[seed.len() - 1 - f.depth];
        for &c in symbols {
            let cost = (c != want) as u32;
            if f.errs + cost > max_dist {
                continue;
            }
            let (l, u) = fm_step(fm, f.lower, f.upper, c);
            if l < u {
                stack.push(Frame { depth: f.depth + 1, errs: f.errs + cost, lower: l, upper: u });
            }
        }
    }
}

struct TrieFrame {
    node: u32,
    depth: usize,
    errs: u32,
    lower: usize,
    upper: usize,
}

/// Lockstep descent of a seed trie and a suffix array.
pub fn sa_find_trie(text: &[u8],
                    sa: &[usize],
                    symbols: &[u8],
                    trie: &SeedTrie,
                    max_dist: u32,
                    emit: &mut dyn FnMut(SeedRef, u64)) {
    let mut stack = vec![TrieFrame { node: 0, depth: 0, errs: 0, lower: 0, upper: sa.len() }];
    while let Some(f) = stack.pop() {
        let node = &trie.nodes[f.node as usize];
        if f.depth == trie.seed_len {
            for &seed in &node.seeds {
                for &pos in &sa[f.lower..f.upper] {
                    emit(seed, pos as u64);
                }
            }
            continue;
        }
        for &(want, child) in &node.children {
            for &c in symbols {
                let cost = (c != want) as u32;
                if f.errs + cost > max_dist {
                    continue;
                }
                let (l, u) = sa_step(text, sa, f.lower, f.upper, f.depth, c);
                if l < u {
                    stack.push(TrieFrame {
                        node: child,
                        depth: f.depth + 1,
                        errs: f.errs + cost,
                        lower: l,
                        upper: u,
                    });
                }
            }
        }
    }
}

/// Lockstep descent of a (reversed) seed trie and an FM-index.
pub fn fm_find_trie(fm: &FMIndex<&BWT, &Less, &Occ>,
                    sampled: &SampledSuffixArray<BWT, Less, Occ>,
                    symbols: &[u8],
                    trie: &SeedTrie,
                    max_dist: u32,
                    emit: &mut dyn FnMut(SeedRef, u64)) {
    let mut stack =
        vec![TrieFrame { node: 0, depth: 0, errs: 0, lower: 0, upper: fm.bwt().len() }];
    while let Some(f) = stack.pop() {
        let node = &trie.nodes[f.node as usize];
        if f.depth == trie.seed_len {
            for &seed in &node.seeds {
                for row in f.lower..f.upper {
                    if let Some(pos) = sampled.get(row) {
                        emit(seed, pos as u64);
                    }
                }
            }
            continue;
        }
        for &(want, child) in &node.children {
            for &c in symbols {
                let cost = (c != want) as u32;
                if f.errs + cost > max_dist {
                    continue;
                }
                let (l, u) = fm_step(fm, f.lower, f.upper, c);
                if l < u {
                    stack.push(TrieFrame {
                        node: child,
                        depth: f.depth + 1,
                        errs: f.errs + cost,
                        lower: l,
                        upper: u,
                    });
                }
            }
        }
    }
}
