//! The on-disk database index and its loader.
//!
//! For a database path `DB` the searcher expects the artifact family:
//! `DB.<alph>` (translated subject set), `DB.ids`, `DB.<alph>.sa` or
//! `DB.<alph>.fm`, `DB.untranslengths` when the subject is translated, and
//! `DB.binseg_s`/`DB.binseg_e` masking intervals. Every artifact is a
//! bincode-serialized struct; the index artifact carries a meta header that
//! must agree with the searcher's configuration.

use bio::alphabets::Alphabet;
use bio::data_structures::bwt::{bwt, less, Less, Occ, BWT};
use bio::data_structures::suffix_array::{suffix_array, RawSuffixArray, SampledSuffixArray,
                                         SuffixArray};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::alphabet::{Alph, Program, Reduction, SENTINEL};
use crate::error::*;
use crate::mask::Masking;
use crate::store::{PackedPos, PosStore, SeqStore};
use crate::util::from_file;

const MAGIC: u32 = 0x4c43_5354;
const ENDIAN_TAG: u32 = 0x0102_0304;

/// Which index structure backs the database text.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum IndexKind {
    Sa,
    Fm,
}

impl IndexKind {
    pub fn from_str(s: &str) -> LocustResult<IndexKind> {
        match s {
            "sa" => Ok(IndexKind::Sa),
            "fm" => Ok(IndexKind::Fm),
            _ => Err(LocustError::InvalidOption(format!("unknown index kind: {}", s))),
        }
    }

    pub fn suffix(&self) -> &'static str {
        match *self {
            IndexKind::Sa => "sa",
            IndexKind::Fm => "fm",
        }
    }
}

/// Header recorded in every index artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    magic: u32,
    endian: u32,
    pub program: Program,
    pub alphabet: Alph,
    pub kind: IndexKind,
}

impl IndexMeta {
    pub fn new(program: Program, alphabet: Alph, kind: IndexKind) -> IndexMeta {
        IndexMeta { magic: MAGIC, endian: ENDIAN_TAG, program, alphabet, kind }
    }

    fn check(&self, program: Program, alphabet: Alph, kind: IndexKind) -> LocustResult<()> {
        if self.magic != MAGIC {
            return Err(LocustError::IndexIncompatible("bad magic number".to_string()));
        }
        if self.endian != ENDIAN_TAG {
            return Err(LocustError::IndexIncompatible("endianness mismatch".to_string()));
        }
        if self.program != program {
            return Err(LocustError::IndexIncompatible(format!(
                "index built for {}, searcher running {}",
                self.program.name(),
                program.name()
            )));
        }
        if self.alphabet != alphabet {
            return Err(LocustError::IndexIncompatible(format!(
                "index alphabet {} does not match configured {}",
                self.alphabet.name(),
                alphabet.name()
            )));
        }
        if self.kind != kind {
            return Err(LocustError::IndexIncompatible(format!(
                "index is {}, searcher asked for {}",
                self.kind.suffix(),
                kind.suffix()
            )));
        }
        Ok(())
    }
}

/// Plain suffix array over the seeding text. The text itself is not stored;
/// the loader re-binds it from the subject set.
#[derive(Serialize, Deserialize)]
pub struct SaArtifact {
    pub meta: IndexMeta,
    pub sa: RawSuffixArray,
}

/// FM-index artifact: a sampled suffix array bundling BWT, less and Occ.
#[derive(Serialize, Deserialize)]
pub struct FmArtifact {
    pub meta: IndexMeta,
    pub sa: SampledSuffixArray<BWT, Less, Occ>,
}

pub fn subject_path(db: &str, alph: Alph) -> String {
    format!("{}.{}", db, alph.name())
}

pub fn ids_path(db: &str) -> String {
    format!("{}.ids", db)
}

pub fn index_path(db: &str, alph: Alph, kind: IndexKind) -> String {
    format!("{}.{}.{}", db, alph.name(), kind.suffix())
}

pub fn untrans_path(db: &str) -> String {
    format!("{}.untranslengths", db)
}

pub fn mask_starts_path(db: &str) -> String {
    format!("{}.binseg_s", db)
}

pub fn mask_ends_path(db: &str) -> String {
    format!("{}.binseg_e", db)
}

/// Concatenate the records of a store into the indexed text, one sentinel
/// after each record. The final byte is the sentinel, which sorts before
/// every residue symbol. Seeds can never span a record boundary because
/// queries never contain the sentinel.
pub fn build_index_text(store: &SeqStore) -> Vec<u8> {
    let mut text = Vec::with_capacity(store.total() as usize + store.len());
    for i in 0..store.len() {
        text.extend_from_slice(store.get(i));
        text.push(SENTINEL);
    }
    text.shrink_to_fit();
    text
}

/// Build the suffix-array artifact for a seeding text.
pub fn build_sa_artifact(text: &[u8], program: Program, alphabet: Alph) -> SaArtifact {
    info!("Building suffix array over {} text positions...", text.len());
    let sa = suffix_array(text);
    info!("Suffix array constructed.");
    SaArtifact { meta: IndexMeta::new(program, alphabet, IndexKind::Sa), sa }
}

/// Build the FM-index artifact: suffix array, BWT, less, Occ, then sample.
pub fn build_fm_artifact(text: &[u8],
                         program: Program,
                         alphabet: Alph,
                         occ_interval: u32,
                         sa_sample: usize)
                         -> FmArtifact {
    let mut symbols = alphabet.symbols().to_vec();
    symbols.push(SENTINEL);
    let bio_alphabet = Alphabet::new(&symbols);

    info!("Building suffix array over {} text positions...", text.len());
    let sa = suffix_array(text);
    info!("Constructing Burrows-Wheeler Transform...");
    let bwt = bwt(text, &sa);
    let less = less(&bwt, &bio_alphabet);
    let occ = Occ::new(&bwt, occ_interval, &bio_alphabet);
    info!("Sampling suffix array at {}", sa_sample);
    let sampled = sa.sample(text, bwt, less, occ, sa_sample);
    info!("Sampled suffix array constructed.");

    FmArtifact { meta: IndexMeta::new(program, alphabet, IndexKind::Fm), sa: sampled }
}

/// The loaded index structure.
pub enum LoadedIndex {
    Sa(RawSuffixArray),
    Fm(SampledSuffixArray<BWT, Less, Occ>),
}

/// The global read-only holder for one database: subject sets, identifiers,
/// untranslated lengths, masking, and the index over the seeding text.
pub struct Database {
    pub program: Program,
    pub reduction: Reduction,
    /// Translated subject records in the scoring alphabet.
    pub subjects: SeqStore,
    /// Reduced subject records, present only when a reduction is active.
    reduced: Option<SeqStore>,
    /// Source-record identifiers.
    pub ids: SeqStore,
    /// Untranslated source lengths plus the cumulative total in the final
    /// slot; present only when the subject is translated.
    pub untrans: Option<Vec<u64>>,
    pub masking: Masking,
    /// The seeding text the SA index is bound to; absent for FM, which
    /// carries its own BWT.
    pub text: Option<Vec<u8>>,
    pub index: LoadedIndex,
}

fn require<T>(path: &str) -> LocustResult<T>
    where T: serde::de::DeserializeOwned
{
    if !Path::new(path).is_file() {
        return Err(LocustError::IndexMissing(path.to_string()));
    }
    from_file(path)
}

impl Database {
    /// Load every required artifact for `db`, failing with `IndexMissing`
    /// for absent files and `IndexIncompatible` for disagreeing ones.
    pub fn load(db: &str,
                program: Program,
                reduction: Reduction,
                kind: IndexKind)
                -> LocustResult<Database> {
        let scoring_alph = program.subject_alphabet();
        let index_alph = reduction.index_alphabet(program);

        info!("Loading subject set ({})...", scoring_alph.name());
        let subjects: SeqStore = require(&subject_path(db, scoring_alph))?;
        subjects.check()?;

        let reduced = if index_alph != scoring_alph {
            info!("Loading reduced subject set ({})...", index_alph.name());
            let r: SeqStore = require(&subject_path(db, index_alph))?;
            r.check()?;
            if r.limits() != subjects.limits() {
                return Err(LocustError::IndexIncompatible(
                    "reduced subject set does not mirror the scoring set".to_string(),
                ));
            }
            Some(r)
        } else {
            None
        };

        let ids: SeqStore = require(&ids_path(db))?;
        ids.check()?;
        if ids.len() * program.subject_frames() != subjects.len() {
            return Err(LocustError::IndexIncompatible(format!(
                "{} identifiers for {} translated records",
                ids.len(),
                subjects.len()
            )));
        }

        let untrans: Option<Vec<u64>> = if program.subject_translated() {
            let lens: Vec<u64> = require(&untrans_path(db))?;
            if lens.len() != ids.len() + 1 {
                return Err(LocustError::IndexIncompatible(
                    "untranslated length table has the wrong record count".to_string(),
                ));
            }
            let total: u64 = lens[..lens.len() - 1].iter().sum();
            if total != lens[lens.len() - 1] {
                return Err(LocustError::IndexIncompatible(
                    "untranslated length total disagrees with its records".to_string(),
                ));
            }
            Some(lens)
        } else {
            None
        };

        let mask_starts: PosStore = require(&mask_starts_path(db))?;
        let mask_ends: PosStore = require(&mask_ends_path(db))?;
        let masking = Masking::from_parts(mask_starts, mask_ends)?;
        if masking.len() != subjects.len() {
            return Err(LocustError::IndexIncompatible(
                "masking interval sets do not cover every subject record".to_string(),
            ));
        }

        let ipath = index_path(db, index_alph, kind);
        info!("Loading {} index...", kind.suffix());
        let (index, text) = match kind {
            IndexKind::Sa => {
                let artifact: SaArtifact = require(&ipath)?;
                artifact.meta.check(program, index_alph, kind)?;
                let seed_store = reduced.as_ref().unwrap_or(&subjects);
                let text = build_index_text(seed_store);
                if artifact.sa.len() != text.len() {
                    return Err(LocustError::IndexIncompatible(format!(
                        "suffix array length {} does not match text length {}",
                        artifact.sa.len(),
                        text.len()
                    )));
                }
                (LoadedIndex::Sa(artifact.sa), Some(text))
            },
            IndexKind::Fm => {
                let artifact: FmArtifact = require(&ipath)?;
                artifact.meta.check(program, index_alph, kind)?;
                (LoadedIndex::Fm(artifact.sa), None)
            },
        };

        info!("Database loaded: {} source records, {} translated records.",
              ids.len(),
              subjects.len());

        Ok(Database {
            program,
            reduction,
            subjects,
            reduced,
            ids,
            untrans,
            masking,
            text,
            index,
        })
    }

    /// The subject set seeds are matched against.
    pub fn seed_subjects(&self) -> &SeqStore {
        self.reduced.as_ref().unwrap_or(&self.subjects)
    }

    /// Map an absolute position in the seeding text to a record-relative
    /// position. Sentinel positions return `None`.
    pub fn locate(&self, pos: u64) -> Option<PackedPos> {
        locate_in(self.seed_subjects(), pos)
    }

    /// Total untranslated database length for statistics.
    pub fn db_len(&self) -> u64 {
        match self.untrans {
            Some(ref lens) => lens[lens.len() - 1],
            None => self.subjects.total(),
        }
    }

    /// Number of source database records.
    pub fn num_seqs(&self) -> u64 {
        self.ids.len() as u64
    }

    /// Source record owning a translated subject record.
    pub fn subject_source(&self, rec: u32) -> u32 {
        rec / self.program.subject_frames() as u32
    }

    /// Untranslated length of a source subject record.
    pub fn source_len(&self, source: usize) -> usize {
        match self.untrans {
            Some(ref lens) => lens[source] as usize,
            None => self.subjects.seq_len(source),
        }
    }
}

/// Map an absolute position in the sentinel-joined text built from `store`
/// back to a record-relative position. Sentinel positions return `None`.
pub fn locate_in(store: &SeqStore, pos: u64) -> Option<PackedPos> {
    let n = store.len();
    if n == 0 {
        return None;
    }
    // record i starts at limits[i] + i in the sentinel-joined text;
    // find the greatest i with that start <= pos
    let limits = store.limits();
    let mut lo = 0usize;
    let mut hi = n;
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if limits[mid] + mid as u64 <= pos {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let off = pos - (limits[lo] + lo as u64);
    if off >= store.seq_len(lo) as u64 {
        return None;
    }
    Some(PackedPos::new(lo as u32, off as u32))
}
