//! Query preparation: stream FASTA/FASTQ records into a sequence store and
//! apply the per-program transform (strands, six frames, or identity).

use bio::io::{fasta, fastq};

use crate::alphabet::{normalize_aa, normalize_dna, six_frames, two_strands, GeneticCode,
                      Program, Reduction};
use crate::error::*;
use crate::store::SeqStore;
use crate::util::open_maybe_gz;

/// The prepared query set: translated records in the scoring alphabet, the
/// reduced seeding view, identifiers and untranslated lengths indexed by
/// source record.
pub struct QuerySet {
    pub seqs: SeqStore,
    pub reduced: SeqStore,
    pub ids: SeqStore,
    pub untrans: Vec<u64>,
    pub frames: usize,
}

enum FastxRecord {
    Fasta(fasta::Record),
    Fastq(fastq::Record),
}

impl FastxRecord {
    fn id(&self) -> &str {
        match *self {
            FastxRecord::Fasta(ref r) => r.id(),
            FastxRecord::Fastq(ref r) => r.id(),
        }
    }

    fn seq(&self) -> &[u8] {
        match *self {
            FastxRecord::Fasta(ref r) => r.seq(),
            FastxRecord::Fastq(ref r) => r.seq(),
        }
    }
}

fn is_fastq_path(path: &str) -> bool {
    let stripped = path.strip_suffix(".gz").unwrap_or(path);
    stripped.ends_with(".fq") || stripped.ends_with(".fastq")
}

impl QuerySet {
    /// Read every query record from `path` and apply the program transform.
    pub fn load(path: &str,
                program: Program,
                reduction: Reduction,
                code: &GeneticCode)
                -> LocustResult<QuerySet> {
        let records: Box<dyn Iterator<Item = LocustResult<FastxRecord>>> = if is_fastq_path(path) {
            let reader = fastq::Reader::new(open_maybe_gz(path)?);
            Box::new(reader.records().map(|r| {
                r.map(FastxRecord::Fastq)
                    .map_err(|_| LocustError::Translation(format!("bad FASTQ record in {}", path)))
            }))
        } else {
            let reader = fasta::Reader::new(open_maybe_gz(path)?);
            Box::new(reader.records()
                .map(|r| r.map(FastxRecord::Fasta).map_err(LocustError::from)))
        };

        let mut set = QuerySet {
            seqs: SeqStore::new(),
            reduced: SeqStore::new(),
            ids: SeqStore::new(),
            untrans: Vec::new(),
            frames: program.query_frames(),
        };

        for record in records {
            let record = record?;
            set.push_source(record.id(), record.seq(), program, reduction, code)?;
        }

        info!("Prepared {} queries ({} translated records).",
              set.ids.len(),
              set.seqs.len());
        Ok(set)
    }

    /// Append one source record, producing its translated frames.
    pub fn push_source(&mut self,
                       id: &str,
                       seq: &[u8],
                       program: Program,
                       reduction: Reduction,
                       code: &GeneticCode)
                       -> LocustResult<()> {
        if id.is_empty() {
            return Err(LocustError::Translation("empty query identifier".to_string()));
        }
        self.ids.push(id.as_bytes());
        self.untrans.push(seq.len() as u64);

        let frames: Vec<Vec<u8>> = match program {
            Program::BlastN => two_strands(&normalize_dna(seq)),
            Program::BlastX | Program::TBlastX => six_frames(&normalize_dna(seq), code),
            Program::BlastP | Program::TBlastN => vec![normalize_aa(seq)],
        };
        debug_assert_eq!(self.frames, frames.len());

        let reduction = reduction.effective(program);
        for frame in &frames {
            self.seqs.push(frame);
            self.reduced.push(&reduction.apply_seq(frame));
        }
        Ok(())
    }

    /// Number of source query records.
    pub fn num_sources(&self) -> usize {
        self.ids.len()
    }

    /// Source record owning a translated query record.
    pub fn source_of(&self, rec: u32) -> u32 {
        rec / self.frames as u32
    }

    /// Untranslated length of a source record.
    pub fn source_len(&self, source: usize) -> usize {
        self.untrans[source] as usize
    }
}
