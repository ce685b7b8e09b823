//! Build the on-disk index artifacts for a FASTA database.

use bio::io::fasta;
use std::io;

use crate::alphabet::{normalize_aa, normalize_dna, six_frames, GeneticCode, Program, Reduction};
use crate::error::*;
use crate::index::{build_fm_artifact, build_index_text, build_sa_artifact, ids_path, index_path,
                   mask_ends_path, mask_starts_path, subject_path, untrans_path, IndexKind};
use crate::mask::{low_complexity_intervals, Masking};
use crate::store::SeqStore;
use crate::util::write_to_file;

/// Indexer configuration.
#[derive(Clone, Copy, Debug)]
pub struct BuildOptions {
    pub program: Program,
    pub reduction: Reduction,
    pub kind: IndexKind,
    pub genetic_code: u32,
    /// Occ checkpoint interval of the FM artifact.
    pub occ_interval: u32,
    /// Suffix array sampling rate of the FM artifact.
    pub sa_sample: usize,
    pub mask_window: usize,
    pub mask_entropy: f64,
}

impl BuildOptions {
    pub fn new(program: Program) -> BuildOptions {
        BuildOptions {
            program,
            reduction: Reduction::Murphy10,
            kind: IndexKind::Fm,
            genetic_code: 1,
            occ_interval: 64,
            sa_sample: 32,
            mask_window: 12,
            mask_entropy: if program.dna_scoring() { 1.0 } else { 2.2 },
        }
    }
}

/// Parse the database records, apply the subject transform, and write the
/// whole artifact family for `db_path`.
pub fn build_and_write_index<R>(records: R, db_path: &str, opts: &BuildOptions) -> LocustResult<()>
    where R: Iterator<Item = io::Result<fasta::Record>>
{
    let code = GeneticCode::from_id(opts.genetic_code)?;

    let mut subjects = SeqStore::new();
    let mut ids = SeqStore::new();
    let mut untrans: Vec<u64> = Vec::new();

    debug!("Parsing FASTA database file...");
    for record in records {
        let record = record?;
        if record.id().is_empty() {
            return Err(LocustError::Translation("empty header in database FASTA".to_string()));
        }
        ids.push(record.id().as_bytes());

        match opts.program {
            Program::BlastN => subjects.push(&normalize_dna(record.seq())),
            Program::BlastP | Program::BlastX => subjects.push(&normalize_aa(record.seq())),
            Program::TBlastN | Program::TBlastX => {
                let nt = normalize_dna(record.seq());
                untrans.push(nt.len() as u64);
                for frame in six_frames(&nt, &code) {
                    subjects.push(&frame);
                }
            },
        }
    }
    if ids.is_empty() {
        return Err(LocustError::Translation("database FASTA holds no records".to_string()));
    }
    info!("File parsed: {} source records, {} translated records.", ids.len(), subjects.len());

    let mut masking = Masking::new();
    for i in 0..subjects.len() {
        masking.push_record(&low_complexity_intervals(subjects.get(i),
                                                      opts.mask_window,
                                                      opts.mask_entropy));
    }

    let scoring_alph = opts.program.subject_alphabet();
    let index_alph = opts.reduction.index_alphabet(opts.program);

    info!("Writing subject set ({})...", scoring_alph.name());
    write_to_file(&subjects, &subject_path(db_path, scoring_alph))?;
    write_to_file(&ids, &ids_path(db_path))?;

    if opts.program.subject_translated() {
        let total: u64 = untrans.iter().sum();
        untrans.push(total);
        write_to_file(&untrans, &untrans_path(db_path))?;
    }

    let (mask_starts, mask_ends) = masking.into_parts();
    write_to_file(&mask_starts, &mask_starts_path(db_path))?;
    write_to_file(&mask_ends, &mask_ends_path(db_path))?;

    let text = if index_alph != scoring_alph {
        let mut reduced = SeqStore::new();
        for i in 0..subjects.len() {
            reduced.push(&opts.reduction.apply_seq(subjects.get(i)));
        }
        info!("Writing reduced subject set ({})...", index_alph.name());
        write_to_file(&reduced, &subject_path(db_path, index_alph))?;
        build_index_text(&reduced)
    } else {
        build_index_text(&subjects)
    };

    info!("Building {} index over {} text...", opts.kind.suffix(), index_alph.name());
    match opts.kind {
        IndexKind::Sa => {
            let artifact = build_sa_artifact(&text, opts.program, index_alph);
            write_to_file(&artifact, &index_path(db_path, index_alph, opts.kind))?;
        },
        IndexKind::Fm => {
            let artifact = build_fm_artifact(&text,
                                             opts.program,
                                             index_alph,
                                             opts.occ_interval,
                                             opts.sa_sample);
            write_to_file(&artifact, &index_path(db_path, index_alph, opts.kind))?;
        },
    }

    info!("All index artifacts written for {}.", db_path);
    Ok(())
}
