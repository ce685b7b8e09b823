//! The search orchestrator: loads the database and queries, then runs the
//! seed-find-extend pipeline over a worker pool. Workers map queries (or
//! query blocks in double-index mode) to finished records; the single
//! consumer thread writes records and reduces the per-worker counters.

use cue::pipeline;
use std::fs::{remove_file, File};
use std::io::{self, BufWriter, IsTerminal, Write};
use std::ops::Range;
use std::process::exit;
use std::time::Instant;

use crate::alphabet::{GeneticCode, Program, Reduction};
use crate::error::*;
use crate::extend::{extend_match, rows_from_ops, ExtendConfig};
use crate::hits::{self, HitConfig, Match, StatsHolder};
use crate::index::{Database, IndexKind};
use crate::matrix::{MatrixKind, ScoringScheme};
use crate::query::QuerySet;
use crate::report::{alignment_stats, BlastMatch, BlastRecord, Column, OutputFormat, Reporter};
use crate::search::{seed_offsets, IndexSearcher, SeedConfig, SeedTrie};
use crate::stats::EvalueCalc;

/// Largest query block handed to one worker in double-index mode.
const MAX_BLOCK: usize = 1024;

/// Progress line refresh interval, in finished queries.
const PROGRESS_EVERY: usize = 64;

/// Everything the searcher binary can configure.
#[derive(Clone, Debug)]
pub struct SearchOptions {
    pub program: Program,
    pub query_path: String,
    pub db_path: String,
    pub out_path: String,
    pub index_kind: IndexKind,
    pub reduction: Reduction,
    pub genetic_code: u32,
    pub threads: usize,
    pub evalue_cutoff: f64,
    /// Percent identity cutoff, 0 disables.
    pub identity_cutoff: f64,
    pub max_matches: usize,
    pub seed_len: usize,
    pub seed_offset: usize,
    pub max_seed_dist: u32,
    pub seed_gravity: u32,
    /// `-sc`: 45/62/80 select a matrix; 0 is only valid for blastn.
    pub matrix: u32,
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
    pub xdrop: i32,
    pub band: i32,
    pub double_index: bool,
    pub filter_putative_abundant: bool,
    pub pre_scoring: u32,
    pub pre_scoring_threshold: f64,
    pub columns: Vec<Column>,
    pub verbosity: u8,
}

impl SearchOptions {
    pub fn new(program: Program, query: &str, db: &str, out: &str) -> SearchOptions {
        SearchOptions {
            program,
            query_path: query.to_string(),
            db_path: db.to_string(),
            out_path: out.to_string(),
            index_kind: IndexKind::Fm,
            reduction: Reduction::Murphy10,
            genetic_code: 1,
            threads: 4,
            evalue_cutoff: 0.1,
            identity_cutoff: 0.0,
            max_matches: 256,
            seed_len: 10,
            seed_offset: 10,
            max_seed_dist: 1,
            seed_gravity: 10,
            matrix: 62,
            match_score: 2,
            mismatch_score: -3,
            gap_open: 11,
            gap_extend: 1,
            xdrop: 30,
            band: -3,
            double_index: false,
            filter_putative_abundant: true,
            pre_scoring: 2,
            pre_scoring_threshold: 2.0,
            columns: Column::default_set(),
            verbosity: 1,
        }
    }

    pub fn validate(&self) -> LocustResult<()> {
        if self.threads == 0 {
            return Err(LocustError::InvalidOption("need at least one thread".to_string()));
        }
        if self.seed_len == 0 || self.seed_offset == 0 {
            return Err(LocustError::InvalidOption(
                "seed length and seed offset must be positive".to_string(),
            ));
        }
        if self.seed_len < 6 {
            warn!("Seed length {} may be small enough to cause performance issues.",
                  self.seed_len);
        }
        if self.seed_offset > self.seed_len {
            warn!("Seed offset {} leaves query positions uncovered.", self.seed_offset);
        }
        if self.evalue_cutoff <= 0.0 {
            return Err(LocustError::InvalidOption("e-value cutoff must be positive".to_string()));
        }
        if !(0.0..=100.0).contains(&self.identity_cutoff) {
            return Err(LocustError::InvalidOption(
                "identity cutoff must be a percentage".to_string(),
            ));
        }
        if self.max_matches == 0 {
            return Err(LocustError::InvalidOption("match cap must be positive".to_string()));
        }
        if self.band < -3 {
            return Err(LocustError::InvalidOption(format!("unknown band policy: {}", self.band)));
        }
        Ok(())
    }

    /// Build the scoring scheme, deriving the Karlin–Altschul parameters.
    pub fn scheme(&self) -> LocustResult<ScoringScheme> {
        if self.program.dna_scoring() {
            ScoringScheme::nucleotide(self.match_score,
                                      self.mismatch_score,
                                      self.gap_open,
                                      self.gap_extend)
        } else {
            let kind = MatrixKind::from_option(self.matrix)?;
            ScoringScheme::protein(kind, self.gap_open, self.gap_extend)
        }
    }

    fn seed_config(&self) -> SeedConfig {
        SeedConfig {
            seed_len: self.seed_len,
            seed_offset: self.seed_offset,
            max_seed_dist: self.max_seed_dist,
        }
    }

    fn hit_config(&self) -> HitConfig {
        HitConfig {
            seed_len: self.seed_len,
            seed_gravity: self.seed_gravity,
            max_matches: self.max_matches,
            filter_putative_abundant: self.filter_putative_abundant,
            pre_scoring: self.pre_scoring,
            pre_scoring_threshold: self.pre_scoring_threshold,
        }
    }

    fn extend_config(&self) -> ExtendConfig {
        ExtendConfig {
            band: self.band,
            xdrop: self.xdrop,
            seed_len: self.seed_len,
            max_seed_dist: self.max_seed_dist,
        }
    }
}

struct SearchContext<'a> {
    opts: &'a SearchOptions,
    scheme: &'a ScoringScheme,
    db: &'a Database,
    queries: &'a QuerySet,
    calc: &'a EvalueCalc,
    searcher: &'a IndexSearcher<'a>,
}

impl<'a> SearchContext<'a> {
    /// Single-index work unit: seed, search, filter, extend one query.
    fn process_query(&self, source: usize) -> (BlastRecord, StatsHolder) {
        let mut delta = StatsHolder { queries: 1, ..Default::default() };
        let cfg = self.opts.seed_config();
        let frames = self.queries.frames;

        let mut matches: Vec<Match> = Vec::new();
        let mut occurrences = Vec::new();
        for f in 0..frames {
            let rec = (source * frames + f) as u32;
            let reduced = self.queries.reduced.get(rec as usize);
            for offset in seed_offsets(reduced.len(), &cfg) {
                delta.seeds += 1;
                let seed = &reduced[offset..offset + cfg.seed_len];
                occurrences.clear();
                self.searcher.seed_occurrences(seed, cfg.max_seed_dist, &mut occurrences);
                for &pos in &occurrences {
                    delta.hits_total += 1;
                    matches.push(Match::from_seed(rec, offset as u32, pos, cfg.seed_len as u32));
                }
            }
        }

        let record = self.finish_query(source, matches, &mut delta);
        (record, delta)
    }

    /// Double-index work unit: one trie descent for a whole query block.
    fn process_block(&self, block: Range<usize>) -> (Vec<BlastRecord>, StatsHolder) {
        let mut delta = StatsHolder { queries: block.len() as u64, ..Default::default() };
        let cfg = self.opts.seed_config();
        let frames = self.queries.frames;

        let mut trie = SeedTrie::new(cfg.seed_len, self.searcher.wants_reversed_seeds());
        for source in block.clone() {
            for f in 0..frames {
                let rec = (source * frames + f) as u32;
                let reduced = self.queries.reduced.get(rec as usize);
                for offset in seed_offsets(reduced.len(), &cfg) {
                    delta.seeds += 1;
                    trie.insert(&reduced[offset..offset + cfg.seed_len], rec, offset as u32);
                }
            }
        }

        let mut per_query: Vec<Vec<Match>> = (0..block.len()).map(|_| Vec::new()).collect();
        if !trie.is_empty() {
            self.searcher.search_trie(&trie, cfg.max_seed_dist, &mut |seed, pos| {
                delta.hits_total += 1;
                let source = self.queries.source_of(seed.query) as usize;
                per_query[source - block.start].push(Match::from_seed(seed.query,
                                                                      seed.offset,
                                                                      pos,
                                                                      cfg.seed_len as u32));
            });
        }

        let records = per_query
            .into_iter()
            .enumerate()
            .map(|(i, matches)| self.finish_query(block.start + i, matches, &mut delta))
            .collect();
        (records, delta)
    }

    /// Shared tail of both work-unit shapes: hit pipeline, extension,
    /// statistics, duplicate removal, record assembly.
    fn finish_query(&self,
                    source: usize,
                    mut matches: Vec<Match>,
                    delta: &mut StatsHolder)
                    -> BlastRecord {
        hits::process_hits(&mut matches,
                           self.queries,
                           self.db,
                           self.scheme,
                           &self.opts.hit_config(),
                           delta);

        let ext_cfg = self.opts.extend_config();
        let query_len = self.queries.source_len(source) as u64;
        let mut out: Vec<BlastMatch> = Vec::new();

        for m in matches.iter().filter(|m| !m.skip) {
            let q = self.queries.seqs.get(m.query as usize);
            let s = self.db.subjects.get(m.subject as usize);
            let ext = match extend_match(q, s, m, self.scheme, &ext_cfg) {
                Some(ext) => ext,
                None => {
                    delta.failed_other += 1;
                    continue;
                },
            };

            let evalue = self.calc.evalue(ext.score, query_len);
            if evalue > self.opts.evalue_cutoff {
                delta.failed_evalue += 1;
                continue;
            }

            let (row0, row1) = rows_from_ops(q, s, ext.qstart, ext.sstart, &ext.ops);
            let stats = alignment_stats(&row0, &row1, self.scheme);
            let pident = if stats.align_len == 0 {
                0.0
            } else {
                stats.identity as f64 * 100.0 / stats.align_len as f64
            };
            if pident < self.opts.identity_cutoff {
                delta.failed_percent_ident += 1;
                continue;
            }

            out.push(BlastMatch {
                subject: self.db.subject_source(m.subject),
                qframe: self.queries_frame(m.query),
                sframe: self.db.program.subject_frame(m.subject as usize),
                qstart: ext.qstart,
                qend: ext.qend,
                sstart: ext.sstart,
                send: ext.send,
                score: ext.score,
                bit_score: self.calc.bit_score(ext.score),
                evalue,
                row0,
                row1,
                stats,
            });
        }

        // duplicates surface only after extension: distinct seeds that grew
        // into the same alignment
        out.sort_by_key(|m| (m.subject, m.qframe, m.sframe, m.qstart, m.qend, m.sstart, m.send));
        let mut deduped: Vec<BlastMatch> = Vec::with_capacity(out.len());
        for m in out {
            let dup = deduped.last().map_or(false, |p: &BlastMatch| {
                p.subject == m.subject && p.qframe == m.qframe && p.sframe == m.sframe
                && p.qstart == m.qstart && p.qend == m.qend && p.sstart == m.sstart
                && p.send == m.send
            });
            if dup {
                delta.hits_duplicate += 1;
            } else {
                deduped.push(m);
            }
        }

        let mut record = BlastRecord { query: source as u32, matches: deduped };
        record.finalize(self.opts.max_matches, delta);
        delta.matches_written += record.matches.len() as u64;
        record
    }

    fn queries_frame(&self, rec: u32) -> i8 {
        self.db.program.query_frame(rec as usize)
    }
}

/// Split the query set into the smallest multiple of the thread count that
/// keeps blocks at or under `MAX_BLOCK` queries.
fn partition_blocks(total: usize, threads: usize) -> Vec<Range<usize>> {
    if total == 0 {
        return Vec::new();
    }
    let threads = threads.max(1);
    let mut blocks = threads;
    while (total + blocks - 1) / blocks > MAX_BLOCK {
        blocks += threads;
    }
    let size = (total + blocks - 1) / blocks;
    let mut out = Vec::new();
    let mut start = 0;
    while start < total {
        out.push(start..(start + size).min(total));
        start += size;
    }
    out
}

/// Run the full search: returns the reduced run counters.
pub fn run_search(opts: &SearchOptions) -> LocustResult<StatsHolder> {
    opts.validate()?;
    let code = GeneticCode::from_id(opts.genetic_code)?;
    let scheme = opts.scheme()?;
    info!("Scoring scheme ready: lambda = {:.4}, K = {:.4}, H = {:.4}.",
          scheme.params.lambda,
          scheme.params.k,
          scheme.params.h);

    let db = Database::load(&opts.db_path, opts.program, opts.reduction, opts.index_kind)?;
    let queries = QuerySet::load(&opts.query_path, opts.program, opts.reduction, &code)?;
    let calc = EvalueCalc::new(scheme.params, db.db_len(), db.num_seqs());

    let out_file = File::create(&opts.out_path)?;
    let format = OutputFormat::from_path(&opts.out_path);
    let mut reporter =
        Reporter::new(BufWriter::new(out_file), format, opts.columns.clone(), &opts.db_path);

    let searcher = IndexSearcher::new(&db);
    let ctx = SearchContext {
        opts,
        scheme: &scheme,
        db: &db,
        queries: &queries,
        calc: &calc,
        searcher: &searcher,
    };

    let total = queries.num_sources();
    let show_progress = opts.verbosity >= 1 && io::stdout().is_terminal();
    let mut stats = StatsHolder::default();
    let mut done = 0usize;

    info!("Beginning queries.");
    let timer = Instant::now();

    {
        let mut consume_record = |record: &BlastRecord| {
            if let Err(why) = reporter.write_record(record, &queries, &db, &scheme) {
                error!("Error writing to result file ({})", why);
                let _ = remove_file(&opts.out_path);
                exit(why.exit_code());
            }
        };

        if opts.double_index {
            let blocks = partition_blocks(total, opts.threads);
            pipeline("local alignment search",
                     opts.threads,
                     blocks.into_iter(),
                     |block| ctx.process_block(block),
                     |(records, delta)| {
                for record in &records {
                    consume_record(record);
                }
                stats.merge(&delta);
                done += records.len();
                if show_progress && (done % PROGRESS_EVERY == 0 || done == total) {
                    print!("\rprocessed {}/{} queries", done, total);
                    let _ = io::stdout().flush();
                }
            });
        } else {
            pipeline("local alignment search",
                     opts.threads,
                     0..total,
                     |source| ctx.process_query(source),
                     |(record, delta)| {
                consume_record(&record);
                stats.merge(&delta);
                done += 1;
                if show_progress && (done % PROGRESS_EVERY == 0 || done == total) {
                    print!("\rprocessed {}/{} queries", done, total);
                    let _ = io::stdout().flush();
                }
            });
        }
    }

    if show_progress {
        println!();
    }

    info!("All worker and result consumer threads terminated. Took {} seconds.",
          timer.elapsed().as_millis() as f32 / 1000.0);
    stats.log_summary();
    if opts.verbosity >= 2 {
        if let Ok(json) = serde_json::to_string(&stats) {
            eprintln!("{}", json);
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn blocks_cover_the_query_set() {
        let blocks = partition_blocks(10, 3);
        assert_eq!(0, blocks[0].start);
        assert_eq!(10, blocks.last().unwrap().end);
        let covered: usize = blocks.iter().map(|b| b.len()).sum();
        assert_eq!(10, covered);

        assert!(partition_blocks(0, 4).is_empty());

        // large sets stay under the block cap
        let blocks = partition_blocks(10_000, 4);
        assert!(blocks.iter().all(|b| b.len() <= MAX_BLOCK));
    }

    #[test]
    fn option_validation() {
        let mut opts = SearchOptions::new(Program::BlastP, "q.fa", "db", "out.m8");
        opts.validate().unwrap();

        opts.threads = 0;
        assert!(opts.validate().is_err());
        opts.threads = 4;

        opts.evalue_cutoff = 0.0;
        assert!(opts.validate().is_err());
        opts.evalue_cutoff = 0.1;

        opts.identity_cutoff = 150.0;
        assert!(opts.validate().is_err());
        opts.identity_cutoff = 0.0;

        opts.band = -7;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn scheme_selection_follows_program() {
        let opts = SearchOptions::new(Program::BlastP, "q.fa", "db", "out.m8");
        assert!(opts.scheme().is_ok());

        let mut opts = SearchOptions::new(Program::BlastP, "q.fa", "db", "out.m8");
        opts.matrix = 0;
        assert!(opts.scheme().is_err());

        let mut opts = SearchOptions::new(Program::BlastN, "q.fa", "db", "out.m8");
        opts.matrix = 0;
        assert!(opts.scheme().is_ok());
    }
}
