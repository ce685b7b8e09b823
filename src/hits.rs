//! The hit pipeline: everything that happens to seed hits between the
//! index search and the extension engine, plus the run-wide counters.

use serde::Serialize;

use crate::index::Database;
use crate::mask::Masking;
use crate::matrix::ScoringScheme;
use crate::query::QuerySet;
use crate::store::PackedPos;

/// A seed hit before extension. Positions are in reduced/translated
/// coordinates; `skip` marks hits absorbed by a merge or ruled out by one
/// of the filters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Match {
    pub query: u32,
    pub subject: u32,
    pub qstart: u32,
    pub qend: u32,
    pub sstart: u32,
    pub send: u32,
    pub skip: bool,
}

impl Match {
    pub fn from_seed(query: u32, offset: u32, pos: PackedPos, seed_len: u32) -> Match {
        Match {
            query,
            subject: pos.seq(),
            qstart: offset,
            qend: offset + seed_len,
            sstart: pos.offset(),
            send: pos.offset() + seed_len,
            skip: false,
        }
    }

    fn sort_key(&self) -> (u32, u32, u32, u32) {
        (self.query, self.subject, self.qstart, self.sstart)
    }
}

/// Hit pipeline knobs.
#[derive(Clone, Copy, Debug)]
pub struct HitConfig {
    pub seed_len: usize,
    pub seed_gravity: u32,
    pub max_matches: usize,
    pub filter_putative_abundant: bool,
    /// Pre-scoring window in seed lengths; 0 disables the filter.
    pub pre_scoring: u32,
    pub pre_scoring_threshold: f64,
}

/// Counters accumulated per worker and reduced at the end of the run.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct StatsHolder {
    pub queries: u64,
    pub seeds: u64,
    pub hits_total: u64,
    pub hits_masked: u64,
    pub hits_merged: u64,
    pub hits_putative_abundant: u64,
    pub hits_duplicate: u64,
    pub hits_abundant: u64,
    pub failed_pre_extend: u64,
    pub failed_percent_ident: u64,
    pub failed_evalue: u64,
    pub failed_other: u64,
    pub matches_written: u64,
}

impl StatsHolder {
    pub fn merge(&mut self, other: &StatsHolder) {
        self.queries += other.queries;
        self.seeds += other.seeds;
        self.hits_total += other.hits_total;
        self.hits_masked += other.hits_masked;
        self.hits_merged += other.hits_merged;
        self.hits_putative_abundant += other.hits_putative_abundant;
        self.hits_duplicate += other.hits_duplicate;
        self.hits_abundant += other.hits_abundant;
        self.failed_pre_extend += other.failed_pre_extend;
        self.failed_percent_ident += other.failed_percent_ident;
        self.failed_evalue += other.failed_evalue;
        self.failed_other += other.failed_other;
        self.matches_written += other.matches_written;
    }

    pub fn log_summary(&self) {
        info!("{} queries, {} seeds, {} seed hits.", self.queries, self.seeds, self.hits_total);
        info!("Hits dropped: {} masked, {} merged, {} putative-abundant, {} duplicate, {} \
               over the match cap.",
              self.hits_masked,
              self.hits_merged,
              self.hits_putative_abundant,
              self.hits_duplicate,
              self.hits_abundant);
        info!("Matches rejected: {} pre-extension, {} percent identity, {} e-value, {} other; \
               {} written.",
              self.failed_pre_extend,
              self.failed_percent_ident,
              self.failed_evalue,
              self.failed_other,
              self.matches_written);
    }
}

/// Ungapped score of the seed diagonal of a match, the stand-in for a bit
/// score before any extension has happened.
pub fn diagonal_prior(q: &[u8], s: &[u8], m: &Match, scheme: &ScoringScheme) -> i32 {
    let mut total = 0;
    let len = (m.qend - m.qstart).min(m.send - m.sstart) as usize;
    for i in 0..len {
        total += scheme.score(q[m.qstart as usize + i], s[m.sstart as usize + i]);
    }
    total
}

/// Average per-position score of the ungapped diagonal of length
/// `win` centred on the seed region, clamped to the sequence ends.
pub fn prescore_window(q: &[u8], s: &[u8], m: &Match, win: usize, scheme: &ScoringScheme) -> f64 {
    let diag = m.sstart as i64 - m.qstart as i64;
    let mid = (m.qstart as i64 + m.qend as i64) / 2;
    let half = (win / 2) as i64;
    let mut from = mid - half;
    let mut to = from + win as i64;
    from = from.max(0).max(-diag);
    to = to.min(q.len() as i64).min(s.len() as i64 - diag);
    if to <= from {
        return f64::NEG_INFINITY;
    }
    let mut total = 0i64;
    for qi in from..to {
        total += scheme.score(q[qi as usize], s[(qi + diag) as usize]) as i64;
    }
    total as f64 / (to - from) as f64
}

/// Mark hits whose subject range lies entirely inside a masked interval.
pub fn suppress_masked(matches: &mut [Match], masking: &Masking, stats: &mut StatsHolder) {
    for m in matches.iter_mut() {
        if !m.skip && masking.is_masked(m.subject as usize, m.sstart as u64, m.send as u64) {
            m.skip = true;
            stats.hits_masked += 1;
        }
    }
}

/// Canonical hit order: (query, subject, query start, subject start).
pub fn sort_matches(matches: &mut [Match]) {
    matches.sort_by_key(Match::sort_key);
}

/// Front-load likely-high-scoring hits: per query, order by descending
/// prior and flag everything beyond `keep` as putative-abundant. A
/// refinement of the canonical order on the surviving prefix.
pub fn hyper_sort(matches: &mut Vec<Match>,
                  priors: &[i32],
                  keep: usize,
                  stats: &mut StatsHolder) {
    debug_assert_eq!(matches.len(), priors.len());
    let mut order: Vec<usize> = (0..matches.len()).collect();
    order.sort_by_key(|&i| {
        let m = &matches[i];
        (m.query, -priors[i], m.subject, m.qstart, m.sstart)
    });

    let mut reordered = Vec::with_capacity(matches.len());
    let mut query_live = 0u32;
    let mut current_query = None;
    for &i in &order {
        let mut m = matches[i];
        if current_query != Some(m.query) {
            current_query = Some(m.query);
            query_live = 0;
        }
        if !m.skip {
            query_live += 1;
            if query_live as usize > keep {
                m.skip = true;
                stats.hits_putative_abundant += 1;
            }
        }
        reordered.push(m);
    }
    *matches = reordered;
}

/// Fuse colinear neighbours: two hits of the same translated (query,
/// subject) pair whose query and subject gaps agree and stay within
/// `seed_gravity` become one longer hit. Requires canonical order.
pub fn merge_colinear(matches: &mut [Match], seed_gravity: u32, stats: &mut StatsHolder) {
    let mut head: Option<usize> = None;
    for i in 0..matches.len() {
        if matches[i].skip {
            continue;
        }
        let h = match head {
            Some(h) if matches[h].query == matches[i].query
                       && matches[h].subject == matches[i].subject => h,
            _ => {
                head = Some(i);
                continue;
            },
        };

        let qdist = matches[i].qstart as i64 - matches[h].qend as i64;
        let sdist = matches[i].sstart as i64 - matches[h].send as i64;
        if qdist == sdist && qdist <= seed_gravity as i64 {
            let (qend, send) = (matches[i].qend, matches[i].send);
            matches[h].qend = matches[h].qend.max(qend);
            matches[h].send = matches[h].send.max(send);
            matches[i].skip = true;
            stats.hits_merged += 1;
        } else {
            head = Some(i);
        }
    }
}

/// Stop accepting hits for a query once another `max_matches` of them no
/// longer improves the median prior of the current best half.
pub fn flag_putative_abundant(matches: &mut [Match],
                              priors: &[i32],
                              max_matches: usize,
                              stats: &mut StatsHolder) {
    debug_assert_eq!(matches.len(), priors.len());
    if max_matches == 0 {
        return;
    }

    let mut i = 0;
    while i < matches.len() {
        let query = matches[i].query;
        let mut j = i;
        let mut best: Vec<i32> = Vec::new();
        let mut live = 0usize;
        let mut prev_median: Option<i32> = None;
        let mut stopped = false;
        while j < matches.len() && matches[j].query == query {
            if !matches[j].skip {
                if stopped {
                    matches[j].skip = true;
                    stats.hits_putative_abundant += 1;
                } else {
                    live += 1;
                    let pos = best.binary_search_by(|p| priors[j].cmp(p)).unwrap_or_else(|e| e);
                    best.insert(pos, priors[j]);
                    if live % max_matches == 0 {
                        let median = median_of_top(&best, max_matches / 2);
                        if let Some(prev) = prev_median {
                            if median <= prev {
                                stopped = true;
                            }
                        }
                        prev_median = Some(median);
                    }
                }
            }
            j += 1;
        }
        i = j;
    }
}

fn median_of_top(sorted_desc: &[i32], top: usize) -> i32 {
    let top = top.max(1).min(sorted_desc.len());
    sorted_desc[top / 2]
}

/// Reject hits whose pre-scoring window scores too low on average.
pub fn prescore_filter(matches: &mut [Match],
                       queries: &QuerySet,
                       db: &Database,
                       scheme: &ScoringScheme,
                       cfg: &HitConfig,
                       stats: &mut StatsHolder) {
    if cfg.pre_scoring == 0 {
        return;
    }
    let win = cfg.pre_scoring as usize * cfg.seed_len;
    for m in matches.iter_mut() {
        if m.skip {
            continue;
        }
        let q = queries.seqs.get(m.query as usize);
        let s = db.subjects.get(m.subject as usize);
        if prescore_window(q, s, m, win, scheme) < cfg.pre_scoring_threshold {
            m.skip = true;
            stats.failed_pre_extend += 1;
        }
    }
}

/// The full pipeline for one query's hits: mask, sort (hyper-sort under
/// pressure), merge, abundance, pre-score. Deterministic for a fixed input
/// order.
pub fn process_hits(matches: &mut Vec<Match>,
                    queries: &QuerySet,
                    db: &Database,
                    scheme: &ScoringScheme,
                    cfg: &HitConfig,
                    stats: &mut StatsHolder) {
    suppress_masked(matches, &db.masking, stats);

    let live = matches.iter().filter(|m| !m.skip).count();
    if cfg.filter_putative_abundant && live > cfg.max_matches {
        let priors: Vec<i32> = matches
            .iter()
            .map(|m| {
                diagonal_prior(queries.seqs.get(m.query as usize),
                               db.subjects.get(m.subject as usize),
                               m,
                               scheme)
            })
            .collect();
        hyper_sort(matches, &priors, cfg.max_matches * 8, stats);
    }
    sort_matches(matches);

    merge_colinear(matches, cfg.seed_gravity, stats);

    if cfg.filter_putative_abundant {
        let priors: Vec<i32> = matches
            .iter()
            .map(|m| {
                diagonal_prior(queries.seqs.get(m.query as usize),
                               db.subjects.get(m.subject as usize),
                               m,
                               scheme)
            })
            .collect();
        flag_putative_abundant(matches, &priors, cfg.max_matches, stats);
    }

    prescore_filter(matches, queries, db, scheme, cfg, stats);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::matrix::{MatrixKind, ScoringScheme};

    fn m(query: u32, subject: u32, qstart: u32, sstart: u32, len: u32) -> Match {
        Match {
            query,
            subject,
            qstart,
            qend: qstart + len,
            sstart,
            send: sstart + len,
            skip: false,
        }
    }

    #[test]
    fn colinear_neighbours_within_gravity_merge() {
        // two seeds on the same diagonal, gap exactly seed_gravity
        let mut matches = vec![m(0, 0, 0, 10, 8), m(0, 0, 12, 22, 8)];
        let mut stats = StatsHolder::default();
        sort_matches(&mut matches);
        merge_colinear(&mut matches, 4, &mut stats);

        assert_eq!(1, stats.hits_merged);
        assert!(!matches[0].skip);
        assert!(matches[1].skip);
        assert_eq!(0, matches[0].qstart);
        assert_eq!(20, matches[0].qend);
        assert_eq!(10, matches[0].sstart);
        assert_eq!(30, matches[0].send);
    }

    #[test]
    fn off_diagonal_or_distant_neighbours_stay_apart() {
        let mut stats = StatsHolder::default();

        // gaps differ: not colinear
        let mut matches = vec![m(0, 0, 0, 10, 8), m(0, 0, 12, 23, 8)];
        sort_matches(&mut matches);
        merge_colinear(&mut matches, 10, &mut stats);
        assert_eq!(0, stats.hits_merged);

        // gap beyond gravity
        let mut matches = vec![m(0, 0, 0, 10, 8), m(0, 0, 20, 30, 8)];
        sort_matches(&mut matches);
        merge_colinear(&mut matches, 4, &mut stats);
        assert_eq!(0, stats.hits_merged);

        // different subject
        let mut matches = vec![m(0, 0, 0, 10, 8), m(0, 1, 10, 20, 8)];
        sort_matches(&mut matches);
        merge_colinear(&mut matches, 10, &mut stats);
        assert_eq!(0, stats.hits_merged);
    }

    #[test]
    fn chained_seeds_collapse_into_one_span() {
        let mut matches = vec![m(0, 0, 0, 0, 8), m(0, 0, 8, 8, 8), m(0, 0, 16, 16, 8)];
        let mut stats = StatsHolder::default();
        sort_matches(&mut matches);
        merge_colinear(&mut matches, 8, &mut stats);

        assert_eq!(2, stats.hits_merged);
        assert_eq!(24, matches[0].qend);
        assert!(matches[1].skip && matches[2].skip);
    }

    #[test]
    fn identical_duplicate_seed_hits_merge() {
        let mut matches = vec![m(0, 0, 5, 5, 8), m(0, 0, 5, 5, 8)];
        let mut stats = StatsHolder::default();
        sort_matches(&mut matches);
        merge_colinear(&mut matches, 0, &mut stats);
        assert_eq!(1, stats.hits_merged);
        assert_eq!(13, matches[0].qend);
    }

    #[test]
    fn putative_abundance_stops_non_improving_queries() {
        // 8 equal-prior hits with max_matches = 2: the second chunk cannot
        // improve the median, so everything after it is flagged
        let mut matches: Vec<Match> = (0..8).map(|i| m(0, i, 0, 0, 8)).collect();
        let priors = vec![10; 8];
        let mut stats = StatsHolder::default();
        flag_putative_abundant(&mut matches, &priors, 2, &mut stats);

        let live = matches.iter().filter(|m| !m.skip).count();
        assert_eq!(4, live);
        assert_eq!(4, stats.hits_putative_abundant);
    }

    #[test]
    fn improving_queries_keep_accepting() {
        // strictly improving priors never trip the filter
        let mut matches: Vec<Match> = (0..8).map(|i| m(0, i, 0, 0, 8)).collect();
        let priors: Vec<i32> = (0..8).collect();
        let mut stats = StatsHolder::default();
        flag_putative_abundant(&mut matches, &priors, 2, &mut stats);

        assert_eq!(0, stats.hits_putative_abundant);
        assert!(matches.iter().all(|m| !m.skip));
    }

    #[test]
    fn hyper_sort_front_loads_and_caps() {
        let mut matches: Vec<Match> = (0..6).map(|i| m(0, i, 0, 0, 8)).collect();
        let priors = vec![1, 9, 5, 7, 3, 8];
        let mut stats = StatsHolder::default();
        hyper_sort(&mut matches, &priors, 4, &mut stats);

        // highest priors first
        assert_eq!(1, matches[0].subject);
        assert_eq!(5, matches[1].subject);
        assert_eq!(3, matches[2].subject);
        assert_eq!(2, matches[3].subject);
        // the two worst hits were flagged
        assert_eq!(2, stats.hits_putative_abundant);
        assert_eq!(2, matches.iter().filter(|m| m.skip).count());
    }

    #[test]
    fn prescore_window_averages_the_diagonal() {
        let scheme = ScoringScheme::protein(MatrixKind::Blosum62, 11, 1).unwrap();
        let q = b"MKVLATTREW";
        let s = b"MKVLATTREW";
        let hit = m(0, 0, 2, 2, 4);
        let avg = prescore_window(q, s, &hit, 8, &scheme);
        // identical residues score their diagonal entries; all are >= 4
        assert!(avg >= 4.0, "avg = {}", avg);

        let unrelated = b"PPPPPPPPPP";
        let avg = prescore_window(q, unrelated, &hit, 8, &scheme);
        assert!(avg < 0.0, "avg = {}", avg);
    }

    #[test]
    fn stats_merge_accumulates() {
        let mut a = StatsHolder::default();
        a.queries = 2;
        a.hits_merged = 3;
        let mut b = StatsHolder::default();
        b.queries = 1;
        b.hits_merged = 4;
        b.failed_evalue = 7;
        a.merge(&b);
        assert_eq!(3, a.queries);
        assert_eq!(7, a.hits_merged);
        assert_eq!(7, a.failed_evalue);
    }
}
