//! The extension engine: grows a surviving seed hit into a gapped local
//! alignment.
//!
//! The in-region alignment is a pure diagonal scan when no indels can
//! occur, or a banded Smith–Waterman otherwise. Both region ends are then
//! extended outward with a banded affine DP under the X-drop rule. One DP
//! routine serves both phases: `local` selects Smith–Waterman clamping,
//! otherwise the alignment is anchored at the shared corner.

use crate::hits::Match;
use crate::matrix::ScoringScheme;

/// One alignment column.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Op {
    /// Match or substitution: consumes one residue of each sequence.
    Sub,
    /// Gap in the subject row: consumes a query residue.
    Ins,
    /// Gap in the query row: consumes a subject residue.
    Del,
}

/// Extension knobs: `-b`, `-x`, plus the seed geometry for the band of the
/// in-region alignment.
#[derive(Clone, Copy, Debug)]
pub struct ExtendConfig {
    pub band: i32,
    pub xdrop: i32,
    pub seed_len: usize,
    pub max_seed_dist: u32,
}

/// A completed extension in translated-record coordinates.
#[derive(Clone, Debug)]
pub struct Extension {
    pub score: i32,
    pub qstart: usize,
    pub qend: usize,
    pub sstart: usize,
    pub send: usize,
    pub ops: Vec<Op>,
}

/// Band half-width policy: -3 log, -2 sqrt, -1 full DP, literal otherwise.
pub fn resolve_band(band: i32, qry_len: usize) -> Option<usize> {
    match band {
        -3 => Some((qry_len.max(2) as f64).log2().ceil() as usize),
        -2 => Some((qry_len as f64).sqrt().floor() as usize),
        -1 => None,
        b if b >= 0 => Some(b as usize),
        _ => Some(0),
    }
}

/// Best-scoring subsegment of the ungapped diagonal: walk, reset the
/// running score at zero, remember the best suffix end.
pub fn diagonal_scan(q: &[u8], s: &[u8], scheme: &ScoringScheme) -> (i32, usize, usize) {
    let len = q.len().min(s.len());
    let mut best = (0i32, 0usize, 0usize);
    let mut run = 0i32;
    let mut start = 0usize;
    for i in 0..len {
        run += scheme.score(q[i], s[i]);
        if run <= 0 {
            run = 0;
            start = i + 1;
        } else if run > best.0 {
            best = (run, start, i + 1);
        }
    }
    best
}

const NEG_INF: i32 = i32::MIN / 2;

const H_STOP: u8 = 0;
const H_DIAG: u8 = 1;
const H_E: u8 = 2;
const H_F: u8 = 3;
const H_MASK: u8 = 0b11;
const E_OPEN: u8 = 1 << 2;
const F_OPEN: u8 = 1 << 3;

struct DpResult {
    score: i32,
    a_start: usize,
    a_end: usize,
    b_start: usize,
    b_end: usize,
    ops: Vec<Op>,
}

/// Banded affine-gap DP over `a` (query side) and `b` (subject side).
///
/// `local` gives Smith–Waterman semantics (start anywhere, clamp at zero);
/// otherwise the alignment is anchored at (0, 0) and grows outward, with
/// `xdrop` terminating rows that fall too far below the running best.
fn extend_dp(a: &[u8],
             b: &[u8],
             scheme: &ScoringScheme,
             band: Option<usize>,
             xdrop: Option<i32>,
             local: bool)
             -> DpResult {
    let n = a.len();
    // no cell beyond n + band is inside the band, so the subject side can
    // be clamped before any row is allocated
    let m = match band {
        Some(w) => b.len().min(n + w),
        None => b.len(),
    };
    let width = m + 1;
    let go = scheme.gap_open;
    let ge = scheme.gap_extend;

    let mut trace: Vec<Vec<u8>> = Vec::with_capacity(n + 1);
    let mut h_prev = vec![NEG_INF; width];
    let mut h_cur = vec![NEG_INF; width];
    let mut f_col = vec![NEG_INF; width];

    let mut best = (0i32, 0usize, 0usize);

    // row 0
    let mut t0 = vec![H_STOP; width];
    if local {
        for v in h_prev.iter_mut() {
            *v = 0;
        }
    } else {
        h_prev[0] = 0;
        let jmax = band.map_or(m, |w| w.min(m));
        let mut e = NEG_INF;
        for j in 1..=jmax {
            let open = h_prev[j - 1] - go - ge;
            let ext = e - ge;
            if open >= ext {
                e = open;
                t0[j] |= E_OPEN;
            } else {
                e = ext;
            }
            h_prev[j] = e;
            t0[j] |= H_E;
        }
    }
    trace.push(t0);

    for i in 1..=n {
        let (jlo, jhi) = match band {
            Some(w) => (i.saturating_sub(w), (i + w).min(m)),
            None => (0, m),
        };
        for v in h_cur.iter_mut() {
            *v = NEG_INF;
        }
        let mut t = vec![H_STOP; width];
        let mut e = NEG_INF;
        let mut row_best = NEG_INF;

        if jlo == 0 {
            if local {
                h_cur[0] = 0;
            } else {
                let open = h_prev[0] - go - ge;
                let ext = f_col[0] - ge;
                let f = if open >= ext {
                    t[0] |= F_OPEN;
                    open
                } else {
                    ext
                };
                f_col[0] = f;
                h_cur[0] = f;
                t[0] |= H_F;
            }
            row_best = row_best.max(h_cur[0]);
        }

        for j in jlo.max(1)..=jhi {
            let diag = h_prev[j - 1].saturating_add(scheme.score(a[i - 1], b[j - 1]));

            let e_open = h_cur[j - 1] - go - ge;
            let e_ext = e - ge;
            let e_from_open = e_open >= e_ext;
            e = if e_from_open { e_open } else { e_ext };

            let f_open = h_prev[j] - go - ge;
            let f_ext = f_col[j] - ge;
            let f_from_open = f_open >= f_ext;
            let f = if f_from_open { f_open } else { f_ext };
            f_col[j] = f;

            let mut hval = diag;
            let mut src = H_DIAG;
            if e > hval {
                hval = e;
                src = H_E;
            }
            if f > hval {
                hval = f;
                src = H_F;
            }
            if local && hval <= 0 {
                hval = 0;
                src = H_STOP;
            }
            if let Some(x) = xdrop {
                if best.0 - hval > x {
                    hval = NEG_INF;
                    src = H_STOP;
                }
            }

            h_cur[j] = hval;
            let mut bits = src;
            if e_from_open {
                bits |= E_OPEN;
            }
            if f_from_open {
                bits |= F_OPEN;
            }
            t[j] = bits;

            row_best = row_best.max(hval);
            if hval > best.0 {
                best = (hval, i, j);
            }
        }

        trace.push(t);
        if xdrop.is_some() && row_best == NEG_INF {
            break;
        }
        std::mem::swap(&mut h_prev, &mut h_cur);
    }

    // traceback from the best cell
    let (score, bi, bj) = best;
    let mut ops = Vec::new();
    let (mut i, mut j) = (bi, bj);
    let mut state = H_DIAG; // meaning: currently in the H matrix
    loop {
        if i == 0 && j == 0 {
            break;
        }
        let bits = trace[i][j];
        match state {
            s if s == H_DIAG => match bits & H_MASK {
                H_STOP => break,
                H_DIAG => {
                    ops.push(Op::Sub);
                    i -= 1;
                    j -= 1;
                },
                H_E => state = H_E,
                _ => state = H_F,
            },
            s if s == H_E => {
                ops.push(Op::Del);
                let open = bits & E_OPEN != 0;
                j -= 1;
                if open {
                    state = H_DIAG;
                }
            },
            _ => {
                ops.push(Op::Ins);
                let open = bits & F_OPEN != 0;
                i -= 1;
                if open {
                    state = H_DIAG;
                }
            },
        }
    }
    ops.reverse();

    DpResult { score, a_start: i, a_end: bi, b_start: j, b_end: bj, ops }
}

/// Grow one surviving match into a gapped local alignment. Returns `None`
/// when no positive-scoring alignment exists around the seed.
pub fn extend_match(q: &[u8],
                    s: &[u8],
                    m: &Match,
                    scheme: &ScoringScheme,
                    cfg: &ExtendConfig)
                    -> Option<Extension> {
    let (qs, qe) = (m.qstart as usize, m.qend as usize);
    let (ss, se) = (m.sstart as usize, m.send as usize);
    let row0_len = qe - qs;
    let row1_len = se - ss;

    let diff = (row0_len as i64 - row1_len as i64).unsigned_abs() as usize;
    let max_dist = if cfg.max_seed_dist <= 1 {
        diff
    } else {
        let seeds_in_seed = row0_len.max(row1_len) / cfg.seed_len.max(1);
        diff + seeds_in_seed * cfg.max_seed_dist as usize
    };

    // in-region alignment
    let (region_score, mut aqs, mut aqe, mut ass, mut ase, mut region_ops) = if max_dist == 0 {
        let (score, start, end) = diagonal_scan(&q[qs..qe], &s[ss..se], scheme);
        if score <= 0 {
            return None;
        }
        (score, qs + start, qs + end, ss + start, ss + end, vec![Op::Sub; end - start])
    } else {
        let r = extend_dp(&q[qs..qe], &s[ss..se], scheme, Some(max_dist), None, true);
        if r.score <= 0 {
            return None;
        }
        (r.score, qs + r.a_start, qs + r.a_end, ss + r.b_start, ss + r.b_end, r.ops)
    };

    let band = resolve_band(cfg.band, q.len());
    let xdrop = if cfg.xdrop >= 0 { Some(cfg.xdrop) } else { None };
    let mut score = region_score;

    // outward, leftwards: align the reversed prefixes
    if aqs > 0 && ass > 0 {
        let a_rev: Vec<u8> = q[..aqs].iter().rev().cloned().collect();
        let b_rev: Vec<u8> = s[..ass].iter().rev().cloned().collect();
        let left = extend_dp(&a_rev, &b_rev, scheme, band, xdrop, false);
        if left.score > 0 {
            score += left.score;
            aqs -= left.a_end;
            ass -= left.b_end;
            let mut left_ops = left.ops;
            left_ops.reverse();
            left_ops.extend_from_slice(&region_ops);
            region_ops = left_ops;
        }
    }

    // outward, rightwards
    if aqe < q.len() && ase < s.len() {
        let right = extend_dp(&q[aqe..], &s[ase..], scheme, band, xdrop, false);
        if right.score > 0 {
            score += right.score;
            aqe += right.a_end;
            ase += right.b_end;
            region_ops.extend_from_slice(&right.ops);
        }
    }

    if score <= 0 {
        return None;
    }

    Some(Extension { score, qstart: aqs, qend: aqe, sstart: ass, send: ase, ops: region_ops })
}

/// Render the two alignment rows, gaps as `-`.
pub fn rows_from_ops(q: &[u8],
                     s: &[u8],
                     qstart: usize,
                     sstart: usize,
                     ops: &[Op])
                     -> (Vec<u8>, Vec<u8>) {
    let mut row0 = Vec::with_capacity(ops.len());
    let mut row1 = Vec::with_capacity(ops.len());
    let mut qi = qstart;
    let mut si = sstart;
    for op in ops {
        match *op {
            Op::Sub => {
                row0.push(q[qi]);
                row1.push(s[si]);
                qi += 1;
                si += 1;
            },
            Op::Ins => {
                row0.push(q[qi]);
                row1.push(b'-');
                qi += 1;
            },
            Op::Del => {
                row0.push(b'-');
                row1.push(s[si]);
                si += 1;
            },
        }
    }
    (row0, row1)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::matrix::{MatrixKind, ScoringScheme};

    fn scheme() -> ScoringScheme {
        ScoringScheme::protein(MatrixKind::Blosum62, 11, 1).unwrap()
    }

    fn seed_match(qstart: u32, sstart: u32, len: u32) -> Match {
        Match {
            query: 0,
            subject: 0,
            qstart,
            qend: qstart + len,
            sstart,
            send: sstart + len,
            skip: false,
        }
    }

    fn diag_score(scheme: &ScoringScheme, seq: &[u8]) -> i32 {
        seq.iter().map(|&c| scheme.score(c, c)).sum()
    }

    #[test]
    fn band_policies() {
        assert_eq!(Some(5), resolve_band(-3, 30));
        assert_eq!(Some(5), resolve_band(-2, 30));
        assert_eq!(None, resolve_band(-1, 30));
        assert_eq!(Some(7), resolve_band(7, 30));
    }

    #[test]
    fn identical_sequences_extend_to_full_span() {
        let scheme = scheme();
        let seq = b"MKVLATTREWQHIDNCYGSPMKVLATTREW";
        let cfg = ExtendConfig { band: -3, xdrop: 30, seed_len: 10, max_seed_dist: 1 };
        // seed covers only the middle third
        let m = seed_match(10, 10, 10);

        let ext = extend_match(seq, seq, &m, &scheme, &cfg).unwrap();
        assert_eq!(0, ext.qstart);
        assert_eq!(seq.len(), ext.qend);
        assert_eq!(0, ext.sstart);
        assert_eq!(seq.len(), ext.send);
        assert_eq!(diag_score(&scheme, seq), ext.score);
        assert!(ext.ops.iter().all(|&op| op == Op::Sub));
    }

    #[test]
    fn point_substitution_keeps_alignment_length() {
        let scheme = scheme();
        let q = b"MKVLATTREWQHIDNCYGSPMKVLATTREW".to_vec();
        let mut s = q.clone();
        s[15] = b'W'; // N -> W
        let cfg = ExtendConfig { band: -3, xdrop: 30, seed_len: 10, max_seed_dist: 1 };
        let m = seed_match(0, 0, 10);

        let ext = extend_match(&q, &s, &m, &scheme, &cfg).unwrap();
        assert_eq!(0, ext.qstart);
        assert_eq!(30, ext.qend);
        assert_eq!(30, ext.ops.len());
        let (row0, row1) = rows_from_ops(&q, &s, ext.qstart, ext.sstart, &ext.ops);
        assert_eq!(30, row0.len());
        let identical = row0.iter().zip(row1.iter()).filter(|&(a, b)| a == b).count();
        assert_eq!(29, identical);
    }

    #[test]
    fn insertion_in_subject_is_bridged_by_a_gap() {
        let scheme = scheme();
        let q = b"MKVLATTREWHH".to_vec();
        //             vvv inserted
        let s = b"MKVLAGGGTTREWHH".to_vec();
        let cfg = ExtendConfig { band: 4, xdrop: 50, seed_len: 5, max_seed_dist: 1 };
        let m = seed_match(0, 0, 5);

        let ext = extend_match(&q, &s, &m, &scheme, &cfg).unwrap();
        assert_eq!(12, ext.qend);
        assert_eq!(15, ext.send);
        let dels = ext.ops.iter().filter(|&&op| op == Op::Del).count();
        assert_eq!(3, dels);
        let expected = diag_score(&scheme, &q) + scheme.gap_cost(3);
        assert_eq!(expected, ext.score);
    }

    #[test]
    fn xdrop_stops_extension_into_junk() {
        let scheme = scheme();
        // identical head, then unrelated tail
        let q = b"MKVLATTREWPPPPPPPPPP".to_vec();
        let s = b"MKVLATTREWGGGGGGGGGG".to_vec();
        let cfg = ExtendConfig { band: -3, xdrop: 10, seed_len: 5, max_seed_dist: 1 };
        let m = seed_match(0, 0, 5);

        let ext = extend_match(&q, &s, &m, &scheme, &cfg).unwrap();
        assert_eq!(10, ext.qend, "extension must stop at the junk boundary");
        assert_eq!(diag_score(&scheme, b"MKVLATTREW"), ext.score);
    }

    #[test]
    fn prohibitive_gap_costs_reduce_to_the_diagonal() {
        // with gap penalties far beyond any score, banded DP and the
        // diagonal scan agree
        let scheme = ScoringScheme::protein(MatrixKind::Blosum62, 100, 100).unwrap();
        let q = b"MKVLATTREWQHIDNCYGSP".to_vec();
        let s = q.clone();

        let (diag, start, end) = diagonal_scan(&q, &s, &scheme);
        let full = extend_dp(&q, &s, &scheme, None, None, true);
        assert_eq!(diag, full.score);
        assert_eq!(start, full.a_start);
        assert_eq!(end, full.a_end);
    }

    #[test]
    fn diagonal_scan_finds_best_subsegment() {
        let scheme = scheme();
        // mismatched flanks, identical core
        let q = b"PPPMKVLATTREWPPP".to_vec();
        let s = b"GGGMKVLATTREWGGG".to_vec();
        let (score, start, end) = diagonal_scan(&q, &s, &scheme);
        assert_eq!(3, start);
        assert_eq!(13, end);
        assert_eq!(diag_score(&scheme, b"MKVLATTREW"), score);
    }

    #[test]
    fn negative_region_is_rejected() {
        let scheme = scheme();
        let q = b"PPPPPPPPPP".to_vec();
        let s = b"GGGGGGGGGG".to_vec();
        let cfg = ExtendConfig { band: -3, xdrop: 30, seed_len: 5, max_seed_dist: 1 };
        let m = seed_match(0, 0, 5);
        assert!(extend_match(&q, &s, &m, &scheme, &cfg).is_none());
    }

    #[test]
    fn rows_render_gaps() {
        let q = b"MKVLA".to_vec();
        let s = b"MKLA".to_vec();
        let ops = vec![Op::Sub, Op::Sub, Op::Ins, Op::Sub, Op::Sub];
        let (row0, row1) = rows_from_ops(&q, &s, 0, 0, &ops);
        assert_eq!(b"MKVLA".to_vec(), row0);
        assert_eq!(b"MK-LA".to_vec(), row1);
    }
}
