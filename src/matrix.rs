//! Scoring schemes: substitution matrices, gap penalties, and the derived
//! Karlin–Altschul parameters.

use serde::{Deserialize, Serialize};

use crate::error::*;
use crate::stats::{karlin_params, KarlinParams};

/// Number of residues in the protein matrix order.
const AA_DIM: usize = 24;

/// Residue order of the embedded matrices: ARNDCQEGHILKMFPSTWYVBZX*.
fn aa_index(b: u8) -> usize {
    match b {
        b'A' => 0,
        b'R' => 1,
        b'N' => 2,
        b'D' => 3,
        b'C' => 4,
        b'Q' => 5,
        b'E' => 6,
        b'G' => 7,
        b'H' => 8,
        b'I' => 9,
        b'L' => 10,
        b'K' => 11,
        b'M' => 12,
        b'F' => 13,
        b'P' => 14,
        b'S' => 15,
        b'T' => 16,
        b'W' => 17,
        b'Y' => 18,
        b'V' => 19,
        b'B' => 20,
        b'Z' => 21,
        b'*' => 23,
        // X and everything unexpected
        _ => 22,
    }
}

#[rustfmt::skip]
static BLOSUM62: [[i8; AA_DIM]; AA_DIM] = [
    [ 4,-1,-2,-2, 0,-1,-1, 0,-2,-1,-1,-1,-1,-2,-1, 1, 0,-3,-2, 0,-2,-1, 0,-4],
    [-1, 5, 0,-2,-3, 1, 0,-2, 0,-3,-2, 2,-1,-3,-2,-1,-1,-3,-2,-3,-1, 0,-1,-4],
    [-2, 0, 6, 1,-3, 0, 0, 0, 1,-3,-3, 0,-2,-3,-2, 1, 0,-4,-2,-3, 3, 0,-1,-4],
    [-2,-2, 1, 6,-3, 0, 2,-1,-1,-3,-4,-1,-3,-3,-1, 0,-1,-4,-3,-3, 4, 1,-1,-4],
    [ 0,-3,-3,-3, 9,-3,-4,-3,-3,-1,-1,-3,-1,-2,-3,-1,-1,-2,-2,-1,-3,-3,-2,-4],
    [-1, 1, 0, 0,-3, 5, 2,-2, 0,-3,-2, 1, 0,-3,-1, 0,-1,-2,-1,-2, 0, 3,-1,-4],
    [-1, 0, 0, 2,-4, 2, 5,-2, 0,-3,-3, 1,-2,-3,-1, 0,-1,-3,-2,-2, 1, 4,-1,-4],
    [ 0,-2, 0,-1,-3,-2,-2, 6,-2,-4,-4,-2,-3,-3,-2, 0,-2,-2,-3,-3,-1,-2,-1,-4],
    [-2, 0, 1,-1,-3, 0, 0,-2, 8,-3,-3,-1,-2,-1,-2,-1,-2,-2, 2,-3, 0, 0,-1,-4],
    [-1,-3,-3,-3,-1,-3,-3,-4,-3, 4, 2,-3, 1, 0,-3,-2,-1,-3,-1, 3,-3,-3,-1,-4],
    [-1,-2,-3,-4,-1,-2,-3,-4,-3, 2, 4,-2, 2, 0,-3,-2,-1,-2,-1, 1,-4,-3,-1,-4],
    [-1, 2, 0,-1,-3, 1, 1,-2,-1,-3,-2, 5,-1,-3,-1, 0,-1,-3,-2,-2, 0, 1,-1,-4],
    [-1,-1,-2,-3,-1, 0,-2,-3,-2, 1, 2,-1, 5, 0,-2,-1,-1,-1,-1, 1,-3,-1,-1,-4],
    [-2,-3,-3,-3,-2,-3,-3,-3,-1, 0, 0,-3, 0, 6,-4,-2,-2, 1, 3,-1,-3,-3,-1,-4],
    [-1,-2,-2,-1,-3,-1,-1,-2,-2,-3,-3,-1,-2,-4, 7,-1,-1,-4,-3,-2,-2,-1,-2,-4],
    [ 1,-1, 1, 0,-1, 0, 0, 0,-1,-2,-2, 0,-1,-2,-1, 4, 1,-3,-2,-2, 0, 0, 0,-4],
    [ 0,-1, 0,-1,-1,-1,-1,-2,-2,-1,-1,-1,-1,-2,-1, 1, 5,-2,-2, 0,-1,-1, 0,-4],
    [-3,-3,-4,-4,-2,-2,-3,-2,-2,-3,-2,-3,-1, 1,-4,-3,-2,11, 2,-3,-4,-3,-2,-4],
    [-2,-2,-2,-3,-2,-1,-2,-3, 2,-1,-1,-2,-1, 3,-3,-2,-2, 2, 7,-1,-3,-2,-1,-4],
    [ 0,-3,-3,-3,-1,-2,-2,-3,-3, 3, 1,-2, 1,-1,-2,-2, 0,-3,-1, 4,-3,-2,-1,-4],
    [-2,-1, 3, 4,-3, 0, 1,-1, 0,-3,-4, 0,-3,-3,-2, 0,-1,-4,-3,-3, 4, 1,-1,-4],
    [-1, 0, 0, 1,-3, 3, 4,-2, 0,-3,-3, 1,-1,-3,-1, 0,-1,-3,-2,-2, 1, 4,-1,-4],
    [ 0,-1,-1,-1,-2,-1,-1,-1,-1,-1,-1,-1,-1,-1,-2, 0, 0,-2,-1,-1,-1,-1,-1,-4],
    [-4,-4,-4,-4,-4,-4,-4,-4,-4,-4,-4,-4,-4,-4,-4,-4,-4,-4,-4,-4,-4,-4,-4, 1],
];

#[rustfmt::skip]
static BLOSUM45: [[i8; AA_DIM]; AA_DIM] = [
    [ 5,-2,-1,-2,-1,-1,-1, 0,-2,-1,-1,-1,-1,-2,-1, 1, 0,-2,-2, 0,-1,-1, 0,-5],
    [-2, 7, 0,-1,-3, 1, 0,-2, 0,-3,-2, 3,-1,-2,-2,-1,-1,-2,-1,-2,-1, 0,-1,-5],
    [-1, 0, 6, 2,-2, 0, 0, 0, 1,-2,-3, 0,-2,-2,-2, 1, 0,-4,-2,-3, 4, 0,-1,-5],
    [-2,-1, 2, 7,-3, 0, 2,-1, 0,-4,-3, 0,-3,-4,-1, 0,-1,-4,-2,-3, 5, 1,-1,-5],
    [-1,-3,-2,-3,12,-3,-3,-3,-3,-3,-2,-3,-2,-2,-4,-1,-1,-5,-3,-1,-2,-3,-2,-5],
    [-1, 1, 0, 0,-3, 6, 2,-2, 1,-2,-2, 1, 0,-4,-1, 0,-1,-2,-1,-3, 0, 4,-1,-5],
    [-1, 0, 0, 2,-3, 2, 6,-2, 0,-3,-2, 1,-2,-3, 0, 0,-1,-3,-2,-3, 1, 4,-1,-5],
    [ 0,-2, 0,-1,-3,-2,-2, 7,-2,-4,-3,-2,-2,-3,-2, 0,-2,-2,-3,-3,-1,-2,-1,-5],
    [-2, 0, 1, 0,-3, 1, 0,-2,10,-3,-2,-1, 0,-2,-2,-1,-2,-3, 2,-3, 0, 0,-1,-5],
    [-1,-3,-2,-4,-3,-2,-3,-4,-3, 5, 2,-3, 2, 0,-2,-2,-1,-2, 0, 3,-3,-3,-1,-5],
    [-1,-2,-3,-3,-2,-2,-2,-3,-2, 2, 5,-3, 2, 1,-3,-3,-1,-2, 0, 1,-3,-2,-1,-5],
    [-1, 3, 0, 0,-3, 1, 1,-2,-1,-3,-3, 5,-1,-3,-1,-1,-1,-2,-1,-2, 0, 1,-1,-5],
    [-1,-1,-2,-3,-2, 0,-2,-2, 0, 2, 2,-1, 6, 0,-2,-2,-1,-2, 0, 1,-2,-1,-1,-5],
    [-2,-2,-2,-4,-2,-4,-3,-3,-2, 0, 1,-3, 0, 8,-3,-2,-1, 1, 3, 0,-3,-3,-1,-5],
    [-1,-2,-2,-1,-4,-1, 0,-2,-2,-2,-3,-1,-2,-3, 9,-1,-1,-3,-3,-3,-2,-1,-1,-5],
    [ 1,-1, 1, 0,-1, 0, 0, 0,-1,-2,-3,-1,-2,-2,-1, 4, 2,-4,-2,-1, 0, 0, 0,-5],
    [ 0,-1, 0,-1,-1,-1,-1,-2,-2,-1,-1,-1,-1,-1,-1, 2, 5,-3,-1, 0, 0,-1, 0,-5],
    [-2,-2,-4,-4,-5,-2,-3,-2,-3,-2,-2,-2,-2, 1,-3,-4,-3,15, 3,-3,-4,-2,-2,-5],
    [-2,-1,-2,-2,-3,-1,-2,-3, 2, 0, 0,-1, 0, 3,-3,-2,-1, 3, 8,-1,-2,-2,-1,-5],
    [ 0,-2,-3,-3,-1,-3,-3,-3,-3, 3, 1,-2, 1, 0,-3,-1, 0,-3,-1, 5,-3,-3,-1,-5],
    [-1,-1, 4, 5,-2, 0, 1,-1, 0,-3,-3, 0,-2,-3,-2, 0, 0,-4,-2,-3, 4, 2,-1,-5],
    [-1, 0, 0, 1,-3, 4, 4,-2, 0,-3,-2, 1,-1,-3,-1, 0,-1,-2,-2,-3, 2, 4,-1,-5],
    [ 0,-1,-1,-1,-2,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1, 0, 0,-2,-1,-1,-1,-1,-1,-5],
    [-5,-5,-5,-5,-5,-5,-5,-5,-5,-5,-5,-5,-5,-5,-5,-5,-5,-5,-5,-5,-5,-5,-5, 1],
];

#[rustfmt::skip]
static BLOSUM80: [[i8; AA_DIM]; AA_DIM] = [
    [ 5,-2,-2,-2,-1,-1,-1, 0,-2,-2,-2,-1,-1,-3,-1, 1, 0,-3,-2, 0,-2,-1,-1,-6],
    [-2, 6,-1,-2,-4, 1,-1,-3, 0,-3,-3, 2,-2,-4,-2,-1,-1,-4,-3,-3,-2, 0,-1,-6],
    [-2,-1, 6, 1,-3, 0,-1,-1, 0,-4,-4, 0,-3,-4,-3, 0, 0,-4,-3,-4, 4, 0,-1,-6],
    [-2,-2, 1, 6,-4,-1, 1,-2,-2,-4,-5,-1,-4,-4,-2,-1,-1,-6,-4,-4, 4, 1,-2,-6],
    [-1,-4,-3,-4, 9,-4,-5,-4,-4,-2,-2,-4,-2,-3,-4,-2,-1,-3,-3,-1,-4,-4,-3,-6],
    [-1, 1, 0,-1,-4, 6, 2,-2, 1,-3,-3, 1, 0,-4,-2, 0,-1,-3,-2,-3, 0, 3,-1,-6],
    [-1,-1,-1, 1,-5, 2, 6,-3, 0,-4,-4, 1,-2,-4,-2, 0,-1,-4,-3,-3, 1, 4,-1,-6],
    [ 0,-3,-1,-2,-4,-2,-3, 6,-3,-5,-4,-2,-4,-4,-3,-1,-2,-4,-4,-4,-1,-3,-2,-6],
    [-2, 0, 0,-2,-4, 1, 0,-3, 8,-4,-3,-1,-2,-2,-3,-1,-2,-3, 2,-4,-1, 0,-2,-6],
    [-2,-3,-4,-4,-2,-3,-4,-5,-4, 5, 1,-3, 1,-1,-4,-3,-1,-3,-2, 3,-4,-4,-2,-6],
    [-2,-3,-4,-5,-2,-3,-4,-4,-3, 1, 4,-3, 2, 0,-3,-3,-2,-2,-2, 1,-4,-3,-2,-6],
    [-1, 2, 0,-1,-4, 1, 1,-2,-1,-3,-3, 5,-2,-4,-1,-1,-1,-4,-3,-3,-1, 1,-1,-6],
    [-1,-2,-3,-4,-2, 0,-2,-4,-2, 1, 2,-2, 6, 0,-3,-2,-1,-2,-2, 1,-3,-2,-1,-6],
    [-3,-4,-4,-4,-3,-4,-4,-4,-2,-1, 0,-4, 0, 6,-4,-3,-2, 0, 3,-1,-4,-4,-2,-6],
    [-1,-2,-3,-2,-4,-2,-2,-3,-3,-4,-3,-1,-3,-4, 8,-1,-2,-5,-4,-3,-2,-2,-2,-6],
    [ 1,-1, 0,-1,-2, 0, 0,-1,-1,-3,-3,-1,-2,-3,-1, 5, 1,-4,-2,-2, 0, 0,-1,-6],
    [ 0,-1, 0,-1,-1,-1,-1,-2,-2,-1,-2,-1,-1,-2,-2, 1, 5,-4,-2, 0,-1,-1,-1,-6],
    [-3,-4,-4,-6,-3,-3,-4,-4,-3,-3,-2,-4,-2, 0,-5,-4,-4,11, 2,-3,-5,-4,-3,-6],
    [-2,-3,-3,-4,-3,-2,-3,-4, 2,-2,-2,-3,-2, 3,-4,-2,-2, 2, 7,-2,-3,-3,-2,-6],
    [ 0,-3,-4,-4,-1,-3,-3,-4,-4, 3, 1,-3, 1,-1,-3,-2, 0,-3,-2, 4,-4,-3,-1,-6],
    [-2,-2, 4, 4,-4, 0, 1,-1,-1,-4,-4,-1,-3,-4,-2, 0,-1,-5,-3,-4, 4, 0,-2,-6],
    [-1, 0, 0, 1,-4, 3, 4,-3, 0,-4,-3, 1,-2,-4,-2, 0,-1,-4,-3,-3, 0, 4,-1,-6],
    [-1,-1,-1,-2,-3,-1,-1,-2,-2,-2,-2,-1,-1,-2,-2,-1,-1,-3,-2,-1,-2,-1,-1,-6],
    [-6,-6,-6,-6,-6,-6,-6,-6,-6,-6,-6,-6,-6,-6,-6,-6,-6,-6,-6,-6,-6,-6,-6, 1],
];

/// Robinson & Robinson background residue frequencies, in matrix order.
/// Ambiguity codes and the stop get zero weight.
static AA_FREQS: [f64; AA_DIM] = [
    0.07805, 0.05129, 0.04487, 0.05364, 0.01925, 0.04264, 0.06295, 0.07377,
    0.02199, 0.05142, 0.09019, 0.05744, 0.02243, 0.03856, 0.05203, 0.07120,
    0.05841, 0.01330, 0.03216, 0.06441, 0.0, 0.0, 0.0, 0.0,
];

/// Named substitution matrices, keyed by the `-sc` option value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MatrixKind {
    Blosum45,
    Blosum62,
    Blosum80,
}

impl MatrixKind {
    pub fn from_option(v: u32) -> LocustResult<MatrixKind> {
        match v {
            45 => Ok(MatrixKind::Blosum45),
            62 => Ok(MatrixKind::Blosum62),
            80 => Ok(MatrixKind::Blosum80),
            _ => Err(LocustError::InvalidOption(format!("unknown scoring matrix: {}", v))),
        }
    }

    fn table(&self) -> &'static [[i8; AA_DIM]; AA_DIM] {
        match *self {
            MatrixKind::Blosum45 => &BLOSUM45,
            MatrixKind::Blosum62 => &BLOSUM62,
            MatrixKind::Blosum80 => &BLOSUM80,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Scoring {
    Matrix(MatrixKind),
    MatchMismatch { match_score: i32, mismatch_score: i32 },
}

/// A complete scoring scheme: substitution scores, affine gap penalties
/// (stored positive, subtracted during DP), and the Karlin–Altschul
/// parameters derived from the score distribution at startup.
#[derive(Clone, Debug)]
pub struct ScoringScheme {
    scoring: Scoring,
    pub gap_open: i32,
    pub gap_extend: i32,
    pub params: KarlinParams,
}

impl ScoringScheme {
    /// Protein scheme over a named matrix.
    pub fn protein(kind: MatrixKind, gap_open: i32, gap_extend: i32) -> LocustResult<ScoringScheme> {
        if gap_open < 0 || gap_extend < 0 {
            return Err(LocustError::InvalidScoring(
                "gap penalties must be non-negative".to_string(),
            ));
        }
        let (low, probs) = matrix_score_probs(kind.table());
        let params = karlin_params(low, &probs)?;
        Ok(ScoringScheme { scoring: Scoring::Matrix(kind), gap_open, gap_extend, params })
    }

    /// Nucleotide match/mismatch scheme.
    pub fn nucleotide(match_score: i32,
                      mismatch_score: i32,
                      gap_open: i32,
                      gap_extend: i32)
                      -> LocustResult<ScoringScheme> {
        if match_score <= 0 || mismatch_score >= 0 {
            return Err(LocustError::InvalidScoring(
                "need positive match and negative mismatch scores".to_string(),
            ));
        }
        if gap_open < 0 || gap_extend < 0 {
            return Err(LocustError::InvalidScoring(
                "gap penalties must be non-negative".to_string(),
            ));
        }
        let low = mismatch_score.min(match_score);
        let high = mismatch_score.max(match_score);
        let mut probs = vec![0.0; (high - low) as usize + 1];
        // uniform base composition: 1/4 identity, 3/4 transversion+transition
        probs[(match_score - low) as usize] += 0.25;
        probs[(mismatch_score - low) as usize] += 0.75;
        let params = karlin_params(low, &probs)?;
        Ok(ScoringScheme {
            scoring: Scoring::MatchMismatch { match_score, mismatch_score },
            gap_open,
            gap_extend,
            params,
        })
    }

    /// Substitution score of two residues (bytes in the scoring alphabet).
    pub fn score(&self, a: u8, b: u8) -> i32 {
        match self.scoring {
            Scoring::Matrix(kind) => kind.table()[aa_index(a)][aa_index(b)] as i32,
            Scoring::MatchMismatch { match_score, mismatch_score } => {
                if a == b && a != b'N' {
                    match_score
                } else {
                    mismatch_score
                }
            },
        }
    }

    /// Penalty for a gap of length `len`, as a negative score contribution.
    pub fn gap_cost(&self, len: usize) -> i32 {
        -(self.gap_open + self.gap_extend * len as i32)
    }
}

/// Distribution of substitution scores under background frequencies.
fn matrix_score_probs(table: &[[i8; AA_DIM]; AA_DIM]) -> (i32, Vec<f64>) {
    let mut low = i32::MAX;
    let mut high = i32::MIN;
    for i in 0..20 {
        for j in 0..20 {
            let s = table[i][j] as i32;
            low = low.min(s);
            high = high.max(s);
        }
    }

    let mut probs = vec![0.0; (high - low) as usize + 1];
    let norm: f64 = AA_FREQS.iter().sum();
    for i in 0..20 {
        for j in 0..20 {
            let s = table[i][j] as i32;
            probs[(s - low) as usize] += (AA_FREQS[i] / norm) * (AA_FREQS[j] / norm);
        }
    }
    (low, probs)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn blosum62_spot_values() {
        let scheme = ScoringScheme::protein(MatrixKind::Blosum62, 11, 1).unwrap();
        assert_eq!(4, scheme.score(b'A', b'A'));
        assert_eq!(11, scheme.score(b'W', b'W'));
        assert_eq!(-3, scheme.score(b'W', b'S'));
        assert_eq!(2, scheme.score(b'Y', b'W'));
        assert_eq!(-4, scheme.score(b'A', b'*'));
        assert_eq!(-1, scheme.score(b'X', b'L'));
    }

    #[test]
    fn matrices_are_symmetric() {
        for kind in &[MatrixKind::Blosum45, MatrixKind::Blosum62, MatrixKind::Blosum80] {
            let t = kind.table();
            for i in 0..AA_DIM {
                for j in 0..AA_DIM {
                    assert_eq!(t[i][j], t[j][i], "{:?} asymmetric at ({}, {})", kind, i, j);
                }
            }
        }
    }

    #[test]
    fn blosum62_lambda_is_close_to_published() {
        let scheme = ScoringScheme::protein(MatrixKind::Blosum62, 11, 1).unwrap();
        assert!((scheme.params.lambda - 0.3176).abs() < 0.02,
                "lambda = {}",
                scheme.params.lambda);
        assert!((scheme.params.h - 0.40).abs() < 0.05, "H = {}", scheme.params.h);
        assert!((scheme.params.k - 0.134).abs() < 0.01, "K = {}", scheme.params.k);
    }

    #[test]
    fn nucleotide_scheme_scores() {
        let scheme = ScoringScheme::nucleotide(2, -3, 5, 2).unwrap();
        assert_eq!(2, scheme.score(b'A', b'A'));
        assert_eq!(-3, scheme.score(b'A', b'G'));
        // ambiguity always scores as a mismatch
        assert_eq!(-3, scheme.score(b'N', b'N'));
        assert_eq!(-9, scheme.gap_cost(2));
    }

    #[test]
    fn degenerate_schemes_are_rejected() {
        assert!(ScoringScheme::nucleotide(-1, -3, 5, 2).is_err());
        assert!(ScoringScheme::nucleotide(2, 3, 5, 2).is_err());
        assert!(ScoringScheme::nucleotide(2, -3, -5, 2).is_err());
    }
}
