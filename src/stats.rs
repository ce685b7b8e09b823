//! Alignment statistics: Karlin–Altschul parameters, length adjustment,
//! bit scores and E-values.
//!
//! `karlin_params` solves the Karlin–Altschul equations for a discrete
//! score distribution: lambda is the unique positive root of
//! `sum p_s * exp(lambda * s) = 1`, H the relative entropy of the aligned
//! pair distribution, and K is evaluated with the convolution series of
//! Karlin & Altschul (1990), on the score lattice reduced by the gcd of
//! the attained scores.

use std::collections::HashMap;
use std::f64::consts::LN_2;
use std::sync::Mutex;

use crate::error::*;

/// Parameters of the extreme-value distribution of local alignment scores.
#[derive(Clone, Copy, Debug)]
pub struct KarlinParams {
    pub lambda: f64,
    pub k: f64,
    pub h: f64,
    pub alpha: f64,
    pub beta: f64,
}

const LAMBDA_ITER: usize = 100;
const K_ITER_MAX: usize = 128;
const K_SUM_LIMIT: f64 = 1e-4;

/// Derive lambda, K and H from a score distribution. `probs[i]` is the
/// probability of score `low + i`. Fails with `InvalidScoring` when the
/// equations have no positive solution (non-negative expected score, or no
/// positive/negative score attained).
pub fn karlin_params(low: i32, probs: &[f64]) -> LocustResult<KarlinParams> {
    let high = low + probs.len() as i32 - 1;

    let total: f64 = probs.iter().sum();
    if total <= 0.0 {
        return Err(LocustError::InvalidScoring("empty score distribution".to_string()));
    }
    let probs: Vec<f64> = probs.iter().map(|p| p / total).collect();

    let score = |i: usize| low + i as i32;

    let mut lowest = i32::MAX;
    let mut highest = i32::MIN;
    let mut mean = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        if p > 0.0 {
            lowest = lowest.min(score(i));
            highest = highest.max(score(i));
            mean += p * score(i) as f64;
        }
    }
    if lowest >= 0 {
        return Err(LocustError::InvalidScoring("no negative score attained".to_string()));
    }
    if highest <= 0 {
        return Err(LocustError::InvalidScoring("no positive score attained".to_string()));
    }
    if mean >= 0.0 {
        return Err(LocustError::InvalidScoring(format!(
            "expected score must be negative, got {:.4}",
            mean
        )));
    }

    let lambda = solve_lambda(low, &probs)?;

    let mut h = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        let s = score(i) as f64;
        h += s * p * (lambda * s).exp();
    }
    let h = lambda * h;

    // Reduce the lattice by the gcd of attained scores before evaluating K.
    let mut d: i32 = 0;
    for (i, &p) in probs.iter().enumerate() {
        if p > 0.0 && score(i) != 0 {
            d = gcd(d, score(i).abs());
        }
    }
    let d = d.max(1);
    let rlow = lowest / d;
    let rhigh = highest / d;
    let mut rprobs = vec![0.0; (rhigh - rlow) as usize + 1];
    for (i, &p) in probs.iter().enumerate() {
        if p > 0.0 {
            rprobs[(score(i) / d - rlow) as usize] += p;
        }
    }
    let rlambda = lambda * d as f64;

    let k = karlin_k(rlow, &rprobs, rlambda, h)?;

    Ok(KarlinParams { lambda, k, h, alpha: lambda / h, beta: 0.0 })
}

/// Unique positive root of `sum p_s exp(lambda s) = 1`, by bisection.
fn solve_lambda(low: i32, probs: &[f64]) -> LocustResult<f64> {
    let f = |lambda: f64| -> f64 {
        let mut sum = -1.0;
        for (i, &p) in probs.iter().enumerate() {
            if p > 0.0 {
                sum += p * (lambda * (low + i as i32) as f64).exp();
            }
        }
        sum
    };

    let mut hi = 0.5;
    let mut doublings = 0;
    while f(hi) < 0.0 {
        hi *= 2.0;
        doublings += 1;
        if doublings > 64 {
            return Err(LocustError::InvalidScoring("lambda does not converge".to_string()));
        }
    }

    let mut lo = 0.0;
    for _ in 0..LAMBDA_ITER {
        let mid = 0.5 * (lo + hi);
        if f(mid) < 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(0.5 * (lo + hi))
}

/// K on a gcd-reduced lattice: the closed form for the +1/−1 walk, the
/// convolution series otherwise.
fn karlin_k(low: i32, probs: &[f64], lambda: f64, h: f64) -> LocustResult<f64> {
    let high = low + probs.len() as i32 - 1;
    let av = h / lambda;

    if low == -1 && high == 1 && probs[1] <= 0.0 {
        // two-point walk: K = (q - p)^2 / q with q the down-step mass
        let q = probs[0];
        let p = probs[2];
        return Ok((q - p) * (q - p) / q);
    }

    // sigma = sum_j (1/j) [ E(e^{lambda S_j}; S_j < 0) + P(S_j >= 0) ]
    // accumulated over j-fold convolutions of the score distribution.
    let mut sigma = 0.0;
    let mut conv = probs.to_vec();
    let mut conv_low = low;
    for j in 1..=K_ITER_MAX {
        let mut bracket = 0.0;
        for (i, &p) in conv.iter().enumerate() {
            if p <= 0.0 {
                continue;
            }
            let s = conv_low + i as i32;
            if s < 0 {
                bracket += p * (lambda * s as f64).exp();
            } else {
                bracket += p;
            }
        }
        sigma += bracket / j as f64;
        if bracket < K_SUM_LIMIT {
            break;
        }
        if j < K_ITER_MAX {
            conv = convolve(&conv, probs);
            conv_low += low;
        }
    }

    let k = (-2.0 * sigma).exp() / (av * (1.0 - (-lambda).exp()));
    if !k.is_finite() || k <= 0.0 {
        return Err(LocustError::InvalidScoring(format!("K computation failed ({})", k)));
    }
    Ok(k)
}

fn convolve(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, &x) in a.iter().enumerate() {
        if x == 0.0 {
            continue;
        }
        for (j, &y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

fn gcd(a: i32, b: i32) -> i32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Altschul–Gish length adjustment: fixed point of
/// `ell = ln(K * (m - ell) * (n - N*ell)) / H`.
pub fn compute_length_adjustment(k: f64, h: f64, m: u64, n: u64, num_seqs: u64) -> u64 {
    let mut ell = 0.0f64;
    for _ in 0..20 {
        let m_eff = (m as f64 - ell).max(1.0);
        let n_eff = (n as f64 - num_seqs as f64 * ell).max(1.0);
        let next = ((k * m_eff * n_eff).ln() / h).max(0.0);
        if (next - ell).abs() < 0.5 {
            ell = next;
            break;
        }
        ell = next;
    }
    (ell as u64).min(m / 2)
}

/// Shared E-value calculator. The length-adjustment cache is written under
/// a mutex; workers only ever read fully published values.
pub struct EvalueCalc {
    params: KarlinParams,
    db_len: u64,
    db_seqs: u64,
    cache: Mutex<HashMap<(u64, u64, u64), u64>>,
}

impl EvalueCalc {
    pub fn new(params: KarlinParams, db_len: u64, db_seqs: u64) -> EvalueCalc {
        EvalueCalc { params, db_len, db_seqs, cache: Mutex::new(HashMap::new()) }
    }

    pub fn params(&self) -> &KarlinParams {
        &self.params
    }

    /// Normalized score in bits.
    pub fn bit_score(&self, raw: i32) -> f64 {
        (self.params.lambda * raw as f64 - self.params.k.ln()) / LN_2
    }

    /// Expected number of chance alignments with at least this score.
    pub fn evalue(&self, raw: i32, query_len: u64) -> f64 {
        let ell = self.length_adjustment(query_len);
        let m_eff = query_len.saturating_sub(ell).max(1) as f64;
        let n_eff = self.db_len.saturating_sub(self.db_seqs.saturating_mul(ell)).max(1) as f64;
        self.params.k * m_eff * n_eff * (-self.params.lambda * raw as f64).exp()
    }

    fn length_adjustment(&self, query_len: u64) -> u64 {
        let key = (query_len, self.db_seqs, self.db_len);
        let mut cache = self.cache.lock().expect("length adjustment cache poisoned");
        if let Some(&ell) = cache.get(&key) {
            return ell;
        }
        let ell = compute_length_adjustment(self.params.k,
                                            self.params.h,
                                            query_len,
                                            self.db_len,
                                            self.db_seqs);
        cache.insert(key, ell);
        ell
    }
}
