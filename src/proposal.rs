//! Adaptive proposal state for one particle: per-parameter scales, a running
//! empirical covariance of the working-space chain, and the Cholesky factor
//! that drives correlated block proposals.

use nalgebra as na;

use crate::rng::DrawRng;

/// How candidate working-space vectors are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalMethod {
    /// One coordinate at a time, each with its own scale.
    Univariate,
    /// All coordinates jointly with a shared scale and identity covariance.
    BlockIsotropic,
    /// All coordinates jointly through the Cholesky factor of the running
    /// empirical covariance.
    BlockCorrelated,
}

/// Initial proposal standard deviation, exp of the initial log-scale.
pub const INIT_SCALE: f64 = 0.1;

/// Robbins-Monro targets: 0.44 is optimal for one-dimensional updates,
/// 0.234 for joint updates in moderate dimension.
pub const TARGET_UNIVARIATE: f64 = 0.44;
pub const TARGET_BLOCK: f64 = 0.234;

const RM_GAMMA: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct Proposal {
    d: usize,

    // Scales, on the log scale so Robbins-Monro steps stay additive.
    log_scale: Vec<f64>,
    block_log_scale: f64,

    // Robbins-Monro step counts.
    rm_steps: Vec<u64>,
    rm_block_steps: u64,

    // Accept/attempt tallies, kept whether or not adaptation is live.
    accepts: Vec<u64>,
    attempts: Vec<u64>,
    block_accepts: u64,
    block_attempts: u64,

    // Welford accumulator over post-step phi.
    cov_n: u64,
    mean: na::DVector<f64>,
    sq_dev: na::DMatrix<f64>,
    chol: Option<na::DMatrix<f64>>,
    refresh_every: u64,
}

impl Proposal {
    pub fn new(d: usize) -> Self {
        Self {
            d,
            log_scale: vec![INIT_SCALE.ln(); d],
            block_log_scale: INIT_SCALE.ln(),
            rm_steps: vec![0; d],
            rm_block_steps: 0,
            accepts: vec![0; d],
            attempts: vec![0; d],
            block_accepts: 0,
            block_attempts: 0,
            cov_n: 0,
            mean: na::DVector::zeros(d),
            sq_dev: na::DMatrix::zeros(d, d),
            chol: None,
            refresh_every: (5 * d as u64).max(20),
        }
    }

    /// Candidate for coordinate `i` of a univariate sweep.
    pub fn propose_coord(&self, i: usize, phi_i: f64, rng: &mut DrawRng) -> f64 {
        phi_i + self.log_scale[i].exp() * rng.standard_normal()
    }

    /// Candidate vector for a block sweep. A correlated proposal without a
    /// Cholesky factor yet (early burn-in, or a singular covariance) falls
    /// back to an isotropic draw.
    pub fn propose_block(&self, method: ProposalMethod, phi: &[f64], rng: &mut DrawRng) -> Vec<f64> {
        let scale = self.block_log_scale.exp();
        let z = rng.standard_normal_vec(self.d);
        match (method, &self.chol) {
            (ProposalMethod::BlockCorrelated, Some(l)) => {
                let step = l * na::DVector::from_column_slice(&z);
                phi.iter()
                    .zip(step.iter())
                    .map(|(&p, &s)| p + scale * s)
                    .collect()
            }
            _ => phi
                .iter()
                .zip(&z)
                .map(|(&p, &zi)| p + scale * zi)
                .collect(),
        }
    }

    /// Records the outcome of a univariate update of coordinate `i` and, if
    /// `adapt`, takes one Robbins-Monro step on its scale.
    pub fn observe_coord(&mut self, i: usize, accepted: bool, adapt: bool) {
        self.attempts[i] += 1;
        if accepted {
            self.accepts[i] += 1;
        }
        if adapt {
            self.rm_steps[i] += 1;
            let alpha = if accepted { 1.0 } else { 0.0 };
            self.log_scale[i] +=
                (alpha - TARGET_UNIVARIATE) / (self.rm_steps[i] as f64).powf(RM_GAMMA);
        }
    }

    /// Block analogue of [`Proposal::observe_coord`], with the shared scale.
    pub fn observe_block(&mut self, accepted: bool, adapt: bool) {
        self.block_attempts += 1;
        if accepted {
            self.block_accepts += 1;
        }
        if adapt {
            self.rm_block_steps += 1;
            let alpha = if accepted { 1.0 } else { 0.0 };
            self.block_log_scale +=
                (alpha - TARGET_BLOCK) / (self.rm_block_steps as f64).powf(RM_GAMMA);
        }
    }

    /// Feeds the post-step phi (accepted or not) into the Welford running
    /// mean/covariance and refreshes the Cholesky factor on schedule.
    pub fn record_cov(&mut self, phi: &[f64]) {
        let x = na::DVector::from_column_slice(phi);
        self.cov_n += 1;
        let n = self.cov_n as f64;
        let delta = &x - &self.mean;
        self.mean += &delta / n;
        let delta2 = &x - &self.mean;
        self.sq_dev += &delta * delta2.transpose();
        if self.cov_n % self.refresh_every == 0 {
            self.refresh_cholesky();
        }
    }

    fn refresh_cholesky(&mut self) {
        if self.cov_n < 2 {
            return;
        }
        let mut sigma = self.covariance();
        let jitter = 1e-8 * sigma.trace() / self.d as f64;
        for i in 0..self.d {
            sigma[(i, i)] += jitter;
        }
        // A singular covariance keeps the previous factor.
        if let Some(c) = na::Cholesky::new(sigma) {
            self.chol = Some(c.l());
        }
    }

    /// Current empirical covariance, zero until two observations exist.
    pub fn covariance(&self) -> na::DMatrix<f64> {
        if self.cov_n < 2 {
            return na::DMatrix::zeros(self.d, self.d);
        }
        &self.sq_dev / (self.cov_n - 1) as f64
    }

    pub fn has_cholesky(&self) -> bool {
        self.chol.is_some()
    }

    /// Resets scales and Robbins-Monro counters to their initial state
    /// (phase `bw_reset`).
    pub fn reset_scales(&mut self) {
        self.log_scale.fill(INIT_SCALE.ln());
        self.block_log_scale = INIT_SCALE.ln();
        self.rm_steps.fill(0);
        self.rm_block_steps = 0;
    }

    /// Drops the covariance accumulator (phase toggling `cov_recalc` on).
    pub fn reset_cov(&mut self) {
        self.cov_n = 0;
        self.mean.fill(0.0);
        self.sq_dev.fill(0.0);
        self.chol = None;
    }

    /// Per-coordinate acceptance over every univariate attempt so far.
    pub fn acceptance(&self) -> Vec<f64> {
        self.accepts
            .iter()
            .zip(&self.attempts)
            .map(|(&a, &n)| if n == 0 { f64::NAN } else { a as f64 / n as f64 })
            .collect()
    }

    /// Acceptance over every block attempt so far.
    pub fn block_acceptance(&self) -> f64 {
        if self.block_attempts == 0 {
            f64::NAN
        } else {
            self.block_accepts as f64 / self.block_attempts as f64
        }
    }

    /// Acceptance pooled over every attempt of either kind; NaN before the
    /// first attempt.
    pub fn overall_acceptance(&self) -> f64 {
        let accepts: u64 = self.accepts.iter().sum::<u64>() + self.block_accepts;
        let attempts: u64 = self.attempts.iter().sum::<u64>() + self.block_attempts;
        if attempts == 0 {
            f64::NAN
        } else {
            accepts as f64 / attempts as f64
        }
    }

    pub fn scales(&self) -> Vec<f64> {
        self.log_scale.iter().map(|s| s.exp()).collect()
    }

    pub fn block_scale(&self) -> f64 {
        self.block_log_scale.exp()
    }
}
