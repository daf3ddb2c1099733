//! Convergence diagnostics: autocorrelation, effective sample size and the
//! Gelman-Rubin potential scale reduction statistic.

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;
use num_traits::{Num, ToPrimitive};
use std::error::Error;

/// Sample autocorrelations rho_0..=max_lag of a single trace.
///
/// Uses the biased estimator (normalised by n rather than n - k), which is
/// the standard choice for ESS because it keeps the sequence positive
/// definite.
pub fn autocorrelation(x: &[f64], max_lag: usize) -> Vec<f64> {
    let n = x.len();
    let max_lag = max_lag.min(n.saturating_sub(1));
    if n == 0 {
        return Vec::new();
    }
    let nf = n as f64;
    let mean = x.iter().sum::<f64>() / nf;
    let dev: Vec<f64> = x.iter().map(|v| v - mean).collect();
    let gamma0 = dev.iter().map(|d| d * d).sum::<f64>() / nf;
    if gamma0 <= 0.0 {
        // Constant chain: define rho_0 = 1, the rest 0.
        let mut rho = vec![0.0; max_lag + 1];
        rho[0] = 1.0;
        return rho;
    }
    (0..=max_lag)
        .map(|k| {
            dev[..n - k]
                .iter()
                .zip(&dev[k..])
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / nf
                / gamma0
        })
        .collect()
}

/// Effective sample size of a single trace,
/// `n / (1 + 2 * sum rho_k)` with the sum truncated by Geyer's initial
/// positive sequence rule: consecutive lag pairs are added while their sum
/// stays positive.
pub fn ess(x: &[f64]) -> f64 {
    let n = x.len();
    if n < 4 {
        return n as f64;
    }
    let nf = n as f64;
    let mean = x.iter().sum::<f64>() / nf;
    let dev: Vec<f64> = x.iter().map(|v| v - mean).collect();
    let gamma0 = dev.iter().map(|d| d * d).sum::<f64>() / nf;
    if gamma0 <= 0.0 {
        return nf;
    }
    let rho = |k: usize| -> f64 {
        dev[..n - k]
            .iter()
            .zip(&dev[k..])
            .map(|(a, b)| a * b)
            .sum::<f64>()
            / nf
            / gamma0
    };
    let mut sum = 0.0;
    let mut k = 1;
    while k + 1 < n {
        let pair = rho(k) + rho(k + 1);
        if pair <= 0.0 {
            break;
        }
        sum += pair;
        k += 2;
    }
    nf / (1.0 + 2.0 * sum)
}

/// Online Gelman-Rubin tracker over `n_chains` chains of `n_params`
/// parameters. Feed one flattened (chain x param) slice per recorded
/// iteration, then read the per-parameter statistic with [`RhatTracker::all`].
#[derive(Debug, Clone, PartialEq)]
pub struct RhatTracker {
    n: u64,
    n_chains: usize,
    n_params: usize,
    mean: Array2<f64>,
    sq_dev: Array2<f64>,
}

impl RhatTracker {
    pub fn new(n_chains: usize, n_params: usize) -> Self {
        Self {
            n: 0,
            n_chains,
            n_params,
            mean: Array2::zeros((n_chains, n_params)),
            sq_dev: Array2::zeros((n_chains, n_params)),
        }
    }

    /// Records one iteration; `x` is chain-major, length n_chains * n_params.
    pub fn step<T>(&mut self, x: &[T]) -> Result<(), Box<dyn Error>>
    where
        T: Num + ToPrimitive + Clone,
    {
        let mut buf = Vec::with_capacity(x.len());
        for v in x {
            buf.push(v.to_f64().ok_or("value not representable as f64")?);
        }
        let x_arr = Array2::from_shape_vec((self.n_chains, self.n_params), buf)?;
        self.n += 1;
        let n = self.n as f64;
        let delta = &x_arr - &self.mean;
        self.mean = &self.mean + &(&delta / n);
        let delta2 = &x_arr - &self.mean;
        self.sq_dev = &self.sq_dev + &(&delta * &delta2);
        Ok(())
    }

    /// Per-parameter Rhat: sqrt((n-1)/n + B/(W*n)) with B the between-chain
    /// and W the within-chain variance.
    pub fn all(&self) -> Result<Array1<f64>, Box<dyn Error>> {
        if self.n < 2 {
            return Err("Rhat needs at least two recorded iterations.".into());
        }
        if self.n_chains < 2 {
            return Err("Rhat needs at least two chains.".into());
        }
        let n = self.n as f64;
        let m = self.n_chains as f64;
        let within = (self.sq_dev.clone() / (n - 1.0))
            .mean_axis(Axis(0))
            .ok_or("within-chain variance reduction failed")?;
        let grand = self
            .mean
            .mean_axis(Axis(0))
            .ok_or("grand mean reduction failed")?;
        let between = (self.mean.clone() - grand.insert_axis(Axis(0)))
            .mapv(|v| v * v)
            .sum_axis(Axis(0))
            * (n / (m - 1.0));
        let rhat = (between / (&within * n) + (n - 1.0) / n).mapv(f64::sqrt);
        Ok(rhat)
    }

    /// Largest per-parameter Rhat, the usual scalar convergence check.
    pub fn max(&self) -> Result<f64, Box<dyn Error>> {
        Ok(*self.all()?.max()?)
    }
}

/// Rhat of a single parameter from equal-length per-chain traces.
pub fn rhat(chains: &[Vec<f64>]) -> Result<f64, Box<dyn Error>> {
    if chains.len() < 2 {
        return Err("Rhat needs at least two chains.".into());
    }
    let n = chains[0].len();
    if chains.iter().any(|c| c.len() != n) {
        return Err("Rhat needs equal-length chains.".into());
    }
    let mut tracker = RhatTracker::new(chains.len(), 1);
    for t in 0..n {
        let row: Vec<f64> = chains.iter().map(|c| c[t]).collect();
        tracker.step(&row)?;
    }
    tracker.max()
}
