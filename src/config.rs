//! Run configuration: data, parameter descriptors, the burn-in phase table
//! and the sampler knobs, validated before any iteration runs.

use thiserror::Error;

use crate::proposal::ProposalMethod;

/// Invalid configuration, raised while building the sampler; fatal.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("parameter {name}: lower bound {min} is not below upper bound {max}")]
    BadBounds { name: String, min: f64, max: f64 },

    #[error("parameter {name}: initial value {init} is not strictly inside ({min}, {max})")]
    InitOutOfBounds {
        name: String,
        init: f64,
        min: f64,
        max: f64,
    },

    #[error("no parameters supplied")]
    NoParams,

    #[error("non-finite observation at index {0}")]
    BadData(usize),

    #[error("burn-in schedule is empty")]
    EmptyBurnin,

    #[error("burn-in phase {0} has zero iterations")]
    EmptyPhase(usize),

    #[error("samples must be positive")]
    NoSamples,

    #[error("rungs must be at least 1")]
    NoRungs,

    #[error("GTI power {0} must be at least 1")]
    BadGtiPow(f64),

    #[error("manual ladder must hold {rungs} non-decreasing values in [0, 1] ending at 1")]
    BadLadder { rungs: usize },

    #[error("log-likelihood or log-prior is non-finite at the initial parameter vector")]
    NonFiniteInit,
}

/// Descriptor of one model parameter. Bounds may be infinite; the initial
/// value must lie strictly inside them.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub init: f64,
}

impl Param {
    pub fn new(name: impl Into<String>, min: f64, max: f64, init: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            init,
        }
    }

    /// A parameter on the whole real line.
    pub fn unbounded(name: impl Into<String>, init: f64) -> Self {
        Self::new(name, f64::NEG_INFINITY, f64::INFINITY, init)
    }

    /// A parameter bounded below, e.g. a scale.
    pub fn lower(name: impl Into<String>, min: f64, init: f64) -> Self {
        Self::new(name, min, f64::INFINITY, init)
    }
}

/// One row of the burn-in state machine: how many iterations to run and which
/// adaptation switches are live while they run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseConfig {
    pub iterations: usize,
    pub method: ProposalMethod,
    /// Robbins-Monro scale adaptation on/off.
    pub bw_update: bool,
    /// Reset proposal scales to their initial value when the phase begins.
    pub bw_reset: bool,
    /// Feed post-step phi into the running covariance.
    pub cov_recalc: bool,
}

/// The default schedule: a univariate phase to find workable per-parameter
/// scales, then a correlated block phase that learns the empirical
/// covariance.
pub fn default_burnin(iterations: usize) -> Vec<PhaseConfig> {
    let first = iterations / 2;
    vec![
        PhaseConfig {
            iterations: first.max(1),
            method: ProposalMethod::Univariate,
            bw_update: true,
            bw_reset: true,
            cov_recalc: false,
        },
        PhaseConfig {
            iterations: (iterations - first).max(1),
            method: ProposalMethod::BlockCorrelated,
            bw_update: true,
            bw_reset: false,
            cov_recalc: true,
        },
    ]
}

/// Everything a single chain needs to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Ordered observations, shared read-only by every rung.
    pub data: Vec<f64>,
    pub params: Vec<Param>,
    pub burnin: Vec<PhaseConfig>,
    pub samples: usize,
    /// Number of temperature rungs; 1 disables coupling.
    pub rungs: usize,
    pub coupling_on: bool,
    /// Concentration exponent of the ladder, beta_r = ((r-1)/(R-1))^p.
    pub gti_pow: f64,
    /// Explicit inverse temperatures, overriding the `gti_pow` ladder. Must
    /// hold `rungs` non-decreasing values in [0, 1], the last being 1.
    pub beta_manual: Option<Vec<f64>>,
    /// Chain identifier, folded into the seed streams.
    pub chain: u32,
    /// Run seed; `None` draws one at build time (echoed in the output).
    pub seed: Option<u64>,
    /// Record every rung instead of only the cold one.
    pub record_hot_rungs: bool,
}

impl Config {
    pub fn new(data: Vec<f64>, params: Vec<Param>) -> Self {
        Self {
            data,
            params,
            burnin: default_burnin(1_000),
            samples: 10_000,
            rungs: 1,
            coupling_on: true,
            gti_pow: 1.0,
            beta_manual: None,
            chain: 0,
            seed: None,
            record_hot_rungs: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.params.is_empty() {
            return Err(ConfigError::NoParams);
        }
        for p in &self.params {
            // NaN bounds fail both comparisons below.
            if !(p.min < p.max) {
                return Err(ConfigError::BadBounds {
                    name: p.name.clone(),
                    min: p.min,
                    max: p.max,
                });
            }
            if !(p.init.is_finite() && p.init > p.min && p.init < p.max) {
                return Err(ConfigError::InitOutOfBounds {
                    name: p.name.clone(),
                    init: p.init,
                    min: p.min,
                    max: p.max,
                });
            }
        }
        if let Some(i) = self.data.iter().position(|x| !x.is_finite()) {
            return Err(ConfigError::BadData(i));
        }
        if self.burnin.is_empty() {
            return Err(ConfigError::EmptyBurnin);
        }
        if let Some(i) = self.burnin.iter().position(|ph| ph.iterations == 0) {
            return Err(ConfigError::EmptyPhase(i));
        }
        if self.samples == 0 {
            return Err(ConfigError::NoSamples);
        }
        if self.rungs == 0 {
            return Err(ConfigError::NoRungs);
        }
        if !(self.gti_pow >= 1.0) {
            return Err(ConfigError::BadGtiPow(self.gti_pow));
        }
        if let Some(betas) = &self.beta_manual {
            let well_formed = betas.len() == self.rungs
                && betas.iter().all(|b| (0.0..=1.0).contains(b))
                && betas.windows(2).all(|w| w[0] <= w[1])
                && betas.last() == Some(&1.0);
            if !well_formed {
                return Err(ConfigError::BadLadder { rungs: self.rungs });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config::new(vec![1.0, 2.0], vec![Param::new("mu", -1.0, 1.0, 0.0)])
    }

    #[test]
    fn valid_config_passes() {
        assert_eq!(base().validate(), Ok(()));
    }

    #[test]
    fn inverted_bounds_rejected() {
        let cfg = Config::new(vec![], vec![Param::new("mu", 5.0, 3.0, 4.0)]);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::BadBounds { .. })
        ));
    }

    #[test]
    fn init_on_boundary_rejected() {
        let cfg = Config::new(vec![], vec![Param::new("mu", -1.0, 1.0, 1.0)]);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InitOutOfBounds { .. })
        ));
    }

    #[test]
    fn nan_pieces_rejected() {
        let mut cfg = base();
        cfg.data.push(f64::NAN);
        assert_eq!(cfg.validate(), Err(ConfigError::BadData(2)));

        let cfg = Config::new(vec![], vec![Param::new("mu", f64::NAN, 1.0, 0.0)]);
        assert!(matches!(cfg.validate(), Err(ConfigError::BadBounds { .. })));

        let mut cfg = base();
        cfg.gti_pow = f64::NAN;
        assert!(matches!(cfg.validate(), Err(ConfigError::BadGtiPow(_))));
    }

    #[test]
    fn zero_counts_rejected() {
        let mut cfg = base();
        cfg.samples = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::NoSamples));

        let mut cfg = base();
        cfg.rungs = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::NoRungs));

        let mut cfg = base();
        cfg.burnin.clear();
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyBurnin));

        let mut cfg = base();
        cfg.burnin[1].iterations = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::EmptyPhase(1)));
    }

    #[test]
    fn manual_ladder_must_be_well_formed() {
        let mut cfg = base();
        cfg.rungs = 3;
        cfg.beta_manual = Some(vec![0.0, 0.5, 1.0]);
        assert_eq!(cfg.validate(), Ok(()));

        cfg.beta_manual = Some(vec![1.0, 1.0, 1.0]);
        assert_eq!(cfg.validate(), Ok(()));

        cfg.beta_manual = Some(vec![0.0, 1.0]);
        assert!(matches!(cfg.validate(), Err(ConfigError::BadLadder { .. })));

        cfg.beta_manual = Some(vec![0.5, 0.4, 1.0]);
        assert!(matches!(cfg.validate(), Err(ConfigError::BadLadder { .. })));

        cfg.beta_manual = Some(vec![0.0, 0.5, 0.9]);
        assert!(matches!(cfg.validate(), Err(ConfigError::BadLadder { .. })));
    }

    #[test]
    fn default_burnin_splits_iterations() {
        let phases = default_burnin(1_000);
        assert_eq!(phases.len(), 2);
        assert_eq!(phases.iter().map(|p| p.iterations).sum::<usize>(), 1_000);
        assert!(phases[0].bw_reset);
        assert!(phases[1].cov_recalc);
    }
}
