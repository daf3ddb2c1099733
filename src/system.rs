//! The validated, immutable snapshot of a run: data, parameter descriptors,
//! transforms, the temperature ladder and the phase table. Every particle
//! reads it through a shared reference; nothing here mutates after
//! construction.

use rand::{thread_rng, Rng};

use crate::config::{Config, ConfigError, PhaseConfig};
use crate::transform::{self, Transform};

/// Inverse temperatures for `rungs` rungs, index 0 the prior rung (beta = 0)
/// and the last index the cold rung (beta = 1). A single rung is the cold
/// rung. Larger `gti_pow` concentrates rungs near the prior.
pub fn temperature_ladder(rungs: usize, gti_pow: f64) -> Vec<f64> {
    if rungs == 1 {
        return vec![1.0];
    }
    (0..rungs)
        .map(|r| (r as f64 / (rungs - 1) as f64).powf(gti_pow))
        .collect()
}

#[derive(Debug, Clone)]
pub struct System {
    data: Vec<f64>,
    names: Vec<String>,
    theta_init: Vec<f64>,
    phi_init: Vec<f64>,
    transforms: Vec<Transform>,
    phases: Vec<PhaseConfig>,
    samples: usize,
    betas: Vec<f64>,
    coupling_on: bool,
    chain: u32,
    seed: u64,
    record_hot_rungs: bool,
}

impl System {
    /// Validates `config` and freezes the derived state. The seed, if absent,
    /// is drawn here so the run can still be reproduced from the output.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let names = config.params.iter().map(|p| p.name.clone()).collect();
        let theta_init: Vec<f64> = config.params.iter().map(|p| p.init).collect();
        let transforms: Vec<Transform> = config
            .params
            .iter()
            .map(|p| Transform::from_bounds(p.min, p.max))
            .collect();
        // Validation already pinned the initial value strictly inside the
        // bounds, so the transform cannot fail here.
        let phi_init = transform::to_phi(&transforms, &theta_init)
            .map_err(|_| ConfigError::NonFiniteInit)?;

        Ok(Self {
            data: config.data.clone(),
            names,
            theta_init,
            phi_init,
            transforms,
            phases: config.burnin.clone(),
            samples: config.samples,
            betas: config
                .beta_manual
                .clone()
                .unwrap_or_else(|| temperature_ladder(config.rungs, config.gti_pow)),
            coupling_on: config.coupling_on,
            chain: config.chain,
            seed: config.seed.unwrap_or_else(|| thread_rng().gen()),
            record_hot_rungs: config.record_hot_rungs,
        })
    }

    pub fn d(&self) -> usize {
        self.theta_init.len()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn theta_init(&self) -> &[f64] {
        &self.theta_init
    }

    pub fn phi_init(&self) -> &[f64] {
        &self.phi_init
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn phases(&self) -> &[PhaseConfig] {
        &self.phases
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn betas(&self) -> &[f64] {
        &self.betas
    }

    pub fn rungs(&self) -> usize {
        self.betas.len()
    }

    /// Index of the beta = 1 rung.
    pub fn cold_rung(&self) -> usize {
        self.betas.len() - 1
    }

    pub fn coupling_on(&self) -> bool {
        self.coupling_on && self.betas.len() > 1
    }

    pub fn chain(&self) -> u32 {
        self.chain
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn record_hot_rungs(&self) -> bool {
        self.record_hot_rungs
    }
}
