//! The sampler driver: owns the rung ensemble, walks the burn-in phase table
//! and the sampling phase, couples adjacent rungs by swap attempts, and
//! records the trace.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::config::{Config, ConfigError};
use crate::model::BayesModel;
use crate::particle::Particle;
use crate::proposal::ProposalMethod;
use crate::rng::{self, DrawRng};
use crate::stats;
use crate::system::System;
use crate::trace::{Diagnostics, Output, PairAcceptance, Phase, Trace, TraceRecord};

/// Cooperative cancellation flag, checked at every iteration boundary.
/// Cancelling returns the partial trace as a normal [`Output`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Default, Clone, Copy)]
struct PairCounter {
    accepted: u64,
    attempted: u64,
}

/// A single Metropolis-coupled chain: R tempered particles advancing in
/// lockstep, exchanging state between adjacent rungs.
///
/// ```rust
/// use mc3::config::{Config, Param};
/// use mc3::model::NormalMean;
/// use mc3::sampler::Sampler;
///
/// let mut config = Config::new(vec![2.9, 3.2, 3.1], vec![Param::new("mu", -10.0, 10.0, 0.0)]);
/// config.samples = 200;
/// config.seed = Some(1);
/// let mut sampler = Sampler::new(config, NormalMean { sd: 1.0 }).unwrap();
/// let output = sampler.run();
/// assert_eq!(output.posterior(0).len(), 200);
/// ```
pub struct Sampler<M> {
    system: System,
    model: M,
    particles: Vec<Particle>,
    swap_rng: DrawRng,
    cancel: CancelToken,
    config: Config,
}

impl<M: BayesModel + Sync> Sampler<M> {
    /// Validates the configuration and builds the ensemble. Every rung gets
    /// its own PRNG sub-stream so parallel updates stay reproducible.
    pub fn new(config: Config, model: M) -> Result<Self, ConfigError> {
        let system = System::new(&config)?;
        let mut particles = Vec::with_capacity(system.rungs());
        for (rung, &beta) in system.betas().iter().enumerate() {
            let seed = rng::stream_seed(system.seed(), system.chain(), rung);
            let particle = Particle::new(&system, &model, beta, seed)
                .ok_or(ConfigError::NonFiniteInit)?;
            particles.push(particle);
        }
        let swap_rng = DrawRng::seed_from_u64(rng::swap_seed(system.seed(), system.chain()));
        // Echo the resolved seed so the run can be reproduced from the output.
        let mut config = config;
        config.seed = Some(system.seed());
        Ok(Self {
            system,
            model,
            particles,
            swap_rng,
            cancel: CancelToken::new(),
            config,
        })
    }

    /// A handle the host can use to stop the run at the next iteration
    /// boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    /// Runs burn-in and sampling to completion (or cancellation).
    pub fn run(&mut self) -> Output {
        self.run_inner(None)
    }

    /// Like [`Sampler::run`], with a progress bar and a live acceptance-rate
    /// readout.
    pub fn run_progress(&mut self) -> Output {
        let burnin: usize = self.system.phases().iter().map(|p| p.iterations).sum();
        let pb = ProgressBar::new((burnin + self.system.samples()) as u64);
        let style = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("##-");
        pb.set_style(style);
        pb.set_prefix(format!("Chain {}", self.system.chain()));
        let output = self.run_inner(Some(&pb));
        pb.finish_with_message("Done!");
        output
    }

    fn run_inner(&mut self, pb: Option<&ProgressBar>) -> Output {
        const UPDATE_INTERVAL: Duration = Duration::from_millis(500);

        let pairs = self.system.rungs().saturating_sub(1);
        let mut swap_burnin = vec![PairCounter::default(); pairs];
        let mut swap_sampling = vec![PairCounter::default(); pairs];
        let mut trace = Trace::new(self.system.names().to_vec());

        let mut iteration = 0usize;
        let mut last_update = Instant::now();
        let mut cancelled = false;

        let phases = self.system.phases().to_vec();
        let mut cov_was_live = false;
        for phase in &phases {
            if phase.bw_reset {
                for p in &mut self.particles {
                    p.proposal.reset_scales();
                }
            }
            if phase.cov_recalc && !cov_was_live {
                for p in &mut self.particles {
                    p.proposal.reset_cov();
                }
            }
            cov_was_live = phase.cov_recalc;

            for _ in 0..phase.iterations {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                self.iterate(
                    Phase::Burnin,
                    iteration,
                    phase.method,
                    phase.bw_update,
                    phase.cov_recalc,
                    &mut trace,
                    &mut swap_burnin,
                );
                iteration += 1;
                self.tick_progress(pb, &mut last_update, UPDATE_INTERVAL);
            }
            if cancelled {
                break;
            }
        }

        // The sampling phase keeps the last burn-in method with every
        // adaptation switch off.
        let method = phases
            .last()
            .map(|p| p.method)
            .unwrap_or(ProposalMethod::Univariate);
        if !cancelled {
            for _ in 0..self.system.samples() {
                if self.cancel.is_cancelled() {
                    break;
                }
                self.iterate(
                    Phase::Sampling,
                    iteration,
                    method,
                    false,
                    false,
                    &mut trace,
                    &mut swap_sampling,
                );
                iteration += 1;
                self.tick_progress(pb, &mut last_update, UPDATE_INTERVAL);
            }
        }

        self.finish(trace, &swap_burnin, &swap_sampling)
    }

    /// One full iteration: advance every particle, couple, record.
    fn iterate(
        &mut self,
        phase: Phase,
        iteration: usize,
        method: ProposalMethod,
        adapt: bool,
        record_cov: bool,
        trace: &mut Trace,
        swap: &mut [PairCounter],
    ) {
        let system = &self.system;
        let model = &self.model;
        // Rung updates are mutually independent; each particle owns its RNG
        // stream, so the parallel fan-out is still deterministic.
        self.particles
            .par_iter_mut()
            .for_each(|p| p.sweep(system, model, method, adapt, record_cov));

        if self.system.coupling_on() {
            self.swap_sweep(swap);
        }

        if self.system.record_hot_rungs() {
            for (rung, p) in self.particles.iter().enumerate() {
                trace.push(Self::record(p, phase, iteration, rung));
            }
        } else {
            let rung = self.system.cold_rung();
            trace.push(Self::record(&self.particles[rung], phase, iteration, rung));
        }
    }

    /// One swap attempt per adjacent pair, cold end first. Only the state
    /// moves between rungs; beta and the proposal adaptation stay put.
    fn swap_sweep(&mut self, swap: &mut [PairCounter]) {
        for upper in (1..self.particles.len()).rev() {
            let lower = upper - 1;
            let log_ratio = (self.particles[upper].beta - self.particles[lower].beta)
                * (self.particles[lower].loglike - self.particles[upper].loglike);
            swap[lower].attempted += 1;
            if self.swap_rng.log_uniform() < log_ratio {
                swap[lower].accepted += 1;
                let (head, tail) = self.particles.split_at_mut(upper);
                let lo = &mut head[lower];
                let hi = &mut tail[0];
                std::mem::swap(&mut lo.theta, &mut hi.theta);
                std::mem::swap(&mut lo.phi, &mut hi.phi);
                std::mem::swap(&mut lo.loglike, &mut hi.loglike);
                std::mem::swap(&mut lo.logprior, &mut hi.logprior);
            }
        }
    }

    fn record(p: &Particle, phase: Phase, iteration: usize, rung: usize) -> TraceRecord {
        TraceRecord {
            phase,
            iteration,
            rung,
            theta: p.theta.clone(),
            logprior: p.logprior,
            loglikelihood: p.loglike,
        }
    }

    fn tick_progress(&self, pb: Option<&ProgressBar>, last: &mut Instant, every: Duration) {
        if let Some(pb) = pb {
            pb.inc(1);
            if last.elapsed() >= every {
                let cold = &self.particles[self.system.cold_rung()];
                pb.set_message(format!(
                    "AcceptRate={:.3}",
                    cold.proposal.overall_acceptance()
                ));
                *last = Instant::now();
            }
        }
    }

    fn finish(&self, trace: Trace, swap_burnin: &[PairCounter], swap_sampling: &[PairCounter]) -> Output {
        let cold = self.system.cold_rung();
        let ess = (0..self.system.d())
            .map(|j| stats::ess(&trace.param_draws(cold, Phase::Sampling, j)))
            .collect();
        let pairs = |counters: &[PairCounter]| {
            counters
                .iter()
                .enumerate()
                .map(|(i, c)| PairAcceptance {
                    lower: i,
                    upper: i + 1,
                    accepted: c.accepted,
                    attempted: c.attempted,
                })
                .collect()
        };
        let diagnostics = Diagnostics {
            beta: self.system.betas().to_vec(),
            accept: self
                .particles
                .iter()
                .map(|p| p.proposal.acceptance())
                .collect(),
            block_accept: self
                .particles
                .iter()
                .map(|p| p.proposal.block_acceptance())
                .collect(),
            swap_burnin: pairs(swap_burnin),
            swap_sampling: pairs(swap_sampling),
            ess,
        };
        Output {
            trace,
            diagnostics,
            config: self.config.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Param;
    use crate::model::NormalMean;

    fn small_config(rungs: usize) -> Config {
        let mut cfg = Config::new(
            vec![2.8, 3.1, 3.3, 2.9],
            vec![Param::new("mu", -10.0, 10.0, 0.0)],
        );
        cfg.burnin = crate::config::default_burnin(200);
        cfg.samples = 100;
        cfg.rungs = rungs;
        cfg.gti_pow = 2.0;
        cfg.seed = Some(1234);
        cfg
    }

    #[test]
    fn swap_moves_state_but_not_beta() {
        let mut sampler = Sampler::new(small_config(4), NormalMean { sd: 1.0 }).unwrap();
        let betas_before: Vec<f64> = sampler.particles.iter().map(|p| p.beta).collect();
        let output = sampler.run();
        let betas_after: Vec<f64> = sampler.particles.iter().map(|p| p.beta).collect();
        assert_eq!(betas_before, betas_after);
        assert!(betas_after.windows(2).all(|w| w[0] < w[1]));
        // Coupling actually happened.
        let attempted: u64 = output
            .diagnostics
            .swap_sampling
            .iter()
            .map(|p| p.attempted)
            .sum();
        assert_eq!(attempted, 3 * 100);
    }

    #[test]
    fn coupling_off_means_no_attempts() {
        let mut cfg = small_config(4);
        cfg.coupling_on = false;
        let mut sampler = Sampler::new(cfg, NormalMean { sd: 1.0 }).unwrap();
        let output = sampler.run();
        assert!(output
            .diagnostics
            .swap_sampling
            .iter()
            .all(|p| p.attempted == 0));
    }

    #[test]
    fn single_rung_has_no_pairs() {
        let mut sampler = Sampler::new(small_config(1), NormalMean { sd: 1.0 }).unwrap();
        let output = sampler.run();
        assert!(output.diagnostics.swap_sampling.is_empty());
        assert_eq!(output.diagnostics.beta, vec![1.0]);
        assert_eq!(output.posterior(0).len(), 100);
    }

    #[test]
    fn trace_is_ordered_and_clean() {
        let mut cfg = small_config(3);
        cfg.record_hot_rungs = true;
        let mut sampler = Sampler::new(cfg, NormalMean { sd: 1.0 }).unwrap();
        let output = sampler.run();
        // 300 iterations x 3 rungs.
        assert_eq!(output.trace.len(), 300 * 3);
        let mut last = (0usize, 0usize);
        for r in output.trace.records() {
            let key = (r.iteration, r.rung);
            assert!(key >= last, "records out of order: {key:?} after {last:?}");
            last = key;
            assert!(r.theta.iter().all(|t| t.is_finite()));
            assert!(r.logprior.is_finite());
            assert!(r.loglikelihood.is_finite());
        }
    }

    #[test]
    fn identical_seeds_reproduce_traces() {
        let run = || {
            let mut sampler = Sampler::new(small_config(3), NormalMean { sd: 1.0 }).unwrap();
            sampler.run()
        };
        let (a, b) = (run(), run());
        assert_eq!(a.trace.records(), b.trace.records());
    }

    #[test]
    fn cancelled_run_returns_partial_output() {
        let mut sampler = Sampler::new(small_config(2), NormalMean { sd: 1.0 }).unwrap();
        sampler.cancel_token().cancel();
        let output = sampler.run();
        assert!(output.trace.is_empty());
        assert_eq!(output.config.seed, Some(1234));
    }

    #[test]
    fn non_finite_initial_density_is_a_config_error() {
        let model = crate::model::FnModel::new(
            |_: &[f64], _: &[f64]| f64::NEG_INFINITY,
            |_: &[f64]| 0.0,
        );
        let err = Sampler::new(small_config(1), model).err();
        assert_eq!(err, Some(ConfigError::NonFiniteInit));
    }
}
