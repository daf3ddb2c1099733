//! One tempered chain: the current state in both spaces, its cached
//! log-densities, and the Metropolis sweep that advances it.

use crate::model::BayesModel;
use crate::proposal::{Proposal, ProposalMethod};
use crate::rng::DrawRng;
use crate::system::System;
use crate::transform;

/// A single rung of the ensemble at inverse temperature `beta`.
///
/// Invariant after every sweep and every swap: `phi = T(theta)`,
/// `loglike = loglike(theta)`, `logprior = logprior(theta)`, all finite.
#[derive(Debug, Clone)]
pub struct Particle {
    pub beta: f64,
    pub theta: Vec<f64>,
    pub phi: Vec<f64>,
    pub loglike: f64,
    pub logprior: f64,
    pub proposal: Proposal,
    rng: DrawRng,
}

impl Particle {
    /// A particle at the shared initial state. Densities are cached here;
    /// a non-finite initial density is reported so the caller can refuse the
    /// configuration before iterating.
    pub fn new<M: BayesModel>(system: &System, model: &M, beta: f64, seed: u64) -> Option<Self> {
        let theta = system.theta_init().to_vec();
        let phi = system.phi_init().to_vec();
        let loglike = model.log_likelihood(&theta, system.data());
        let logprior = model.log_prior(&theta);
        if !(loglike.is_finite() && logprior.is_finite()) {
            return None;
        }
        Some(Self {
            beta,
            theta,
            phi,
            loglike,
            logprior,
            proposal: Proposal::new(system.d()),
            rng: DrawRng::seed_from_u64(seed),
        })
    }

    /// Advances the chain by one Metropolis sweep under `method`.
    ///
    /// `adapt` enables Robbins-Monro scale updates; `record_cov` feeds the
    /// post-sweep phi into the running covariance. Both are burn-in only.
    pub fn sweep<M: BayesModel>(
        &mut self,
        system: &System,
        model: &M,
        method: ProposalMethod,
        adapt: bool,
        record_cov: bool,
    ) {
        match method {
            ProposalMethod::Univariate => self.sweep_univariate(system, model, adapt),
            ProposalMethod::BlockIsotropic | ProposalMethod::BlockCorrelated => {
                self.sweep_block(system, model, method, adapt)
            }
        }
        if record_cov {
            self.proposal.record_cov(&self.phi);
        }
    }

    fn sweep_univariate<M: BayesModel>(&mut self, system: &System, model: &M, adapt: bool) {
        for i in 0..system.d() {
            let phi_prop = self.proposal.propose_coord(i, self.phi[i], &mut self.rng);
            let theta_i = system.transforms()[i].to_theta(phi_prop);

            let accepted = if theta_i.is_finite() {
                let mut theta_prop = self.theta.clone();
                theta_prop[i] = theta_i;
                let adj = system.transforms()[i].log_adjustment(self.theta[i], theta_i);
                self.try_accept(system, model, &theta_prop, adj)
            } else {
                false
            };
            if accepted {
                self.phi[i] = phi_prop;
                self.theta[i] = theta_i;
            }
            self.proposal.observe_coord(i, accepted, adapt);
        }
    }

    fn sweep_block<M: BayesModel>(
        &mut self,
        system: &System,
        model: &M,
        method: ProposalMethod,
        adapt: bool,
    ) {
        let phi_prop = self
            .proposal
            .propose_block(method, &self.phi, &mut self.rng);
        let theta_prop = transform::to_theta(system.transforms(), &phi_prop);

        let accepted = if theta_prop.iter().all(|t| t.is_finite()) {
            let adj = transform::log_adjustment(system.transforms(), &self.theta, &theta_prop);
            self.try_accept(system, model, &theta_prop, adj)
        } else {
            false
        };
        if accepted {
            self.phi = phi_prop;
            self.theta = theta_prop;
        }
        self.proposal.observe_block(accepted, adapt);
    }

    /// Runs the tempered accept test for `theta_prop`; on accept the cached
    /// densities move to the candidate and the caller installs theta/phi.
    /// Non-finite candidate densities reject without touching any state.
    fn try_accept<M: BayesModel>(
        &mut self,
        system: &System,
        model: &M,
        theta_prop: &[f64],
        adjustment: f64,
    ) -> bool {
        let loglike_prop = model.log_likelihood(theta_prop, system.data());
        let logprior_prop = model.log_prior(theta_prop);
        if !(loglike_prop.is_finite() && logprior_prop.is_finite()) {
            return false;
        }

        // At the prior rung the likelihood factor drops out; skipping the
        // product keeps 0 * inf from producing NaN.
        let like_term = if self.beta > 0.0 {
            self.beta * (loglike_prop - self.loglike)
        } else {
            0.0
        };
        let log_ratio = like_term + (logprior_prop - self.logprior) + adjustment;

        if self.rng.log_uniform() < log_ratio {
            self.loglike = loglike_prop;
            self.logprior = logprior_prop;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Param};
    use crate::model::FnModel;
    use crate::rng;
    use crate::system::System;

    fn gaussian_system(rungs: usize) -> System {
        let mut cfg = Config::new(
            vec![0.3, -0.1, 0.4],
            vec![
                Param::unbounded("mu", 0.0),
                Param::lower("sigma", 0.0, 1.0),
            ],
        );
        cfg.rungs = rungs;
        cfg.seed = Some(99);
        System::new(&cfg).unwrap()
    }

    fn gaussian_model() -> impl BayesModel {
        FnModel::new(
            |theta: &[f64], data: &[f64]| {
                let (mu, sigma) = (theta[0], theta[1]);
                data.iter()
                    .map(|x| {
                        let z = (x - mu) / sigma;
                        -sigma.ln() - 0.5 * z * z
                    })
                    .sum()
            },
            |theta: &[f64]| -0.5 * theta[0] * theta[0] - theta[1],
        )
    }

    fn check_invariants<M: BayesModel>(p: &Particle, system: &System, model: &M) {
        let phi = transform::to_phi(system.transforms(), &p.theta).unwrap();
        for (a, b) in phi.iter().zip(&p.phi) {
            assert!((a - b).abs() < 1e-9, "phi out of sync: {a} vs {b}");
        }
        let ll = model.log_likelihood(&p.theta, system.data());
        let lp = model.log_prior(&p.theta);
        assert!((ll - p.loglike).abs() < 1e-9);
        assert!((lp - p.logprior).abs() < 1e-9);
        assert!(p.loglike.is_finite() && p.logprior.is_finite());
    }

    #[test]
    fn caches_stay_consistent_through_sweeps() {
        let system = gaussian_system(1);
        let model = gaussian_model();
        let mut p = Particle::new(&system, &model, 1.0, 7).unwrap();
        for step in 0..200 {
            let method = match step % 3 {
                0 => ProposalMethod::Univariate,
                1 => ProposalMethod::BlockIsotropic,
                _ => ProposalMethod::BlockCorrelated,
            };
            p.sweep(&system, &model, method, true, true);
            check_invariants(&p, &system, &model);
            // sigma is lower bounded at zero and must stay there.
            assert!(p.theta[1] > 0.0);
        }
    }

    #[test]
    fn non_finite_candidate_density_rejects_without_state_change() {
        let system = gaussian_system(1);
        // Likelihood that rejects everything but the initial point.
        let init = system.theta_init().to_vec();
        let model = FnModel::new(
            move |theta: &[f64], _: &[f64]| {
                if (theta[0] - init[0]).abs() < 1e-12 {
                    0.0
                } else {
                    f64::NEG_INFINITY
                }
            },
            |_: &[f64]| 0.0,
        );
        let mut p = Particle::new(&system, &model, 1.0, 3).unwrap();
        let before = p.clone();
        for _ in 0..50 {
            p.sweep(&system, &model, ProposalMethod::Univariate, false, false);
        }
        // mu can never move; sigma may, so compare only the blocked coordinate.
        assert_eq!(p.theta[0], before.theta[0]);
        assert_eq!(p.phi[0], before.phi[0]);
        assert!(p.loglike.is_finite());
    }

    #[test]
    fn prior_rung_ignores_likelihood() {
        let system = gaussian_system(2);
        // A likelihood with a violent gradient; at beta = 0 it must not
        // influence acceptance, so the chain still moves freely.
        let model = FnModel::new(
            |theta: &[f64], _: &[f64]| -1e6 * theta[0] * theta[0],
            |_: &[f64]| 0.0,
        );
        let seed = rng::stream_seed(system.seed(), 0, 0);
        let mut p = Particle::new(&system, &model, 0.0, seed).unwrap();
        let mut moved = 0;
        let mut last = p.theta[0];
        for _ in 0..200 {
            p.sweep(&system, &model, ProposalMethod::Univariate, true, false);
            if p.theta[0] != last {
                moved += 1;
                last = p.theta[0];
            }
        }
        // Under the flat prior every proposal is accepted up to the Jacobian
        // term of sigma, so mu must move most of the time.
        assert!(moved > 150, "prior rung barely moved: {moved}/200");
    }

    #[test]
    fn deterministic_given_stream_seed() {
        let system = gaussian_system(1);
        let model = gaussian_model();
        let mut a = Particle::new(&system, &model, 1.0, 42).unwrap();
        let mut b = Particle::new(&system, &model, 1.0, 42).unwrap();
        for _ in 0..100 {
            a.sweep(&system, &model, ProposalMethod::Univariate, true, true);
            b.sweep(&system, &model, ProposalMethod::Univariate, true, true);
        }
        assert_eq!(a.theta, b.theta);
        assert_eq!(a.phi, b.phi);
        assert_eq!(a.loglike, b.loglike);
    }
}
