//! Distributional check of the cold rung against an exact sampler for the
//! conjugate normal-mean posterior, via a two-sample Kolmogorov-Smirnov test.

use std::cmp::Ordering;

use mc3::config::{default_burnin, Config, Param};
use mc3::model::NormalMean;
use mc3::rng::DrawRng;
use mc3::sampler::Sampler;

/// `f64` with a total order, so the KS test (which needs `Ord`) can sort the
/// samples.
#[derive(Debug, Copy, Clone, PartialEq)]
struct TotalF64(f64);

impl Eq for TotalF64 {}

impl PartialOrd for TotalF64 {
    fn partial_cmp(&self, other: &TotalF64) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF64 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[test]
fn cold_rung_matches_exact_posterior() {
    const N_DATA: usize = 100;
    const SAMPLES: usize = 10_000;
    const THIN: usize = 20;
    const SEED: u64 = 42;

    let mut rng = DrawRng::seed_from_u64(SEED);
    let data: Vec<f64> = (0..N_DATA).map(|_| 3.0 + rng.standard_normal()).collect();
    let data_mean = data.iter().sum::<f64>() / N_DATA as f64;

    let mut config = Config::new(data, vec![Param::new("mu", -10.0, 10.0, 0.0)]);
    config.burnin = default_burnin(2_000);
    config.samples = SAMPLES;
    config.rungs = 3;
    config.gti_pow = 2.0;
    config.seed = Some(SEED);

    let output = Sampler::new(config, NormalMean { sd: 1.0 }).unwrap().run();

    // Thin past the autocorrelation so the KS assumptions roughly hold.
    let mcmc: Vec<TotalF64> = output
        .posterior(0)
        .into_iter()
        .step_by(THIN)
        .map(TotalF64)
        .collect();

    // The flat prior is effectively unbounded here, so the exact posterior
    // is N(mean(x), 1/n).
    let posterior_sd = 1.0 / (N_DATA as f64).sqrt();
    let exact: Vec<TotalF64> = (0..mcmc.len())
        .map(|_| TotalF64(data_mean + posterior_sd * rng.standard_normal()))
        .collect();

    let result = kolmogorov_smirnov::test(&mcmc, &exact, 0.99);
    assert!(
        !result.is_rejected,
        "KS rejected: statistic {} with reject probability {}",
        result.statistic, result.reject_probability
    );
}
