//! Seedable random draws shared by all sampler components.
//!
//! Every rung of every chain owns its own [`DrawRng`], seeded through
//! [`stream_seed`] so that the streams are statistically independent and the
//! whole run is reproducible even when rung updates execute in parallel.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Floor applied to log-uniform draws. exp(-745) is the smallest positive
/// normal f64, so clamping here keeps -inf out of the Metropolis comparison.
pub const LOG_UNIFORM_FLOOR: f64 = -745.0;

/// Derives the seed for the sub-stream belonging to `(chain, rung)`.
///
/// A splitmix64 mix of the run seed and the stream index; unlike an additive
/// offset, nearby (chain, rung) pairs land on unrelated points of the seed
/// space.
pub fn stream_seed(seed: u64, chain: u32, rung: usize) -> u64 {
    let stream = ((chain as u64) << 32) | (rung as u64 + 1);
    splitmix64(seed ^ splitmix64(stream))
}

/// Seed for the driver-owned stream that decides swap acceptances.
pub fn swap_seed(seed: u64, chain: u32) -> u64 {
    splitmix64(seed ^ splitmix64((chain as u64) << 32))
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// A seeded source of the few draw shapes the sampler needs.
#[derive(Debug, Clone)]
pub struct DrawRng {
    rng: SmallRng,
}

impl DrawRng {
    pub fn seed_from_u64(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Uniform draw in [0, 1).
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen()
    }

    /// log(U) for U ~ Uniform(0,1), clamped at [`LOG_UNIFORM_FLOOR`].
    pub fn log_uniform(&mut self) -> f64 {
        self.uniform().ln().max(LOG_UNIFORM_FLOOR)
    }

    pub fn standard_normal(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }

    pub fn standard_normal_vec(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.standard_normal()).collect()
    }
}
