//! Reparameterisation between the natural space theta and the unconstrained
//! working space phi.
//!
//! Each parameter is classified by its bound configuration; the Metropolis
//! sweep runs entirely in phi, so an accept test between two natural-space
//! points needs the log-Jacobian adjustment returned by
//! [`Transform::log_adjustment`].

use thiserror::Error;

/// The transform was applied to a value outside its domain. This means the
/// host handed us an invalid parameter vector; it is fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("parameter {index} = {value} lies outside its support ({min}, {max})")]
    OutOfSupport {
        index: usize,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Bound-derived reparameterisation for a single parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    /// (-inf, inf): phi = theta.
    Identity,
    /// (-inf, max): phi = log(max - theta).
    UpperBounded { max: f64 },
    /// (min, inf): phi = log(theta - min).
    LowerBounded { min: f64 },
    /// (min, max): phi = log(theta - min) - log(max - theta).
    DoublyBounded { min: f64, max: f64 },
}

impl Transform {
    /// Classifies a parameter by which of its bounds are finite.
    pub fn from_bounds(min: f64, max: f64) -> Self {
        match (min.is_finite(), max.is_finite()) {
            (false, false) => Transform::Identity,
            (false, true) => Transform::UpperBounded { max },
            (true, false) => Transform::LowerBounded { min },
            (true, true) => Transform::DoublyBounded { min, max },
        }
    }

    /// The open support of the parameter in natural space.
    pub fn support(&self) -> (f64, f64) {
        match *self {
            Transform::Identity => (f64::NEG_INFINITY, f64::INFINITY),
            Transform::UpperBounded { max } => (f64::NEG_INFINITY, max),
            Transform::LowerBounded { min } => (min, f64::INFINITY),
            Transform::DoublyBounded { min, max } => (min, max),
        }
    }

    /// Whether theta lies strictly inside the support.
    pub fn contains(&self, theta: f64) -> bool {
        let (min, max) = self.support();
        theta.is_finite() && theta > min && theta < max
    }

    /// Natural space to working space. Fails if theta is outside the support.
    pub fn to_phi(&self, index: usize, theta: f64) -> Result<f64, DomainError> {
        if !self.contains(theta) {
            let (min, max) = self.support();
            return Err(DomainError::OutOfSupport {
                index,
                value: theta,
                min,
                max,
            });
        }
        Ok(match *self {
            Transform::Identity => theta,
            Transform::UpperBounded { max } => (max - theta).ln(),
            Transform::LowerBounded { min } => (theta - min).ln(),
            Transform::DoublyBounded { min, max } => (theta - min).ln() - (max - theta).ln(),
        })
    }

    /// Working space back to natural space. Total on finite phi; the image is
    /// always inside the support.
    pub fn to_theta(&self, phi: f64) -> f64 {
        match *self {
            Transform::Identity => phi,
            Transform::UpperBounded { max } => max - phi.exp(),
            Transform::LowerBounded { min } => min + phi.exp(),
            Transform::DoublyBounded { min, max } => {
                // Evaluate with the decaying exponential so neither branch
                // overflows for large |phi|.
                if phi > 0.0 {
                    let e = (-phi).exp();
                    (max + min * e) / (1.0 + e)
                } else {
                    let e = phi.exp();
                    (max * e + min) / (1.0 + e)
                }
            }
        }
    }

    /// Log-Jacobian adjustment term for an accept test moving this parameter
    /// from `theta` to `theta_prop`: log|dtheta'/dphi'| - log|dtheta/dphi|.
    pub fn log_adjustment(&self, theta: f64, theta_prop: f64) -> f64 {
        match *self {
            Transform::Identity => 0.0,
            Transform::UpperBounded { max } => (max - theta_prop).ln() - (max - theta).ln(),
            Transform::LowerBounded { min } => (theta_prop - min).ln() - (theta - min).ln(),
            Transform::DoublyBounded { min, max } => {
                (max - theta_prop).ln() + (theta_prop - min).ln()
                    - (max - theta).ln()
                    - (theta - min).ln()
            }
        }
    }
}

/// Vector form of [`Transform::to_phi`].
pub fn to_phi(transforms: &[Transform], theta: &[f64]) -> Result<Vec<f64>, DomainError> {
    transforms
        .iter()
        .zip(theta)
        .enumerate()
        .map(|(i, (t, &th))| t.to_phi(i, th))
        .collect()
}

/// Vector form of [`Transform::to_theta`].
pub fn to_theta(transforms: &[Transform], phi: &[f64]) -> Vec<f64> {
    transforms
        .iter()
        .zip(phi)
        .map(|(t, &p)| t.to_theta(p))
        .collect()
}

/// Summed log-Jacobian adjustment for a block move.
pub fn log_adjustment(transforms: &[Transform], theta: &[f64], theta_prop: &[f64]) -> f64 {
    transforms
        .iter()
        .zip(theta.iter().zip(theta_prop))
        .map(|(t, (&th, &tp))| t.log_adjustment(th, tp))
        .sum()
}
