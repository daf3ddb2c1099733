//! Per-iteration trace records and the output object a run hands back.

use crate::config::Config;

/// Which stage of the run a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Burnin,
    Sampling,
}

/// State of one recorded rung at one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub phase: Phase,
    /// Global iteration index, counted across burn-in and sampling.
    pub iteration: usize,
    pub rung: usize,
    pub theta: Vec<f64>,
    pub logprior: f64,
    pub loglikelihood: f64,
}

/// Append-only sequence of records, iteration order outermost and rung order
/// within an iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    names: Vec<String>,
    records: Vec<TraceRecord>,
}

impl Trace {
    pub(crate) fn new(names: Vec<String>) -> Self {
        Self {
            names,
            records: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, record: TraceRecord) {
        self.records.push(record);
    }

    /// Parameter names, in theta order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The draws of one parameter on one rung during one phase, in iteration
    /// order.
    pub fn param_draws(&self, rung: usize, phase: Phase, param: usize) -> Vec<f64> {
        self.records
            .iter()
            .filter(|r| r.rung == rung && r.phase == phase)
            .map(|r| r.theta[param])
            .collect()
    }
}

/// Accept/attempt tally for one adjacent rung pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairAcceptance {
    /// Rung below (closer to the prior).
    pub lower: usize,
    /// Rung above.
    pub upper: usize,
    pub accepted: u64,
    pub attempted: u64,
}

impl PairAcceptance {
    pub fn rate(&self) -> f64 {
        if self.attempted == 0 {
            f64::NAN
        } else {
            self.accepted as f64 / self.attempted as f64
        }
    }
}

/// Convergence and coupling summaries computed at the end of a run.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    /// Inverse temperature of each rung, prior rung first.
    pub beta: Vec<f64>,
    /// Per-rung, per-coordinate Metropolis acceptance (univariate attempts).
    pub accept: Vec<Vec<f64>>,
    /// Per-rung block acceptance, NaN when no block attempts were made.
    pub block_accept: Vec<f64>,
    /// Adjacent-pair swap acceptance during burn-in.
    pub swap_burnin: Vec<PairAcceptance>,
    /// Adjacent-pair swap acceptance during sampling.
    pub swap_sampling: Vec<PairAcceptance>,
    /// Effective sample size per parameter, from the cold sampling draws.
    pub ess: Vec<f64>,
}

/// Everything a finished (or cancelled) run returns.
#[derive(Debug, Clone)]
pub struct Output {
    pub trace: Trace,
    pub diagnostics: Diagnostics,
    /// The configuration that produced this run, with the seed filled in.
    pub config: Config,
}

impl Output {
    /// Cold-rung sampling draws of one parameter: the posterior sample.
    pub fn posterior(&self, param: usize) -> Vec<f64> {
        self.trace
            .param_draws(self.config.rungs - 1, Phase::Sampling, param)
    }
}
