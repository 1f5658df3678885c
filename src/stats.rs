//! Running chain statistics and the convergence stop rule.
//!
//! The monitor accumulates, per parameter, the sums `Σx`, `Σx²`, and
//! `Σ(x · x_prev)` over all completed sweeps, where `x_prev` is the state
//! one full sweep earlier. From these it derives the mean, the standard
//! deviation, and the lag-1 autocorrelation, and decides whether the
//! standard error of the mean — inflated for serial correlation — has
//! reached the requested per-parameter accuracy.

use ndarray::Array1;

/// Per-parameter running sums for the stop rule.
///
/// The accumulators are part of the checkpointed sampler state, so the
/// monitor can be reconstructed exactly on resume via
/// [`ConvergenceMonitor::from_sums`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceMonitor {
    sum: Array1<f64>,
    sum_sq: Array1<f64>,
    cor_sum: Array1<f64>,
}

impl ConvergenceMonitor {
    /// A zeroed monitor for a fresh run over `n_params` parameters.
    pub fn new(n_params: usize) -> Self {
        Self {
            sum: Array1::zeros(n_params),
            sum_sq: Array1::zeros(n_params),
            cor_sum: Array1::zeros(n_params),
        }
    }

    /// Rebuilds a monitor from checkpointed accumulators.
    pub fn from_sums(sum: Vec<f64>, sum_sq: Vec<f64>, cor_sum: Vec<f64>) -> Self {
        Self {
            sum: Array1::from_vec(sum),
            sum_sq: Array1::from_vec(sum_sq),
            cor_sum: Array1::from_vec(cor_sum),
        }
    }

    /// Number of tracked parameters.
    pub fn len(&self) -> usize {
        self.sum.len()
    }

    /// Whether the monitor tracks no parameters.
    pub fn is_empty(&self) -> bool {
        self.sum.is_empty()
    }

    /// Folds one completed sweep into the sums.
    ///
    /// `current` is the state after the sweep, `previous` the state after
    /// the sweep before it.
    pub fn update(&mut self, current: &[f64], previous: &[f64]) {
        for i in 0..self.sum.len() {
            self.sum[i] += current[i];
            self.sum_sq[i] += current[i] * current[i];
            self.cor_sum[i] += current[i] * previous[i];
        }
    }

    /// The running mean of parameter `i` after `iteration` sweeps.
    pub fn mean(&self, i: usize, iteration: u64) -> f64 {
        self.sum[i] / iteration as f64
    }

    /// The running standard deviation of parameter `i`.
    pub fn stdev(&self, i: usize, iteration: u64) -> f64 {
        let n = iteration as f64;
        let mean = self.sum[i] / n;
        let mean_sq = self.sum_sq[i] / n;
        (mean_sq - mean * mean).max(0.0).sqrt()
    }

    /// The standard error of the mean of parameter `i`, inflated by
    /// `sqrt((1 + rho) / (1 - rho))` when the lag-1 autocorrelation `rho`
    /// is inside (-1, 1).
    pub fn standard_error(&self, i: usize, iteration: u64) -> f64 {
        let n = iteration as f64;
        let mean = self.sum[i] / n;
        let stdev = self.stdev(i, iteration);
        let mut std_mean = stdev / n.sqrt();

        let cor = (self.cor_sum[i] / n - mean * mean) / (stdev * stdev);
        // A degenerate chain gives cor = NaN/inf; both comparisons fail
        // and the uninflated (zero) error is used, as in a constant chain.
        if cor > -1.0 && cor < 1.0 {
            std_mean *= ((1.0 + cor) / (1.0 - cor)).sqrt();
        }
        std_mean
    }

    /// Whether every parameter's inflated standard error is within its
    /// requested accuracy.
    pub fn converged(&self, iteration: u64, accuracy: &[f64]) -> bool {
        (0..self.sum.len()).all(|i| self.standard_error(i, iteration) <= accuracy[i])
    }

    /// The raw accumulators, in checkpoint field order.
    pub fn sums(&self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        (
            self.sum.to_vec(),
            self.sum_sq.to_vec(),
            self.cor_sum.to_vec(),
        )
    }
}
