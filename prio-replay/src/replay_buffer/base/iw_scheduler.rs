//! Annealing of the importance sampling exponent.
use serde::{Deserialize, Serialize};

/// Linear schedule of $\beta$ driven by optimization steps.
///
/// After `n_opts` steps, $\beta = \beta_0 + (\beta_{final} - \beta_0) \cdot n_{opts} / n_{opts,final}$,
/// clamped at `beta_final` once `n_opts >= n_opts_final`. With `n_opts_final == 0`
/// the schedule starts at `beta_final`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct IwScheduler {
    /// $\beta$ before any optimization step.
    pub beta_0: f64,

    /// $\beta$ reached at the end of the schedule.
    pub beta_final: f64,

    /// Length of the schedule in optimization steps.
    pub n_opts_final: usize,

    /// Steps counted so far.
    pub n_opts: usize,
}

impl IwScheduler {
    /// Starts a schedule at step 0.
    pub fn new(beta_0: f64, beta_final: f64, n_opts_final: usize) -> Self {
        Self {
            beta_0,
            beta_final,
            n_opts_final,
            n_opts: 0,
        }
    }

    /// $\beta$ at the current step.
    pub fn beta(&self) -> f64 {
        if self.n_opts >= self.n_opts_final {
            return self.beta_final;
        }
        let progress = self.n_opts as f64 / self.n_opts_final as f64;
        self.beta_0 + (self.beta_final - self.beta_0) * progress
    }

    /// Counts one optimization step.
    pub fn add_n_opts(&mut self) {
        self.n_opts = self.n_opts.saturating_add(1);
    }
}
