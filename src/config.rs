//! Scalar configuration shared across the inference pipeline (§6).
//!
//! There is no argument-parsing layer here: callers build a `Config`
//! directly and validation happens once, at construction, the same point
//! the teacher crate validates a `Prob::checked(..)` before it ever reaches
//! the model internals.

use crate::errors::{Error, Result};

/// Immutable run configuration. Every field here is read by at least one of
/// the optimiser drivers or the HMM.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    /// Transition/transversion ratio for the HKY85 model. Must be > 0.
    kappa: f64,
    /// Whether imported segments are allowed their own divergence rate
    /// above the clonal frame (the "nu" excess-divergence parameter).
    excess_divergence_model: bool,
    /// Run per-branch work across a rayon thread pool.
    multithread: bool,
    /// Floor applied to branch lengths during optimisation. Must be > 0.
    min_branch_length: f64,
    /// Drop alignment patterns compatible with at most one other pattern
    /// before compression (singleton purging, §4.2).
    purge_singletons: bool,
}

impl Config {
    pub const DEFAULT_KAPPA: f64 = 2.0;
    pub const DEFAULT_MIN_BRANCH_LENGTH: f64 = 1e-7;

    pub fn new(
        kappa: f64,
        excess_divergence_model: bool,
        multithread: bool,
        min_branch_length: f64,
        purge_singletons: bool,
    ) -> Result<Self> {
        if !(kappa > 0.0) {
            return Err(Error::InvalidKappa { kappa });
        }
        if !(min_branch_length > 0.0) {
            return Err(Error::InvalidMinBranchLength {
                value: min_branch_length,
            });
        }
        Ok(Config {
            kappa,
            excess_divergence_model,
            multithread,
            min_branch_length,
            purge_singletons,
        })
    }

    pub fn kappa(&self) -> f64 {
        self.kappa
    }

    pub fn excess_divergence_model(&self) -> bool {
        self.excess_divergence_model
    }

    pub fn multithread(&self) -> bool {
        self.multithread
    }

    pub fn min_branch_length(&self) -> f64 {
        self.min_branch_length
    }

    pub fn purge_singletons(&self) -> bool {
        self.purge_singletons
    }

    pub fn clamp_branch_length(&self, t: f64) -> f64 {
        t.max(self.min_branch_length)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(
            Self::DEFAULT_KAPPA,
            false,
            true,
            Self::DEFAULT_MIN_BRANCH_LENGTH,
            true,
        )
        .expect("default configuration values are always valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.kappa(), Config::DEFAULT_KAPPA);
        assert!(cfg.purge_singletons());
    }

    #[test]
    fn rejects_nonpositive_kappa() {
        let err = Config::new(0.0, false, true, 1e-7, true).unwrap_err();
        assert_eq!(err, Error::InvalidKappa { kappa: 0.0 });
    }

    #[test]
    fn rejects_nonpositive_min_branch_length() {
        let err = Config::new(2.0, false, true, -1.0, true).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidMinBranchLength { value: -1.0 }
        );
    }

    #[test]
    fn clamp_raises_below_floor_branch_lengths() {
        let cfg = Config::new(2.0, false, true, 0.01, true).unwrap();
        assert_eq!(cfg.clamp_branch_length(0.001), 0.01);
        assert_eq!(cfg.clamp_branch_length(0.5), 0.5);
    }
}
