//! Parameter-optimisation drivers (§4.5).
//!
//! Each driver is a plain struct holding immutable borrows of the shared
//! inference state (tree, node_nuc matrix, pattern tables, π, κ) plus its
//! own mutable per-branch outputs, implementing a single shared
//! `Objective` trait. The actual local minimisation is an external
//! collaborator's job; these structs only ever get called with a
//! parameter vector and return a scalar.

pub mod approx_branch_length;
pub mod fixed_branch;
pub mod joint_tree;
pub mod per_branch;
pub mod per_branch_rho;
pub mod rescale_branch;
pub mod single_rho;

use std::time::Instant;

/// A scalar objective of a real parameter vector, minimised by an external
/// local optimiser. Implementors exponentiate `x` (always supplied in
/// log10 space) on entry so the optimiser sees an unconstrained space.
pub trait Objective {
    fn evaluate(&mut self, x: &[f64]) -> f64;
}

/// Shared progress-reporting helper: logs an `info!` line at most once
/// every 60 wall-clock seconds, mirroring the teacher's
/// `info!("{} records processed.", i)` cadence in `call/pairwise.rs`.
pub(crate) struct ProgressReporter {
    last_report: Instant,
    label: &'static str,
}

impl ProgressReporter {
    pub(crate) fn new(label: &'static str) -> Self {
        ProgressReporter {
            last_report: Instant::now(),
            label,
        }
    }

    pub(crate) fn tick(&mut self, neval: usize) {
        if self.last_report.elapsed().as_secs_f64() >= 60.0 {
            log::info!("{}: done {} iterations", self.label, neval);
            self.last_report = Instant::now();
        }
    }
}

/// `log10(x)` space -> positive real, used at the top of every objective's
/// `evaluate` to recover a parameter from its unconstrained representation.
pub(crate) fn from_log10(x: f64) -> f64 {
    10f64.powf(x)
}

/// A large finite penalty returned when the extended-precision likelihood's
/// log is non-finite, steering the optimiser away without propagating NaN
/// or infinity into its internals (§7 "Numerical underflow").
pub(crate) const PENALTY: f64 = 1e12;

pub(crate) fn neg_log_or_penalty(log_likelihood: f64) -> f64 {
    if log_likelihood.is_finite() {
        -log_likelihood
    } else {
        PENALTY
    }
}
