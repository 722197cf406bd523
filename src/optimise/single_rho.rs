//! Single global rho driver: one R, L, delta shared across the whole
//! tree; each branch's length is solved from its own expected-substitution
//! count to match that shared parameterisation. Excess-divergence is not
//! supported (grounded on `ClonalFrameSingleRho`).

use rayon::prelude::*;

use crate::ancestral::NodeSequenceMatrix;
use crate::errors::Error;
use crate::hmm::{forward, viterbi, BranchColumns, BranchParams, ImportationState};
use crate::nucleotide::BaseFrequencies;
use crate::optimise::{from_log10, neg_log_or_penalty, Objective, ProgressReporter};
use crate::patterns::PatternTable;
use crate::tree::MarginalTree;

pub struct SingleRhoObjective<'a> {
    tree: &'a MarginalTree,
    patterns: &'a PatternTable,
    node_nuc: &'a NodeSequenceMatrix,
    kappa: f64,
    freqs: &'a BaseFrequencies,
    multithread: bool,
    use_viterbi: bool,
    substitutions_per_branch: Vec<f64>,
    min_branch_length: f64,
    pub is_imported: Vec<Vec<ImportationState>>,
    pub neval: usize,
    progress: ProgressReporter,
}

impl<'a> SingleRhoObjective<'a> {
    fn n_branches(tree: &MarginalTree) -> usize {
        tree.n_nodes() - 2
    }

    /// `excess_divergence_model` must be false for this driver; §7 treats
    /// enabling it here as model misuse.
    pub fn new(
        use_viterbi: bool,
        tree: &'a MarginalTree,
        patterns: &'a PatternTable,
        node_nuc: &'a NodeSequenceMatrix,
        kappa: f64,
        freqs: &'a BaseFrequencies,
        excess_divergence_model: bool,
        multithread: bool,
        substitutions_per_branch: Vec<f64>,
        min_branch_length: f64,
    ) -> Result<Self, Error> {
        if excess_divergence_model {
            return Err(Error::ExcessDivergenceUnsupported {
                name: "SingleRhoObjective",
            });
        }
        let n = Self::n_branches(tree);
        Ok(SingleRhoObjective {
            tree,
            patterns,
            node_nuc,
            kappa,
            freqs,
            multithread,
            use_viterbi,
            substitutions_per_branch,
            min_branch_length,
            is_imported: vec![Vec::new(); n],
            neval: 0,
            progress: ProgressReporter::new("single_rho"),
        })
    }

    /// Solve branch length `b` from the target expected-substitution count
    /// `s` so that `s = b * (1 + R*L*(delta-b)) / (1 + R*L*b)` holds
    /// (rearranged to `b = s / (1 + R*L*(delta-s))`), falling back to
    /// `b = s` when `s >= delta` or the denominator is non-positive, and
    /// clamping to the minimum branch length.
    fn branch_length(&self, s: f64, rho_over_theta: f64, mean_import_length: f64, import_divergence: f64) -> f64 {
        let denom = 1.0 + rho_over_theta * mean_import_length * (import_divergence - s);
        let mut b = s / denom;
        if s >= import_divergence || denom <= 0.0 {
            b = s;
        }
        if b.is_nan() || b < self.min_branch_length {
            b = self.min_branch_length;
        }
        b
    }
}

impl<'a> Objective for SingleRhoObjective<'a> {
    fn evaluate(&mut self, x: &[f64]) -> f64 {
        self.neval += 1;
        self.progress.tick(self.neval);

        if x.len() != 3 {
            panic!(
                "{}",
                Error::ParameterCountMismatch {
                    name: "SingleRhoObjective",
                    expected: 3,
                    actual: x.len(),
                }
            );
        }

        let rho_over_theta = from_log10(x[0]);
        let mean_import_length = from_log10(x[1]);
        let import_divergence = from_log10(x[2]);
        let n = Self::n_branches(self.tree);

        let evaluate_branch = |i: usize| -> (f64, Vec<ImportationState>) {
            let branch_length = self.branch_length(
                self.substitutions_per_branch[i],
                rho_over_theta,
                mean_import_length,
                import_divergence,
            );
            let params = BranchParams {
                branch_length,
                rho_over_theta,
                mean_import_length,
                import_divergence,
                excess_divergence_model: false,
            };
            let ancestor = self
                .tree
                .node(i)
                .ancestor
                .expect("branch index i must have an ancestor");
            let columns = BranchColumns::new(ancestor, i, self.patterns, self.node_nuc);
            if self.use_viterbi {
                let result = viterbi(&columns, &params, self.freqs, self.kappa)
                    .expect("mean_import_length validated before optimisation starts");
                (result.likelihood.log(), result.path)
            } else {
                let ml = forward(&columns, &params, self.freqs, self.kappa)
                    .expect("mean_import_length validated before optimisation starts");
                (ml.log(), Vec::new())
            }
        };

        let per_branch: Vec<(f64, Vec<ImportationState>)> = if self.multithread {
            (0..n).into_par_iter().map(evaluate_branch).collect()
        } else {
            (0..n).map(evaluate_branch).collect()
        };

        let mut total_log = 0.0;
        for (i, (log_l, path)) in per_branch.into_iter().enumerate() {
            total_log += log_l;
            if self.use_viterbi {
                self.is_imported[i] = path;
            }
        }

        neg_log_or_penalty(total_log)
    }
}
