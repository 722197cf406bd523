//! Joint-tree driver: R, L, delta shared, plus a free branch length per
//! non-penultimate branch, evaluated with the Viterbi product over all
//! branches (grounded on `ClonalFrameFunction`).

use rayon::prelude::*;

use crate::ancestral::NodeSequenceMatrix;
use crate::errors::Error;
use crate::hmm::{viterbi, BranchColumns, BranchParams, ImportationState};
use crate::nucleotide::BaseFrequencies;
use crate::optimise::{from_log10, neg_log_or_penalty, Objective, ProgressReporter};
use crate::patterns::PatternTable;
use crate::tree::MarginalTree;

pub struct JointTreeObjective<'a> {
    tree: &'a MarginalTree,
    patterns: &'a PatternTable,
    node_nuc: &'a NodeSequenceMatrix,
    kappa: f64,
    freqs: &'a BaseFrequencies,
    excess_divergence_model: bool,
    multithread: bool,
    pub is_imported: Vec<Vec<ImportationState>>,
    pub neval: usize,
    progress: ProgressReporter,
}

impl<'a> JointTreeObjective<'a> {
    /// Number of non-penultimate branches: `tree.n_nodes() - 2` (the root
    /// carries no branch, and the penultimate branch's contribution is
    /// fixed at likelihood 1 by definition).
    fn n_branches(tree: &MarginalTree) -> usize {
        tree.n_nodes() - 2
    }

    pub fn new(
        tree: &'a MarginalTree,
        patterns: &'a PatternTable,
        node_nuc: &'a NodeSequenceMatrix,
        kappa: f64,
        freqs: &'a BaseFrequencies,
        excess_divergence_model: bool,
        multithread: bool,
    ) -> Self {
        let n = Self::n_branches(tree);
        JointTreeObjective {
            tree,
            patterns,
            node_nuc,
            kappa,
            freqs,
            excess_divergence_model,
            multithread,
            is_imported: vec![Vec::new(); n],
            neval: 0,
            progress: ProgressReporter::new("joint_tree"),
        }
    }

    fn n_params(&self) -> usize {
        Self::n_branches(self.tree) + 3
    }
}

impl<'a> Objective for JointTreeObjective<'a> {
    fn evaluate(&mut self, x: &[f64]) -> f64 {
        self.neval += 1;
        self.progress.tick(self.neval);

        let expected = self.n_params();
        if x.len() != expected {
            panic!(
                "{}",
                Error::ParameterCountMismatch {
                    name: "JointTreeObjective",
                    expected,
                    actual: x.len(),
                }
            );
        }

        let rho_over_theta = from_log10(x[0]);
        let mean_import_length = from_log10(x[1]);
        let import_divergence_base = from_log10(x[2]);
        let n = Self::n_branches(self.tree);

        let evaluate_branch = |i: usize| -> (f64, Vec<ImportationState>) {
            let branch_length = from_log10(x[3 + i]);
            let import_divergence = if self.excess_divergence_model {
                branch_length + import_divergence_base
            } else {
                import_divergence_base
            };
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
            let result = viterbi(&columns, &params, self.freqs, self.kappa)
                .expect("mean_import_length validated before optimisation starts");
            (result.likelihood.log(), result.path)
        };

        let per_branch: Vec<(f64, Vec<ImportationState>)> = if self.multithread {
            (0..n).into_par_iter().map(evaluate_branch).collect()
        } else {
            (0..n).map(evaluate_branch).collect()
        };

        let mut total_log = 0.0;
        for (i, (log_l, path)) in per_branch.into_iter().enumerate() {
            total_log += log_l;
            self.is_imported[i] = path;
        }

        neg_log_or_penalty(total_log)
    }
}
