//! Fixed-branch-parameters driver: R, L, delta shared, branch lengths
//! taken from `tree.edge_time` rather than optimised (grounded on
//! `ClonalFrameParameterFunction`).

use rayon::prelude::*;

use crate::ancestral::NodeSequenceMatrix;
use crate::errors::Error;
use crate::hmm::{viterbi, BranchColumns, BranchParams, ImportationState};
use crate::nucleotide::BaseFrequencies;
use crate::optimise::{from_log10, neg_log_or_penalty, Objective, ProgressReporter};
use crate::patterns::PatternTable;
use crate::tree::MarginalTree;

pub struct FixedBranchObjective<'a> {
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

impl<'a> FixedBranchObjective<'a> {
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
        FixedBranchObjective {
            tree,
            patterns,
            node_nuc,
            kappa,
            freqs,
            excess_divergence_model,
            multithread,
            is_imported: vec![Vec::new(); n],
            neval: 0,
            progress: ProgressReporter::new("fixed_branch"),
        }
    }
}

impl<'a> Objective for FixedBranchObjective<'a> {
    fn evaluate(&mut self, x: &[f64]) -> f64 {
        self.neval += 1;
        self.progress.tick(self.neval);

        if x.len() != 3 {
            panic!(
                "{}",
                Error::ParameterCountMismatch {
                    name: "FixedBranchObjective",
                    expected: 3,
                    actual: x.len(),
                }
            );
        }

        let rho_over_theta = from_log10(x[0]);
        let mean_import_length = from_log10(x[1]);
        let import_divergence_base = from_log10(x[2]);
        let n = Self::n_branches(self.tree);

        let evaluate_branch = |i: usize| -> (f64, Vec<ImportationState>) {
            let node = self.tree.node(i);
            let branch_length = node.edge_time;
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
            let ancestor = node.ancestor.expect("branch index i must have an ancestor");
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
