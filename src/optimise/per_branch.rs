//! Per-branch joint driver: b, R, L, delta free for a single branch,
//! evaluated with Viterbi (grounded on `ClonalFrameBranchFunction`).

use crate::ancestral::NodeSequenceMatrix;
use crate::errors::Error;
use crate::hmm::{viterbi, BranchColumns, BranchParamsBuilder, ImportationState};
use crate::nucleotide::BaseFrequencies;
use crate::optimise::{from_log10, neg_log_or_penalty, Objective};
use crate::patterns::PatternTable;

pub struct PerBranchObjective<'a> {
    ancestor: usize,
    descendant: usize,
    patterns: &'a PatternTable,
    node_nuc: &'a NodeSequenceMatrix,
    kappa: f64,
    freqs: &'a BaseFrequencies,
    excess_divergence_model: bool,
    pub is_imported: Vec<ImportationState>,
    pub neval: usize,
}

impl<'a> PerBranchObjective<'a> {
    pub fn new(
        ancestor: usize,
        descendant: usize,
        patterns: &'a PatternTable,
        node_nuc: &'a NodeSequenceMatrix,
        kappa: f64,
        freqs: &'a BaseFrequencies,
        excess_divergence_model: bool,
    ) -> Self {
        PerBranchObjective {
            ancestor,
            descendant,
            patterns,
            node_nuc,
            kappa,
            freqs,
            excess_divergence_model,
            is_imported: Vec::new(),
            neval: 0,
        }
    }
}

impl<'a> Objective for PerBranchObjective<'a> {
    fn evaluate(&mut self, x: &[f64]) -> f64 {
        self.neval += 1;
        if x.len() != 4 {
            panic!(
                "{}",
                Error::ParameterCountMismatch {
                    name: "PerBranchObjective",
                    expected: 4,
                    actual: x.len(),
                }
            );
        }
        let branch_length = from_log10(x[0]);
        let rho_over_theta = from_log10(x[1]);
        let mean_import_length = from_log10(x[2]);
        let import_divergence = if self.excess_divergence_model {
            branch_length + from_log10(x[3])
        } else {
            from_log10(x[3])
        };

        let params = BranchParamsBuilder::default()
            .branch_length(branch_length)
            .rho_over_theta(rho_over_theta)
            .mean_import_length(mean_import_length)
            .import_divergence(import_divergence)
            .excess_divergence_model(false)
            .build()
            .expect("all BranchParams fields are set above");
        let columns = BranchColumns::new(self.ancestor, self.descendant, self.patterns, self.node_nuc);
        let result = viterbi(&columns, &params, self.freqs, self.kappa)
            .expect("mean_import_length validated by caller before optimisation starts");
        self.is_imported = result.path;
        neg_log_or_penalty(result.likelihood.log())
    }
}
