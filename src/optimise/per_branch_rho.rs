//! Per-branch rho driver: R, an import ratio, delta, and optionally the
//! branch length free; branch length is otherwise coupled to a caller
//! supplied "crude" branch length via substitution accounting. Requires
//! the excess-divergence model (grounded on
//! `ClonalFrameRhoPerBranchFunction`).

use crate::ancestral::NodeSequenceMatrix;
use crate::errors::Error;
use crate::hmm::{forward, BranchColumns, BranchParams};
use crate::nucleotide::BaseFrequencies;
use crate::optimise::{from_log10, neg_log_or_penalty, Objective};
use crate::patterns::PatternTable;

pub struct PerBranchRhoObjective<'a> {
    ancestor: usize,
    descendant: usize,
    patterns: &'a PatternTable,
    node_nuc: &'a NodeSequenceMatrix,
    kappa: f64,
    freqs: &'a BaseFrequencies,
    crude_branch_length: f64,
    min_branch_length: f64,
    pub neval: usize,
}

impl<'a> PerBranchRhoObjective<'a> {
    /// `excess_divergence_model` is mandatory for this driver: constructing
    /// it without the flag is a model-misuse error per §7.
    pub fn new(
        ancestor: usize,
        descendant: usize,
        patterns: &'a PatternTable,
        node_nuc: &'a NodeSequenceMatrix,
        kappa: f64,
        freqs: &'a BaseFrequencies,
        excess_divergence_model: bool,
        crude_branch_length: f64,
        min_branch_length: f64,
    ) -> Result<Self, Error> {
        if !excess_divergence_model {
            return Err(Error::ExcessDivergenceRequired {
                name: "PerBranchRhoObjective",
            });
        }
        Ok(PerBranchRhoObjective {
            ancestor,
            descendant,
            patterns,
            node_nuc,
            kappa,
            freqs,
            crude_branch_length,
            min_branch_length,
            neval: 0,
        })
    }
}

impl<'a> Objective for PerBranchRhoObjective<'a> {
    fn evaluate(&mut self, x: &[f64]) -> f64 {
        self.neval += 1;
        if !(x.len() == 3 || x.len() == 4) {
            panic!(
                "{}",
                Error::ParameterCountMismatch {
                    name: "PerBranchRhoObjective",
                    expected: 3,
                    actual: x.len(),
                }
            );
        }

        let rho_over_theta = from_log10(x[0]);
        let import_ratio = 1.0 / (1.0 + 10f64.powf(-x[1]));
        let import_divergence = from_log10(x[2]);

        let mut branch_length = if x.len() == 3 {
            // Constrain so the expected number of substitutions equals
            // crude_branch_length:
            //   crude = b + import_ratio/(1+import_ratio) * b * (2+delta)
            //         = b * (1 + import_ratio/(1+import_ratio)*(2+delta))
            self.crude_branch_length
                / (1.0 + import_ratio / (1.0 + import_ratio) * (2.0 + import_divergence))
        } else {
            from_log10(x[3])
        };
        if branch_length < self.min_branch_length {
            branch_length = self.min_branch_length;
        }

        let mean_import_length = import_ratio / branch_length / rho_over_theta;
        let final_import_divergence = branch_length * (2.0 + import_divergence);

        let params = BranchParams {
            branch_length,
            rho_over_theta,
            mean_import_length,
            import_divergence: final_import_divergence,
            excess_divergence_model: false,
        };
        let columns = BranchColumns::new(self.ancestor, self.descendant, self.patterns, self.node_nuc);
        match forward(&columns, &params, self.freqs, self.kappa) {
            Ok(ml) => neg_log_or_penalty(ml.log()),
            Err(_) => crate::optimise::PENALTY,
        }
    }
}
