//! Rescale-branch driver: a single free branch length, evaluated with
//! pure Felsenstein likelihood and no recombination state at all
//! (grounded on `ClonalFrameRescaleBranchFunction`, the only driver that
//! calls the plain per-branch substitution likelihood rather than the
//! HMM).

use crate::ancestral::NodeSequenceMatrix;
use crate::errors::Error;
use crate::logscale::ExtReal;
use crate::nucleotide::{BaseFrequencies, CERTAIN};
use crate::optimise::{from_log10, neg_log_or_penalty, Objective};
use crate::patterns::PatternTable;
use crate::substitution::hky85_ptrans_ext;

pub struct RescaleBranchObjective<'a> {
    ancestor: usize,
    descendant: usize,
    patterns: &'a PatternTable,
    node_nuc: &'a NodeSequenceMatrix,
    kappa: f64,
    freqs: &'a BaseFrequencies,
    min_branch_length: f64,
    pub neval: usize,
}

impl<'a> RescaleBranchObjective<'a> {
    pub fn new(
        ancestor: usize,
        descendant: usize,
        patterns: &'a PatternTable,
        node_nuc: &'a NodeSequenceMatrix,
        kappa: f64,
        freqs: &'a BaseFrequencies,
        min_branch_length: f64,
    ) -> Self {
        RescaleBranchObjective {
            ancestor,
            descendant,
            patterns,
            node_nuc,
            kappa,
            freqs,
            min_branch_length,
            neval: 0,
        }
    }

    /// Product over patterns of `P(t)_{x->y} ^ cpat`, in extended
    /// precision: the plain (no-recombination) substitution likelihood.
    fn likelihood(&self, branch_length: f64) -> ExtReal {
        let pt = hky85_ptrans_ext(branch_length, self.kappa, self.freqs);
        let mut log_total = 0.0;
        for p in 0..self.patterns.n_patterns() {
            let x = self.node_nuc.get(self.ancestor, p);
            let y = self.node_nuc.get(self.descendant, p);
            let term = if x.is_ambiguous() || y.is_ambiguous() {
                let xs: Vec<_> = if x.is_ambiguous() { CERTAIN.to_vec() } else { vec![x] };
                let ys: Vec<_> = if y.is_ambiguous() { CERTAIN.to_vec() } else { vec![y] };
                let mut acc = ExtReal::ZERO;
                for &xi in &xs {
                    let wx = if x.is_ambiguous() {
                        ExtReal::from_f64(self.freqs.get(xi))
                    } else {
                        ExtReal::ONE
                    };
                    for &yi in &ys {
                        let wy = if y.is_ambiguous() {
                            ExtReal::from_f64(self.freqs.get(yi))
                        } else {
                            ExtReal::ONE
                        };
                        acc = acc.add(wx.multiply(wy).multiply(pt.get(xi, yi)));
                    }
                }
                acc
            } else {
                pt.get(x, y)
            };
            log_total += term.log() * self.patterns.cpat[p] as f64;
        }
        ExtReal::from_log(log_total)
    }
}

impl<'a> Objective for RescaleBranchObjective<'a> {
    fn evaluate(&mut self, x: &[f64]) -> f64 {
        self.neval += 1;
        if x.len() != 1 {
            panic!(
                "{}",
                Error::ParameterCountMismatch {
                    name: "RescaleBranchObjective",
                    expected: 1,
                    actual: x.len(),
                }
            );
        }
        let mut branch_length = from_log10(x[0]);
        if branch_length < self.min_branch_length {
            branch_length = self.min_branch_length;
        }
        let ml = self.likelihood(branch_length);
        neg_log_or_penalty(ml.log())
    }
}
