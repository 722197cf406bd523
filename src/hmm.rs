//! The per-branch recombination pair-HMM: forward (marginal likelihood)
//! and Viterbi (MAP importation path) (§4.3).

use derive_builder::Builder;

use crate::ancestral::NodeSequenceMatrix;
use crate::errors::{Error, Result};
use crate::logscale::ExtReal;
use crate::nucleotide::{BaseFrequencies, Nucleotide, CERTAIN};
use crate::patterns::PatternTable;
use crate::substitution::hky85_ptrans_ext;

/// Numerical floor applied to branch lengths and import divergence before
/// they enter the transition-matrix exponentials (§4.3 Edge cases).
pub const MIN_RATE: f64 = 1e-7;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportationState {
    Unimported,
    Imported,
}

/// Per-branch HMM parameters (§3 Data Model).
#[derive(Clone, Copy, Debug, Builder)]
#[builder(pattern = "owned")]
pub struct BranchParams {
    pub branch_length: f64,
    pub rho_over_theta: f64,
    pub mean_import_length: f64,
    pub import_divergence: f64,
    pub excess_divergence_model: bool,
}

impl BranchParams {
    /// Effective import divergence used by the Imported emission channel:
    /// `b + delta` (or a caller-chosen multiplicative variant) when the
    /// excess-divergence flag is set, `delta` directly otherwise.
    pub fn effective_import_divergence(&self) -> f64 {
        let raw = if self.excess_divergence_model {
            self.branch_length + self.import_divergence
        } else {
            self.import_divergence
        };
        raw.max(MIN_RATE)
    }

    pub fn clamped_branch_length(&self) -> f64 {
        self.branch_length.max(MIN_RATE)
    }

    fn validate(&self) -> Result<()> {
        if !(self.mean_import_length > 1.0) {
            return Err(Error::InvalidMeanImportLength {
                value: self.mean_import_length,
            });
        }
        Ok(())
    }

    /// Prior probability a site is imported, `p_I = RL / (1 + RL)`.
    fn p_imported(&self) -> f64 {
        let rl = self.rho_over_theta * self.mean_import_length;
        rl / (1.0 + rl)
    }
}

/// The 2x2 transition matrix over adjacent compatible columns separated by
/// `gap` incompatible columns (`gap == 0` for immediately adjacent
/// compatible columns), exponentiated to the power `1 + gap` via its
/// spectral form.
struct HmmTransition {
    /// `[from][to]`, from/to indexed 0 = Unimported, 1 = Imported.
    p: [[f64; 2]; 2],
}

fn transition_matrix(params: &BranchParams, gap: usize) -> HmmTransition {
    let p_i = params.p_imported();
    let p_u = 1.0 - p_i;
    let leave_i = 1.0 / params.mean_import_length;
    let leave_u = leave_i * p_i / p_u;
    let lambda = 1.0 - leave_i - leave_u;
    let power = (1 + gap) as f64;
    let lambda_pow = lambda.powf(power);

    // Spectral form: stationary distribution (p_u, p_i) is the left
    // eigenvector for eigenvalue 1; (p_i, -p_u) is the eigenvector for
    // eigenvalue lambda.
    let p_uu = p_u + p_i * lambda_pow;
    let p_ui = p_i - p_i * lambda_pow;
    let p_iu = p_u - p_u * lambda_pow;
    let p_ii = p_i + p_u * lambda_pow;

    HmmTransition {
        p: [[p_uu, p_ui], [p_iu, p_ii]],
    }
}

/// Emission likelihood at a column given ancestral base `x` and descendant
/// base `y`, for both hidden states, computed in extended precision.
/// Ambiguous bases contribute the pi-weighted marginal over the uncertain
/// side(s).
fn emissions(
    x: Nucleotide,
    y: Nucleotide,
    params: &BranchParams,
    freqs: &BaseFrequencies,
    kappa: f64,
) -> (ExtReal, ExtReal) {
    let p_clonal = hky85_ptrans_ext(params.clamped_branch_length(), kappa, freqs);
    let p_import_in = hky85_ptrans_ext(params.clamped_branch_length(), kappa, freqs);
    let p_import_out = hky85_ptrans_ext(params.effective_import_divergence(), kappa, freqs);

    let xs: Vec<Nucleotide> = if x.is_ambiguous() {
        CERTAIN.to_vec()
    } else {
        vec![x]
    };
    let ys: Vec<Nucleotide> = if y.is_ambiguous() {
        CERTAIN.to_vec()
    } else {
        vec![y]
    };

    let mut unimported = ExtReal::ZERO;
    let mut imported = ExtReal::ZERO;

    for &xi in &xs {
        let weight_x = if x.is_ambiguous() {
            ExtReal::from_f64(freqs.get(xi))
        } else {
            ExtReal::ONE
        };
        for &yi in &ys {
            let weight_y = if y.is_ambiguous() {
                ExtReal::from_f64(freqs.get(yi))
            } else {
                ExtReal::ONE
            };
            let w = weight_x.multiply(weight_y);
            unimported = unimported.add(w.multiply(p_clonal.get(xi, yi)));

            let mut via_donor = ExtReal::ZERO;
            for &z in CERTAIN.iter() {
                let term = ExtReal::from_f64(freqs.get(z))
                    .multiply(p_import_in.get(xi, z))
                    .multiply(p_import_out.get(z, yi));
                via_donor = via_donor.add(term);
            }
            imported = imported.add(w.multiply(via_donor));
        }
    }

    (unimported, imported)
}

/// Per-column ancestor/descendant bases and the inter-column gap (number
/// of incompatible columns since the previous compatible one).
pub struct BranchColumns<'a> {
    pub ancestor: usize,
    pub descendant: usize,
    pub patterns: &'a PatternTable,
    pub node_nuc: &'a NodeSequenceMatrix,
    /// `gaps[k]` is the number of incompatible columns between compatible
    /// column `k-1` and `k` (0 for `k == 0`).
    pub gaps: Vec<usize>,
}

impl<'a> BranchColumns<'a> {
    pub fn new(
        ancestor: usize,
        descendant: usize,
        patterns: &'a PatternTable,
        node_nuc: &'a NodeSequenceMatrix,
    ) -> Self {
        let mut gaps = Vec::new();
        let mut last_compatible: Option<usize> = None;
        for (s, ipat) in patterns.ipat.iter().enumerate() {
            if ipat.is_some() {
                let gap = match last_compatible {
                    Some(prev) => s - prev - 1,
                    None => 0,
                };
                gaps.push(gap);
                last_compatible = Some(s);
            }
        }
        BranchColumns {
            ancestor,
            descendant,
            patterns,
            node_nuc,
            gaps,
        }
    }

    pub fn len(&self) -> usize {
        self.gaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty()
    }

    fn pattern_index_of(&self, k: usize) -> usize {
        // The k-th compatible column's pattern index.
        self.patterns
            .ipat
            .iter()
            .filter_map(|x| *x)
            .nth(k)
            .expect("k must index an existing compatible column")
    }

    fn bases_at(&self, k: usize) -> (Nucleotide, Nucleotide) {
        let p = self.pattern_index_of(k);
        (
            self.node_nuc.get(self.ancestor, p),
            self.node_nuc.get(self.descendant, p),
        )
    }

}

/// Forward algorithm: the marginal likelihood of the observed
/// ancestor/descendant base pairs along the branch, summing over hidden
/// importation states.
pub fn forward(
    columns: &BranchColumns,
    params: &BranchParams,
    freqs: &BaseFrequencies,
    kappa: f64,
) -> Result<ExtReal> {
    params.validate()?;
    let m = columns.len();
    if m == 0 {
        return Ok(ExtReal::ONE);
    }

    let p_i = params.p_imported();
    let p_u = 1.0 - p_i;
    let mut alpha = [ExtReal::ZERO; 2];

    let (x0, y0) = columns.bases_at(0);
    let (e_u0, e_i0) = emissions(x0, y0, params, freqs, kappa);
    alpha[0] = ExtReal::from_f64(p_u).multiply(e_u0);
    alpha[1] = ExtReal::from_f64(p_i).multiply(e_i0);
    let mut log_total = ExtReal::sum(&alpha).log();

    for k in 1..m {
        let trans = transition_matrix(params, columns.gaps[k]);
        let (x, y) = columns.bases_at(k);
        let (e_u, e_i) = emissions(x, y, params, freqs, kappa);

        let new_u = alpha[0]
            .multiply(ExtReal::from_f64(trans.p[0][0]))
            .add(alpha[1].multiply(ExtReal::from_f64(trans.p[1][0])))
            .multiply(e_u);
        let new_i = alpha[0]
            .multiply(ExtReal::from_f64(trans.p[0][1]))
            .add(alpha[1].multiply(ExtReal::from_f64(trans.p[1][1])))
            .multiply(e_i);

        let norm = ExtReal::sum(&[new_u, new_i]);
        log_total += norm.log();

        if norm.is_zero() {
            alpha = [ExtReal::ZERO, ExtReal::ZERO];
        } else {
            alpha = [new_u.divide(norm), new_i.divide(norm)];
        }
    }

    Ok(ExtReal::from_log(log_total))
}

/// Result of Viterbi decoding: the extended-precision maximum joint
/// likelihood and the MAP importation path over compatible columns.
pub struct ViterbiResult {
    pub likelihood: ExtReal,
    pub path: Vec<ImportationState>,
}

/// Viterbi max-sum decoding in log space. Ties are broken in favour of
/// Unimported.
pub fn viterbi(
    columns: &BranchColumns,
    params: &BranchParams,
    freqs: &BaseFrequencies,
    kappa: f64,
) -> Result<ViterbiResult> {
    params.validate()?;
    let m = columns.len();
    if m == 0 {
        return Ok(ViterbiResult {
            likelihood: ExtReal::ONE,
            path: Vec::new(),
        });
    }

    let p_i = params.p_imported();
    let p_u = 1.0 - p_i;

    let mut delta = vec![[0.0_f64; 2]; m];
    let mut backptr = vec![[0usize; 2]; m];

    let (x0, y0) = columns.bases_at(0);
    let (e_u0, e_i0) = emissions(x0, y0, params, freqs, kappa);
    delta[0][0] = p_u.ln() + e_u0.log();
    delta[0][1] = p_i.ln() + e_i0.log();

    for k in 1..m {
        let trans = transition_matrix(params, columns.gaps[k]);
        let (x, y) = columns.bases_at(k);
        let (e_u, e_i) = emissions(x, y, params, freqs, kappa);

        for (to, log_emission) in [(0usize, e_u.log()), (1usize, e_i.log())] {
            // Ties broken in favour of Unimported (from state 0).
            let from_u = delta[k - 1][0] + trans.p[0][to].max(1e-300).ln();
            let from_i = delta[k - 1][1] + trans.p[1][to].max(1e-300).ln();
            let (best_from, best_val) = if from_u >= from_i {
                (0, from_u)
            } else {
                (1, from_i)
            };
            delta[k][to] = best_val + log_emission;
            backptr[k][to] = best_from;
        }
    }

    let last = m - 1;
    let end_state = if delta[last][0] >= delta[last][1] { 0 } else { 1 };
    let best_log_likelihood = delta[last][end_state];

    let mut states = vec![0usize; m];
    states[last] = end_state;
    for k in (1..m).rev() {
        states[k - 1] = backptr[k][states[k]];
    }

    let path = states
        .into_iter()
        .map(|s| {
            if s == 0 {
                ImportationState::Unimported
            } else {
                ImportationState::Imported
            }
        })
        .collect();

    Ok(ViterbiResult {
        likelihood: ExtReal::from_log(best_log_likelihood),
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_params() -> BranchParams {
        BranchParams {
            branch_length: 0.1,
            rho_over_theta: 0.01,
            mean_import_length: 100.0,
            import_divergence: 0.1,
            excess_divergence_model: false,
        }
    }

    #[test]
    fn rejects_mean_import_length_at_or_below_one() {
        let params = BranchParams {
            mean_import_length: 1.0,
            ..base_params()
        };
        let err = params.validate().unwrap_err();
        assert_eq!(
            err,
            Error::InvalidMeanImportLength { value: 1.0 }
        );
    }

    #[test]
    fn empty_columns_yield_unit_likelihood_and_empty_path() {
        let patterns = PatternTable {
            pat1: vec![],
            cpat: vec![],
            ipat: vec![],
            bases: vec![],
        };
        let node_nuc = crate::ancestral::NodeSequenceMatrix { data: vec![] };
        let columns = BranchColumns::new(0, 1, &patterns, &node_nuc);
        let freqs = BaseFrequencies::uniform();
        let params = base_params();

        let fwd = forward(&columns, &params, &freqs, 2.0).unwrap();
        assert!((fwd.to_f64() - 1.0).abs() < 1e-12);

        let vit = viterbi(&columns, &params, &freqs, 2.0).unwrap();
        assert!(vit.path.is_empty());
    }

    #[test]
    fn viterbi_likelihood_never_exceeds_forward() {
        let patterns = PatternTable {
            pat1: vec![0, 1, 2],
            cpat: vec![1, 1, 1],
            ipat: vec![Some(0), Some(1), Some(2)],
            bases: vec![
                vec![Nucleotide::Adenine, Nucleotide::Adenine],
                vec![Nucleotide::Guanine, Nucleotide::Cytosine],
                vec![Nucleotide::Thymine, Nucleotide::Thymine],
            ],
        };
        let node_nuc = crate::ancestral::NodeSequenceMatrix {
            data: vec![
                vec![Nucleotide::Adenine, Nucleotide::Guanine, Nucleotide::Thymine],
                vec![Nucleotide::Adenine, Nucleotide::Cytosine, Nucleotide::Thymine],
            ],
        };
        let columns = BranchColumns::new(0, 1, &patterns, &node_nuc);
        let freqs = BaseFrequencies::uniform();
        let params = base_params();

        let fwd = forward(&columns, &params, &freqs, 2.0).unwrap();
        let vit = viterbi(&columns, &params, &freqs, 2.0).unwrap();
        assert!(vit.likelihood.log() <= fwd.log() + 1e-9);
    }
}
