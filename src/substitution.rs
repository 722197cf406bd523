//! HKY85 nucleotide substitution model (§4.1).

use crate::logscale::ExtReal;
use crate::nucleotide::{BaseFrequencies, Nucleotide};

/// A row-stochastic 4x4 transition matrix in standard `f64` precision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransitionMatrix {
    p: [[f64; 4]; 4],
}

impl TransitionMatrix {
    pub fn get(&self, from: Nucleotide, to: Nucleotide) -> f64 {
        self.p[from.index()][to.index()]
    }

    pub fn row_sums(&self) -> [f64; 4] {
        let mut sums = [0.0; 4];
        for i in 0..4 {
            sums[i] = self.p[i].iter().sum();
        }
        sums
    }
}

/// The same matrix with entries carried in extended precision, used inside
/// the per-branch HMM where many columns' emissions are multiplied
/// together and a plain `f64` product would underflow.
#[derive(Clone, Copy, Debug)]
pub struct ExtTransitionMatrix {
    p: [[ExtReal; 4]; 4],
}

impl ExtTransitionMatrix {
    pub fn get(&self, from: Nucleotide, to: Nucleotide) -> ExtReal {
        self.p[from.index()][to.index()]
    }

    fn from_f64(m: &TransitionMatrix) -> Self {
        let mut p = [[ExtReal::ZERO; 4]; 4];
        for i in 0..4 {
            for j in 0..4 {
                p[i][j] = ExtReal::from_f64(m.p[i][j]);
            }
        }
        ExtTransitionMatrix { p }
    }
}

/// beta normalises the rate matrix so the expected substitution rate at
/// stationarity is exactly 1 per unit time.
fn beta(kappa: f64, freqs: &BaseFrequencies) -> f64 {
    let pi_r = freqs.purine_sum();
    let pi_y = freqs.pyrimidine_sum();
    let [pi_a, pi_g, pi_c, pi_t] = freqs.as_array();
    let denom = 2.0 * (pi_a * pi_g + pi_c * pi_t) * kappa + 2.0 * pi_r * pi_y;
    1.0 / denom
}

/// Closed-form HKY85 P(t) (§4.1). Uses three exponentials and is exact for
/// all t >= 0; P(0) = I and rows converge to pi as t -> infinity.
pub fn hky85_ptrans(t: f64, kappa: f64, freqs: &BaseFrequencies) -> TransitionMatrix {
    use Nucleotide::{Adenine, Cytosine, Guanine, Thymine};

    let pi_r = freqs.purine_sum();
    let pi_y = freqs.pyrimidine_sum();
    let [pi_a, pi_g, pi_c, pi_t] = freqs.as_array();
    let b = beta(kappa, freqs);

    let e1 = (-b * t).exp();
    let e2_r = (-(pi_r * kappa + pi_y) * b * t).exp();
    let e2_y = (-(pi_y * kappa + pi_r) * b * t).exp();

    let mut p = [[0.0; 4]; 4];

    // Purines: A, G (indices 0, 1); pyrimidines: C, T (indices 2, 3).
    for (&x, pi_x) in [Adenine, Guanine].iter().zip([pi_a, pi_g].iter()) {
        for (&y, pi_y_base) in [Adenine, Guanine].iter().zip([pi_a, pi_g].iter()) {
            let same = x == y;
            let kron = if same { 1.0 } else { 0.0 };
            let val = pi_y_base + pi_y_base * (pi_r - pi_y_base) / pi_r * e1
                + (kron - pi_y_base / pi_r) * e2_r;
            p[x.index()][y.index()] = val;
        }
        for &y in [Cytosine, Thymine].iter() {
            p[x.index()][y.index()] = freqs.get(y) * (1.0 - e1);
        }
        let _ = pi_x;
    }

    for (&x, pi_x) in [Cytosine, Thymine].iter().zip([pi_c, pi_t].iter()) {
        for (&y, pi_y_base) in [Cytosine, Thymine].iter().zip([pi_c, pi_t].iter()) {
            let same = x == y;
            let kron = if same { 1.0 } else { 0.0 };
            let val = pi_y_base + pi_y_base * (pi_y - pi_y_base) / pi_y * e1
                + (kron - pi_y_base / pi_y) * e2_y;
            p[x.index()][y.index()] = val;
        }
        for &y in [Adenine, Guanine].iter() {
            p[x.index()][y.index()] = freqs.get(y) * (1.0 - e1);
        }
        let _ = pi_x;
    }

    TransitionMatrix { p }
}

pub fn hky85_ptrans_ext(t: f64, kappa: f64, freqs: &BaseFrequencies) -> ExtTransitionMatrix {
    ExtTransitionMatrix::from_f64(&hky85_ptrans(t, kappa, freqs))
}

/// dP/dt at time t, computed by a central finite difference. Not required
/// for correctness (no gradient-based optimiser is used) but kept for
/// callers that want a numerical derivative.
pub fn hky85_dptrans_dt(t: f64, kappa: f64, freqs: &BaseFrequencies) -> [[f64; 4]; 4] {
    let h = 1e-6_f64.max(t * 1e-6);
    let p_plus = hky85_ptrans(t + h, kappa, freqs);
    let p_minus = hky85_ptrans((t - h).max(0.0), kappa, freqs);
    let denom = if t > h { 2.0 * h } else { h };
    let mut d = [[0.0; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            d[i][j] = (p_plus.p[i][j] - p_minus.p[i][j]) / denom;
        }
    }
    d
}

/// Instantaneous rate of leaving base `x`, `-Q_{xx}` under the beta-scaled
/// HKY85 rate matrix.
fn leaving_rate(x: Nucleotide, kappa: f64, freqs: &BaseFrequencies) -> f64 {
    use Nucleotide::{Adenine, Cytosine, Guanine, Thymine};
    let b = beta(kappa, freqs);
    let pi_r = freqs.purine_sum();
    let pi_y = freqs.pyrimidine_sum();
    match x {
        Adenine => b * (kappa * freqs.get(Guanine) + pi_y),
        Guanine => b * (kappa * freqs.get(Adenine) + pi_y),
        Cytosine => b * (kappa * freqs.get(Thymine) + pi_r),
        Thymine => b * (kappa * freqs.get(Cytosine) + pi_r),
        Nucleotide::Ambiguous => 0.0,
    }
}

/// For an ancestral base-composition count vector `n` (one count per
/// certain nucleotide), the per-site expected substitution rate
/// contribution used to normalise the approximate branch-length estimator:
/// the composition-weighted average instantaneous leaving rate.
pub fn expected_rate(n: &[f64; 4], kappa: f64, freqs: &BaseFrequencies) -> f64 {
    let total: f64 = n.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let mut weighted = 0.0;
    for (i, &count) in n.iter().enumerate() {
        let nuc = Nucleotide::from_index(i);
        weighted += count * leaving_rate(nuc, kappa, freqs);
    }
    weighted / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_freqs() -> BaseFrequencies {
        BaseFrequencies::new([0.3, 0.2, 0.25, 0.25]).unwrap()
    }

    #[test]
    fn identity_at_zero() {
        let freqs = sample_freqs();
        let p = hky85_ptrans(0.0, 2.0, &freqs);
        for (i, &nuc) in crate::nucleotide::CERTAIN.iter().enumerate() {
            for (j, &other) in crate::nucleotide::CERTAIN.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(p.get(nuc, other), expected, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn rows_are_stochastic() {
        let freqs = sample_freqs();
        for &t in &[0.0, 0.01, 0.5, 5.0, 50.0] {
            let p = hky85_ptrans(t, 3.0, &freqs);
            for sum in p.row_sums().iter() {
                assert_relative_eq!(*sum, 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn converges_to_stationary_distribution() {
        let freqs = sample_freqs();
        let p = hky85_ptrans(200.0, 2.0, &freqs);
        for &from in crate::nucleotide::CERTAIN.iter() {
            for &to in crate::nucleotide::CERTAIN.iter() {
                assert_relative_eq!(p.get(from, to), freqs.get(to), epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn stationary_distribution_is_preserved() {
        let freqs = sample_freqs();
        let p = hky85_ptrans(0.7, 2.5, &freqs);
        for &to in crate::nucleotide::CERTAIN.iter() {
            let mass: f64 = crate::nucleotide::CERTAIN
                .iter()
                .map(|&from| freqs.get(from) * p.get(from, to))
                .sum();
            assert_relative_eq!(mass, freqs.get(to), epsilon = 1e-8);
        }
    }
}
