//! Extended-precision nonnegative real, used everywhere the emission and
//! forward/Viterbi arithmetic would otherwise underflow standard `f64` when
//! many per-column probabilities are multiplied together.
//!
//! Per the Design Notes this is exposed as an opaque value with
//! {multiply, divide, add, log, from_f64, is_zero}; internally it is carried
//! entirely in log space via `bio::stats::LogProb`, which is exactly the
//! mechanism the teacher crate already relies on for read-likelihood
//! products that span an entire BAM pileup.

use std::iter::Product;
use std::ops::{Add, Div, Mul};

use bio::stats::{LogProb, Prob};

/// A nonnegative real carried in log space. Multiplication never underflows
/// to zero the way repeated `f64` multiplication would; only the final
/// `.log()` is ever converted back to a plain `f64`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct ExtReal(LogProb);

impl ExtReal {
    pub const ZERO: ExtReal = ExtReal(LogProb(f64::NEG_INFINITY));
    pub const ONE: ExtReal = ExtReal(LogProb(0.0));

    /// Lift a standard double into the extended-precision domain. `x` must
    /// be nonnegative; values are not required to be <= 1 (unlike a true
    /// probability), since this type is also used for unnormalised products.
    pub fn from_f64(x: f64) -> Self {
        if x <= 0.0 {
            ExtReal::ZERO
        } else {
            ExtReal(LogProb(x.ln()))
        }
    }

    pub fn from_log(ln_x: f64) -> Self {
        ExtReal(LogProb(ln_x))
    }

    pub fn from_prob(p: Prob) -> Self {
        ExtReal(LogProb::from(p))
    }

    /// Natural logarithm of the represented value. Always finite unless the
    /// value is exactly zero, in which case it is `-inf`.
    pub fn log(self) -> f64 {
        *self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == LogProb::ln_zero()
    }

    pub fn is_finite_log(self) -> bool {
        self.log().is_finite()
    }

    /// Convert back to a plain double. Only meaningful at a reporting
    /// boundary; intermediate computations should stay in `ExtReal`.
    pub fn to_f64(self) -> f64 {
        self.0.exp()
    }

    pub fn multiply(self, other: ExtReal) -> ExtReal {
        self * other
    }

    pub fn divide(self, other: ExtReal) -> ExtReal {
        self / other
    }

    /// Sum of two extended-precision values (`ln_add_exp` under the hood).
    pub fn add(self, other: ExtReal) -> ExtReal {
        self + other
    }

    pub fn sum(values: &[ExtReal]) -> ExtReal {
        if values.is_empty() {
            return ExtReal::ZERO;
        }
        let logs: Vec<LogProb> = values.iter().map(|v| v.0).collect();
        ExtReal(LogProb::ln_sum_exp(&logs))
    }
}

impl Default for ExtReal {
    fn default() -> Self {
        ExtReal::ZERO
    }
}

impl Mul for ExtReal {
    type Output = ExtReal;
    fn mul(self, rhs: ExtReal) -> ExtReal {
        ExtReal(self.0 + rhs.0)
    }
}

impl Div for ExtReal {
    type Output = ExtReal;
    fn div(self, rhs: ExtReal) -> ExtReal {
        ExtReal(self.0 - rhs.0)
    }
}

impl Add for ExtReal {
    type Output = ExtReal;
    fn add(self, rhs: ExtReal) -> ExtReal {
        ExtReal(self.0.ln_add_exp(rhs.0))
    }
}

impl Product for ExtReal {
    fn product<I: Iterator<Item = ExtReal>>(iter: I) -> Self {
        iter.fold(ExtReal::ONE, |acc, x| acc * x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn multiply_matches_log_addition() {
        let a = ExtReal::from_f64(0.25);
        let b = ExtReal::from_f64(0.5);
        let c = a.multiply(b);
        assert_relative_eq!(c.to_f64(), 0.125, epsilon = 1e-12);
    }

    #[test]
    fn zero_is_absorbing() {
        let z = ExtReal::ZERO;
        let a = ExtReal::from_f64(7.3);
        assert!((z * a).is_zero());
    }

    #[test]
    fn sum_matches_addition_of_probabilities() {
        let a = ExtReal::from_f64(0.3);
        let b = ExtReal::from_f64(0.4);
        let s = ExtReal::sum(&[a, b]);
        assert_relative_eq!(s.to_f64(), 0.7, epsilon = 1e-12);
    }

    #[test]
    fn product_over_many_columns_stays_finite() {
        let values: Vec<ExtReal> = (0..10_000).map(|_| ExtReal::from_f64(0.01)).collect();
        let p: ExtReal = values.into_iter().product();
        assert!(p.is_finite_log());
        assert!(p.log() < 0.0);
    }
}
