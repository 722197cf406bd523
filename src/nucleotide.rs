//! The four-plus-ambiguous nucleotide alphabet (§3 Data Model).

/// A tagged nucleotide value. Emission code switches on this rather than
/// relying on a numeric coincidence with the 0..3 range, per the Design
/// Notes' "Enumerated nucleotide" guidance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Nucleotide {
    Adenine = 0,
    Guanine = 1,
    Cytosine = 2,
    Thymine = 3,
    Ambiguous = 4,
}

pub use Nucleotide::{Adenine, Ambiguous, Cytosine, Guanine, Thymine};

/// The four certain nucleotide states, in canonical order.
pub const CERTAIN: [Nucleotide; 4] = [Adenine, Guanine, Cytosine, Thymine];

impl Nucleotide {
    /// Index into a length-4 frequency/likelihood vector. Panics on
    /// `Ambiguous`, which has no single index.
    pub fn index(self) -> usize {
        match self {
            Adenine => 0,
            Guanine => 1,
            Cytosine => 2,
            Thymine => 3,
            Ambiguous => panic!("Nucleotide::index() called on Ambiguous"),
        }
    }

    pub fn from_index(i: usize) -> Self {
        CERTAIN[i]
    }

    pub fn is_ambiguous(self) -> bool {
        self == Ambiguous
    }

    /// Decode a raw alignment byte (upper or lower case IUPAC) into a
    /// `Nucleotide`. Anything other than A/C/G/T is treated as ambiguous,
    /// matching the "any" semantics described in §3.
    pub fn from_byte(b: u8) -> Self {
        match b.to_ascii_uppercase() {
            b'A' => Adenine,
            b'G' => Guanine,
            b'C' => Cytosine,
            b'T' => Thymine,
            _ => Ambiguous,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Adenine => b'A',
            Guanine => b'G',
            Cytosine => b'C',
            Thymine => b'T',
            Ambiguous => b'N',
        }
    }

    /// True for A/G (purines).
    pub fn is_purine(self) -> bool {
        matches!(self, Adenine | Guanine)
    }
}

/// Base frequency vector pi = (pi_A, pi_G, pi_C, pi_T), nonnegative and
/// summing to 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BaseFrequencies {
    pi: [f64; 4],
}

impl BaseFrequencies {
    pub const TOLERANCE: f64 = 1e-6;

    pub fn new(pi: [f64; 4]) -> crate::errors::Result<Self> {
        let sum: f64 = pi.iter().sum();
        if (sum - 1.0).abs() > Self::TOLERANCE {
            return Err(crate::errors::Error::InvalidBaseFrequencies {
                sum,
                tolerance: Self::TOLERANCE,
            });
        }
        Ok(BaseFrequencies { pi })
    }

    /// Uniform frequencies (0.25 each), useful as a fallback/default.
    pub fn uniform() -> Self {
        BaseFrequencies { pi: [0.25; 4] }
    }

    /// Estimate empirical base frequencies from unambiguous sites of a
    /// column-major nucleotide matrix (one row per tip).
    pub fn estimate<'a, I>(columns: I) -> crate::errors::Result<Self>
    where
        I: IntoIterator<Item = &'a Nucleotide>,
    {
        let mut counts = [0usize; 4];
        let mut total = 0usize;
        for nuc in columns {
            if !nuc.is_ambiguous() {
                counts[nuc.index()] += 1;
                total += 1;
            }
        }
        if total == 0 {
            return Ok(Self::uniform());
        }
        let mut pi = [0.0; 4];
        for i in 0..4 {
            pi[i] = counts[i] as f64 / total as f64;
        }
        // Guard the invariant "strictly positive on any base that appears
        // unambiguously" against floating roundoff pushing a count to
        // exactly zero share when it shouldn't be; renormalise defensively.
        let sum: f64 = pi.iter().sum();
        for p in pi.iter_mut() {
            *p /= sum;
        }
        BaseFrequencies::new(pi)
    }

    pub fn get(&self, nuc: Nucleotide) -> f64 {
        self.pi[nuc.index()]
    }

    pub fn as_array(&self) -> [f64; 4] {
        self.pi
    }

    pub fn purine_sum(&self) -> f64 {
        self.pi[Adenine.index()] + self.pi[Guanine.index()]
    }

    pub fn pyrimidine_sum(&self) -> f64 {
        self.pi[Cytosine.index()] + self.pi[Thymine.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_frequencies_not_summing_to_one() {
        assert!(BaseFrequencies::new([0.1, 0.1, 0.1, 0.1]).is_err());
    }

    #[test]
    fn estimate_counts_unambiguous_bases_only() {
        let col = vec![Adenine, Adenine, Guanine, Ambiguous];
        let freqs = BaseFrequencies::estimate(col.iter()).unwrap();
        assert_relative_eq!(freqs.get(Adenine), 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(freqs.get(Guanine), 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(freqs.get(Cytosine), 0.0);
    }

    #[test]
    fn purine_and_pyrimidine_sums_partition_unity() {
        let freqs = BaseFrequencies::new([0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_relative_eq!(
            freqs.purine_sum() + freqs.pyrimidine_sum(),
            1.0,
            epsilon = 1e-12
        );
    }
}
