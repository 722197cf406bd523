use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("tree node {id} has {n_children} children, only binary trees are supported")]
    NonBinaryNode { id: usize, n_children: usize },
    #[error("tip label {label} appears more than once among the tree tips")]
    DuplicateTipLabel { label: String },
    #[error("tip label {label} present in the tree but not found in the alignment")]
    TipNotInAlignment { label: String },
    #[error("alignment contains zero columns")]
    EmptyAlignment,
    #[error("kappa must be strictly positive, got {kappa}")]
    InvalidKappa { kappa: f64 },
    #[error("base frequencies must sum to 1 (got {sum}), within tolerance {tolerance}")]
    InvalidBaseFrequencies { sum: f64, tolerance: f64 },
    #[error("mean_import_length must be > 1, got {value}")]
    InvalidMeanImportLength { value: f64 },
    #[error("objective {name} requires {expected} parameters, got {actual}")]
    ParameterCountMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{name} requires excess_divergence_model to be enabled")]
    ExcessDivergenceRequired { name: &'static str },
    #[error("{name} does not support excess_divergence_model")]
    ExcessDivergenceUnsupported { name: &'static str },
    #[error("min_branch_length must be strictly positive, got {value}")]
    InvalidMinBranchLength { value: f64 },
}
