//! Inference of homologous recombination events on a fixed bacterial
//! phylogeny from a whole-genome alignment.
//!
//! This crate implements the statistical core: HKY85 substitution,
//! Felsenstein ancestral reconstruction, the per-branch importation
//! pair-HMM (forward and Viterbi), pattern compression with compatibility
//! filtering, and the parameter-optimisation drivers that assemble these
//! into a tree-wide objective. Newick parsing, FASTA decoding, CLI
//! argument handling, output file formatting, and the local numerical
//! optimiser itself are treated as external collaborators and are not
//! part of this crate.

pub mod alignment;
pub mod ancestral;
pub mod config;
pub mod errors;
pub mod hmm;
pub mod logscale;
pub mod nucleotide;
pub mod optimise;
pub mod patterns;
pub mod report;
pub mod substitution;
pub mod tree;

pub use config::Config;
pub use errors::{Error, Result};
pub use logscale::ExtReal;
