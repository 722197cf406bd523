//! The alignment encoder (§2 step 1, §4 Data Model "Node-sequence matrix").
//!
//! Decoding FASTA text is out of scope; callers already hold each tip's
//! decoded byte sequence and hand it to `AlignmentView::new`, which encodes
//! bytes into `Nucleotide`s, derives empirical base frequencies, and builds
//! the per-site usable mask.

use std::collections::HashMap;

use crate::errors::{Error, Result};
use crate::nucleotide::{BaseFrequencies, Nucleotide};
use crate::tree::MarginalTree;

/// A decoded alignment, one row per tip, ordered to match the tree's tip
/// node indices.
#[derive(Clone, Debug)]
pub struct AlignmentView {
    /// `rows[i][s]` is the nucleotide of tip row `i` at column `s`.
    rows: Vec<Vec<Nucleotide>>,
    /// Tree node id for each row, in the same order as `rows`.
    tip_ids: Vec<usize>,
    n_columns: usize,
}

impl AlignmentView {
    /// Build a view from a label->sequence map, matching each tip's label
    /// against the tree and preserving tree tip order. All sequences must
    /// share the same length.
    pub fn new(tree: &MarginalTree, sequences: &HashMap<String, Vec<u8>>) -> Result<Self> {
        let mut tip_ids = Vec::new();
        let mut rows = Vec::new();
        let mut n_columns = None;

        for tip in tree.tips() {
            let label = tip.label.as_ref().expect("tip node must carry a label");
            let seq = sequences
                .get(label)
                .ok_or_else(|| Error::TipNotInAlignment {
                    label: label.clone(),
                })?;
            match n_columns {
                None => n_columns = Some(seq.len()),
                Some(n) if n != seq.len() => {
                    return Err(Error::TipNotInAlignment {
                        label: label.clone(),
                    })
                }
                _ => {}
            }
            let row: Vec<Nucleotide> = seq.iter().map(|&b| Nucleotide::from_byte(b)).collect();
            tip_ids.push(tip.id);
            rows.push(row);
        }

        let n_columns = n_columns.unwrap_or(0);
        if n_columns == 0 {
            return Err(Error::EmptyAlignment);
        }

        Ok(AlignmentView {
            rows,
            tip_ids,
            n_columns,
        })
    }

    pub fn n_columns(&self) -> usize {
        self.n_columns
    }

    pub fn n_tips(&self) -> usize {
        self.rows.len()
    }

    /// Nucleotide at tip node `tip_id`, column `s`.
    pub fn get(&self, tip_id: usize, s: usize) -> Nucleotide {
        let row_idx = self
            .tip_ids
            .iter()
            .position(|&id| id == tip_id)
            .expect("tip_id must be one of the alignment's tips");
        self.rows[row_idx][s]
    }

    pub fn tip_ids(&self) -> &[usize] {
        &self.tip_ids
    }

    pub fn column(&self, s: usize) -> impl Iterator<Item = (usize, Nucleotide)> + '_ {
        self.tip_ids
            .iter()
            .copied()
            .zip(self.rows.iter().map(move |row| row[s]))
    }

    /// A column is "usable" if at least one tip carries a certain base; an
    /// all-ambiguous column carries no information.
    pub fn usable_mask(&self) -> Vec<bool> {
        (0..self.n_columns)
            .map(|s| self.column(s).any(|(_, nuc)| !nuc.is_ambiguous()))
            .collect()
    }

    /// Empirical base frequencies from unambiguous sites across the whole
    /// alignment.
    pub fn empirical_frequencies(&self) -> Result<BaseFrequencies> {
        let all = self.rows.iter().flatten();
        BaseFrequencies::estimate(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;

    fn two_tip_tree() -> MarginalTree {
        let nodes = vec![
            Node {
                id: 0,
                ancestor: Some(2),
                children: vec![],
                edge_time: 0.1,
                label: Some("A".to_string()),
            },
            Node {
                id: 1,
                ancestor: Some(2),
                children: vec![],
                edge_time: 0.1,
                label: Some("B".to_string()),
            },
            Node {
                id: 2,
                ancestor: None,
                children: vec![0, 1],
                edge_time: 0.0,
                label: None,
            },
        ];
        MarginalTree::new(nodes).unwrap()
    }

    #[test]
    fn rejects_tip_missing_from_alignment() {
        let tree = two_tip_tree();
        let mut seqs = HashMap::new();
        seqs.insert("A".to_string(), b"ACGT".to_vec());
        let err = AlignmentView::new(&tree, &seqs).unwrap_err();
        assert_eq!(
            err,
            Error::TipNotInAlignment {
                label: "B".to_string()
            }
        );
    }

    #[test]
    fn rejects_empty_alignment() {
        let tree = two_tip_tree();
        let mut seqs = HashMap::new();
        seqs.insert("A".to_string(), Vec::new());
        seqs.insert("B".to_string(), Vec::new());
        let err = AlignmentView::new(&tree, &seqs).unwrap_err();
        assert_eq!(err, Error::EmptyAlignment);
    }

    #[test]
    fn single_column_decodes_correctly() {
        let tree = two_tip_tree();
        let mut seqs = HashMap::new();
        seqs.insert("A".to_string(), b"A".to_vec());
        seqs.insert("B".to_string(), b"G".to_vec());
        let view = AlignmentView::new(&tree, &seqs).unwrap();
        assert_eq!(view.get(0, 0), Nucleotide::Adenine);
        assert_eq!(view.get(1, 0), Nucleotide::Guanine);
        assert_eq!(view.usable_mask(), vec![true]);
    }
}
