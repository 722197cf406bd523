//! Pure data transforms from the core's internal representations into the
//! shapes external writers consume (§6). No file I/O happens here.

use serde_derive::{Deserialize, Serialize};

use crate::ancestral::NodeSequenceMatrix;
use crate::hmm::ImportationState;
use crate::patterns::PatternTable;
use crate::tree::MarginalTree;

/// One row of a reconstructed-ancestor sequence table: a node's full
/// sequence across every alignment column, expanded back out from the
/// pattern-compressed representation. Serialisable so an external writer
/// can hand it straight to `serde_json`/`serde_yaml` without this crate
/// owning any file format itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AncestorSequenceRow {
    pub node_name: String,
    pub sequence: Vec<u8>,
}

/// Expand the node x pattern matrix into per-node full-length sequences.
/// Incompatible columns are emitted as `N` since no ancestral base was
/// reconstructed for them.
pub fn ancestor_sequences(
    tree: &MarginalTree,
    patterns: &PatternTable,
    node_nuc: &NodeSequenceMatrix,
    n_columns: usize,
) -> Vec<AncestorSequenceRow> {
    let mut rows = Vec::with_capacity(tree.internal_nodes().count());
    for node in tree.internal_nodes() {
        let mut sequence = vec![b'N'; n_columns];
        for s in 0..n_columns {
            if let Some(p) = patterns.ipat[s] {
                sequence[s] = node_nuc.get(node.id, p).to_byte();
            }
        }
        rows.push(AncestorSequenceRow {
            node_name: tree.display_name(node.id),
            sequence,
        });
    }
    rows
}

/// One row of the position cross-reference table (§6): for each alignment
/// column, whether it was compatible and, if so, which pattern it maps to.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionXref {
    pub column: usize,
    pub pattern: Option<usize>,
}

pub fn position_xref(patterns: &PatternTable) -> Vec<PositionXref> {
    patterns
        .ipat
        .iter()
        .enumerate()
        .map(|(column, &pattern)| PositionXref { column, pattern })
        .collect()
}

/// A maximal run of consecutive Imported columns on one branch, given as
/// an inclusive range over compatible-column indices (§6, GLOSSARY "import
/// tract").
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportedInterval {
    pub start: usize,
    pub end_inclusive: usize,
}

/// Collapse a Viterbi importation vector into its maximal Imported
/// intervals.
pub fn imported_intervals(path: &[ImportationState]) -> Vec<ImportedInterval> {
    let mut intervals = Vec::new();
    let mut run_start: Option<usize> = None;
    for (k, state) in path.iter().enumerate() {
        match (state, run_start) {
            (ImportationState::Imported, None) => run_start = Some(k),
            (ImportationState::Unimported, Some(start)) => {
                intervals.push(ImportedInterval {
                    start,
                    end_inclusive: k - 1,
                });
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        intervals.push(ImportedInterval {
            start,
            end_inclusive: path.len() - 1,
        });
    }
    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use ImportationState::{Imported, Unimported};

    #[test]
    fn imported_intervals_collapses_runs() {
        let path = vec![Unimported, Imported, Imported, Unimported, Imported];
        let intervals = imported_intervals(&path);
        assert_eq!(
            intervals,
            vec![
                ImportedInterval {
                    start: 1,
                    end_inclusive: 2
                },
                ImportedInterval {
                    start: 4,
                    end_inclusive: 4
                },
            ]
        );
    }

    #[test]
    fn imported_interval_open_at_end_of_path() {
        let path = vec![Unimported, Imported, Imported];
        let intervals = imported_intervals(&path);
        assert_eq!(
            intervals,
            vec![ImportedInterval {
                start: 1,
                end_inclusive: 2
            }]
        );
    }

    #[test]
    fn no_imported_columns_yields_no_intervals() {
        let path = vec![Unimported, Unimported];
        assert!(imported_intervals(&path).is_empty());
    }
}
