//! Compatibility filtering and pattern compression (§4.4).

use std::collections::HashMap;

use itertools::Itertools;

use crate::alignment::AlignmentView;
use crate::nucleotide::Nucleotide;
use crate::tree::MarginalTree;

/// Per-column compatibility diagnostics: whether the column is usable in
/// the likelihood at all, and whether it contains any ambiguous base.
#[derive(Clone, Debug, PartialEq)]
pub struct CompatibilityMask {
    pub iscompat: Vec<bool>,
    pub any_n: Vec<bool>,
}

/// Four-gamete-style compatibility test: a column is compatible with the
/// fixed topology iff every bipartition it induces over the tips is also
/// induced by some edge of the tree.
fn bipartitions_match_tree(tree: &MarginalTree, column: &HashMap<usize, Nucleotide>) -> bool {
    let mut by_base: HashMap<Nucleotide, Vec<usize>> = HashMap::new();
    for (&tip_id, &nuc) in column {
        by_base.entry(nuc).or_default().push(tip_id);
    }
    if by_base.len() <= 1 {
        return true;
    }

    let n_tips = column.len();

    if by_base.len() == 2 {
        // A biallelic column induces a single bipartition {group, rest}; the
        // two sides are each other's complement, so it suffices that one
        // side equals a clade.
        return by_base
            .values()
            .any(|group| group.len() != n_tips && edge_splits_exactly(tree, group));
    }

    // With more than two bases, each induced bipartition is independent and
    // must individually equal the tip set on one side of some tree edge.
    for group in by_base.values() {
        if group.len() == n_tips {
            continue;
        }
        if !edge_splits_exactly(tree, group) {
            return false;
        }
    }
    true
}

/// True if some edge of the tree separates exactly the tip set `group`
/// from the rest.
fn edge_splits_exactly(tree: &MarginalTree, group: &[usize]) -> bool {
    let target: std::collections::HashSet<usize> = group.iter().copied().collect();
    for node in tree.nodes() {
        if node.is_root() {
            continue;
        }
        let clade = tips_below(tree, node.id);
        if clade == target {
            return true;
        }
    }
    group.len() == 1
}

fn tips_below(tree: &MarginalTree, id: usize) -> std::collections::HashSet<usize> {
    let node = tree.node(id);
    if node.is_tip() {
        let mut s = std::collections::HashSet::new();
        s.insert(id);
        return s;
    }
    let mut s = std::collections::HashSet::new();
    for &child in &node.children {
        s.extend(tips_below(tree, child));
    }
    s
}

/// Count of occurrences of the least-frequent base in a column; used for
/// singleton purging.
fn minor_allele_count(column: &HashMap<usize, Nucleotide>) -> usize {
    column
        .values()
        .copied()
        .counts()
        .values()
        .copied()
        .min()
        .unwrap_or(0)
}

/// Compute the compatibility mask over every column of `alignment`.
/// Columns with any ambiguous base are always marked incompatible, and
/// optionally singletons (minor allele count == 1) are purged too.
pub fn compute_compatibility(
    tree: &MarginalTree,
    alignment: &AlignmentView,
    purge_singletons: bool,
) -> CompatibilityMask {
    let n = alignment.n_columns();
    let mut iscompat = vec![false; n];
    let mut any_n = vec![false; n];

    for s in 0..n {
        let column: HashMap<usize, Nucleotide> = alignment.column(s).collect();
        let has_ambiguous = column.values().any(|n| n.is_ambiguous());
        any_n[s] = has_ambiguous;
        if has_ambiguous {
            continue;
        }
        if purge_singletons && minor_allele_count(&column) == 1 && column.len() > 1 {
            let distinct: std::collections::HashSet<Nucleotide> =
                column.values().copied().collect();
            if distinct.len() > 1 {
                continue;
            }
        }
        iscompat[s] = bipartitions_match_tree(tree, &column);
    }

    CompatibilityMask { iscompat, any_n }
}

/// The compressed pattern table over compatible columns (§3 Data Model).
#[derive(Clone, Debug, PartialEq)]
pub struct PatternTable {
    /// One representative alignment column per pattern.
    pub pat1: Vec<usize>,
    /// Number of compatible columns sharing each pattern.
    pub cpat: Vec<usize>,
    /// Pattern index for every compatible alignment column, `None` for
    /// incompatible columns. Length equals the alignment's column count.
    pub ipat: Vec<Option<usize>>,
    /// `bases[p][tip_order_index]` is the nucleotide of pattern `p` at that
    /// tip, in `AlignmentView::tip_ids()` order.
    pub bases: Vec<Vec<Nucleotide>>,
}

impl PatternTable {
    pub fn n_patterns(&self) -> usize {
        self.pat1.len()
    }

    pub fn n_compatible_columns(&self) -> usize {
        self.cpat.iter().sum()
    }
}

/// Build the pattern table from the compatibility mask, grouping compatible
/// columns by identical per-tip nucleotide vectors in canonical
/// (lexicographic-over-tip-index) order.
pub fn compress_patterns(alignment: &AlignmentView, mask: &CompatibilityMask) -> PatternTable {
    let tip_ids = alignment.tip_ids();
    let mut pattern_index: HashMap<Vec<Nucleotide>, usize> = HashMap::new();
    let mut pat1 = Vec::new();
    let mut cpat = Vec::new();
    let mut bases = Vec::new();
    let mut ipat = vec![None; alignment.n_columns()];

    for s in 0..alignment.n_columns() {
        if !mask.iscompat[s] {
            continue;
        }
        let vector: Vec<Nucleotide> = tip_ids.iter().map(|&id| alignment.get(id, s)).collect();
        let idx = *pattern_index.entry(vector.clone()).or_insert_with(|| {
            pat1.push(s);
            cpat.push(0);
            bases.push(vector);
            pat1.len() - 1
        });
        cpat[idx] += 1;
        ipat[s] = Some(idx);
    }

    PatternTable {
        pat1,
        cpat,
        ipat,
        bases,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;
    use std::collections::HashMap as Map;

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

    /// `(((A,B),C),D)`: node 2 = (A,B), node 4 = (2,C), root = (4,D).
    fn asymmetric_four_tip_tree() -> MarginalTree {
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
                ancestor: Some(4),
                children: vec![0, 1],
                edge_time: 0.1,
                label: None,
            },
            Node {
                id: 3,
                ancestor: Some(4),
                children: vec![],
                edge_time: 0.1,
                label: Some("C".to_string()),
            },
            Node {
                id: 4,
                ancestor: Some(6),
                children: vec![2, 3],
                edge_time: 0.1,
                label: None,
            },
            Node {
                id: 5,
                ancestor: Some(6),
                children: vec![],
                edge_time: 0.1,
                label: Some("D".to_string()),
            },
            Node {
                id: 6,
                ancestor: None,
                children: vec![4, 5],
                edge_time: 0.0,
                label: None,
            },
        ];
        MarginalTree::new(nodes).unwrap()
    }

    #[test]
    fn biallelic_split_compatible_when_only_one_side_is_a_clade() {
        // {A,B} is node 3's clade; {C,D} is not any single node's clade
        // (it is the clade's complement), but the split is still
        // tree-consistent and must be marked compatible.
        let tree = asymmetric_four_tip_tree();
        let mut seqs = Map::new();
        seqs.insert("A".to_string(), b"A".to_vec());
        seqs.insert("B".to_string(), b"A".to_vec());
        seqs.insert("C".to_string(), b"G".to_vec());
        seqs.insert("D".to_string(), b"G".to_vec());
        let view = AlignmentView::new(&tree, &seqs).unwrap();
        let mask = compute_compatibility(&tree, &view, false);
        assert_eq!(mask.iscompat, vec![true]);
    }

    #[test]
    fn two_tip_single_column_is_compatible() {
        let tree = two_tip_tree();
        let mut seqs = Map::new();
        seqs.insert("A".to_string(), b"A".to_vec());
        seqs.insert("B".to_string(), b"G".to_vec());
        let view = AlignmentView::new(&tree, &seqs).unwrap();
        let mask = compute_compatibility(&tree, &view, false);
        assert_eq!(mask.iscompat, vec![true]);
        assert_eq!(mask.any_n, vec![false]);
    }

    #[test]
    fn ambiguous_column_is_incompatible() {
        let tree = two_tip_tree();
        let mut seqs = Map::new();
        seqs.insert("A".to_string(), b"N".to_vec());
        seqs.insert("B".to_string(), b"G".to_vec());
        let view = AlignmentView::new(&tree, &seqs).unwrap();
        let mask = compute_compatibility(&tree, &view, false);
        assert_eq!(mask.iscompat, vec![false]);
        assert_eq!(mask.any_n, vec![true]);
    }

    #[test]
    fn pattern_table_sums_to_compatible_column_count() {
        let tree = two_tip_tree();
        let mut seqs = Map::new();
        seqs.insert("A".to_string(), b"AAG".to_vec());
        seqs.insert("B".to_string(), b"GGG".to_vec());
        let view = AlignmentView::new(&tree, &seqs).unwrap();
        let mask = compute_compatibility(&tree, &view, false);
        let table = compress_patterns(&view, &mask);
        let n_compat = mask.iscompat.iter().filter(|&&b| b).count();
        assert_eq!(table.n_compatible_columns(), n_compat);
        assert_eq!(table.cpat.iter().sum::<usize>(), table.n_compatible_columns());
    }

    #[test]
    fn ipat_round_trips_into_pattern_bases() {
        let tree = two_tip_tree();
        let mut seqs = Map::new();
        seqs.insert("A".to_string(), b"AAG".to_vec());
        seqs.insert("B".to_string(), b"GGG".to_vec());
        let view = AlignmentView::new(&tree, &seqs).unwrap();
        let mask = compute_compatibility(&tree, &view, false);
        let table = compress_patterns(&view, &mask);
        for s in 0..view.n_columns() {
            if let Some(p) = table.ipat[s] {
                let original: Vec<Nucleotide> = view
                    .tip_ids()
                    .iter()
                    .map(|&id| view.get(id, s))
                    .collect();
                assert_eq!(table.bases[p], original);
            }
        }
    }
}
