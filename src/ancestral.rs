//! Maximum-likelihood ancestral sequence reconstruction via Felsenstein
//! pruning with down-pass traceback (§4.2).

use crate::errors::{Error, Result};
use crate::logscale::ExtReal;
use crate::nucleotide::{BaseFrequencies, Nucleotide, CERTAIN};
use crate::patterns::PatternTable;
use crate::substitution::hky85_ptrans;
use crate::tree::MarginalTree;

/// Conditional likelihood vector over the four certain bases.
type Likelihoods = [f64; 4];

fn tip_likelihoods(nuc: Nucleotide) -> Likelihoods {
    if nuc.is_ambiguous() {
        [1.0; 4]
    } else {
        let mut l = [0.0; 4];
        l[nuc.index()] = 1.0;
        l
    }
}

/// `node_nuc[node_id][pattern]` holds the reconstructed (or observed, for
/// tips) nucleotide.
#[derive(Clone, Debug)]
pub struct NodeSequenceMatrix {
    pub(crate) data: Vec<Vec<Nucleotide>>,
}

impl NodeSequenceMatrix {
    pub fn get(&self, node_id: usize, pattern: usize) -> Nucleotide {
        self.data[node_id][pattern]
    }

    pub fn n_nodes(&self) -> usize {
        self.data.len()
    }
}

/// Result of ancestral reconstruction: the node x pattern matrix, plus the
/// extended-precision tree-wide likelihood (product of per-pattern root
/// likelihoods raised to `cpat`).
pub struct AncestralResult {
    pub node_nuc: NodeSequenceMatrix,
    pub likelihood: ExtReal,
}

/// Reconstruct maximum-likelihood ancestral nucleotides at every internal
/// node, for every pattern, under HKY85 with frequencies `freqs` and
/// transition/transversion ratio `kappa`.
pub fn reconstruct(
    tree: &MarginalTree,
    patterns: &PatternTable,
    freqs: &BaseFrequencies,
    kappa: f64,
) -> Result<AncestralResult> {
    for node in tree.internal_nodes() {
        if node.children.len() != 2 {
            return Err(Error::NonBinaryNode {
                id: node.id,
                n_children: node.children.len(),
            });
        }
    }

    let n_patterns = patterns.n_patterns();
    let n_nodes = tree.n_nodes();
    let mut data: Vec<Vec<Nucleotide>> = vec![vec![Nucleotide::Ambiguous; n_patterns]; n_nodes];

    let tip_order: Vec<usize> = tree.tips().map(|n| n.id).collect();

    let mut log_likelihood = 0.0_f64;

    for (p, pattern_bases) in patterns.bases.iter().enumerate() {
        let mut up_likelihoods: Vec<Likelihoods> = vec![[0.0; 4]; n_nodes];

        for (i, &tip_id) in tip_order.iter().enumerate() {
            let nuc = pattern_bases[i];
            data[tip_id][p] = nuc;
            up_likelihoods[tip_id] = tip_likelihoods(nuc);
        }

        for node in tree.nodes() {
            if node.is_tip() {
                continue;
            }
            let mut combined = [1.0_f64; 4];
            for &child in &node.children {
                let child_node = tree.node(child);
                let pt = hky85_ptrans(child_node.edge_time, kappa, freqs);
                let child_l = up_likelihoods[child];
                let mut contrib = [0.0; 4];
                for (i, &anc_nuc) in CERTAIN.iter().enumerate() {
                    let mut s = 0.0;
                    for (j, &desc_nuc) in CERTAIN.iter().enumerate() {
                        s += pt.get(anc_nuc, desc_nuc) * child_l[j];
                    }
                    contrib[i] = s;
                    let _ = i;
                }
                for i in 0..4 {
                    combined[i] *= contrib[i];
                }
            }
            up_likelihoods[node.id] = combined;
        }

        let root = tree.root();
        let root_l = up_likelihoods[root];
        let mut pattern_likelihood = 0.0;
        for (i, &nuc) in CERTAIN.iter().enumerate() {
            pattern_likelihood += freqs.get(nuc) * root_l[i];
        }
        let cpat = patterns.cpat[p] as f64;
        log_likelihood += cpat * pattern_likelihood.ln();

        // Down-pass argmax traceback: assign the root's own base first,
        // then propagate root-to-tips.
        let mut assigned = vec![None; n_nodes];
        let root_base = argmax_weighted(&root_l, freqs);
        assigned[root] = Some(root_base);
        data[root][p] = root_base;

        for node in tree.nodes().iter().rev() {
            if node.is_tip() || node.id == root {
                continue;
            }
            let parent_base = assigned[node.ancestor.expect("non-root node has an ancestor")]
                .expect("ancestor assigned before descendant in post-order traceback");
            let pt = hky85_ptrans(node.edge_time, kappa, freqs);
            let my_l = up_likelihoods[node.id];
            let base = argmax_given_parent(&my_l, parent_base, &pt);
            assigned[node.id] = Some(base);
            data[node.id][p] = base;
        }
    }

    Ok(AncestralResult {
        node_nuc: NodeSequenceMatrix { data },
        likelihood: ExtReal::from_log(log_likelihood),
    })
}

/// Argmax of `pi_i * L(i)` over the four certain bases, ties broken by
/// smallest nucleotide index.
fn argmax_weighted(likelihoods: &Likelihoods, freqs: &BaseFrequencies) -> Nucleotide {
    let mut best_idx = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, &nuc) in CERTAIN.iter().enumerate() {
        let val = freqs.get(nuc) * likelihoods[i];
        if val > best_val {
            best_val = val;
            best_idx = i;
        }
    }
    Nucleotide::from_index(best_idx)
}

/// Argmax of `L(i) * P_above(i -> parent_base)` over the four certain
/// bases, ties broken by smallest nucleotide index.
fn argmax_given_parent(
    likelihoods: &Likelihoods,
    parent_base: Nucleotide,
    pt: &crate::substitution::TransitionMatrix,
) -> Nucleotide {
    let mut best_idx = 0;
    let mut best_val = f64::NEG_INFINITY;
    for (i, &nuc) in CERTAIN.iter().enumerate() {
        let val = likelihoods[i] * pt.get(nuc, parent_base);
        if val > best_val {
            best_val = val;
            best_idx = i;
        }
    }
    Nucleotide::from_index(best_idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::AlignmentView;
    use crate::patterns::{compress_patterns, compute_compatibility};
    use crate::tree::Node;
    use std::collections::HashMap;

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

    /// Scenario S1: two tips, one column, A vs G, uniform pi, kappa=2.
    #[test]
    fn s1_two_tips_one_column() {
        let tree = two_tip_tree();
        let mut seqs = HashMap::new();
        seqs.insert("A".to_string(), b"A".to_vec());
        seqs.insert("B".to_string(), b"G".to_vec());
        let view = AlignmentView::new(&tree, &seqs).unwrap();
        let mask = compute_compatibility(&tree, &view, false);
        let patterns = compress_patterns(&view, &mask);
        assert_eq!(patterns.n_patterns(), 1);
        assert_eq!(patterns.cpat[0], 1);

        let freqs = BaseFrequencies::uniform();
        let result = reconstruct(&tree, &patterns, &freqs, 2.0).unwrap();
        // Root base must be one of the four certain bases; the pattern
        // likelihood must be finite and positive.
        let root = tree.root();
        let root_base = result.node_nuc.get(root, 0);
        assert!(CERTAIN.contains(&root_base));
        assert!(result.likelihood.is_finite_log());
    }

    #[test]
    fn rejects_nonbinary_tree() {
        let nodes = vec![
            Node {
                id: 0,
                ancestor: Some(3),
                children: vec![],
                edge_time: 0.1,
                label: Some("A".to_string()),
            },
            Node {
                id: 1,
                ancestor: Some(3),
                children: vec![],
                edge_time: 0.1,
                label: Some("B".to_string()),
            },
            Node {
                id: 2,
                ancestor: Some(3),
                children: vec![],
                edge_time: 0.1,
                label: Some("C".to_string()),
            },
            Node {
                id: 3,
                ancestor: None,
                children: vec![0, 1, 2],
                edge_time: 0.0,
                label: None,
            },
        ];
        // MarginalTree::new itself already rejects this; ancestral's own
        // guard is exercised by constructing a matrix by hand would be
        // redundant, so this documents the invariant at the tree layer.
        assert!(MarginalTree::new(nodes).is_err());
    }
}
