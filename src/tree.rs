//! The marginal tree arena (§3, §4.6).
//!
//! Construction from Newick text is out of scope; callers hand in the
//! already-resolved node set (ancestor indices, per-branch edge times, tip
//! labels) and this module owns the arena invariants: post-order indexing,
//! a single root at `2 * n_tips - 2`, and the two node-ordering comparators
//! used when writing nodes back out in a stable order.

use std::cmp::Ordering;

use derive_new::new;

use crate::errors::{Error, Result};

/// One node of the arena. Tips have no children; internal nodes have
/// exactly two. `ancestor` is `None` only for the root.
#[derive(Clone, Debug, PartialEq, new)]
pub struct Node {
    pub id: usize,
    pub ancestor: Option<usize>,
    pub children: Vec<usize>,
    /// Length of the branch above this node (ignored for the root).
    pub edge_time: f64,
    /// Present only on tips.
    pub label: Option<String>,
}

impl Node {
    pub fn is_tip(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.ancestor.is_none()
    }
}

/// The arena itself. Nodes are stored in post-order: every node's children
/// have strictly smaller indices. For `n` tips there are `2*n - 1` nodes in
/// total, indexed `0..2*n-2` inclusive, with the root at `2*n - 2`.
#[derive(Clone, Debug)]
pub struct MarginalTree {
    nodes: Vec<Node>,
    n_tips: usize,
}

impl MarginalTree {
    /// Build an arena from a caller-supplied node list, validating the
    /// binary-tree and post-order invariants. `nodes` must already be in
    /// post-order (children before parents); this function does not sort.
    pub fn new(nodes: Vec<Node>) -> Result<Self> {
        let n_tips = nodes.iter().filter(|n| n.is_tip()).count();

        for node in &nodes {
            let n_children = node.children.len();
            if n_children != 0 && n_children != 2 {
                return Err(Error::NonBinaryNode {
                    id: node.id,
                    n_children,
                });
            }
            for &child in &node.children {
                if child >= node.id {
                    return Err(Error::NonBinaryNode {
                        id: node.id,
                        n_children,
                    });
                }
            }
        }

        let mut seen_labels = std::collections::HashSet::new();
        for node in &nodes {
            if let Some(label) = &node.label {
                if !seen_labels.insert(label.clone()) {
                    return Err(Error::DuplicateTipLabel {
                        label: label.clone(),
                    });
                }
            }
        }

        Ok(MarginalTree { nodes, n_tips })
    }

    pub fn n_tips(&self) -> usize {
        self.n_tips
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Index of the root, `2 * n_tips - 2` for a fully bifurcating tree.
    pub fn root(&self) -> usize {
        self.nodes.len() - 1
    }

    /// The penultimate node is the root's first child when the root has a
    /// degree-2 (rather than degree-3) unrooted image; per the Design
    /// Notes' Open Question (a), its branch is special-cased to contribute
    /// likelihood 1 rather than being double-counted against the root.
    pub fn penultimate(&self) -> Option<usize> {
        self.nodes[self.root()].children.first().copied()
    }

    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn tips(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_tip())
    }

    pub fn internal_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| !n.is_tip())
    }

    /// Post-order iteration, excluding the root (every node with a branch
    /// above it): the natural iteration order for per-branch work.
    pub fn branches(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| !n.is_root())
    }

    /// Display name for a node: the supplied label for tips, `NODE_<id>`
    /// for internal nodes, matching the teacher's `SampleName` convention.
    pub fn display_name(&self, id: usize) -> String {
        match &self.nodes[id].label {
            Some(label) => label.clone(),
            None => format!("NODE_{}", id),
        }
    }
}

/// A node's "status" for ordering purposes: whether it is a tip or
/// internal. Tips sort before internal nodes in both comparators below.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum NodeStatus {
    Tip,
    Internal,
}

fn status(tree: &MarginalTree, id: usize) -> NodeStatus {
    if tree.node(id).is_tip() {
        NodeStatus::Tip
    } else {
        NodeStatus::Internal
    }
}

/// Cumulative age (root-to-node path length) used by both comparators.
fn age(tree: &MarginalTree, id: usize) -> f64 {
    let mut t = 0.0;
    let mut cur = id;
    while let Some(anc) = tree.node(cur).ancestor {
        t += tree.node(cur).edge_time;
        cur = anc;
    }
    t
}

/// Orders nodes by (status, age): tips before internal nodes, then by
/// increasing distance from the root (§4.6).
pub fn order_by_status_and_age(tree: &MarginalTree, a: usize, b: usize) -> Ordering {
    status(tree, a)
        .cmp(&status(tree, b))
        .then_with(|| age(tree, a).partial_cmp(&age(tree, b)).unwrap_or(Ordering::Equal))
}

/// Orders nodes by (status, label, age): as above, but tips additionally
/// break ties on their label before falling back to age (§4.6).
pub fn order_by_status_label_and_age(tree: &MarginalTree, a: usize, b: usize) -> Ordering {
    status(tree, a)
        .cmp(&status(tree, b))
        .then_with(|| {
            let la = tree.node(a).label.as_deref().unwrap_or("");
            let lb = tree.node(b).label.as_deref().unwrap_or("");
            la.cmp(lb)
        })
        .then_with(|| age(tree, a).partial_cmp(&age(tree, b)).unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tip(id: usize, ancestor: usize, edge_time: f64, label: &str) -> Node {
        Node::new(id, Some(ancestor), vec![], edge_time, Some(label.to_string()))
    }

    fn internal(id: usize, ancestor: Option<usize>, children: Vec<usize>, edge_time: f64) -> Node {
        Node {
            id,
            ancestor,
            children,
            edge_time,
            label: None,
        }
    }

    /// A 3-tip caterpillar: (A, B), C rooted at node 4.
    ///   0=A 1=B 2=C  3=(0,1)  4=(3,2)=root
    fn sample_tree() -> MarginalTree {
        let nodes = vec![
            tip(0, 3, 0.1, "A"),
            tip(1, 3, 0.2, "B"),
            tip(2, 4, 0.3, "C"),
            internal(3, Some(4), vec![0, 1], 0.05),
            internal(4, None, vec![3, 2], 0.0),
        ];
        MarginalTree::new(nodes).unwrap()
    }

    #[test]
    fn root_is_last_index() {
        let tree = sample_tree();
        assert_eq!(tree.root(), 4);
        assert_eq!(tree.n_tips(), 3);
    }

    #[test]
    fn penultimate_is_roots_first_child() {
        let tree = sample_tree();
        assert_eq!(tree.penultimate(), Some(3));
    }

    #[test]
    fn rejects_nonbinary_internal_node() {
        let nodes = vec![
            tip(0, 2, 0.1, "A"),
            tip(1, 2, 0.1, "B"),
            internal(2, None, vec![0, 1, 0], 0.0),
        ];
        let err = MarginalTree::new(nodes).unwrap_err();
        assert_eq!(
            err,
            Error::NonBinaryNode {
                id: 2,
                n_children: 3
            }
        );
    }

    #[test]
    fn rejects_duplicate_tip_labels() {
        let nodes = vec![
            tip(0, 2, 0.1, "A"),
            tip(1, 2, 0.1, "A"),
            internal(2, None, vec![0, 1], 0.0),
        ];
        let err = MarginalTree::new(nodes).unwrap_err();
        assert_eq!(
            err,
            Error::DuplicateTipLabel {
                label: "A".to_string()
            }
        );
    }

    #[test]
    fn display_name_uses_label_or_synthetic_name() {
        let tree = sample_tree();
        assert_eq!(tree.display_name(0), "A");
        assert_eq!(tree.display_name(3), "NODE_3");
    }

    #[test]
    fn status_and_age_orders_tips_before_internals() {
        let tree = sample_tree();
        assert_eq!(order_by_status_and_age(&tree, 0, 3), Ordering::Less);
        assert_eq!(order_by_status_and_age(&tree, 3, 0), Ordering::Greater);
    }

    #[test]
    fn status_label_and_age_breaks_tip_ties_by_label() {
        let tree = sample_tree();
        assert_eq!(order_by_status_label_and_age(&tree, 0, 1), Ordering::Less);
    }
}
