//! Greedy group-splitting on the lineage hierarchy.
//!
//! Starting from the root as one all-covering group, the splitter
//! repeatedly carves the highest-scoring child out of an existing group
//! until the requested number of groups is reached. Groups are either
//! **inclusive** (cover their whole subtree) or **exclusive** (their
//! subtree minus nested groups); carving a child out of an inclusive group
//! demotes it to exclusive. A pruning step drops exclusive groups whose
//! remaining mass falls below `alpha` times the mean inclusive mass, so
//! low-signal branches do not permanently occupy a slot.
//!
//! The heuristic's decision order is part of its contract. Candidates are
//! generated from `U` then `V`, each in insertion order, children in arena
//! order, and the first-encountered maximum (or minimum, for pruning) wins
//! every tie.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::hierarchy::{LineageKey, LineageTree};
use crate::prevalence::{AggregatedPrevalence, PrevalenceVector};

/// Configuration for [`cluster_lineages`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterConfig {
    /// Target number of groups.
    pub n: usize,
    /// Pruning sensitivity in `(0, 1)`; higher values drop more low-mass
    /// groups but can slow or prevent convergence.
    pub alpha: f64,
    /// Nodes treated as permanently fixed: their mass is removed up front
    /// and they are never candidates.
    pub fixed: Vec<usize>,
    /// Subtree to cluster from; defaults to the global root.
    pub root: Option<usize>,
    /// Iteration cap; defaults to `64 * n`.
    pub max_iter: Option<usize>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            n: 10,
            alpha: 0.15,
            fixed: Vec::new(),
            root: None,
            max_iter: None,
        }
    }
}

impl ClusterConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target group count.
    pub fn with_groups(mut self, n: usize) -> Self {
        self.n = n;
        self
    }

    /// Set the pruning sensitivity.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set permanently fixed nodes.
    pub fn with_fixed(mut self, fixed: Vec<usize>) -> Self {
        self.fixed = fixed;
        self
    }

    /// Cluster a subtree instead of the whole hierarchy.
    pub fn with_root(mut self, root: usize) -> Self {
        self.root = Some(root);
        self
    }

    /// Override the iteration cap.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = Some(max_iter);
        self
    }
}

/// Result of a clustering run: three pairwise-disjoint sets of group
/// roots, each in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clusters {
    /// Inclusive groups (`U`): the reported value covers the whole
    /// subtree.
    pub inclusive: Vec<usize>,
    /// Exclusive groups (`V`): the reported value excludes nested groups.
    pub exclusive: Vec<usize>,
    /// Fixed nodes (`K`): removed from candidacy; includes the global root
    /// when clustering was rooted below it.
    pub fixed: Vec<usize>,
}

impl Clusters {
    /// All selected group roots, `U` then `V`.
    pub fn selected(&self) -> impl Iterator<Item = usize> + '_ {
        self.inclusive.iter().chain(self.exclusive.iter()).copied()
    }

    /// Total number of groups.
    pub fn len(&self) -> usize {
        self.inclusive.len() + self.exclusive.len()
    }

    /// Whether no group was selected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Greedily partition the hierarchy into at most `config.n` groups.
///
/// `prevalences` maps lineage names to un-normalized prevalence; missing
/// lineages count as 0, unknown names are skipped with a warning. The
/// optional `key` is used for name resolution when present (the tree
/// resolves names itself otherwise).
///
/// Terminates early when no candidate is left, returning fewer groups than
/// requested. Returns [`Error::Stalled`] if pruning keeps cancelling
/// progress past the iteration cap.
pub fn cluster_lineages(
    prevalences: &HashMap<String, f64>,
    tree: &LineageTree,
    key: Option<&LineageKey>,
    config: &ClusterConfig,
) -> Result<Clusters> {
    if config.alpha < 0.0 || config.alpha >= 1.0 {
        return Err(Error::InvalidParameter {
            name: "alpha",
            message: "must be in [0, 1)",
        });
    }

    let mut raw = vec![0.0; tree.len()];
    for (name, &value) in prevalences {
        let resolved = match key {
            Some(key) => key.get(name),
            None => tree.index_of(name),
        };
        match resolved {
            Some(idx) => raw[idx] = value,
            None => warn!(lineage = %name, "prevalence for unknown lineage skipped"),
        }
    }
    let values = PrevalenceVector::from_dense(raw);
    let mut agg = AggregatedPrevalence::new(tree, &values);

    let n_nodes = tree.len();
    let start = config.root.unwrap_or_else(|| tree.root());

    // Remove fixed mass up front. Each fixed node's cascade is frozen by
    // the fixed nodes already processed, so no ancestor is double-adjusted
    // for the same subtraction.
    let mut fixed: Vec<usize> = Vec::with_capacity(config.fixed.len());
    let mut in_fixed = vec![false; n_nodes];
    let mut processed = vec![false; n_nodes];
    for &k in &config.fixed {
        if in_fixed[k] {
            continue;
        }
        agg.update_ancestors(tree, k, -agg.get(k), &processed);
        processed[k] = true;
        in_fixed[k] = true;
        fixed.push(k);
    }

    let true_root = tree.global_root_from(start);

    let mut u: Vec<usize> = vec![start];
    let mut v: Vec<usize> = Vec::new();
    let mut in_u = vec![false; n_nodes];
    let mut in_v = vec![false; n_nodes];
    let mut in_uvk = in_fixed.clone();
    in_u[start] = true;
    in_uvk[start] = true;

    let cap = config.max_iter.unwrap_or(64 * config.n.max(1));
    let mut iterations = 0usize;

    while u.len() + v.len() < config.n {
        iterations += 1;
        if iterations > cap {
            return Err(Error::Stalled { iterations: cap });
        }

        // Highest agg(child) * agg(parent) among children of current
        // groups; first-encountered maximum wins.
        let mut best: Option<(usize, f64)> = None;
        for &group in u.iter().chain(v.iter()) {
            for &c in &tree.node(group).children {
                if in_uvk[c] {
                    continue;
                }
                let score = agg.get(c) * agg.get(tree.node(c).parent);
                if best.map_or(true, |(_, b)| score > b) {
                    best = Some((c, score));
                }
            }
        }
        let Some((add_node, score)) = best else {
            // Candidates exhausted; return what was reachable.
            break;
        };
        let split_node = tree.node(add_node).parent;

        agg.update_ancestors(tree, add_node, -agg.get(add_node), &in_uvk);

        if in_u[split_node] {
            in_u[split_node] = false;
            u.retain(|&x| x != split_node);
            in_v[split_node] = true;
            v.push(split_node);
        }

        // A new group that still contains other groups is exclusive.
        let in_uv: Vec<bool> = in_u
            .iter()
            .zip(in_v.iter())
            .map(|(&a, &b)| a || b)
            .collect();
        if tree.subtree_intersects(add_node, &in_uv) {
            in_v[add_node] = true;
            v.push(add_node);
        } else {
            in_u[add_node] = true;
            u.push(add_node);
        }
        in_uvk[add_node] = true;
        debug!(
            lineage = %tree.node(add_node).name,
            score,
            inclusive = u.len(),
            exclusive = v.len(),
            "split"
        );

        // Prune the weakest exclusive group when it falls below alpha
        // times the mean inclusive mass. The given root is never pruned,
        // and a pruned group does not count toward n.
        if u.len() > 1 {
            let drop_candidates: Vec<usize> =
                v.iter().copied().filter(|&x| x != start).collect();
            if drop_candidates.len() > 1 {
                let mut drop_node = drop_candidates[0];
                let mut drop_agg = agg.get(drop_node);
                for &d in &drop_candidates[1..] {
                    if agg.get(d) < drop_agg {
                        drop_agg = agg.get(d);
                        drop_node = d;
                    }
                }
                let mean_u: f64 =
                    u.iter().map(|&x| agg.get(x)).sum::<f64>() / u.len() as f64;
                if drop_agg < config.alpha * mean_u {
                    in_v[drop_node] = false;
                    in_uvk[drop_node] = in_fixed[drop_node];
                    v.retain(|&x| x != drop_node);
                    agg.update_ancestors(tree, drop_node, agg.get(drop_node), &in_uvk);
                    debug!(lineage = %tree.node(drop_node).name, "pruned");
                }
            }
        }
    }

    if true_root != start && !fixed.contains(&true_root) {
        fixed.push(true_root);
    }

    Ok(Clusters {
        inclusive: u,
        exclusive: v,
        fixed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::LineageRecord;

    fn tree_and_prevalences() -> (LineageTree, HashMap<String, f64>) {
        let tree = LineageTree::from_records(&[
            LineageRecord::new("A", "A", None),
            LineageRecord::new("B", "B", None),
            LineageRecord::new("A.1", "A.1", Some("A")),
            LineageRecord::new("A.2", "A.2", Some("A")),
        ])
        .unwrap();
        let prevalences = HashMap::from([
            ("A.1".to_string(), 0.4),
            ("A.2".to_string(), 0.3),
            ("B".to_string(), 0.3),
        ]);
        (tree, prevalences)
    }

    #[test]
    fn test_golden_three_groups() {
        let (tree, prevalences) = tree_and_prevalences();
        let config = ClusterConfig::new().with_groups(3).with_alpha(0.0);
        let clusters = cluster_lineages(&prevalences, &tree, None, &config).unwrap();

        // First split carves A (0.7 * 1.0) out of the root, demoting the
        // root; second carves A.1 (0.4 * 0.7) out of A, demoting A.
        let a = tree.index_of("A").unwrap();
        let a1 = tree.index_of("A.1").unwrap();
        assert_eq!(clusters.inclusive, vec![a1]);
        assert_eq!(clusters.exclusive, vec![tree.root(), a]);
        assert!(clusters.fixed.is_empty());
    }

    #[test]
    fn test_disjoint_and_bounded() {
        let (tree, prevalences) = tree_and_prevalences();
        for n in 1..=5 {
            let config = ClusterConfig::new().with_groups(n).with_alpha(0.0);
            let clusters = cluster_lineages(&prevalences, &tree, None, &config).unwrap();
            assert!(clusters.len() <= n);

            let mut all: Vec<usize> = clusters.selected().collect();
            all.extend(&clusters.fixed);
            let before = all.len();
            all.sort_unstable();
            all.dedup();
            assert_eq!(all.len(), before, "U, V, K overlap at n={}", n);
        }
    }

    #[test]
    fn test_root_always_in_u_or_k() {
        let (tree, prevalences) = tree_and_prevalences();
        let config = ClusterConfig::new().with_groups(4).with_alpha(0.0);
        let clusters = cluster_lineages(&prevalences, &tree, None, &config).unwrap();
        let root = tree.root();
        assert!(
            clusters.inclusive.contains(&root)
                || clusters.exclusive.contains(&root)
                || clusters.fixed.contains(&root)
        );
    }

    #[test]
    fn test_unreachable_n_terminates() {
        let (tree, prevalences) = tree_and_prevalences();
        let config = ClusterConfig::new().with_groups(50).with_alpha(0.0);
        let clusters = cluster_lineages(&prevalences, &tree, None, &config).unwrap();
        // 5 nodes total; every node becomes a group and the loop stops.
        assert_eq!(clusters.len(), tree.len());
    }

    #[test]
    fn test_subroot_adds_global_root_to_fixed() {
        let (tree, prevalences) = tree_and_prevalences();
        let a = tree.index_of("A").unwrap();
        let config = ClusterConfig::new().with_groups(2).with_alpha(0.0).with_root(a);
        let clusters = cluster_lineages(&prevalences, &tree, None, &config).unwrap();
        assert!(clusters.fixed.contains(&tree.root()));
    }

    #[test]
    fn test_fixed_mass_removed() {
        let (tree, prevalences) = tree_and_prevalences();
        let a = tree.index_of("A").unwrap();
        let b = tree.index_of("B").unwrap();
        let config = ClusterConfig::new()
            .with_groups(2)
            .with_alpha(0.0)
            .with_fixed(vec![a]);
        let clusters = cluster_lineages(&prevalences, &tree, None, &config).unwrap();

        // With A's 0.7 gone, B is the only candidate worth carving.
        assert!(clusters.inclusive.contains(&b));
        assert!(!clusters.selected().any(|x| x == a));
        assert_eq!(clusters.fixed, vec![a]);
    }

    #[test]
    fn test_invalid_alpha() {
        let (tree, prevalences) = tree_and_prevalences();
        let config = ClusterConfig::new().with_alpha(1.0);
        assert!(matches!(
            cluster_lineages(&prevalences, &tree, None, &config),
            Err(Error::InvalidParameter { name: "alpha", .. })
        ));
    }

    #[test]
    fn test_pruning_oscillation_stalls() {
        // Two sibling branches with all mass in the grandchildren. Once
        // both grandchildren are inclusive groups, every re-added branch
        // node has zero mass and is pruned again; n = 6 is unreachable.
        let tree = LineageTree::from_records(&[
            LineageRecord::new("A", "A", None),
            LineageRecord::new("B", "B", None),
            LineageRecord::new("A.1", "A.1", Some("A")),
            LineageRecord::new("B.1", "B.1", Some("B")),
        ])
        .unwrap();
        let prevalences = HashMap::from([
            ("A.1".to_string(), 0.5),
            ("B.1".to_string(), 0.5),
        ]);
        let config = ClusterConfig::new()
            .with_groups(6)
            .with_alpha(0.9)
            .with_max_iter(200);
        assert!(matches!(
            cluster_lineages(&prevalences, &tree, None, &config),
            Err(Error::Stalled { iterations: 200 })
        ));
    }

    #[test]
    fn test_key_resolution_matches_tree_resolution() {
        let (tree, prevalences) = tree_and_prevalences();
        let key = tree.lineage_key();
        let config = ClusterConfig::new().with_groups(3).with_alpha(0.0);
        let with_key = cluster_lineages(&prevalences, &tree, Some(&key), &config).unwrap();
        let without = cluster_lineages(&prevalences, &tree, None, &config).unwrap();
        assert_eq!(with_key, without);
    }
}
