//! Greedy consolidation of groups into meta-groups.
//!
//! Legends with ten-plus entries are hard to read; this pass gathers
//! exclusive groups together with the selected groups nested under them,
//! producing a few coarse meta-groups. The pick order is a weight table
//! indexed by how many other selected roots sit under a candidate, times
//! the candidate's full-subtree prevalence.

use std::collections::HashMap;

use crate::cluster::splitter::Clusters;
use crate::hierarchy::LineageTree;
use crate::prevalence::{aggregate_prevalence, PrevalenceVector};

/// Default meta-group size weights: favor gathering 1-4 nested groups,
/// slightly tolerate 0 or many. Counts past the end of the table score 0.
pub const DEFAULT_COUNT_SCORES: [f64; 5] = [0.1, 4.0, 4.0, 4.0, 0.1];

/// Greedily aggregate groups into meta-groups.
///
/// Repeatedly picks the exclusive group maximizing
/// `count_scores[nested] * subtree_prevalence` (first-encountered maximum,
/// `V` in insertion order), emits it together with every still-unassigned
/// selected root below it, and removes them, until `V` is exhausted.
///
/// Each meta-group is sorted by alias ascending; the output is sorted by
/// first-member alias, descending, for stable legend ordering. Every
/// exclusive group appears in exactly one meta-group.
pub fn gather_groups(
    clusters: &Clusters,
    prevalences: &HashMap<String, f64>,
    tree: &LineageTree,
    count_scores: &[f64],
) -> Vec<Vec<usize>> {
    let values = PrevalenceVector::from_map(tree, prevalences);

    let mut u = clusters.inclusive.clone();
    let mut v = clusters.exclusive.clone();
    let mut in_uv = vec![false; tree.len()];
    for &x in u.iter().chain(v.iter()) {
        in_uv[x] = true;
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    while !v.is_empty() {
        let mut parent = v[0];
        let mut best = f64::NEG_INFINITY;
        for &cand in &v {
            let nested = tree
                .descendants(cand)
                .into_iter()
                .filter(|&d| in_uv[d])
                .count();
            let weight = count_scores.get(nested).copied().unwrap_or(0.0);
            let score = weight * aggregate_prevalence(tree, cand, &values, &[]);
            if score > best {
                best = score;
                parent = cand;
            }
        }

        let descendants = tree.descendants(parent);
        let mut group: Vec<usize> = std::iter::once(parent)
            .chain(descendants.iter().copied().filter(|&d| in_uv[d]))
            .collect();
        group.sort_by(|&a, &b| tree.node(a).alias.cmp(&tree.node(b).alias));
        groups.push(group);

        for &d in &descendants {
            in_uv[d] = false;
        }
        in_uv[parent] = false;
        v.retain(|&x| x != parent && !descendants.contains(&x));
        u.retain(|&x| !descendants.contains(&x));
    }

    groups.sort_by(|a, b| tree.node(b[0]).alias.cmp(&tree.node(a[0]).alias));
    groups
}

/// Root names (or aliases) for each meta-group, alias-descending within
/// each group.
pub fn group_root_names(
    groups: &[Vec<usize>],
    tree: &LineageTree,
    aliases: bool,
) -> Vec<Vec<String>> {
    groups
        .iter()
        .map(|g| {
            let mut sorted = g.clone();
            sorted.sort_by(|&a, &b| tree.node(b).alias.cmp(&tree.node(a).alias));
            sorted
                .into_iter()
                .map(|i| {
                    let node = tree.node(i);
                    if aliases {
                        node.alias.clone()
                    } else {
                        node.name.clone()
                    }
                })
                .collect()
        })
        .collect()
}

/// Exclusive prevalence for every member of every meta-group, alias-
/// descending within each group, with all group roots excluded from each
/// other's totals.
pub fn group_prevalences(
    groups: &[Vec<usize>],
    prevalences: &HashMap<String, f64>,
    tree: &LineageTree,
) -> Vec<Vec<f64>> {
    let values = PrevalenceVector::from_map(tree, prevalences);
    let all_roots: Vec<usize> = groups.iter().flatten().copied().collect();
    groups
        .iter()
        .map(|g| {
            let mut sorted = g.clone();
            sorted.sort_by(|&a, &b| tree.node(b).alias.cmp(&tree.node(a).alias));
            sorted
                .into_iter()
                .map(|i| aggregate_prevalence(tree, i, &values, &all_roots))
                .collect()
        })
        .collect()
}
