//! Projecting a binned prevalence table onto selected groups.
//!
//! The splitter picks group roots; this pass folds a bins × lineages table
//! into a bins × groups table. Every group's value is its exclusive
//! aggregate (its subtree minus all other selected roots), so inclusive
//! and exclusive groups alike come out of the same computation with the
//! full selection as the exclusion set.

use ndarray::Array2;
use tracing::warn;

use crate::cluster::splitter::Clusters;
use crate::error::{Error, Result};
use crate::hierarchy::{LineageKey, LineageTree};
use crate::prevalence::aggregate_prevalence_masked;
use crate::timeseries::PrevalenceTable;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Label of the catch-all column: the wildcard root's exclusive group.
const CATCH_ALL: &str = "other **";

/// Row sums below this are implausible for normalized data; the row is
/// marked missing instead of rescaled.
const PLAUSIBLE_ROW_SUM: f64 = 0.5;

/// A bins × groups table with per-column group metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedTable {
    /// Date bins, unchanged from the input table.
    pub bins: Vec<crate::timeseries::DateBin>,
    /// Display label per column: `"      <alias>*"` for inclusive groups,
    /// `"other <alias>*"` for exclusive ones, with the raw name appended
    /// when it differs from the alias.
    pub labels: Vec<String>,
    /// Root lineage name per column.
    pub roots: Vec<String>,
    /// Whether each column's group is inclusive.
    pub is_inclusive: Vec<bool>,
    /// Cell values, `bins.len() × labels.len()`.
    pub values: Array2<f64>,
}

impl GroupedTable {
    /// Value at (bin row, group column).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[[row, col]]
    }

    /// Column index of a label.
    pub fn column(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }
}

/// Aggregate the lineage columns of `table` into the selected groups.
///
/// Columns are ordered by group alias, ascending. With `normalize`, rows
/// summing below 0.5 are marked missing and the residual to 1.0 is folded
/// into the `other **` catch-all column, clipped to `[0, 1]`. With
/// `include_fixed`, fixed nodes are reported as inclusive groups instead
/// of being excluded from every total.
pub fn apply_clusters(
    table: &PrevalenceTable,
    clusters: &Clusters,
    tree: &LineageTree,
    key: Option<&LineageKey>,
    normalize: bool,
    include_fixed: bool,
) -> Result<GroupedTable> {
    let mut inclusive = clusters.inclusive.clone();
    let exclusive = clusters.exclusive.clone();
    let mut fixed = clusters.fixed.clone();
    if include_fixed {
        for k in fixed.drain(..) {
            if !inclusive.contains(&k) {
                inclusive.push(k);
            }
        }
    }

    // Selected roots with their inclusive flag, ordered by alias.
    let mut selected: Vec<(usize, bool)> = inclusive
        .iter()
        .map(|&i| (i, true))
        .chain(exclusive.iter().map(|&i| (i, false)))
        .collect();
    selected.sort_by(|a, b| tree.node(a.0).alias.cmp(&tree.node(b.0).alias));

    let labels: Vec<String> = selected
        .iter()
        .map(|&(i, inc)| {
            let node = tree.node(i);
            let mut label = if inc {
                format!("      {}*", node.alias)
            } else {
                format!("other {}*", node.alias)
            };
            if node.name != node.alias {
                label.push_str(&format!(" ({})", node.name));
            }
            label
        })
        .collect();
    let roots: Vec<String> = selected
        .iter()
        .map(|&(i, _)| tree.node(i).name.clone())
        .collect();
    let is_inclusive: Vec<bool> = selected.iter().map(|&(_, inc)| inc).collect();

    // Every selected or fixed root is excluded from every other total.
    let mut excluded = vec![false; tree.len()];
    for &(i, _) in &selected {
        excluded[i] = true;
    }
    for &k in &fixed {
        excluded[k] = true;
    }

    // Resolve table columns once; unknown lineages cannot contribute.
    let columns: Vec<Option<usize>> = table
        .categories
        .iter()
        .map(|name| {
            let resolved = match key {
                Some(key) => key.get(name),
                None => tree.index_of(name),
            };
            if resolved.is_none() {
                warn!(lineage = %name, "table column not in hierarchy; ignored");
            }
            resolved
        })
        .collect();

    let n_rows = table.n_bins();
    let n_groups = selected.len();
    let project_row = |r: usize| -> Vec<f64> {
        let mut dense = vec![0.0; tree.len()];
        for (j, col) in columns.iter().enumerate() {
            if let Some(idx) = *col {
                dense[idx] = table.get(r, j);
            }
        }
        selected
            .iter()
            .map(|&(i, _)| aggregate_prevalence_masked(tree, i, &dense, &excluded))
            .collect()
    };

    #[cfg(feature = "rayon")]
    let rows: Vec<Vec<f64>> = (0..n_rows).into_par_iter().map(project_row).collect();
    #[cfg(not(feature = "rayon"))]
    let rows: Vec<Vec<f64>> = (0..n_rows).map(project_row).collect();

    let mut values = Array2::<f64>::zeros((n_rows, n_groups));
    for (r, row) in rows.into_iter().enumerate() {
        for (c, v) in row.into_iter().enumerate() {
            values[[r, c]] = v;
        }
    }

    if normalize {
        let catch_all = labels
            .iter()
            .position(|l| l == CATCH_ALL)
            .ok_or(Error::InvalidParameter {
                name: "normalize",
                message: "no catch-all root column to absorb the residual",
            })?;

        for mut row in values.outer_iter_mut() {
            let sum: f64 = row.iter().filter(|x| !x.is_nan()).sum();
            if sum < PLAUSIBLE_ROW_SUM {
                row.fill(f64::NAN);
                continue;
            }
            let residual = 1.0 - sum;
            let cell = row[catch_all] + residual;
            row[catch_all] = if cell < 0.0 {
                0.0
            } else if cell > 1.0 {
                1.0
            } else {
                cell
            };
        }
    }

    Ok(GroupedTable {
        bins: table.bins.clone(),
        labels,
        roots,
        is_inclusive,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::splitter::{cluster_lineages, ClusterConfig};
    use crate::hierarchy::LineageRecord;
    use crate::timeseries::{date_bins, DateBin};
    use chrono::{Duration, NaiveDate};
    use std::collections::HashMap;

    fn test_bins(n: usize) -> Vec<DateBin> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_time(chrono::NaiveTime::MIN);
        date_bins(start, start + Duration::days(7 * n as i64), Duration::days(7))
    }

    fn setup() -> (LineageTree, Clusters) {
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
        let config = ClusterConfig::new().with_groups(3).with_alpha(0.0);
        let clusters = cluster_lineages(&prevalences, &tree, None, &config).unwrap();
        (tree, clusters)
    }

    fn input_table(values: Vec<Vec<f64>>, categories: Vec<&str>) -> PrevalenceTable {
        let n_rows = values.len();
        let n_cols = categories.len();
        let flat: Vec<f64> = values.into_iter().flatten().collect();
        PrevalenceTable {
            bins: test_bins(n_rows),
            categories: categories.into_iter().map(str::to_owned).collect(),
            values: Array2::from_shape_vec((n_rows, n_cols), flat).unwrap(),
        }
    }

    #[test]
    fn test_labels_and_flags() {
        let (tree, clusters) = setup();
        // U = [A.1], V = [*, A]; alias ascending: *, A, A.1.
        let table = input_table(
            vec![vec![0.4, 0.3, 0.3]],
            vec!["A.1", "A.2", "B"],
        );
        let out = apply_clusters(&table, &clusters, &tree, None, false, false).unwrap();

        assert_eq!(out.labels, vec!["other **", "other A*", "      A.1*"]);
        assert_eq!(out.roots, vec!["*", "A", "A.1"]);
        assert_eq!(out.is_inclusive, vec![false, false, true]);
    }

    #[test]
    fn test_exclusive_totals() {
        let (tree, clusters) = setup();
        let table = input_table(
            vec![vec![0.4, 0.3, 0.3]],
            vec!["A.1", "A.2", "B"],
        );
        let out = apply_clusters(&table, &clusters, &tree, None, false, false).unwrap();

        // "other *" keeps B, "other A" keeps A.2, A.1 keeps itself.
        assert!((out.get(0, 0) - 0.3).abs() < 1e-12);
        assert!((out.get(0, 1) - 0.3).abs() < 1e-12);
        assert!((out.get(0, 2) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_normalized_rows_sum_to_one() {
        let (tree, clusters) = setup();
        // Row sums to 0.9; the missing 0.1 lands in the catch-all.
        let table = input_table(
            vec![vec![0.4, 0.3, 0.2]],
            vec!["A.1", "A.2", "B"],
        );
        let out = apply_clusters(&table, &clusters, &tree, None, true, false).unwrap();

        let sum: f64 = (0..3).map(|c| out.get(0, c)).sum();
        assert!((sum - 1.0).abs() < 1e-12);
        let catch_all = out.column("other **").unwrap();
        assert!((out.get(0, catch_all) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_implausible_row_marked_missing() {
        let (tree, clusters) = setup();
        let table = input_table(
            vec![vec![0.1, 0.1, 0.1], vec![0.4, 0.3, 0.3]],
            vec!["A.1", "A.2", "B"],
        );
        let out = apply_clusters(&table, &clusters, &tree, None, true, false).unwrap();

        for c in 0..3 {
            assert!(out.get(0, c).is_nan(), "column {} should be missing", c);
            assert!(!out.get(1, c).is_nan());
        }
    }

    #[test]
    fn test_residual_clipped_to_unit_interval() {
        let (tree, clusters) = setup();
        // Row sums to 1.5: the catch-all would go negative and clips to 0.
        let table = input_table(
            vec![vec![0.8, 0.4, 0.3]],
            vec!["A.1", "A.2", "B"],
        );
        let out = apply_clusters(&table, &clusters, &tree, None, true, false).unwrap();
        let catch_all = out.column("other **").unwrap();
        assert_eq!(out.get(0, catch_all), 0.0);
    }

    #[test]
    fn test_include_fixed_reports_fixed_as_inclusive() {
        let tree = LineageTree::from_records(&[
            LineageRecord::new("A", "A", None),
            LineageRecord::new("B", "B", None),
        ])
        .unwrap();
        let b = tree.index_of("B").unwrap();
        let clusters = Clusters {
            inclusive: vec![tree.index_of("A").unwrap()],
            exclusive: vec![tree.root()],
            fixed: vec![b],
        };
        let table = input_table(vec![vec![0.6, 0.4]], vec!["A", "B"]);

        let without = apply_clusters(&table, &clusters, &tree, None, false, false).unwrap();
        assert_eq!(without.roots, vec!["*", "A"]);
        // B's mass is excluded from the root's "other" total.
        assert_eq!(without.get(0, without.column("other **").unwrap()), 0.0);

        let with = apply_clusters(&table, &clusters, &tree, None, false, true).unwrap();
        assert_eq!(with.roots, vec!["*", "A", "B"]);
        let b_col = with.column("      B*").unwrap();
        assert!((with.get(0, b_col) - 0.4).abs() < 1e-12);
        assert!(with.is_inclusive[b_col]);
    }

    #[test]
    fn test_unknown_column_ignored() {
        let (tree, clusters) = setup();
        let table = input_table(
            vec![vec![0.4, 0.3, 0.3, 9.0]],
            vec!["A.1", "A.2", "B", "XQ.9"],
        );
        let out = apply_clusters(&table, &clusters, &tree, None, false, false).unwrap();
        let total: f64 = (0..3).map(|c| out.get(0, c)).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_without_catch_all_rejected() {
        let tree = LineageTree::from_records(&[LineageRecord::new("A", "A", None)]).unwrap();
        let clusters = Clusters {
            inclusive: vec![tree.index_of("A").unwrap()],
            exclusive: vec![],
            fixed: vec![],
        };
        let table = input_table(vec![vec![1.0]], vec!["A"]);
        assert!(matches!(
            apply_clusters(&table, &clusters, &tree, None, true, false),
            Err(Error::InvalidParameter { name: "normalize", .. })
        ));
    }
}
