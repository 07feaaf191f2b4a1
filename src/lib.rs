//! # clade
//!
//! Greedy phylogenetic grouping and temporal aggregation for lineage
//! prevalence data.
//!
//! Surveillance feeds report prevalence for thousands of fine-grained
//! viral lineages at irregular dates. `clade` reduces that to something a
//! human can read: a handful of hierarchy-aware groups and smooth
//! per-group time series.
//!
//! ```text
//! raw observations ──► timeseries::bin_and_aggregate ──► bins × lineages
//!                                                              │
//! hierarchy ──► cluster::cluster_lineages ──► (U, V, K) ───────┤
//!                        │                                     ▼
//!                        └──► cluster::gather_groups   cluster::apply_clusters
//!                             (legend meta-groups)      ──► bins × groups
//! ```
//!
//! The crate does not fetch data, parse hierarchy files, or render
//! anything; it consumes a fully-formed hierarchy
//! ([`hierarchy::LineageTree`]) and raw observation rows, and produces
//! dense tables.

pub mod cluster;
/// Error types used across `clade`.
pub mod error;
pub mod hierarchy;
pub mod prevalence;
pub mod timeseries;


pub use cluster::{
    apply_clusters, cluster_lineages, gather_groups, group_prevalences, group_root_names,
    ClusterConfig, Clusters, GroupedTable, DEFAULT_COUNT_SCORES,
};
pub use error::{Error, Result};
pub use hierarchy::{
    validate_records, LineageKey, LineageNode, LineageRecord, LineageTree, Severity,
    ValidationIssue, ValidationReport, ROOT_NAME,
};
pub use prevalence::{aggregate_prevalence, AggregatedPrevalence, PrevalenceVector};
pub use timeseries::{
    bin_and_aggregate, clean_label, Aggregated, AggregateConfig, DateBin, Observation,
    ObservationTable, PrevalenceTable, SmoothingWindow,
};
