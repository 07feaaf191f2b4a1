//! Temporal binning and aggregation of irregular observations.
//!
//! Raw samples arrive at arbitrary dates with per-sample noise and wildly
//! uneven coverage. This module turns them into regular per-category
//! signals:
//!
//! ```text
//! (date, category, value)       bins × categories
//! ───────────────────────  ──►  ──────────────────
//! irregular, weighted,          fixed-width, smoothed,
//! possibly missing              optionally normalized
//! ```
//!
//! - [`bin_and_aggregate`] is the entry point
//! - [`DateBin`] is a left-open `(start, end]` interval
//! - [`PrevalenceTable`] is the dense output consumed by
//!   [`apply_clusters`](crate::cluster::apply_clusters)

mod aggregate;
mod bins;

pub use aggregate::{
    bin_and_aggregate, Aggregated, AggregateConfig, Observation, ObservationTable,
    PrevalenceTable, SmoothingWindow,
};
pub use bins::{assign_bin, bin_timestamp, clean_label, date_bins, DateBin};
