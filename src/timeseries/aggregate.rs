//! Weighted temporal binning and aggregation of raw observations.
//!
//! Irregular per-sample observations are bucketed into fixed-width date
//! bins, summed under per-sample weights, smoothed along the bin axis with
//! a convolution kernel, and optionally normalized so each bin's categories
//! sum to 1. Aggregation runs in linear space (arithmetic mean) or log
//! space (geometric mean). A matching variance table can be produced from
//! the weighted squared deviations, rescaled in log space by the squared
//! prevalence (a first-order propagation-of-error approximation).
//!
//! Missing values are handled by the `trust` weight: at `trust = 1` a
//! missing value is treated as a true zero with full weight, at `trust = 0`
//! it is excluded from the denominator entirely, and fractional values
//! interpolate.

use std::collections::{BTreeSet, HashMap};

use chrono::{Duration, NaiveDate};
use ndarray::Array2;

use super::bins::{assign_bin, bin_timestamp, clean_label, date_bins, DateBin};
use crate::error::{Error, Result};

const LOG_EPS: f64 = 1e-8;

/// One raw sample: a dated, categorized, possibly-missing value.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Sample collection date.
    pub date: NaiveDate,
    /// Category label (cleaned before binning).
    pub category: String,
    /// Measured value; `None` for a recorded-but-missing measurement.
    pub value: Option<f64>,
}

impl Observation {
    /// Convenience constructor for a present value.
    pub fn new(date: NaiveDate, category: impl Into<String>, value: f64) -> Self {
        Self {
            date,
            category: category.into(),
            value: Some(value),
        }
    }

    /// Convenience constructor for a missing value.
    pub fn missing(date: NaiveDate, category: impl Into<String>) -> Self {
        Self {
            date,
            category: category.into(),
            value: None,
        }
    }
}

/// A flat table of raw observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationTable {
    rows: Vec<Observation>,
}

impl ObservationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing rows.
    pub fn from_rows(rows: Vec<Observation>) -> Self {
        Self { rows }
    }

    /// Append one observation.
    pub fn push(&mut self, row: Observation) {
        self.rows.push(row);
    }

    /// The rows.
    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Rolling-smoothing specification along the bin axis.
#[derive(Debug, Clone, PartialEq)]
pub enum SmoothingWindow {
    /// Rolling mean over this many bins (uniform kernel).
    Bins(usize),
    /// Explicit kernel; normalized to sum 1 before use.
    Kernel(Vec<f64>),
}

impl Default for SmoothingWindow {
    fn default() -> Self {
        SmoothingWindow::Bins(1)
    }
}

/// Configuration for [`bin_and_aggregate`].
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateConfig {
    /// Bin width; `None` puts the whole range in one bin.
    pub bin_width: Option<Duration>,
    /// Smoothing along the bin axis.
    pub window: SmoothingWindow,
    /// Explicit start of the bin range (defaults to the earliest date).
    pub start: Option<NaiveDate>,
    /// Explicit end of the bin range (defaults to the latest date).
    pub end: Option<NaiveDate>,
    /// Normalize each bin's categories to sum to 1.
    pub normalize: bool,
    /// Also produce a variance table.
    pub variance: bool,
    /// Aggregate in log space (geometric mean).
    pub log_space: bool,
    /// Weight on the missing-equals-zero assumption, in `[0, 1]`.
    pub trust: f64,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            bin_width: Some(Duration::days(7)),
            window: SmoothingWindow::default(),
            start: None,
            end: None,
            normalize: true,
            variance: false,
            log_space: false,
            trust: 1.0,
        }
    }
}

impl AggregateConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bin width.
    pub fn with_bin_width(mut self, width: Duration) -> Self {
        self.bin_width = Some(width);
        self
    }

    /// Aggregate the whole range into a single bin.
    pub fn single_bin(mut self) -> Self {
        self.bin_width = None;
        self
    }

    /// Smooth with a rolling mean over `bins` bins.
    pub fn with_window(mut self, bins: usize) -> Self {
        self.window = SmoothingWindow::Bins(bins);
        self
    }

    /// Smooth with an explicit kernel.
    pub fn with_kernel(mut self, kernel: Vec<f64>) -> Self {
        self.window = SmoothingWindow::Kernel(kernel);
        self
    }

    /// Set an explicit start date.
    pub fn with_start(mut self, start: NaiveDate) -> Self {
        self.start = Some(start);
        self
    }

    /// Set an explicit end date.
    pub fn with_end(mut self, end: NaiveDate) -> Self {
        self.end = Some(end);
        self
    }

    /// Toggle per-bin normalization.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Toggle the variance table.
    pub fn with_variance(mut self, variance: bool) -> Self {
        self.variance = variance;
        self
    }

    /// Toggle log-space (geometric) aggregation.
    pub fn with_log_space(mut self, log_space: bool) -> Self {
        self.log_space = log_space;
        self
    }

    /// Set the missing-equals-zero trust weight.
    pub fn with_trust(mut self, trust: f64) -> Self {
        self.trust = trust;
        self
    }
}

/// A dense bin × category table. Missing cells are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct PrevalenceTable {
    /// Date bins, ascending.
    pub bins: Vec<DateBin>,
    /// Category labels, ascending.
    pub categories: Vec<String>,
    /// Cell values, `bins.len() × categories.len()`.
    pub values: Array2<f64>,
}

impl PrevalenceTable {
    /// Column index of a category.
    pub fn column(&self, category: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == category)
    }

    /// Value at (bin row, category column).
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[[row, col]]
    }

    /// Number of bin rows.
    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }
}

/// Output of [`bin_and_aggregate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregated {
    /// Aggregated values per bin and category.
    pub table: PrevalenceTable,
    /// Matching variance table, when requested.
    pub variance: Option<PrevalenceTable>,
}

/// Gather and aggregate raw samples into per-category signals.
///
/// `weights` supplies one weight per row (uniform when absent). See the
/// module docs for the aggregation semantics.
pub fn bin_and_aggregate(
    table: &ObservationTable,
    weights: Option<&[f64]>,
    config: &AggregateConfig,
) -> Result<Aggregated> {
    if table.is_empty() {
        return Err(Error::EmptyInput);
    }
    if let Some(w) = weights {
        if w.len() != table.len() {
            return Err(Error::ShapeMismatch {
                expected: format!("{} weights", table.len()),
                actual: format!("{} weights", w.len()),
            });
        }
    }
    let kernel = normalized_kernel(&config.window)?;

    let rows = table.rows();
    let data_min = rows.iter().map(|r| r.date).min().ok_or(Error::EmptyInput)?;
    let data_max = rows.iter().map(|r| r.date).max().ok_or(Error::EmptyInput)?;
    let range_start = (config.start.unwrap_or(data_min) - Duration::days(1))
        .and_time(chrono::NaiveTime::MIN);
    let range_end = (config.end.unwrap_or(data_max) + Duration::days(1))
        .and_time(chrono::NaiveTime::MIN);

    let (bins, width) = match config.bin_width {
        None => {
            let single = DateBin {
                start: range_start,
                end: range_end,
            };
            (vec![single], range_end - range_start)
        }
        Some(w) => {
            if w <= Duration::zero() {
                return Err(Error::InvalidParameter {
                    name: "bin_width",
                    message: "must be positive",
                });
            }
            (date_bins(range_start, range_end, w), w)
        }
    };

    // Rows outside the bin range are dropped, weights with them.
    let kept: Vec<(usize, usize)> = rows
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            assign_bin(&bins, width, bin_timestamp(r.date)).map(|b| (i, b))
        })
        .collect();

    let categories: Vec<String> = kept
        .iter()
        .map(|&(i, _)| clean_label(&rows[i].category))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_owned)
        .collect();
    let column: HashMap<&str, usize> = categories
        .iter()
        .enumerate()
        .map(|(j, c)| (c.as_str(), j))
        .collect();

    let n_bins = bins.len();
    let n_cats = categories.len();
    let clog = |x: f64| {
        if config.log_space {
            (x + LOG_EPS).ln()
        } else {
            x
        }
    };
    let cexp = |x: f64| if config.log_space { x.exp() } else { x };

    let mut sum_val = Array2::<f64>::zeros((n_bins, n_cats));
    let mut sum_w = Array2::<f64>::zeros((n_bins, n_cats));
    let mut count_obs = Array2::<f64>::zeros((n_bins, n_cats));
    for &(i, b) in &kept {
        let row = &rows[i];
        let w = weights.map_or(1.0, |w| w[i]);
        let observed = row.value.is_some();
        let obs_w = if observed { 1.0 } else { 0.0 };
        let nm = (obs_w + config.trust).clamp(0.0, 1.0);
        let j = column[clean_label(&row.category)];
        sum_val[[b, j]] += w * nm * clog(row.value.unwrap_or(0.0));
        sum_w[[b, j]] += w * nm;
        if observed {
            count_obs[[b, j]] += 1.0;
        }
    }

    smooth_columns(&mut sum_val, &kernel);
    smooth_columns(&mut sum_w, &kernel);
    smooth_columns(&mut count_obs, &kernel);

    let mut prevalences = sum_val;
    let mut row_denoms = vec![0.0; n_bins];
    if config.normalize {
        prevalences.mapv_inplace(cexp);
        for (r, mut row) in prevalences.outer_iter_mut().enumerate() {
            let s: f64 = row.iter().sum();
            row_denoms[r] = s;
            if s == 0.0 {
                row.fill(f64::NAN);
            } else {
                row.mapv_inplace(|x| x / s);
            }
        }
    } else {
        for r in 0..n_bins {
            for j in 0..n_cats {
                let d = sum_w[[r, j]];
                let cell = &mut prevalences[[r, j]];
                *cell = if d == 0.0 { f64::NAN } else { cexp(*cell / d) };
                if count_obs[[r, j]] <= 0.0 {
                    *cell = f64::NAN;
                }
            }
        }
    }

    let variance = if config.variance {
        let mut sum_sq = Array2::<f64>::zeros((n_bins, n_cats));
        for &(i, b) in &kept {
            let row = &rows[i];
            let w = weights.map_or(1.0, |w| w[i]);
            let observed = row.value.is_some();
            let nm = (if observed { 1.0 } else { 0.0 } + config.trust).clamp(0.0, 1.0);
            let j = column[clean_label(&row.category)];
            let mean = prevalences[[b, j]];
            let dev = clog(row.value.unwrap_or(0.0)) - clog(mean);
            let term = (w * nm * dev).powi(2);
            // Deviations from a masked (NaN) mean carry no information.
            if !term.is_nan() {
                sum_sq[[b, j]] += term;
            }
        }
        smooth_columns(&mut sum_sq, &kernel);

        for r in 0..n_bins {
            for j in 0..n_cats {
                let d = if config.normalize {
                    row_denoms[r]
                } else {
                    sum_w[[r, j]]
                };
                let cell = &mut sum_sq[[r, j]];
                *cell = if d == 0.0 { f64::NAN } else { *cell / (d * d) };
                if config.log_space {
                    *cell *= prevalences[[r, j]].powi(2);
                }
            }
        }
        Some(PrevalenceTable {
            bins: bins.clone(),
            categories: categories.clone(),
            values: sum_sq,
        })
    } else {
        None
    };

    Ok(Aggregated {
        table: PrevalenceTable {
            bins,
            categories,
            values: prevalences,
        },
        variance,
    })
}

fn normalized_kernel(window: &SmoothingWindow) -> Result<Vec<f64>> {
    let kernel = match window {
        SmoothingWindow::Bins(0) => {
            return Err(Error::InvalidParameter {
                name: "window",
                message: "rolling window must span at least one bin",
            });
        }
        SmoothingWindow::Bins(k) => vec![1.0; *k],
        SmoothingWindow::Kernel(k) if k.is_empty() => {
            return Err(Error::InvalidParameter {
                name: "window",
                message: "kernel must be non-empty",
            });
        }
        SmoothingWindow::Kernel(k) => k.clone(),
    };
    let total: f64 = kernel.iter().sum();
    if total <= 0.0 {
        return Err(Error::InvalidParameter {
            name: "window",
            message: "kernel must have positive sum",
        });
    }
    Ok(kernel.iter().map(|x| x / total).collect())
}

/// Convolve each column with `kernel`, edge-padded so output length equals
/// input length. The kernel is applied reversed, matching convolution
/// rather than correlation.
fn smooth_columns(m: &mut Array2<f64>, kernel: &[f64]) {
    let k = kernel.len();
    if k == 1 {
        return;
    }
    let n = m.nrows();
    if n == 0 {
        return;
    }
    let pad_left = k / 2;
    let pad_right = k - 1 - pad_left;

    for mut col in m.columns_mut() {
        let mut padded = Vec::with_capacity(n + k - 1);
        padded.extend(std::iter::repeat(col[0]).take(pad_left));
        padded.extend(col.iter().copied());
        padded.extend(std::iter::repeat(col[n - 1]).take(pad_right));

        for i in 0..n {
            let mut acc = 0.0;
            for (j, &w) in kernel.iter().enumerate() {
                acc += w * padded[i + k - 1 - j];
            }
            col[i] = acc;
        }
    }
}
