//! Fixed-width date bins and category label cleaning.

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// A left-open time interval `(start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DateBin {
    /// Exclusive lower bound.
    pub start: NaiveDateTime,
    /// Inclusive upper bound.
    pub end: NaiveDateTime,
}

impl DateBin {
    /// Whether a timestamp falls inside this bin.
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start < t && t <= self.end
    }

    /// Midpoint of the bin, for plotting and re-binning.
    pub fn midpoint(&self) -> NaiveDateTime {
        self.start + (self.end - self.start) / 2
    }
}

impl std::fmt::Display for DateBin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}]", self.start.date(), self.end.date())
    }
}

/// Contiguous bins of `width` starting at `start`, as many as fit with the
/// right edge at or before `end`.
pub fn date_bins(start: NaiveDateTime, end: NaiveDateTime, width: Duration) -> Vec<DateBin> {
    let mut bins = Vec::new();
    let mut left = start;
    while left + width <= end {
        bins.push(DateBin {
            start: left,
            end: left + width,
        });
        left += width;
    }
    bins
}

/// Index of the bin containing `t`, for contiguous equal-width bins.
pub fn assign_bin(bins: &[DateBin], width: Duration, t: NaiveDateTime) -> Option<usize> {
    let first = bins.first()?;
    let offset = (t - first.start).num_seconds();
    let w = width.num_seconds();
    if offset <= 0 || w <= 0 {
        return None;
    }
    let idx = ((offset - 1) / w) as usize;
    if idx < bins.len() {
        Some(idx)
    } else {
        None
    }
}

/// Shift an observation date for binning: midnight plus one hour, so a
/// sample taken exactly on a bin edge lands in the later bin.
pub fn bin_timestamp(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN) + Duration::hours(1)
}

/// Truncate a category label to its clean name: everything before the
/// first `-like` and before the first `(`.
pub fn clean_label(name: &str) -> &str {
    let s = match name.find("-like") {
        Some(i) => &name[..i],
        None => name,
    };
    match s.find('(') {
        Some(i) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_date_bins_cover_range() {
        let start = d(2024, 1, 1).and_time(chrono::NaiveTime::MIN);
        let end = d(2024, 1, 15).and_time(chrono::NaiveTime::MIN);
        let bins = date_bins(start, end, Duration::days(7));
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].start, start);
        assert_eq!(bins[0].end, start + Duration::days(7));
        assert_eq!(bins[1].end, start + Duration::days(14));
    }

    #[test]
    fn test_partial_trailing_bin_not_created() {
        let start = d(2024, 1, 1).and_time(chrono::NaiveTime::MIN);
        let end = d(2024, 1, 10).and_time(chrono::NaiveTime::MIN);
        let bins = date_bins(start, end, Duration::days(7));
        assert_eq!(bins.len(), 1);
    }

    #[test]
    fn test_left_open_assignment() {
        let start = d(2024, 1, 1).and_time(chrono::NaiveTime::MIN);
        let end = d(2024, 1, 15).and_time(chrono::NaiveTime::MIN);
        let width = Duration::days(7);
        let bins = date_bins(start, end, width);

        // Exactly on the shared edge: belongs to the earlier bin.
        assert_eq!(assign_bin(&bins, width, bins[0].end), Some(0));
        // One second past the edge: the later bin.
        assert_eq!(
            assign_bin(&bins, width, bins[0].end + Duration::seconds(1)),
            Some(1)
        );
        // On the exclusive lower bound: outside.
        assert_eq!(assign_bin(&bins, width, start), None);
        // Past the last edge: outside.
        assert_eq!(
            assign_bin(&bins, width, bins[1].end + Duration::seconds(1)),
            None
        );
    }

    #[test]
    fn test_bin_timestamp_shift() {
        let t = bin_timestamp(d(2024, 3, 5));
        assert_eq!(t, d(2024, 3, 5).and_hms_opt(1, 0, 0).unwrap());
    }

    #[test]
    fn test_clean_label() {
        assert_eq!(clean_label("BA.2"), "BA.2");
        assert_eq!(clean_label("BA.2-like"), "BA.2");
        assert_eq!(clean_label("XBB.1.5 (22F)"), "XBB.1.5 ");
        assert_eq!(clean_label("BQ.1-like(tentative)"), "BQ.1");
    }
}
