//! Structural validation for lineage records.
//!
//! The upstream data pipeline assumes well-formed hierarchies; here the
//! assumption is checked once, at construction time. Detected issues:
//! - duplicate lineage names
//! - use of the reserved root name `*`
//! - dangling parent references
//! - self-parented records (the self-loop sentinel belongs to the root only)
//!
//! Cycles that survive these checks (every parent resolves, but a subgraph
//! is detached from the root) are caught by the reachability re-check in
//! [`LineageTree::from_records`](super::LineageTree::from_records).

use std::collections::{HashMap, HashSet};

use super::tree::{LineageRecord, ROOT_NAME};

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational, not a problem.
    Info,
    /// Something unusual but not necessarily wrong.
    Warning,
    /// A problem that should be fixed.
    Error,
    /// A critical issue that may cause failures.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// A single validation issue found in a set of lineage records.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    /// Severity of the issue.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// Lineage name involved, if any.
    pub lineage: Option<String>,
}

impl ValidationIssue {
    /// Create a new validation issue.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            lineage: None,
        }
    }

    /// Attach a lineage name to this issue.
    pub fn with_lineage(mut self, name: impl Into<String>) -> Self {
        self.lineage = Some(name.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)?;
        if let Some(name) = &self.lineage {
            write!(f, " ({})", name)?;
        }
        Ok(())
    }
}

/// Report from a structural validation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// All issues found.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Add an issue to the report.
    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    /// Add a warning-level issue.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.add(ValidationIssue::new(Severity::Warning, message));
    }

    /// Add an error-level issue.
    pub fn error(&mut self, message: impl Into<String>) {
        self.add(ValidationIssue::new(Severity::Error, message));
    }

    /// Add a critical-level issue.
    pub fn critical(&mut self, message: impl Into<String>) {
        self.add(ValidationIssue::new(Severity::Critical, message));
    }

    /// Whether the report contains no errors or critical issues.
    pub fn is_healthy(&self) -> bool {
        !self.issues.iter().any(|i| i.severity >= Severity::Error)
    }

    /// Whether there are any issues at all.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues of a given severity or higher.
    pub fn issues_at_level(&self, min_severity: Severity) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity >= min_severity)
            .collect()
    }

    /// Count issues by severity.
    pub fn counts(&self) -> HashMap<Severity, usize> {
        let mut counts = HashMap::new();
        for issue in &self.issues {
            *counts.entry(issue.severity).or_default() += 1;
        }
        counts
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_clean() {
            return write!(f, "validation passed: no issues found");
        }

        let counts = self.counts();
        let parts: Vec<String> = [
            (Severity::Critical, "critical"),
            (Severity::Error, "errors"),
            (Severity::Warning, "warnings"),
            (Severity::Info, "info"),
        ]
        .iter()
        .filter_map(|(sev, name)| counts.get(sev).map(|c| format!("{} {}", c, name)))
        .collect();

        write!(f, "{}", parts.join(", "))?;
        for issue in &self.issues {
            write!(f, "; {}", issue)?;
        }
        Ok(())
    }
}

/// Validate a set of lineage records before arena construction.
pub fn validate_records(records: &[LineageRecord]) -> ValidationReport {
    let mut report = ValidationReport::new();

    let mut seen: HashSet<&str> = HashSet::new();
    for record in records {
        if record.name == ROOT_NAME {
            report.add(
                ValidationIssue::new(
                    Severity::Error,
                    format!("lineage name '{ROOT_NAME}' is reserved for the root"),
                )
                .with_lineage(&record.name),
            );
        }
        if !seen.insert(record.name.as_str()) {
            report.add(
                ValidationIssue::new(Severity::Error, "duplicate lineage name")
                    .with_lineage(&record.name),
            );
        }
    }

    let known: HashMap<&str, &LineageRecord> =
        records.iter().map(|r| (r.name.as_str(), r)).collect();
    for record in records {
        match record.parent.as_deref() {
            None => {}
            Some(p) if p == record.name => {
                report.add(
                    ValidationIssue::new(Severity::Error, "record is its own parent")
                        .with_lineage(&record.name),
                );
            }
            Some(p) if p == ROOT_NAME => {}
            Some(p) if !known.contains_key(p) => {
                report.add(
                    ValidationIssue::new(
                        Severity::Error,
                        format!("dangling parent reference '{p}'"),
                    )
                    .with_lineage(&record.name),
                );
            }
            Some(_) => {}
        }
    }

    report
}
