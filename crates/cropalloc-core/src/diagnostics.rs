//! Non-fatal issue collection surfaced alongside optimization results.
//!
//! Operational conditions that do not abort a planning call still deserve
//! visibility: an empty candidate pool, allocations trimmed by a market cap,
//! a wall-clock deadline cutting local search short. This module collects
//! them with a severity, a category for grouping, and an optional entity
//! reference, and serializes into the result payload.
//!
//! # Example
//!
//! ```
//! use cropalloc_core::diagnostics::{Diagnostics, Severity};
//!
//! let mut diag = Diagnostics::new();
//! diag.add_warning("candidates", "no viable growing window produced any candidate");
//! diag.add_warning_with_entity("market_cap", "allocation dropped, demand exhausted", "Crop#3");
//!
//! assert_eq!(diag.warning_count(), 2);
//! assert!(!diag.has_errors());
//! ```

use serde::Serialize;

/// Severity level for diagnostic issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Unusual but the pipeline continued (e.g. empty candidate pool)
    Warning,
    /// An element or instruction could not be processed
    Error,
}

/// A single diagnostic issue encountered during planning
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticIssue {
    /// Severity of the issue
    pub severity: Severity,
    /// Category for grouping (e.g. "candidates", "market_cap", "deadline")
    pub category: String,
    /// Human-readable description
    pub message: String,
    /// Optional entity reference (e.g. "Field#2", "Crop#3", "Alloc#17")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl DiagnosticIssue {
    pub fn new(severity: Severity, category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            category: category.into(),
            message: message.into(),
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }
}

impl std::fmt::Display for DiagnosticIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{severity}] {}: {}", self.category, self.message)?;
        if let Some(entity) = &self.entity {
            write!(f, " ({entity})")?;
        }
        Ok(())
    }
}

/// Accumulator for diagnostic issues
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub issues: Vec<DiagnosticIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, category: impl Into<String>, message: impl Into<String>) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message));
    }

    pub fn add_warning_with_entity(
        &mut self,
        category: impl Into<String>,
        message: impl Into<String>,
        entity: impl Into<String>,
    ) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Warning, category, message).with_entity(entity));
    }

    pub fn add_error(&mut self, category: impl Into<String>, message: impl Into<String>) {
        self.issues
            .push(DiagnosticIssue::new(Severity::Error, category, message));
    }

    pub fn merge(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for issue in &self.issues {
            writeln!(f, "{issue}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_severity() {
        let mut diag = Diagnostics::new();
        diag.add_warning("candidates", "empty pool");
        diag.add_error("instruction", "allocation not found");
        assert_eq!(diag.warning_count(), 1);
        assert_eq!(diag.error_count(), 1);
        assert!(diag.has_errors());
    }

    #[test]
    fn test_display_includes_entity() {
        let issue = DiagnosticIssue::new(Severity::Warning, "market_cap", "demand exhausted")
            .with_entity("Crop#3");
        let text = issue.to_string();
        assert!(text.contains("market_cap"));
        assert!(text.contains("Crop#3"));
    }

    #[test]
    fn test_merge() {
        let mut a = Diagnostics::new();
        a.add_warning("candidates", "empty pool");
        let mut b = Diagnostics::new();
        b.add_warning("deadline", "expired during local search");
        a.merge(b);
        assert_eq!(a.warning_count(), 2);
    }
}
