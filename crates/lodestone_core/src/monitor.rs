//! Failure monitoring and aggregation.
//!
//! Per-item mapping and backend failures never vanish silently: they
//! are delivered through an explicit [`FailureMonitor`] so callers can
//! distinguish "my change was rejected" from "a concurrent change
//! elsewhere failed", and aggregated into a structured report keyed by
//! entity type and field path.

use crate::error::IndexError;
use crate::types::{EntityId, TypeId};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// One recorded per-item failure.
#[derive(Debug, Clone)]
pub struct FailureEntry {
    /// Entity type involved, when known.
    pub type_id: Option<TypeId>,
    /// Entity id involved, when known.
    pub entity_id: Option<EntityId>,
    /// Field path involved, for mapping failures.
    pub field: Option<String>,
    /// Description of the failure.
    pub message: String,
}

impl FailureEntry {
    /// Builds an entry from an error and the entity it concerned.
    #[must_use]
    pub fn from_error(
        type_id: Option<TypeId>,
        entity_id: Option<EntityId>,
        error: &IndexError,
    ) -> Self {
        let field = match error {
            IndexError::Mapping { field, .. } => Some(field.clone()),
            _ => None,
        };
        Self {
            type_id,
            entity_id,
            field,
            message: error.to_string(),
        }
    }
}

/// Aggregated per-item failures for one logical change.
#[derive(Debug, Clone, Default)]
pub struct FailureReport {
    entries: Vec<FailureEntry>,
}

impl FailureReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one failure.
    pub fn add(&mut self, entry: FailureEntry) {
        self.entries.push(entry);
    }

    /// Absorbs another report.
    pub fn merge(&mut self, other: FailureReport) {
        self.entries.extend(other.entries);
    }

    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the recorded failures in order.
    #[must_use]
    pub fn entries(&self) -> &[FailureEntry] {
        &self.entries
    }

    /// Groups failures by `(entity type, field path)`.
    #[must_use]
    pub fn by_type_and_field(&self) -> BTreeMap<(String, String), Vec<&FailureEntry>> {
        let mut grouped: BTreeMap<(String, String), Vec<&FailureEntry>> = BTreeMap::new();
        for entry in &self.entries {
            let key = (
                entry
                    .type_id
                    .as_ref()
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_default(),
                entry.field.clone().unwrap_or_default(),
            );
            grouped.entry(key).or_default().push(entry);
        }
        grouped
    }
}

/// Callback interface receiving per-item failures as they happen.
pub trait FailureMonitor: Send + Sync {
    /// Called once per failed item.
    fn on_failure(&self, entry: FailureEntry);
}

/// Monitor that collects failures for later inspection.
#[derive(Debug, Default)]
pub struct CollectingMonitor {
    entries: Mutex<Vec<FailureEntry>>,
}

impl CollectingMonitor {
    /// Creates an empty collecting monitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of collected failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drains the collected failures into a report.
    #[must_use]
    pub fn take_report(&self) -> FailureReport {
        let mut report = FailureReport::new();
        for entry in self.entries.lock().drain(..) {
            report.add(entry);
        }
        report
    }
}

impl FailureMonitor for CollectingMonitor {
    fn on_failure(&self, entry: FailureEntry) {
        self.entries.lock().push(entry);
    }
}

/// Monitor that drops failures (they are still logged at the call site).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMonitor;

impl FailureMonitor for NullMonitor {
    fn on_failure(&self, _entry: FailureEntry) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_groups_by_type_and_field() {
        let mut report = FailureReport::new();
        let err = IndexError::mapping("Person", "name", "bad value");
        report.add(FailureEntry::from_error(
            Some(TypeId::new("Person")),
            Some(EntityId::new(1)),
            &err,
        ));
        report.add(FailureEntry::from_error(
            Some(TypeId::new("Person")),
            Some(EntityId::new(2)),
            &err,
        ));

        let grouped = report.by_type_and_field();
        let key = ("Person".to_string(), "name".to_string());
        assert_eq!(grouped.get(&key).unwrap().len(), 2);
    }

    #[test]
    fn collecting_monitor_drains() {
        let monitor = CollectingMonitor::new();
        monitor.on_failure(FailureEntry::from_error(
            None,
            None,
            &IndexError::backend("boom"),
        ));
        assert_eq!(monitor.len(), 1);

        let report = monitor.take_report();
        assert_eq!(report.len(), 1);
        assert!(monitor.is_empty());
    }
}
