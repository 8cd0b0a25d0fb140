//! Administrative audit log.
//!
//! Records consumptions of notable entities and containment failures. Each
//! entry is also emitted as a `tracing` event on the `audit` target.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogType {
    /// An entity was destroyed.
    EntityDelete,
    /// Containment field generation changed.
    FieldGeneration,
}

/// How much an entry matters to an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogImpact {
    /// Routine.
    Low,
    /// Worth a look.
    Medium,
    /// Needs attention.
    High,
    /// Needs immediate attention.
    Extreme,
}

impl fmt::Display for LogImpact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Tick the entry was recorded on.
    pub tick: u64,
    /// Category.
    pub log_type: LogType,
    /// Severity.
    pub impact: LogImpact,
    /// Human readable text.
    pub message: String,
}

/// Append-only audit log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&mut self, tick: u64, log_type: LogType, impact: LogImpact, message: String) {
        tracing::info!(target: "audit", tick, ?log_type, %impact, "{message}");
        self.entries.push(AuditEntry {
            tick,
            log_type,
            impact,
            message,
        });
    }

    /// All entries in recording order.
    #[must_use]
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Entries at or above an impact level.
    pub fn at_least(&self, impact: LogImpact) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter().filter(move |e| e.impact >= impact)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
