//! Types for the audit sink.
//!
//! Every action the gate decides on gets exactly one entry — allowed or
//! denied. The entry is created inside the gate, appended once, and never
//! mutated afterward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::types::{Action, Verdict};

/// A single line of the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: Action,
    pub verdict: Verdict,
}

impl AuditEntry {
    pub fn new(action: Action, verdict: Verdict) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            verdict,
        }
    }
}
