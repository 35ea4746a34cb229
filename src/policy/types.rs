//! Core types for the consent policy engine.
//!
//! These types describe the action an agent proposes, the rules a policy
//! is made of, and the verdict the engine hands back.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of thing the agent is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Shell,
    Http,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Shell => write!(f, "shell"),
            ActionKind::Http => write!(f, "http"),
        }
    }
}

/// An immutable record describing what the agent wants to do.
///
/// Invariant: `kind == Http` implies `host` is set; `kind == Shell` implies
/// `name` is the command basename. Enforced by the constructors below
/// rather than by giving every field a public setter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    pub kind: ActionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Action {
    /// Build a shell action. `name` is the command basename (e.g. `rm`, `curl`).
    pub fn shell(name: impl Into<String>, args: Option<String>) -> Self {
        Self {
            name: name.into(),
            args,
            kind: ActionKind::Shell,
            host: None,
            method: None,
            port: None,
        }
    }

    /// Build an HTTP action. The request line (`METHOD url`) is kept in `args`.
    pub fn http(
        method: impl Into<String>,
        url: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
    ) -> Self {
        let method = method.into();
        Self {
            name: format!("http:{}", method),
            args: Some(url.into()),
            kind: ActionKind::Http,
            host: Some(host.into()),
            method: Some(method),
            port,
        }
    }
}

/// The gate's final, always-resolved decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => write!(f, "allow"),
            Decision::Deny => write!(f, "deny"),
        }
    }
}

/// `{decision, reason}` — always produced, never a `Result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: Decision,
    pub reason: String,
}

impl Verdict {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Allow,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Deny,
            reason: reason.into(),
        }
    }

    pub fn is_allow(&self) -> bool {
        self.decision == Decision::Allow
    }

    pub fn is_deny(&self) -> bool {
        self.decision == Decision::Deny
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.decision, self.reason)
    }
}

/// What a matched (or default) rule tells the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Allow,
    Ask,
    Deny,
}

/// Time-of-day gate on a rule, interpreted in UTC, `HH:MM` strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub after: String,
    pub before: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<TimeOfDay>,
}

/// Either a single glob string or a per-argument-name map of globs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgsMatch {
    Glob(String),
    Named(std::collections::BTreeMap<String, String>),
}

/// The narrowing clause of a rule. An empty clause matches every action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchClause {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ActionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "name")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<ArgsMatch>,
}

impl MatchClause {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.tool.is_none()
            && self.category.is_none()
            && self.host.is_none()
            && self.method.is_none()
            && self.path.is_none()
            && self.command.is_none()
            && self.args.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    #[serde(default)]
    #[serde(rename = "match")]
    pub match_clause: MatchClause,
    pub action: PolicyAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,
}

impl PolicyRule {
    /// Human-readable description used in logs and audit entries.
    pub fn describe(&self, index: usize) -> String {
        format!("rule[{}]:{:?}", index, self.action)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default = "default_version")]
    pub version: String,
    pub default_action: PolicyAction,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

fn default_version() -> String {
    "1".to_string()
}

/// Result of evaluating a single action against a policy, before the gate
/// has consulted the channel or the caches.
#[derive(Debug, Clone)]
pub struct PolicyResult {
    pub action: PolicyAction,
    pub rule_index: Option<usize>,
    pub level: Option<String>,
    pub timeout: Option<u64>,
    pub reason: String,
}

/// Classification category, used by the three-tier static classifier and
/// matchable from policy rules via `match.category`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    FileWrite,
    FileDelete,
    Exec,
    VersionControl,
    Network,
    Unknown,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::FileWrite => "file_write",
            Category::FileDelete => "file_delete",
            Category::Exec => "exec",
            Category::VersionControl => "version_control",
            Category::Network => "network",
            Category::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        write!(f, "{}", s)
    }
}

/// Output of the static three-tier classifier (policy::classify).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    pub risk_level: RiskLevel,
}

impl Classification {
    pub const UNKNOWN: Classification = Classification {
        category: Category::Unknown,
        risk_level: RiskLevel::Medium,
    };
}
