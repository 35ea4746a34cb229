//! Static three-tier classifier: action `name` → `{category, risk_level}`.
//!
//! Tier 1 checks exact namespaced entries (`shell:*`, `http:*`, `file:*`),
//! tier 2 checks well-known tool basenames regardless of kind, tier 3 falls
//! back to name-prefix rules. Anything left unmatched is `Unknown`/`Medium`,
//! matching the fail-open-to-medium default a policy author can still
//! override with `default_action`.
//!
//! Same "ordered, first-match lookup over string tables" shape as an alias
//! table, generalized from a flat enum to tiered classification.

use crate::policy::types::{Action, ActionKind, Category, Classification, RiskLevel};

const fn c(category: Category, risk_level: RiskLevel) -> Classification {
    Classification {
        category,
        risk_level,
    }
}

/// Tier 1: exact namespaced keys, `"<kind>:<name>"`.
fn tier1(namespaced: &str) -> Option<Classification> {
    match namespaced {
        "shell:rm" => Some(c(Category::FileDelete, RiskLevel::High)),
        "shell:git" => Some(c(Category::VersionControl, RiskLevel::Medium)),
        "http:CONNECT" => Some(c(Category::Network, RiskLevel::Medium)),
        "http:GET" => Some(c(Category::Network, RiskLevel::Low)),
        "http:POST" => Some(c(Category::Network, RiskLevel::Medium)),
        "http:PUT" => Some(c(Category::Network, RiskLevel::Medium)),
        "http:DELETE" => Some(c(Category::Network, RiskLevel::High)),
        _ => None,
    }
}

/// Tier 2: well-known tool basenames, independent of kind.
fn tier2(name: &str) -> Option<Classification> {
    match name {
        "rm" | "rmdir" | "shred" | "unlink" => Some(c(Category::FileDelete, RiskLevel::High)),
        "git" | "svn" | "hg" => Some(c(Category::VersionControl, RiskLevel::Medium)),
        "curl" | "wget" | "nc" | "ncat" => Some(c(Category::Network, RiskLevel::Medium)),
        "sudo" | "su" | "chmod" | "chown" | "dd" | "mkfs" => {
            Some(c(Category::Exec, RiskLevel::High))
        }
        "cp" | "mv" | "mkdir" | "touch" | "tee" => Some(c(Category::FileWrite, RiskLevel::Low)),
        "ls" | "cat" | "echo" | "pwd" | "grep" | "find" => {
            Some(c(Category::Exec, RiskLevel::Low))
        }
        _ => None,
    }
}

/// Tier 3: name-prefix fallback rules.
fn tier3(name: &str) -> Option<Classification> {
    if name.starts_with("http:") {
        return Some(c(Category::Network, RiskLevel::Medium));
    }
    if name.starts_with("git-") || name.starts_with("git_") {
        return Some(c(Category::VersionControl, RiskLevel::Medium));
    }
    if name.starts_with("rm") || name.starts_with("del") {
        return Some(c(Category::FileDelete, RiskLevel::High));
    }
    None
}

/// Classify an action's `name` into `{category, risk_level}`.
pub fn classify(action: &Action) -> Classification {
    classify_name(action.kind, &action.name)
}

fn classify_name(kind: ActionKind, name: &str) -> Classification {
    let namespaced = format!("{}:{}", kind, name.trim_start_matches("http:"));
    if let Some(found) = tier1(&namespaced) {
        return found;
    }
    if let Some(found) = tier2(name) {
        return found;
    }
    if let Some(found) = tier3(name) {
        return found;
    }
    Classification::UNKNOWN
}
