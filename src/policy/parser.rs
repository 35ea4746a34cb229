//! YAML policy parser.
//!
//! Parses a policy file into the internal `Policy` struct. The grammar is
//! the one from the external interfaces section: `version`, `default_action`,
//! and an ordered `rules` list of `{match, action, level?, timeout?,
//! rate_limit?, conditions?}`.
//!
//! # Example policy file:
//! ```yaml
//! version: "1"
//! default_action: ask
//! rules:
//!   - match: { tool: "ls" }
//!     action: allow
//!   - match: { kind: shell, command: "rm -rf *" }
//!     action: deny
//!   - match: { tool: "git", args: "push*" }
//!     action: ask
//!     timeout: 60
//!     rate_limit: "2/minute"
//! ```

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::policy::glob::{CompiledGlob, GlobFlavor};
use crate::policy::ratelimit::RateLimit;
use crate::policy::types::*;

/// Parse a YAML policy file from a file path.
pub fn parse_policy_file(path: impl AsRef<Path>) -> Result<Policy> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read policy file: {}", path.display()))?;
    parse_policy_str(&content)
        .with_context(|| format!("Failed to parse policy file: {}", path.display()))
}

/// Parse a YAML policy string into a `Policy`.
pub fn parse_policy_str(yaml: &str) -> Result<Policy> {
    let policy: Policy =
        serde_yaml::from_str(yaml).context("Invalid YAML syntax in policy file")?;

    for (index, rule) in policy.rules.iter().enumerate() {
        validate_rule(rule, index)?;
    }

    Ok(policy)
}

/// Validate that every glob in a rule's `match` clause compiles, and that
/// the `rate_limit` string (when present) is either parseable or left for
/// the engine to ignore at evaluation time. Glob compile failures are
/// rejected at load time — better to fail loudly when the policy is loaded
/// than to silently never-match at runtime.
fn validate_rule(rule: &PolicyRule, index: usize) -> Result<()> {
    let m = &rule.match_clause;

    if let Some(pattern) = &m.tool {
        CompiledGlob::compile(pattern, GlobFlavor::Simple)
            .with_context(|| format!("Rule {}: invalid glob in 'tool': '{}'", index, pattern))?;
    }
    if let Some(pattern) = &m.host {
        CompiledGlob::compile(pattern, GlobFlavor::Simple)
            .with_context(|| format!("Rule {}: invalid glob in 'host': '{}'", index, pattern))?;
    }
    if let Some(pattern) = &m.path {
        CompiledGlob::compile(pattern, GlobFlavor::Path)
            .with_context(|| format!("Rule {}: invalid glob in 'path': '{}'", index, pattern))?;
    }
    if let Some(pattern) = &m.command {
        CompiledGlob::compile(pattern, GlobFlavor::Simple).with_context(|| {
            format!("Rule {}: invalid glob in 'command': '{}'", index, pattern)
        })?;
    }
    match &m.args {
        Some(ArgsMatch::Glob(pattern)) => {
            CompiledGlob::compile(pattern, GlobFlavor::Simple).with_context(|| {
                format!("Rule {}: invalid glob in 'args': '{}'", index, pattern)
            })?;
        }
        Some(ArgsMatch::Named(map)) => {
            for (key, pattern) in map {
                CompiledGlob::compile(pattern, GlobFlavor::Simple).with_context(|| {
                    format!("Rule {}: invalid glob in 'args.{}': '{}'", index, key, pattern)
                })?;
            }
        }
        None => {}
    }

    if let Some(conditions) = &rule.conditions {
        if let Some(tod) = &conditions.time_of_day {
            if parse_hhmm(&tod.after).is_none() || parse_hhmm(&tod.before).is_none() {
                bail!(
                    "Rule {}: time_of_day must use HH:MM, got after='{}' before='{}'",
                    index,
                    tod.after,
                    tod.before
                );
            }
        }
    }

    // A malformed rate_limit is not a load-time error per the component
    // design (the rule is just ignored for rate-limit purposes); warn only.
    if let Some(spec) = &rule.rate_limit {
        if RateLimit::parse(spec).is_none() {
            tracing::warn!(rule = index, rate_limit = %spec, "malformed rate_limit, rule will not be rate-limited");
        }
    }

    Ok(())
}

fn parse_hhmm(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some((h, m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_policy() {
        let yaml = r#"
version: "1"
default_action: deny
rules:
  - match: { tool: "ls" }
    action: allow
"#;
        let policy = parse_policy_str(yaml).unwrap();
        assert_eq!(policy.default_action, PolicyAction::Deny);
        assert_eq!(policy.rules.len(), 1);
    }

    #[test]
    fn test_parse_full_policy() {
        let yaml = r#"
version: "1"
default_action: ask
rules:
  - match: { kind: shell, tool: "rm*" }
    action: deny
  - match: { tool: "git", command: "push*" }
    action: ask
    timeout: 60
    rate_limit: "2/minute"
  - match: { kind: http, host: "*.internal" }
    action: deny
    conditions:
      time_of_day: { after: "22:00", before: "06:00" }
"#;
        let policy = parse_policy_str(yaml).unwrap();
        assert_eq!(policy.rules.len(), 3);
        assert_eq!(policy.rules[1].timeout, Some(60));
        assert_eq!(policy.rules[1].rate_limit.as_deref(), Some("2/minute"));
    }

    #[test]
    fn test_empty_match_matches_everything_syntactically() {
        let yaml = r#"
version: "1"
default_action: allow
rules:
  - match: {}
    action: ask
"#;
        let policy = parse_policy_str(yaml).unwrap();
        assert!(policy.rules[0].match_clause.is_empty());
    }

    #[test]
    fn test_reject_bad_time_of_day() {
        let yaml = r#"
version: "1"
default_action: allow
rules:
  - match: {}
    action: ask
    conditions:
      time_of_day: { after: "25:00", before: "06:00" }
"#;
        assert!(parse_policy_str(yaml).is_err());
    }

    #[test]
    fn test_malformed_rate_limit_is_not_fatal() {
        let yaml = r#"
version: "1"
default_action: allow
rules:
  - match: { tool: "git" }
    action: allow
    rate_limit: "nonsense"
"#;
        assert!(parse_policy_str(yaml).is_ok());
    }

    #[test]
    fn test_args_named_map_form() {
        let yaml = r#"
version: "1"
default_action: allow
rules:
  - match:
      tool: "curl"
      args:
        url: "https://internal.example/*"
    action: deny
"#;
        let policy = parse_policy_str(yaml).unwrap();
        match &policy.rules[0].match_clause.args {
            Some(ArgsMatch::Named(map)) => assert!(map.contains_key("url")),
            _ => panic!("expected named args match"),
        }
    }
}
