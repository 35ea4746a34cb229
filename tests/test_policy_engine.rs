//! Integration tests for the policy engine.
//! Tests the full flow: YAML parsing -> engine creation -> evaluation.

use acp_gate::policy::{parser, Action, PolicyAction, PolicyEngine};

/// Helper: load the test fixture policy and create an engine.
fn test_engine() -> PolicyEngine {
    let yaml = include_str!("fixtures/test_policy.yaml");
    let policy = parser::parse_policy_str(yaml).expect("Failed to parse test policy");
    PolicyEngine::new(policy)
}

#[test]
fn test_allow_rule_for_ls() {
    let engine = test_engine();
    let action = Action::shell("ls", Some("-la /".to_string()));
    let result = engine.evaluate(&action);
    assert_eq!(result.action, PolicyAction::Allow);
    assert_eq!(result.rule_index, Some(0));
}

#[test]
fn test_deny_rule_for_rm() {
    let engine = test_engine();
    let action = Action::shell("rm", Some("-rf /".to_string()));
    let result = engine.evaluate(&action);
    assert_eq!(result.action, PolicyAction::Deny);
    assert_eq!(result.rule_index, Some(1));
}

#[test]
fn test_git_requires_ask_with_timeout() {
    let engine = test_engine();
    let action = Action::shell("git", Some("push origin main".to_string()));
    let result = engine.evaluate(&action);
    assert_eq!(result.action, PolicyAction::Ask);
    assert_eq!(result.timeout, Some(30));
}

#[test]
fn test_internal_hosts_denied() {
    let engine = test_engine();
    let action = Action::http("GET", "https://db.internal/users", "db.internal", Some(443));
    let result = engine.evaluate(&action);
    assert_eq!(result.action, PolicyAction::Deny);
}

#[test]
fn test_unmatched_action_falls_back_to_default() {
    let engine = test_engine();
    let action = Action::shell("curl", Some("https://example.com".to_string()));
    let result = engine.evaluate(&action);
    assert_eq!(result.action, PolicyAction::Ask);
    assert_eq!(result.reason, "No policy rule matched");
}

#[test]
fn test_git_rate_limit_denies_third_call_in_window() {
    let engine = test_engine();
    let action = Action::shell("git", Some("push".to_string()));

    assert_eq!(engine.evaluate(&action).action, PolicyAction::Ask);
    assert_eq!(engine.evaluate(&action).action, PolicyAction::Ask);
    let third = engine.evaluate(&action);
    assert_eq!(third.action, PolicyAction::Deny);
    assert_eq!(
        third.reason,
        "Rate limit exceeded: 2/minute for \"git\" (2 calls in window)"
    );
}

// P10 (Glob anchoring): unanchored prefix doesn't match, `*` is a wildcard
// suffix, the path flavor treats `/` as a segment boundary that `*` doesn't
// cross but `**` does.
#[test]
fn test_glob_anchoring_properties() {
    use acp_gate::policy::glob::{CompiledGlob, GlobFlavor};

    assert!(!CompiledGlob::compile("fo", GlobFlavor::Simple)
        .unwrap()
        .is_match("foo"));
    assert!(CompiledGlob::compile("fo*", GlobFlavor::Simple)
        .unwrap()
        .is_match("foo"));

    assert!(CompiledGlob::compile("a/*/c", GlobFlavor::Path)
        .unwrap()
        .is_match("a/b/c"));
    assert!(!CompiledGlob::compile("a/*", GlobFlavor::Path)
        .unwrap()
        .is_match("a/b/c"));
    assert!(CompiledGlob::compile("a/**", GlobFlavor::Path)
        .unwrap()
        .is_match("a/b/c"));
}

#[test]
fn test_first_match_wins_when_rules_overlap() {
    let yaml = r#"
version: "1"
default_action: deny
rules:
  - match: { tool: "deploy" }
    action: ask
  - match: { tool: "deploy" }
    action: allow
"#;
    let policy = parser::parse_policy_str(yaml).unwrap();
    let engine = PolicyEngine::new(policy);
    let result = engine.evaluate(&Action::shell("deploy", None));
    assert_eq!(result.action, PolicyAction::Ask);
    assert_eq!(result.rule_index, Some(0));
}

#[test]
fn test_policy_evaluation_speed() {
    let engine = test_engine();

    let start = std::time::Instant::now();
    let iterations = 10_000;

    for _ in 0..iterations {
        let action = Action::shell("ls", Some("-la".to_string()));
        engine.evaluate(&action);
    }

    let elapsed = start.elapsed();
    let per_check = elapsed / iterations;

    assert!(
        per_check.as_micros() < 1000,
        "Policy evaluation took {}us per check (target: <1000us)",
        per_check.as_micros()
    );
}
