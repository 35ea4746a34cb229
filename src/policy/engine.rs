//! Policy decision engine.
//!
//! Evaluates agent actions against a policy's ordered rules and returns
//! `{action: allow|ask|deny, ...}`. Rules are evaluated **in order** — first
//! match wins. This is the same model as firewall rules (iptables, nginx,
//! etc.): put your most specific rules first, general rules last.
//!
//! Glob patterns are pre-compiled at policy load time, not per-request.

use std::sync::Mutex;

use chrono::Timelike;

use crate::policy::classify::classify;
use crate::policy::glob::{CompiledGlob, GlobFlavor};
use crate::policy::ratelimit::{RateLimit, RateLimiter};
use crate::policy::types::*;

/// Pre-compiled policy engine ready for fast evaluation. Created once from
/// a `Policy`, then used for every action check for the life of the gate.
pub struct PolicyEngine {
    policy: Policy,
    compiled_rules: Vec<CompiledRule>,
    rate_limiter: Mutex<RateLimiter>,
}

struct CompiledRule {
    tool: Option<CompiledGlob>,
    host: Option<CompiledGlob>,
    path: Option<CompiledGlob>,
    command: Option<CompiledGlob>,
    args_glob: Option<CompiledGlob>,
    args_named: Vec<(String, CompiledGlob)>,
    rate_limit: Option<RateLimit>,
}

impl PolicyEngine {
    /// Build an engine from a parsed policy, compiling every glob up front.
    /// A rule whose glob fails to compile is kept in the policy but matched
    /// as never-matching (`PolicyMalformed`: the rule is skipped, others
    /// still apply).
    pub fn new(policy: Policy) -> Self {
        let compiled_rules = policy
            .rules
            .iter()
            .map(|rule| compile_rule(&rule.match_clause, &rule.rate_limit))
            .collect();

        Self {
            policy,
            compiled_rules,
            rate_limiter: Mutex::new(RateLimiter::new()),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// `classify(name) -> Classification`.
    pub fn classify(&self, action: &Action) -> Classification {
        classify(action)
    }

    /// `evaluate(name, args, kind) -> PolicyResult`: rate-limit check first
    /// (without recording or consulting later rules on a hit), then record
    /// the call, then walk rules in order, then fall back to
    /// `default_action`.
    pub fn evaluate(&self, action: &Action) -> PolicyResult {
        let classification = classify(action);

        if let Some(result) = self.check_rate_limits(action, classification) {
            return result;
        }

        self.rate_limiter.lock().unwrap().record(&action.name);

        for (index, (rule, compiled)) in
            self.policy.rules.iter().zip(&self.compiled_rules).enumerate()
        {
            if !rule_matches(rule, compiled, action, classification) {
                continue;
            }
            return PolicyResult {
                action: rule.action,
                rule_index: Some(index),
                level: rule.level.clone(),
                timeout: rule.timeout,
                reason: format!("Matched rule {}", index),
            };
        }

        PolicyResult {
            action: self.policy.default_action,
            rule_index: None,
            level: None,
            timeout: None,
            reason: "No policy rule matched".to_string(),
        }
    }

    /// Step (2) of `evaluate`: if any rule whose `rate_limit` covers this
    /// action's name would be exceeded, deny immediately without recording
    /// the call or consulting later rules.
    fn check_rate_limits(
        &self,
        action: &Action,
        classification: Classification,
    ) -> Option<PolicyResult> {
        let mut limiter = self.rate_limiter.lock().unwrap();
        for (rule, compiled) in self.policy.rules.iter().zip(&self.compiled_rules) {
            let Some(limit) = compiled.rate_limit else {
                continue;
            };
            if !rule_matches(rule, compiled, action, classification) {
                continue;
            }
            if limiter.would_exceed(&action.name, limit) {
                let calls_in_window = limiter.count_in_window(&action.name, limit);
                return Some(PolicyResult {
                    action: PolicyAction::Deny,
                    rule_index: None,
                    level: None,
                    timeout: None,
                    reason: format!(
                        "Rate limit exceeded: {} for \"{}\" ({} calls in window)",
                        limit, action.name, calls_in_window
                    ),
                });
            }
        }
        None
    }
}

fn compile_rule(m: &MatchClause, rate_limit: &Option<String>) -> CompiledRule {
    let compile = |pattern: &str, flavor: GlobFlavor| CompiledGlob::compile(pattern, flavor).ok();

    let tool = m.tool.as_deref().and_then(|p| compile(p, GlobFlavor::Simple));
    let host = m.host.as_deref().and_then(|p| compile(p, GlobFlavor::Simple));
    let path = m.path.as_deref().and_then(|p| compile(p, GlobFlavor::Path));
    let command = m
        .command
        .as_deref()
        .and_then(|p| compile(p, GlobFlavor::Simple));

    let (args_glob, args_named) = match &m.args {
        Some(ArgsMatch::Glob(pattern)) => (compile(pattern, GlobFlavor::Simple), Vec::new()),
        Some(ArgsMatch::Named(map)) => (
            None,
            map.iter()
                .filter_map(|(k, v)| compile(v, GlobFlavor::Simple).map(|g| (k.clone(), g)))
                .collect(),
        ),
        None => (None, Vec::new()),
    };

    let rate_limit = rate_limit.as_deref().and_then(RateLimit::parse);

    CompiledRule {
        tool,
        host,
        path,
        command,
        args_glob,
        args_named,
        rate_limit,
    }
}

fn rule_matches(
    rule: &PolicyRule,
    compiled: &CompiledRule,
    action: &Action,
    classification: Classification,
) -> bool {
    let m = &rule.match_clause;

    if let Some(kind) = m.kind {
        if kind != action.kind {
            return false;
        }
    }
    if let Some(method) = &m.method {
        let matches = action
            .method
            .as_deref()
            .map(|actual| actual.eq_ignore_ascii_case(method))
            .unwrap_or(false);
        if !matches {
            return false;
        }
    }
    if let Some(category) = &m.category {
        if classification.category.to_string() != *category {
            return false;
        }
    }
    if let Some(glob) = &compiled.tool {
        if !glob.is_match(&action.name) {
            return false;
        }
    }
    if let Some(glob) = &compiled.host {
        if !glob.is_match(action.host.as_deref().unwrap_or("")) {
            return false;
        }
    }
    if let Some(glob) = &compiled.path {
        // No File action kind is implemented yet — reserved for when one is.
        if !glob.is_match("") {
            return false;
        }
    }
    if let Some(glob) = &compiled.command {
        if !glob.is_match(action.args.as_deref().unwrap_or("")) {
            return false;
        }
    }
    if let Some(glob) = &compiled.args_glob {
        if !glob.is_match(action.args.as_deref().unwrap_or("")) {
            return false;
        }
    }
    for (key, glob) in &compiled.args_named {
        let value = match key.as_str() {
            "url" | "args" => action.args.as_deref().unwrap_or(""),
            "host" => action.host.as_deref().unwrap_or(""),
            "method" => action.method.as_deref().unwrap_or(""),
            _ => "",
        };
        if !glob.is_match(value) {
            return false;
        }
    }
    if let Some(conditions) = &rule.conditions {
        if let Some(tod) = &conditions.time_of_day {
            if !time_of_day_matches(tod) {
                return false;
            }
        }
    }

    true
}

/// `conditions.time_of_day` is true when the current UTC minute-of-day
/// falls in `[after, before)`, wrapping past midnight when `after > before`.
/// A malformed `HH:MM` string makes the condition false (fail-closed).
fn time_of_day_matches(tod: &TimeOfDay) -> bool {
    let (Some(after), Some(before)) = (parse_hhmm(&tod.after), parse_hhmm(&tod.before)) else {
        return false;
    };
    let now = chrono::Utc::now();
    let minutes = now.hour() * 60 + now.minute();

    if after <= before {
        minutes >= after && minutes < before
    } else {
        minutes >= after || minutes < before
    }
}

fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}
