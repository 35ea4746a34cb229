//! Consent Gate — composes the policy engine, the approval channel, and the
//! audit sink into a single `decide(action) -> Verdict` entry point, and
//! owns the host-approval cache.
//!
//! Kept as a plain value type with injected collaborators (`Arc<dyn
//! Channel>`, `Arc<dyn AuditSink>`), not a singleton — the shell-gate
//! endpoint and the proxy each hold a clone of the same `Arc<ConsentGate>`.

use std::collections::HashMap;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::audit::AuditSink;
use crate::channel::Channel;
use crate::policy::types::{Action, ActionKind, PolicyAction, Verdict};
use crate::policy::PolicyEngine;

const DEFAULT_ASK_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_HOST_APPROVAL_TTL_SEC: u64 = 180;

pub struct ConsentGate {
    engine: PolicyEngine,
    channel: Arc<dyn Channel>,
    audit: Arc<dyn AuditSink>,
    host_cache: Mutex<HashMap<String, Instant>>,
    host_approval_ttl: Duration,
}

impl ConsentGate {
    pub fn new(engine: PolicyEngine, channel: Arc<dyn Channel>, audit: Arc<dyn AuditSink>) -> Self {
        let host_approval_ttl = env::var("ACP_HTTP_HOST_APPROVAL_TTL_SEC")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_HOST_APPROVAL_TTL_SEC));

        Self {
            engine,
            channel,
            audit,
            host_cache: Mutex::new(HashMap::new()),
            host_approval_ttl,
        }
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    /// `decide(action) -> verdict`. Always resolves to allow or deny,
    /// always appends one audit entry (see module doc on the cached-allow /
    /// token-grace asymmetry below).
    pub async fn decide(&self, action: Action) -> Verdict {
        let result = self.engine.evaluate(&action);

        let verdict = match result.action {
            PolicyAction::Allow => Verdict::allow(result.reason),
            PolicyAction::Deny => Verdict::deny(result.reason),
            PolicyAction::Ask => self.resolve_ask(&action, result.timeout).await,
        };

        self.audit.append(action, verdict.clone()).await;
        verdict
    }

    async fn resolve_ask(&self, action: &Action, timeout_secs: Option<u64>) -> Verdict {
        if action.kind == ActionKind::Http {
            if let Some(host) = &action.host {
                let normalized = normalize_host(host);
                if self.cache_has_unexpired(&normalized) {
                    return Verdict::allow("Approved by human (cached host approval)");
                }
            }
        }

        let timeout = timeout_secs.map(Duration::from_secs).unwrap_or(DEFAULT_ASK_TIMEOUT);
        let response = self.channel.ask(action, timeout).await;

        if !response.approved {
            return Verdict::deny(response.reason.unwrap_or_else(|| "Denied by operator".to_string()));
        }

        if action.kind == ActionKind::Http {
            if let Some(host) = &action.host {
                self.cache_insert(&normalize_host(host));
            }
        }

        Verdict::allow("Approved by human")
    }

    fn cache_has_unexpired(&self, host: &str) -> bool {
        let mut cache = self.host_cache.lock().unwrap();
        prune(&mut cache);
        cache.contains_key(host)
    }

    /// Inserts `host` and its "www twin" — `www.example.com` if given
    /// `example.com`, or the stripped form if given `www.example.com`.
    fn cache_insert(&self, host: &str) {
        let mut cache = self.host_cache.lock().unwrap();
        let expires_at = Instant::now() + self.host_approval_ttl;
        cache.insert(host.to_string(), expires_at);

        if let Some(stripped) = host.strip_prefix("www.") {
            cache.insert(stripped.to_string(), expires_at);
        } else if host.contains('.') {
            cache.insert(format!("www.{}", host), expires_at);
        }
    }
}

fn prune(cache: &mut HashMap<String, Instant>) {
    let now = Instant::now();
    cache.retain(|_, expires_at| *expires_at > now);
}

fn normalize_host(host: &str) -> String {
    host.to_lowercase().trim_end_matches('.').to_string()
}
