//! Approval-token store — the process-wide grace window shared between the
//! shell-gate endpoint and the HTTP forward proxy.
//!
//! The store is deliberately a *set* of tokens, not a per-request token: the
//! proxy sees outbound traffic milliseconds after the shell-gate approves
//! and cannot correlate a specific request to a specific token without
//! terminating TLS. A recent global approval is treated as a grace window
//! instead — `any_valid()` answers "has a human approved *anything*
//! recently?" rather than "does this request carry a valid token?".

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;

const TOKEN_TTL: Duration = Duration::from_secs(60);

/// Concurrent writers from the shell-gate endpoint, concurrent readers from
/// the proxy. A single mutex is enough — entries are cheap and short-lived.
pub struct ApprovalTokenStore {
    tokens: Mutex<HashMap<String, Instant>>,
}

impl ApprovalTokenStore {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Mint a fresh token with a 60s TTL and record it.
    pub fn mint(&self) -> String {
        let token = format!("tok_{}", random_suffix(8));
        self.tokens
            .lock()
            .unwrap()
            .insert(token.clone(), Instant::now() + TOKEN_TTL);
        token
    }

    /// True iff at least one unexpired token exists. Prunes expired entries
    /// as a side effect.
    pub fn any_valid(&self) -> bool {
        let mut tokens = self.tokens.lock().unwrap();
        let now = Instant::now();
        tokens.retain(|_, expires_at| *expires_at > now);
        !tokens.is_empty()
    }

    /// Discard entries past expiry without otherwise answering a query.
    pub fn sweep(&self) {
        let mut tokens = self.tokens.lock().unwrap();
        let now = Instant::now();
        tokens.retain(|_, expires_at| *expires_at > now);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }
}

impl Default for ApprovalTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

fn random_suffix(len: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_produces_prefixed_token() {
        let store = ApprovalTokenStore::new();
        let token = store.mint();
        assert!(token.starts_with("tok_"));
        assert_eq!(token.len(), 12);
    }

    #[test]
    fn test_any_valid_true_after_mint() {
        let store = ApprovalTokenStore::new();
        assert!(!store.any_valid());
        store.mint();
        assert!(store.any_valid());
    }

    #[test]
    fn test_sweep_discards_expired() {
        let store = ApprovalTokenStore::new();
        store
            .tokens
            .lock()
            .unwrap()
            .insert("tok_expired".to_string(), Instant::now() - Duration::from_secs(1));
        store.sweep();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_any_valid_prunes_expired_entries() {
        let store = ApprovalTokenStore::new();
        store
            .tokens
            .lock()
            .unwrap()
            .insert("tok_expired".to_string(), Instant::now() - Duration::from_secs(1));
        assert!(!store.any_valid());
        assert_eq!(store.len(), 0);
    }
}
