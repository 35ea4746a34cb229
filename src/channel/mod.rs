//! The approval channel — the medium carrying a prompt to a human and their
//! answer back. Modeled as a small capability trait with per-variant state;
//! no shared base class, no inheritance.

pub mod format;
pub mod push;
pub mod terminal;
pub mod types;
pub mod webhook;

use std::time::Duration;

use async_trait::async_trait;

pub use types::{AskResponse, PendingPrompt};

use crate::policy::types::Action;

pub use push::PushChannel;
pub use terminal::TerminalChannel;
pub use webhook::WebhookChannel;

/// `ask(action, timeout) -> {approved, reason?}`.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn ask(&self, action: &Action, timeout: Duration) -> AskResponse;
}

/// Always approves. Useful for development and for policies whose author
/// has decided `ask` rules should behave like `allow` in a given environment.
pub struct AutoApprove;

#[async_trait]
impl Channel for AutoApprove {
    async fn ask(&self, _action: &Action, _timeout: Duration) -> AskResponse {
        AskResponse::approved()
    }
}

/// Always denies. Used for CI-style runs where no human is watching and
/// `ask` rules should fail closed rather than hang.
pub struct AutoDeny;

#[async_trait]
impl Channel for AutoDeny {
    async fn ask(&self, _action: &Action, _timeout: Duration) -> AskResponse {
        AskResponse::denied("No channel configured — auto-denied")
    }
}
