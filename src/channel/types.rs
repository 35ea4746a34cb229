//! Shared types for the approval channel variants.

/// What a channel returns from `ask`: approve or refuse, with an optional
/// reason carried along for denials (surfaced in the verdict and the
/// audit entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskResponse {
    pub approved: bool,
    pub reason: Option<String>,
}

impl AskResponse {
    pub fn approved() -> Self {
        Self {
            approved: true,
            reason: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
        }
    }
}

/// A prompt the push channel is waiting on. Lives only inside
/// `channel::push` for the duration of the wait.
pub struct PendingPrompt {
    pub request_id: String,
    pub deadline: tokio::time::Instant,
}
