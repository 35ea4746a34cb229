//! Webhook channel — POSTs a consent request to an operator-configured URL
//! and waits for a JSON `{approved, reason?}` response.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channel::{AskResponse, Channel};
use crate::policy::types::Action;

const SHARED_SECRET_HEADER: &str = "X-ACP-Shared-Secret";

#[derive(Serialize)]
struct ConsentRequestBody<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    action: &'a Action,
}

#[derive(Deserialize)]
struct ConsentResponseBody {
    approved: bool,
    #[serde(default)]
    reason: Option<String>,
}

pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
    shared_secret: Option<String>,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, shared_secret: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("acp-gate/0.1.0")
                .build()
                .unwrap_or_default(),
            url: url.into(),
            shared_secret,
        }
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    async fn ask(&self, action: &Action, timeout: Duration) -> AskResponse {
        let body = ConsentRequestBody {
            kind: "consent_request",
            action,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(secret) = &self.shared_secret {
            request = request.header(SHARED_SECRET_HEADER, secret);
        }

        let attempt = async {
            let response = request.send().await?;
            response.json::<ConsentResponseBody>().await
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(Ok(body)) => {
                if body.approved {
                    AskResponse::approved()
                } else {
                    AskResponse::denied(body.reason.unwrap_or_else(|| "Denied by webhook".to_string()))
                }
            }
            Ok(Err(err)) => AskResponse::denied(format!("Channel unreachable: {}", err)),
            Err(_) => AskResponse::denied("Timed out waiting for webhook response"),
        }
    }
}
