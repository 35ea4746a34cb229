//! Shell-Gate Endpoint — the local HTTP server shell wrappers inside the
//! agent sandbox call before exec'ing their real binary.
//!
//! A listener loop spawns one task per connection, each task sharing the
//! same `Arc`-wrapped collaborators, serving real HTTP/1.1 (`POST /consent`,
//! `GET /health`) so that `curl`/any HTTP client can act as a wrapper.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::gate::ConsentGate;
use crate::policy::types::Action;
use crate::tokenstore::ApprovalTokenStore;

pub struct ShellGateServer {
    addr: SocketAddr,
    gate: Arc<ConsentGate>,
    tokens: Arc<ApprovalTokenStore>,
}

impl ShellGateServer {
    pub fn new(addr: SocketAddr, gate: Arc<ConsentGate>, tokens: Arc<ApprovalTokenStore>) -> Self {
        Self { addr, gate, tokens }
    }

    /// Bind and serve forever. Each accepted connection is handled
    /// concurrently; a faulty connection never blocks the others.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind shell-gate endpoint on {}", self.addr))?;

        tracing::info!(addr = %self.addr, "Shell-gate endpoint listening");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::error!(error = %err, "failed to accept shell-gate connection");
                    continue;
                }
            };

            let gate = self.gate.clone();
            let tokens = self.tokens.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| handle(req, gate.clone(), tokens.clone()));
                if let Err(err) = hyper::server::conn::http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    tracing::debug!(peer = %peer, error = %err, "shell-gate connection closed");
                }
            });
        }
    }
}

async fn handle(
    req: Request<Incoming>,
    gate: Arc<ConsentGate>,
    tokens: Arc<ApprovalTokenStore>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method().clone(), req.uri().path()) {
        (Method::POST, "/consent") => handle_consent(req, gate, tokens).await,
        (Method::GET, "/health") => health(),
        (_, "/consent") | (_, "/health") => empty_status(StatusCode::METHOD_NOT_ALLOWED),
        _ => empty_status(StatusCode::NOT_FOUND),
    };
    Ok(response)
}

#[derive(Deserialize)]
struct RawConsentRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    args: Option<String>,
}

#[derive(Serialize)]
struct ConsentResponse {
    approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl ConsentResponse {
    fn approved(token: String) -> Self {
        Self {
            approved: true,
            token: Some(token),
            reason: None,
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            token: None,
            reason: Some(reason.into()),
        }
    }
}

async fn handle_consent(
    req: Request<Incoming>,
    gate: Arc<ConsentGate>,
    tokens: Arc<ApprovalTokenStore>,
) -> Response<Full<Bytes>> {
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            return json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ConsentResponse::denied(format!("Gate error: {}", err)),
            )
        }
    };

    // Parsed in two passes: once loosely to tell "not JSON" apart from
    // "JSON, but missing the required field" (the two 400 cases the
    // contract distinguishes).
    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => {
            return json_response(StatusCode::BAD_REQUEST, &ConsentResponse::denied("Invalid JSON"))
        }
    };

    let parsed: RawConsentRequest = match serde_json::from_value(value) {
        Ok(p) => p,
        Err(_) => {
            return json_response(StatusCode::BAD_REQUEST, &ConsentResponse::denied("Invalid JSON"))
        }
    };

    let Some(name) = parsed.name else {
        return json_response(
            StatusCode::BAD_REQUEST,
            &ConsentResponse::denied("Missing \"name\" field"),
        );
    };

    let action = Action::shell(name, parsed.args);
    let verdict = gate.decide(action).await;

    if verdict.is_allow() {
        let token = tokens.mint();
        json_response(StatusCode::OK, &ConsentResponse::approved(token))
    } else {
        json_response(StatusCode::OK, &ConsentResponse::denied(verdict.reason))
    }
}

fn health() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &serde_json::json!({"status": "ok"}))
}

fn json_response(status: StatusCode, body: &impl Serialize) -> Response<Full<Bytes>> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn empty_status(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
