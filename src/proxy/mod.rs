//! HTTP Forward Proxy — the component agents point `HTTP_PROXY`/
//! `HTTPS_PROXY` at. Accepts plain absolute-URI HTTP requests and `CONNECT`
//! tunnels, consults the Approval-Token Store first (the "token grace"
//! bypass) and falls back to the Consent Gate otherwise.
//!
//! Connection handling follows the same accept-loop-plus-spawn shape as
//! `shellgate`. Unlike the shell-gate endpoint, connections here must
//! support HTTP/1.1 `Upgrade` (for `CONNECT`), so the server is built
//! `.with_upgrades()`.

pub mod connect;
pub mod plain;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::gate::ConsentGate;
use crate::tokenstore::ApprovalTokenStore;

pub type ForwardClient = Client<HttpConnector, Incoming>;

pub struct ProxyServer {
    addr: SocketAddr,
    gate: Arc<ConsentGate>,
    tokens: Arc<ApprovalTokenStore>,
    client: ForwardClient,
}

impl ProxyServer {
    pub fn new(addr: SocketAddr, gate: Arc<ConsentGate>, tokens: Arc<ApprovalTokenStore>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            addr,
            gate,
            tokens,
            client,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind forward proxy on {}", self.addr))?;

        tracing::info!(addr = %self.addr, "HTTP forward proxy listening");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    tracing::error!(error = %err, "failed to accept proxy connection");
                    continue;
                }
            };

            let gate = self.gate.clone();
            let tokens = self.tokens.clone();
            let client = self.client.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service =
                    service_fn(move |req| handle(req, gate.clone(), tokens.clone(), client.clone()));
                if let Err(err) = hyper::server::conn::http1::Builder::new()
                    .serve_connection(io, service)
                    .with_upgrades()
                    .await
                {
                    tracing::debug!(peer = %peer, error = %err, "proxy connection closed");
                }
            });
        }
    }
}

async fn handle(
    req: Request<Incoming>,
    gate: Arc<ConsentGate>,
    tokens: Arc<ApprovalTokenStore>,
    client: ForwardClient,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.uri().path() == "/health" && req.method() == Method::GET {
        return Ok(json_response(StatusCode::OK, &serde_json::json!({"status": "ok"})));
    }

    if req.method() == Method::CONNECT {
        return Ok(connect::handle(req, gate, tokens).await);
    }

    Ok(plain::handle(req, gate, tokens, client).await)
}

pub(crate) fn json_response(status: StatusCode, body: &impl Serialize) -> Response<Full<Bytes>> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(json)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

pub(crate) fn status_only(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
