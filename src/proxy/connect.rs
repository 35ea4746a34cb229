//! `CONNECT host:port` tunneling — the HTTPS path through the forward proxy.
//!
//! State machine: `Opening -> Authorizing -> Connecting -> Open -> Closed`.
//! Parse failure, gate deny, connect failure, or cancellation all collapse
//! to `Closed` after writing the matching status; `Open` only splits on
//! socket close on either side.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::gate::ConsentGate;
use crate::policy::types::Action;
use crate::proxy::status_only;
use crate::tokenstore::ApprovalTokenStore;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_TLS_PORT: u16 = 443;

pub async fn handle(
    req: Request<Incoming>,
    gate: Arc<ConsentGate>,
    tokens: Arc<ApprovalTokenStore>,
) -> Response<Full<Bytes>> {
    // Opening: parse `host:port` from the request target.
    let Some((host, port)) = parse_target(req.uri()) else {
        return status_only(StatusCode::BAD_REQUEST);
    };

    // Authorizing.
    if !tokens.any_valid() {
        let action = Action::http("CONNECT", format!("{}:{}", host, port), host.clone(), Some(port));
        let verdict = gate.decide(action).await;
        if verdict.is_deny() {
            return status_only(StatusCode::FORBIDDEN);
        }
    }

    // Connecting.
    let connect_result = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host.as_str(), port))).await;
    let upstream = match connect_result {
        Ok(Ok(stream)) => stream,
        Ok(Err(_)) => return status_only(StatusCode::BAD_GATEWAY),
        Err(_) => return status_only(StatusCode::GATEWAY_TIMEOUT),
    };

    // Open: the 200 response itself triggers the client to start the raw
    // byte stream; splicing happens once hyper upgrades the connection.
    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => splice(upgraded, upstream).await,
            Err(err) => tracing::debug!(error = %err, "CONNECT upgrade failed"),
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

/// Open -> Closed: bidirectional splice with no idle timeout. Long-poll
/// style tunnels (bot APIs, SSE) must be able to sit open indefinitely.
async fn splice(upgraded: hyper::upgrade::Upgraded, mut upstream: TcpStream) {
    let mut client_io = TokioIo::new(upgraded);
    if let Err(err) = tokio::io::copy_bidirectional(&mut client_io, &mut upstream).await {
        tracing::debug!(error = %err, "CONNECT tunnel closed");
    }
}

fn parse_target(uri: &hyper::Uri) -> Option<(String, u16)> {
    let authority = uri.authority()?;
    let host = authority.host().to_string();
    let port = authority.port_u16().unwrap_or(DEFAULT_TLS_PORT);
    Some((host, port))
}
