//! Plain HTTP forwarding (`GET http://host/path HTTP/1.1`, etc).
//!
//! 1. Resolve an absolute URI, either straight from the request line or
//!    built from the `Host` header.
//! 2. `E.any_valid()` short-circuits straight to forwarding.
//! 3. Otherwise build an `Action` and consult the gate.
//! 4. On allow, forward upstream and stream the response back.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::{Request, Response, StatusCode, Uri};

use crate::gate::ConsentGate;
use crate::policy::types::Action;
use crate::proxy::{json_response, status_only, ForwardClient};
use crate::tokenstore::ApprovalTokenStore;

const PROXY_CONNECTION_HEADER: &str = "proxy-connection";

pub async fn handle(
    mut req: Request<Incoming>,
    gate: Arc<ConsentGate>,
    tokens: Arc<ApprovalTokenStore>,
    client: ForwardClient,
) -> Response<Full<Bytes>> {
    let Some(url) = resolve_absolute_uri(&req) else {
        return status_only(StatusCode::BAD_REQUEST);
    };

    let host = url.host().unwrap_or_default().to_string();
    let port = url.port_u16();
    let method = req.method().to_string();

    if !tokens.any_valid() {
        let action = Action::http(method, url.to_string(), host, port);
        let verdict = gate.decide(action).await;
        if verdict.is_deny() {
            return json_response(
                StatusCode::FORBIDDEN,
                &serde_json::json!({"error": "Blocked by ACP", "reason": verdict.reason}),
            );
        }
    }

    *req.uri_mut() = url;
    req.headers_mut().remove(PROXY_CONNECTION_HEADER);

    forward(req, client).await
}

async fn forward(req: Request<Incoming>, client: ForwardClient) -> Response<Full<Bytes>> {
    match client.request(req).await {
        Ok(upstream) => {
            let (parts, body) = upstream.into_parts();
            match body.collect().await {
                Ok(collected) => Response::from_parts(parts, Full::new(collected.to_bytes())),
                Err(_) => status_only(StatusCode::BAD_GATEWAY),
            }
        }
        Err(err) => {
            tracing::debug!(error = %err, "upstream request failed");
            status_only(StatusCode::BAD_GATEWAY)
        }
    }
}

/// Absolute URI straight off the request line, or built from the `Host`
/// header when the client sent an origin-form target. Generic over the
/// body type so the pure resolution logic is unit-testable without
/// constructing a real `Incoming` body.
fn resolve_absolute_uri<B>(req: &Request<B>) -> Option<Uri> {
    if req.uri().scheme().is_some() && req.uri().authority().is_some() {
        return Some(req.uri().clone());
    }

    let host = req
        .headers()
        .get(hyper::header::HOST)
        .and_then(|v: &HeaderValue| v.to_str().ok())?;
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    format!("http://{}{}", host, path_and_query).parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_absolute_uri_passes_through_absolute_form() {
        let req = Request::builder().uri("http://example.com/foo").body(()).unwrap();
        let uri = resolve_absolute_uri(&req).unwrap();
        assert_eq!(uri, "http://example.com/foo");
    }

    #[test]
    fn test_resolve_absolute_uri_builds_from_host_header() {
        let req = Request::builder()
            .uri("/foo?bar=1")
            .header("host", "example.com")
            .body(())
            .unwrap();
        let uri = resolve_absolute_uri(&req).unwrap();
        assert_eq!(uri, "http://example.com/foo?bar=1");
    }

    #[test]
    fn test_resolve_absolute_uri_fails_without_host() {
        let req = Request::builder().uri("/foo").body(()).unwrap();
        assert!(resolve_absolute_uri(&req).is_none());
    }
}
