//! End-to-end tests: the shell-gate endpoint and the forward proxy are run
//! as real HTTP servers on loopback sockets, driven through by an HTTP
//! client or a raw `CONNECT` handshake, exercising the full allow/deny/ask
//! flow including the host-approval cache, token grace, rate limiting,
//! and the ask timeout.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use acp_gate::audit::MemoryAuditSink;
use acp_gate::channel::{AskResponse, AutoApprove, AutoDeny, Channel};
use acp_gate::gate::ConsentGate;
use acp_gate::policy::{parser, Action, PolicyEngine};
use acp_gate::proxy::ProxyServer;
use acp_gate::shellgate::ShellGateServer;
use acp_gate::tokenstore::ApprovalTokenStore;
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

fn parse(yaml: &str) -> PolicyEngine {
    PolicyEngine::new(parser::parse_policy_str(yaml).unwrap())
}

async fn wait_for_bind() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

/// POST `{name, args}` to a running shell-gate endpoint, return the parsed
/// JSON body.
async fn post_consent(addr: SocketAddr, name: &str, args: Option<&str>) -> serde_json::Value {
    let client = reqwest::Client::new();
    client
        .post(format!("http://{}/consent", addr))
        .json(&serde_json::json!({"name": name, "args": args}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Send a raw `CONNECT host:port` through `proxy_addr` and return the
/// response status line plus the still-open socket for further I/O.
async fn connect_tunnel(proxy_addr: SocketAddr, target: &str) -> (String, TcpStream) {
    let mut stream = TcpStream::connect(proxy_addr).await.unwrap();
    let request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n\r\n", target, target);
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut reader = BufReader::new(&mut stream);
    let status_line = read_line(&mut reader).await;
    loop {
        if read_line(&mut reader).await == "\r\n" {
            break;
        }
    }

    (status_line.trim().to_string(), stream)
}

async fn read_line(reader: &mut BufReader<&mut TcpStream>) -> String {
    let mut line = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).await.unwrap();
        line.push(byte[0]);
        if line.ends_with(b"\r\n") {
            break;
        }
    }
    String::from_utf8_lossy(&line).to_string()
}

/// Plain TCP echo server, standing in for a real upstream host in `CONNECT`
/// tests — we only need to prove bytes make it through the tunnel.
async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                    if socket.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

/// Approves exactly once; a second call panics. Used to prove the host
/// cache (or token grace) is what lets a second request through, not a
/// second round-trip to the operator.
struct ApproveOnceThenPanic(AtomicBool);

impl ApproveOnceThenPanic {
    fn new() -> Self {
        Self(AtomicBool::new(false))
    }
}

#[async_trait]
impl Channel for ApproveOnceThenPanic {
    async fn ask(&self, _action: &Action, _timeout: Duration) -> AskResponse {
        if self.0.swap(true, Ordering::SeqCst) {
            panic!("channel consulted a second time — cache/grace window failed to short-circuit");
        }
        AskResponse::approved()
    }
}

/// Never resolves before the deadline it's given, forcing the gate's
/// timeout path.
struct NeverResponds;

#[async_trait]
impl Channel for NeverResponds {
    async fn ask(&self, _action: &Action, timeout: Duration) -> AskResponse {
        tokio::time::sleep(timeout + Duration::from_secs(3600)).await;
        unreachable!("test timeout should fire long before this wakes up");
    }
}

// Scenario 1 — allow by rule.
#[tokio::test]
async fn scenario_allow_by_rule() {
    let engine = parse(
        r#"
version: "1"
default_action: deny
rules:
  - match: { kind: shell, tool: "ls" }
    action: allow
"#,
    );
    let audit = Arc::new(MemoryAuditSink::new());
    let gate = Arc::new(ConsentGate::new(engine, Arc::new(AutoDeny), audit.clone()));
    let addr: SocketAddr = "127.0.0.1:29401".parse().unwrap();
    let server = ShellGateServer::new(addr, gate, Arc::new(ApprovalTokenStore::new()));
    tokio::spawn(async move { server.run().await.ok(); });
    wait_for_bind().await;

    let body = post_consent(addr, "ls", Some("-la /")).await;
    assert_eq!(body["approved"], true);
    assert!(body["token"].as_str().unwrap().starts_with("tok_"));

    let entries = audit.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].verdict.is_allow());
}

// Scenario 2 — deny by default, ask rules missing entirely; the channel is
// never touched and the audit reason names the real cause.
#[tokio::test]
async fn scenario_deny_by_default_never_prompts() {
    let engine = parse(
        r#"
version: "1"
default_action: deny
rules: []
"#,
    );
    let audit = Arc::new(MemoryAuditSink::new());
    let gate = Arc::new(ConsentGate::new(
        engine,
        Arc::new(ApproveOnceThenPanic::new()),
        audit.clone(),
    ));
    let proxy_addr: SocketAddr = "127.0.0.1:29402".parse().unwrap();
    let server = ProxyServer::new(proxy_addr, gate, Arc::new(ApprovalTokenStore::new()));
    tokio::spawn(async move { server.run().await.ok(); });
    wait_for_bind().await;

    let (status, _stream) = connect_tunnel(proxy_addr, "evil.example:443").await;
    assert!(status.contains("403"), "expected 403, got {}", status);

    let entries = audit.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].verdict.is_deny());
    assert_eq!(entries[0].verdict.reason, "No policy rule matched");
}

// Scenario 3 — human approves an HTTP action once; the second CONNECT to
// the same host within the cache TTL never reaches the channel.
#[tokio::test]
async fn scenario_second_connect_uses_host_cache() {
    let engine = parse(
        r#"
version: "1"
default_action: ask
rules: []
"#,
    );
    let audit = Arc::new(MemoryAuditSink::new());
    let gate = Arc::new(ConsentGate::new(
        engine,
        Arc::new(ApproveOnceThenPanic::new()),
        audit.clone(),
    ));
    let proxy_addr: SocketAddr = "127.0.0.1:29403".parse().unwrap();
    let server = ProxyServer::new(proxy_addr, gate, Arc::new(ApprovalTokenStore::new()));
    tokio::spawn(async move { server.run().await.ok(); });
    wait_for_bind().await;

    let target_addr = spawn_echo_server().await;
    let target = target_addr.to_string();

    let (first_status, mut first_tunnel) = connect_tunnel(proxy_addr, &target).await;
    assert!(first_status.contains("200"));
    first_tunnel.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    first_tunnel.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    let (second_status, _second_tunnel) = connect_tunnel(proxy_addr, &target).await;
    assert!(second_status.contains("200"));

    let entries = audit.entries();
    assert_eq!(entries.len(), 2);
    assert!(entries[1].verdict.reason.contains("cached host approval"));
}

// Scenario 4 — a shell approval mints a token that grants HTTP grace: the
// proxy never consults the gate (and so never the channel) for the
// CONNECT that follows within the token's TTL.
#[tokio::test]
async fn scenario_shell_approval_grants_http_grace() {
    let engine = parse(
        r#"
version: "1"
default_action: ask
rules: []
"#,
    );
    let audit = Arc::new(MemoryAuditSink::new());
    let gate = Arc::new(ConsentGate::new(engine, Arc::new(AutoApprove), audit.clone()));
    let tokens = Arc::new(ApprovalTokenStore::new());

    let shellgate_addr: SocketAddr = "127.0.0.1:29404".parse().unwrap();
    let shellgate = ShellGateServer::new(shellgate_addr, gate.clone(), tokens.clone());
    tokio::spawn(async move { shellgate.run().await.ok(); });

    let proxy_addr: SocketAddr = "127.0.0.1:29405".parse().unwrap();
    // A second gate, wired to AutoDeny, proves the proxy is bypassing the
    // gate entirely rather than happening to get an allow verdict.
    let engine2 = parse(
        r#"
version: "1"
default_action: ask
rules: []
"#,
    );
    let deny_gate = Arc::new(ConsentGate::new(engine2, Arc::new(AutoDeny), Arc::new(MemoryAuditSink::new())));
    let proxy = ProxyServer::new(proxy_addr, deny_gate, tokens.clone());
    tokio::spawn(async move { proxy.run().await.ok(); });
    wait_for_bind().await;

    let body = post_consent(shellgate_addr, "curl", Some("curl https://x.example")).await;
    assert_eq!(body["approved"], true);

    let target_addr = spawn_echo_server().await;
    let (status, _tunnel) = connect_tunnel(proxy_addr, &target_addr.to_string()).await;
    assert!(status.contains("200"), "expected token grace to open the tunnel, got {}", status);
}

// Scenario 5 — rate limit: two approvals, then a denial with the exact
// reason format, three audit entries with the last one a deny.
#[tokio::test]
async fn scenario_rate_limit_denies_third_call() {
    let engine = parse(
        r#"
version: "1"
default_action: deny
rules:
  - match: { tool: "git" }
    action: allow
    rate_limit: "2/minute"
"#,
    );
    let audit = Arc::new(MemoryAuditSink::new());
    let gate = Arc::new(ConsentGate::new(engine, Arc::new(AutoDeny), audit.clone()));
    let addr: SocketAddr = "127.0.0.1:29406".parse().unwrap();
    let server = ShellGateServer::new(addr, gate, Arc::new(ApprovalTokenStore::new()));
    tokio::spawn(async move { server.run().await.ok(); });
    wait_for_bind().await;

    let first = post_consent(addr, "git", None).await;
    let second = post_consent(addr, "git", None).await;
    let third = post_consent(addr, "git", None).await;

    assert_eq!(first["approved"], true);
    assert_eq!(second["approved"], true);
    assert_eq!(third["approved"], false);
    assert_eq!(
        third["reason"].as_str().unwrap(),
        "Rate limit exceeded: 2/minute for \"git\" (2 calls in window)"
    );

    let entries = audit.entries();
    assert_eq!(entries.len(), 3);
    assert!(entries[2].verdict.is_deny());
}

// Scenario 6 — timeout: the channel never answers, `decide` still resolves
// to deny within (roughly) the rule's timeout.
#[tokio::test]
async fn scenario_timeout_denies_within_deadline() {
    let engine = parse(
        r#"
version: "1"
default_action: ask
rules:
  - match: {}
    action: ask
    timeout: 1
"#,
    );
    let audit = Arc::new(MemoryAuditSink::new());
    let gate = ConsentGate::new(engine, Arc::new(NeverResponds), audit.clone());

    let start = std::time::Instant::now();
    let verdict = gate.decide(Action::shell("deploy", None)).await;
    let elapsed = start.elapsed();

    assert!(verdict.is_deny());
    assert!(verdict.reason.contains("Timed out"));
    assert!(elapsed < Duration::from_millis(1500), "took {:?}", elapsed);

    let entries = audit.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].verdict.reason.contains("Timed out"));
}
