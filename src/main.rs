//! acp-gated — wires the policy engine, audit sink, approval channel, and
//! token store into the two listening endpoints (shell-gate, forward proxy).
//!
//! Deliberately thin: no setup wizard, no `init`/`log` UX. Given a policy
//! file and a channel choice, it starts both listeners over one shared
//! `Arc<ConsentGate>` and one shared `Arc<ApprovalTokenStore>` — the same
//! "one process, two listeners, shared state passed in" shape as the
//! teacher's `GatewayServer`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use acp_gate::audit::FileAuditSink;
use acp_gate::channel::{Channel, PushChannel, TerminalChannel, WebhookChannel};
use acp_gate::error::GateError;
use acp_gate::gate::ConsentGate;
use acp_gate::policy::{parser, PolicyEngine};
use acp_gate::proxy::ProxyServer;
use acp_gate::shellgate::ShellGateServer;
use acp_gate::tokenstore::ApprovalTokenStore;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

#[derive(Parser)]
#[command(
    name = "acp-gated",
    version,
    about = "Consent-enforcement gateway for autonomous AI agents"
)]
struct Cli {
    /// Path to the YAML policy file.
    #[arg(long, env = "ACP_POLICY_PATH", default_value = ".acp-gate.yaml")]
    policy: PathBuf,

    /// Address the shell-gate endpoint (`POST /consent`) listens on.
    #[arg(long, env = "ACP_SHELL_GATE_ADDR", default_value = "127.0.0.1:8443")]
    shell_gate_addr: SocketAddr,

    /// Address the HTTP forward proxy listens on.
    #[arg(long, env = "ACP_PROXY_ADDR", default_value = "127.0.0.1:8444")]
    proxy_addr: SocketAddr,

    /// Where to append the audit JSONL log. Defaults to `~/.acp-gate/audit/audit.jsonl`.
    #[arg(long, env = "ACP_AUDIT_LOG_PATH")]
    audit_log: Option<PathBuf>,

    /// Which approval channel to prompt a human through.
    #[arg(long, env = "ACP_CHANNEL", value_enum, default_value_t = ChannelKind::Terminal)]
    channel: ChannelKind,

    /// Webhook URL (required when `--channel webhook`).
    #[arg(long, env = "ACP_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Shared secret sent as `X-ACP-Shared-Secret` on webhook requests.
    #[arg(long, env = "ACP_WEBHOOK_SECRET")]
    webhook_secret: Option<String>,

    /// Telegram bot token (required when `--channel push`).
    #[arg(long, env = "ACP_TELEGRAM_BOT_TOKEN")]
    telegram_bot_token: Option<String>,

    /// Telegram chat id to send prompts to (required when `--channel push`).
    #[arg(long, env = "ACP_TELEGRAM_CHAT_ID")]
    telegram_chat_id: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ChannelKind {
    Terminal,
    Webhook,
    Push,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("acp_gate=info".parse().unwrap()),
        )
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    let policy = parser::parse_policy_file(&cli.policy)
        .with_context(|| format!("Failed to load policy file: {}", cli.policy.display()))?;
    tracing::info!(path = %cli.policy.display(), rules = policy.rules.len(), "Loaded policy");

    let engine = PolicyEngine::new(policy);
    let channel = build_channel(&cli)?;

    let audit_path = match cli.audit_log.clone() {
        Some(path) => path,
        None => FileAuditSink::default_directory()?.join("audit.jsonl"),
    };
    let audit = Arc::new(FileAuditSink::new(&audit_path)?);
    tracing::info!(path = %audit_path.display(), "Audit log");

    let gate = Arc::new(ConsentGate::new(engine, channel, audit));
    let tokens = Arc::new(ApprovalTokenStore::new());

    let shellgate = ShellGateServer::new(cli.shell_gate_addr, gate.clone(), tokens.clone());
    let proxy = ProxyServer::new(cli.proxy_addr, gate.clone(), tokens.clone());

    tokio::try_join!(shellgate.run(), proxy.run())?;
    Ok(())
}

fn build_channel(cli: &Cli) -> Result<Arc<dyn Channel>> {
    match cli.channel {
        ChannelKind::Terminal => Ok(Arc::new(TerminalChannel::new())),
        ChannelKind::Webhook => {
            let url = cli
                .webhook_url
                .clone()
                .ok_or_else(|| GateError::ChannelUnreachable("ACP_WEBHOOK_URL not set".to_string()))?;
            Ok(Arc::new(WebhookChannel::new(url, cli.webhook_secret.clone())))
        }
        ChannelKind::Push => {
            let bot_token = cli.telegram_bot_token.clone().ok_or_else(|| {
                GateError::ChannelUnreachable("ACP_TELEGRAM_BOT_TOKEN not set".to_string())
            })?;
            let chat_id = cli.telegram_chat_id.clone().ok_or_else(|| {
                GateError::ChannelUnreachable("ACP_TELEGRAM_CHAT_ID not set".to_string())
            })?;
            Ok(Arc::new(PushChannel::new(bot_token, chat_id)))
        }
    }
}
