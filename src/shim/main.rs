//! acp-shim — the shell-side half of the consent gate.
//!
//! Installed as a symlink over whatever binary a policy wants gated
//! (`rm` -> acp-shim, `curl` -> acp-shim, ...). On invocation it POSTs
//! `{name, args}` to the shell-gate endpoint's `/consent` route and:
//! - `approved:true` -> execs the real binary found further down `PATH`,
//!   exits with its status.
//! - `approved:false` -> prints the reason, exits `126`.
//! - the real binary can't be found on `PATH` -> exits `127`.
//! - the gate is unreachable -> fails closed, exits `126`.

use std::env;
use std::path::{Path, PathBuf};
use std::process;

use serde::{Deserialize, Serialize};

const DEFAULT_GATE_URL: &str = "http://127.0.0.1:8443/consent";

#[derive(Serialize)]
struct ConsentRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<&'a str>,
}

#[derive(Deserialize)]
struct ConsentResponse {
    approved: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    let invoked_as = args
        .first()
        .and_then(|a| Path::new(a).file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "acp-shim".to_string());
    let command_args = &args[1..];

    let mut full_command_line = vec![invoked_as.clone()];
    full_command_line.extend(command_args.iter().cloned());
    let joined_args = full_command_line.join(" ");
    let args_field = Some(joined_args.as_str());

    let gate_url = env::var("ACP_SHELL_GATE_URL").unwrap_or_else(|_| DEFAULT_GATE_URL.to_string());

    match request_consent(&gate_url, &invoked_as, args_field).await {
        Ok(response) if response.approved => match exec_real_binary(&invoked_as, command_args) {
            Some(code) => process::exit(code),
            None => {
                eprintln!("[acp-shim] '{}' not found on PATH", invoked_as);
                process::exit(127);
            }
        },
        Ok(response) => {
            eprintln!(
                "[acp-shim] BLOCKED: {} — {}",
                invoked_as,
                response.reason.unwrap_or_else(|| "denied by policy".to_string())
            );
            process::exit(126);
        }
        Err(err) => {
            eprintln!("[acp-shim] gate unreachable, failing closed: {}", err);
            process::exit(126);
        }
    }
}

async fn request_consent(
    gate_url: &str,
    name: &str,
    args: Option<&str>,
) -> Result<ConsentResponse, reqwest::Error> {
    let client = reqwest::Client::builder()
        .user_agent("acp-shim/0.1.0")
        .build()?;

    client
        .post(gate_url)
        .json(&ConsentRequest { name, args })
        .send()
        .await?
        .json::<ConsentResponse>()
        .await
}

/// Find the real binary further down `PATH`, skipping this shim's own
/// location so the search doesn't recurse into itself, then exec it and
/// return its exit code.
fn exec_real_binary(name: &str, args: &[String]) -> Option<i32> {
    let self_path = env::current_exe().ok();
    let path_var = env::var_os("PATH")?;

    for dir in env::split_paths(&path_var) {
        let candidate: PathBuf = dir.join(name);
        if !candidate.is_file() {
            continue;
        }
        if let (Some(self_path), Ok(candidate_canon)) = (&self_path, candidate.canonicalize()) {
            if self_path == &candidate_canon {
                continue;
            }
        }

        let status = process::Command::new(&candidate).args(args).status().ok()?;
        return Some(status.code().unwrap_or(1));
    }

    None
}
