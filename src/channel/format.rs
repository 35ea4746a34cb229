//! Shared action-display formatting used by every channel variant.
//!
//! Shell actions display the command basename and (truncated) args; for
//! runtime wrappers (`node`, `python`, `python3`) the basename is replaced
//! by the basename of the first non-flag argument, since `node server.js`
//! is a far more useful prompt than `node`. HTTP actions display
//! `METHOD host` and the full URL.

use std::path::Path;

use crate::policy::types::{Action, ActionKind};

const MAX_ARGS_LEN: usize = 200;
const RUNTIME_WRAPPERS: &[&str] = &["node", "python", "python3"];

/// Human-facing summary of an action, split into a short title and a
/// (possibly longer) detail line.
pub struct ActionDisplay {
    pub title: String,
    pub detail: String,
}

pub fn format_action(action: &Action) -> ActionDisplay {
    match action.kind {
        ActionKind::Shell => format_shell(action),
        ActionKind::Http => format_http(action),
    }
}

fn format_shell(action: &Action) -> ActionDisplay {
    let args = action.args.as_deref().unwrap_or("");
    let title = if RUNTIME_WRAPPERS.contains(&action.name.as_str()) {
        first_non_flag_basename(args).unwrap_or_else(|| action.name.clone())
    } else {
        action.name.clone()
    };

    ActionDisplay {
        title,
        detail: truncate(args, MAX_ARGS_LEN),
    }
}

fn format_http(action: &Action) -> ActionDisplay {
    let method = action.method.as_deref().unwrap_or("?");
    let host = action.host.as_deref().unwrap_or("?");
    let url = action.args.as_deref().unwrap_or("");
    ActionDisplay {
        title: format!("{} {}", method, host),
        detail: url.to_string(),
    }
}

fn first_non_flag_basename(args: &str) -> Option<String> {
    let first = args.split_whitespace().find(|tok| !tok.starts_with('-'))?;
    let basename = Path::new(first).file_name()?.to_str()?;
    Some(basename.to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut truncated: String = s.chars().take(max).collect();
        truncated.push('\u{2026}');
        truncated
    }
}
