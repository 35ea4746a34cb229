//! Terminal channel — prompts the operator running the gate in a foreground
//! terminal. Writes a formatted prompt, reads a line from standard input;
//! `y`/`Y` means approved, anything else (including a closed stdin) means
//! denied.

use std::io::{self, Write};
use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;

use crate::channel::format::format_action;
use crate::channel::{AskResponse, Channel};
use crate::policy::types::Action;

pub struct TerminalChannel;

impl TerminalChannel {
    pub fn new() -> Self {
        Self
    }

    fn print_prompt(action: &Action) {
        let display = format_action(action);
        println!();
        println!("{}", "─".repeat(48).dimmed());
        println!("{} {}", "Approval requested:".bold(), display.title.yellow());
        if !display.detail.is_empty() {
            println!("  {}", display.detail.dimmed());
        }
        print!("{} ", "Approve? [y/N]".bold());
        let _ = io::stdout().flush();
    }
}

impl Default for TerminalChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for TerminalChannel {
    async fn ask(&self, action: &Action, timeout: Duration) -> AskResponse {
        Self::print_prompt(action);

        let read = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            io::stdin().read_line(&mut line).map(|_| line)
        });

        match tokio::time::timeout(timeout, read).await {
            Ok(Ok(Ok(line))) => {
                let trimmed = line.trim();
                if trimmed.eq_ignore_ascii_case("y") {
                    println!("{}", "approved".green());
                    AskResponse::approved()
                } else {
                    println!("{}", "denied".red());
                    AskResponse::denied("Denied by operator")
                }
            }
            Ok(Ok(Err(err))) => AskResponse::denied(format!("Terminal read error: {}", err)),
            Ok(Err(_)) => AskResponse::denied("Terminal read task failed"),
            Err(_) => {
                println!("{}", "timed out".red());
                AskResponse::denied("Timed out waiting for operator")
            }
        }
    }
}
