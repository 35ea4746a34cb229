//! Glob matching for policy `match` clauses.
//!
//! Two flavors are needed because shell command names and HTTP hosts behave
//! differently than filesystem-ish paths:
//! - **Path flavor**: a single `*` stops at `/`; `**` crosses it. Used for
//!   `path` and `args` fields that may carry a path-shaped value.
//! - **Simple flavor**: both `*` and `**` match across everything, including
//!   `/`. Used for `tool`/`name`, `host`, `method`, `command`.
//!
//! `?` matches exactly one character in both flavors. Every other regex
//! metacharacter is escaped. Patterns are anchored at both ends — a glob
//! matches the whole string or not at all.

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobFlavor {
    Path,
    Simple,
}

/// A glob pattern compiled once into an anchored regex.
#[derive(Debug, Clone)]
pub struct CompiledGlob {
    regex: Regex,
}

impl CompiledGlob {
    pub fn compile(pattern: &str, flavor: GlobFlavor) -> Result<Self, regex::Error> {
        let body = translate(pattern, flavor);
        let anchored = format!("^{}$", body);
        Ok(Self {
            regex: Regex::new(&anchored)?,
        })
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.regex.is_match(s)
    }
}

/// One-shot convenience for call sites that don't want to hold a compiled
/// matcher around (policy compilation pre-compiles instead, see `engine.rs`).
pub fn glob_match(pattern: &str, s: &str, flavor: GlobFlavor) -> bool {
    match CompiledGlob::compile(pattern, flavor) {
        Ok(g) => g.is_match(s),
        Err(_) => false,
    }
}

fn translate(pattern: &str, flavor: GlobFlavor) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '*' {
            // look ahead for a second '*'
            if i + 1 < chars.len() && chars[i + 1] == '*' {
                out.push_str(".*");
                i += 2;
                continue;
            }
            match flavor {
                GlobFlavor::Path => out.push_str("[^/]*"),
                GlobFlavor::Simple => out.push_str(".*"),
            }
            i += 1;
        } else if c == '?' {
            out.push('.');
            i += 1;
        } else {
            out.push_str(&regex::escape(&c.to_string()));
            i += 1;
        }
    }
    out
}
