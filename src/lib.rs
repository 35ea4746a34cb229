//! acp-gate — consent-enforcement gateway for autonomous AI agents.
//!
//! Exposes the core components (policy engine, audit sink, approval
//! channels, the consent gate, the token store, the shell-gate endpoint,
//! and the forward proxy) for the binary entrypoints and for integration
//! tests. See each module for its part of the design.

// Many items are pub for use by the shim binary and integration tests,
// which are separate compilation units — suppress false dead_code warnings.
#![allow(dead_code)]

pub mod audit;
pub mod channel;
pub mod error;
pub mod gate;
pub mod policy;
pub mod proxy;
pub mod shellgate;
pub mod tokenstore;
