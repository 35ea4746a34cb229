//! Error kinds that cross a boundary the caller must match on — policy
//! loading, channel setup. `ConsentGate::decide` itself never returns one
//! of these; every decision resolves to a `Verdict`, never an `Err`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("policy is malformed: {0}")]
    PolicyMalformed(String),

    #[error("channel unreachable: {0}")]
    ChannelUnreachable(String),

    #[error("gate internal error: {0}")]
    GateInternal(String),
}
