pub mod sink;
pub mod types;

pub use sink::{AuditSink, FileAuditSink, MemoryAuditSink};
pub use types::*;
