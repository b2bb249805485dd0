//! Reasoning client: retried calls to the text-generation service plus the
//! helpers that turn its loosely formatted output into typed values.

mod client;
mod json;
mod retry;
mod trace;

pub use client::ReasoningClient;
pub use json::parse_structured;
pub use trace::{parse_trace, TraceEntry, TraceKind};
