//! # Metric-Relay Core
//!
//! Shared domain types and helpers for the metric-relay pipeline.
//!
//! This crate contains everything both processes agree on:
//! - The metric wire/in-memory model ([`model`])
//! - Fixed-size chunking for send waves ([`chunk`])
//! - HMAC-SHA256 payload signing and verification ([`sign`])
//! - The bounded-retry helper with its backoff schedule ([`retry`])
//!
//! The agent and server binaries depend on this crate; it depends on
//! nothing process-specific.

pub mod chunk;
pub mod model;
pub mod retry;
pub mod sign;

pub use chunk::split_chunks;
pub use model::{MetricKind, MetricPayload, MetricSnapshot, ValidationError};
pub use retry::run_with_retries;
pub use sign::{compute_signature, verify_signature};

/// Name of the HTTP header carrying the batch signature.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

/// Name of the HTTP header carrying the client address hint.
pub const REAL_IP_HEADER: &str = "X-Real-IP";
