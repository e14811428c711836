//! Metric wire and in-memory model.
//!
//! A metric is a tagged value: gauges carry an IEEE-754 64-bit `value`
//! with last-writer-wins semantics, counters carry a signed 64-bit
//! `delta` that accumulates on the server. On the wire the unused
//! carrier is absent; in memory it is an `Option`.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Metric Kind
// ============================================================================

/// The two metric families the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Last-writer-wins floating point sample.
    Gauge,
    /// Additive signed integer accumulator.
    Counter,
}

impl MetricKind {
    /// Parse the wire spelling of a metric kind.
    ///
    /// Anything other than `gauge` or `counter` is rejected; callers
    /// translate the error into their protocol's `No such metric`
    /// response.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s {
            "gauge" => Ok(Self::Gauge),
            "counter" => Ok(Self::Counter),
            other => Err(ValidationError::UnknownKind {
                kind: other.to_string(),
            }),
        }
    }

    /// The wire spelling of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Metric Payload
// ============================================================================

/// One metric as exchanged between agent and server.
///
/// Exactly one numeric carrier is populated: `value` for gauges,
/// `delta` for counters. The other is omitted from JSON entirely.
///
/// # Examples
///
/// ```rust
/// use metric_relay_core::MetricPayload;
///
/// let g = MetricPayload::gauge("HeapInuse", 1024.0);
/// assert_eq!(serde_json::to_string(&g).unwrap(),
///     r#"{"id":"HeapInuse","type":"gauge","value":1024.0}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload {
    /// Metric name; non-empty.
    pub id: String,

    /// Metric family; decides which carrier is meaningful.
    #[serde(rename = "type")]
    pub kind: MetricKind,

    /// Counter carrier; present iff `kind == Counter`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,

    /// Gauge carrier; present iff `kind == Gauge`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl MetricPayload {
    /// Build a gauge payload.
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    /// Build a counter payload.
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    /// Check the payload for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyId`] when the name is empty and
    /// [`ValidationError::MissingCarrier`] when the carrier matching
    /// `kind` is absent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        match self.kind {
            MetricKind::Gauge if self.value.is_none() => Err(ValidationError::MissingCarrier {
                kind: MetricKind::Gauge,
                carrier: "value",
            }),
            MetricKind::Counter if self.delta.is_none() => Err(ValidationError::MissingCarrier {
                kind: MetricKind::Counter,
                carrier: "delta",
            }),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Snapshot File Shape
// ============================================================================

/// On-disk snapshot of the server's in-memory store.
///
/// Serialized as a single JSON object `{"metrics": [...]}` and
/// overwritten whole on every snapshot write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub metrics: Vec<MetricPayload>,
}

// ============================================================================
// Validation Errors
// ============================================================================

/// Errors for malformed metric input; callers map these to their
/// protocol's 400-class responses.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("No such metric")]
    UnknownKind { kind: String },

    #[error("metric id must not be empty")]
    EmptyId,

    #[error("{kind} metric is missing its '{carrier}' field")]
    MissingCarrier {
        kind: MetricKind,
        carrier: &'static str,
    },

    #[error("invalid {kind} literal '{literal}'")]
    BadLiteral { kind: MetricKind, literal: String },

    #[error("malformed JSON body: {message}")]
    MalformedJson { message: String },

    #[error("signature mismatch")]
    BadSignature,
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
