//! The delta envelope data model (spec §3). The core treats these as opaque
//! JSON — it serializes, compresses, and encrypts them without interpreting
//! `context` or any `path`/`value` pair.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single `{path, value}` update inside a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathValue {
    pub path: String,
    pub value: Value,
}

/// One timestamped group of path/value updates inside a [`DeltaEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub values: Vec<PathValue>,
}

/// The host-supplied record this transport carries. Opaque beyond the shape
/// needed to serialize/deserialize it — the core never inspects `context` or
/// any individual path/value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaEnvelope {
    pub context: String,
    pub updates: Vec<Update>,
}

impl DeltaEnvelope {
    /// Approximate serialized size without actually serializing — used by
    /// the batcher to fold a new delta's cost into its running EMA before a
    /// batch is actually built. Callers that need the exact size should
    /// serialize and measure instead.
    pub fn estimated_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// A batch of deltas flushed together as one DATA payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaBatch {
    pub deltas: Vec<DeltaEnvelope>,
}
