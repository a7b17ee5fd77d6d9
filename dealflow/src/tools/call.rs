//! Tool call descriptors, outputs and audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A request for one external capability invocation.
///
/// Write-style tools (e.g. document generation) should carry an idempotency
/// key so gateway-level retries and repeated worker attempts cannot produce
/// duplicate side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique id of this call, for correlation in the run log.
    pub id: Uuid,
    /// The adapter name to invoke.
    pub tool: String,
    /// Tool parameters.
    pub params: serde_json::Value,
    /// Deduplication key for side-effecting tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl ToolCall {
    /// Creates a call with a fresh id and no idempotency key.
    #[must_use]
    pub fn new(tool: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool: tool.into(),
            params,
            idempotency_key: None,
        }
    }

    /// Sets an explicit idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Derives the idempotency key from the tool name and parameters.
    ///
    /// Suitable when the parameters fully determine the side effect.
    #[must_use]
    pub fn idempotent(mut self) -> Self {
        let params = serde_json::to_string(&self.params).unwrap_or_default();
        self.idempotency_key = Some(generate_idempotency_key(&[&self.tool, &params]));
        self
    }
}

/// Generates a stable idempotency key from components.
#[must_use]
pub fn generate_idempotency_key(components: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(components.join(":").as_bytes());
    let digest = hasher.finalize();
    format!("idem:{}", hex::encode(&digest[..16]))
}

/// The terminal result of a gateway invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The adapter's result value.
    pub value: serde_json::Value,
    /// Attempts made, including the first. 0 for cache hits.
    pub attempts: u32,
    /// Total wall time spent inside the gateway, in milliseconds.
    pub latency_ms: u64,
    /// True when the result was served from the idempotency cache.
    pub from_cache: bool,
}

/// Audit record of one gateway invocation, terminal either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRecord {
    /// The call id.
    pub call_id: Uuid,
    /// The tool name.
    pub tool: String,
    /// Attempts made.
    pub attempts: u32,
    /// Total latency in milliseconds.
    pub latency_ms: u64,
    /// Error string for failed calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the gateway accepted the call.
    pub started_at: DateTime<Utc>,
}

impl ToolRecord {
    /// Converts the record into an event payload.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "call_id": self.call_id,
            "tool": self.tool,
            "attempts": self.attempts,
            "latency_ms": self.latency_ms,
            "error": self.error,
        })
    }
}
