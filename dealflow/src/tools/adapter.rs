//! Tool adapters and the adapter registry.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// A failure reported by an adapter, classified for retry purposes.
///
/// Classification is the adapter's job: it knows which of its backend's
/// errors are worth another attempt. The gateway only reads the class.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolFailure {
    /// Worth retrying: network timeout, rate limit, flaky upstream.
    #[error("transient: {detail}")]
    Transient {
        /// Backend-supplied detail.
        detail: String,
    },

    /// Not worth retrying: bad request, auth failure, unsupported input.
    #[error("permanent: {detail}")]
    Permanent {
        /// Backend-supplied detail.
        detail: String,
    },
}

impl ToolFailure {
    /// Creates a transient failure.
    #[must_use]
    pub fn transient(detail: impl Into<String>) -> Self {
        Self::Transient {
            detail: detail.into(),
        }
    }

    /// Creates a permanent failure.
    #[must_use]
    pub fn permanent(detail: impl Into<String>) -> Self {
        Self::Permanent {
            detail: detail.into(),
        }
    }

    /// Whether the gateway may retry this failure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// The backend-supplied detail.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Transient { detail } | Self::Permanent { detail } => detail,
        }
    }
}

/// An adapter for one external capability: market-data lookup, web search,
/// document generation, and whatever else a deployment wires in.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// The name workers address the tool by.
    fn name(&self) -> &str;

    /// Performs one attempt. The gateway owns timeout and retry; adapters
    /// just execute and classify failures.
    async fn call(&self, params: &serde_json::Value) -> Result<serde_json::Value, ToolFailure>;
}

/// Registry of adapters by name.
#[derive(Default)]
pub struct ToolRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn ToolAdapter>>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its own name. Last registration wins.
    pub fn register(&self, adapter: Arc<dyn ToolAdapter>) {
        self.adapters
            .write()
            .insert(adapter.name().to_string(), adapter);
    }

    /// Looks up an adapter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolAdapter>> {
        self.adapters.read().get(name).cloned()
    }

    /// Whether an adapter is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.adapters.read().contains_key(name)
    }

    /// Registered tool names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.adapters.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}
