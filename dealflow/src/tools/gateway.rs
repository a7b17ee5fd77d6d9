//! The tool gateway: timeout, retry, deduplication, audit.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{RetryConfig, ToolCall, ToolOutput, ToolRecord, ToolRegistry};
use crate::cancellation::CancellationToken;
use crate::errors::ToolError;
use crate::events::{EventSink, NoOpEventSink};

/// Gateway tuning knobs.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Retry policy for transient failures.
    pub retry: RetryConfig,
    /// Per-attempt timeout. A timed-out attempt counts as transient.
    pub call_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Uniform wrapper around every external side-effecting call.
///
/// Guarantees callers a single terminal result: the adapter's value, or one
/// classified error. Transient failures are retried with backoff inside;
/// permanent failures propagate immediately; calls carrying an idempotency
/// key are deduplicated so retries of write-style tools cannot double their
/// side effects.
pub struct ToolGateway {
    registry: Arc<ToolRegistry>,
    config: GatewayConfig,
    dedup: DashMap<String, ToolOutput>,
    events: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl ToolGateway {
    /// Creates a gateway over a registry with default config.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            config: GatewayConfig::default(),
            dedup: DashMap::new(),
            events: Arc::new(NoOpEventSink),
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the gateway config.
    #[must_use]
    pub fn with_config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink receiving tool audit events.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Shares a cancellation token; in-flight calls and backoff sleeps
    /// abort when it fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The retry policy in effect.
    #[must_use]
    pub fn retry_config(&self) -> &RetryConfig {
        &self.config.retry
    }

    /// Invokes a tool call to a terminal result.
    ///
    /// # Errors
    ///
    /// - [`ToolError::NotFound`] for an unregistered tool.
    /// - [`ToolError::Permanent`] as classified by the adapter.
    /// - [`ToolError::Exhausted`] when transient failures outlast the
    ///   retry budget (attempt timeouts count as transient).
    /// - [`ToolError::Cancelled`] when the run is aborted mid-call.
    pub async fn invoke(&self, call: ToolCall) -> Result<ToolOutput, ToolError> {
        let started = Instant::now();
        let started_at = Utc::now();

        if let Some(key) = &call.idempotency_key {
            if let Some(cached) = self.dedup.get(key) {
                let mut output = cached.value().clone();
                output.from_cache = true;
                self.events.try_emit(
                    "tool.cached",
                    Some(serde_json::json!({
                        "call_id": call.id,
                        "tool": call.tool,
                        "idempotency_key": key,
                    })),
                );
                return Ok(output);
            }
        }

        let adapter = self.registry.get(&call.tool).ok_or_else(|| ToolError::NotFound {
            tool: call.tool.clone(),
        })?;

        self.events.try_emit(
            "tool.invoked",
            Some(serde_json::json!({
                "call_id": call.id,
                "tool": call.tool,
            })),
        );

        let mut attempts = 0u32;
        let outcome = loop {
            attempts += 1;

            let attempt_result = tokio::select! {
                () = self.cancel.cancelled() => {
                    break Err(ToolError::Cancelled { tool: call.tool.clone() });
                }
                result = tokio::time::timeout(self.config.call_timeout, adapter.call(&call.params)) => {
                    match result {
                        Ok(inner) => inner,
                        Err(_elapsed) => Err(super::ToolFailure::transient(format!(
                            "attempt timed out after {:?}",
                            self.config.call_timeout
                        ))),
                    }
                }
            };

            match attempt_result {
                Ok(value) => break Ok(value),
                Err(failure) if failure.is_transient() => {
                    if !self.config.retry.allows_retry(attempts) {
                        break Err(ToolError::Exhausted {
                            tool: call.tool.clone(),
                            attempts,
                            last: failure.detail().to_string(),
                        });
                    }
                    let delay = self.config.retry.delay_after(attempts);
                    debug!(
                        tool = %call.tool,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        detail = failure.detail(),
                        "transient tool failure, backing off"
                    );
                    self.events.try_emit(
                        "tool.retry",
                        Some(serde_json::json!({
                            "call_id": call.id,
                            "tool": call.tool,
                            "attempt": attempts,
                            "detail": failure.detail(),
                        })),
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => {
                            break Err(ToolError::Cancelled { tool: call.tool.clone() });
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(failure) => {
                    break Err(ToolError::Permanent {
                        tool: call.tool.clone(),
                        detail: failure.detail().to_string(),
                    });
                }
            }
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        let record = ToolRecord {
            call_id: call.id,
            tool: call.tool.clone(),
            attempts,
            latency_ms,
            error: outcome.as_ref().err().map(ToString::to_string),
            started_at,
        };

        match outcome {
            Ok(value) => {
                let output = ToolOutput {
                    value,
                    attempts,
                    latency_ms,
                    from_cache: false,
                };
                if let Some(key) = &call.idempotency_key {
                    self.dedup.insert(key.clone(), output.clone());
                }
                self.events.try_emit("tool.completed", Some(record.to_payload()));
                Ok(output)
            }
            Err(err) => {
                warn!(tool = %call.tool, attempts, error = %err, "tool call failed");
                self.events.try_emit("tool.failed", Some(record.to_payload()));
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for ToolGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGateway")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("cached_keys", &self.dedup.len())
            .finish()
    }
}
