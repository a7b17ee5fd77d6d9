//! The tool gateway: the single doorway to external side effects.
//!
//! Workers never talk to external services directly. They describe a call
//! ([`ToolCall`]), the gateway resolves the adapter, applies timeout and
//! retry policy, deduplicates by idempotency key, and returns exactly one
//! terminal result.

mod adapter;
mod call;
mod gateway;
mod retry;

pub use adapter::{ToolAdapter, ToolFailure, ToolRegistry};
pub use call::{generate_idempotency_key, ToolCall, ToolOutput, ToolRecord};
pub use gateway::{GatewayConfig, ToolGateway};
pub use retry::{Jitter, RetryConfig};
