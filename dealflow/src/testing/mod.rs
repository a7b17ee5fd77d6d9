//! Test doubles and fixtures.
//!
//! Scripted workers, canned tool adapters and an auto-resolving reviewer,
//! plus builders for the seven-stage lifecycle graph. Exported so embedders
//! can drive the engine in their own tests without re-inventing doubles.

pub mod fixtures;
pub mod mocks;
