//! `ecoguardian`: automation, alerting and insights for environmental
//! sensor telemetry.
//!
//! This crate follows the Explicit Module Boundary Pattern (EMBP): each
//! directory module exposes its surface through its `mod.rs` gateway, and
//! the binary only talks to those gateways.
//!
//! - `engine` – threshold policy, rule evaluation, cooldown, actuation, alert fan-out
//! - `insights` – trends, patterns, correlations, peak hours, recommendations
//! - `store` – storage traits with in-memory and Postgres backends
//! - `channels` – notification senders
//! - `ingest` – device payload codec
//! - `routes` – HTTP boundary

pub mod channels;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod insights;
pub mod models;
pub mod routes;
pub mod schema;
pub mod store;

pub use config::Config;
pub use engine::{DecisionResult, Engine};
pub use error::{EngineError, Result};
