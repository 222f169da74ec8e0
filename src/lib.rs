//! Blockchain-node benchmark harness.
//!
//! A continuous-sampling monitoring pipeline feeds a wide, stable-schema CSV
//! and a live JSON snapshot while a ramp controller drives an external load
//! generator through a QPS schedule. A real-time detector classifies the
//! first sustained bottleneck against CPU, memory, per-device I/O, network,
//! RPC quality, and node-health predicates.
//!
//! The crate is organized into functional modules:
//! - **error**: unified `thiserror` error hierarchy, mapped to process exit codes
//! - **models**: core domain types shared across every module
//! - **config**: immutable configuration assembly (defaults, TOML, env overrides) and validation
//! - **platform**: one-shot AWS/ENA platform detection at startup
//! - **logging**: decoupled, non-blocking logging pipeline
//! - **clock**: the shared tick source and stop-signal plumbing
//! - **rpc**: JSON-RPC client shared by the node and mainnet samplers
//! - **schema**: the stable, positional CSV column schema
//! - **samplers**: per-tick metric collection, one module per data source
//! - **aggregator**: joins sampler outputs into rows, owns the CSV/snapshot artifacts
//! - **overhead_report**: the separate per-process CPU/memory overhead CSV
//! - **detector**: the real-time bottleneck classifier and its state machine
//! - **ramp**: the QPS ramp controller and load-generator invocation
//! - **archiver**: per-run archive sealing and the global test history index
//! - **run**: end-to-end orchestration of one run

#![allow(dead_code)]

pub mod aggregator;
pub mod archiver;
pub mod clock;
pub mod config;
pub mod detector;
pub mod error;
pub mod logging;
pub mod models;
pub mod overhead_report;
pub mod platform;
pub mod ramp;
pub mod rpc;
pub mod run;
pub mod samplers;
pub mod schema;

pub use error::{AppError, Result};
pub use run::{Run, RunOutcome};

/// Library version, surfaced by `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
