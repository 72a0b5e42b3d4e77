//! Core types and error definitions for the Triad coordination core.
//!
//! This crate provides the foundational types shared across all Triad crates:
//! the unified error enum, task and engine-result models, status events, and
//! the configuration tree consumed by every subsystem.
//!
//! # Main types
//!
//! - [`TriadError`] — Unified error enum for all Triad subsystems.
//! - [`TriadResult`] — Convenience alias for `Result<T, TriadError>`.
//! - [`Task`] — A unit of work moving through the coordinator state machine.
//! - [`EngineResult`] — The output (or degraded/missing marker) of one engine.
//! - [`StatusEvent`] — A task/engine/worker state transition for observers.
//! - [`TriadConfig`] — The TOML-backed configuration surface.

/// Configuration tree consumed (not owned) by the subsystems.
pub mod config;
/// Status events and subscription filters.
pub mod event;
/// Task, strategy, and engine-result models.
pub mod task;

pub use config::{
    CoordinatorConfig, CreativeConfig, PoolConfig, RecallConfig, ServerConfig, StatusConfig,
    TriadConfig,
};
pub use event::{StatusEvent, SubjectKind, SubscriptionFilter};
pub use task::{
    EngineKind, EngineResult, FailureCode, IntakeRequest, MergePolicy, ResultStatus, Strategy,
    Task, TaskStatus,
};

/// Top-level error type for the Triad coordination core.
///
/// Each variant corresponds to a subsystem that can produce errors. Per-engine
/// timeouts and degraded recall results are *not* errors — they are absorbed
/// into [`EngineResult`] metadata and only escalate through the strategy's
/// mandatory-engine set.
#[derive(Debug, thiserror::Error)]
pub enum TriadError {
    /// Malformed intake, rejected synchronously and never enqueued.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An error from the recall store.
    #[error("Recall error: {0}")]
    Recall(String),

    /// An error from the worker pool.
    #[error("Pool error: {0}")]
    Pool(String),

    /// Worker-death requeue exceeded the bounded retry limit.
    #[error("Max retries exceeded: {0}")]
    MaxRetriesExceeded(String),

    /// Every registered generation strategy failed.
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// An error from the engine coordinator.
    #[error("Coordinator error: {0}")]
    Coordinator(String),

    /// An error from the status broadcaster.
    #[error("Status error: {0}")]
    Status(String),

    /// An error from the HTTP/WebSocket gateway.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`TriadError`].
pub type TriadResult<T> = Result<T, TriadError>;
