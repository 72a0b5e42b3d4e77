//! Engine coordinator — intake, dispatch, and merge across the three engines.
//!
//! A task's strategy resolves exactly once at intake to a participation set,
//! a merge policy, and per-engine timeouts. Participating engines are
//! dispatched concurrently; results (or explicit missing markers) are
//! collected until the overall deadline, then merged deterministically.
//! A mandatory engine without a usable result fails the task; a
//! non-mandatory absence only degrades the merged output.
//!
//! # Main types
//!
//! - [`Coordinator`] — intake, task registry, the run loop, cancellation.
//! - [`Engine`] — the uniform dispatch seam over the three engines.
//! - [`StrategyPlan`] — a strategy resolved to its concrete profile.

/// Intake, run loop, and settlement.
pub mod coordinator;
/// Adapters exposing the recall store, worker pool, and solution generator
/// as dispatchable engines.
pub mod engines;
/// Merge policies over collected engine results.
pub mod merge;
/// Strategy resolution.
pub mod strategy;

pub use coordinator::Coordinator;
pub use engines::{CreativeEngine, Engine, MemoryEngine, ParallelEngine};
pub use merge::merge_results;
pub use strategy::{StrategyPlan, ENGINE_ORDER};
