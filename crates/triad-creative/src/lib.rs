//! Solution generator — the creative engine of the Triad coordination core.
//!
//! Produces N ranked candidate outputs per request by fanning out to
//! pluggable generation strategies, deduplicating near-identical candidates,
//! and ranking by a composite quality/novelty score. Partial failure is
//! tolerated: one surviving strategy is enough; only when every strategy
//! fails does the engine report `GenerationUnavailable`.
//!
//! # Main types
//!
//! - [`GenerationStrategy`] — pluggable candidate source (the injected
//!   collaborator seam; real deployments back this with an inference call).
//! - [`SolutionGenerator`] — fan-out, dedup, rank, truncate.
//! - [`Candidate`] — one scored output.

/// Fan-out, dedup, and ranking.
pub mod generator;
/// Strategy trait and the built-in deterministic strategy.
pub mod strategy;

pub use generator::SolutionGenerator;
pub use strategy::{Candidate, GenerationStrategy, TemplateStrategy};
