//! HTTP/WebSocket gateway for the Triad coordination core.
//!
//! Thin surface over the coordinator and the status broadcaster:
//!
//! - `POST /tasks` — intake; accepted tasks return `202` with the task id.
//! - `GET /tasks/{id}` — task snapshot with sub-results and merged output.
//! - `GET /health` — liveness probe.
//! - `GET /ws/status` — live status stream; the first client frame may carry
//!   a JSON subscription filter.

/// Router, handlers, and the serve loop.
pub mod server;
/// WebSocket status-stream connection handling.
pub mod ws;

pub use server::{router, serve, AppState};
