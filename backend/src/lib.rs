//! HTTP query surface for the artifact enhancement policy solver.
//!
//! Thin axum layer over `artifact_solver`: a bounded single-flight policy
//! cache plus the most recent upgrade/reroll handles as the query session.

pub mod env_config;
pub mod server;

pub use server::{create_router, AppState, ServerState};
