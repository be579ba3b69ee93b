//! Core domain types
//!
//! These types are shared between the orchestrator (which persists and drives
//! them), the execution adapter (which sends them over the wire) and the CLI
//! (which displays them).

pub mod error_detail;
pub mod orchestration;
pub mod pipeline;
pub mod run;
