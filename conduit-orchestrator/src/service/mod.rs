//! Service Module
//!
//! Business logic behind the HTTP API. Services validate input, talk to the
//! repositories and the execution adapter, and never block on a running
//! orchestration; the scheduler does the waiting.

pub mod execution;

pub use execution::{ExecutionError, ExecutionService};
