//! Data Transfer Objects for the orchestrator API
//!
//! These are the request and response bodies exchanged between the CLI and
//! the orchestrator. Pipeline requests and run statuses travel as-is; only
//! orchestration bookkeeping gets dedicated DTOs.

pub mod execution;
