//! Conduit Core
//!
//! Core types and abstractions for the Conduit pipeline-run orchestrator.
//!
//! This crate contains:
//! - Domain types: pipeline requests, run statuses, activity errors and the
//!   persisted orchestration instance record
//! - DTOs: Data transfer objects for the orchestrator HTTP API

pub mod domain;
pub mod dto;
pub mod error;
