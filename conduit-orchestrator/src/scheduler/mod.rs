//! Scheduler layer for the orchestrator
//!
//! Finds instances whose wake time has passed and hands them to the
//! coordinator, persisting each step before taking the next.

pub mod poller;

pub use poller::InstancePoller;
