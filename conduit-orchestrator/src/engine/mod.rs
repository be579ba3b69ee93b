//! Orchestration engine
//!
//! Durable state machine that turns a pipeline request into a terminal run
//! status. The engine never sleeps: waits are persisted wake times and the
//! scheduler calls back into [`Coordinator::advance`] when they are due.

pub mod clock;
pub mod coordinator;
pub mod poll;
pub mod retry;

pub use clock::{Clock, SystemClock};
pub use coordinator::{Coordinator, Step};
pub use poll::PollLoop;
pub use retry::RetryPolicy;

use thiserror::Error;
use uuid::Uuid;

use crate::repository::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Instance {id} cannot advance: {reason}")]
    InvalidState { id: Uuid, reason: String },
}

impl EngineError {
    fn invalid(id: Uuid, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            id,
            reason: reason.into(),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
