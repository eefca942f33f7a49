use crate::models::{SeatAvailability, SeatId, ShowtimeId};

fn join_ids(ids: &[SeatId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<String>>()
        .join(", ")
}

/// Errors returned by the inventory and reservation services.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Showtime not found: {0}")]
    ShowtimeNotFound(ShowtimeId),

    #[error("Seats not found for showtime: {}", join_ids(.0))]
    SeatNotFound(Vec<SeatId>),

    /// Expected outcome of a race; the client should re-fetch the seat map.
    #[error("Seats no longer available: {}", join_ids(.0))]
    SeatUnavailable(Vec<SeatId>),

    #[error("Request cancelled before seats were claimed")]
    Cancelled,

    #[error("Storage failure: {0}")]
    Storage(#[source] StoreError),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(ids) => CoreError::SeatUnavailable(ids),
            other => CoreError::Storage(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A seat changed state between the coordinator's check and the commit.
    #[error("Seat conflict on commit: {}", join_ids(.0))]
    Conflict(Vec<SeatId>),

    #[error("Database error: {0}")]
    Database(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid seat transition from {from} to {to}")]
pub struct TransitionError {
    pub from: SeatAvailability,
    pub to: SeatAvailability,
}

#[derive(Debug, thiserror::Error)]
#[error("Event publish failed: {0}")]
pub struct PublishError(pub String);
