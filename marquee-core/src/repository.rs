use async_trait::async_trait;

use crate::error::{PublishError, StoreResult};
use crate::models::{Seat, SeatSpec, Showtime, ShowtimeId, Ticket};

/// Read-only view of the theater catalog.
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn showtime(&self, id: ShowtimeId) -> StoreResult<Option<Showtime>>;

    async fn showtime_exists(&self, id: ShowtimeId) -> StoreResult<bool> {
        Ok(self.showtime(id).await?.is_some())
    }
}

/// Seat rows per showtime.
#[async_trait]
pub trait SeatStore: Send + Sync {
    /// Current snapshot ordered by seat id.
    async fn seats_for_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Vec<Seat>>;

    /// Inserts specs whose (screen, showtime, label) triple does not exist yet
    /// and returns every seat matching the requested triples, old or new,
    /// ordered by seat id.
    async fn insert_seats(&self, specs: &[SeatSpec]) -> StoreResult<Vec<Seat>>;
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Persists `ticket` and marks each of its seats Sold with the ticket's id,
    /// all or nothing. Fails with `StoreError::Conflict` if any seat is no
    /// longer Available.
    async fn commit_ticket(&self, ticket: &Ticket) -> StoreResult<()>;

    async fn tickets_for_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Vec<Ticket>>;
}

/// Outbound integration events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), PublishError>;
}
