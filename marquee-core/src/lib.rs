pub mod error;
pub mod models;
pub mod repository;

pub use error::{CoreError, CoreResult, PublishError, StoreError, StoreResult, TransitionError};
pub use models::{
    MovieId, PurchaseRequest, ScreenId, Seat, SeatAvailability, SeatId, SeatSpec, Showtime,
    ShowtimeId, TheaterId, Ticket, TicketId,
};
pub use repository::{CatalogService, EventPublisher, SeatStore, TicketStore};
