pub mod coordinator;
pub mod issuer;
pub mod locks;

pub use coordinator::ReservationCoordinator;
pub use issuer::TicketIssuer;
pub use locks::ShowtimeLocks;
pub use tokio_util::sync::CancellationToken;
