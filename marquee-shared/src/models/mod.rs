pub mod events;

pub use events::{SeatsCreatedEvent, TicketIssuedEvent};
