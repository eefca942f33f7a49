pub mod inventory;

pub use inventory::{AvailabilitySummary, SeatInventory};
