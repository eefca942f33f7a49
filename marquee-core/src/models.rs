use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use marquee_shared::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, TransitionError};

/// Longest seat label accepted by bulk creation ("A1", "BALC-12", ...).
pub const MAX_SEAT_LABEL_LEN: usize = 16;

macro_rules! serial_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

serial_id!(
    /// A scheduled screening.
    ShowtimeId
);
serial_id!(ScreenId);
serial_id!(SeatId);
serial_id!(MovieId);
serial_id!(TheaterId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub Uuid);

impl TicketId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Immutable (movie, theater, screen, start time, price) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Showtime {
    pub id: ShowtimeId,
    pub theater_id: TheaterId,
    pub movie_id: MovieId,
    pub screen_id: ScreenId,
    pub starts_at: DateTime<Utc>,
    pub price_cents: i64,
}

// ============================================================================
// Seats
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatAvailability {
    #[default]
    Available,
    Reserved,
    Sold,
}

impl SeatAvailability {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatAvailability::Available => "AVAILABLE",
            SeatAvailability::Reserved => "RESERVED",
            SeatAvailability::Sold => "SOLD",
        }
    }

    /// Sold is terminal. Available -> Sold is the seat claim and is only
    /// performed inside one critical section, standing in for
    /// Available -> Reserved -> Sold.
    pub fn can_transition_to(&self, next: SeatAvailability) -> bool {
        use SeatAvailability::*;
        matches!(
            (self, next),
            (Available, Reserved) | (Available, Sold) | (Reserved, Sold) | (Reserved, Available)
        )
    }

    pub fn transition(self, next: SeatAvailability) -> Result<SeatAvailability, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError { from: self, to: next })
        }
    }
}

impl fmt::Display for SeatAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatAvailability {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(SeatAvailability::Available),
            "RESERVED" => Ok(SeatAvailability::Reserved),
            "SOLD" => Ok(SeatAvailability::Sold),
            other => Err(CoreError::Validation(format!("unknown seat availability '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub screen_id: ScreenId,
    pub showtime_id: ShowtimeId,
    pub label: String,
    pub accessible: bool,
    pub availability: SeatAvailability,
    pub ticket_id: Option<TicketId>,
}

impl Seat {
    pub fn is_available(&self) -> bool {
        self.availability == SeatAvailability::Available
    }

    /// Claim the seat for `ticket_id`.
    pub fn sell(&mut self, ticket_id: TicketId) -> Result<(), TransitionError> {
        self.availability = self.availability.transition(SeatAvailability::Sold)?;
        self.ticket_id = Some(ticket_id);
        Ok(())
    }

    pub fn key(&self) -> (ScreenId, ShowtimeId, &str) {
        (self.screen_id, self.showtime_id, self.label.as_str())
    }
}

/// Bulk-create input for one seat of a showtime's seat map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatSpec {
    pub screen_id: ScreenId,
    pub showtime_id: ShowtimeId,
    pub label: String,
    #[serde(default)]
    pub accessible: bool,
    #[serde(default)]
    pub availability: SeatAvailability,
}

impl SeatSpec {
    pub fn new(screen_id: ScreenId, showtime_id: ShowtimeId, label: impl Into<String>) -> Self {
        Self {
            screen_id,
            showtime_id,
            label: label.into(),
            accessible: false,
            availability: SeatAvailability::Available,
        }
    }

    pub fn accessible(mut self) -> Self {
        self.accessible = true;
        self
    }

    pub fn key(&self) -> (ScreenId, ShowtimeId, &str) {
        (self.screen_id, self.showtime_id, self.label.as_str())
    }

    pub fn validate(&self) -> CoreResult<()> {
        let label = self.label.trim();
        if label.is_empty() {
            return Err(CoreError::Validation("seat label must not be blank".to_string()));
        }
        if label.chars().count() > MAX_SEAT_LABEL_LEN {
            return Err(CoreError::Validation(format!(
                "seat label '{}' exceeds {} characters",
                label, MAX_SEAT_LABEL_LEN
            )));
        }
        if self.availability == SeatAvailability::Sold {
            return Err(CoreError::Validation(format!(
                "seat '{}' cannot be created sold; seats are sold only by issuing a ticket",
                label
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// Issued once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub showtime_id: ShowtimeId,
    pub purchaser: Masked<String>,
    pub price_cents: i64,
    pub seat_ids: BTreeSet<SeatId>,
    pub issued_at: DateTime<Utc>,
}

/// A reservation attempt: resolved within one call to either an issued
/// ticket or a rejection with no state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub showtime_id: ShowtimeId,
    pub seat_ids: BTreeSet<SeatId>,
    pub purchaser: Masked<String>,
    pub price_cents: i64,
}

impl PurchaseRequest {
    pub fn new(
        showtime_id: ShowtimeId,
        seat_ids: impl IntoIterator<Item = SeatId>,
        purchaser: impl Into<String>,
        price_cents: i64,
    ) -> Self {
        Self {
            showtime_id,
            seat_ids: seat_ids.into_iter().collect(),
            purchaser: Masked(purchaser.into()),
            price_cents,
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.seat_ids.is_empty() {
            return Err(CoreError::Validation("at least one seat must be requested".to_string()));
        }
        if self.price_cents <= 0 {
            return Err(CoreError::Validation(format!(
                "price must be positive, got {} cents",
                self.price_cents
            )));
        }
        let purchaser = self.purchaser.expose().trim();
        if purchaser.is_empty() || !purchaser.contains('@') {
            return Err(CoreError::Validation("purchaser must be an e-mail address".to_string()));
        }
        Ok(())
    }
}
