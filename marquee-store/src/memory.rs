use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use marquee_core::{
    CatalogService, ScreenId, Seat, SeatId, SeatSpec, SeatStore, Showtime, ShowtimeId,
    StoreError, StoreResult, Ticket, TicketStore,
};
use parking_lot::RwLock;

type SeatKey = (ScreenId, ShowtimeId, String);

#[derive(Default)]
struct Inner {
    showtimes: HashMap<ShowtimeId, Showtime>,
    seats: BTreeMap<SeatId, Seat>,
    seat_index: HashMap<SeatKey, SeatId>,
    next_seat_id: i64,
    tickets: Vec<Ticket>,
}

/// Process-local store for tests and single-instance demos.
///
/// Every write takes the one write lock, so `commit_ticket` is atomic with
/// respect to every other reader and writer.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_showtime(&self, showtime: Showtime) {
        self.inner.write().showtimes.insert(showtime.id, showtime);
    }

    pub fn ticket_count(&self) -> usize {
        self.inner.read().tickets.len()
    }
}

#[async_trait]
impl CatalogService for MemoryStore {
    async fn showtime(&self, id: ShowtimeId) -> StoreResult<Option<Showtime>> {
        Ok(self.inner.read().showtimes.get(&id).cloned())
    }
}

#[async_trait]
impl SeatStore for MemoryStore {
    async fn seats_for_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Vec<Seat>> {
        let inner = self.inner.read();
        Ok(inner
            .seats
            .values()
            .filter(|seat| seat.showtime_id == showtime_id)
            .cloned()
            .collect())
    }

    async fn insert_seats(&self, specs: &[SeatSpec]) -> StoreResult<Vec<Seat>> {
        let mut inner = self.inner.write();
        let mut matched = Vec::with_capacity(specs.len());

        for spec in specs {
            let key = (spec.screen_id, spec.showtime_id, spec.label.clone());
            if let Some(id) = inner.seat_index.get(&key) {
                matched.push(*id);
                continue;
            }

            inner.next_seat_id += 1;
            let id = SeatId(inner.next_seat_id);
            inner.seats.insert(
                id,
                Seat {
                    id,
                    screen_id: spec.screen_id,
                    showtime_id: spec.showtime_id,
                    label: spec.label.clone(),
                    accessible: spec.accessible,
                    availability: spec.availability,
                    ticket_id: None,
                },
            );
            inner.seat_index.insert(key, id);
            matched.push(id);
        }

        matched.sort();
        matched.dedup();
        Ok(matched
            .into_iter()
            .filter_map(|id| inner.seats.get(&id).cloned())
            .collect())
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn commit_ticket(&self, ticket: &Ticket) -> StoreResult<()> {
        let mut inner = self.inner.write();

        // 1. Verify every seat before touching any of them
        let conflicts: Vec<SeatId> = ticket
            .seat_ids
            .iter()
            .filter(|id| {
                !inner
                    .seats
                    .get(*id)
                    .is_some_and(|seat| seat.showtime_id == ticket.showtime_id && seat.is_available())
            })
            .copied()
            .collect();

        if !conflicts.is_empty() {
            return Err(StoreError::Conflict(conflicts));
        }

        // 2. Claim
        for id in &ticket.seat_ids {
            if let Some(seat) = inner.seats.get_mut(id) {
                seat.sell(ticket.id)
                    .map_err(|e| StoreError::Corrupt(format!("seat {}: {}", id, e)))?;
            }
        }

        inner.tickets.push(ticket.clone());
        Ok(())
    }

    async fn tickets_for_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Vec<Ticket>> {
        Ok(self
            .inner
            .read()
            .tickets
            .iter()
            .filter(|t| t.showtime_id == showtime_id)
            .cloned()
            .collect())
    }
}
