use std::collections::HashMap;
use std::sync::Arc;

use marquee_core::{
    CatalogService, CoreError, CoreResult, PurchaseRequest, Seat, SeatId, SeatStore, Showtime,
    ShowtimeId, StoreError, Ticket, TicketStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::issuer::TicketIssuer;
use crate::locks::ShowtimeLocks;

/// Serializes purchases per showtime so that no seat is ever sold twice.
///
/// A purchase is all seats or nothing: either every requested seat goes from
/// Available to Sold under one new ticket, or the call fails and nothing
/// changed. The coordinator never retries; a `SeatUnavailable` result tells
/// the client to re-fetch the seat map and pick again.
pub struct ReservationCoordinator {
    catalog: Arc<dyn CatalogService>,
    seats: Arc<dyn SeatStore>,
    issuer: Arc<TicketIssuer>,
    locks: Arc<ShowtimeLocks>,
}

impl ReservationCoordinator {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        seats: Arc<dyn SeatStore>,
        tickets: Arc<dyn TicketStore>,
    ) -> Self {
        Self {
            catalog,
            seats,
            issuer: Arc::new(TicketIssuer::new(tickets)),
            locks: Arc::new(ShowtimeLocks::new()),
        }
    }

    pub fn locks(&self) -> &ShowtimeLocks {
        &self.locks
    }

    pub async fn reserve_and_issue(&self, request: PurchaseRequest) -> CoreResult<Ticket> {
        self.reserve_and_issue_cancellable(request, &CancellationToken::new())
            .await
    }

    /// Like `reserve_and_issue`, but gives up with `Cancelled` if `cancel`
    /// fires while waiting for the showtime lock. Once the lock is held the
    /// claim runs on its own task and always finishes, even if the caller
    /// stops polling.
    pub async fn reserve_and_issue_cancellable(
        &self,
        request: PurchaseRequest,
        cancel: &CancellationToken,
    ) -> CoreResult<Ticket> {
        // 1. Shape and references, no lock needed
        request.validate()?;
        let showtime = self
            .catalog
            .showtime(request.showtime_id)
            .await?
            .ok_or(CoreError::ShowtimeNotFound(request.showtime_id))?;

        // 2. Wait for the showtime, unless the caller gives up first
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let acquired = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            guard = self.locks.acquire(showtime.id) => Some(guard),
        };
        let Some(guard) = acquired else {
            self.locks.release_if_idle(showtime.id);
            debug!("Purchase for showtime {} cancelled while waiting", showtime.id);
            return Err(CoreError::Cancelled);
        };
        debug!("Lock acquired for showtime {}", showtime.id);

        // 3. Critical section. The guard moves into the task and is released
        //    on every exit path, panics included. The last one out removes the
        //    showtime's registry entry.
        let seats = Arc::clone(&self.seats);
        let issuer = Arc::clone(&self.issuer);
        let locks = Arc::clone(&self.locks);
        let showtime_id = showtime.id;
        let critical = tokio::spawn(async move {
            let result = claim(seats.as_ref(), &issuer, &showtime, request).await;
            drop(guard);
            locks.release_if_idle(showtime_id);
            result
        });

        let result = match critical.await {
            Ok(result) => result,
            Err(e) => Err(CoreError::Storage(StoreError::Unavailable(format!(
                "claim for showtime {} aborted: {}",
                showtime_id, e
            )))),
        };

        match &result {
            Ok(ticket) => info!(
                "Ticket {} issued for showtime {}: {} seat(s)",
                ticket.id,
                showtime_id,
                ticket.seat_ids.len()
            ),
            Err(CoreError::SeatUnavailable(ids)) => warn!(
                "Purchase rejected for showtime {}: {} seat(s) unavailable",
                showtime_id,
                ids.len()
            ),
            Err(e) => warn!("Purchase failed for showtime {}: {}", showtime_id, e),
        }

        result
    }

    pub async fn tickets_for_showtime(&self, showtime_id: ShowtimeId) -> CoreResult<Vec<Ticket>> {
        if !self.catalog.showtime_exists(showtime_id).await? {
            return Err(CoreError::ShowtimeNotFound(showtime_id));
        }
        self.issuer.tickets_for_showtime(showtime_id).await
    }
}

/// Runs with the showtime lock held.
async fn claim(
    seats: &dyn SeatStore,
    issuer: &TicketIssuer,
    showtime: &Showtime,
    request: PurchaseRequest,
) -> CoreResult<Ticket> {
    // 1. Re-read the current state
    let current = seats.seats_for_showtime(showtime.id).await?;
    let by_id: HashMap<SeatId, &Seat> = current.iter().map(|seat| (seat.id, seat)).collect();

    let missing: Vec<SeatId> = request
        .seat_ids
        .iter()
        .filter(|id| {
            by_id
                .get(*id)
                .map_or(true, |seat| seat.screen_id != showtime.screen_id)
        })
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(CoreError::SeatNotFound(missing));
    }

    let taken: Vec<SeatId> = request
        .seat_ids
        .iter()
        .filter(|id| by_id.get(*id).is_some_and(|seat| !seat.is_available()))
        .copied()
        .collect();
    if !taken.is_empty() {
        return Err(CoreError::SeatUnavailable(taken));
    }

    // 2. Issue
    issuer
        .issue(
            showtime.id,
            request.seat_ids,
            request.purchaser,
            request.price_cents,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use marquee_core::{
        MovieId, ScreenId, SeatAvailability, SeatSpec, StoreResult, TheaterId,
    };
    use marquee_store::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const S: ShowtimeId = ShowtimeId(1);

    fn showtime(id: ShowtimeId, screen: i64) -> Showtime {
        Showtime {
            id,
            theater_id: TheaterId(1),
            movie_id: MovieId(1),
            screen_id: ScreenId(screen),
            starts_at: Utc::now(),
            price_cents: 1500,
        }
    }

    /// Showtime S on screen 1 with seats A1 and A2, both Available.
    async fn setup() -> (Arc<MemoryStore>, ReservationCoordinator, SeatId, SeatId) {
        let store = Arc::new(MemoryStore::new());
        store.insert_showtime(showtime(S, 1));
        let seats = store
            .insert_seats(&[
                SeatSpec::new(ScreenId(1), S, "A1"),
                SeatSpec::new(ScreenId(1), S, "A2"),
            ])
            .await
            .unwrap();
        let coordinator = ReservationCoordinator::new(store.clone(), store.clone(), store.clone());
        (store, coordinator, seats[0].id, seats[1].id)
    }

    async fn availability(store: &MemoryStore, showtime_id: ShowtimeId) -> Vec<SeatAvailability> {
        store
            .seats_for_showtime(showtime_id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.availability)
            .collect()
    }

    #[tokio::test]
    async fn test_purchase_claims_all_seats() {
        let (store, coordinator, a1, a2) = setup().await;

        let ticket = coordinator
            .reserve_and_issue(PurchaseRequest::new(S, [a1, a2], "a@x.com", 1500))
            .await
            .unwrap();

        assert_eq!(ticket.seat_ids, [a1, a2].into());
        assert_eq!(ticket.purchaser.expose(), "a@x.com");
        assert_eq!(
            availability(&store, S).await,
            vec![SeatAvailability::Sold, SeatAvailability::Sold]
        );
        let seats = store.seats_for_showtime(S).await.unwrap();
        assert!(seats.iter().all(|s| s.ticket_id == Some(ticket.id)));
    }

    #[tokio::test]
    async fn test_sold_seat_is_rejected_without_side_effects() {
        let (store, coordinator, a1, a2) = setup().await;
        coordinator
            .reserve_and_issue(PurchaseRequest::new(S, [a1, a2], "a@x.com", 1500))
            .await
            .unwrap();
        let before = store.seats_for_showtime(S).await.unwrap();

        let err = coordinator
            .reserve_and_issue(PurchaseRequest::new(S, [a1], "b@x.com", 1500))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::SeatUnavailable(ref ids) if ids == &vec![a1]));
        assert_eq!(store.seats_for_showtime(S).await.unwrap(), before);
        assert_eq!(store.ticket_count(), 1);
    }

    #[tokio::test]
    async fn test_partial_overlap_rejects_whole_batch() {
        let (store, coordinator, a1, a2) = setup().await;
        coordinator
            .reserve_and_issue(PurchaseRequest::new(S, [a1], "a@x.com", 1500))
            .await
            .unwrap();

        let err = coordinator
            .reserve_and_issue(PurchaseRequest::new(S, [a1, a2], "b@x.com", 3000))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::SeatUnavailable(_)));
        assert_eq!(
            availability(&store, S).await,
            vec![SeatAvailability::Sold, SeatAvailability::Available]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disjoint_purchases_both_succeed() {
        let (_, coordinator, a1, a2) = setup().await;
        let coordinator = Arc::new(coordinator);

        let first = {
            let c = coordinator.clone();
            tokio::spawn(async move {
                c.reserve_and_issue(PurchaseRequest::new(S, [a1], "a@x.com", 1500)).await
            })
        };
        let second = {
            let c = coordinator.clone();
            tokio::spawn(async move {
                c.reserve_and_issue(PurchaseRequest::new(S, [a2], "b@x.com", 1500)).await
            })
        };

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        assert_eq!(coordinator.tickets_for_showtime(S).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (store, coordinator, a1, _) = setup().await;

        let empty = coordinator
            .reserve_and_issue(PurchaseRequest::new(S, [], "a@x.com", 1500))
            .await;
        assert!(matches!(empty, Err(CoreError::Validation(_))));

        let free = coordinator
            .reserve_and_issue(PurchaseRequest::new(S, [a1], "a@x.com", -5))
            .await;
        assert!(matches!(free, Err(CoreError::Validation(_))));

        assert_eq!(store.ticket_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_showtime_and_seats() {
        let (store, coordinator, a1, _) = setup().await;
        store.insert_showtime(showtime(ShowtimeId(2), 1));
        let other = store
            .insert_seats(&[SeatSpec::new(ScreenId(1), ShowtimeId(2), "A1")])
            .await
            .unwrap();

        let err = coordinator
            .reserve_and_issue(PurchaseRequest::new(ShowtimeId(9), [a1], "a@x.com", 1500))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ShowtimeNotFound(ShowtimeId(9))));

        // Seat from another showtime, and one that doesn't exist at all
        let err = coordinator
            .reserve_and_issue(PurchaseRequest::new(S, [a1, other[0].id, SeatId(404)], "a@x.com", 1500))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SeatNotFound(ref ids) if ids == &vec![other[0].id, SeatId(404)]));
        assert_eq!(availability(&store, S).await[0], SeatAvailability::Available);
    }

    #[tokio::test]
    async fn test_reserved_seat_is_unavailable() {
        let store = Arc::new(MemoryStore::new());
        store.insert_showtime(showtime(S, 1));
        let mut blocked = SeatSpec::new(ScreenId(1), S, "A1");
        blocked.availability = SeatAvailability::Reserved;
        let seats = store.insert_seats(&[blocked]).await.unwrap();
        let coordinator = ReservationCoordinator::new(store.clone(), store.clone(), store.clone());

        let err = coordinator
            .reserve_and_issue(PurchaseRequest::new(S, [seats[0].id], "a@x.com", 1500))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::SeatUnavailable(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_lock() {
        let (store, coordinator, a1, _) = setup().await;
        let coordinator = Arc::new(coordinator);
        let held = coordinator.locks().acquire(S).await;

        let cancel = CancellationToken::new();
        let pending = {
            let c = coordinator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                c.reserve_and_issue_cancellable(PurchaseRequest::new(S, [a1], "a@x.com", 1500), &cancel)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let result = pending.await.unwrap();
        drop(held);

        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert_eq!(availability(&store, S).await[0], SeatAvailability::Available);
        assert_eq!(store.ticket_count(), 0);
    }

    /// Delegates to a `MemoryStore` after a delay.
    struct SlowTickets {
        inner: Arc<MemoryStore>,
        delay: Duration,
    }

    #[async_trait]
    impl TicketStore for SlowTickets {
        async fn commit_ticket(&self, ticket: &Ticket) -> StoreResult<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.commit_ticket(ticket).await
        }

        async fn tickets_for_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Vec<Ticket>> {
            self.inner.tickets_for_showtime(showtime_id).await
        }
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_interrupt_claim() {
        let (store, _, a1, _) = setup().await;
        let slow = Arc::new(SlowTickets {
            inner: store.clone(),
            delay: Duration::from_millis(50),
        });
        let coordinator = ReservationCoordinator::new(store.clone(), store.clone(), slow);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            coordinator.reserve_and_issue(PurchaseRequest::new(S, [a1], "a@x.com", 1500)),
        )
        .await;
        assert!(abandoned.is_err());

        // The claim finishes on its own and then frees the lock
        let guard = tokio::time::timeout(Duration::from_secs(1), coordinator.locks().acquire(S))
            .await
            .unwrap();
        drop(guard);
        assert_eq!(availability(&store, S).await[0], SeatAvailability::Sold);
        assert_eq!(store.ticket_count(), 1);
    }

    /// Fails the first commit, then behaves.
    struct FlakyTickets {
        inner: Arc<MemoryStore>,
        failed: AtomicBool,
    }

    #[async_trait]
    impl TicketStore for FlakyTickets {
        async fn commit_ticket(&self, ticket: &Ticket) -> StoreResult<()> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            self.inner.commit_ticket(ticket).await
        }

        async fn tickets_for_showtime(&self, showtime_id: ShowtimeId) -> StoreResult<Vec<Ticket>> {
            self.inner.tickets_for_showtime(showtime_id).await
        }
    }

    #[tokio::test]
    async fn test_storage_error_surfaces_and_releases_lock() {
        let (store, _, a1, _) = setup().await;
        let flaky = Arc::new(FlakyTickets {
            inner: store.clone(),
            failed: AtomicBool::new(false),
        });
        let coordinator = ReservationCoordinator::new(store.clone(), store.clone(), flaky);

        let err = coordinator
            .reserve_and_issue(PurchaseRequest::new(S, [a1], "a@x.com", 1500))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Storage(StoreError::Unavailable(_))));
        assert_eq!(availability(&store, S).await[0], SeatAvailability::Available);

        // Same showtime again: the lock was released on the error path
        let ticket = tokio::time::timeout(
            Duration::from_secs(1),
            coordinator.reserve_and_issue(PurchaseRequest::new(S, [a1], "a@x.com", 1500)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(ticket.seat_ids, [a1].into());
    }

    #[tokio::test]
    async fn test_lock_entries_are_dropped_after_purchases() {
        let store = Arc::new(MemoryStore::new());
        let mut seat_ids = Vec::new();
        for n in 1..=50 {
            store.insert_showtime(showtime(ShowtimeId(n), 1));
            let seats = store
                .insert_seats(&[SeatSpec::new(ScreenId(1), ShowtimeId(n), "A1")])
                .await
                .unwrap();
            seat_ids.push((ShowtimeId(n), seats[0].id));
        }
        let coordinator = ReservationCoordinator::new(store.clone(), store.clone(), store.clone());

        for (showtime_id, seat_id) in &seat_ids {
            coordinator
                .reserve_and_issue(PurchaseRequest::new(*showtime_id, [*seat_id], "a@x.com", 1500))
                .await
                .unwrap();
        }
        // Rejections release their entry too
        let (showtime_id, seat_id) = seat_ids[0];
        assert!(coordinator
            .reserve_and_issue(PurchaseRequest::new(showtime_id, [seat_id], "b@x.com", 1500))
            .await
            .is_err());

        assert_eq!(store.ticket_count(), 50);
        assert!(coordinator.locks().is_empty());
    }

    #[tokio::test]
    async fn test_tickets_for_unknown_showtime() {
        let (_, coordinator, _, _) = setup().await;
        assert!(matches!(
            coordinator.tickets_for_showtime(ShowtimeId(77)).await,
            Err(CoreError::ShowtimeNotFound(_))
        ));
    }
}
