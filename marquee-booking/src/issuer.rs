use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use marquee_core::{CoreResult, SeatId, ShowtimeId, Ticket, TicketId, TicketStore};
use marquee_shared::Masked;

/// Persists tickets. Has no locking of its own; the coordinator only calls
/// `issue` while it holds the showtime's lock.
pub struct TicketIssuer {
    tickets: Arc<dyn TicketStore>,
}

impl TicketIssuer {
    pub fn new(tickets: Arc<dyn TicketStore>) -> Self {
        Self { tickets }
    }

    /// One ticket row and every seat marked Sold, committed together.
    pub(crate) async fn issue(
        &self,
        showtime_id: ShowtimeId,
        seat_ids: BTreeSet<SeatId>,
        purchaser: Masked<String>,
        price_cents: i64,
    ) -> CoreResult<Ticket> {
        let ticket = Ticket {
            id: TicketId::new(),
            showtime_id,
            purchaser,
            price_cents,
            seat_ids,
            issued_at: Utc::now(),
        };

        self.tickets.commit_ticket(&ticket).await?;
        Ok(ticket)
    }

    pub async fn tickets_for_showtime(&self, showtime_id: ShowtimeId) -> CoreResult<Vec<Ticket>> {
        Ok(self.tickets.tickets_for_showtime(showtime_id).await?)
    }
}
