use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use marquee_core::{PurchaseRequest, SeatId, ShowtimeId, Ticket, TicketId};
use marquee_shared::models::events::{TicketIssuedEvent, TICKET_ISSUED_TOPIC};
use serde::Serialize;
use tracing::warn;

use crate::error::{AppError, AppJson};
use crate::state::AppState;

/// Returned to the purchaser only.
#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub id: TicketId,
    pub showtime_id: ShowtimeId,
    pub purchaser: String,
    pub seat_ids: Vec<SeatId>,
    pub price_cents: i64,
    pub issued_at: DateTime<Utc>,
}

impl From<Ticket> for TicketResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            id: ticket.id,
            showtime_id: ticket.showtime_id,
            purchaser: ticket.purchaser.into_inner(),
            seat_ids: ticket.seat_ids.into_iter().collect(),
            price_cents: ticket.price_cents,
            issued_at: ticket.issued_at,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/tickets", post(purchase))
}

async fn purchase(
    State(state): State<AppState>,
    AppJson(req): AppJson<PurchaseRequest>,
) -> Result<(StatusCode, Json<TicketResponse>), AppError> {
    let ticket = state
        .coordinator
        .reserve_and_issue_cancellable(req, &state.shutdown)
        .await?;

    publish_issued(&state, &ticket).await;

    Ok((StatusCode::CREATED, Json(TicketResponse::from(ticket))))
}

/// Runs after the commit; a lost event never fails the purchase.
async fn publish_issued(state: &AppState, ticket: &Ticket) {
    let event = TicketIssuedEvent {
        ticket_id: ticket.id.0,
        showtime_id: ticket.showtime_id.0,
        seat_ids: ticket.seat_ids.iter().map(|id| id.0).collect(),
        price_cents: ticket.price_cents,
        issued_at: ticket.issued_at.timestamp(),
    };

    let payload = match serde_json::to_string(&event) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Failed to encode ticket event {}: {}", ticket.id, e);
            return;
        }
    };

    if let Err(e) = state.publisher.publish(TICKET_ISSUED_TOPIC, &event.key(), &payload).await {
        warn!("Failed to publish ticket {}: {}", ticket.id, e);
    }
}
