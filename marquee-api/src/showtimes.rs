use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use marquee_core::{CoreError, Seat, SeatId, Showtime, ShowtimeId, Ticket, TicketId};
use marquee_inventory::AvailabilitySummary;
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    #[serde(flatten)]
    pub summary: AvailabilitySummary,
    pub utilization: f64,
}

/// Audit view of an issued ticket; omits the purchaser.
#[derive(Debug, Serialize)]
pub struct IssuedTicket {
    pub id: TicketId,
    pub showtime_id: ShowtimeId,
    pub seat_ids: Vec<SeatId>,
    pub price_cents: i64,
    pub issued_at: DateTime<Utc>,
}

impl From<Ticket> for IssuedTicket {
    fn from(ticket: Ticket) -> Self {
        Self {
            id: ticket.id,
            showtime_id: ticket.showtime_id,
            seat_ids: ticket.seat_ids.into_iter().collect(),
            price_cents: ticket.price_cents,
            issued_at: ticket.issued_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/showtimes/{id}", get(get_showtime))
        .route("/v1/showtimes/{id}/seats", get(list_seats))
        .route("/v1/showtimes/{id}/availability", get(get_availability))
        .route("/v1/showtimes/{id}/tickets", get(list_tickets))
}

async fn get_showtime(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Showtime>, AppError> {
    let showtime_id = ShowtimeId(id);
    let showtime = state
        .catalog
        .showtime(showtime_id)
        .await
        .map_err(CoreError::from)?
        .ok_or(CoreError::ShowtimeNotFound(showtime_id))?;

    Ok(Json(showtime))
}

async fn list_seats(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Seat>>, AppError> {
    let seats = state.inventory.list_seats(ShowtimeId(id)).await?;
    Ok(Json(seats))
}

async fn get_availability(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let summary = state.inventory.availability(ShowtimeId(id)).await?;
    Ok(Json(AvailabilityResponse {
        utilization: summary.utilization(),
        summary,
    }))
}

async fn list_tickets(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<IssuedTicket>>, AppError> {
    let tickets = state.coordinator.tickets_for_showtime(ShowtimeId(id)).await?;
    Ok(Json(tickets.into_iter().map(IssuedTicket::from).collect()))
}
