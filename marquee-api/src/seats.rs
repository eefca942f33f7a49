use axum::{extract::State, routing::post, Json, Router};
use chrono::Utc;
use marquee_core::{Seat, SeatSpec};
use marquee_shared::models::events::{SeatsCreatedEvent, SEATS_CREATED_TOPIC};
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::warn;

use crate::error::{AppError, AppJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSeatsRequest {
    pub seats: Vec<SeatSpec>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/seats", post(create_seats))
}

async fn create_seats(
    State(state): State<AppState>,
    AppJson(req): AppJson<CreateSeatsRequest>,
) -> Result<Json<Vec<Seat>>, AppError> {
    let seats = state.inventory.bulk_create(req.seats).await?;

    let showtime_ids: BTreeSet<i64> = seats.iter().map(|s| s.showtime_id.0).collect();
    let event = SeatsCreatedEvent {
        showtime_ids: showtime_ids.into_iter().collect(),
        seat_count: seats.len(),
        timestamp: Utc::now().timestamp(),
    };
    match serde_json::to_string(&event) {
        Ok(payload) => {
            let key = event.showtime_ids.first().map(|id| id.to_string()).unwrap_or_default();
            if let Err(e) = state.publisher.publish(SEATS_CREATED_TOPIC, &key, &payload).await {
                warn!("Failed to publish seat map update: {}", e);
            }
        }
        Err(e) => warn!("Failed to encode seat map update: {}", e),
    }

    Ok(Json(seats))
}
