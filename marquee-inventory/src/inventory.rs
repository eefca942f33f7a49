use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use marquee_core::{
    CatalogService, CoreError, CoreResult, Seat, SeatAvailability, SeatSpec, SeatStore, Showtime,
    ShowtimeId,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Seat counts for one showtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvailabilitySummary {
    pub showtime_id: ShowtimeId,
    pub total: usize,
    pub available: usize,
    pub reserved: usize,
    pub sold: usize,
}

impl AvailabilitySummary {
    pub fn from_seats(showtime_id: ShowtimeId, seats: &[Seat]) -> Self {
        let mut summary = Self {
            showtime_id,
            total: seats.len(),
            available: 0,
            reserved: 0,
            sold: 0,
        };
        for seat in seats {
            match seat.availability {
                SeatAvailability::Available => summary.available += 1,
                SeatAvailability::Reserved => summary.reserved += 1,
                SeatAvailability::Sold => summary.sold += 1,
            }
        }
        summary
    }

    /// Share of seats no longer available, 0.0 for an empty seat map.
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            1.0 - (self.available as f64 / self.total as f64)
        }
    }
}

/// Seat maps per showtime. Reads never wait on reservation activity.
pub struct SeatInventory {
    catalog: Arc<dyn CatalogService>,
    seats: Arc<dyn SeatStore>,
}

impl SeatInventory {
    pub fn new(catalog: Arc<dyn CatalogService>, seats: Arc<dyn SeatStore>) -> Self {
        Self { catalog, seats }
    }

    pub async fn list_seats(&self, showtime_id: ShowtimeId) -> CoreResult<Vec<Seat>> {
        if !self.catalog.showtime_exists(showtime_id).await? {
            return Err(CoreError::ShowtimeNotFound(showtime_id));
        }
        Ok(self.seats.seats_for_showtime(showtime_id).await?)
    }

    pub async fn availability(&self, showtime_id: ShowtimeId) -> CoreResult<AvailabilitySummary> {
        let seats = self.list_seats(showtime_id).await?;
        Ok(AvailabilitySummary::from_seats(showtime_id, &seats))
    }

    /// Creates the seats that don't exist yet and returns every seat the specs
    /// name. Specs matching an existing (screen, showtime, label) are skipped,
    /// so replaying the same seat map is harmless.
    pub async fn bulk_create(&self, specs: Vec<SeatSpec>) -> CoreResult<Vec<Seat>> {
        if specs.is_empty() {
            return Err(CoreError::Validation("no seats given".to_string()));
        }

        // 1. Shape
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(specs.len());
        for mut spec in specs {
            spec.validate()?;
            spec.label = spec.label.trim().to_string();
            if seen.insert((spec.screen_id, spec.showtime_id, spec.label.clone())) {
                normalized.push(spec);
            }
        }

        // 2. References
        let showtime_ids: BTreeSet<ShowtimeId> = normalized.iter().map(|s| s.showtime_id).collect();
        let mut showtimes: HashMap<ShowtimeId, Showtime> = HashMap::new();
        for id in &showtime_ids {
            let showtime = self
                .catalog
                .showtime(*id)
                .await?
                .ok_or(CoreError::ShowtimeNotFound(*id))?;
            showtimes.insert(*id, showtime);
        }

        for spec in &normalized {
            let expected = showtimes[&spec.showtime_id].screen_id;
            if spec.screen_id != expected {
                return Err(CoreError::Validation(format!(
                    "seat '{}' names screen {} but showtime {} plays on screen {}",
                    spec.label, spec.screen_id, spec.showtime_id, expected
                )));
            }
        }

        // 3. Persist
        let seats = self.seats.insert_seats(&normalized).await?;
        info!(
            "Seat map updated: {} seats across {} showtime(s)",
            seats.len(),
            showtime_ids.len()
        );
        Ok(seats)
    }
}
