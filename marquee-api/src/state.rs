use std::sync::Arc;

use marquee_booking::{CancellationToken, ReservationCoordinator};
use marquee_core::{CatalogService, EventPublisher, SeatStore, TicketStore};
use marquee_inventory::SeatInventory;
use marquee_store::app_config::RateLimitConfig;
use marquee_store::RedisClient;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogService>,
    pub inventory: Arc<SeatInventory>,
    pub coordinator: Arc<ReservationCoordinator>,
    pub publisher: Arc<dyn EventPublisher>,
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit: RateLimitConfig,
    /// Fired on shutdown; purchases still waiting for a showtime lock give up.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        seats: Arc<dyn SeatStore>,
        tickets: Arc<dyn TicketStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let inventory = Arc::new(SeatInventory::new(catalog.clone(), seats.clone()));
        let coordinator = Arc::new(ReservationCoordinator::new(catalog.clone(), seats, tickets));

        Self {
            catalog,
            inventory,
            coordinator,
            publisher,
            redis: None,
            rate_limit: RateLimitConfig {
                requests: 100,
                window_seconds: 60,
            },
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_rate_limit(mut self, redis: Arc<RedisClient>, limits: RateLimitConfig) -> Self {
        self.redis = Some(redis);
        self.rate_limit = limits;
        self
    }
}
