use std::sync::Arc;
use skyhold_core::ReservationService;
use skyhold_shared::HoldEvent;
use skyhold_store::app_config::RateLimitConfig;
use skyhold_store::RedisClient;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<dyn ReservationService>,
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit: RateLimitConfig,
    pub events_tx: broadcast::Sender<HoldEvent>,
}
