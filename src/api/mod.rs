// API module - HTTP endpoints

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::services::payment_gateway::PaymentGateway;
use crate::services::redis::RedisService;

pub mod purchases;
pub mod webhooks;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: RedisService,
    pub gateway: Arc<dyn PaymentGateway>,
}
