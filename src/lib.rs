pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod notifications;
pub mod payments;

#[cfg(test)]
mod testutil;

pub use db::DbPool;

use config::Config;
use notifications::EmailService;
use payments::PaymentGateway;
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub email: EmailService,
    pub payments: Arc<dyn PaymentGateway>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, payments: Arc<dyn PaymentGateway>) -> Self {
        let email = EmailService::new(config.email.clone());
        Self {
            config,
            db,
            email,
            payments,
        }
    }
}
