use crate::{context::AppContext, metrics};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::expired_token_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Clear expired verification codes and reset tokens (runs every hour)
    async fn expired_token_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;
            info!("Running expired token cleanup");

            match tasks::purge_expired_tokens(&scheduler.context).await {
                Ok(count) => {
                    metrics::record_background_job("token_cleanup", "success");
                    if count > 0 {
                        info!("Cleared {} expired verification codes and reset tokens", count);
                    }
                }
                Err(e) => {
                    metrics::record_background_job("token_cleanup", "failure");
                    error!("Failed to clear expired tokens: {}", e);
                }
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300));

        loop {
            interval.tick().await;

            match tasks::health_check(&scheduler.context).await {
                Ok(_) => metrics::record_background_job("health_check", "success"),
                Err(e) => {
                    metrics::record_background_job("health_check", "failure");
                    error!("Health check failed: {}", e);
                }
            }
        }
    }
}
