/// Panneaux - community and education platform backend
///
/// Loads configuration from the environment, opens the database, starts the
/// background jobs and serves the REST API.
use anyhow::Context;
use panneaux_server::{config::LoggingConfig, jobs::JobScheduler, server, AppContext, ServerConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so the log format can follow it
    let config = ServerConfig::from_env().context("Failed to load configuration")?;

    init_tracing(&config.logging);

    print_banner();

    // Create application context
    let ctx = AppContext::new(config)
        .await
        .context("Failed to initialise application context")?;
    let ctx = Arc::new(ctx);

    // Start background jobs
    let scheduler = Arc::new(JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await.context("Server stopped with an error")?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level)
        .unwrap_or_else(|_| "panneaux_server=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn print_banner() {
    println!(
        r#"
    ____
   / __ \____ _____  ____  ___  ____ ___  ___  __
  / /_/ / __ `/ __ \/ __ \/ _ \/ __ `/ / / / |/_/
 / ____/ /_/ / / / / / / /  __/ /_/ / /_/ />  <
/_/    \__,_/_/ /_/_/ /_/\___/\__,_/\__,_/_/|_|

        Community & education platform v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
