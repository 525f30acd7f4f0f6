//! NATS message handlers

pub mod import;
pub mod ping;

use std::sync::Arc;

use anyhow::Result;
use async_nats::Client;
use sqlx::PgPool;
use tokio::select;
use tracing::{error, info};

use crate::config::Config;
use crate::services::import::ImportRunner;
use crate::services::iplocation::{create_ip_locator, IpLocator};

/// Start all message handlers
pub async fn start_handlers(client: Client, pool: PgPool, config: Config) -> Result<()> {
    info!("Starting message handlers...");

    let config = Arc::new(config);

    // Shared import pipeline
    let locator: Arc<dyn IpLocator> = Arc::from(create_ip_locator(config.ip_location_url.as_deref()));
    info!("IP locator initialized: {}", locator.name());
    let runner = Arc::new(ImportRunner::new(config.import_page_size).with_locator(locator));

    // Subscribe to all subjects
    let ping_sub = client.subscribe("maillift.ping").await?;
    let csv_stage_sub = client.subscribe("maillift.import.csv.stage").await?;
    let csv_queue_sub = client.subscribe("maillift.import.csv.queue").await?;
    let csv_batch_sub = client.subscribe("maillift.import.csv.batch").await?;
    let db_check_sub = client.subscribe("maillift.import.db.check").await?;
    let db_batch_sub = client.subscribe("maillift.import.db.batch").await?;
    let history_sub = client.subscribe("maillift.import.history").await?;

    info!("Subscribed to NATS subjects");

    // Clone for each handler
    let client_ping = client.clone();
    let client_csv_stage = client.clone();
    let client_csv_queue = client.clone();
    let client_csv_batch = client.clone();
    let client_db_check = client.clone();
    let client_db_batch = client.clone();
    let client_history = client.clone();

    let pool_csv_batch = pool.clone();
    let pool_db_check = pool.clone();
    let pool_db_batch = pool.clone();

    let config_csv_stage = Arc::clone(&config);
    let config_csv_queue = Arc::clone(&config);
    let config_csv_batch = Arc::clone(&config);

    let runner_csv_batch = Arc::clone(&runner);
    let runner_db_batch = Arc::clone(&runner);

    // Spawn handlers
    let ping_handle = tokio::spawn(async move {
        ping::handle_ping(client_ping, ping_sub).await
    });

    let csv_stage_handle = tokio::spawn(async move {
        import::handle_csv_stage(client_csv_stage, csv_stage_sub, config_csv_stage).await
    });

    let csv_queue_handle = tokio::spawn(async move {
        import::handle_csv_queue(client_csv_queue, csv_queue_sub, config_csv_queue).await
    });

    let csv_batch_handle = tokio::spawn(async move {
        import::handle_csv_batch(
            client_csv_batch,
            csv_batch_sub,
            pool_csv_batch,
            runner_csv_batch,
            config_csv_batch,
        )
        .await
    });

    let db_check_handle = tokio::spawn(async move {
        import::handle_db_check(client_db_check, db_check_sub, pool_db_check).await
    });

    let db_batch_handle = tokio::spawn(async move {
        import::handle_db_batch(client_db_batch, db_batch_sub, pool_db_batch, runner_db_batch).await
    });

    let history_handle = tokio::spawn(async move {
        import::handle_history(client_history, history_sub).await
    });

    info!("All handlers started, waiting for messages...");

    // Wait for any handler to finish (which means an error occurred)
    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = csv_stage_handle => {
            error!("Csv stage handler finished: {:?}", result);
        }
        result = csv_queue_handle => {
            error!("Csv queue handler finished: {:?}", result);
        }
        result = csv_batch_handle => {
            error!("Csv batch handler finished: {:?}", result);
        }
        result = db_check_handle => {
            error!("Database check handler finished: {:?}", result);
        }
        result = db_batch_handle => {
            error!("Database batch handler finished: {:?}", result);
        }
        result = history_handle => {
            error!("History handler finished: {:?}", result);
        }
    }

    Ok(())
}
