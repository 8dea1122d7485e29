use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::application::use_cases::qa_pipeline::QaPipeline;
use crate::domain::error::Result;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::csv::seed_listings_if_empty;
use crate::infrastructure::db::{ListingStore, SqliteRowSource};
use crate::infrastructure::llm_clients::OpenAiCompatClient;
use crate::interfaces::http::{add_log, start_server, HttpState};

/// `RUST_LOG` wins over the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.log_level);

    let store = ListingStore::connect(
        &config.database.path,
        &config.pipeline.table_name,
        config.database.max_connections,
    )
    .await?;

    if let Some(seed) = &config.database.seed_csv {
        seed_listings_if_empty(&store, seed).await?;
    }

    let rows = SqliteRowSource::connect(
        &config.database.path,
        config.database.max_connections,
        config.database.query_timeout_secs,
    )
    .await?;

    if config.llm.api_key.is_none() {
        warn!("no model credential configured, questions will fail with credential_missing");
    }
    let chat = OpenAiCompatClient::new(config.llm.clone())?;

    let pipeline = QaPipeline::new(
        Arc::new(chat),
        Arc::new(rows),
        &config.pipeline,
        Duration::from_secs(config.llm.timeout_secs),
    );

    let address = config.bind_address();
    let logs = Arc::new(Mutex::new(Vec::new()));
    add_log(&logs, "INFO", "Server", &format!("Listening on {}", address));

    let server = start_server(
        HttpState {
            pipeline: Arc::new(pipeline),
            store: Arc::new(store),
            logs,
        },
        &address,
    )?;

    info!(
        address = %address,
        database = %config.database.path.display(),
        model = %config.llm.model,
        "listing-qa started"
    );

    server.await?;
    Ok(())
}
