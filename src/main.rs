use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use flat_alerts::bot::{message_handler, TelegramNotifier};
use flat_alerts::config::{BotConfig, StoreBackend};
use flat_alerts::db::PgStore;
use flat_alerts::dialogue::MenuState;
use flat_alerts::kufar::KufarSource;
use flat_alerts::pipeline::ListingPipeline;
use flat_alerts::scheduler::run_every;
use flat_alerts::store::{MemoryStore, Store};

const DEFAULT_LOG_FILTER: &str = "flat_alerts=info,warn";

fn init_tracing(json_logs: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = BotConfig::from_env().context("Invalid configuration")?;

    // Initialize logging
    init_tracing(config.json_logs);

    info!("Starting Flat Alerts Telegram Bot");

    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;
            info!("Connecting to PostgreSQL store");
            Arc::new(PgStore::connect(database_url).await?)
        }
        StoreBackend::Memory => {
            info!("Using in-memory store; state is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Initialize the bot
    let bot = Bot::new(&config.telegram_bot_token);

    let source = Arc::new(
        KufarSource::new(config.pipeline.fetch_timeout).context("Failed to build HTTP client")?,
    );
    let notifier = Arc::new(TelegramNotifier::new(bot.clone()));
    let pipeline = ListingPipeline::new(store.clone(), source, notifier, config.pipeline.clone());
    let scheduler = run_every(config.check_interval, pipeline);

    info!("Bot initialized, starting dispatcher");

    let handler = Update::filter_message()
        .enter_dialogue::<Message, InMemStorage<MenuState>, MenuState>()
        .endpoint(message_handler);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![InMemStorage::<MenuState>::new(), store])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    scheduler.abort();
    info!("Dispatcher stopped");

    Ok(())
}
