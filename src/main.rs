//! Farmgate Commerce - storefront backend

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use farmgate_commerce::api::{self, AppState};
use farmgate_commerce::carts::CartService;
use farmgate_commerce::checkout::{CheckoutEngine, UserLocks};
use farmgate_commerce::config::Config;
use farmgate_commerce::domain::pricing::StandardPricing;
use farmgate_commerce::notify::{LogSink, NatsSink, NotificationSink};
use farmgate_commerce::storage::postgres::{PgCartStore, PgCatalog, PgOrderStore};
use farmgate_commerce::storage::{CartStore, OrderStore, ProductCatalog};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let sink: Arc<dyn NotificationSink> = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Arc::new(NatsSink::new(client)),
            Err(err) => {
                tracing::warn!(error = %err, "NATS unreachable, falling back to log sink");
                Arc::new(LogSink)
            }
        },
        None => Arc::new(LogSink),
    };

    let carts: Arc<dyn CartStore> = Arc::new(PgCartStore::new(db.clone()));
    let orders: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(db.clone()));
    let catalog: Arc<dyn ProductCatalog> = Arc::new(PgCatalog::new(db.clone()));
    let pricing = Arc::new(StandardPricing);
    let locks = Arc::new(UserLocks::new());

    let state = AppState {
        carts: Arc::new(CartService::new(
            carts.clone(),
            catalog.clone(),
            pricing.clone(),
            locks.clone(),
            &config.currency,
        )),
        checkout: Arc::new(CheckoutEngine::new(
            carts,
            orders.clone(),
            catalog,
            pricing,
            sink.clone(),
            locks,
        )),
        orders,
        sink,
    };

    let app = api::router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("farmgate-commerce listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
