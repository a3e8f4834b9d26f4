//! Registration service HTTP server.

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turnout::clock::SystemClock;
use turnout::config::Config;
use turnout::coordinator::RegistrationCoordinator;
use turnout::notify::TracingNotifier;
use turnout::payments::{HttpPaymentGateway, MockPaymentGateway, PaymentGateway, SignatureVerifier};
use turnout::server::{build_router, AppState};
use turnout::stores::{
    CapacityLedger, InMemoryStore, PaymentIntentStore, PostgresStore, RegistrationStore,
    WaitlistQueue,
};

struct Stores {
    ledger: Arc<dyn CapacityLedger>,
    registrations: Arc<dyn RegistrationStore>,
    waitlist: Arc<dyn WaitlistQueue>,
    intents: Arc<dyn PaymentIntentStore>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "turnout=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting registration service");

    let config = Config::from_env();

    let stores = match &config.postgres.url {
        Some(url) => {
            info!("Connecting to PostgreSQL store");
            let store = Arc::new(
                PostgresStore::connect(
                    url,
                    config.postgres.max_connections,
                    Duration::from_secs(config.postgres.connect_timeout),
                )
                .await?,
            );
            info!("Store connected and migrated");
            Stores {
                ledger: store.clone(),
                registrations: store.clone(),
                waitlist: store.clone(),
                intents: store,
            }
        }
        None => {
            info!("No DATABASE_URL set; using the in-memory store");
            let store = Arc::new(InMemoryStore::new());
            Stores {
                ledger: store.clone(),
                registrations: store.clone(),
                waitlist: store.clone(),
                intents: store,
            }
        }
    };

    let gateway: Arc<dyn PaymentGateway> = match &config.gateway.base_url {
        Some(base_url) => Arc::new(HttpPaymentGateway::new(
            base_url.clone(),
            config.gateway.key_id.clone(),
            SecretString::from(config.gateway.key_secret.clone()),
            Duration::from_secs(config.gateway.request_timeout),
        )),
        None => {
            info!("No GATEWAY_BASE_URL set; using the mock gateway");
            Arc::new(MockPaymentGateway::new())
        }
    };

    let coordinator = Arc::new(RegistrationCoordinator::new(
        stores.ledger,
        stores.registrations,
        stores.waitlist,
        stores.intents,
        gateway,
        SignatureVerifier::new(SecretString::from(config.gateway.key_secret.clone())),
        SignatureVerifier::new(SecretString::from(config.gateway.webhook_secret.clone())),
        Arc::new(TracingNotifier),
        Arc::new(SystemClock),
    ));

    let router = build_router(AppState::new(coordinator));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("Shutdown signal received");
}
