use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use skyseat_api::{
    app,
    state::{AppState, AuthConfig},
    worker,
};
use skyseat_core::mailer::{BookingMailer, LogMailer};
use skyseat_core::payment::PaymentAdapter;
use skyseat_core::repository::{BookingRepository, SeatRepository};
use skyseat_core::{FlightId, InventoryError};
use skyseat_inventory::{MockOutcome, MockPaymentAdapter};
use skyseat_store::app_config::{Config, PaymentMode, StorageBackend};
use skyseat_store::{DbClient, InMemoryBookingRepository, InMemorySeatRepository, StoreBookingRepository, StoreSeatRepository};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skyseat_api=debug,skyseat_inventory=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting SkySeat API on port {}", config.server.port);

    let mut business_rules = config.business_rules.clone();

    let (seat_repo, booking_repo): (Arc<dyn SeatRepository>, Arc<dyn BookingRepository>) = match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; state is lost on restart");
            (Arc::new(InMemorySeatRepository::new()), Arc::new(InMemoryBookingRepository::new()))
        }
        StorageBackend::Postgres => {
            let db = DbClient::new(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            business_rules = db
                .fetch_business_rules(business_rules)
                .await
                .context("Failed to load business rules")?;
            (
                Arc::new(StoreSeatRepository::new(db.pool.clone())),
                Arc::new(StoreBookingRepository::new(db.pool.clone())),
            )
        }
    };

    let payment_adapter: Option<Arc<dyn PaymentAdapter>> = match config.payment.mode {
        PaymentMode::Approve => Some(Arc::new(MockPaymentAdapter::new(MockOutcome::Approve))),
        PaymentMode::Decline => Some(Arc::new(MockPaymentAdapter::new(MockOutcome::Decline))),
        PaymentMode::Error => Some(Arc::new(MockPaymentAdapter::new(MockOutcome::Error))),
        PaymentMode::Webhook => None,
    };
    let mailer: Arc<dyn BookingMailer> = Arc::new(LogMailer);

    let app_state = AppState::new(
        seat_repo,
        booking_repo,
        mailer,
        payment_adapter,
        business_rules.clone(),
        config.seat_map.clone(),
        config.realtime.channel_capacity,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
            webhook_secret: config.payment.webhook_secret.clone(),
        },
    );

    let layout = config.seat_map.layout();
    for flight in &config.seat_map.demo_flights {
        match app_state.holds.initialize_flight(FlightId(*flight), &layout, config.seat_map.default_fare).await {
            Ok(seats) => tracing::info!(flight_id = flight, seats = seats.len(), "Seeded demo flight"),
            Err(InventoryError::FlightAlreadyInitialized(_)) => {
                tracing::debug!(flight_id = flight, "Demo flight already has a seat map")
            }
            Err(e) => return Err(e).context("Failed to seed demo flight"),
        }
    }

    worker::start_hold_sweeper(
        app_state.holds.clone(),
        std::time::Duration::from_secs(business_rules.hold_sweep_interval_seconds.max(1)),
    );
    worker::start_payment_timeout_sweeper(
        app_state.bookings.clone(),
        std::time::Duration::from_secs(business_rules.payment_sweep_interval_seconds.max(1)),
    );

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.context("Failed to bind listener")?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
