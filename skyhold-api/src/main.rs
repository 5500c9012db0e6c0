use anyhow::Context;
use skyhold_api::{app, worker, AppState};
use skyhold_core::ReservationCoordinator;
use skyhold_store::app_config::Config;
use skyhold_store::{DbClient, PgReservationLedger, PgSeatLedger, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skyhold_api=debug,skyhold_core=info,skyhold_store=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Skyhold API on port {}", config.server.port);

    let db = DbClient::new(&config.database)
        .await
        .context("Failed to connect to Postgres")?;
    if config.database.run_migrations {
        db.migrate().await.context("Failed to run migrations")?;
    }

    let coordinator = ReservationCoordinator::new(db, PgSeatLedger, PgReservationLedger)
        .with_hold_duration(config.reservation.hold_duration());

    let redis = match &config.redis.url {
        Some(url) => {
            let client = RedisClient::new(url).await.context("Failed to configure Redis")?;
            Some(Arc::new(client))
        }
        None => {
            tracing::info!("No redis.url configured, rate limiting disabled");
            None
        }
    };

    let (events_tx, _) = tokio::sync::broadcast::channel(100);

    let app_state = AppState {
        reservations: Arc::new(coordinator),
        redis,
        rate_limit: config.rate_limit.clone(),
        events_tx,
    };

    if config.sweeper.enabled {
        worker::spawn_sweep_worker(app_state.clone(), Duration::from_secs(config.sweeper.interval_seconds));
    }

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
