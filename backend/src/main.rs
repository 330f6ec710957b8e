use std::{net::SocketAddr, sync::Arc};

use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use visitrail_backend::{
    app::build_app,
    config::{Config, StoreKind},
    db::connection::{create_pool_with_config, PoolConfig},
    repositories::{InMemorySessionStore, PgSessionStore, SessionStore},
    services::{GeoResolver, IngestService, MaxMindGeoResolver, StaticGeoResolver},
    state::AppState,
    utils::time::TimeNormalizer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "visitrail_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        database_url = %config.redacted_database_url(),
        session_store = ?config.session_store,
        time_zone = %config.time_zone,
        geoip_database_path = ?config.geoip_database_path,
        static_dir = ?config.static_dir,
        "Loaded configuration from environment/.env"
    );

    // Initialize storage
    let (store, pool): (Arc<dyn SessionStore>, Option<PgPool>) = match config.session_store {
        StoreKind::Postgres => {
            let pool = create_pool_with_config(&config.database_url, PoolConfig::from(&config))
                .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            let store: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool.clone()));
            (store, Some(pool))
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory session store; nothing will survive a restart");
            let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
            (store, None)
        }
    };

    let geo: Arc<dyn GeoResolver> = match &config.geoip_database_path {
        Some(path) => {
            let resolver = MaxMindGeoResolver::open(path).map_err(|e| {
                anyhow::anyhow!("Failed to open GeoIP database {}: {}", path.display(), e)
            })?;
            Arc::new(resolver)
        }
        None => {
            tracing::warn!("GEOIP_DATABASE_PATH not set; visits will be stored without location");
            Arc::new(StaticGeoResolver::new())
        }
    };

    let ingest = IngestService::new(store, geo, TimeNormalizer::new(config.time_zone));
    let addr = SocketAddr::new(config.bind_addr, config.port);
    let app = build_app(AppState::new(ingest, config));

    // Start server
    tracing::info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database pool closed");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
