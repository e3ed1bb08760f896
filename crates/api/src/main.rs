use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epistle_api::config::ServerConfig;
use epistle_api::router::build_app_router;
use epistle_api::state::AppState;
use epistle_core::crypto::FieldCipher;
use epistle_core::research::StateMode;
use epistle_db::{PgCreditLedger, PgLockService, PgSnapshotStore};
use epistle_research::{
    CoordinatorConfig, HttpFollowUpGenerator, HttpResearchRunner, ResearchCoordinator,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "epistle_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = epistle_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    epistle_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    epistle_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Field encryption ---
    let cipher = Arc::new(
        FieldCipher::from_hex_key(&config.encryption_key)
            .expect("ENCRYPTION_KEY must be a 64-char hex string (32 bytes)"),
    );

    // --- Stores ---
    let store = PgSnapshotStore::new(pool.clone(), Arc::clone(&cipher));
    let ledger = PgCreditLedger::new(pool.clone());
    let locks = PgLockService::new(pool.clone());

    // --- Research coordinator ---
    let runner = HttpResearchRunner::new(
        config.research_runner_url.clone(),
        config.research_runner_api_key.clone(),
    );
    let mode = if config.rich_research_state {
        StateMode::Rich
    } else {
        StateMode::Simple
    };
    let coordinator = Arc::new(ResearchCoordinator::new(
        store.clone(),
        ledger.clone(),
        locks,
        runner,
        CoordinatorConfig {
            research_cost: config.research_cost,
            lock_ttl: Duration::from_secs(config.research_lock_ttl_secs),
            mode,
        },
    ));
    tracing::info!(
        research_cost = config.research_cost,
        rich_state = config.rich_research_state,
        "Research coordinator ready"
    );

    // --- Follow-up generator ---
    let followups = Arc::new(HttpFollowUpGenerator::new(
        config.followup_generator_url.clone(),
        config.followup_generator_api_key.clone(),
    ));

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        store,
        ledger,
        coordinator,
        followups,
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Serve ---
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid HOST/PORT combination");
    tracing::info!(%addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Resolve when SIGINT (Ctrl+C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
