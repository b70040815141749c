//! Libris API Server
//!
//! Main entry point for the Libris backend service. Wires the database,
//! the keyed store, the mailer, and the workflow scheduler into the
//! HTTP router.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use libris_api::{AppState, create_router};
use libris_core::otp::OtpFlow;
use libris_core::ratelimit::FixedWindowLimiter;
use libris_core::workflow::WorkflowEngine;
use libris_db::{QueryCache, SeaOrmRunStore, UserRepository, connect};
use libris_shared::config::SchedulerConfig;
use libris_shared::{
    AppConfig, JwtConfig, JwtService, KeyedStore, Mailer, MemoryKeyedStore, SmtpMailer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "libris=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load().expect("Failed to load configuration");

    // Connect to database
    let db = connect(&config.database.url).await?;
    info!("Connected to database");

    // Create JWT service
    let jwt_config = JwtConfig {
        secret: config.jwt.secret.clone(),
        #[allow(clippy::cast_possible_wrap)]
        access_token_expires_minutes: (config.jwt.access_token_expiry_secs / 60) as i64,
        #[allow(clippy::cast_possible_wrap)]
        refresh_token_expires_days: (config.jwt.refresh_token_expiry_secs / 86400) as i64,
    };
    let jwt_service = JwtService::new(jwt_config);

    // Create mailer
    let mailer: Arc<dyn Mailer> = Arc::new(SmtpMailer::new(config.email.clone()));
    info!(
        smtp_host = %config.email.smtp_host,
        smtp_port = %config.email.smtp_port,
        "Mailer configured"
    );

    // One keyed store backs the cache, the rate limiter, and the OTP flow
    let keyed: Arc<dyn KeyedStore> = Arc::new(MemoryKeyedStore::new());
    let cache = QueryCache::new(Arc::clone(&keyed));
    let limiter = FixedWindowLimiter::new(
        Arc::clone(&keyed),
        config.ratelimit.max_requests,
        Duration::from_secs(config.ratelimit.window_secs),
    );
    let otp = OtpFlow::new(Arc::clone(&keyed), Arc::clone(&mailer));

    // Create workflow engine over the durable run store
    let run_store = Arc::new(SeaOrmRunStore::new(db.clone()));
    let activity = Arc::new(UserRepository::new(db.clone()));
    let engine = Arc::new(WorkflowEngine::new(
        run_store,
        Arc::clone(&mailer),
        activity,
    ));

    // Create application state
    let state = AppState {
        db: Arc::new(db),
        jwt_service: Arc::new(jwt_service),
        mailer,
        cache: Arc::new(cache),
        limiter: Arc::new(limiter),
        otp: Arc::new(otp),
        engine: Arc::clone(&engine),
    };

    // Start the workflow scheduler
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(run_scheduler(engine, config.scheduler.clone(), shutdown_rx));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // Stop the scheduler after the listener drains
    let _ = shutdown_tx.send(true);
    let _ = scheduler.await;
    info!("Server stopped");

    Ok(())
}

/// Polls the workflow run table and advances due runs until shutdown.
async fn run_scheduler(
    engine: Arc<WorkflowEngine>,
    config: SchedulerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut poll = interval(Duration::from_secs(config.poll_interval_secs));
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!(
        poll_interval_secs = config.poll_interval_secs,
        batch_size = config.batch_size,
        "Workflow scheduler started"
    );

    loop {
        tokio::select! {
            _ = poll.tick() => {
                match engine.tick(Utc::now(), config.batch_size).await {
                    Ok(summary) if summary.advanced + summary.failed > 0 => {
                        info!(
                            advanced = summary.advanced,
                            failed = summary.failed,
                            "Workflow tick"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Workflow tick failed"),
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Workflow scheduler shutting down");
                    break;
                }
            }
        }
    }
}
