use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use campus_api::auth::{AppState, AppStateInner};
use campus_api::cleanup;
use campus_api::rate_limit::{self, EVICTION_INTERVAL_SECS};
use campus_db::Database;
use campus_types::models::Role;

/// Known development secrets that should never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "dev-secret",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "campus=debug,campus_api=debug,campus_db=info,tower_http=debug".into()
            }),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("CAMPUS_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let cron_secret = std::env::var("CRON_SECRET").unwrap_or_else(|_| "dev-secret".into());
    let db_path = std::env::var("CAMPUS_DB_PATH").unwrap_or_else(|_| "campus.db".into());
    let host = std::env::var("CAMPUS_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CAMPUS_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let retention_interval_secs: u64 = std::env::var("CAMPUS_RETENTION_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        warn!("CAMPUS_JWT_SECRET is unset or still a placeholder; set it before deploying");
    }
    if PLACEHOLDER_SECRETS.contains(&cron_secret.as_str()) {
        warn!("CRON_SECRET is unset or still a placeholder; set it before deploying");
    }

    // Init database
    let db = Database::open(&PathBuf::from(&db_path))?;

    // `campus set-admin <email>` promotes an existing account and exits
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [command, email] = args.as_slice() {
        if command == "set-admin" {
            if db.set_user_role(&email.trim().to_lowercase(), Role::Admin)? {
                info!("{} is now an admin", email);
            } else {
                anyhow::bail!("no user registered with email {}", email);
            }
            return Ok(());
        }
    }
    if !args.is_empty() {
        anyhow::bail!("usage: campus [set-admin <email>]");
    }

    // Shared state
    let state: AppState = Arc::new(AppStateInner::new(db, jwt_secret, cron_secret));

    // Background tasks
    tokio::spawn(rate_limit::run_eviction_loop(state.limiter.clone(), EVICTION_INTERVAL_SECS));
    if retention_interval_secs > 0 {
        info!("In-process retention sweep every {}s", retention_interval_secs);
        tokio::spawn(cleanup::run_cleanup_loop(state.clone(), retention_interval_secs));
    }

    let app = campus_api::router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Campus server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
