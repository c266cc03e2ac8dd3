use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use ara_push_service::config::Settings;
use ara_push_service::postgres::PostgresPool;
use ara_push_service::provider::create_push_provider;
use ara_push_service::server::{create_app, AppState};
use ara_push_service::storage::create_stores;
use ara_push_service::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing; the guard flushes spans on exit
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    // Connect to PostgreSQL only when it backs the stores
    let postgres_pool = if settings.storage.backend == "postgres" {
        let pool = PostgresPool::new(&settings.database).await?;
        if settings.database.run_migrations {
            pool.migrate().await?;
        }
        Some(pool)
    } else {
        None
    };

    let stores = create_stores(&settings.storage, postgres_pool.as_ref());
    let provider = create_push_provider(&settings.provider)?;
    tracing::info!(
        registrations = stores.registrations.backend_type(),
        notifications = stores.notifications.backend_type(),
        provider = provider.name(),
        "Application state initialized"
    );

    let addr = settings.server_addr();
    let state = AppState::new(settings, stores, provider, postgres_pool.clone());

    // Create Axum app
    let app = create_app(state);

    // Start server
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown; in-flight fan-outs finish first
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler())
        .await?;

    if let Some(pool) = postgres_pool {
        pool.close().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
