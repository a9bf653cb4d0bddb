use std::{sync::Arc, time::Duration};

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use log::{info, warn};
use tokio::{net::TcpListener, signal, sync::Mutex};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{
    check_auth, create_note, delete_note, get_notes, health, login, month_stats, note_stats,
    proxy_fallback, update_note, AppState, BlogError, Config, NoteStorage, Result,
};

/// Builds the full application router: local note and auth routes, with
/// every other `/api/...` path handed to the upstream proxy.
pub fn build_router(state: Arc<AppState>, config: &Config) -> Router {
    Router::new()
        .route(
            "/api/notes",
            get(get_notes).post(create_note).put(update_note).delete(delete_note),
        )
        .route("/api/notes/stats", get(note_stats))
        .route("/api/notes/stats/month", get(month_stats))
        .route("/api/auth/login", post(login))
        .route("/api/auth/check", get(check_auth))
        .route("/health", get(health))
        .fallback(proxy_fallback)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors_layer(&config.cors_allowed_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    if origins.iter().any(|o| o == "*") {
        // Credentials cannot be combined with a wildcard origin.
        return layer.allow_origin(AllowOrigin::any());
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
}

/// Binds the configured address and serves until Ctrl+C or SIGTERM.
pub async fn serve(config: Config, storage: Arc<Mutex<NoteStorage>>) -> Result<()> {
    info!("Initializing state...");
    let state = AppState::with_storage(storage, &config)?;
    let app = build_router(state, &config);

    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| BlogError::ServerError {
            message: format!("Failed to bind {}: {}", config.bind_addr, e),
        })?;
    info!(
        "Server running on {}, proxying to {}",
        config.bind_addr, config.api_base_url
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| BlogError::ServerError {
            message: e.to_string(),
        })?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
}
