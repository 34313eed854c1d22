use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signalk_core::config::FileConfigStorage;
use signalk_core::rest::{api_root, get_path, put_completed, put_failed, put_path, vessel_tree};
use signalk_core::{
    ConfigError, ConfigStorage, GatewaySettings, LogNotifier, SignalKStore, SIGNALK_VERSION,
};
use signalk_protocol::DiscoveryResponse;
use signalk_server::inputs::spawn_inputs;
use signalk_server::{
    run_regenerator, NmeaTcpConfig, NmeaTcpServer, ServerConfig, SharedSources, SharedStore,
    SignalKServer,
};

/// State shared by the REST handlers.
#[derive(Clone)]
struct AppState {
    store: SharedStore,
    sources: SharedSources,
    server_name: Arc<str>,
    http_addr: SocketAddr,
    ws_addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,signalk_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("SignalK gateway starting...");

    let storage = Arc::new(FileConfigStorage::new(FileConfigStorage::default_dir()));
    tracing::info!("Configuration directory: {}", storage.dir().display());

    let settings = load_settings(storage.as_ref())?;
    let uuid = settings
        .vessel_uuid
        .clone()
        .ok_or_else(|| anyhow::anyhow!("vessel uuid missing after load"))?;

    let mut store = SignalKStore::new(GatewaySettings::self_urn(&uuid))
        .with_storage(storage.clone())
        .with_notifier(Arc::new(LogNotifier));
    match storage.load_anchor_blob() {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(blob) => store.restore_anchor_config(&blob),
            Err(e) => tracing::warn!("Ignoring unreadable anchor configuration: {}", e),
        },
        Err(ConfigError::NotFound(_)) => tracing::debug!("No stored anchor configuration"),
        Err(e) => tracing::warn!("Failed to load anchor configuration: {}", e),
    }

    let config = ServerConfig::from_settings(&settings)?;
    let tcp_config = NmeaTcpConfig::from_settings(&settings)?;
    let http_addr: SocketAddr = settings.http_bind.parse()?;
    let ws_addr = config.bind_addr;

    let server = SignalKServer::new(config, store);
    let event_tx = server.event_sender();
    let store = server.store();
    let sources = server.sources();

    let tcp_server = NmeaTcpServer::new(tcp_config, event_tx.clone());
    let sentence_tx = tcp_server.sentence_sender();

    let _inputs = spawn_inputs(&settings.inputs, &event_tx);
    drop(event_tx);

    // Spawn WebSocket server
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!("WebSocket server error: {}", e);
        }
    });

    let tcp_handle = tokio::spawn(async move {
        if let Err(e) = tcp_server.run().await {
            tracing::error!("NMEA0183 TCP server error: {}", e);
        }
    });

    tokio::spawn(run_regenerator(
        store.clone(),
        sentence_tx,
        Duration::from_millis(settings.regenerator_interval_ms.max(1)),
    ));

    let state = AppState {
        store,
        sources,
        server_name: Arc::from(settings.server_name.as_str()),
        http_addr,
        ws_addr,
    };
    let http_handle = tokio::spawn(async move {
        if let Err(e) = start_http_server(state).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tracing::info!("SignalK gateway ready");
    tracing::info!("   WebSocket: ws://{}/signalk/v1/stream", ws_addr);
    tracing::info!("   HTTP API:  http://{}/signalk/v1/api", http_addr);
    tracing::info!("   NMEA0183:  tcp://{}", settings.nmea_tcp_bind);

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = ws_handle => {
            tracing::warn!("WebSocket server stopped");
        }
        _ = tcp_handle => {
            tracing::warn!("NMEA0183 TCP server stopped");
        }
        _ = http_handle => {
            tracing::warn!("HTTP server stopped");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Load the stored settings, falling back to defaults, and make sure a
/// vessel UUID exists.
fn load_settings(storage: &FileConfigStorage) -> anyhow::Result<GatewaySettings> {
    let mut settings = match storage.load_settings() {
        Ok(settings) => settings,
        Err(ConfigError::NotFound(_)) => {
            tracing::info!("No stored settings, using defaults");
            GatewaySettings::default()
        }
        Err(e) => return Err(e.into()),
    };

    if settings.vessel_uuid.is_none() {
        let uuid = uuid::Uuid::new_v4().to_string();
        tracing::info!("Generated vessel uuid {}", uuid);
        settings.vessel_uuid = Some(uuid);
        storage.save_settings(&settings)?;
    }
    Ok(settings)
}

/// Start the HTTP API server
async fn start_http_server(state: AppState) -> anyhow::Result<()> {
    let addr = state.http_addr;
    let app = Router::new()
        .route("/signalk", get(discovery_handler))
        .route("/signalk/v1/api", get(full_api_handler))
        .route("/signalk/v1/api/", get(full_api_handler))
        .route("/signalk/v1/api/vessels/self", get(self_vessel_handler))
        .route("/signalk/v1/api/sources", get(sources_handler))
        .route(
            "/signalk/v1/api/vessels/self/*path",
            get(path_handler).put(put_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Discovery endpoint handler
async fn discovery_handler(State(state): State<AppState>) -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse::new(
        &state.server_name,
        &state.http_addr.to_string(),
        &state.ws_addr.to_string(),
    ))
}

/// Full API handler - returns entire data model
async fn full_api_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let store = state.store.read().await;
    Json(api_root(&store, SIGNALK_VERSION))
}

async fn self_vessel_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let store = state.store.read().await;
    Json(vessel_tree(&store))
}

/// Source arbitration state: the active source and every known source.
async fn sources_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let now = Instant::now();
    let mut sources = state.sources.write().await;
    sources.recompute(now);
    Json(serde_json::json!({
        "active": sources.active(),
        "sources": sources.status(now),
    }))
}

/// Path-based API handler
async fn path_handler(
    Path(path): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let store = state.store.read().await;
    get_path(&store, &path).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn put_handler(
    Path(path): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let mut store = state.store.write().await;
    match put_path(&mut store, &path, &body) {
        Ok(()) => (StatusCode::OK, Json(put_completed())),
        Err(e) => {
            tracing::debug!("PUT {} refused: {}", path, e);
            (StatusCode::BAD_REQUEST, Json(put_failed(&e)))
        }
    }
}
