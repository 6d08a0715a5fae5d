//! HTTP-Routen: WebSocket fuer Viewer, REST fuer Ports und Status

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{HeaderValue, Method};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::{middleware, Router};
use serde::Serialize;
use serialrelay_core::LinkStatus;
use serialrelay_hub::{BroadcastHub, ViewerVerbindung};
use serialrelay_link::ports::{bekannte_ports, ports_auflisten, PortInfo};
use serialrelay_observability::{
    observability_router, request_timing_layer, timing_middleware, RelayMetrics,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;

use crate::HubQuelle;

/// Geteilter Zustand aller Handler
#[derive(Clone)]
pub struct AppState {
    pub hub: BroadcastHub,
    pub metriken: RelayMetrics,
    pub keepalive: Duration,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Antwort von `GET /api/status`
#[derive(Debug, Serialize)]
pub struct StatusAntwort {
    pub link: LinkStatus,
    pub sessions: usize,
}

/// Baut den kompletten Router
pub fn router(state: AppState, cors_origins: &[String], observability: bool) -> Router {
    let mut app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/ports", get(ports_handler))
        .route("/api/status", get(status_handler))
        .with_state(state.clone());

    if observability {
        let quelle = Arc::new(HubQuelle(state.hub.clone()));
        app = app.merge(observability_router(state.metriken.clone(), quelle));
    }

    app.layer(middleware::from_fn_with_state(
        state.metriken,
        timing_middleware,
    ))
    .layer(request_timing_layer())
    .layer(cors_layer(cors_origins))
}

/// Leere Liste = alle Origins erlaubt
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

/// GET /ws – eine WebSocket pro Viewer-Session
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| {
        ViewerVerbindung::neu(state.hub, state.keepalive).verarbeiten(socket, state.shutdown_rx)
    })
}

/// GET /api/ports – erkannte Geraete plus uebliche Pfade
async fn ports_handler() -> Json<Vec<PortInfo>> {
    match tokio::task::spawn_blocking(ports_auflisten).await {
        Ok(ports) => Json(ports),
        Err(e) => {
            tracing::error!(fehler = %e, "Port-Auflistung abgebrochen");
            Json(bekannte_ports())
        }
    }
}

/// GET /api/status
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusAntwort {
        link: state.hub.link().status(),
        sessions: state.hub.registry().anzahl(),
    })
}
