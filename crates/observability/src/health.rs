//! Health-Check-Endpunkt
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime, Link-Zustand und Session-Anzahl.
//! Antwortet immer mit 200; ohne Geraet laeuft der Server trotzdem.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use serialrelay_core::LinkState;
use std::sync::Arc;
use std::time::Instant;

use crate::quelle::StatusQuelle;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Serielle Verbindung steht
    Healthy,
    /// Server laeuft, aber kein Geraet verbunden
    Degraded,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub link_state: LinkState,
    pub sessions: usize,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    start_time: Instant,
    quelle: Arc<dyn StatusQuelle>,
}

impl HealthState {
    pub fn neu(quelle: Arc<dyn StatusQuelle>) -> Self {
        Self {
            start_time: Instant::now(),
            quelle,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn antwort(&self) -> HealthResponse {
        let schnappschuss = self.quelle.schnappschuss();
        let status = if schnappschuss.link_state == LinkState::Connected {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            link_state: schnappschuss.link_state,
            sessions: schnappschuss.sessions,
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(quelle: Arc<dyn StatusQuelle>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(HealthState::neu(quelle))
}

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.antwort()))
}
