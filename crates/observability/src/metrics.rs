//! Prometheus-kompatible Metriken
//!
//! Registrierte Metriken:
//! - `serialrelay_sessions_connected` – Gauge: verbundene Viewer
//! - `serialrelay_link_connected` – Gauge: 1 wenn das Geraet verbunden ist
//! - `serialrelay_lines_received_total` – Counter: dekodierte Zeilen
//! - `serialrelay_deliveries_total` – Counter: eingereihte Viewer-Ereignisse
//! - `serialrelay_deliveries_dropped_total` – Counter: wegen voller Queue verworfen
//! - `serialrelay_commands_sent_total` / `serialrelay_commands_failed_total`
//! - `serialrelay_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `serialrelay_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit
//!
//! Die Relay-Zaehler werden beim Scrape aus einem [`RelaySchnappschuss`]
//! nachgezogen, nicht im heissen Pfad gezaehlt.

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use serialrelay_core::LinkState;
use std::sync::Arc;

use crate::quelle::{RelaySchnappschuss, StatusQuelle};

/// Alle Prometheus-Metriken des Relays
#[derive(Clone)]
pub struct RelayMetrics {
    pub registry: Arc<Registry>,

    pub sessions_connected: IntGauge,
    pub link_connected: IntGauge,
    pub lines_received_total: IntCounter,
    pub deliveries_total: IntCounter,
    pub deliveries_dropped_total: IntCounter,
    pub commands_sent_total: IntCounter,
    pub commands_failed_total: IntCounter,

    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

fn zaehler(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn anzeige(registry: &Registry, name: &str, hilfe: &str) -> Result<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Zieht einen Counter auf den absoluten Stand `ziel` nach
fn nachziehen(counter: &IntCounter, ziel: u64) {
    let aktuell = counter.get();
    if ziel > aktuell {
        counter.inc_by(ziel - aktuell);
    }
}

impl RelayMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let sessions_connected = anzeige(
            &registry,
            "serialrelay_sessions_connected",
            "Anzahl aktuell verbundener Viewer",
        )?;
        let link_connected = anzeige(
            &registry,
            "serialrelay_link_connected",
            "1 wenn die serielle Verbindung steht, sonst 0",
        )?;
        let lines_received_total = zaehler(
            &registry,
            "serialrelay_lines_received_total",
            "Dekodierte Zeilen vom Geraet",
        )?;
        let deliveries_total = zaehler(
            &registry,
            "serialrelay_deliveries_total",
            "In Session-Queues eingereihte Ereignisse",
        )?;
        let deliveries_dropped_total = zaehler(
            &registry,
            "serialrelay_deliveries_dropped_total",
            "Wegen voller Session-Queue verworfene Ereignisse",
        )?;
        let commands_sent_total = zaehler(
            &registry,
            "serialrelay_commands_sent_total",
            "Erfolgreich an das Geraet geschriebene Befehle",
        )?;
        let commands_failed_total = zaehler(
            &registry,
            "serialrelay_commands_failed_total",
            "Abgelehnte oder fehlgeschlagene Befehle",
        )?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("serialrelay_http_requests_total", "Gesamtanzahl HTTP-Anfragen"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "serialrelay_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry: Arc::new(registry),
            sessions_connected,
            link_connected,
            lines_received_total,
            deliveries_total,
            deliveries_dropped_total,
            commands_sent_total,
            commands_failed_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Uebernimmt Gauges und Zaehlerstaende aus einer Momentaufnahme
    pub fn aktualisieren(&self, s: &RelaySchnappschuss) {
        self.sessions_connected.set(s.sessions as i64);
        self.link_connected
            .set(i64::from(s.link_state == LinkState::Connected));
        nachziehen(&self.lines_received_total, s.zeilen);
        nachziehen(&self.deliveries_total, s.zugestellt);
        nachziehen(&self.deliveries_dropped_total, s.verworfen);
        nachziehen(&self.commands_sent_total, s.befehle_ok);
        nachziehen(&self.commands_failed_total, s.befehle_fehler);
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[derive(Clone)]
struct MetrikState {
    metriken: RelayMetrics,
    quelle: Arc<dyn StatusQuelle>,
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: RelayMetrics, quelle: Arc<dyn StatusQuelle>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(MetrikState { metriken, quelle })
}

async fn metrics_handler(State(state): State<MetrikState>) -> impl IntoResponse {
    state.metriken.aktualisieren(&state.quelle.schnappschuss());

    match state.metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
