//! serialrelay-server – Bibliotheks-Root
//!
//! Verdrahtet Link-Manager, Broadcast-Hub und HTTP-Router und stellt den
//! oeffentlichen Einstiegspunkt fuer Tests bereit.

pub mod config;
pub mod routes;

use anyhow::Result;
use config::ServerConfig;
use serialrelay_hub::{BroadcastHub, SessionRegistry};
use serialrelay_link::{LinkManager, SerialPortOeffner};
use serialrelay_observability::{RelayMetrics, RelaySchnappschuss, StatusQuelle};
use std::sync::Arc;
use tokio::sync::watch;

use routes::AppState;

/// Liefert Health und Metriken den Zustand des Hubs
pub struct HubQuelle(pub BroadcastHub);

impl StatusQuelle for HubQuelle {
    fn schnappschuss(&self) -> RelaySchnappschuss {
        let statistik = self.0.statistik();
        RelaySchnappschuss {
            link_state: self.0.link().status().state,
            sessions: self.0.registry().anzahl(),
            zeilen: statistik.zeilen,
            zugestellt: statistik.zugestellt,
            verworfen: statistik.verworfen,
            befehle_ok: statistik.befehle_ok,
            befehle_fehler: statistik.befehle_fehler,
        }
    }
}

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Link-Manager und Hub aufbauen, Ereignis-Pumpe starten
    /// 2. Optional: konfigurierten Port automatisch oeffnen
    /// 3. HTTP/WebSocket-Listener starten
    /// 4. Auf Ctrl-C warten, Sessions und serielle Verbindung schliessen
    pub async fn starten(self) -> Result<()> {
        let config = self.config;

        let oeffner = Arc::new(SerialPortOeffner::neu(config.lese_timeout()));
        let (link, ereignisse) = LinkManager::neu(oeffner, config.link_konfig());
        let hub = BroadcastHub::neu(link.clone(), SessionRegistry::neu(config.hub.session_queue));
        let pumpe = tokio::spawn(hub.clone().ereignisse_pumpen(ereignisse));

        if let Some(port) = config.serial.auto_verbinden.clone() {
            let link = link.clone();
            tokio::spawn(async move {
                tracing::info!(port = %port, "Automatisches Verbinden");
                if let Err(e) = link.oeffnen(&port).await {
                    tracing::warn!(port = %port, fehler = %e, "Automatisches Verbinden fehlgeschlagen");
                }
            });
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = AppState {
            hub,
            metriken: RelayMetrics::neu()?,
            keepalive: config.keepalive(),
            shutdown_rx,
        };
        let app = routes::router(
            state,
            &config.netzwerk.cors_origins,
            config.observability.aktiviert,
        );

        let adresse = config.http_bind_adresse();
        let listener = tokio::net::TcpListener::bind(&adresse).await?;
        tracing::info!(
            adresse = %adresse,
            baudrate = config.serial.baudrate,
            observability = config.observability.aktiviert,
            "Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)..."
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(fehler = %e, "Ctrl-C-Handler fehlgeschlagen");
                }
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                let _ = shutdown_tx.send(true);
            })
            .await?;

        link.schliessen().await;
        pumpe.abort();
        tracing::info!("Server beendet");
        Ok(())
    }
}
