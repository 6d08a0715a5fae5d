//! Viewer-Verbindung – eine WebSocket-Verbindung = eine Session
//!
//! Jede WebSocket bekommt eine `ViewerVerbindung` in einem eigenen
//! tokio-Task. Die Schleife liest Befehle vom Browser, schreibt die
//! Session-Queue des Hubs auf den Socket und sendet Keepalive-Pings.
//!
//! Befehle einer Session werden nacheinander abgearbeitet; `send_to_arduino`
//! wird abgewartet, damit Antworten in Sende-Reihenfolge ankommen.
//! Schliesst die Registry die Session-Queue, endet die WebSocket; der Browser
//! verbindet neu und bekommt ein Replay.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serialrelay_core::{OutboundCommand, SessionId};
use serialrelay_protocol::ViewerBefehl;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant};

use crate::hub::BroadcastHub;
use crate::registry::ViewerSession;

/// Verarbeitet eine einzelne Viewer-WebSocket
pub struct ViewerVerbindung {
    hub: BroadcastHub,
    keepalive: Duration,
}

impl ViewerVerbindung {
    pub fn neu(hub: BroadcastHub, keepalive: Duration) -> Self {
        Self { hub, keepalive }
    }

    /// Laeuft bis der Browser trennt, der Socket bricht oder Shutdown kommt
    pub async fn verarbeiten(self, socket: WebSocket, mut shutdown_rx: watch::Receiver<bool>) {
        let session = ViewerSession::neu();
        let id = session.id;
        let mut ausgehend = self.hub.session_beitreten(session);

        let (mut sink, mut stream) = socket.split();
        let keepalive = self.keepalive.max(Duration::from_secs(1));
        let mut ping = interval_at(Instant::now() + keepalive, keepalive);

        loop {
            tokio::select! {
                // Eingehende Nachricht vom Browser
                nachricht = stream.next() => {
                    match nachricht {
                        Some(Ok(Message::Text(text))) => {
                            tracing::trace!(session_id = %id, "Nachricht empfangen");
                            self.befehl_verarbeiten(&id, &text).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::debug!(session_id = %id, "WebSocket vom Browser geschlossen");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(session_id = %id, fehler = %e, "WebSocket-Lesefehler");
                            break;
                        }
                    }
                }

                // Ausgehendes Ereignis aus dem Hub
                ereignis = ausgehend.recv() => {
                    let Some(ereignis) = ereignis else {
                        // Registry hat die Session abgehaengt
                        tracing::info!(session_id = %id, "Session-Queue geschlossen, Viewer wird getrennt");
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    };
                    let text = match ereignis.als_json_text() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(session_id = %id, fehler = %e, "Ereignis nicht serialisierbar");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        tracing::warn!(session_id = %id, fehler = %e, "Senden an Viewer fehlgeschlagen");
                        break;
                    }
                }

                // Keepalive-Ping
                _ = ping.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        tracing::debug!(session_id = %id, "Ping fehlgeschlagen");
                        break;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(session_id = %id, "Shutdown-Signal – Viewer wird getrennt");
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }

        self.hub.session_verlassen(&id);
    }

    async fn befehl_verarbeiten(&self, id: &SessionId, text: &str) {
        match ViewerBefehl::parsen(text) {
            Ok(ViewerBefehl::Verbinden { port }) => self.hub.verbinden(id, port),
            Ok(ViewerBefehl::Trennen) => {
                if !self.hub.trennen().await {
                    tracing::debug!(session_id = %id, "Trennen ohne offene Verbindung");
                }
            }
            Ok(ViewerBefehl::Senden(wert)) => {
                self.hub
                    .befehl_weiterleiten(id, OutboundCommand::from(wert))
                    .await
            }
            Err(e) => {
                tracing::warn!(session_id = %id, fehler = %e, "Ungueltige Viewer-Nachricht");
                self.hub.fehler_melden(id, &e);
            }
        }
    }
}
