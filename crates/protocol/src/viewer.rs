//! Viewer-Protokoll (WebSocket)
//!
//! Definiert alle Nachrichten zwischen Browser-Dashboard und Server.
//!
//! ## Design
//! - JSON-Textframes, adjacently tagged: `{"event": "...", "data": ...}`
//! - Event-Namen entsprechen denen der bestehenden Dashboards
//!   (`arduino_connected`, `send_to_arduino`, ...)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serialrelay_core::{FehlerArt, InboundEvent, RelayError, StateNotice};

// ---------------------------------------------------------------------------
// Server -> Viewer
// ---------------------------------------------------------------------------

/// Nachricht vom Server an einen Viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ViewerEreignis {
    /// Port wird geoeffnet
    #[serde(rename = "arduino_connecting")]
    Verbindet { port: String },

    /// Verbindung steht
    #[serde(rename = "arduino_connected")]
    Verbunden { port: String, message: String },

    /// Verbindung geschlossen (oder nie geoeffnet)
    #[serde(rename = "arduino_disconnected")]
    Getrennt { message: String },

    /// Fehler mit maschinenlesbarer Kategorie
    #[serde(rename = "arduino_error")]
    Fehler {
        kind: FehlerArt,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        detail: Option<String>,
    },

    /// Dekodierte Zeile vom Geraet
    #[serde(rename = "arduino_data")]
    Daten(Value),

    /// Befehl wurde geschrieben (nur an den Absender)
    #[serde(rename = "data_sent")]
    Gesendet { message: String },
}

impl ViewerEreignis {
    /// Broadcast-Nachricht fuer einen Zustandswechsel
    pub fn aus_notice(notice: &StateNotice) -> Self {
        match notice {
            StateNotice::Verbindet { port } => Self::Verbindet { port: port.clone() },
            StateNotice::Verbunden { port } => Self::Verbunden {
                port: port.clone(),
                message: "Arduino connected successfully".into(),
            },
            StateNotice::Getrennt { meldung } => Self::Getrennt {
                message: meldung.clone(),
            },
            StateNotice::Fehler {
                art,
                meldung,
                detail,
            } => Self::Fehler {
                kind: *art,
                message: meldung.clone(),
                detail: detail.clone(),
            },
        }
    }

    /// Momentaufnahme fuer eine neu beigetretene Session
    pub fn replay(notice: &StateNotice) -> Self {
        match notice {
            StateNotice::Verbunden { port } => Self::Verbunden {
                port: port.clone(),
                message: "Arduino already connected".into(),
            },
            StateNotice::Getrennt { .. } => Self::Getrennt {
                message: "Arduino not connected".into(),
            },
            andere => Self::aus_notice(andere),
        }
    }

    pub fn aus_fehler(fehler: &RelayError) -> Self {
        Self::Fehler {
            kind: fehler.art(),
            message: fehler.meldung().to_string(),
            detail: fehler.detail(),
        }
    }

    pub fn daten(ereignis: &InboundEvent) -> Self {
        Self::Daten(ereignis.als_json())
    }

    pub fn gesendet() -> Self {
        Self::Gesendet {
            message: "Data sent to Arduino successfully".into(),
        }
    }

    /// Serialisiert die Nachricht fuer einen WebSocket-Textframe
    pub fn als_json_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Viewer -> Server
// ---------------------------------------------------------------------------

/// Anfrage eines Viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ViewerBefehl {
    #[serde(rename = "connect_arduino")]
    Verbinden { port: String },

    #[serde(rename = "disconnect_arduino")]
    Trennen,

    /// Text wird unveraendert gesendet, alles andere als JSON
    #[serde(rename = "send_to_arduino")]
    Senden(Value),
}

impl ViewerBefehl {
    /// Parst einen WebSocket-Textframe
    pub fn parsen(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|e| RelayError::UngueltigeAnfrage(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
