//! Domaenen-Ereignisse zwischen Link-Manager, Hub und Viewern
//!
//! Der Link-Manager ist der einzige Produzent von [`LinkEvent`]s. Sie
//! fliessen ueber einen tokio-Kanal zum Broadcast-Hub, der sie an alle
//! Sessions verteilt.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{FehlerArt, RelayError};

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

/// Zustand der (einzigen) seriellen Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    /// Nicht terminal: ein weiteres `open()` versucht es erneut
    Error,
}

/// Momentaufnahme des Verbindungszustands
///
/// `port` ist nur in `Connecting`/`Connected` gesetzt. Die Konstruktoren
/// halten diese Invariante ein.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatus {
    pub state: LinkState,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub port: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_error: Option<String>,
}

impl LinkStatus {
    pub fn getrennt() -> Self {
        Self {
            state: LinkState::Disconnected,
            port: None,
            last_error: None,
        }
    }

    pub fn verbindet(port: impl Into<String>) -> Self {
        Self {
            state: LinkState::Connecting,
            port: Some(port.into()),
            last_error: None,
        }
    }

    pub fn verbunden(port: impl Into<String>) -> Self {
        Self {
            state: LinkState::Connected,
            port: Some(port.into()),
            last_error: None,
        }
    }

    pub fn fehler(grund: impl Into<String>) -> Self {
        Self {
            state: LinkState::Error,
            port: None,
            last_error: Some(grund.into()),
        }
    }

    /// Prueft ob aktuell eine Verbindung offen ist
    pub fn ist_verbunden(&self) -> bool {
        self.state == LinkState::Connected
    }
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::getrennt()
    }
}

// ---------------------------------------------------------------------------
// Eingehende Ereignisse (Geraet -> Viewer)
// ---------------------------------------------------------------------------

/// Art eines dekodierten Eingangs-Ereignisses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EreignisArt {
    Typed,
    RawMessage,
}

/// Inhalt einer dekodierten Zeile
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Zeile war gueltiges JSON
    Typed(Value),
    /// Zeile war kein JSON; der getrimmte Originaltext
    RawMessage(String),
}

/// Ein dekodiertes Ereignis aus genau einer Zeile serieller Eingabe
///
/// Unveraenderlich nach der Erzeugung, lebt nur fuer die Dauer einer
/// Verteilung.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub payload: Payload,
    pub empfangen_um: DateTime<Utc>,
}

impl InboundEvent {
    pub fn art(&self) -> EreignisArt {
        match self.payload {
            Payload::Typed(_) => EreignisArt::Typed,
            Payload::RawMessage(_) => EreignisArt::RawMessage,
        }
    }

    /// JSON-Darstellung fuer die Viewer
    ///
    /// Typisierte Zeilen werden unveraendert weitergegeben, Rohtext wird in
    /// `{type: "message", data, timestamp}` verpackt.
    pub fn als_json(&self) -> Value {
        match &self.payload {
            Payload::Typed(wert) => wert.clone(),
            Payload::RawMessage(text) => json!({
                "type": "message",
                "data": text,
                "timestamp": self.empfangen_um.to_rfc3339_opts(SecondsFormat::Millis, true),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Ausgehende Befehle (Viewer -> Geraet)
// ---------------------------------------------------------------------------

/// Befehl den eine Session an das Geraet senden moechte
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundCommand {
    /// Wird unveraendert gesendet
    Text(String),
    /// Wird als kompaktes JSON gesendet
    Struktur(Value),
}

impl OutboundCommand {
    /// Text des Frames ohne abschliessendes `\n`
    pub fn als_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Struktur(wert) => wert.to_string(),
        }
    }
}

impl From<Value> for OutboundCommand {
    fn from(wert: Value) -> Self {
        match wert {
            Value::String(text) => Self::Text(text),
            andere => Self::Struktur(andere),
        }
    }
}

impl From<&str> for OutboundCommand {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

// ---------------------------------------------------------------------------
// Zustands-Meldungen
// ---------------------------------------------------------------------------

/// Meldung ueber einen Zustandswechsel der seriellen Verbindung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateNotice {
    Verbindet {
        port: String,
    },
    Verbunden {
        port: String,
    },
    Getrennt {
        meldung: String,
    },
    Fehler {
        art: FehlerArt,
        meldung: String,
        detail: Option<String>,
    },
}

impl StateNotice {
    /// Ausgangszustand beim Prozessstart
    pub fn nicht_verbunden() -> Self {
        Self::Getrennt {
            meldung: "Arduino not connected".into(),
        }
    }

    pub fn aus_fehler(fehler: &RelayError) -> Self {
        Self::Fehler {
            art: fehler.art(),
            meldung: fehler.meldung().to_string(),
            detail: fehler.detail(),
        }
    }
}

/// Ereignis vom Link-Manager an den Broadcast-Hub
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Zustand(StateNotice),
    Daten(InboundEvent),
}
