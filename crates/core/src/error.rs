//! Fehlertypen fuer serialrelay
//!
//! Jeder Fehler wird an der Stelle, an der er entsteht, in ein Ereignis
//! umgewandelt. Dafuer traegt er neben dem Display-Text eine
//! maschinenlesbare [`FehlerArt`] und eine lesbare Meldung fuer den Viewer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Globaler Result-Alias fuer serialrelay
pub type Result<T> = std::result::Result<T, RelayError>;

/// Maschinenlesbare Fehlerkategorie
///
/// Wird unveraendert an die Viewer uebertragen, damit die Oberflaeche ohne
/// String-Vergleiche auf Fehler reagieren kann.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FehlerArt {
    /// Port belegt oder nicht vorhanden
    PortOpenFailure,
    /// Schreiben auf den Port fehlgeschlagen
    WriteFailure,
    /// Geraet abgezogen oder abgestuerzt
    UnexpectedDisconnect,
    /// Befehl ohne offene Verbindung
    NotConnected,
    /// Ungueltige Anfrage eines Viewers
    InvalidRequest,
    /// Interner Fehler
    Internal,
}

/// Alle moeglichen Fehler im serialrelay-System
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    // --- Serielle Verbindung ---
    #[error("Port '{port}' konnte nicht geoeffnet werden: {grund}")]
    PortOeffnen { port: String, grund: String },

    #[error("Schreiben fehlgeschlagen: {0}")]
    Schreiben(String),

    #[error("Verbindung unerwartet getrennt: {0}")]
    UnerwarteteTrennung(String),

    #[error("Nicht verbunden")]
    NichtVerbunden,

    // --- Viewer ---
    #[error("Ungueltige Anfrage: {0}")]
    UngueltigeAnfrage(String),

    // --- Host ---
    #[error("Port-Aufzaehlung fehlgeschlagen: {0}")]
    PortAufzaehlung(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl RelayError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Kategorie fuer die Praesentationsschicht
    pub fn art(&self) -> FehlerArt {
        match self {
            Self::PortOeffnen { .. } => FehlerArt::PortOpenFailure,
            Self::Schreiben(_) => FehlerArt::WriteFailure,
            Self::UnerwarteteTrennung(_) => FehlerArt::UnexpectedDisconnect,
            Self::NichtVerbunden => FehlerArt::NotConnected,
            Self::UngueltigeAnfrage(_) => FehlerArt::InvalidRequest,
            Self::PortAufzaehlung(_) | Self::Konfiguration(_) | Self::Intern(_) => {
                FehlerArt::Internal
            }
        }
    }

    /// Lesbare Kurzmeldung fuer den Viewer
    pub fn meldung(&self) -> &'static str {
        match self {
            Self::PortOeffnen { .. } => "Failed to connect",
            Self::Schreiben(_) => "Failed to send data to Arduino",
            Self::UnerwarteteTrennung(_) => "Serial port error",
            Self::NichtVerbunden => "not connected",
            Self::UngueltigeAnfrage(_) => "Invalid request",
            Self::PortAufzaehlung(_) | Self::Konfiguration(_) | Self::Intern(_) => {
                "Internal error"
            }
        }
    }

    /// Zugrundeliegender Fehlertext (OS-Fehler o.ae.), falls vorhanden
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::PortOeffnen { grund, .. } => Some(grund.clone()),
            Self::Schreiben(grund)
            | Self::UnerwarteteTrennung(grund)
            | Self::UngueltigeAnfrage(grund)
            | Self::PortAufzaehlung(grund)
            | Self::Konfiguration(grund)
            | Self::Intern(grund) => Some(grund.clone()),
            Self::NichtVerbunden => None,
        }
    }
}
