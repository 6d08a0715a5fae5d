//! Zustandsquelle fuer Health und Metriken
//!
//! Die Observability-Crate kennt den Hub nicht; der Server implementiert
//! [`StatusQuelle`] und reicht sie an `/health` und `/metrics` weiter.

use serialrelay_core::LinkState;

/// Momentaufnahme des Relays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySchnappschuss {
    pub link_state: LinkState,
    pub sessions: usize,
    /// Monoton steigende Zaehler seit Prozessstart
    pub zeilen: u64,
    pub zugestellt: u64,
    pub verworfen: u64,
    pub befehle_ok: u64,
    pub befehle_fehler: u64,
}

impl Default for RelaySchnappschuss {
    fn default() -> Self {
        Self {
            link_state: LinkState::Disconnected,
            sessions: 0,
            zeilen: 0,
            zugestellt: 0,
            verworfen: 0,
            befehle_ok: 0,
            befehle_fehler: 0,
        }
    }
}

pub trait StatusQuelle: Send + Sync + 'static {
    fn schnappschuss(&self) -> RelaySchnappschuss;
}
