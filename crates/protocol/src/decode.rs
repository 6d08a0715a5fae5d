//! Best-Effort-Dekodierung einer Zeile
//!
//! Reine Funktion ohne I/O: Jede nicht-leere Zeile ergibt genau ein
//! [`InboundEvent`]. Gueltiges JSON wird `Typed`, alles andere `RawMessage`.
//! Eine fehlerhafte Zeile ist nie ein Fehler.

use chrono::{DateTime, Utc};
use serialrelay_core::{InboundEvent, Payload};

/// Dekodiert einen Frame
///
/// Der Frame wird vorher rechts getrimmt (inkl. `\r`). Leere Frames ergeben
/// `None`.
pub fn dekodieren(frame: &str, jetzt: DateTime<Utc>) -> Option<InboundEvent> {
    let text = frame.trim_end();
    if text.is_empty() {
        return None;
    }

    let payload = match serde_json::from_str(text) {
        Ok(wert) => Payload::Typed(wert),
        Err(_) => Payload::RawMessage(text.to_string()),
    };

    Some(InboundEvent {
        payload,
        empfangen_um: jetzt,
    })
}
