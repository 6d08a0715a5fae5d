//! serialrelay-core – Gemeinsame Typen, Ereignisse und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen serialrelay-Crates gemeinsam genutzt werden.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{FehlerArt, RelayError, Result};
pub use event::{
    EreignisArt, InboundEvent, LinkEvent, LinkState, LinkStatus, OutboundCommand, Payload,
    StateNotice,
};
pub use types::SessionId;
