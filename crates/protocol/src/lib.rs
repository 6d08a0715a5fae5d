//! serialrelay-protocol – Zeilen-Codec, Dekodierung und Viewer-Nachrichten
//!
//! - `wire`: newline-getrennte Frames zum und vom Geraet
//! - `decode`: Zeile -> `InboundEvent` (Typed oder RawMessage)
//! - `viewer`: JSON-Nachrichten zwischen Server und Browser-Dashboards

pub mod decode;
pub mod viewer;
pub mod wire;

pub use decode::dekodieren;
pub use viewer::{ViewerBefehl, ViewerEreignis};
pub use wire::ZeilenCodec;
