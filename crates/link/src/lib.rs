//! serialrelay-link – die eine serielle Verbindung des Relays
//!
//! ```text
//! Geraet --bytes--> lese_schleife (blocking) --Zeilen--> Pumpe (tokio)
//!                                                          |
//!                                  LinkManager::zeile_melden / verbindung_verloren
//!                                                          |
//!                                            mpsc<LinkEvent> --> Hub
//! ```
//!
//! - `manager`: Zustandsautomat, oeffnen/schliessen/senden
//! - `port`: `PortOeffner`-Trait und echte serielle Ports
//! - `ports`: Auflistung verfuegbarer Ports
//! - `speicher`: In-Memory-Geraet (nur mit Feature `test-util`)

pub mod manager;
pub mod port;
pub mod ports;
mod reader;

#[cfg(any(test, feature = "test-util"))]
pub mod speicher;

pub use manager::{LinkKonfig, LinkManager};
pub use port::{PortOeffner, PortVerbindung, SerialPortOeffner};
pub use ports::{ports_auflisten, PortInfo};
