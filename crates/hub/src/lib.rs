//! serialrelay-hub – verteilt die eine serielle Verbindung an viele Viewer
//!
//! ## Architektur
//!
//! ```text
//! LinkManager --mpsc<LinkEvent>--> BroadcastHub::ereignisse_pumpen
//!                                        |
//!                                  SessionRegistry
//!                                  /      |      \
//!                           Session A  Session B  Session C   (mpsc pro Session)
//!                               |
//!                        ViewerVerbindung (WebSocket)
//!                               |
//!              connect / disconnect / send --> BroadcastHub --> LinkManager
//! ```

pub mod connection;
pub mod hub;
pub mod registry;

pub use connection::ViewerVerbindung;
pub use hub::{BroadcastHub, HubStatistik};
pub use registry::{SessionRegistry, ViewerSession, Zustellung, SESSION_QUEUE_GROESSE};
