//! Port-Abstraktion
//!
//! Der Link-Manager kennt nur [`PortOeffner`]. Die echte Implementierung
//! oeffnet ueber das `serialport`-Crate, Tests verwenden ein In-Memory-Geraet.

use std::io::{self, Read, Write};
use std::time::Duration;

/// Eine geoeffnete Verbindung, getrennt in Lese- und Schreibhaelfte
///
/// Die Lesehaelfte muss nach spaetestens dem Lese-Timeout mit
/// `ErrorKind::TimedOut` zurueckkehren, damit ein `close()` bemerkt wird.
pub struct PortVerbindung {
    pub leser: Box<dyn Read + Send>,
    pub schreiber: Box<dyn Write + Send>,
}

/// Oeffnet serielle Ports
///
/// `oeffnen` blockiert und wird vom Link-Manager in `spawn_blocking`
/// ausgefuehrt.
pub trait PortOeffner: Send + Sync + 'static {
    fn oeffnen(&self, pfad: &str, baudrate: u32) -> io::Result<PortVerbindung>;
}

/// Oeffnet echte serielle Ports (8N1, keine Flusskontrolle)
#[derive(Debug, Clone)]
pub struct SerialPortOeffner {
    lese_timeout: Duration,
}

impl SerialPortOeffner {
    pub fn neu(lese_timeout: Duration) -> Self {
        Self { lese_timeout }
    }
}

impl Default for SerialPortOeffner {
    fn default() -> Self {
        Self::neu(Duration::from_millis(50))
    }
}

impl PortOeffner for SerialPortOeffner {
    fn oeffnen(&self, pfad: &str, baudrate: u32) -> io::Result<PortVerbindung> {
        let port = serialport::new(pfad, baudrate)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.lese_timeout)
            .open()
            .map_err(io::Error::from)?;

        // Zweites Handle auf denselben Port fuer das Schreiben
        let schreiber = port.try_clone().map_err(io::Error::from)?;

        tracing::debug!(port = pfad, baudrate, "Serieller Port geoeffnet");

        Ok(PortVerbindung {
            leser: Box::new(port),
            schreiber: Box::new(schreiber),
        })
    }
}

/// Prueft ob ein Schreibfehler bedeutet, dass die Verbindung selbst weg ist
pub fn verbindung_kaputt(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::UnexpectedEof
    )
}
