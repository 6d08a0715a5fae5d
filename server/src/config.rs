//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};
use serialrelay_link::LinkKonfig;
use serialrelay_observability::logging::{log_format_gueltig, log_level_gueltig};
use std::time::Duration;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP/WebSocket-Listener
    pub netzwerk: NetzwerkEinstellungen,
    /// Serielle Schnittstelle
    pub serial: SerialEinstellungen,
    /// Viewer-Sessions
    pub hub: HubEinstellungen,
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    pub bind_adresse: String,
    /// Port fuer HTTP und WebSocket; `PORT` aus der Umgebung hat Vorrang
    pub http_port: u16,
    /// Erlaubte CORS-Origins (leer = alle erlaubt)
    pub cors_origins: Vec<String>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            http_port: 3000,
            cors_origins: vec![],
        }
    }
}

/// Serielle Schnittstelle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialEinstellungen {
    pub baudrate: u32,
    /// Wie oft die Lese-Schleife ein `close()` bemerkt
    pub lese_timeout_ms: u64,
    /// Laengere Zeilen werden bis zum naechsten `\n` verworfen
    pub max_zeilen_laenge: usize,
    /// Kapazitaet des Kanals Link-Manager -> Hub
    pub ereignis_queue: usize,
    /// Port der beim Start automatisch geoeffnet wird
    pub auto_verbinden: Option<String>,
}

impl Default for SerialEinstellungen {
    fn default() -> Self {
        let link = LinkKonfig::default();
        Self {
            baudrate: link.baudrate,
            lese_timeout_ms: 50,
            max_zeilen_laenge: link.max_zeilen_laenge,
            ereignis_queue: link.ereignis_queue,
            auto_verbinden: None,
        }
    }
}

/// Viewer-Sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubEinstellungen {
    /// Send-Queue pro Session
    pub session_queue: usize,
    /// Intervall der WebSocket-Pings
    pub keepalive_sek: u64,
}

impl Default for HubEinstellungen {
    fn default() -> Self {
        Self {
            session_queue: serialrelay_hub::SESSION_QUEUE_GROESSE,
            keepalive_sek: 30,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Haengt `/health` und `/metrics` an den HTTP-Router
    pub aktiviert: bool,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self { aktiviert: true }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Uebernimmt `PORT` aus der Umgebung, falls gesetzt
    pub fn port_ueberschreiben(&mut self, port: Option<&str>) -> anyhow::Result<()> {
        if let Some(port) = port {
            self.netzwerk.http_port = port
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Ungueltiger PORT '{port}': {e}"))?;
        }
        Ok(())
    }

    /// Prueft Werte, die serde nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if self.serial.baudrate == 0 {
            anyhow::bail!("serial.baudrate darf nicht 0 sein");
        }
        if self.serial.lese_timeout_ms == 0 {
            anyhow::bail!("serial.lese_timeout_ms darf nicht 0 sein");
        }
        if self.serial.max_zeilen_laenge == 0 {
            anyhow::bail!("serial.max_zeilen_laenge darf nicht 0 sein");
        }
        if self.serial.ereignis_queue == 0 || self.hub.session_queue == 0 {
            anyhow::bail!("Queue-Groessen muessen groesser als 0 sein");
        }
        if !log_level_gueltig(&self.logging.level) {
            anyhow::bail!("Unbekanntes Log-Level '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Unbekanntes Log-Format '{}'", self.logging.format);
        }
        Ok(())
    }

    /// Bind-Adresse fuer HTTP und WebSocket
    pub fn http_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.http_port)
    }

    pub fn link_konfig(&self) -> LinkKonfig {
        LinkKonfig {
            baudrate: self.serial.baudrate,
            max_zeilen_laenge: self.serial.max_zeilen_laenge,
            ereignis_queue: self.serial.ereignis_queue,
        }
    }

    pub fn lese_timeout(&self) -> Duration {
        Duration::from_millis(self.serial.lese_timeout_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.hub.keepalive_sek)
    }
}
