//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (hat Vorrang vor der Config-Datei):
//! - `SR_LOG_LEVEL`: Filter-Ausdruck oder Level (trace/debug/info/warn/error)
//! - `SR_LOG_FORMAT`: Format (text/json)

use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Filter
pub const ENV_LOG_LEVEL: &str = "SR_LOG_LEVEL";
/// Umgebungsvariable fuer das Log-Format
pub const ENV_LOG_FORMAT: &str = "SR_LOG_FORMAT";

/// Initialisiert das Logging-System
///
/// Gibt `false` zurueck wenn bereits ein globaler Subscriber gesetzt war.
pub fn logging_initialisieren(level: &str, format: &str) -> bool {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = effektives_format(std::env::var(ENV_LOG_FORMAT).ok(), format);

    let ergebnis = match format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.is_ok()
}

/// Umgebung schlaegt Konfiguration, unbekannte Formate werden zu `text`
fn effektives_format(aus_env: Option<String>, konfiguriert: &str) -> String {
    let format = aus_env.unwrap_or_else(|| konfiguriert.to_string());
    if log_format_gueltig(&format) {
        format
    } else {
        "text".to_string()
    }
}

/// Validiert ob ein Log-Level-String gueltig ist
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
