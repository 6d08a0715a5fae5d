//! Port-Auflistung
//!
//! Erkannte Geraete vom Betriebssystem plus eine feste Liste ueblicher
//! Pfade, damit die Auswahl auch ohne erkannte Geraete nicht leer ist.

use serde::{Deserialize, Serialize};
use serialrelay_core::RelayError;

/// Ein auswaehlbarer Port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub friendly_name: Option<String>,
    /// `true` wenn vom Betriebssystem gemeldet, `false` fuer Vorschlaege
    pub detected: bool,
}

/// Fragt das Betriebssystem nach seriellen Ports (blockierend)
pub fn verfuegbare_ports() -> Result<Vec<PortInfo>, RelayError> {
    let ports = serialport::available_ports()
        .map_err(|e| RelayError::PortAufzaehlung(e.to_string()))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let friendly_name = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => {
                    match (info.manufacturer, info.product) {
                        (Some(hersteller), Some(produkt)) => Some(format!("{hersteller} {produkt}")),
                        (Some(name), None) | (None, Some(name)) => Some(name),
                        (None, None) => None,
                    }
                }
                _ => None,
            };
            PortInfo {
                path: p.port_name,
                friendly_name,
                detected: true,
            }
        })
        .collect())
}

/// Uebliche Arduino-Pfade unter Windows und Linux, COM3 zuerst
pub fn bekannte_ports() -> Vec<PortInfo> {
    [
        ("COM3", "Arduino COM3 (Recommended)"),
        ("COM1", "Arduino COM1"),
        ("COM4", "Arduino COM4"),
        ("COM5", "Arduino COM5"),
        ("COM6", "Arduino COM6"),
        ("COM7", "Arduino COM7"),
        ("COM8", "Arduino COM8"),
        ("/dev/ttyUSB0", "Arduino USB0 (Linux)"),
        ("/dev/ttyACM0", "Arduino ACM0 (Linux)"),
        ("/dev/ttyUSB1", "Arduino USB1 (Linux)"),
        ("/dev/ttyACM1", "Arduino ACM1 (Linux)"),
    ]
    .into_iter()
    .map(|(path, name)| PortInfo {
        path: path.to_string(),
        friendly_name: Some(name.to_string()),
        detected: false,
    })
    .collect()
}

/// Erkannte Ports zuerst, danach Vorschlaege deren Pfad noch fehlt
pub fn zusammenfuehren(erkannt: Vec<PortInfo>, bekannte: Vec<PortInfo>) -> Vec<PortInfo> {
    let mut liste = erkannt;
    for vorschlag in bekannte {
        if !liste.iter().any(|p| p.path == vorschlag.path) {
            liste.push(vorschlag);
        }
    }
    liste
}

/// Liste fuer die Anzeige; ein Fehler der Auflistung liefert nur die Vorschlaege
pub fn ports_auflisten() -> Vec<PortInfo> {
    let erkannt = match verfuegbare_ports() {
        Ok(ports) => ports,
        Err(e) => {
            tracing::warn!(fehler = %e, "Port-Auflistung fehlgeschlagen");
            Vec::new()
        }
    };
    tracing::debug!(erkannt = erkannt.len(), "Ports aufgelistet");
    zusammenfuehren(erkannt, bekannte_ports())
}
