//! In-Memory-Geraet fuer Tests
//!
//! [`SpeicherOeffner`] ersetzt den echten Port. Jeder erfolgreiche
//! `oeffnen`-Aufruf erzeugt ein frisches [`SpeicherGeraet`], ueber das ein
//! Test Zeilen, I/O-Fehler und EOF einspielen sowie geschriebene Frames
//! auslesen kann.
//!
//! Ports sind exklusiv wie echte Schnittstellen: solange eine Haelfte einer
//! frueheren Oeffnung lebt, scheitert `oeffnen` mit "Device or resource busy".

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::port::{PortOeffner, PortVerbindung};

/// Wie lange ein `read` auf neue Daten wartet, bevor `TimedOut` kommt
const LESE_WARTEZEIT: Duration = Duration::from_millis(10);

const MELDUNG_BELEGT: &str = "Device or resource busy";

#[derive(Debug)]
enum LeseAktion {
    Daten(Vec<u8>),
    Fehler(String),
    Eof,
}

// ---------------------------------------------------------------------------
// Oeffner
// ---------------------------------------------------------------------------

#[derive(Default)]
struct OeffnerInnen {
    geraete: HashMap<String, SpeicherGeraet>,
    fehler: HashMap<String, String>,
    oeffnungen: Vec<String>,
    /// Lebende Port-Haelften pro Pfad
    griffe: HashMap<String, usize>,
}

/// Port-Oeffner ohne Hardware
#[derive(Clone, Default)]
pub struct SpeicherOeffner {
    inner: Arc<Mutex<OeffnerInnen>>,
}

impl SpeicherOeffner {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Jedes `oeffnen(port)` schlaegt mit `grund` fehl
    pub fn fehler_bei_oeffnen(&self, port: &str, grund: &str) {
        self.inner
            .lock()
            .fehler
            .insert(port.to_string(), grund.to_string());
    }

    /// Das zuletzt fuer `port` geoeffnete Geraet
    pub fn geraet(&self, port: &str) -> Option<SpeicherGeraet> {
        self.inner.lock().geraete.get(port).cloned()
    }

    /// Alle Oeffnungsversuche in Reihenfolge, auch fehlgeschlagene
    pub fn oeffnungen(&self) -> Vec<String> {
        self.inner.lock().oeffnungen.clone()
    }

    /// Noch nicht freigegebene Lese- und Schreibhaelften von `port`
    pub fn offene_griffe(&self, port: &str) -> usize {
        self.inner.lock().griffe.get(port).copied().unwrap_or(0)
    }

    fn griff(&self, innen: &mut OeffnerInnen, port: &str) -> Griff {
        *innen.griffe.entry(port.to_string()).or_insert(0) += 1;
        Griff {
            port: port.to_string(),
            oeffner: Arc::clone(&self.inner),
        }
    }
}

/// Zaehlt eine Port-Haelfte, bis sie gedroppt wird
struct Griff {
    port: String,
    oeffner: Arc<Mutex<OeffnerInnen>>,
}

impl Drop for Griff {
    fn drop(&mut self) {
        let mut innen = self.oeffner.lock();
        if let Some(anzahl) = innen.griffe.get_mut(&self.port) {
            *anzahl = anzahl.saturating_sub(1);
        }
    }
}

impl PortOeffner for SpeicherOeffner {
    fn oeffnen(&self, pfad: &str, baudrate: u32) -> io::Result<PortVerbindung> {
        let mut innen = self.inner.lock();
        innen.oeffnungen.push(pfad.to_string());

        if let Some(grund) = innen.fehler.get(pfad) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, grund.clone()));
        }
        if innen.griffe.get(pfad).is_some_and(|&n| n > 0) {
            return Err(io::Error::new(io::ErrorKind::Other, MELDUNG_BELEGT));
        }

        let (tx, rx) = std_mpsc::channel();
        let geraet = SpeicherGeraet {
            tx,
            geschrieben: Arc::new(Mutex::new(Vec::new())),
            schreibfehler: Arc::new(Mutex::new(None)),
            baudrate,
        };

        let verbindung = PortVerbindung {
            leser: Box::new(SpeicherLeser {
                rx,
                rest: Vec::new(),
                _griff: self.griff(&mut innen, pfad),
            }),
            schreiber: Box::new(SpeicherSchreiber {
                geschrieben: Arc::clone(&geraet.geschrieben),
                schreibfehler: Arc::clone(&geraet.schreibfehler),
                _griff: self.griff(&mut innen, pfad),
            }),
        };

        innen.geraete.insert(pfad.to_string(), geraet);
        Ok(verbindung)
    }
}

// ---------------------------------------------------------------------------
// Geraet
// ---------------------------------------------------------------------------

/// Steuerseite eines geoeffneten In-Memory-Ports
#[derive(Clone)]
pub struct SpeicherGeraet {
    tx: std_mpsc::Sender<LeseAktion>,
    geschrieben: Arc<Mutex<Vec<u8>>>,
    schreibfehler: Arc<Mutex<Option<io::ErrorKind>>>,
    baudrate: u32,
}

impl SpeicherGeraet {
    /// Sendet `zeile` plus `\n` an den Leser
    pub fn zeile_senden(&self, zeile: &str) {
        let mut daten = zeile.as_bytes().to_vec();
        daten.push(b'\n');
        self.bytes_senden(&daten);
    }

    /// Sendet rohe Bytes, ohne Zeilenende
    pub fn bytes_senden(&self, daten: &[u8]) {
        let _ = self.tx.send(LeseAktion::Daten(daten.to_vec()));
    }

    /// Naechstes `read` liefert einen I/O-Fehler
    pub fn io_fehler(&self, grund: &str) {
        let _ = self.tx.send(LeseAktion::Fehler(grund.to_string()));
    }

    /// Naechstes `read` liefert EOF
    pub fn trennen(&self) {
        let _ = self.tx.send(LeseAktion::Eof);
    }

    /// Alles was bisher geschrieben wurde
    pub fn geschrieben(&self) -> String {
        String::from_utf8_lossy(&self.geschrieben.lock()).into_owned()
    }

    /// Alle folgenden Schreibvorgaenge schlagen mit `kind` fehl (`None` = ok)
    pub fn schreibfehler_setzen(&self, kind: Option<io::ErrorKind>) {
        *self.schreibfehler.lock() = kind;
    }

    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }
}

// ---------------------------------------------------------------------------
// Lese- und Schreibhaelfte
// ---------------------------------------------------------------------------

struct SpeicherLeser {
    rx: std_mpsc::Receiver<LeseAktion>,
    rest: Vec<u8>,
    _griff: Griff,
}

impl SpeicherLeser {
    fn aus_rest(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.rest.len());
        buf[..n].copy_from_slice(&self.rest[..n]);
        self.rest.drain(..n);
        n
    }
}

impl Read for SpeicherLeser {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.rest.is_empty() {
            return Ok(self.aus_rest(buf));
        }

        match self.rx.recv_timeout(LESE_WARTEZEIT) {
            Ok(LeseAktion::Daten(daten)) => {
                self.rest = daten;
                Ok(self.aus_rest(buf))
            }
            Ok(LeseAktion::Fehler(grund)) => Err(io::Error::new(io::ErrorKind::Other, grund)),
            Ok(LeseAktion::Eof) => Ok(0),
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                Err(io::Error::new(io::ErrorKind::TimedOut, "keine Daten"))
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Ok(0),
        }
    }
}

struct SpeicherSchreiber {
    geschrieben: Arc<Mutex<Vec<u8>>>,
    schreibfehler: Arc<Mutex<Option<io::ErrorKind>>>,
    _griff: Griff,
}

impl Write for SpeicherSchreiber {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(kind) = *self.schreibfehler.lock() {
            return Err(io::Error::new(kind, "write rejected by device"));
        }
        self.geschrieben.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
