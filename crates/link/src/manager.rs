//! Serial-Link-Manager
//!
//! Besitzt hoechstens eine offene serielle Verbindung und ist der einzige,
//! der den [`LinkStatus`] veraendert. Alle Zustandswechsel und dekodierten
//! Zeilen gehen als [`LinkEvent`] ueber einen tokio-Kanal an den Hub.
//!
//! ## Nebenlaeufigkeit
//!
//! `oeffnen`, `schliessen`, `senden` und das Melden von Lese-Ereignissen
//! laufen unter demselben async Mutex. Jede Verbindung bekommt eine
//! Generation; Meldungen einer alten Generation werden verworfen, sodass
//! nach `arduino_disconnected` keine Daten der alten Verbindung mehr kommen.
//!
//! Beim Trennen wartet der Manager, bis die Lese-Schleife beendet ist und
//! beide Port-Haelften freigegeben sind. Erst danach werden Zustand und
//! Ereignis gesetzt; ein folgendes `oeffnen` desselben Ports findet ihn frei.

use bytes::BytesMut;
use chrono::Utc;
use parking_lot::RwLock;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::Encoder;

use serialrelay_core::{LinkEvent, LinkStatus, OutboundCommand, RelayError, StateNotice};
use serialrelay_protocol::{dekodieren, wire::DEFAULT_MAX_ZEILEN_LAENGE, ZeilenCodec};

use crate::port::{verbindung_kaputt, PortOeffner};
use crate::reader::{lese_schleife, LeserMeldung};

/// Kapazitaet des Kanals zwischen Lese-Schleife und Pumpe
const LESER_QUEUE: usize = 64;

/// Meldung bei sauberem Trennen
const MELDUNG_GETRENNT: &str = "Arduino disconnected";

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Parameter des Link-Managers
#[derive(Debug, Clone)]
pub struct LinkKonfig {
    /// Feste Baudrate fuer jede Verbindung
    pub baudrate: u32,
    pub max_zeilen_laenge: usize,
    /// Kapazitaet des Ereignis-Kanals zum Hub
    pub ereignis_queue: usize,
}

impl Default for LinkKonfig {
    fn default() -> Self {
        Self {
            baudrate: 9600,
            max_zeilen_laenge: DEFAULT_MAX_ZEILEN_LAENGE,
            ereignis_queue: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Interner Zustand
// ---------------------------------------------------------------------------

struct AktiveVerbindung {
    generation: u64,
    port: String,
    schreiber: Arc<parking_lot::Mutex<Box<dyn Write + Send>>>,
    /// Beendet die Lese-Schleife dieser Verbindung
    stopp: Arc<AtomicBool>,
    /// Lese-Schleife, haelt die Lese-Haelfte des Ports
    leser: JoinHandle<()>,
    pumpe: JoinHandle<()>,
}

impl AktiveVerbindung {
    /// Stoppt die Lese-Schleife und wartet, bis der Port freigegeben ist
    ///
    /// `pumpe_stoppen = false` nur, wenn die Pumpe selbst aufruft; ihre
    /// Lese-Schleife ist dann schon beendet.
    async fn freigeben(self, pumpe_stoppen: bool) {
        self.stopp.store(true, Ordering::SeqCst);
        drop(self.schreiber);
        // Ohne Pumpe scheitert ein haengendes `blocking_send` der Lese-Schleife
        if pumpe_stoppen {
            self.pumpe.abort();
        }
        if let Err(e) = self.leser.await {
            tracing::warn!(port = %self.port, fehler = %e, "Lese-Schleife abgebrochen");
        }
    }
}

#[derive(Default)]
struct LinkInnen {
    verbindung: Option<AktiveVerbindung>,
}

impl LinkInnen {
    fn ist_aktuell(&self, generation: u64) -> bool {
        self.verbindung
            .as_ref()
            .is_some_and(|v| v.generation == generation)
    }
}

struct ManagerInner {
    oeffner: Arc<dyn PortOeffner>,
    konfig: LinkKonfig,
    innen: Mutex<LinkInnen>,
    /// Spiegel fuer lesende Zugriffe ohne async Lock; nur unter `innen` geschrieben
    status: RwLock<LinkStatus>,
    generation: AtomicU64,
    ereignisse: mpsc::Sender<LinkEvent>,
}

// ---------------------------------------------------------------------------
// LinkManager
// ---------------------------------------------------------------------------

/// Verwaltet die eine serielle Verbindung des Prozesses
#[derive(Clone)]
pub struct LinkManager {
    inner: Arc<ManagerInner>,
}

impl LinkManager {
    /// Erstellt einen Manager im Zustand `Disconnected`
    ///
    /// Der zurueckgegebene Receiver liefert alle Ereignisse in der
    /// Reihenfolge, in der sie entstanden sind.
    pub fn neu(
        oeffner: Arc<dyn PortOeffner>,
        konfig: LinkKonfig,
    ) -> (Self, mpsc::Receiver<LinkEvent>) {
        let (tx, rx) = mpsc::channel(konfig.ereignis_queue.max(1));
        let manager = Self {
            inner: Arc::new(ManagerInner {
                oeffner,
                konfig,
                innen: Mutex::new(LinkInnen::default()),
                status: RwLock::new(LinkStatus::getrennt()),
                generation: AtomicU64::new(0),
                ereignisse: tx,
            }),
        };
        (manager, rx)
    }

    /// Aktueller Zustand (Momentaufnahme)
    pub fn status(&self) -> LinkStatus {
        self.inner.status.read().clone()
    }

    pub fn ist_verbunden(&self) -> bool {
        self.inner.status.read().ist_verbunden()
    }

    pub fn konfig(&self) -> &LinkKonfig {
        &self.inner.konfig
    }

    /// Oeffnet `port`, eine bestehende Verbindung wird vorher geschlossen
    ///
    /// Erfolg und Fehlschlag werden zusaetzlich als Ereignis gemeldet. Nach
    /// einem Fehlschlag haelt der Manager keine Port-Ressource mehr.
    pub async fn oeffnen(&self, port: &str) -> Result<(), RelayError> {
        let mut innen = self.inner.innen.lock().await;

        self.trennen_intern(&mut innen).await;

        self.status_setzen(LinkStatus::verbindet(port));
        self.melden(LinkEvent::Zustand(StateNotice::Verbindet {
            port: port.to_string(),
        }))
        .await;

        let oeffner = Arc::clone(&self.inner.oeffner);
        let pfad = port.to_string();
        let baudrate = self.inner.konfig.baudrate;
        let ergebnis = match tokio::task::spawn_blocking(move || oeffner.oeffnen(&pfad, baudrate))
            .await
        {
            Ok(ergebnis) => ergebnis,
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
        };

        let verbindung = match ergebnis {
            Ok(v) => v,
            Err(e) => {
                let fehler = RelayError::PortOeffnen {
                    port: port.to_string(),
                    grund: e.to_string(),
                };
                tracing::warn!(port, fehler = %e, "Port konnte nicht geoeffnet werden");
                self.status_setzen(LinkStatus::fehler(e.to_string()));
                self.melden(LinkEvent::Zustand(StateNotice::aus_fehler(&fehler)))
                    .await;
                return Err(fehler);
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let stopp = Arc::new(AtomicBool::new(false));
        let (leser, pumpe) = self.leser_starten(generation, verbindung.leser, Arc::clone(&stopp));
        innen.verbindung = Some(AktiveVerbindung {
            generation,
            port: port.to_string(),
            schreiber: Arc::new(parking_lot::Mutex::new(verbindung.schreiber)),
            stopp,
            leser,
            pumpe,
        });

        self.status_setzen(LinkStatus::verbunden(port));
        self.melden(LinkEvent::Zustand(StateNotice::Verbunden {
            port: port.to_string(),
        }))
        .await;

        tracing::info!(port, baudrate, generation, "Serielle Verbindung hergestellt");
        Ok(())
    }

    /// Schliesst die offene Verbindung
    ///
    /// Gibt `false` zurueck (ohne Ereignis), wenn keine offen war.
    pub async fn schliessen(&self) -> bool {
        let mut innen = self.inner.innen.lock().await;
        self.trennen_intern(&mut innen).await
    }

    /// Schreibt `befehl` als Zeile auf den Port
    ///
    /// Fehler gehen nur an den Aufrufer. Meldet das Betriebssystem dabei eine
    /// kaputte Verbindung, wird zusaetzlich der Verbindungsverlust an alle
    /// gemeldet.
    pub async fn senden(&self, befehl: &OutboundCommand) -> Result<(), RelayError> {
        let mut innen = self.inner.innen.lock().await;

        let Some(verbindung) = innen.verbindung.as_ref() else {
            tracing::debug!("Senden ohne Verbindung abgelehnt");
            return Err(RelayError::NichtVerbunden);
        };
        let generation = verbindung.generation;
        let port = verbindung.port.clone();
        let schreiber = Arc::clone(&verbindung.schreiber);

        let text = befehl.als_text();
        let mut frame = BytesMut::with_capacity(text.len() + 1);
        ZeilenCodec::new()
            .encode(text.as_str(), &mut frame)
            .map_err(|e| RelayError::Schreiben(e.to_string()))?;

        let ergebnis = match tokio::task::spawn_blocking(move || {
            let mut schreiber = schreiber.lock();
            schreiber.write_all(&frame)?;
            schreiber.flush()
        })
        .await
        {
            Ok(ergebnis) => ergebnis,
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
        };

        match ergebnis {
            Ok(()) => {
                tracing::debug!(port = %port, bytes = text.len() + 1, "Frame gesendet");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(port = %port, fehler = %e, "Schreiben fehlgeschlagen");
                if verbindung_kaputt(e.kind()) {
                    self.verloren_intern(&mut innen, generation, Some(e.to_string()), true)
                        .await;
                }
                Err(RelayError::Schreiben(e.to_string()))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Meldungen der Lese-Pumpe
    // -----------------------------------------------------------------------

    /// Dekodiert eine gelesene Zeile und meldet sie, falls die Verbindung noch gilt
    async fn zeile_melden(&self, generation: u64, zeile: &str) {
        let Some(ereignis) = dekodieren(zeile, Utc::now()) else {
            return;
        };

        let innen = self.inner.innen.lock().await;
        if !innen.ist_aktuell(generation) {
            return;
        }
        self.melden(LinkEvent::Daten(ereignis)).await;
    }

    /// Lese-Schleife ist beendet: EOF (`None`) oder I/O-Fehler
    async fn verbindung_verloren(&self, generation: u64, fehler: Option<io::Error>) {
        let mut innen = self.inner.innen.lock().await;
        self.verloren_intern(&mut innen, generation, fehler.map(|e| e.to_string()), false)
            .await;
    }

    // -----------------------------------------------------------------------
    // Interne Helfer (Aufrufer haelt `innen`)
    // -----------------------------------------------------------------------

    async fn trennen_intern(&self, innen: &mut LinkInnen) -> bool {
        let Some(verbindung) = innen.verbindung.take() else {
            return false;
        };
        let port = verbindung.port.clone();
        verbindung.freigeben(true).await;

        self.status_setzen(LinkStatus::getrennt());
        self.melden(LinkEvent::Zustand(StateNotice::Getrennt {
            meldung: MELDUNG_GETRENNT.into(),
        }))
        .await;

        tracing::info!(port = %port, "Serielle Verbindung geschlossen");
        true
    }

    async fn verloren_intern(
        &self,
        innen: &mut LinkInnen,
        generation: u64,
        fehler: Option<String>,
        pumpe_stoppen: bool,
    ) {
        if !innen.ist_aktuell(generation) {
            return;
        }
        let Some(verbindung) = innen.verbindung.take() else {
            return;
        };
        let port = verbindung.port.clone();
        verbindung.freigeben(pumpe_stoppen).await;

        match fehler {
            Some(grund) => {
                tracing::warn!(port = %port, fehler = %grund, "Verbindung unerwartet verloren");
                self.status_setzen(LinkStatus::fehler(grund.clone()));
                let fehler = RelayError::UnerwarteteTrennung(grund);
                self.melden(LinkEvent::Zustand(StateNotice::aus_fehler(&fehler)))
                    .await;
            }
            None => {
                tracing::info!(port = %port, "Geraet hat die Verbindung beendet");
                self.status_setzen(LinkStatus::getrennt());
                self.melden(LinkEvent::Zustand(StateNotice::Getrennt {
                    meldung: MELDUNG_GETRENNT.into(),
                }))
                .await;
            }
        }
    }

    fn status_setzen(&self, status: LinkStatus) {
        *self.inner.status.write() = status;
    }

    async fn melden(&self, ereignis: LinkEvent) {
        if self.inner.ereignisse.send(ereignis).await.is_err() {
            tracing::debug!("Ereignis-Empfaenger geschlossen – Ereignis verworfen");
        }
    }

    /// Startet Lese-Schleife (blocking) und Pumpe (async) fuer eine Generation
    fn leser_starten(
        &self,
        generation: u64,
        leser: Box<dyn io::Read + Send>,
        stopp: Arc<AtomicBool>,
    ) -> (JoinHandle<()>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(LESER_QUEUE);
        let codec = ZeilenCodec::with_max_laenge(self.inner.konfig.max_zeilen_laenge);
        let leser = tokio::task::spawn_blocking(move || lese_schleife(leser, codec, stopp, tx));

        let manager = self.clone();
        let pumpe = tokio::spawn(async move {
            while let Some(meldung) = rx.recv().await {
                match meldung {
                    LeserMeldung::Zeile(zeile) => manager.zeile_melden(generation, &zeile).await,
                    LeserMeldung::Ende(fehler) => {
                        manager.verbindung_verloren(generation, fehler).await;
                        break;
                    }
                }
            }
            tracing::debug!(generation, "Lese-Pumpe beendet");
        });
        (leser, pumpe)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speicher::SpeicherOeffner;
    use serialrelay_core::{FehlerArt, LinkState, Payload};
    use serde_json::json;
    use std::time::Duration;

    fn manager() -> (SpeicherOeffner, LinkManager, mpsc::Receiver<LinkEvent>) {
        let oeffner = SpeicherOeffner::neu();
        let (manager, rx) = LinkManager::neu(Arc::new(oeffner.clone()), LinkKonfig::default());
        (oeffner, manager, rx)
    }

    async fn naechstes(rx: &mut mpsc::Receiver<LinkEvent>) -> LinkEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("kein Ereignis innerhalb von 2s")
            .expect("Ereignis-Kanal geschlossen")
    }

    async fn nichts_mehr(rx: &mut mpsc::Receiver<LinkEvent>) {
        let ergebnis = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(ergebnis.is_err(), "unerwartetes Ereignis: {:?}", ergebnis);
    }

    fn zustand(port: &str, verbunden: bool) -> LinkEvent {
        let port = port.to_string();
        LinkEvent::Zustand(if verbunden {
            StateNotice::Verbunden { port }
        } else {
            StateNotice::Verbindet { port }
        })
    }

    fn getrennt() -> LinkEvent {
        LinkEvent::Zustand(StateNotice::Getrennt {
            meldung: "Arduino disconnected".into(),
        })
    }

    #[tokio::test]
    async fn startzustand_getrennt() {
        let (_oeffner, manager, _rx) = manager();
        assert_eq!(manager.status(), LinkStatus::getrennt());
        assert!(!manager.ist_verbunden());
    }

    #[tokio::test]
    async fn oeffnen_meldet_verbindet_und_verbunden() {
        let (oeffner, manager, mut rx) = manager();

        manager.oeffnen("COM3").await.unwrap();

        assert_eq!(naechstes(&mut rx).await, zustand("COM3", false));
        assert_eq!(naechstes(&mut rx).await, zustand("COM3", true));
        assert_eq!(manager.status(), LinkStatus::verbunden("COM3"));
        assert_eq!(oeffner.geraet("COM3").unwrap().baudrate(), 9600);
    }

    #[tokio::test]
    async fn oeffnen_fehlschlag_setzt_fehlerzustand() {
        let (oeffner, manager, mut rx) = manager();
        oeffner.fehler_bei_oeffnen("COM5", "Access denied");

        let fehler = manager.oeffnen("COM5").await.unwrap_err();
        assert_eq!(
            fehler,
            RelayError::PortOeffnen {
                port: "COM5".into(),
                grund: "Access denied".into()
            }
        );

        assert_eq!(naechstes(&mut rx).await, zustand("COM5", false));
        assert_eq!(
            naechstes(&mut rx).await,
            LinkEvent::Zustand(StateNotice::Fehler {
                art: FehlerArt::PortOpenFailure,
                meldung: "Failed to connect".into(),
                detail: Some("Access denied".into()),
            })
        );

        let status = manager.status();
        assert_eq!(status.state, LinkState::Error);
        assert_eq!(status.port, None);
        assert_eq!(status.last_error.as_deref(), Some("Access denied"));
    }

    #[tokio::test]
    async fn fehlerzustand_ist_nicht_terminal() {
        let (oeffner, manager, mut rx) = manager();
        oeffner.fehler_bei_oeffnen("COM5", "Access denied");

        assert!(manager.oeffnen("COM5").await.is_err());
        manager.oeffnen("COM3").await.unwrap();

        // Verbindet, Fehler, Verbindet, Verbunden – kein Getrennt dazwischen
        naechstes(&mut rx).await;
        naechstes(&mut rx).await;
        assert_eq!(naechstes(&mut rx).await, zustand("COM3", false));
        assert_eq!(naechstes(&mut rx).await, zustand("COM3", true));
        assert!(manager.ist_verbunden());
    }

    #[tokio::test]
    async fn zeilen_werden_dekodiert() {
        let (oeffner, manager, mut rx) = manager();
        manager.oeffnen("COM3").await.unwrap();
        naechstes(&mut rx).await;
        naechstes(&mut rx).await;

        let geraet = oeffner.geraet("COM3").unwrap();
        geraet.zeile_senden("TEMP:23\r");
        geraet.zeile_senden("   ");
        geraet.zeile_senden(r#"{"type":"temperature","value":23.5}"#);

        let LinkEvent::Daten(roh) = naechstes(&mut rx).await else {
            panic!("Daten erwartet");
        };
        assert_eq!(roh.payload, Payload::RawMessage("TEMP:23".into()));

        let LinkEvent::Daten(typisiert) = naechstes(&mut rx).await else {
            panic!("Daten erwartet");
        };
        assert_eq!(
            typisiert.payload,
            Payload::Typed(json!({"type": "temperature", "value": 23.5}))
        );

        nichts_mehr(&mut rx).await;
    }

    #[tokio::test]
    async fn schliessen_meldet_getrennt_einmal() {
        let (_oeffner, manager, mut rx) = manager();
        manager.oeffnen("COM3").await.unwrap();
        naechstes(&mut rx).await;
        naechstes(&mut rx).await;

        assert!(manager.schliessen().await);
        assert_eq!(naechstes(&mut rx).await, getrennt());
        assert_eq!(manager.status(), LinkStatus::getrennt());

        // Zweites Schliessen ist ein No-op
        assert!(!manager.schliessen().await);
        nichts_mehr(&mut rx).await;
    }

    #[tokio::test]
    async fn keine_daten_nach_schliessen() {
        let (oeffner, manager, mut rx) = manager();
        manager.oeffnen("COM3").await.unwrap();
        naechstes(&mut rx).await;
        naechstes(&mut rx).await;

        let geraet = oeffner.geraet("COM3").unwrap();
        manager.schliessen().await;
        geraet.zeile_senden("spaet");

        assert_eq!(naechstes(&mut rx).await, getrennt());
        nichts_mehr(&mut rx).await;
    }

    #[tokio::test]
    async fn erneutes_oeffnen_schliesst_alte_verbindung() {
        let (oeffner, manager, mut rx) = manager();
        manager.oeffnen("COM3").await.unwrap();
        let alt = oeffner.geraet("COM3").unwrap();
        manager.oeffnen("COM4").await.unwrap();

        assert_eq!(naechstes(&mut rx).await, zustand("COM3", false));
        assert_eq!(naechstes(&mut rx).await, zustand("COM3", true));
        assert_eq!(naechstes(&mut rx).await, getrennt());
        assert_eq!(naechstes(&mut rx).await, zustand("COM4", false));
        assert_eq!(naechstes(&mut rx).await, zustand("COM4", true));

        alt.zeile_senden("von alt");
        oeffner.geraet("COM4").unwrap().zeile_senden("von neu");

        let LinkEvent::Daten(ereignis) = naechstes(&mut rx).await else {
            panic!("Daten erwartet");
        };
        assert_eq!(ereignis.payload, Payload::RawMessage("von neu".into()));
        nichts_mehr(&mut rx).await;
        assert_eq!(manager.status(), LinkStatus::verbunden("COM4"));
    }

    #[tokio::test]
    async fn schliessen_gibt_port_frei() {
        let (oeffner, manager, mut rx) = manager();
        manager.oeffnen("COM3").await.unwrap();
        assert_eq!(oeffner.offene_griffe("COM3"), 2);

        manager.schliessen().await;
        assert_eq!(oeffner.offene_griffe("COM3"), 0);

        manager.oeffnen("COM3").await.unwrap();
        assert!(manager.ist_verbunden());
        for _ in 0..3 {
            naechstes(&mut rx).await;
        }
        assert_eq!(naechstes(&mut rx).await, zustand("COM3", false));
        assert_eq!(naechstes(&mut rx).await, zustand("COM3", true));
    }

    #[tokio::test]
    async fn gleichen_port_erneut_oeffnen() {
        let (oeffner, manager, mut rx) = manager();
        manager.oeffnen("COM3").await.unwrap();
        manager.oeffnen("COM3").await.unwrap();

        assert_eq!(naechstes(&mut rx).await, zustand("COM3", false));
        assert_eq!(naechstes(&mut rx).await, zustand("COM3", true));
        assert_eq!(naechstes(&mut rx).await, getrennt());
        assert_eq!(naechstes(&mut rx).await, zustand("COM3", false));
        assert_eq!(naechstes(&mut rx).await, zustand("COM3", true));
        assert_eq!(manager.status(), LinkStatus::verbunden("COM3"));
        assert_eq!(oeffner.offene_griffe("COM3"), 2);
        assert_eq!(oeffner.oeffnungen(), vec!["COM3".to_string(), "COM3".to_string()]);

        // Die neue Verbindung liest
        oeffner.geraet("COM3").unwrap().zeile_senden("neu");
        let LinkEvent::Daten(ereignis) = naechstes(&mut rx).await else {
            panic!("Daten erwartet");
        };
        assert_eq!(ereignis.payload, Payload::RawMessage("neu".into()));
    }

    #[tokio::test]
    async fn schliessen_mit_voller_lese_queue() {
        let (oeffner, manager, mut rx) = manager();
        manager.oeffnen("COM3").await.unwrap();
        naechstes(&mut rx).await;
        naechstes(&mut rx).await;

        // Mehr Zeilen als die Lese-Queue fasst, Schliessen direkt hinterher
        let geraet = oeffner.geraet("COM3").unwrap();
        for i in 0..(LESER_QUEUE * 4) {
            geraet.zeile_senden(&i.to_string());
        }
        tokio::spawn(async move { while rx.recv().await.is_some() {} });

        tokio::time::timeout(Duration::from_secs(2), manager.schliessen())
            .await
            .expect("schliessen haengt");
        assert_eq!(oeffner.offene_griffe("COM3"), 0);
    }

    #[tokio::test]
    async fn senden_ohne_verbindung() {
        let (_oeffner, manager, mut rx) = manager();
        let fehler = manager.senden(&"LED_ON".into()).await.unwrap_err();
        assert_eq!(fehler, RelayError::NichtVerbunden);
        nichts_mehr(&mut rx).await;
    }

    #[tokio::test]
    async fn senden_schreibt_zeilen() {
        let (oeffner, manager, _rx) = manager();
        manager.oeffnen("COM3").await.unwrap();

        manager.senden(&"LED_ON".into()).await.unwrap();
        manager
            .senden(&OutboundCommand::from(json!({"cmd": "blink"})))
            .await
            .unwrap();

        assert_eq!(
            oeffner.geraet("COM3").unwrap().geschrieben(),
            "LED_ON\n{\"cmd\":\"blink\"}\n"
        );
    }

    #[tokio::test]
    async fn schreibfehler_laesst_verbindung_offen() {
        let (oeffner, manager, mut rx) = manager();
        manager.oeffnen("COM3").await.unwrap();
        naechstes(&mut rx).await;
        naechstes(&mut rx).await;

        oeffner
            .geraet("COM3")
            .unwrap()
            .schreibfehler_setzen(Some(io::ErrorKind::Other));

        let fehler = manager.senden(&"X".into()).await.unwrap_err();
        assert_eq!(fehler.art(), FehlerArt::WriteFailure);
        assert!(manager.ist_verbunden());
        nichts_mehr(&mut rx).await;
    }

    #[tokio::test]
    async fn kaputte_verbindung_beim_schreiben() {
        let (oeffner, manager, mut rx) = manager();
        manager.oeffnen("COM3").await.unwrap();
        naechstes(&mut rx).await;
        naechstes(&mut rx).await;

        oeffner
            .geraet("COM3")
            .unwrap()
            .schreibfehler_setzen(Some(io::ErrorKind::BrokenPipe));

        let fehler = manager.senden(&"X".into()).await.unwrap_err();
        assert_eq!(fehler.art(), FehlerArt::WriteFailure);

        let LinkEvent::Zustand(StateNotice::Fehler { art, .. }) = naechstes(&mut rx).await else {
            panic!("Fehler-Meldung erwartet");
        };
        assert_eq!(art, FehlerArt::UnexpectedDisconnect);
        assert_eq!(manager.status().state, LinkState::Error);
        assert_eq!(oeffner.offene_griffe("COM3"), 0);
    }

    #[tokio::test]
    async fn io_fehler_beim_lesen() {
        let (oeffner, manager, mut rx) = manager();
        manager.oeffnen("COM3").await.unwrap();
        naechstes(&mut rx).await;
        naechstes(&mut rx).await;

        oeffner.geraet("COM3").unwrap().io_fehler("device unplugged");

        assert_eq!(
            naechstes(&mut rx).await,
            LinkEvent::Zustand(StateNotice::Fehler {
                art: FehlerArt::UnexpectedDisconnect,
                meldung: "Serial port error".into(),
                detail: Some("device unplugged".into()),
            })
        );
        let status = manager.status();
        assert_eq!(status.state, LinkState::Error);
        assert_eq!(status.last_error.as_deref(), Some("device unplugged"));

        // Danach ist Senden abgelehnt
        assert_eq!(
            manager.senden(&"X".into()).await.unwrap_err(),
            RelayError::NichtVerbunden
        );

        // Port ist freigegeben und laesst sich wieder oeffnen
        assert_eq!(oeffner.offene_griffe("COM3"), 0);
        manager.oeffnen("COM3").await.unwrap();
        assert!(manager.ist_verbunden());
    }

    #[tokio::test]
    async fn eof_ist_sauberes_trennen() {
        let (oeffner, manager, mut rx) = manager();
        manager.oeffnen("COM3").await.unwrap();
        naechstes(&mut rx).await;
        naechstes(&mut rx).await;

        let geraet = oeffner.geraet("COM3").unwrap();
        geraet.bytes_senden(b"ohne zeilenende");
        geraet.trennen();

        assert_eq!(naechstes(&mut rx).await, getrennt());
        assert_eq!(manager.status(), LinkStatus::getrennt());
        nichts_mehr(&mut rx).await;
    }
}
