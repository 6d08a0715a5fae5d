//! Broadcast-Hub – verbindet den Link-Manager mit allen Viewer-Sessions
//!
//! Zustandswechsel und Daten vom Link-Manager gehen an alle Sessions.
//! Antworten auf Befehle (gesendet / Fehler) gehen nur an den Absender.
//!
//! ## Replay
//! Der Hub merkt sich die zuletzt verteilte Zustandsmeldung. Beitritt und
//! Verteilung laufen unter demselben Lock; eine neue Session bekommt also
//! genau den Zustand, den alle anderen zuletzt gesehen haben, und danach
//! nahtlos alle weiteren Ereignisse.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use serialrelay_core::{InboundEvent, LinkEvent, OutboundCommand, RelayError, SessionId, StateNotice};
use serialrelay_link::LinkManager;
use serialrelay_protocol::ViewerEreignis;

use crate::registry::{SessionRegistry, Verteilung, ViewerSession, Zustellung};

// ---------------------------------------------------------------------------
// Statistik
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Zaehler {
    zeilen: AtomicU64,
    zugestellt: AtomicU64,
    verworfen: AtomicU64,
    befehle_ok: AtomicU64,
    befehle_fehler: AtomicU64,
    abgehaengt: AtomicU64,
}

/// Momentaufnahme der Hub-Zaehler (monoton steigend)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStatistik {
    /// Dekodierte Zeilen vom Geraet
    pub zeilen: u64,
    /// In Session-Queues eingereihte Ereignisse
    pub zugestellt: u64,
    /// Wegen voller Queue verworfene Ereignisse
    pub verworfen: u64,
    pub befehle_ok: u64,
    pub befehle_fehler: u64,
    /// Sessions, die eine Zustandsmeldung nicht mehr aufnehmen konnten
    pub abgehaengt: u64,
}

// ---------------------------------------------------------------------------
// BroadcastHub
// ---------------------------------------------------------------------------

/// Zentrale Verteilstelle zwischen Link-Manager und Sessions
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    registry: SessionRegistry,
    link: LinkManager,
    /// Zuletzt an alle verteilte Zustandsmeldung
    letzte_meldung: Mutex<StateNotice>,
    zaehler: Zaehler,
}

impl BroadcastHub {
    pub fn neu(link: LinkManager, registry: SessionRegistry) -> Self {
        Self {
            inner: Arc::new(HubInner {
                registry,
                link,
                letzte_meldung: Mutex::new(StateNotice::nicht_verbunden()),
                zaehler: Zaehler::default(),
            }),
        }
    }

    pub fn link(&self) -> &LinkManager {
        &self.inner.link
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Zustand, den eine jetzt beitretende Session als Replay bekaeme
    pub fn letzte_meldung(&self) -> StateNotice {
        self.inner.letzte_meldung.lock().clone()
    }

    pub fn statistik(&self) -> HubStatistik {
        let z = &self.inner.zaehler;
        HubStatistik {
            zeilen: z.zeilen.load(Ordering::Relaxed),
            zugestellt: z.zugestellt.load(Ordering::Relaxed),
            verworfen: z.verworfen.load(Ordering::Relaxed),
            befehle_ok: z.befehle_ok.load(Ordering::Relaxed),
            befehle_fehler: z.befehle_fehler.load(Ordering::Relaxed),
            abgehaengt: z.abgehaengt.load(Ordering::Relaxed),
        }
    }

    // -----------------------------------------------------------------------
    // Link-Manager -> Sessions
    // -----------------------------------------------------------------------

    /// Verteilt Ereignisse des Link-Managers bis dessen Kanal endet
    pub async fn ereignisse_pumpen(self, mut rx: mpsc::Receiver<LinkEvent>) {
        while let Some(ereignis) = rx.recv().await {
            self.ereignis_verteilen(ereignis);
        }
        tracing::debug!("Ereignis-Pumpe des Hubs beendet");
    }

    pub fn ereignis_verteilen(&self, ereignis: LinkEvent) {
        match ereignis {
            LinkEvent::Zustand(meldung) => self.zustand_verteilen(meldung),
            LinkEvent::Daten(daten) => self.daten_verteilen(&daten),
        }
    }

    /// Sendet eine dekodierte Zeile an alle Sessions
    pub fn daten_verteilen(&self, daten: &InboundEvent) {
        let _replay_sperre = self.inner.letzte_meldung.lock();
        self.inner.zaehler.zeilen.fetch_add(1, Ordering::Relaxed);
        self.an_alle(&ViewerEreignis::daten(daten));
    }

    /// Merkt sich den Zustandswechsel fuer Replays und sendet ihn an alle
    ///
    /// Sessions mit voller Queue werden abgehaengt statt die Meldung zu
    /// verpassen.
    pub fn zustand_verteilen(&self, meldung: StateNotice) {
        let mut letzte = self.inner.letzte_meldung.lock();
        let ereignis = ViewerEreignis::aus_notice(&meldung);
        *letzte = meldung;
        let verteilung = self.inner.registry.zustand_an_alle_senden(&ereignis);
        self.verteilung_zaehlen(verteilung);
        tracing::debug!(
            ereignis = ?ereignis,
            zugestellt = verteilung.zugestellt,
            abgehaengt = verteilung.abgehaengt,
            "Zustandswechsel verteilt"
        );
    }

    fn an_alle(&self, ereignis: &ViewerEreignis) {
        let verteilung = self.inner.registry.an_alle_senden(ereignis);
        self.verteilung_zaehlen(verteilung);
    }

    fn verteilung_zaehlen(&self, verteilung: Verteilung) {
        let z = &self.inner.zaehler;
        z.zugestellt
            .fetch_add(verteilung.zugestellt as u64, Ordering::Relaxed);
        z.verworfen
            .fetch_add(verteilung.verworfen as u64, Ordering::Relaxed);
        z.abgehaengt
            .fetch_add(verteilung.abgehaengt as u64, Ordering::Relaxed);
    }

    fn an_einen(&self, id: &SessionId, ereignis: ViewerEreignis) {
        let z = &self.inner.zaehler;
        match self.inner.registry.an_session_senden(id, ereignis) {
            Zustellung::Eingereiht => {
                z.zugestellt.fetch_add(1, Ordering::Relaxed);
            }
            Zustellung::Verworfen => {
                z.verworfen.fetch_add(1, Ordering::Relaxed);
            }
            Zustellung::Unbekannt => {}
        }
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Registriert eine Session und schickt ihr sofort den aktuellen Zustand
    pub fn session_beitreten(&self, session: ViewerSession) -> mpsc::Receiver<ViewerEreignis> {
        let letzte = self.inner.letzte_meldung.lock();
        let id = session.id;
        let rx = self.inner.registry.registrieren(session);
        self.an_einen(&id, ViewerEreignis::replay(&letzte));
        tracing::info!(
            session_id = %id,
            sessions = self.inner.registry.anzahl(),
            "Viewer verbunden"
        );
        rx
    }

    /// Entfernt die Session; die serielle Verbindung bleibt unberuehrt
    pub fn session_verlassen(&self, id: &SessionId) {
        if self.inner.registry.entfernen(id) {
            tracing::info!(
                session_id = %id,
                sessions = self.inner.registry.anzahl(),
                "Viewer getrennt"
            );
        }
    }

    /// Meldet einen Fehler nur an eine Session
    pub fn fehler_melden(&self, id: &SessionId, fehler: &RelayError) {
        self.an_einen(id, ViewerEreignis::aus_fehler(fehler));
    }

    // -----------------------------------------------------------------------
    // Sessions -> Link-Manager
    // -----------------------------------------------------------------------

    /// Sendet einen Befehl an das Geraet; Ergebnis geht nur an den Absender
    pub async fn befehl_weiterleiten(&self, id: &SessionId, befehl: OutboundCommand) {
        let antwort = match self.inner.link.senden(&befehl).await {
            Ok(()) => {
                self.inner.zaehler.befehle_ok.fetch_add(1, Ordering::Relaxed);
                ViewerEreignis::gesendet()
            }
            Err(e) => {
                self.inner
                    .zaehler
                    .befehle_fehler
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!(session_id = %id, fehler = %e, "Befehl nicht gesendet");
                ViewerEreignis::aus_fehler(&e)
            }
        };
        self.an_einen(id, antwort);
    }

    /// Oeffnet `port` im Hintergrund; das Ergebnis kommt als Broadcast
    pub fn verbinden(&self, id: &SessionId, port: String) {
        let port = port.trim().to_string();
        if port.is_empty() {
            self.fehler_melden(
                id,
                &RelayError::UngueltigeAnfrage("port must not be empty".into()),
            );
            return;
        }

        tracing::info!(session_id = %id, port = %port, "Verbindungsanfrage");
        let link = self.inner.link.clone();
        tokio::spawn(async move {
            if let Err(e) = link.oeffnen(&port).await {
                tracing::debug!(port = %port, fehler = %e, "Oeffnen fehlgeschlagen (bereits gemeldet)");
            }
        });
    }

    /// Schliesst die serielle Verbindung, falls offen
    pub async fn trennen(&self) -> bool {
        self.inner.link.schliessen().await
    }
}
