//! Session-Registry – wer schaut gerade zu?
//!
//! Haelt pro verbundener Viewer-Session eine begrenzte Send-Queue. Eine
//! volle Queue verwirft nur das Ereignis fuer diese eine Session, alle
//! anderen bekommen es trotzdem.
//!
//! Zustandsmeldungen werden nie still verworfen: passt eine nicht mehr in
//! die Queue, wird die Session abgehaengt. Ihre Queue schliesst, die
//! WebSocket endet und der Browser bekommt beim Wiederverbinden ein Replay.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serialrelay_core::SessionId;
use serialrelay_protocol::ViewerEreignis;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Standardgroesse der Send-Queue pro Session
pub const SESSION_QUEUE_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// ViewerSession
// ---------------------------------------------------------------------------

/// Ein verbundener Browser-Client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerSession {
    pub id: SessionId,
    pub verbunden_um: DateTime<Utc>,
}

impl ViewerSession {
    pub fn neu() -> Self {
        Self {
            id: SessionId::new(),
            verbunden_um: Utc::now(),
        }
    }
}

impl Default for ViewerSession {
    fn default() -> Self {
        Self::neu()
    }
}

/// Ergebnis einer Zustellung in eine Session-Queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zustellung {
    Eingereiht,
    /// Queue voll, Ereignis fuer diese Session verworfen
    Verworfen,
    /// Session existiert nicht (mehr)
    Unbekannt,
}

struct SessionEintrag {
    session: ViewerSession,
    tx: mpsc::Sender<ViewerEreignis>,
}

impl SessionEintrag {
    fn zustellen(&self, ereignis: ViewerEreignis) -> Zustellung {
        match self.tx.try_send(ereignis) {
            Ok(()) => Zustellung::Eingereiht,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(session_id = %self.session.id, "Send-Queue voll – Ereignis verworfen");
                Zustellung::Verworfen
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(session_id = %self.session.id, "Send-Queue geschlossen (Session beendet)");
                Zustellung::Unbekannt
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Zaehler einer Verteilung an alle Sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verteilung {
    pub zugestellt: usize,
    pub verworfen: usize,
    /// Wegen voller Queue entfernte Sessions
    pub abgehaengt: usize,
}

/// Alle aktiven Viewer-Sessions
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    sessions: DashMap<SessionId, SessionEintrag>,
    queue_groesse: usize,
}

impl SessionRegistry {
    pub fn neu(queue_groesse: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: DashMap::new(),
                queue_groesse: queue_groesse.max(1),
            }),
        }
    }

    /// Registriert eine Session und gibt ihre Empfangs-Queue zurueck
    pub fn registrieren(&self, session: ViewerSession) -> mpsc::Receiver<ViewerEreignis> {
        let (tx, rx) = mpsc::channel(self.inner.queue_groesse);
        let id = session.id;
        self.inner.sessions.insert(id, SessionEintrag { session, tx });
        tracing::debug!(session_id = %id, "Session registriert");
        rx
    }

    /// Entfernt eine Session; `false` wenn sie nicht registriert war
    pub fn entfernen(&self, id: &SessionId) -> bool {
        let entfernt = self.inner.sessions.remove(id).is_some();
        if entfernt {
            tracing::debug!(session_id = %id, "Session entfernt");
        }
        entfernt
    }

    /// Reiht `ereignis` in die Queue jeder Session ein
    pub fn an_alle_senden(&self, ereignis: &ViewerEreignis) -> Verteilung {
        let mut verteilung = Verteilung::default();
        for eintrag in self.inner.sessions.iter() {
            match eintrag.zustellen(ereignis.clone()) {
                Zustellung::Eingereiht => verteilung.zugestellt += 1,
                Zustellung::Verworfen => verteilung.verworfen += 1,
                Zustellung::Unbekannt => {}
            }
        }
        verteilung
    }

    /// Wie [`an_alle_senden`](Self::an_alle_senden), haengt aber jede Session
    /// mit voller Queue ab statt das Ereignis zu verwerfen
    pub fn zustand_an_alle_senden(&self, ereignis: &ViewerEreignis) -> Verteilung {
        let mut verteilung = Verteilung::default();
        let mut zu_langsam = Vec::new();
        for eintrag in self.inner.sessions.iter() {
            match eintrag.zustellen(ereignis.clone()) {
                Zustellung::Eingereiht => verteilung.zugestellt += 1,
                Zustellung::Verworfen => zu_langsam.push(*eintrag.key()),
                Zustellung::Unbekannt => {}
            }
        }

        // Erst nach der Iteration, DashMap-Shards sind sonst noch gesperrt
        for id in zu_langsam {
            if self.inner.sessions.remove(&id).is_some() {
                tracing::warn!(session_id = %id, "Zustandsmeldung passt nicht in die Queue, Session abgehaengt");
                verteilung.abgehaengt += 1;
            }
        }
        verteilung
    }

    /// Reiht `ereignis` nur fuer eine Session ein
    pub fn an_session_senden(&self, id: &SessionId, ereignis: ViewerEreignis) -> Zustellung {
        match self.inner.sessions.get(id) {
            Some(eintrag) => eintrag.zustellen(ereignis),
            None => {
                tracing::debug!(session_id = %id, "Senden an unbekannte Session");
                Zustellung::Unbekannt
            }
        }
    }

    pub fn session(&self, id: &SessionId) -> Option<ViewerSession> {
        self.inner.sessions.get(id).map(|e| e.session.clone())
    }

    /// Alle aktiven Sessions, aelteste zuerst
    pub fn alle_sessions(&self) -> Vec<ViewerSession> {
        let mut sessions: Vec<_> = self
            .inner
            .sessions
            .iter()
            .map(|e| e.session.clone())
            .collect();
        sessions.sort_by_key(|s| s.verbunden_um);
        sessions
    }

    pub fn anzahl(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn ist_registriert(&self, id: &SessionId) -> bool {
        self.inner.sessions.contains_key(id)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::neu(SESSION_QUEUE_GROESSE)
    }
}
