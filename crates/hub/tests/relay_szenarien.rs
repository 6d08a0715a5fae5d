//! End-to-End-Szenarien: In-Memory-Geraet -> LinkManager -> Hub -> Sessions

use serde_json::json;
use serialrelay_core::{FehlerArt, LinkState, SessionId};
use serialrelay_hub::{BroadcastHub, SessionRegistry, ViewerSession};
use serialrelay_link::speicher::{SpeicherGeraet, SpeicherOeffner};
use serialrelay_link::{LinkKonfig, LinkManager};
use serialrelay_protocol::ViewerEreignis;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Aufbau {
    oeffner: SpeicherOeffner,
    hub: BroadcastHub,
}

impl Aufbau {
    fn neu() -> Self {
        let oeffner = SpeicherOeffner::neu();
        let (link, rx) = LinkManager::neu(Arc::new(oeffner.clone()), LinkKonfig::default());
        let hub = BroadcastHub::neu(link, SessionRegistry::default());
        tokio::spawn(hub.clone().ereignisse_pumpen(rx));
        Self { oeffner, hub }
    }

    /// Tritt bei und verbraucht das Replay
    async fn session(&self) -> (SessionId, mpsc::Receiver<ViewerEreignis>, ViewerEreignis) {
        let session = ViewerSession::neu();
        let id = session.id;
        let mut rx = self.hub.session_beitreten(session);
        let replay = naechstes(&mut rx).await;
        (id, rx, replay)
    }

    fn geraet(&self, port: &str) -> SpeicherGeraet {
        self.oeffner.geraet(port).expect("Port nicht geoeffnet")
    }
}

async fn naechstes(rx: &mut mpsc::Receiver<ViewerEreignis>) -> ViewerEreignis {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("kein Ereignis innerhalb von 2s")
        .expect("Session-Queue geschlossen")
}

async fn nichts_mehr(rx: &mut mpsc::Receiver<ViewerEreignis>) {
    let ergebnis = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
    assert!(ergebnis.is_err(), "unerwartetes Ereignis: {:?}", ergebnis);
}

fn verbindet(port: &str) -> ViewerEreignis {
    ViewerEreignis::Verbindet { port: port.into() }
}

fn verbunden(port: &str) -> ViewerEreignis {
    ViewerEreignis::Verbunden {
        port: port.into(),
        message: "Arduino connected successfully".into(),
    }
}

fn getrennt() -> ViewerEreignis {
    ViewerEreignis::Getrennt {
        message: "Arduino disconnected".into(),
    }
}

#[tokio::test]
async fn com3_daten_und_trennen_an_alle() {
    let aufbau = Aufbau::neu();
    let (a, mut rx_a, _) = aufbau.session().await;
    let (_b, mut rx_b, _) = aufbau.session().await;

    aufbau.hub.verbinden(&a, "COM3".into());

    for rx in [&mut rx_a, &mut rx_b] {
        assert_eq!(naechstes(rx).await, verbindet("COM3"));
        assert_eq!(naechstes(rx).await, verbunden("COM3"));
    }

    aufbau.geraet("COM3").zeile_senden("TEMP:23");

    for rx in [&mut rx_a, &mut rx_b] {
        let ViewerEreignis::Daten(wert) = naechstes(rx).await else {
            panic!("arduino_data erwartet");
        };
        assert_eq!(wert["type"], "message");
        assert_eq!(wert["data"], "TEMP:23");
        assert!(wert["timestamp"].as_str().is_some_and(|t| t.ends_with('Z')));
    }

    assert!(aufbau.hub.trennen().await);

    for rx in [&mut rx_a, &mut rx_b] {
        assert_eq!(naechstes(rx).await, getrennt());
        nichts_mehr(rx).await;
    }
}

#[tokio::test]
async fn com5_zugriff_verweigert_an_alle() {
    let aufbau = Aufbau::neu();
    aufbau.oeffner.fehler_bei_oeffnen("COM5", "Access denied");
    let (a, mut rx_a, _) = aufbau.session().await;
    let (_b, mut rx_b, _) = aufbau.session().await;

    aufbau.hub.verbinden(&a, "COM5".into());

    let erwartet = ViewerEreignis::Fehler {
        kind: FehlerArt::PortOpenFailure,
        message: "Failed to connect".into(),
        detail: Some("Access denied".into()),
    };
    for rx in [&mut rx_a, &mut rx_b] {
        assert_eq!(naechstes(rx).await, verbindet("COM5"));
        assert_eq!(naechstes(rx).await, erwartet);
    }
    assert_eq!(aufbau.hub.link().status().state, LinkState::Error);

    // Wer spaeter kommt, sieht den Fehler als Replay
    let (_c, _rx_c, replay) = aufbau.session().await;
    assert_eq!(replay, erwartet);
}

#[tokio::test]
async fn spaeter_beitritt_sieht_verbindung_sofort() {
    let aufbau = Aufbau::neu();
    let (a, mut rx_a, replay) = aufbau.session().await;
    assert_eq!(
        replay,
        ViewerEreignis::Getrennt {
            message: "Arduino not connected".into()
        }
    );

    aufbau.hub.verbinden(&a, "COM3".into());
    naechstes(&mut rx_a).await;
    naechstes(&mut rx_a).await;

    let (_b, mut rx_b, replay) = aufbau.session().await;
    assert_eq!(
        replay,
        ViewerEreignis::Verbunden {
            port: "COM3".into(),
            message: "Arduino already connected".into()
        }
    );
    // Kein historischer Replay von Daten
    nichts_mehr(&mut rx_b).await;
}

#[tokio::test]
async fn ein_ereignis_pro_nichtleerer_zeile() {
    let aufbau = Aufbau::neu();
    let (a, mut rx, _) = aufbau.session().await;
    aufbau.hub.verbinden(&a, "COM3".into());
    naechstes(&mut rx).await;
    naechstes(&mut rx).await;

    let geraet = aufbau.geraet("COM3");
    for zeile in ["a", "", "   \r", r#"{"type":"temperature","value":23.5}"#, "b  "] {
        geraet.zeile_senden(zeile);
    }

    let mut daten = Vec::new();
    for _ in 0..3 {
        let ViewerEreignis::Daten(wert) = naechstes(&mut rx).await else {
            panic!("arduino_data erwartet");
        };
        daten.push(wert);
    }
    nichts_mehr(&mut rx).await;

    assert_eq!(daten[0]["data"], "a");
    assert_eq!(daten[1], json!({"type": "temperature", "value": 23.5}));
    assert_eq!(daten[2]["data"], "b");
    assert_eq!(aufbau.hub.statistik().zeilen, 3);
}

#[tokio::test]
async fn senden_ohne_verbindung_nur_an_aufrufer() {
    let aufbau = Aufbau::neu();
    let (a, mut rx_a, _) = aufbau.session().await;
    let (_b, mut rx_b, _) = aufbau.session().await;

    aufbau.hub.befehl_weiterleiten(&a, "LED_ON".into()).await;

    assert_eq!(
        naechstes(&mut rx_a).await,
        ViewerEreignis::Fehler {
            kind: FehlerArt::NotConnected,
            message: "not connected".into(),
            detail: None,
        }
    );
    nichts_mehr(&mut rx_b).await;
    assert!(aufbau.oeffner.oeffnungen().is_empty());
}

#[tokio::test]
async fn senden_bestaetigung_nur_an_aufrufer() {
    let aufbau = Aufbau::neu();
    let (a, mut rx_a, _) = aufbau.session().await;
    let (_b, mut rx_b, _) = aufbau.session().await;

    aufbau.hub.verbinden(&a, "COM3".into());
    for rx in [&mut rx_a, &mut rx_b] {
        naechstes(rx).await;
        naechstes(rx).await;
    }

    aufbau
        .hub
        .befehl_weiterleiten(&a, json!({"led": "on"}).into())
        .await;
    aufbau.hub.befehl_weiterleiten(&a, "PING".into()).await;

    assert_eq!(naechstes(&mut rx_a).await, ViewerEreignis::gesendet());
    assert_eq!(naechstes(&mut rx_a).await, ViewerEreignis::gesendet());
    nichts_mehr(&mut rx_b).await;

    assert_eq!(
        aufbau.geraet("COM3").geschrieben(),
        "{\"led\":\"on\"}\nPING\n"
    );
}

#[tokio::test]
async fn geraetefehler_an_alle() {
    let aufbau = Aufbau::neu();
    let (a, mut rx_a, _) = aufbau.session().await;
    let (_b, mut rx_b, _) = aufbau.session().await;

    aufbau.hub.verbinden(&a, "COM3".into());
    for rx in [&mut rx_a, &mut rx_b] {
        naechstes(rx).await;
        naechstes(rx).await;
    }

    aufbau.geraet("COM3").io_fehler("device unplugged");

    for rx in [&mut rx_a, &mut rx_b] {
        assert_eq!(
            naechstes(rx).await,
            ViewerEreignis::Fehler {
                kind: FehlerArt::UnexpectedDisconnect,
                message: "Serial port error".into(),
                detail: Some("device unplugged".into()),
            }
        );
    }
    assert_eq!(aufbau.hub.link().status().state, LinkState::Error);
}

#[tokio::test]
async fn verlassen_laesst_verbindung_offen() {
    let aufbau = Aufbau::neu();
    let (a, mut rx_a, _) = aufbau.session().await;
    let (_b, mut rx_b, _) = aufbau.session().await;

    aufbau.hub.verbinden(&a, "COM3".into());
    for rx in [&mut rx_a, &mut rx_b] {
        naechstes(rx).await;
        naechstes(rx).await;
    }

    aufbau.hub.session_verlassen(&a);
    assert!(aufbau.hub.link().ist_verbunden());
    assert_eq!(aufbau.hub.registry().anzahl(), 1);

    aufbau.geraet("COM3").zeile_senden("noch da");
    assert!(matches!(
        naechstes(&mut rx_b).await,
        ViewerEreignis::Daten(_)
    ));
}
