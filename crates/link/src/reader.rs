//! Blockierende Lese-Schleife
//!
//! Laeuft pro offener Verbindung in `spawn_blocking`, zerlegt den Bytestrom
//! mit dem [`ZeilenCodec`] und reicht Zeilen an die async Pumpe im
//! Link-Manager weiter.

use bytes::BytesMut;
use serialrelay_protocol::ZeilenCodec;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;

/// Groesse des Lesepuffers pro `read`-Aufruf
const LESE_PUFFER_GROESSE: usize = 256;

/// Meldung der Lese-Schleife an die Pumpe
#[derive(Debug)]
pub(crate) enum LeserMeldung {
    /// Eine Zeile ohne `\n`, noch nicht getrimmt
    Zeile(String),
    /// Verbindung beendet: `None` = sauberes EOF, `Some` = I/O-Fehler
    Ende(Option<io::Error>),
}

/// Liest bis `stopp` gesetzt ist, die Pumpe weg ist oder der Port endet
///
/// Nach gesetztem `stopp` wird kein `Ende` mehr gemeldet; der Manager hat
/// den Zustandswechsel dann bereits selbst vollzogen.
pub(crate) fn lese_schleife(
    mut leser: Box<dyn Read + Send>,
    mut codec: ZeilenCodec,
    stopp: Arc<AtomicBool>,
    tx: mpsc::Sender<LeserMeldung>,
) {
    let mut puffer = BytesMut::with_capacity(4 * LESE_PUFFER_GROESSE);
    let mut buf = [0u8; LESE_PUFFER_GROESSE];

    while !stopp.load(Ordering::SeqCst) && !tx.is_closed() {
        match leser.read(&mut buf) {
            Ok(0) => {
                if !stopp.load(Ordering::SeqCst) {
                    let _ = tx.blocking_send(LeserMeldung::Ende(None));
                }
                return;
            }
            Ok(n) => {
                puffer.extend_from_slice(&buf[..n]);
                loop {
                    match codec.decode(&mut puffer) {
                        Ok(Some(zeile)) => {
                            if tx.blocking_send(LeserMeldung::Zeile(zeile)).is_err() {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!(fehler = %e, "Framing-Fehler – Puffer verworfen");
                            puffer.clear();
                            break;
                        }
                    }
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                if !stopp.load(Ordering::SeqCst) {
                    let _ = tx.blocking_send(LeserMeldung::Ende(Some(e)));
                }
                return;
            }
        }
    }

    tracing::debug!("Lese-Schleife beendet");
}
