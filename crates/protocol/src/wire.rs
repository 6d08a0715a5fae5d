//! Wire-Format zum Geraet
//!
//! Reiner Text, eine Zeile pro Frame, abgeschlossen durch `\n`.
//!
//! ## Frame-Format
//!
//! ```text
//! +----...----+------+
//! | Text      | \n   |
//! +----...----+------+
//! ```
//!
//! Der Decoder liefert jede Zeile ohne das `\n`, auch leere Zeilen. Trimmen
//! und Verwerfen leerer Frames ist Sache von [`crate::decode::dekodieren`].
//! Zeilen laenger als die maximale Zeilenlaenge werden bis zum naechsten
//! `\n` verworfen.

use bytes::{BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Zeilenlaenge (4 KB)
pub const DEFAULT_MAX_ZEILEN_LAENGE: usize = 4 * 1024;

/// Frame-Trenner
pub const ZEILEN_ENDE: u8 = b'\n';

// ---------------------------------------------------------------------------
// ZeilenCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer newline-getrennte Textframes
#[derive(Debug, Clone)]
pub struct ZeilenCodec {
    /// Maximale Zeilenlaenge in Bytes (ohne `\n`)
    max_zeilen_laenge: usize,
    /// Ab diesem Index wurde noch nicht nach `\n` gesucht
    such_index: usize,
    /// Ueberlange Zeile wird bis zum naechsten `\n` verworfen
    verwerfen: bool,
}

impl ZeilenCodec {
    /// Erstellt einen neuen `ZeilenCodec` mit Standard-Limit
    pub fn new() -> Self {
        Self::with_max_laenge(DEFAULT_MAX_ZEILEN_LAENGE)
    }

    /// Erstellt einen `ZeilenCodec` mit benutzerdefinierter maximaler Zeilenlaenge
    pub fn with_max_laenge(max_zeilen_laenge: usize) -> Self {
        Self {
            max_zeilen_laenge,
            such_index: 0,
            verwerfen: false,
        }
    }

    /// Gibt die konfigurierte maximale Zeilenlaenge zurueck
    pub fn max_zeilen_laenge(&self) -> usize {
        self.max_zeilen_laenge
    }
}

impl Default for ZeilenCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for ZeilenCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let ende = src[self.such_index..]
                .iter()
                .position(|b| *b == ZEILEN_ENDE)
                .map(|pos| self.such_index + pos);

            match (ende, self.verwerfen) {
                (Some(pos), true) => {
                    // Rest der ueberlangen Zeile inklusive `\n` verwerfen
                    let _ = src.split_to(pos + 1);
                    self.such_index = 0;
                    self.verwerfen = false;
                }
                (Some(pos), false) => {
                    let zeile = src.split_to(pos + 1);
                    self.such_index = 0;
                    if pos > self.max_zeilen_laenge {
                        tracing::warn!(
                            laenge = pos,
                            max = self.max_zeilen_laenge,
                            "Zeile zu lang – verworfen"
                        );
                        continue;
                    }
                    return Ok(Some(String::from_utf8_lossy(&zeile[..pos]).into_owned()));
                }
                (None, true) => {
                    src.clear();
                    self.such_index = 0;
                    return Ok(None);
                }
                (None, false) if src.len() > self.max_zeilen_laenge => {
                    tracing::warn!(
                        laenge = src.len(),
                        max = self.max_zeilen_laenge,
                        "Zeile ohne Ende zu lang – verwerfe bis zum naechsten Zeilenende"
                    );
                    src.clear();
                    self.such_index = 0;
                    self.verwerfen = true;
                    return Ok(None);
                }
                (None, false) => {
                    self.such_index = src.len();
                    return Ok(None);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl Encoder<&str> for ZeilenCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(ZEILEN_ENDE);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn alle_zeilen(codec: &mut ZeilenCodec, buf: &mut BytesMut) -> Vec<String> {
        let mut zeilen = Vec::new();
        while let Some(zeile) = codec.decode(buf).unwrap() {
            zeilen.push(zeile);
        }
        zeilen
    }

    #[test]
    fn mehrere_zeilen_im_buffer() {
        let mut codec = ZeilenCodec::new();
        let mut buf = BytesMut::from(&b"TEMP:23\n{\"type\":\"x\"}\n"[..]);

        let zeilen = alle_zeilen(&mut codec, &mut buf);
        assert_eq!(zeilen, vec!["TEMP:23", "{\"type\":\"x\"}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn unvollstaendige_zeile_wartet() {
        let mut codec = ZeilenCodec::new();
        let mut buf = BytesMut::from(&b"TEM"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"P:2");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"3\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("TEMP:23\r"));
    }

    #[test]
    fn leere_zeilen_werden_geliefert() {
        let mut codec = ZeilenCodec::new();
        let mut buf = BytesMut::from(&b"\n\nA\n"[..]);
        assert_eq!(alle_zeilen(&mut codec, &mut buf), vec!["", "", "A"]);
    }

    #[test]
    fn ueberlange_zeile_wird_verworfen() {
        let mut codec = ZeilenCodec::with_max_laenge(4);
        let mut buf = BytesMut::from(&b"123456"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());

        // Rest der ueberlangen Zeile und danach eine gueltige Zeile
        buf.extend_from_slice(b"789\nOK\n");
        assert_eq!(alle_zeilen(&mut codec, &mut buf), vec!["OK"]);
    }

    #[test]
    fn ueberlange_vollstaendige_zeile_wird_uebersprungen() {
        let mut codec = ZeilenCodec::with_max_laenge(4);
        let mut buf = BytesMut::from(&b"zulang\nkurz\n"[..]);
        assert_eq!(alle_zeilen(&mut codec, &mut buf), vec!["kurz"]);
    }

    #[test]
    fn ungueltiges_utf8_wird_ersetzt() {
        let mut codec = ZeilenCodec::new();
        let mut buf = BytesMut::from(&[b'A', 0xFF, b'B', b'\n'][..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("A\u{FFFD}B")
        );
    }

    #[test]
    fn encode_haengt_zeilenende_an() {
        let mut codec = ZeilenCodec::new();
        let mut buf = BytesMut::new();
        codec.encode("LED_ON", &mut buf).unwrap();
        codec.encode("{\"cmd\":1}", &mut buf).unwrap();
        assert_eq!(&buf[..], b"LED_ON\n{\"cmd\":1}\n");
    }

    #[test]
    fn codec_default_max_laenge() {
        let codec = ZeilenCodec::default();
        assert_eq!(codec.max_zeilen_laenge(), DEFAULT_MAX_ZEILEN_LAENGE);
    }
}
