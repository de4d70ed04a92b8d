//! Resource loading for `%load_csv` / `%load_json`, and charset decoding.
//!
//! The engine never touches the filesystem directly: the host installs a
//! [`ResourceLoader`] that maps a source name to raw bytes.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Returns the bytes of a named resource, `Ok(None)` when it does not exist.
pub type ResourceLoader = Arc<dyn Fn(&str) -> io::Result<Option<Vec<u8>>> + Send + Sync>;

/// Loader that resolves names relative to `base`.  Absolute names are used
/// as-is.
pub fn fs_loader(base: impl Into<PathBuf>) -> ResourceLoader {
    let base = base.into();
    Arc::new(move |name: &str| -> io::Result<Option<Vec<u8>>> {
        let path = base.join(name);
        if path.is_dir() {
            return Ok(None);
        }
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    })
}

/// Loader over an in-memory table, for embedding and tests.
pub fn map_loader<I, K, V>(resources: I) -> ResourceLoader
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Vec<u8>>,
{
    let table: HashMap<String, Vec<u8>> = resources
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    Arc::new(move |name: &str| -> io::Result<Option<Vec<u8>>> { Ok(table.get(name).cloned()) })
}

// ── Charsets ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unsupported charset {0:?}")]
    UnsupportedCharset(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Charset {
    Utf8,
    /// BOM-sniffed, big-endian when there is no BOM.
    Utf16,
    Utf16Le,
    Utf16Be,
    Latin1,
    Ascii,
}

impl Charset {
    fn lookup(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| !matches!(c, '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        Some(match key.as_str() {
            "utf8" => Self::Utf8,
            "utf16" => Self::Utf16,
            "utf16le" => Self::Utf16Le,
            "utf16be" => Self::Utf16Be,
            "iso88591" | "latin1" => Self::Latin1,
            "usascii" | "ascii" => Self::Ascii,
            _ => return None,
        })
    }
}

pub fn is_supported_charset(name: &str) -> bool {
    Charset::lookup(name).is_some()
}

/// Decode `bytes` in the named charset.  A leading byte-order mark is
/// dropped.  Malformed sequences become U+FFFD; only an unknown charset
/// name is an error.
pub fn decode(bytes: &[u8], charset: &str) -> Result<String, DecodeError> {
    let cs = Charset::lookup(charset).ok_or_else(|| DecodeError::UnsupportedCharset(charset.to_owned()))?;
    Ok(match cs {
        Charset::Utf8 => {
            let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
            String::from_utf8_lossy(bytes).into_owned()
        }
        Charset::Utf16 => match bytes {
            [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, false),
            [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, true),
            _ => decode_utf16(bytes, true),
        },
        Charset::Utf16Le => decode_utf16(bytes.strip_prefix(b"\xFF\xFE").unwrap_or(bytes), false),
        Charset::Utf16Be => decode_utf16(bytes.strip_prefix(b"\xFE\xFF").unwrap_or(bytes), true),
        Charset::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        Charset::Ascii => bytes
            .iter()
            .map(|&b| if b.is_ascii() { char::from(b) } else { char::REPLACEMENT_CHARACTER })
            .collect(),
    })
}

fn decode_utf16(bytes: &[u8], big_endian: bool) -> String {
    let pairs = bytes.chunks_exact(2);
    let odd_tail = !pairs.remainder().is_empty();
    let units = pairs.map(|pair| {
        let pair = [pair[0], pair[1]];
        if big_endian {
            u16::from_be_bytes(pair)
        } else {
            u16::from_le_bytes(pair)
        }
    });
    let mut text: String = char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    if odd_tail {
        text.push(char::REPLACEMENT_CHARACTER);
    }
    text
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn utf8_strips_bom() {
        assert_eq!(decode(b"\xEF\xBB\xBFa,b", "UTF-8").unwrap(), "a,b");
        assert_eq!(decode("é".as_bytes(), "utf8").unwrap(), "é");
    }

    #[test]
    fn malformed_utf8_is_replaced() {
        assert_eq!(decode(b"caf\xE9", "UTF-8").unwrap(), "caf\u{FFFD}");
        assert_eq!(decode(b"\xFF", "UTF-8").unwrap(), "\u{FFFD}");
    }

    #[test]
    fn utf16_variants() {
        assert_eq!(decode(b"\x00h\x00i", "UTF-16BE").unwrap(), "hi");
        assert_eq!(decode(b"h\x00i\x00", "UTF-16LE").unwrap(), "hi");
        assert_eq!(decode(b"\xFF\xFEh\x00i\x00", "UTF-16").unwrap(), "hi");
        assert_eq!(decode(b"\x00h\x00i", "UTF-16").unwrap(), "hi");
        assert_eq!(decode(b"\x00h\x00", "UTF-16").unwrap(), "h\u{FFFD}");
        assert_eq!(decode(b"\xD8\x00\x00h", "UTF-16BE").unwrap(), "\u{FFFD}h");
    }

    #[test]
    fn single_byte_charsets() {
        assert_eq!(decode(b"caf\xE9", "ISO-8859-1").unwrap(), "café");
        assert_eq!(decode(b"plain", "US-ASCII").unwrap(), "plain");
        assert_eq!(decode(b"caf\xE9", "US-ASCII").unwrap(), "caf\u{FFFD}");
    }

    #[test]
    fn unknown_charset() {
        assert_eq!(
            decode(b"x", "EBCDIC"),
            Err(DecodeError::UnsupportedCharset("EBCDIC".into()))
        );
        assert!(!is_supported_charset("EBCDIC"));
        assert!(is_supported_charset("latin-1"));
    }

    #[test]
    fn fs_loader_reads_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("data.csv")).unwrap();
        f.write_all(b"a,b\n1,2\n").unwrap();
        let loader = fs_loader(dir.path());
        assert_eq!(loader("data.csv").unwrap(), Some(b"a,b\n1,2\n".to_vec()));
        assert_eq!(loader("missing.csv").unwrap(), None);
    }

    #[test]
    fn map_loader_lookup() {
        let loader = map_loader([("a.json", "{}")]);
        assert_eq!(loader("a.json").unwrap(), Some(b"{}".to_vec()));
        assert_eq!(loader("b.json").unwrap(), None);
    }
}
