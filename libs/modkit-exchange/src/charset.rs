//! Text encoding resolution for response bodies.
//!
//! Resolution order:
//! 1. `charset` parameter of the Content-Type (quotes tolerated, unknown labels ignored)
//! 2. byte-order mark: UTF-8, UTF-32 LE, UTF-16 LE, UTF-16 BE (UTF-32 LE before
//!    UTF-16 LE because `FF FE` prefixes both)
//! 3. UTF-8
//!
//! Whatever the source of the decision, the chosen encoding's BOM is stripped
//! once if the body starts with it.

use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16BE_BOM: &[u8] = &[0xFE, 0xFF];
const UTF32LE_BOM: &[u8] = &[0xFF, 0xFE, 0x00, 0x00];
const UTF32BE_BOM: &[u8] = &[0x00, 0x00, 0xFE, 0xFF];

/// A text encoding a response body can be decoded with.
///
/// UTF-32 is handled here because `encoding_rs` only carries the encodings of
/// the WHATWG Encoding Standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Whatwg(&'static Encoding),
    Utf32Le,
    Utf32Be,
}

impl TextEncoding {
    /// Resolve a charset label such as `utf-8`, `"ISO-8859-1"` or `utf-32`.
    #[must_use]
    pub fn for_label(label: &str) -> Option<Self> {
        let label = label.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        match label.to_ascii_lowercase().as_str() {
            "utf-32" | "utf-32le" | "utf32" => Some(Self::Utf32Le),
            "utf-32be" => Some(Self::Utf32Be),
            other => Encoding::for_label(other.as_bytes()).map(Self::Whatwg),
        }
    }

    /// Byte-order mark of this encoding; empty for encodings that have none.
    #[must_use]
    pub fn bom(self) -> &'static [u8] {
        match self {
            Self::Utf32Le => UTF32LE_BOM,
            Self::Utf32Be => UTF32BE_BOM,
            Self::Whatwg(encoding) if encoding == UTF_8 => UTF8_BOM,
            Self::Whatwg(encoding) if encoding == UTF_16LE => UTF16LE_BOM,
            Self::Whatwg(encoding) if encoding == UTF_16BE => UTF16BE_BOM,
            Self::Whatwg(_) => &[],
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Whatwg(encoding) => encoding.name(),
            Self::Utf32Le => "UTF-32LE",
            Self::Utf32Be => "UTF-32BE",
        }
    }

    /// Decode `bytes` (BOM already removed). Malformed sequences become U+FFFD.
    #[must_use]
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Whatwg(encoding) => encoding.decode_without_bom_handling(bytes).0.into_owned(),
            Self::Utf32Le => decode_utf32(bytes, u32::from_le_bytes),
            Self::Utf32Be => decode_utf32(bytes, u32::from_be_bytes),
        }
    }
}

fn decode_utf32(bytes: &[u8], unit: fn([u8; 4]) -> u32) -> String {
    let chunks = bytes.chunks_exact(4);
    let trailing = !chunks.remainder().is_empty();
    let mut text: String = chunks
        .map(|chunk| {
            let unit = unit([chunk[0], chunk[1], chunk[2], chunk[3]]);
            char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER)
        })
        .collect();
    if trailing {
        text.push(char::REPLACEMENT_CHARACTER);
    }
    text
}

/// Outcome of charset resolution for one body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCharset {
    pub encoding: TextEncoding,
    /// Leading BOM bytes to skip before decoding
    pub bom_len: usize,
}

/// `charset` parameter of a Content-Type value, if it parses and names a known encoding.
fn declared_charset(content_type: &str) -> Option<TextEncoding> {
    let media: mime::Mime = content_type.trim().parse().ok()?;
    let label = media.get_param(mime::CHARSET)?;
    TextEncoding::for_label(label.as_str())
}

/// Encoding signalled by a byte-order mark at the start of `body`.
fn sniff_bom(body: &[u8]) -> Option<TextEncoding> {
    [
        TextEncoding::Whatwg(UTF_8),
        TextEncoding::Utf32Le,
        TextEncoding::Whatwg(UTF_16LE),
        TextEncoding::Whatwg(UTF_16BE),
    ]
    .into_iter()
    .find(|encoding| body.starts_with(encoding.bom()))
}

/// Pick the encoding for `body` given its Content-Type header value (possibly empty).
#[must_use]
pub fn resolve(content_type: &str, body: &[u8]) -> ResolvedCharset {
    let encoding = declared_charset(content_type)
        .or_else(|| sniff_bom(body))
        .unwrap_or(TextEncoding::Whatwg(UTF_8));
    let bom = encoding.bom();
    let bom_len = if !bom.is_empty() && body.starts_with(bom) {
        bom.len()
    } else {
        0
    };
    ResolvedCharset { encoding, bom_len }
}

/// Decode `body` to text using the resolved charset.
#[must_use]
pub fn decode_text(content_type: &str, body: &[u8]) -> String {
    let resolved = resolve(content_type, body);
    resolved.encoding.decode(&body[resolved.bom_len..])
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_bom_is_stripped_without_charset() {
        let body = [UTF8_BOM, "h\u{e9}llo".as_bytes()].concat();
        let resolved = resolve("text/plain", &body);
        assert_eq!(resolved.encoding, TextEncoding::Whatwg(UTF_8));
        assert_eq!(resolved.bom_len, 3);
        assert_eq!(decode_text("text/plain", &body), "h\u{e9}llo");
    }

    #[test]
    fn test_quoted_utf16_charset_without_bom_is_little_endian() {
        let body: Vec<u8> = "hi".encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert_eq!(decode_text(r#"text/plain; charset="utf-16""#, &body), "hi");
    }

    #[test]
    fn test_declared_charset_wins_over_default() {
        // 0xE9 is e-acute in windows-1252 and invalid as UTF-8
        let body = [b'c', b'a', b'f', 0xE9];
        assert_eq!(
            decode_text("text/plain; charset=ISO-8859-1", &body),
            "caf\u{e9}"
        );
    }

    #[test]
    fn test_unknown_charset_falls_through_to_bom() {
        let body = [UTF16BE_BOM, &[0x00, b'o', 0x00, b'k']].concat();
        let resolved = resolve("text/plain; charset=x-made-up", &body);
        assert_eq!(resolved.encoding, TextEncoding::Whatwg(UTF_16BE));
        assert_eq!(decode_text("text/plain; charset=x-made-up", &body), "ok");
    }

    #[test]
    fn test_utf32_bom_detected_before_utf16() {
        let body = [UTF32LE_BOM, &[b'A', 0x00, 0x00, 0x00]].concat();
        let resolved = resolve("", &body);
        assert_eq!(resolved.encoding, TextEncoding::Utf32Le);
        assert_eq!(resolved.bom_len, 4);
        assert_eq!(decode_text("", &body), "A");
    }

    #[test]
    fn test_utf16le_bom() {
        let body = [UTF16LE_BOM, &[b'o', 0x00, b'k', 0x00]].concat();
        assert_eq!(resolve("", &body).encoding, TextEncoding::Whatwg(UTF_16LE));
        assert_eq!(decode_text("", &body), "ok");
    }

    #[test]
    fn test_declared_charset_strips_matching_bom_once() {
        let body = [UTF8_BOM, UTF8_BOM, b"x"].concat();
        let text = decode_text("application/json; charset=utf-8", &body);
        assert_eq!(text, "\u{feff}x");
    }

    #[test]
    fn test_defaults_to_utf8() {
        let resolved = resolve("", b"plain");
        assert_eq!(resolved.encoding, TextEncoding::Whatwg(UTF_8));
        assert_eq!(resolved.bom_len, 0);
    }

    #[test]
    fn test_malformed_content_type_is_treated_as_absent() {
        assert_eq!(decode_text(";;;charset", b"abc"), "abc");
    }

    #[test]
    fn test_utf32_labels() {
        assert_eq!(TextEncoding::for_label("UTF-32"), Some(TextEncoding::Utf32Le));
        assert_eq!(TextEncoding::for_label("utf-32be"), Some(TextEncoding::Utf32Be));
        assert_eq!(TextEncoding::Utf32Be.decode(&[0x00, 0x00, 0x00, b'Z']), "Z");
    }
}
