//! Text and binary encodings used on the wire
//!
//! Every binary link field travels as standard base64 (`A-Za-z0-9+/`, `=`
//! padding, no line wrapping). Decoding is strict by default. Links minted
//! by the old browser encoder may carry CR/LF breaks every 76 characters or
//! truncated tails, so a lenient decoder is available as an explicit opt-in.

use crate::error::{ErrorCategory, ErrorKind, LinkError, Result};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::{DecodePaddingMode, Engine};

/// Engine for the lenient decoder. Input has already been reduced to
/// alphabet characters, so padding is never present and stray low bits in
/// the final group are accepted.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone),
);

/// How base64 link fields are decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Base64Mode {
    /// Reject anything that is not canonical padded base64.
    #[default]
    Strict,
    /// Accept legacy links: drop non-alphabet characters and decode
    /// truncated tails instead of failing.
    Lenient,
}

/// Encode bytes as padded standard base64 on a single line.
pub fn base64_encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode canonical padded standard base64.
pub fn base64_decode(text: &str) -> Result<Vec<u8>> {
    STANDARD.decode(text).map_err(|e| {
        LinkError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Base64Invalid,
            format!("base64 decoding failed: {}", e),
            e,
        )
    })
}

/// Decode base64 the way legacy links were decoded: characters outside the
/// alphabet (padding, whitespace, line breaks) are discarded and a trailing
/// partial group yields as many bytes as its bits allow. Never fails.
///
/// For `n` retained characters the output is `(n * 3 + 1) / 4` bytes.
pub fn base64_decode_lenient(text: &str) -> Vec<u8> {
    let kept: String = text.chars().filter(|c| sextet(*c).is_some()).collect();

    // A lone trailing character carries six bits; legacy links still
    // produced one byte from it.
    let (body, stray) = if kept.len() % 4 == 1 {
        let (body, last) = kept.split_at(kept.len() - 1);
        (body, last.chars().next().and_then(sextet))
    } else {
        (kept.as_str(), None)
    };

    // Only alphabet characters remain and the length is never 1 mod 4,
    // which is everything the engine can reject.
    let mut out = LENIENT.decode(body).unwrap_or_default();
    if let Some(bits) = stray {
        out.push(bits << 2);
    }
    out
}

/// Decode a base64 field according to `mode`.
pub fn decode_with(text: &str, mode: Base64Mode) -> Result<Vec<u8>> {
    match mode {
        Base64Mode::Strict => base64_decode(text),
        Base64Mode::Lenient => Ok(base64_decode_lenient(text)),
    }
}

fn sextet(c: char) -> Option<u8> {
    let v = match c {
        'A'..='Z' => c as u8 - b'A',
        'a'..='z' => c as u8 - b'a' + 26,
        '0'..='9' => c as u8 - b'0' + 52,
        '+' => 62,
        '/' => 63,
        _ => return None,
    };
    Some(v)
}

/// UTF-8 bytes of `text`. Supplementary-plane characters take four bytes.
pub fn utf8_encode(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

/// Decode UTF-8, replacing invalid sequences with U+FFFD.
///
/// Decrypting under the wrong key produces arbitrary bytes; turning them
/// into text must not fail, the digest check decides what happens next.
pub fn utf8_decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decode UTF-8, failing on the first invalid sequence.
pub fn utf8_decode_strict(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| {
        LinkError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::Utf8Invalid,
            format!("invalid UTF-8: {}", e.utf8_error()),
            e,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_bytes() {
        assert_eq!(base64_encode(b""), "");
        assert_eq!(base64_decode("").unwrap(), b"");
    }

    #[test]
    fn test_padding() {
        assert_eq!(base64_encode(b"f"), "Zg==");
        assert_eq!(base64_encode(b"fo"), "Zm8=");
        assert_eq!(base64_encode(b"foo"), "Zm9v");
        assert_eq!(base64_decode("Zm8=").unwrap(), b"fo");
    }

    #[test]
    fn test_all_byte_values() {
        let bytes: Vec<u8> = (0..=255).collect();
        let encoded = base64_encode(&bytes);

        assert!(encoded.starts_with("AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8gISIjJCUmJygpKissLS4vMDEy"));
        assert!(encoded.ends_with("8PHy8/T19vf4+fr7/P3+/w=="));
        assert_eq!(base64_decode(&encoded).unwrap(), bytes);
    }

    #[test]
    fn test_no_line_wrapping() {
        let encoded = base64_encode(&[0x5au8; 300]);
        assert!(encoded.len() > 76);
        assert!(!encoded.contains('\n'));
        assert!(!encoded.contains('\r'));
    }

    #[test]
    fn test_strict_rejects_bad_characters() {
        let err = base64_decode("Zm9v$$").expect_err("expected base64 error");
        assert_eq!(err.kind, Some(ErrorKind::Base64Invalid));
    }

    #[test]
    fn test_strict_rejects_missing_padding() {
        let err = base64_decode("Zm8").expect_err("expected padding error");
        assert_eq!(err.kind, Some(ErrorKind::Base64Invalid));
    }

    #[test]
    fn test_strict_rejects_embedded_line_break() {
        let err = base64_decode("Zm9v\r\nYmFy").expect_err("expected base64 error");
        assert_eq!(err.kind, Some(ErrorKind::Base64Invalid));
    }

    #[test]
    fn test_lenient_strips_foreign_characters() {
        assert_eq!(base64_decode_lenient("Zm9v\r\nYmFy"), b"foobar");
        assert_eq!(base64_decode_lenient(" Zm 8= "), b"fo");
        assert_eq!(base64_decode_lenient("Zm8"), b"fo");
    }

    #[test]
    fn test_lenient_truncated_tails() {
        // One leftover character still produces a byte from its six bits.
        assert_eq!(base64_decode_lenient("Zm9vY"), vec![b'f', b'o', b'o', 0x60]);
        assert_eq!(base64_decode_lenient("Z"), vec![0x64]);
        // Stray low bits in a two-character tail are ignored.
        assert_eq!(base64_decode_lenient("Zn"), b"f");
        assert_eq!(base64_decode_lenient("$$$"), b"");
    }

    #[test]
    fn test_decode_with_mode() {
        assert!(decode_with("Zm8", Base64Mode::Strict).is_err());
        assert_eq!(decode_with("Zm8", Base64Mode::Lenient).unwrap(), b"fo");
        assert_eq!(Base64Mode::default(), Base64Mode::Strict);
    }

    #[test]
    fn test_utf8_multibyte() {
        let text = "a\u{e9}\u{20ac}\u{1f980}";
        let bytes = utf8_encode(text);
        assert_eq!(bytes.len(), 1 + 2 + 3 + 4);
        assert_eq!(&bytes[6..], &[0xf0, 0x9f, 0xa6, 0x80]);
        assert_eq!(utf8_decode(&bytes), text);
        assert_eq!(utf8_decode_strict(&bytes).unwrap(), text);
    }

    #[test]
    fn test_utf8_invalid() {
        let bytes = [b'o', b'k', 0xff, 0xfe];
        assert_eq!(utf8_decode(&bytes), "ok\u{fffd}\u{fffd}");
        let err = utf8_decode_strict(&bytes).expect_err("expected UTF-8 error");
        assert_eq!(err.kind, Some(ErrorKind::Utf8Invalid));
    }

    proptest! {
        #[test]
        fn base64_roundtrip(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
            let encoded = base64_encode(&bytes);
            prop_assert_eq!(base64_decode(&encoded).unwrap(), bytes.clone());
            prop_assert_eq!(base64_decode_lenient(&encoded), bytes);
        }

        #[test]
        fn lenient_output_length(text in "[A-Za-z0-9+/]{0,64}") {
            let n = text.len();
            prop_assert_eq!(base64_decode_lenient(&text).len(), (n * 3 + 1) / 4);
        }

        #[test]
        fn utf8_roundtrip(text in any::<String>()) {
            prop_assert_eq!(utf8_decode(&utf8_encode(&text)), text.clone());
            prop_assert_eq!(utf8_decode_strict(&utf8_encode(&text)).unwrap(), text);
        }
    }
}
