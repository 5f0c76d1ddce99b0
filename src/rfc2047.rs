//! Module for decoding RFC 2047 strings

use base64::Engine as _;
use encoding_rs::Encoding;

use super::rfc2045::{decode_quoted_printable, PADDING_INDIFFERENT};

/// Decode an RFC 2047 encoded word (`s`) into a Rust String.
///
/// Will accept either "Q" encoding (RFC 2047 Section 4.2) or
/// "B" encoding (BASE64). The charset may carry an RFC 2231 language
/// suffix (`utf-8*en`), which is ignored.
///
/// Returns `None` if `s` is not an encoded word, uses an unknown charset or
/// cannot be decoded.
pub fn decode_rfc2047(s: &str) -> Option<String> {
    let inner = s.strip_prefix("=?")?.strip_suffix("?=")?;
    let mut parts = inner.splitn(3, '?');
    let charset = parts.next()?.split('*').next()?;
    let encoding = parts.next()?;
    let content = parts.next()?;
    if content.contains('?') {
        return None;
    }

    let bytes = match encoding {
        "q" | "Q" => decode_q_encoding(content),
        "b" | "B" => PADDING_INDIFFERENT.decode(content).ok()?,
        _ => return None,
    };

    // encoding_rs follows the WHATWG label set, which covers the MIME
    // charset names seen in practice
    let decoder = Encoding::for_label(charset.as_bytes())?;
    Some(decoder.decode_with_bom_removal(&bytes).0.into_owned())
}

/// Decode "Q" encoded text: quoted-printable where `_` stands for a space.
pub fn decode_q_encoding(s: &str) -> Vec<u8> {
    let unescaped: Vec<u8> = s
        .bytes()
        .map(|b| if b == b'_' { b' ' } else { b })
        .collect();
    decode_quoted_printable(&unescaped)
}

/// Decode every encoded word found in an unstructured header value such as
/// `Subject`.
///
/// Whitespace between two adjacent encoded words is removed, as RFC 2047
/// Section 6.2 requires. Words that fail to decode are kept verbatim.
pub fn decode_unstructured(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    let mut pending_space: Option<&str> = None;
    let mut last_encoded = false;

    for (is_space, segment) in Segments::new(value) {
        if is_space {
            pending_space = Some(segment);
            continue;
        }

        let decoded = if segment.starts_with("=?") {
            decode_rfc2047(segment)
        } else {
            None
        };

        if let Some(space) = pending_space.take() {
            if !(last_encoded && decoded.is_some()) {
                result.push_str(space);
            }
        }

        last_encoded = decoded.is_some();
        match decoded {
            Some(text) => result.push_str(&text),
            None => result.push_str(segment),
        }
    }

    if let Some(space) = pending_space {
        result.push_str(space);
    }
    result
}

/// Splits a string into alternating runs of whitespace and non-whitespace.
struct Segments<'s> {
    s: &'s str,
}

impl<'s> Segments<'s> {
    fn new(s: &'s str) -> Segments<'s> {
        Segments { s }
    }
}

impl<'s> Iterator for Segments<'s> {
    type Item = (bool, &'s str);

    fn next(&mut self) -> Option<(bool, &'s str)> {
        let first = self.s.chars().next()?;
        let is_space = first.is_whitespace();
        let end = self
            .s
            .char_indices()
            .find(|&(_, c)| c.is_whitespace() != is_space)
            .map(|(i, _)| i)
            .unwrap_or_else(|| self.s.len());
        let (segment, rest) = self.s.split_at(end);
        self.s = rest;
        Some((is_space, segment))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    struct DecodeTest<'s> {
        input: &'s str,
        output: &'s str,
    }

    #[test]
    fn test_decode() {
        let tests = [
            DecodeTest {
                input: "=?ISO-8859-1?Q?Test=20text?=",
                output: "Test text",
            },
            DecodeTest {
                input: "=?ISO-8859-1?b?VGVzdCB0ZXh0?=",
                output: "Test text",
            },
            DecodeTest {
                input: "=?utf-8?b?44GT44KT44Gr44Gh44Gv44CC?=",
                output: "こんにちは。",
            },
            DecodeTest {
                input: "=?ISO-8859-1?Q?Keld_J=F8rn_Simonsen?=",
                output: "Keld Jørn Simonsen",
            },
            DecodeTest {
                input: "=?US-ASCII*EN?Q?Keith_Moore?=",
                output: "Keith Moore",
            },
            DecodeTest {
                input: "=?utf-8?B?aGVsbG8?=",
                output: "hello",
            },
        ];

        for t in tests.iter() {
            assert_eq!(decode_rfc2047(t.input).as_deref(), Some(t.output));
        }
    }

    #[test]
    fn test_q_encoding() {
        assert_eq!(decode_q_encoding("a_b=3Dc"), b"a b=c".to_vec());
        assert_eq!(decode_q_encoding("Python 2=2E6"), b"Python 2.6".to_vec());
    }

    #[test]
    fn test_decode_failure() {
        let tests = [
            // Invalid base64
            "=?ISO-8859-1?b?-?=",
            // Not valid RFC 2047
            "=?Doesn't end with equals",
            // Unknown charset
            "=?NOCHARSET?q?foo?=",
            // Unknown encoding
            "=?utf-8?x?foo?=",
            // Too many sections
            "=?utf-8?q?foo?bar?=",
        ];

        for t in tests.iter() {
            assert!(decode_rfc2047(t).is_none(), "{}", t);
        }
    }

    #[test]
    fn test_decode_unstructured() {
        let tests = [
            ("Hi", "Hi"),
            ("plain  text\twith space", "plain  text\twith space"),
            ("=?utf-8?q?caf=C3=A9?= time", "café time"),
            ("=?utf-8?q?a?= =?utf-8?q?b?=", "ab"),
            ("=?utf-8?q?a?=  \t =?utf-8?q?b?= c", "ab c"),
            ("x =?utf-8?q?a?=", "x a"),
            ("=?bogus?q?a?= =?utf-8?q?b?=", "=?bogus?q?a?= b"),
            ("", ""),
        ];

        for &(input, expected) in tests.iter() {
            assert_eq!(decode_unstructured(input), expected, "{:?}", input);
        }
    }

    proptest! {
        #[test]
        fn decode_never_panics(s in r"=\?.*\?.*\?.*\?=") {
            decode_rfc2047(&s);
        }

        #[test]
        fn unstructured_without_words_is_unchanged(s in "[^=]*") {
            prop_assert_eq!(decode_unstructured(&s), s);
        }
    }
}
