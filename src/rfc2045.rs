//! Module for dealing with RFC2045 style headers and transfer encodings.

use std::borrow::Cow;
use std::collections::HashMap;
use std::mem;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use super::rfc5322::Rfc5322Parser;

/// Standard alphabet, padding optional, stray trailing bits tolerated.
pub(crate) const PADDING_INDIFFERENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Parser over RFC 2045 style headers.
///
/// Things of the style `value; param1=foo; param2="bar"`
pub struct Rfc2045Parser<'s> {
    parser: Rfc5322Parser<'s>,
}

impl<'s> Rfc2045Parser<'s> {
    /// Create a new parser over `s`
    pub fn new(s: &str) -> Rfc2045Parser {
        Rfc2045Parser {
            parser: Rfc5322Parser::new(s),
        }
    }

    fn consume_token(&mut self) -> Option<String> {
        let token = self.parser.consume_while(|c| match c {
            // Not any tspecials
            '(' | ')' | '<' | '>' | '@' | ',' | ';' | ':' | '\\' | '"' | '/' | '[' | ']'
            | '?' | '=' => false,
            '!'..='~' => true,
            _ => false,
        });

        if !token.is_empty() {
            Some(token.to_string())
        } else {
            None
        }
    }

    /// Unquoted values run to the next `;`, whitespace or comment. Agents
    /// commonly leave tspecials such as `=` unquoted in boundaries.
    fn consume_unquoted_value(&mut self) -> Option<String> {
        let value = self
            .parser
            .consume_while(|c| c != ';' && c != '(' && c != '"' && !c.is_whitespace());

        if !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    }

    /// Consume up to all of the input into the value and a hashmap
    /// over parameters to values.
    ///
    /// Parameter names are lowercased. Malformed parameters are skipped, the
    /// first occurrence of a repeated parameter wins, and RFC 2231
    /// continuations and charset-tagged values are reassembled.
    pub fn consume_all(&mut self) -> (String, HashMap<String, String>) {
        let value = self.parser.consume_while(|c| c != ';').trim().to_string();

        let mut raw_params = Vec::new();
        // Whatever stopped the previous scan is always a ';'
        while self.parser.consume_char().is_some() {
            // RFC ignorant mail systems may append a ';' without a parameter after.
            self.parser.consume_cfws();
            let attribute = self.consume_token();
            self.parser.consume_cfws();

            if self.parser.peek() == Some('=') {
                self.parser.consume_char();
                self.parser.consume_cfws();
                // Value can be token or quoted-string
                let value = if self.parser.peek() == Some('"') {
                    self.parser.consume_quoted_string()
                } else {
                    self.consume_unquoted_value()
                };

                if let (Some(attribute), Some(value)) = (attribute, value) {
                    raw_params.push((attribute.to_ascii_lowercase(), value));
                }
            }

            self.parser.consume_while(|c| c != ';');
        }

        (value, merge_rfc2231(raw_params))
    }
}

/// Fold RFC 2231 parameter sections (`name*0`, `name*1*`, `name*`) into
/// plain parameters.
fn merge_rfc2231(raw: Vec<(String, String)>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut continued: HashMap<String, Vec<(u32, bool, String)>> = HashMap::new();

    for (attribute, value) in raw {
        let (base, extended) = match attribute.strip_suffix('*') {
            Some(base) => (base, true),
            None => (&attribute[..], false),
        };

        let section = base
            .rsplit_once('*')
            .and_then(|(name, index)| index.parse::<u32>().ok().map(|index| (name, index)));

        match section {
            Some((name, index)) => continued
                .entry(name.to_string())
                .or_insert_with(Vec::new)
                .push((index, extended, value)),
            None if extended => {
                params
                    .entry(base.to_string())
                    .or_insert_with(|| decode_sections(vec![(true, value)]));
            }
            None => {
                params.entry(base.to_string()).or_insert(value);
            }
        }
    }

    for (name, mut sections) in continued {
        sections.sort_by_key(|&(index, _, _)| index);
        let sections = sections
            .into_iter()
            .map(|(_, extended, value)| (extended, value))
            .collect();
        params.entry(name).or_insert_with(|| decode_sections(sections));
    }

    params
}

fn decode_sections(sections: Vec<(bool, String)>) -> String {
    let mut charset = None;
    let mut bytes = Vec::new();

    for (i, (extended, value)) in sections.iter().enumerate() {
        if !extended {
            bytes.extend_from_slice(value.as_bytes());
            continue;
        }

        let mut text = &value[..];
        if i == 0 {
            // charset'language'text
            if let Some((cs, rest)) = value.split_once('\'') {
                if let Some((_, rest)) = rest.split_once('\'') {
                    charset = Some(cs);
                    text = rest;
                }
            }
        }
        percent_decode_into(text.as_bytes(), &mut bytes);
    }

    let encoding = charset
        .and_then(|cs| Encoding::for_label(cs.as_bytes()))
        .unwrap_or(UTF_8);
    encoding.decode_without_bom_handling(&bytes).0.into_owned()
}

fn percent_decode_into(text: &[u8], out: &mut Vec<u8>) {
    let mut i = 0;
    while i < text.len() {
        if text[i] == b'%' && i + 2 < text.len() {
            if let Some(b) = hex_pair(text[i + 1], text[i + 2]) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(text[i]);
        i += 1;
    }
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    Some(hex_digit(hi)? << 4 | hex_digit(lo)?)
}

fn is_base64_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/'
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DecoderKind {
    Identity,
    QuotedPrintable,
    Base64,
}

/// Incremental decoder for a content transfer encoding.
///
/// Input may be fed in slices of any size; incomplete escape sequences and
/// base64 quanta are held back until the next `feed` or `finish`, so the
/// concatenated output never depends on how the input was split.
///
/// Decoding never fails. Quoted-printable passes invalid escapes through
/// unchanged, base64 skips characters outside its alphabet.
#[derive(Clone, Debug)]
pub struct TransferDecoder {
    kind: DecoderKind,
    pending: Vec<u8>,
}

impl TransferDecoder {
    pub fn identity() -> TransferDecoder {
        TransferDecoder::with_kind(DecoderKind::Identity)
    }

    pub fn quoted_printable() -> TransferDecoder {
        TransferDecoder::with_kind(DecoderKind::QuotedPrintable)
    }

    pub fn base64() -> TransferDecoder {
        TransferDecoder::with_kind(DecoderKind::Base64)
    }

    fn with_kind(kind: DecoderKind) -> TransferDecoder {
        TransferDecoder {
            kind,
            pending: Vec::new(),
        }
    }

    /// Decode `input`, appending the result to `out`.
    pub fn feed(&mut self, input: &[u8], out: &mut Vec<u8>) {
        match self.kind {
            DecoderKind::Identity => out.extend_from_slice(input),
            DecoderKind::QuotedPrintable => self.feed_qp(input, out),
            DecoderKind::Base64 => self.feed_base64(input, out),
        }
    }

    /// Flush whatever is held back. The decoder is empty afterwards.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        let pending = mem::take(&mut self.pending);
        match self.kind {
            DecoderKind::Identity => {}
            DecoderKind::QuotedPrintable => {
                // Blanks ending the last line are padding, a dangling escape
                // is not an escape at all
                if !pending.iter().all(|&b| is_blank(b)) {
                    out.extend_from_slice(&pending);
                }
            }
            DecoderKind::Base64 => {
                if pending.len() == 1 {
                    debug!("Dropping single trailing base64 character");
                } else if !pending.is_empty() {
                    decode_base64_into(&pending, out);
                }
            }
        }
    }

    fn feed_qp(&mut self, input: &[u8], out: &mut Vec<u8>) {
        let data: Cow<[u8]> = if self.pending.is_empty() {
            Cow::Borrowed(input)
        } else {
            let mut data = mem::take(&mut self.pending);
            data.extend_from_slice(input);
            Cow::Owned(data)
        };

        let mut i = 0;
        while i < data.len() {
            match data[i] {
                b'=' => {}
                // Trailing blanks on a line are dropped (RFC 2045 6.7 rule 3)
                b' ' | b'\t' => {
                    let end = match scan_blanks(&data, i) {
                        BlankRun::LineBreak(end) => end,
                        BlankRun::Text(end) => {
                            out.extend_from_slice(&data[i..end]);
                            end
                        }
                        BlankRun::Incomplete => {
                            self.pending = data[i..].to_vec();
                            return;
                        }
                    };
                    i = end;
                    continue;
                }
                b => {
                    out.push(b);
                    i += 1;
                    continue;
                }
            }

            match (data.get(i + 1), data.get(i + 2)) {
                // Soft line break with transport padding before it
                (Some(b' '), _) | (Some(b'\t'), _) => match scan_blanks(&data, i + 1) {
                    BlankRun::LineBreak(end) => i = line_break_end(&data, end),
                    BlankRun::Text(_) => {
                        out.push(b'=');
                        i += 1;
                    }
                    BlankRun::Incomplete => {
                        self.pending = data[i..].to_vec();
                        return;
                    }
                },
                // Soft line breaks, UNIX and DOS
                (Some(b'\n'), _) => i += 2,
                (Some(b'\r'), Some(b'\n')) => i += 3,
                (None, _) | (Some(_), None) => {
                    self.pending = data[i..].to_vec();
                    return;
                }
                (Some(&hi), Some(&lo)) => match hex_pair(hi, lo) {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(b'=');
                        i += 1;
                    }
                },
            }
        }
    }

    fn feed_base64(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.pending
            .extend(input.iter().copied().filter(|&b| is_base64_char(b)));
        let whole = self.pending.len() / 4 * 4;
        if whole > 0 {
            decode_base64_into(&self.pending[..whole], out);
            self.pending.drain(..whole);
        }
    }
}

/// What follows a run of blanks in quoted-printable text.
enum BlankRun {
    /// A line break starts at the given offset.
    LineBreak(usize),
    /// Other text starts at the given offset.
    Text(usize),
    /// The input ends before this can be told.
    Incomplete,
}

fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn scan_blanks(data: &[u8], start: usize) -> BlankRun {
    let end = start
        + data[start..]
            .iter()
            .take_while(|&&b| is_blank(b))
            .count();
    match (data.get(end), data.get(end + 1)) {
        (None, _) | (Some(b'\r'), None) => BlankRun::Incomplete,
        (Some(b'\n'), _) | (Some(b'\r'), Some(b'\n')) => BlankRun::LineBreak(end),
        _ => BlankRun::Text(end),
    }
}

/// Offset just past the line break starting at `at`.
fn line_break_end(data: &[u8], at: usize) -> usize {
    if data[at] == b'\r' {
        at + 2
    } else {
        at + 1
    }
}

fn decode_base64_into(quanta: &[u8], out: &mut Vec<u8>) {
    if let Err(err) = PADDING_INDIFFERENT.decode_vec(quanta, out) {
        debug!("Skipping undecodable base64 data: {}", err);
    }
}

/// Decode quoted-printable encoding, as described by RFC 2045 Section 6.7.
///
/// Soft line breaks are removed, with either UNIX or DOS line endings.
/// Invalid sequences are passed through untransformed.
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut decoder = TransferDecoder::quoted_printable();
    decoder.feed(input, &mut out);
    decoder.finish(&mut out);
    out
}

/// Decode base64 as found in message bodies: line breaks and any other
/// characters outside the alphabet are ignored, padding is optional.
pub fn decode_base64(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() / 4 * 3);
    let mut decoder = TransferDecoder::base64();
    decoder.feed(input, &mut out);
    decoder.finish(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use proptest::prelude::*;

    use super::*;

    struct ParserTestCase<'s> {
        input: &'s str,
        output: (&'s str, Vec<(&'s str, &'s str)>),
        name: &'s str,
    }

    #[test]
    fn test_consume_all() {
        let tests = vec![
            ParserTestCase {
                input: "foo/bar",
                output: ("foo/bar", vec![]),
                name: "Basic value",
            },
            ParserTestCase {
                input: "foo/bar; foo=bar",
                output: ("foo/bar", vec![("foo", "bar")]),
                name: "Basic value with parameter",
            },
            ParserTestCase {
                input: "foo/bar; foo=\"bar\"",
                output: ("foo/bar", vec![("foo", "bar")]),
                name: "Basic value with quoted parameter",
            },
            ParserTestCase {
                input: "foo/bar; foo=\"bar\"; baz=qux",
                output: ("foo/bar", vec![("foo", "bar"), ("baz", "qux")]),
                name: "Multiple values",
            },
            ParserTestCase {
                input: "foo/bar; foo = \"bar\"; baz=qux",
                output: ("foo/bar", vec![("foo", "bar"), ("baz", "qux")]),
                name: "Parameter with space",
            },
            ParserTestCase {
                input: "foo/bar; Boundary=XYZ;",
                output: ("foo/bar", vec![("boundary", "XYZ")]),
                name: "Trailing semicolon, name case folded",
            },
            ParserTestCase {
                input: "foo/bar; broken; a=\"b;c\"; =x; d=1",
                output: ("foo/bar", vec![("a", "b;c"), ("d", "1")]),
                name: "Malformed parameters skipped",
            },
            ParserTestCase {
                input: "foo/bar; a=1; a=2",
                output: ("foo/bar", vec![("a", "1")]),
                name: "First occurrence wins",
            },
            ParserTestCase {
                input: "foo/bar; (comment) a=1",
                output: ("foo/bar", vec![("a", "1")]),
                name: "Comment before parameter",
            },
            ParserTestCase {
                input: "multipart/alternative; boundary=----=_Part_1 (comment); charset=utf-8",
                output: (
                    "multipart/alternative",
                    vec![("boundary", "----=_Part_1"), ("charset", "utf-8")],
                ),
                name: "Unquoted value with tspecials",
            },
        ];

        for test in tests.into_iter() {
            let (expected_value, expected_param_list) = test.output;
            let expected_params: HashMap<String, String> = expected_param_list
                .iter()
                .map(|&(name, value)| (name.to_string(), value.to_string()))
                .collect();

            let mut parser = Rfc2045Parser::new(test.input);
            let (value, parameters) = parser.consume_all();

            assert_eq!(value, expected_value, "{}", test.name);
            assert_eq!(parameters, expected_params, "{}", test.name);
        }
    }

    #[test]
    fn test_rfc2231_parameters() {
        let (_, params) = Rfc2045Parser::new(
            "application/x-stuff; title*1*=%2A%2A%2Afun%2A%2A%2A%20; \
             title*0*=us-ascii'en'This%20is%20even%20more%20; title*2=\"isn't it!\"",
        )
        .consume_all();
        assert_eq!(
            params.get("title").map(String::as_str),
            Some("This is even more ***fun*** isn't it!")
        );

        let (_, params) =
            Rfc2045Parser::new("attachment; filename*=utf-8''caf%C3%A9.txt").consume_all();
        assert_eq!(params.get("filename").map(String::as_str), Some("café.txt"));

        let (_, params) =
            Rfc2045Parser::new("multipart/mixed; boundary*0=abc; boundary*1=def").consume_all();
        assert_eq!(params.get("boundary").map(String::as_str), Some("abcdef"));
    }

    fn assert_qp(expected: &[u8], input: &[u8]) {
        assert_eq!(decode_quoted_printable(input), expected.to_vec(), "{:?}", input);
    }

    #[test]
    fn test_qp_decode() {
        assert_qp(b"hello world", b"hello world");
        assert_qp(b"\xabfoo", b"=ABfoo");
        assert_qp(b"fo\xabo", b"fo=abo");
        assert_qp(b"foo\xab\xcd", b"foo=AB=CD");

        assert_qp(b"foo", b"foo=\n");
        assert_qp(b"foobar", b"foo=\nbar");
        assert_qp(b"foobar", b"foo=\r\nbar");
        assert_qp(b"foobar\r\nbaz", b"foo=\r\nbar\r\nbaz");

        // Transport padding after soft breaks and at line ends
        assert_qp(b"foobar", b"foo= \r\nbar");
        assert_qp(b"foobar", b"foo=\t \nbar");
        assert_qp(b"foo\r\nbar", b"foo \t\r\nbar");
        assert_qp(b"foo\nbar", b"foo  \nbar");
        assert_qp(b"foo \tbar", b"foo \tbar");
        assert_qp(b"foo= bar", b"foo= bar");
        assert_qp(b"foo", b"foo  ");
        assert_qp(b"foo \r", b"foo \r");

        assert_qp(b"foo=()bar", b"foo=()bar");
        assert_qp(b"foo=\xabbar", b"foo==ABbar");
        assert_qp("foo=ゑbar".as_bytes(), "foo=ゑbar".as_bytes());

        // Dangling escapes are kept verbatim
        assert_qp(b"foo=", b"foo=");
        assert_qp(b"foo=A", b"foo=A");
        assert_qp(b"foo=\r", b"foo=\r");
    }

    #[test]
    fn test_base64_decode() {
        assert_eq!(decode_base64(b"aGVsbG8="), b"hello".to_vec());
        assert_eq!(decode_base64(b"aGVs\r\nbG8"), b"hello".to_vec());
        assert_eq!(
            decode_base64(b"Zm9vCmJhcgpi\r\nYXoKcXV4Cg=="),
            b"foo\nbar\nbaz\nqux\n".to_vec()
        );
        // Characters outside the alphabet are ignored
        assert_eq!(decode_base64(b"aGVs*bG8=\x00"), b"hello".to_vec());
        assert_eq!(decode_base64(b""), Vec::<u8>::new());
        assert_eq!(decode_base64(b"/?#"), Vec::<u8>::new());
    }

    #[test]
    fn test_decoder_holds_back_partial_input() {
        let mut out = Vec::new();
        let mut decoder = TransferDecoder::quoted_printable();
        decoder.feed(b"caf=C", &mut out);
        assert_eq!(out, b"caf".to_vec());
        decoder.feed(b"3=A9", &mut out);
        decoder.finish(&mut out);
        assert_eq!(String::from_utf8(out).unwrap(), "café");

        let mut out = Vec::new();
        let mut decoder = TransferDecoder::base64();
        decoder.feed(b"aGV", &mut out);
        assert!(out.is_empty());
        decoder.feed(b"sbG8=", &mut out);
        decoder.finish(&mut out);
        assert_eq!(out, b"hello".to_vec());
    }

    fn decode_in_chunks(mut decoder: TransferDecoder, input: &[u8], size: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in input.chunks(size) {
            decoder.feed(chunk, &mut out);
        }
        decoder.finish(&mut out);
        out
    }

    proptest! {
        #[test]
        fn qp_chunking_is_transparent(
            s in prop::collection::vec(prop::num::u8::ANY, 0..64),
            size in 1usize..10,
        ) {
            prop_assert_eq!(
                decode_in_chunks(TransferDecoder::quoted_printable(), &s, size),
                decode_quoted_printable(&s)
            );
        }

        #[test]
        fn qp_chunking_is_transparent_for_escapes(
            s in "([a-z \t]|=[0-9A-F]{2}|=\r\n|=\n|= \r\n|=\t \n| \r\n)*",
            size in 1usize..8,
        ) {
            prop_assert_eq!(
                decode_in_chunks(TransferDecoder::quoted_printable(), s.as_bytes(), size),
                decode_quoted_printable(s.as_bytes())
            );
        }

        #[test]
        fn base64_chunking_is_transparent(
            s in prop::collection::vec(prop::num::u8::ANY, 0..64),
            size in 1usize..10,
        ) {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&s);
            prop_assert_eq!(
                decode_in_chunks(TransferDecoder::base64(), encoded.as_bytes(), size),
                s
            );
        }

        #[test]
        fn base64_never_panics(s in prop::collection::vec(prop::num::u8::ANY, 0..64)) {
            decode_base64(&s);
        }
    }
}
