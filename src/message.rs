use std::cmp;
use std::fs;
use std::io::Read;
use std::ops::Range;
use std::path::Path;

use chrono::{DateTime, FixedOffset};
use log::{debug, warn};

use super::address::{AddressList, AddressParser};
use super::header::HeaderMap;
use super::mimeheaders::{MimeContentTransferEncoding, MimeContentType, MimeContentTypeHeader};
use super::references::{parse_message_id, MessageIdList};
use super::results::{Error, ParsingError};
use super::rfc2045::TransferDecoder;
use super::rfc2047::decode_unstructured;
use super::rfc5322::{parse_header_line, HeaderLines, Lines};
use super::rfc822::Rfc822DateParser;

/// Headers whose values are address lists.
const ADDRESS_HEADERS: [&str; 4] = ["From", "To", "Cc", "Bcc"];

/// Marks the type of a multipart message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MimeMultipartType {
    /// Entries which are independent.
    ///
    /// This value is the default, and is also used for unknown subtypes.
    ///
    /// As defined by Section 5.1.3 of RFC 2046
    Mixed,
    /// Entries which are interchangeable, such that the system can choose
    /// whichever is "best" for its use.
    ///
    /// As defined by Section 5.1.4 of RFC 2046
    Alternative,
    /// Entries are (typically) a collection of messages.
    ///
    /// As defined by Section 5.1.5 of RFC 2046
    Digest,
    /// Entry order does not matter, and could be displayed simultaneously.
    ///
    /// As defined by Section 5.1.6 of RFC 2046
    Parallel,
}

impl MimeMultipartType {
    /// Returns the appropriate `MimeMultipartType` for the given MimeContentType,
    /// or `None` if it is not a multipart type.
    pub fn from_content_type(ct: &MimeContentType) -> Option<MimeMultipartType> {
        let (major, minor) = ct;
        if major != "multipart" {
            return None;
        }

        Some(match &minor[..] {
            // "alternate" is a common misspelling
            "alternative" | "alternate" => MimeMultipartType::Alternative,
            "digest" => MimeMultipartType::Digest,
            "parallel" => MimeMultipartType::Parallel,
            _ => MimeMultipartType::Mixed,
        })
    }

    /// Returns a MimeContentType that represents this multipart type.
    pub fn to_content_type(self) -> MimeContentType {
        let multipart = "multipart".to_string();
        match self {
            MimeMultipartType::Mixed => (multipart, "mixed".to_string()),
            MimeMultipartType::Alternative => (multipart, "alternative".to_string()),
            MimeMultipartType::Digest => (multipart, "digest".to_string()),
            MimeMultipartType::Parallel => (multipart, "parallel".to_string()),
        }
    }
}

/// Knobs for `MimeMessage::parse_with_options`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParserOptions {
    /// Multiparts nested deeper than this are kept as opaque leaves.
    pub max_depth: usize,
    /// Decode RFC 2047 encoded words in `Subject` and display names.
    pub decode_encoded_words: bool,
    /// Number of raw body bytes decoded per chunk by
    /// `first_body_part_chunks`.
    pub chunk_size: usize,
}

impl Default for ParserOptions {
    fn default() -> ParserOptions {
        ParserOptions {
            max_depth: 32,
            decode_encoded_words: true,
            chunk_size: 512,
        }
    }
}

/// Index of a part inside its message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PartId(usize);

impl PartId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a part contains.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PartKind {
    /// A single body, possibly transfer encoded.
    Leaf {
        transfer_encoding: MimeContentTransferEncoding,
    },
    /// Sub parts separated by `boundary`. The preamble and epilogue are not
    /// kept.
    Multipart {
        multipart_type: MimeMultipartType,
        boundary: String,
        children: Vec<PartId>,
    },
}

/// One MIME entity: its headers and where its body lies in the raw message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Part {
    headers: HeaderMap,
    content_type: MimeContentTypeHeader,
    body: Range<usize>,
    kind: PartKind,
}

impl Part {
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The parsed `Content-Type`, or `text/plain` when it is absent or
    /// unparsable.
    pub fn content_type(&self) -> &MimeContentTypeHeader {
        &self.content_type
    }

    pub fn kind(&self) -> &PartKind {
        &self.kind
    }

    /// Byte range of the body within `MimeMessage::raw_bytes`.
    pub fn body_range(&self) -> Range<usize> {
        self.body.clone()
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, PartKind::Leaf { .. })
    }

    fn transfer_encoding(&self) -> MimeContentTransferEncoding {
        match self.kind {
            PartKind::Leaf {
                ref transfer_encoding,
            } => transfer_encoding.clone(),
            PartKind::Multipart { .. } => MimeContentTransferEncoding::Identity,
        }
    }
}

/// A part together with the message that owns it.
#[derive(Clone, Copy, Debug)]
pub struct PartRef<'a> {
    message: &'a MimeMessage,
    id: PartId,
}

impl<'a> PartRef<'a> {
    pub fn id(&self) -> PartId {
        self.id
    }

    pub fn part(&self) -> &'a Part {
        &self.message.parts[self.id.0]
    }

    pub fn headers(&self) -> &'a HeaderMap {
        &self.part().headers
    }

    pub fn content_type(&self) -> &'a MimeContentTypeHeader {
        &self.part().content_type
    }

    pub fn is_leaf(&self) -> bool {
        self.part().is_leaf()
    }

    /// The body exactly as it appears in the message.
    pub fn raw_bytes(&self) -> &'a [u8] {
        &self.message.raw[self.part().body.clone()]
    }

    /// The body with its transfer encoding removed. Multiparts return their
    /// raw body.
    pub fn decoded_bytes(&self) -> Vec<u8> {
        self.part().transfer_encoding().decode(self.raw_bytes())
    }

    /// Lazily decode the body, `chunk_size` raw bytes at a time.
    pub fn chunks(&self, chunk_size: usize) -> BodyChunks<'a> {
        BodyChunks::new(
            self.raw_bytes(),
            self.part().transfer_encoding().decoder(),
            chunk_size,
        )
    }

    /// Sub parts in order. Empty for leaves.
    pub fn children(&self) -> impl Iterator<Item = PartRef<'a>> + 'a {
        let message = self.message;
        let children: &'a [PartId] = match self.part().kind {
            PartKind::Multipart { ref children, .. } => children,
            PartKind::Leaf { .. } => &[],
        };
        children.iter().map(move |&id| PartRef { message, id })
    }
}

/// Decoded body data, produced on demand.
///
/// Raw input is decoded `chunk_size` bytes at a time as the iterator is
/// advanced; empty results are skipped. The concatenation of all chunks
/// equals `PartRef::decoded_bytes`. Once exhausted it stays exhausted.
pub struct BodyChunks<'a> {
    raw: &'a [u8],
    pos: usize,
    chunk_size: usize,
    decoder: TransferDecoder,
    finished: bool,
}

impl<'a> BodyChunks<'a> {
    fn new(raw: &'a [u8], decoder: TransferDecoder, chunk_size: usize) -> BodyChunks<'a> {
        BodyChunks {
            raw,
            pos: 0,
            chunk_size: cmp::max(chunk_size, 1),
            decoder,
            finished: false,
        }
    }
}

impl<'a> Iterator for BodyChunks<'a> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        while self.pos < self.raw.len() {
            let end = cmp::min(self.pos + self.chunk_size, self.raw.len());
            let mut out = Vec::with_capacity(end - self.pos);
            self.decoder.feed(&self.raw[self.pos..end], &mut out);
            self.pos = end;
            if !out.is_empty() {
                return Some(out);
            }
        }

        if self.finished {
            return None;
        }
        self.finished = true;

        let mut out = Vec::new();
        self.decoder.finish(&mut out);
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

/// A parsed message.
///
/// Owns the raw bytes; every part is a range into them. Index 0 of the part
/// arena is the message itself.
#[derive(Clone, Debug)]
pub struct MimeMessage {
    raw: Vec<u8>,
    parts: Vec<Part>,
    defects: Vec<ParsingError>,
    options: ParserOptions,
}

impl MimeMessage {
    /// Parse `data` into a MimeMessage.
    ///
    /// Parsing never fails: problems are recorded in `defects` and the
    /// affected piece is skipped or passed through.
    pub fn parse(data: &[u8]) -> MimeMessage {
        MimeMessage::parse_with_options(data, ParserOptions::default())
    }

    pub fn parse_with_options(data: &[u8], options: ParserOptions) -> MimeMessage {
        MimeMessage::from_bytes(data.to_vec(), options)
    }

    /// Read the whole of `reader` and parse it.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<MimeMessage, Error> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        Ok(MimeMessage::from_bytes(raw, ParserOptions::default()))
    }

    /// Read and parse the message stored in the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<MimeMessage, Error> {
        let raw = fs::read(path)?;
        Ok(MimeMessage::from_bytes(raw, ParserOptions::default()))
    }

    fn from_bytes(raw: Vec<u8>, options: ParserOptions) -> MimeMessage {
        let (parts, defects) = {
            let mut builder = PartBuilder {
                data: &raw,
                options: &options,
                parts: Vec::new(),
                defects: Vec::new(),
            };
            builder.parse_entity(0..raw.len(), 0);
            builder.check_root_headers();
            (builder.parts, builder.defects)
        };

        MimeMessage {
            raw,
            parts,
            defects,
            options,
        }
    }

    /// The complete message as it was read.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Get a reference to the headers for this message.
    pub fn headers(&self) -> &HeaderMap {
        &self.parts[0].headers
    }

    /// Everything that was skipped or passed through while parsing.
    pub fn defects(&self) -> &[ParsingError] {
        &self.defects
    }

    pub fn root(&self) -> PartRef {
        PartRef {
            message: self,
            id: PartId(0),
        }
    }

    pub fn part(&self, id: PartId) -> Option<PartRef> {
        if id.0 < self.parts.len() {
            Some(PartRef { message: self, id })
        } else {
            None
        }
    }

    /// All parts, depth first, the message itself first.
    pub fn parts(&self) -> impl Iterator<Item = PartRef<'_>> + '_ {
        (0..self.parts.len()).map(move |i| PartRef {
            message: self,
            id: PartId(i),
        })
    }

    pub fn from(&self) -> AddressList {
        self.address_header("From")
    }

    pub fn to(&self) -> AddressList {
        self.address_header("To")
    }

    pub fn cc(&self) -> AddressList {
        self.address_header("Cc")
    }

    pub fn bcc(&self) -> AddressList {
        self.address_header("Bcc")
    }

    /// Every mailbox of every `name` header, in order.
    fn address_header(&self, name: &str) -> AddressList {
        let mut list = AddressList::new();
        for header in self.headers().get_all(name) {
            let (addresses, _) = AddressParser::new(header.value())
                .decode_encoded_words(self.options.decode_encoded_words)
                .parse_address_list();
            list.extend(addresses);
        }
        list
    }

    pub fn subject(&self) -> Option<String> {
        self.headers().get("Subject").map(|header| {
            if self.options.decode_encoded_words {
                decode_unstructured(header.value())
            } else {
                header.value().to_string()
            }
        })
    }

    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        self.headers().get_value("Date")
    }

    pub fn message_id(&self) -> Option<String> {
        self.headers()
            .get("Message-Id")
            .and_then(|header| parse_message_id(header.value()))
    }

    pub fn references(&self) -> MessageIdList {
        self.headers()
            .get_value("References")
            .unwrap_or_default()
    }

    pub fn in_reply_to(&self) -> MessageIdList {
        self.headers()
            .get_value("In-Reply-To")
            .unwrap_or_default()
    }

    /// The part a simple reader would show.
    ///
    /// That is the message itself when it is not a multipart, or else its
    /// first child as long as that child is not a multipart itself.
    pub fn first_body_part(&self) -> Option<PartRef> {
        let root = self.root();
        if root.is_leaf() {
            return Some(root);
        }

        root.children().next().filter(PartRef::is_leaf)
    }

    pub fn first_body_part_decoded_bytes(&self) -> Option<Vec<u8>> {
        self.first_body_part().map(|part| part.decoded_bytes())
    }

    /// Like `first_body_part_decoded_bytes`, decoded lazily in chunks of
    /// `ParserOptions::chunk_size` raw bytes.
    pub fn first_body_part_chunks(&self) -> Option<BodyChunks> {
        let chunk_size = self.options.chunk_size;
        self.first_body_part().map(|part| part.chunks(chunk_size))
    }
}

/// Fills the part arena in one forward pass over the raw message.
struct PartBuilder<'a> {
    data: &'a [u8],
    options: &'a ParserOptions,
    parts: Vec<Part>,
    defects: Vec<ParsingError>,
}

impl<'a> PartBuilder<'a> {
    fn defect(&mut self, err: ParsingError) {
        warn!("{}", err);
        self.defects.push(err);
    }

    // Make a part from the entity in `range`, parsing out any multi-part
    // children that are discovered by looking at the Content-Type header.
    fn parse_entity(&mut self, range: Range<usize>, depth: usize) -> PartId {
        let (headers, body) = self.parse_headers(range, depth == 0);

        let content_type = match headers.get("Content-Type") {
            Some(header) => header.get_value().unwrap_or_else(|| {
                self.defect(ParsingError::InvalidHeader(header.to_string()));
                MimeContentTypeHeader::text_plain()
            }),
            None => MimeContentTypeHeader::text_plain(),
        };

        // Only consider a multipart message if we have a boundary, otherwise
        // don't bother and just assume it's a single message.
        let multipart = match (
            MimeMultipartType::from_content_type(&content_type.content_type),
            content_type.boundary(),
        ) {
            (Some(_), Some(_)) if depth >= self.options.max_depth => {
                warn!("Multipart nested deeper than {}, kept as a leaf", depth);
                None
            }
            (Some(multipart_type), Some(boundary)) => Some((multipart_type, boundary.to_string())),
            (Some(_), None) => {
                debug!("Multipart without a boundary, kept as a leaf");
                None
            }
            (None, _) => None,
        };

        let kind = match multipart {
            Some((multipart_type, ref boundary)) => PartKind::Multipart {
                multipart_type,
                boundary: boundary.clone(),
                children: Vec::new(),
            },
            None => {
                let transfer_encoding: MimeContentTransferEncoding = headers
                    .get_value("Content-Transfer-Encoding")
                    .unwrap_or_default();
                if let MimeContentTransferEncoding::Unknown(ref name) = transfer_encoding {
                    self.defect(ParsingError::UnsupportedEncoding(name.clone()));
                }
                PartKind::Leaf { transfer_encoding }
            }
        };

        let id = PartId(self.parts.len());
        self.parts.push(Part {
            headers,
            content_type,
            body: body.clone(),
            kind,
        });

        if let Some((_, boundary)) = multipart {
            let children: Vec<PartId> = split_boundary(self.data, body, &boundary)
                .into_iter()
                .map(|child| self.parse_entity(child, depth + 1))
                .collect();
            if let PartKind::Multipart {
                children: ref mut slot,
                ..
            } = self.parts[id.0].kind
            {
                *slot = children;
            }
        }

        id
    }

    /// Returns the headers and the body range of the entity in `range`.
    fn parse_headers(&mut self, range: Range<usize>, top_level: bool) -> (HeaderMap, Range<usize>) {
        let mut headers = HeaderMap::new();
        let mut lines = HeaderLines::new(self.data, range.clone());

        for line in &mut lines {
            match parse_header_line(&line.text) {
                Ok(header) => headers.insert(header),
                // A body part may start straight with its content
                Err(_) if !top_level && headers.is_empty() => {
                    return (headers, line.start..range.end);
                }
                Err(err) => self.defect(err),
            }
        }

        match lines.body_start() {
            Some(start) => (headers, start..range.end),
            None => {
                if top_level {
                    self.defect(ParsingError::MalformedMessage);
                } else {
                    debug!("Body part ends inside its headers");
                }
                (headers, range.end..range.end)
            }
        }
    }

    /// Record defects for the message headers that accessors decode later.
    fn check_root_headers(&mut self) {
        let mut errors = Vec::new();
        {
            let headers = &self.parts[0].headers;
            for &name in ADDRESS_HEADERS.iter() {
                for header in headers.get_all(name) {
                    let (_, mut errs) = AddressParser::new(header.value())
                        .decode_encoded_words(self.options.decode_encoded_words)
                        .parse_address_list();
                    errors.append(&mut errs);
                }
            }

            if let Some(header) = headers.get("Date") {
                if let Err(err) = Rfc822DateParser::new(header.value()).consume_datetime() {
                    errors.push(err);
                }
            }
        }

        for err in errors {
            self.defect(err);
        }
    }
}

/// Is `line` a delimiter for `boundary`? Returns `Some(true)` for the close
/// delimiter.
fn delimiter_kind(line: &[u8], boundary: &[u8]) -> Option<bool> {
    let rest = line.strip_prefix(b"--")?.strip_prefix(boundary)?;
    let (close, rest) = match rest.strip_prefix(b"--") {
        Some(rest) => (true, rest),
        None => (false, rest),
    };

    if rest.iter().all(|&b| b == b' ' || b == b'\t') {
        Some(close)
    } else {
        None
    }
}

#[derive(Clone, Copy)]
enum SplitState {
    SeekBoundary,
    InPart { start: usize, content_end: usize },
    Done,
}

/// Split the body in `range` on `boundary`, returning the range of each part.
///
/// The line break before a delimiter belongs to the delimiter. Preamble and
/// epilogue are dropped; without a close delimiter the last part runs to
/// the end of `range`.
fn split_boundary(data: &[u8], range: Range<usize>, boundary: &str) -> Vec<Range<usize>> {
    let boundary = boundary.as_bytes();
    let mut parts = Vec::new();
    let mut state = SplitState::SeekBoundary;

    for line in Lines::new(data, range.clone()) {
        let delimiter = delimiter_kind(&data[line.start..line.end], boundary);
        state = match (state, delimiter) {
            (SplitState::Done, _) => break,
            (SplitState::InPart { start, content_end }, Some(close)) => {
                parts.push(start..cmp::max(start, content_end));
                if close {
                    SplitState::Done
                } else {
                    SplitState::InPart {
                        start: line.next,
                        content_end: line.next,
                    }
                }
            }
            (SplitState::SeekBoundary, Some(close)) => {
                if close {
                    debug!("Close delimiter before any part");
                    SplitState::Done
                } else {
                    SplitState::InPart {
                        start: line.next,
                        content_end: line.next,
                    }
                }
            }
            (SplitState::InPart { start, .. }, None) => SplitState::InPart {
                start,
                content_end: line.end,
            },
            (SplitState::SeekBoundary, None) => SplitState::SeekBoundary,
        };
    }

    match state {
        SplitState::InPart { start, .. } => {
            debug!("Multipart body has no close delimiter");
            parts.push(start..range.end);
        }
        SplitState::SeekBoundary => debug!("Multipart body has no delimiter"),
        SplitState::Done => {}
    }

    parts
}


#[cfg(all(feature = "nightly", test))]
mod bench {
    extern crate test;

    use self::test::Bencher;

    use super::*;
    use crate::test_data;

    #[bench]
    fn bench_parse_multipart(b: &mut Bencher) {
        b.iter(|| MimeMessage::parse(test_data::ALTERNATIVE_BASE64));
    }

    #[bench]
    fn bench_first_body_part_chunks(b: &mut Bencher) {
        let message = MimeMessage::parse(test_data::ALTERNATIVE_BASE64);
        b.iter(|| {
            message
                .first_body_part_chunks()
                .map(|chunks| chunks.map(|chunk| chunk.len()).sum::<usize>())
        });
    }
}
