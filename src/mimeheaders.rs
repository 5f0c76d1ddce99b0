use std::collections::HashMap;
use std::fmt;

use super::header::FromHeader;
use super::rfc2045::{Rfc2045Parser, TransferDecoder};

/// Content-Type string, major/minor as the first and second elements
/// respectively. Both are lowercase.
pub type MimeContentType = (String, String);

/// Special header type for the Content-Type header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeContentTypeHeader {
    /// The content type presented by this header
    pub content_type: MimeContentType,
    /// Parameters of this header, keyed by lowercase name
    pub params: HashMap<String, String>,
}

impl MimeContentTypeHeader {
    /// The RFC 2045 default, `text/plain; charset=us-ascii`.
    pub fn text_plain() -> MimeContentTypeHeader {
        let mut params = HashMap::new();
        params.insert("charset".to_string(), "us-ascii".to_string());
        MimeContentTypeHeader {
            content_type: ("text".to_string(), "plain".to_string()),
            params,
        }
    }

    pub fn is_multipart(&self) -> bool {
        self.content_type.0 == "multipart"
    }

    pub fn boundary(&self) -> Option<&str> {
        self.params
            .get("boundary")
            .map(String::as_str)
            .filter(|b| !b.is_empty())
    }

    pub fn charset(&self) -> Option<&str> {
        self.params.get("charset").map(String::as_str)
    }
}

impl FromHeader for MimeContentTypeHeader {
    fn from_header(value: &str) -> Option<MimeContentTypeHeader> {
        let mut parser = Rfc2045Parser::new(value);
        let (value, params) = parser.consume_all();

        let mut mime_parts = value.splitn(2, '/');
        let major = mime_parts.next()?.trim();
        // Anything after the subtype token is a stray comment or junk
        let minor = mime_parts
            .next()?
            .trim()
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()?;

        if major.is_empty() || minor.is_empty() {
            return None;
        }

        Some(MimeContentTypeHeader {
            content_type: (major.to_ascii_lowercase(), minor.to_ascii_lowercase()),
            params,
        })
    }
}

impl fmt::Display for MimeContentTypeHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.content_type.0, self.content_type.1)
    }
}

/// Special header type for the Content-Transfer-Encoding header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimeContentTransferEncoding {
    /// Message content is not encoded in any way (`7bit`, `8bit`, `binary`
    /// or no header at all).
    Identity,
    /// Content transfered using the quoted-printable encoding.
    ///
    /// This encoding is defined in RFC 2045 Section 6.7
    QuotedPrintable,
    /// Content transfered as BASE64
    ///
    /// This encoding is defined in RFC 2045 Section 6.8
    Base64,
    /// An encoding this crate does not know. Content is passed through.
    Unknown(String),
}

impl MimeContentTransferEncoding {
    /// A fresh incremental decoder for this encoding.
    pub fn decoder(&self) -> TransferDecoder {
        match *self {
            MimeContentTransferEncoding::QuotedPrintable => TransferDecoder::quoted_printable(),
            MimeContentTransferEncoding::Base64 => TransferDecoder::base64(),
            MimeContentTransferEncoding::Identity | MimeContentTransferEncoding::Unknown(_) => {
                TransferDecoder::identity()
            }
        }
    }

    /// Decode the input with this transfer encoding.
    ///
    /// Identity and unknown encodings return a copy of the input.
    pub fn decode(&self, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(input.len());
        let mut decoder = self.decoder();
        decoder.feed(input, &mut out);
        decoder.finish(&mut out);
        out
    }
}

impl Default for MimeContentTransferEncoding {
    fn default() -> MimeContentTransferEncoding {
        MimeContentTransferEncoding::Identity
    }
}

impl FromHeader for MimeContentTransferEncoding {
    fn from_header(value: &str) -> Option<MimeContentTransferEncoding> {
        let lower = value.trim().to_ascii_lowercase();
        Some(match &lower[..] {
            "" | "7bit" | "8bit" | "binary" => MimeContentTransferEncoding::Identity,
            "quoted-printable" => MimeContentTransferEncoding::QuotedPrintable,
            "base64" => MimeContentTransferEncoding::Base64,
            _ => MimeContentTransferEncoding::Unknown(lower),
        })
    }
}
