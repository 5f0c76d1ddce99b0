//! A lenient decoder for RFC 5322 / MIME email messages.
//!
//! `MimeMessage::parse` never fails on malformed input. Anything it has to
//! skip or pass through is recorded as a defect, see `MimeMessage::defects`.

#![cfg_attr(all(feature = "nightly", test), feature(test))]

pub use address::{AddressList, AddressParser, Mailbox};
pub use header::{FromHeader, Header, HeaderMap};
pub use message::{
    BodyChunks, MimeMessage, MimeMultipartType, ParserOptions, Part, PartId, PartKind, PartRef,
};
pub use references::{parse_message_id, MessageIdList};
pub use results::{Error, ParsingError, ParsingResult};

pub mod mimeheaders;
pub mod results;
pub mod rfc2045;
pub mod rfc2047;
pub mod rfc5322;
pub mod rfc822;
mod address;
mod header;
mod message;
mod references;

#[cfg(test)]
mod test_data;
