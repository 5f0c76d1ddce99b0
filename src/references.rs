//! Message-id lists, as found in `References` and `In-Reply-To`.

use std::fmt;
use std::ops::Deref;
use std::vec;

use super::header::FromHeader;
use super::rfc5322::Rfc5322Parser;

/// Ordered message-ids with their angle brackets stripped.
///
/// Duplicates are kept.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MessageIdList {
    ids: Vec<String>,
}

impl MessageIdList {
    pub fn new() -> MessageIdList {
        MessageIdList::default()
    }

    /// Scan `value` left to right, collecting every `<...>` token.
    ///
    /// Whitespace, commas, comments and any text outside brackets are
    /// ignored. Whitespace inside the brackets is removed. An unterminated
    /// `<` ends the scan.
    pub fn parse(value: &str) -> MessageIdList {
        let mut ids = Vec::new();
        let mut p = Rfc5322Parser::new(value);

        loop {
            p.consume_cfws();
            match p.consume_char() {
                None => break,
                Some('<') => {
                    let id = p.consume_while(|c| c != '>');
                    if p.consume_char().is_none() {
                        break;
                    }
                    let id: String = id.chars().filter(|c| !c.is_whitespace()).collect();
                    if !id.is_empty() {
                        ids.push(id);
                    }
                }
                Some('"') => {
                    // Stray quoted text may hide a '<'
                    p.consume_while(|c| c != '"');
                    p.consume_char();
                }
                Some(_) => {}
            }
        }

        MessageIdList { ids }
    }

    pub fn into_vec(self) -> Vec<String> {
        self.ids
    }
}

/// Parse a single message-id, such as the value of `Message-Id`.
///
/// The first `<...>` token wins. A value without brackets is accepted as-is
/// when it is a single token, as some agents omit them.
pub fn parse_message_id(value: &str) -> Option<String> {
    if let Some(id) = MessageIdList::parse(value).ids.into_iter().next() {
        return Some(id);
    }

    let mut p = Rfc5322Parser::new(value);
    p.consume_cfws();
    let token = p.consume_while(|c| !c.is_whitespace() && c != '(' && c != '<' && c != '>');
    p.consume_cfws();
    if token.is_empty() || !p.eof() {
        None
    } else {
        Some(token.to_string())
    }
}

impl Deref for MessageIdList {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.ids
    }
}

impl IntoIterator for MessageIdList {
    type Item = String;
    type IntoIter = vec::IntoIter<String>;

    fn into_iter(self) -> vec::IntoIter<String> {
        self.ids.into_iter()
    }
}

impl fmt::Display for MessageIdList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.ids.join(","))
    }
}

impl FromHeader for MessageIdList {
    fn from_header(value: &str) -> Option<MessageIdList> {
        Some(MessageIdList::parse(value))
    }
}
