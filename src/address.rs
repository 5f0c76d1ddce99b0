use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::vec;

use log::debug;

use super::header::FromHeader;
use super::results::ParsingError;
use super::rfc5322::{Rfc5322Character, Rfc5322Parser};

/// Represents an RFC 5322 mailbox
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox {
    /// The given name for this mailbox, with encoded words decoded
    pub name: Option<String>,
    /// The address-spec, `local-part@domain`
    pub address: String,
}

impl Mailbox {
    /// Create a new Mailbox without a name
    pub fn new(address: String) -> Mailbox {
        Mailbox {
            name: None,
            address,
        }
    }

    /// Create a new Mailbox with a name
    pub fn new_with_name(name: String, address: String) -> Mailbox {
        Mailbox {
            name: Some(name),
            address,
        }
    }

    pub fn local_part(&self) -> &str {
        self.address
            .rsplit_once('@')
            .map_or(&self.address[..], |(local, _)| local)
    }

    pub fn domain(&self) -> &str {
        self.address
            .rsplit_once('@')
            .map_or("", |(_, domain)| domain)
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self.name {
            Some(ref name) if name.chars().all(|c| c.is_atext() || c == ' ') => {
                write!(fmt, "{} <{}>", name, self.address)
            }
            Some(ref name) => {
                fmt.write_str("\"")?;
                for c in name.chars() {
                    if c == '"' || c == '\\' {
                        fmt.write_str("\\")?;
                    }
                    write!(fmt, "{}", c)?;
                }
                write!(fmt, "\" <{}>", self.address)
            }
            None => fmt.write_str(&self.address),
        }
    }
}

impl FromStr for Mailbox {
    type Err = ParsingError;

    fn from_str(s: &str) -> Result<Mailbox, ParsingError> {
        let mut parser = AddressParser::new(s);
        let mailbox = parser.parse_mailbox();
        parser.p.consume_cfws();
        match mailbox {
            Some(mailbox) if parser.p.eof() => Ok(mailbox),
            _ => Err(ParsingError::InvalidAddress(s.to_string())),
        }
    }
}

/// An ordered list of mailboxes, as found in `From`, `To`, `Cc` and `Bcc`.
///
/// Groups are flattened into their members.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AddressList {
    mailboxes: Vec<Mailbox>,
}

impl AddressList {
    pub fn new() -> AddressList {
        AddressList::default()
    }

    /// Parse a header value, skipping malformed entries.
    pub fn parse(value: &str) -> AddressList {
        AddressParser::new(value).parse_address_list().0
    }

    pub fn push(&mut self, mailbox: Mailbox) {
        self.mailboxes.push(mailbox);
    }

    pub fn into_vec(self) -> Vec<Mailbox> {
        self.mailboxes
    }
}

impl Deref for AddressList {
    type Target = [Mailbox];

    fn deref(&self) -> &[Mailbox] {
        &self.mailboxes
    }
}

impl IntoIterator for AddressList {
    type Item = Mailbox;
    type IntoIter = vec::IntoIter<Mailbox>;

    fn into_iter(self) -> vec::IntoIter<Mailbox> {
        self.mailboxes.into_iter()
    }
}

impl Extend<Mailbox> for AddressList {
    fn extend<T: IntoIterator<Item = Mailbox>>(&mut self, iter: T) {
        self.mailboxes.extend(iter);
    }
}

impl From<Vec<Mailbox>> for AddressList {
    fn from(mailboxes: Vec<Mailbox>) -> AddressList {
        AddressList { mailboxes }
    }
}

impl fmt::Display for AddressList {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        for (i, mailbox) in self.mailboxes.iter().enumerate() {
            if i > 0 {
                fmt.write_str(", ")?;
            }
            write!(fmt, "{}", mailbox)?;
        }
        Ok(())
    }
}

impl FromHeader for AddressList {
    fn from_header(value: &str) -> Option<AddressList> {
        Some(AddressList::parse(value))
    }
}

/// Parser for the `address-list` grammar of RFC 5322 Section 3.4.
pub struct AddressParser<'s> {
    p: Rfc5322Parser<'s>,
}

impl<'s> AddressParser<'s> {
    pub fn new(s: &'s str) -> AddressParser<'s> {
        AddressParser {
            p: Rfc5322Parser::new(s),
        }
    }

    /// Controls whether encoded words in display names are decoded.
    pub fn decode_encoded_words(mut self, decode: bool) -> AddressParser<'s> {
        self.p.set_decode_encoded_words(decode);
        self
    }

    /// Parse the whole input as an address list.
    ///
    /// Entries that cannot be parsed are skipped up to the next `,` and
    /// reported as `InvalidAddress`; the rest of the list still parses.
    pub fn parse_address_list(&mut self) -> (AddressList, Vec<ParsingError>) {
        let mut list = AddressList::new();
        let mut errors = Vec::new();

        loop {
            self.skip_separators();
            if self.p.eof() {
                break;
            }
            // Some agents separate mailboxes with ';'
            if self.p.peek() == Some(';') {
                self.p.consume_char();
                continue;
            }

            let start = self.p.position();
            if !self.parse_address(&mut list) {
                self.skip_entry();
                let raw = self.p.slice_from(start).trim();
                debug!("Skipping invalid address {:?}", raw);
                errors.push(ParsingError::InvalidAddress(raw.to_string()));
            }
        }

        (list, errors)
    }

    /// `address = mailbox / group`
    fn parse_address(&mut self, list: &mut AddressList) -> bool {
        self.p.push_position();
        let display_name = self.p.consume_phrase(false);
        self.p.consume_cfws();

        if display_name.is_some() && self.p.peek() == Some(':') {
            self.p.commit_position();
            self.p.consume_char();
            return self.parse_group_members(list);
        }

        self.p.pop_position();
        match self.parse_mailbox() {
            Some(mailbox) if self.at_entry_end() => {
                list.push(mailbox);
                true
            }
            _ => false,
        }
    }

    /// `group = display-name ":" [group-list] ";" [CFWS]`
    ///
    /// Members are added to `list`; the group name is dropped. Invalid
    /// members make the whole group count as one invalid entry, but the
    /// valid members are kept.
    fn parse_group_members(&mut self, list: &mut AddressList) -> bool {
        let mut valid = true;
        loop {
            self.skip_separators();
            match self.p.peek() {
                None => return valid,
                Some(';') => {
                    self.p.consume_char();
                    self.p.consume_cfws();
                    return valid;
                }
                _ => {}
            }

            match self.parse_mailbox() {
                Some(mailbox) if self.at_entry_end() => list.push(mailbox),
                _ => {
                    valid = false;
                    self.p.consume_while(|c| c != ',' && c != ';');
                }
            }
        }
    }

    /// `mailbox = name-addr / addr-spec`
    pub fn parse_mailbox(&mut self) -> Option<Mailbox> {
        // Push the current position of the parser so we can back out later
        self.p.push_position();
        if let Some(mailbox) = self.parse_name_addr() {
            self.p.commit_position();
            return Some(mailbox);
        }
        // Revert back to our original position to try to parse an addr-spec
        self.p.pop_position();

        self.p.push_position();
        match self.parse_addr_spec() {
            Some(addr_spec) => {
                self.p.commit_position();
                self.p.consume_cfws();
                Some(Mailbox::new(addr_spec))
            }
            None => {
                self.p.pop_position();
                None
            }
        }
    }

    /// `name-addr = [display-name] angle-addr`
    fn parse_name_addr(&mut self) -> Option<Mailbox> {
        let display_name = self.p.consume_phrase(false);
        self.p.consume_cfws();
        if self.p.peek() != Some('<') {
            return None;
        }
        self.p.consume_char();
        self.p.consume_cfws();
        self.skip_obs_route();

        let addr = self.parse_addr_spec()?;
        self.p.consume_cfws();
        if self.p.consume_char() != Some('>') {
            // Fail because we should have a closing RANGLE here (to match the opening one)
            return None;
        }
        self.p.consume_cfws();

        Some(match display_name {
            Some(name) => Mailbox::new_with_name(name, addr),
            None => Mailbox::new(addr),
        })
    }

    /// `addr-spec = local-part "@" domain`
    fn parse_addr_spec(&mut self) -> Option<String> {
        let local_part = self.parse_local_part()?;
        self.p.consume_cfws();
        if self.p.consume_char() != Some('@') {
            return None;
        }
        self.p.consume_cfws();
        let domain = self.parse_domain()?;
        Some(format!("{}@{}", local_part, domain))
    }

    /// `local-part = dot-atom / quoted-string / obs-local-part`
    fn parse_local_part(&mut self) -> Option<String> {
        let mut local_part = String::new();
        loop {
            self.p.consume_cfws();
            match self.p.peek() {
                Some('"') => {
                    let quoted = self.p.consume_quoted_string()?;
                    if quoted.chars().all(|c| c.is_atext()) && !quoted.is_empty() {
                        local_part.push_str(&quoted);
                    } else {
                        local_part.push('"');
                        for c in quoted.chars() {
                            if c == '"' || c == '\\' {
                                local_part.push('\\');
                            }
                            local_part.push(c);
                        }
                        local_part.push('"');
                    }
                }
                Some(c) if c.is_atext() => local_part.push_str(self.p.consume_atom(false)?),
                _ => return None,
            }

            self.p.push_position();
            self.p.consume_cfws();
            if self.p.peek() == Some('.') {
                self.p.commit_position();
                self.p.consume_char();
                local_part.push('.');
            } else {
                self.p.pop_position();
                break;
            }
        }
        Some(local_part)
    }

    /// `domain = dot-atom / domain-literal / obs-domain`
    fn parse_domain(&mut self) -> Option<String> {
        if let Some(literal) = self.p.consume_domain_literal() {
            return Some(literal.to_string());
        }

        let domain = self.p.consume_atom(true)?;
        if domain.starts_with('.') || domain.ends_with('.') {
            return None;
        }
        Some(domain.to_string())
    }

    /// `obs-route = obs-domain-list ":"`, which is ignored
    fn skip_obs_route(&mut self) {
        if self.p.peek() != Some('@') {
            return;
        }
        self.p.push_position();
        self.p.consume_while(|c| c != ':' && c != '>');
        if self.p.peek() == Some(':') {
            self.p.commit_position();
            self.p.consume_char();
            self.p.consume_cfws();
        } else {
            self.p.pop_position();
        }
    }

    fn at_entry_end(&self) -> bool {
        matches!(self.p.peek(), None | Some(',') | Some(';'))
    }

    fn skip_separators(&mut self) {
        loop {
            self.p.consume_cfws();
            if self.p.peek() == Some(',') {
                self.p.consume_char();
            } else {
                break;
            }
        }
    }

    /// Skip the rest of a malformed entry, honoring quotes and comments so a
    /// `,` inside them does not end it early.
    fn skip_entry(&mut self) {
        while let Some(c) = self.p.peek() {
            match c {
                ',' => break,
                '"' => {
                    if self.p.consume_quoted_string().is_none() {
                        break;
                    }
                }
                '(' => self.p.consume_comment(),
                _ => {
                    self.p.consume_char();
                }
            }
        }
    }
}
