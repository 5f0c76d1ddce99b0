//! Module with helpers for dealing with RFC 5322

use std::borrow::Cow;
use std::iter::Peekable;
use std::ops::Range;

use super::header::Header;
use super::results::{ParsingError, ParsingResult};
use super::rfc2047::decode_rfc2047;

pub(crate) trait Rfc5322Character {
    /// Is considered a special character by RFC 5322 Section 3.2.3
    fn is_special(&self) -> bool;
    /// Is considered to be a VCHAR by RFC 5234 Appendix B.1, widened to all
    /// non-ASCII characters by RFC 6532
    fn is_vchar(&self) -> bool;
    /// Is considered to be field text as defined by RFC 5322 Section 3.6.8
    fn is_ftext(&self) -> bool;

    fn is_atext(&self) -> bool {
        self.is_vchar() && !self.is_special()
    }
}

impl Rfc5322Character for char {
    fn is_ftext(&self) -> bool {
        matches!(*self, '!'..='9' | ';'..='~')
    }

    fn is_special(&self) -> bool {
        matches!(
            *self,
            '(' | ')' | '<' | '>' | '[' | ']' | ':' | ';' | '@' | '\\' | ',' | '.' | '"' | ' '
        )
    }

    fn is_vchar(&self) -> bool {
        matches!(*self, '!'..='~') || !self.is_ascii()
    }
}

/// RFC 5322 base parser for parsing
///  `atom`, `dot-atom`, `quoted-string`, `phrase` and `CFWS`
/// out of an already unfolded header value.
///
/// It also implements a stack for tracking the position.
/// This allows the simple implementation of backtracking, by pushing the position
/// before a test and popping it if the test should fail.
pub struct Rfc5322Parser<'s> {
    s: &'s str,
    pos: usize,
    pos_stack: Vec<usize>,
    decode_words: bool,
}

impl<'s> Rfc5322Parser<'s> {
    /// Make a new parser, initialized with the given string.
    pub fn new(source: &'s str) -> Rfc5322Parser<'s> {
        Rfc5322Parser {
            s: source,
            pos: 0,
            pos_stack: Vec::new(),
            decode_words: true,
        }
    }

    /// Controls whether RFC 2047 encoded words in phrases are decoded.
    pub fn set_decode_encoded_words(&mut self, decode: bool) {
        self.decode_words = decode;
    }

    /// Push the current position onto the stack.
    pub fn push_position(&mut self) {
        self.pos_stack.push(self.pos);
    }

    /// Move the position back to the last entry pushed
    pub fn pop_position(&mut self) {
        if let Some(pos) = self.pos_stack.pop() {
            self.pos = pos;
        }
    }

    /// Forget the last entry pushed, keeping the current position.
    pub fn commit_position(&mut self) {
        self.pos_stack.pop();
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// The input between `start` and the current position.
    pub fn slice_from(&self, start: usize) -> &'s str {
        &self.s[start..self.pos]
    }

    /// Consume comments and whitespace (`CFWS`).
    ///
    /// Returns true if anything was consumed.
    pub fn consume_cfws(&mut self) -> bool {
        let start = self.pos;
        loop {
            self.consume_while(|c| c.is_whitespace());
            if self.peek() == Some('(') {
                self.consume_comment();
            } else {
                break;
            }
        }
        self.pos != start
    }

    /// Consume a (possibly nested) comment, discarding its content.
    ///
    /// An unterminated comment runs to the end of the input. Nothing is
    /// consumed unless the input is at a `(`.
    pub fn consume_comment(&mut self) {
        if self.peek() != Some('(') {
            return;
        }
        let mut depth = 0usize;
        while let Some(c) = self.consume_char() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                '\\' => {
                    self.consume_char();
                }
                _ => {}
            }
            if depth == 0 {
                break;
            }
        }
    }

    /// Consume a word from the input.
    ///
    /// A word is defined as:
    ///
    /// `word = atom / quoted-string`
    ///
    /// If `allow_dot_atom` is true, then `atom` can be a `dot-atom`.
    pub fn consume_word(&mut self, allow_dot_atom: bool) -> Option<String> {
        match self.peek() {
            Some('"') => self.consume_quoted_string(),
            Some(c) if c.is_atext() => self.consume_atom(allow_dot_atom).map(str::to_string),
            _ => None,
        }
    }

    /// Consume a phrase from the input.
    ///
    /// A phrase is defined as:
    ///
    /// `phrase = 1*word / obs-phrase`
    ///
    /// Words are joined with a single space wherever the input separated
    /// them, and the unquoted `.` of `obs-phrase` is accepted. Encoded words
    /// are decoded, and the space between two adjacent ones is dropped.
    pub fn consume_phrase(&mut self, allow_dot_atom: bool) -> Option<String> {
        let mut phrase = String::new();
        let mut last_encoded = false;

        loop {
            self.push_position();
            let spaced = self.consume_cfws();
            let raw = match self.peek() {
                Some('"') => self.consume_quoted_string(),
                Some(c) if c.is_atext() => {
                    self.consume_atom(allow_dot_atom).map(str::to_string)
                }
                Some('.') if !phrase.is_empty() => {
                    self.consume_char();
                    Some(".".to_string())
                }
                _ => None,
            };

            let raw = match raw {
                Some(raw) => raw,
                None => {
                    // Leave trailing CFWS for the caller
                    self.pop_position();
                    break;
                }
            };
            self.commit_position();

            let decoded = if self.decode_words && raw.starts_with("=?") && raw.ends_with("?=") {
                decode_rfc2047(&raw)
            } else {
                None
            };

            let encoded = decoded.is_some();
            if spaced && !phrase.is_empty() && !(encoded && last_encoded) {
                phrase.push(' ');
            }
            phrase.push_str(decoded.as_deref().unwrap_or(&raw));
            last_encoded = encoded;
        }

        if phrase.is_empty() {
            None
        } else {
            Some(phrase)
        }
    }

    /// Consume a quoted string from the input
    pub fn consume_quoted_string(&mut self) -> Option<String> {
        if self.peek() != Some('"') {
            return None;
        }

        let mut quoted_string = String::new();
        let mut inside_escape = false;
        // Consume the leading "
        self.consume_char();
        while let Some(c) = self.consume_char() {
            match c {
                '\\' if !inside_escape => inside_escape = true,
                '"' if !inside_escape => return Some(quoted_string),
                _ => {
                    quoted_string.push(c);
                    inside_escape = false;
                }
            }
        }

        // Ran out of input before the closing quote
        None
    }

    /// Consume an atom from the input.
    ///
    /// If `allow_dot` is true, then also allow '.' to be considered as an
    /// atext character.
    pub fn consume_atom(&mut self, allow_dot: bool) -> Option<&'s str> {
        match self.peek() {
            Some(c) if c.is_atext() => {
                Some(self.consume_while(|c| c.is_atext() || (allow_dot && c == '.')))
            }
            _ => None,
        }
    }

    /// Consume a `domain-literal` such as `[192.0.2.1]`, brackets included.
    pub fn consume_domain_literal(&mut self) -> Option<&'s str> {
        if self.peek() != Some('[') {
            return None;
        }
        let start = self.pos;
        self.push_position();
        self.consume_char();
        self.consume_while(|c| c != ']' && c != '[' && c != '\\');
        if self.peek() == Some(']') {
            self.consume_char();
            self.commit_position();
            Some(self.slice_from(start))
        } else {
            self.pop_position();
            None
        }
    }

    /// Consume LWSP (Linear whitespace)
    pub fn consume_linear_whitespace(&mut self) {
        self.consume_while(|c| c == '\t' || c == ' ');
    }

    /// Consume a single character from the input.
    #[inline]
    pub fn consume_char(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Consume a set of characters, each passed to `test` until this function
    /// returns false.
    ///
    /// The position after calling this function will be pointing to the character
    /// which caused a false result from `test`.
    ///
    /// Returns the string of characters that returned true for the test function.
    #[inline]
    pub fn consume_while<F: FnMut(char) -> bool>(&mut self, mut test: F) -> &'s str {
        let start_pos = self.pos;
        while let Some(c) = self.peek() {
            if !test(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.s[start_pos..self.pos]
    }

    /// Peek at the current character.
    #[inline]
    pub fn peek(&self) -> Option<char> {
        self.s[self.pos..].chars().next()
    }

    /// Returns true if we have reached the end of the input.
    #[inline]
    pub fn eof(&self) -> bool {
        self.pos >= self.s.len()
    }
}

/// One physical line inside a buffer.
///
/// All offsets are absolute positions in the buffer. `end` excludes the line
/// terminator (`\r\n` or a bare `\n`), `next` is where the following line
/// starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Line {
    pub start: usize,
    pub end: usize,
    pub next: usize,
}

impl Line {
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Iterator over the physical lines of a byte range.
pub struct Lines<'a> {
    data: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> Lines<'a> {
    pub fn new(data: &'a [u8], range: Range<usize>) -> Lines<'a> {
        Lines {
            data,
            pos: range.start,
            limit: range.end.min(data.len()),
        }
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = Line;

    fn next(&mut self) -> Option<Line> {
        if self.pos >= self.limit {
            return None;
        }

        let start = self.pos;
        let line = match self.data[start..self.limit].iter().position(|&b| b == b'\n') {
            Some(i) => {
                let newline = start + i;
                let end = if newline > start && self.data[newline - 1] == b'\r' {
                    newline - 1
                } else {
                    newline
                };
                Line {
                    start,
                    end,
                    next: newline + 1,
                }
            }
            None => Line {
                start,
                end: self.limit,
                next: self.limit,
            },
        };

        self.pos = line.next;
        Some(line)
    }
}

/// A logical header line: a physical line plus its continuation lines, with
/// the line breaks between them removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderLine<'a> {
    /// Offset of the first physical line.
    pub start: usize,
    pub text: Cow<'a, [u8]>,
}

/// Lazy reader for the header block of an entity.
///
/// Yields logical header lines until the first blank line. Once exhausted,
/// `body_start` tells where the body begins, or `None` when the input ended
/// without a blank line.
pub struct HeaderLines<'a> {
    data: &'a [u8],
    lines: Peekable<Lines<'a>>,
    body_start: Option<usize>,
    finished: bool,
}

impl<'a> HeaderLines<'a> {
    pub fn new(data: &'a [u8], range: Range<usize>) -> HeaderLines<'a> {
        HeaderLines {
            data,
            lines: Lines::new(data, range).peekable(),
            body_start: None,
            finished: false,
        }
    }

    pub fn body_start(&self) -> Option<usize> {
        self.body_start
    }
}

impl<'a> Iterator for HeaderLines<'a> {
    type Item = HeaderLine<'a>;

    fn next(&mut self) -> Option<HeaderLine<'a>> {
        if self.finished {
            return None;
        }

        let first = match self.lines.next() {
            Some(line) => line,
            None => {
                self.finished = true;
                return None;
            }
        };

        if first.is_empty() {
            self.finished = true;
            self.body_start = Some(first.next);
            return None;
        }

        let mut text = Cow::Borrowed(&self.data[first.start..first.end]);
        while let Some(&cont) = self.lines.peek() {
            match self.data.get(cont.start) {
                Some(b' ') | Some(b'\t') if !cont.is_empty() => {}
                _ => break,
            }
            text.to_mut().extend_from_slice(&self.data[cont.start..cont.end]);
            self.lines.next();
        }

        Some(HeaderLine {
            start: first.start,
            text,
        })
    }
}

/// Split a logical header line into a `Header`.
///
/// A header is defined as:
///
/// `ftext = "!".."9" / ";".."~"
/// field-name = 1*ftext
/// field = field-name *LWSP ":" unstructured`
pub fn parse_header_line(line: &[u8]) -> ParsingResult<Header> {
    let invalid = || ParsingError::InvalidHeader(String::from_utf8_lossy(line).into_owned());

    let colon = line.iter().position(|&b| b == b':').ok_or_else(invalid)?;
    let name = String::from_utf8_lossy(&line[..colon]);
    let name = name.trim_end_matches(|c| c == ' ' || c == '\t');
    if name.is_empty() || !name.chars().all(|c| c.is_ftext()) {
        return Err(invalid());
    }

    let value = String::from_utf8_lossy(&line[colon + 1..]);
    Ok(Header::new(name.to_string(), value.trim().to_string()))
}
