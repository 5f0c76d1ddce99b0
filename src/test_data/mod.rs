/// A two-part `multipart/alternative` message with a base64 text part, a
/// quoted-printable HTML part, folded headers and encoded words.
pub static ALTERNATIVE_BASE64: &[u8] = include_bytes!("alternative_base64.eml");

/// A reply with `In-Reply-To`/`References`, obsolete date syntax and a group
/// in `To`, using bare `\n` line endings.
pub static REPLY_UNIX_NEWLINES: &[u8] = include_bytes!("reply_unix_newlines.eml");
