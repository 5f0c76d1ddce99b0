use std::collections::HashMap;
use std::fmt;
use std::slice::Iter;

/// Trait for converting from RFC 5322 Header values into
/// Rust types.
pub trait FromHeader: Sized {
    /// Parse the `value` of the header.
    ///
    /// Returns None if the value failed to be parsed
    fn from_header(value: &str) -> Option<Self>;
}

impl FromHeader for String {
    fn from_header(value: &str) -> Option<String> {
        Some(value.to_string())
    }
}

/// Represents an RFC 5322 Header
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct Header {
    /// The name of this header, as it appeared in the message
    pub name: String,
    value: String,
}

impl Header {
    /// Creates a new Header for the given `name` and `value`
    pub fn new(name: String, value: String) -> Header {
        Header { name, value }
    }

    /// The unfolded, trimmed value of this header
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Get the value represented by this header, as parsed
    /// into whichever type `T`
    pub fn get_value<T: FromHeader>(&self) -> Option<T> {
        T::from_header(&self.value)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}: {}", self.name, self.value)
    }
}

/// A collection of Headers.
///
/// Lookup by name is case-insensitive. Headers keep the order they were
/// inserted in, both overall and among headers sharing a name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeaderMap {
    headers: Vec<Header>,
    by_name: HashMap<String, Vec<usize>>,
}

impl HeaderMap {
    pub fn new() -> HeaderMap {
        HeaderMap::default()
    }

    /// Adds a header to the collection
    pub fn insert(&mut self, header: Header) {
        self.by_name
            .entry(header.name.to_ascii_lowercase())
            .or_insert_with(Vec::new)
            .push(self.headers.len());
        self.headers.push(header);
    }

    /// Get an Iterator over the collection of headers, in insertion order.
    pub fn iter(&self) -> Iter<Header> {
        self.headers.iter()
    }

    /// Get the first header called `name`
    pub fn get(&self, name: &str) -> Option<&Header> {
        self.get_all(name).next()
    }

    /// Get every header called `name`, in the order they appeared
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Header> + 'a {
        let indices = self
            .by_name
            .get(&name.to_ascii_lowercase())
            .map(|v| &v[..])
            .unwrap_or(&[]);
        indices.iter().map(move |&i| &self.headers[i])
    }

    /// Parse the first header called `name` into `T`
    pub fn get_value<T: FromHeader>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(Header::get_value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = &'a Header;
    type IntoIter = Iter<'a, Header>;

    fn into_iter(self) -> Iter<'a, Header> {
        self.iter()
    }
}

impl fmt::Display for HeaderMap {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        for header in self.iter() {
            write!(fmt, "{}\r\n", header)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static SAMPLE_HEADERS: [(&str, &str); 4] = [
        ("Test", "Value"),
        ("Test", "Value 2"),
        ("Test-2", "Value 3"),
        ("Test-Multiline", "Foo Bar"),
    ];

    fn make_sample_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        for &(name, value) in SAMPLE_HEADERS.iter() {
            headers.insert(Header::new(name.to_string(), value.to_string()));
        }
        headers
    }

    #[test]
    fn test_header_to_string() {
        let header = Header::new("Test".to_string(), "Value".to_string());
        assert_eq!(header.to_string(), "Test: Value");
    }

    #[test]
    fn test_string_get_value() {
        let header = Header::new("Test".to_string(), "Value".to_string());
        let string_value: String = header.get_value().unwrap();
        assert_eq!(string_value, "Value");
    }

    #[test]
    fn test_header_map_len() {
        let mut headers = HeaderMap::new();
        assert!(headers.is_empty());
        for (i, &(name, value)) in SAMPLE_HEADERS.iter().enumerate() {
            headers.insert(Header::new(name.to_string(), value.to_string()));
            assert_eq!(headers.len(), i + 1);
        }
    }

    #[test]
    fn test_header_map_iter_keeps_order() {
        let headers = make_sample_headers();
        let given: Vec<(&str, &str)> = headers
            .iter()
            .map(|h| (&h.name[..], h.value()))
            .collect();
        assert_eq!(given, SAMPLE_HEADERS.to_vec());
    }

    #[test]
    fn test_header_map_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(Header::new("Subject".to_string(), "Hi".to_string()));

        for name in &["Subject", "SUBJECT", "subject", "sUbJeCt"] {
            assert!(headers.contains(name));
            assert_eq!(headers.get(name).map(Header::value), Some("Hi"));
        }
        assert!(headers.get("Subjects").is_none());
    }

    #[test]
    fn test_header_map_duplicates() {
        let headers = make_sample_headers();
        let values: Vec<&str> = headers.get_all("test").map(Header::value).collect();
        assert_eq!(values, vec!["Value", "Value 2"]);
        assert_eq!(headers.get("TEST").map(Header::value), Some("Value"));
        assert_eq!(headers.get_all("missing").count(), 0);
    }

    #[test]
    fn test_header_map_string() {
        let result = make_sample_headers().to_string();
        assert_eq!(
            result,
            "Test: Value\r\nTest: Value 2\r\nTest-2: Value 3\r\nTest-Multiline: Foo Bar\r\n"
        );
    }
}
