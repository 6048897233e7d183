//! URL encoding of request parameters.

use std::borrow::Cow;
use std::fmt::Write as _;

use url::Url;

/// Percent-encode `input` as UTF-8.
///
/// Everything except ASCII alphanumerics and `-._~` is escaped, so a space
/// becomes `%20` rather than `+`.
#[must_use]
pub fn url_encode(input: &str) -> Cow<'_, str> {
    urlencoding::encode(input)
}

/// Decode a percent-encoded UTF-8 string, treating `+` as a space.
///
/// Malformed input is returned unchanged.
#[must_use]
pub fn url_decode(input: &str) -> String {
    let spaced = input.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => input.to_owned(),
    }
}

/// Ordered parameter list with unique names; re-adding a name replaces its value
/// in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Params(Vec<(String, String)>);

impl Params {
    pub(crate) fn set(&mut self, name: String, value: String) {
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// `name=value` pairs joined by `&`, or `None` when no parameter was added
    pub(crate) fn encode(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        let mut out = String::new();
        for (name, value) in &self.0 {
            if !out.is_empty() {
                out.push('&');
            }
            let _ = write!(out, "{}={}", url_encode(name), url_encode(value));
        }
        Some(out)
    }
}

/// Append an already-encoded query to `url`, keeping any query it carries.
pub(crate) fn append_query(url: &mut Url, encoded: &str) {
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
        _ => encoded.to_owned(),
    };
    url.set_query(Some(&query));
}
