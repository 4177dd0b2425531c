use std::collections::BTreeMap;
use std::fmt;

/// One candidate set of storefront cookies and where it came from.
///
/// Values are redacted in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialSet {
    source: String,
    content: BTreeMap<String, String>,
}

impl CredentialSet {
    /// Creates a credential set from a provenance label and cookie map.
    #[must_use]
    pub fn new(source: impl Into<String>, content: BTreeMap<String, String>) -> Self {
        Self {
            source: source.into(),
            content,
        }
    }

    /// Human readable provenance (file path or browser profile).
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Number of cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether the set holds no cookie at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Cookie value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.content.get(name).map(String::as_str)
    }

    /// Renders the set as a `Cookie` request header value.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        self.content
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("source", &self.source)
            .field("names", &self.content.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
