//! Target descriptors.

use std::{collections::BTreeMap, fmt, str::FromStr};

use url::Url;

use crate::TransportError;

/// URL-like descriptor of a connection target, e.g. `ssh://user@host:22`.
///
/// The scheme selects the transport; query parameters carry
/// transport-specific options (`ssh://host?key_files=/home/me/id.pem`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    url: Url,
}

impl TargetDescriptor {
    /// Parse a descriptor.
    ///
    /// # Errors
    /// Returns `InvalidTarget` if the text is not a URL.
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        let url = Url::parse(text.trim())
            .map_err(|e| TransportError::InvalidTarget(format!("{text}: {e}")))?;
        Ok(Self { url })
    }

    /// Scheme, which names the backend kind.
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host component, absent when empty.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        self.url.host_str().filter(|h| !h.is_empty())
    }

    /// User name, absent when empty.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        Some(self.url.username()).filter(|u| !u.is_empty())
    }

    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.url.password()
    }

    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.url.port()
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Transport-specific options from the query string.
    #[must_use]
    pub fn options(&self) -> BTreeMap<String, String> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Get a single option.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// The descriptor with any password removed, safe for display.
    #[must_use]
    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        if url.password().is_some() {
            // Only fails for URLs that cannot carry credentials at all.
            let _ = url.set_password(None);
        }
        url.to_string()
    }

    /// Full descriptor including credentials.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl FromStr for TargetDescriptor {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}
