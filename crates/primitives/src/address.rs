//! Transport locators.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A transport-layer locator of the form `scheme://location`.
///
/// The scheme selects which edge listener may dial the address; the
/// location part is opaque to everything above the transport.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    scheme: String,
    location: String,
}

/// Error parsing an [`Address`] from its string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("address {0:?} has no scheme separator")]
    MissingSeparator(String),
    #[error("address {0:?} has an empty scheme")]
    EmptyScheme(String),
}

impl Address {
    pub fn new(scheme: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            location: location.into(),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, location) = s
            .split_once("://")
            .ok_or_else(|| AddressParseError::MissingSeparator(s.to_string()))?;
        if scheme.is_empty() {
            return Err(AddressParseError::EmptyScheme(s.to_string()));
        }
        Ok(Self::new(scheme, location))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.location)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}
