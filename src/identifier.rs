//! Purchaser identifier validation.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Required length of a purchaser identifier.
pub const PURCHASER_ID_LEN: usize = 26;

/// Caller-supplied identifier scoping one purchase from one buyer.
///
/// Always exactly 26 ASCII hex characters. Case is preserved because the
/// identifier is mixed verbatim into the input hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PurchaserId(String);

impl PurchaserId {
    /// Validate and wrap a purchaser identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] unless `raw` is exactly 26 hex characters.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() != PURCHASER_ID_LEN {
            return Err(Error::Validation(format!(
                "identifierFromPurchaser must be {PURCHASER_ID_LEN} hex characters, got {}",
                raw.len()
            )));
        }
        if !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::Validation(format!(
                "identifierFromPurchaser contains non-hex characters: {raw}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PurchaserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PurchaserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PurchaserId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PurchaserId> for String {
    fn from(id: PurchaserId) -> Self {
        id.0
    }
}

/// Require a non-empty identifier field.
pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Require a non-empty hex field (wallet verification keys).
pub(crate) fn require_hex(field: &str, value: &str) -> Result<()> {
    require_non_empty(field, value)?;
    if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::Validation(format!("{field} must be hex encoded")));
    }
    Ok(())
}
