//! Integrity hashes binding off-chain payloads to the escrow record.
//!
//! The escrow record only ever carries digests. The raw input and output
//! payloads travel out of band, and the counterparty verifies them later by
//! recomputing the digest:
//!
//! - input hash: `SHA-256(purchaser_id ++ ";" ++ canonical_json(input))`
//! - output hash: `SHA-256(canonical_json(output))`
//!
//! All functions here are pure and can be called from any number of tasks.

mod canonical;

use crate::error::{Error, Result};
use crate::identifier::PurchaserId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Size of an integrity digest in bytes.
pub const HASH_LEN: usize = 32;

/// SHA-256 digest over a canonicalized payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IntegrityHash([u8; HASH_LEN]);

impl IntegrityHash {
    /// Wrap raw digest bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lowercase hex rendering, as published to the payment service.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Check that `payload` is the input this hash was computed over.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the payload cannot be serialized.
    pub fn matches_input<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        purchaser: &PurchaserId,
    ) -> Result<bool> {
        Ok(hash_input(payload, purchaser)? == *self)
    }

    /// Check that `payload` is the output this hash was computed over.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the payload cannot be serialized.
    pub fn matches_output<T: Serialize + ?Sized>(&self, payload: &T) -> Result<bool> {
        Ok(hash_output(payload)? == *self)
    }
}

impl fmt::Display for IntegrityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for IntegrityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntegrityHash({})", self.to_hex())
    }
}

impl FromStr for IntegrityHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; HASH_LEN];
        hex::decode_to_slice(s.trim(), &mut bytes).map_err(|e| {
            Error::Validation(format!("integrity hash must be {} hex chars: {e}", HASH_LEN * 2))
        })?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for IntegrityHash {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<IntegrityHash> for String {
    fn from(hash: IntegrityHash) -> Self {
        hash.to_hex()
    }
}

/// Render `payload` as canonical JSON.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if the payload has no JSON representation,
/// for example a map keyed by tuples.
pub fn canonical_json<T: Serialize + ?Sized>(payload: &T) -> Result<String> {
    let value = serde_json::to_value(payload).map_err(|e| Error::Encoding(e.to_string()))?;
    Ok(canonical::to_canonical_string(&value))
}

/// Hash an input payload salted with the purchaser identifier.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if the payload cannot be serialized.
pub fn hash_input<T: Serialize + ?Sized>(
    payload: &T,
    purchaser: &PurchaserId,
) -> Result<IntegrityHash> {
    let canonical = canonical_json(payload)?;
    let mut hasher = Sha256::new();
    hasher.update(purchaser.as_str().as_bytes());
    hasher.update(b";");
    hasher.update(canonical.as_bytes());
    Ok(IntegrityHash(hasher.finalize().into()))
}

/// Hash an output payload.
///
/// # Errors
///
/// Returns [`Error::Encoding`] if the payload cannot be serialized.
pub fn hash_output<T: Serialize + ?Sized>(payload: &T) -> Result<IntegrityHash> {
    let canonical = canonical_json(payload)?;
    Ok(IntegrityHash(Sha256::digest(canonical.as_bytes()).into()))
}
