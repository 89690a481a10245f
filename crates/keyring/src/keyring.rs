//! In-memory keyring content and its identity token

use std::collections::BTreeMap;
use std::fmt;

use crate::crypto::random_bytes;
use crate::error::{KeyringError, KeyringResult};
use crate::secret::SecretString;

const ID_BYTES: usize = 16;

/// Identity token stored unencrypted in a keyring header
///
/// The token is the lookup key inside a master key file and the argument
/// passed to external master key readers and writers. It is never the
/// encryption key, so a keyring can be re-keyed without changing identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyringId(String);

impl KeyringId {
    /// Generate a fresh random identity
    pub fn generate() -> Self {
        Self(hex::encode(random_bytes::<ID_BYTES>()))
    }

    /// Parse an identity read from a header or master key file
    pub fn parse(value: &str) -> KeyringResult<Self> {
        let invalid = |reason: &str| KeyringError::InvalidId {
            id: value.to_string(),
            reason: reason.to_string(),
        };

        if value.len() != ID_BYTES * 2 {
            return Err(invalid("wrong length"));
        }
        if !value.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(invalid("must be lower-case hex"));
        }
        Ok(Self(value.to_string()))
    }

    /// Get the token as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decrypted keyring: secrets addressed by `(principal, field)`
#[derive(Debug, Clone)]
pub struct Keyring {
    id: KeyringId,
    entries: BTreeMap<String, BTreeMap<String, SecretString>>,
}

impl Keyring {
    /// Create an empty keyring with a new identity
    pub fn new() -> Self {
        Self::with_id(KeyringId::generate())
    }

    /// Create an empty keyring with a known identity
    pub fn with_id(id: KeyringId) -> Self {
        Self {
            id,
            entries: BTreeMap::new(),
        }
    }

    /// Identity token of this keyring
    pub fn id(&self) -> &KeyringId {
        &self.id
    }

    /// Store a secret, replacing any previous value
    pub fn store(
        &mut self,
        principal: impl Into<String>,
        field: impl Into<String>,
        value: SecretString,
    ) {
        self.entries
            .entry(principal.into())
            .or_default()
            .insert(field.into(), value);
    }

    /// Fetch a secret
    pub fn fetch(&self, principal: &str, field: &str) -> Option<&SecretString> {
        self.entries.get(principal).and_then(|fields| fields.get(field))
    }

    /// Number of stored secrets
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Whether the keyring holds no secrets
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> &BTreeMap<String, BTreeMap<String, SecretString>> {
        &self.entries
    }

    pub(crate) fn from_parts(
        id: KeyringId,
        entries: BTreeMap<String, BTreeMap<String, SecretString>>,
    ) -> Self {
        Self { id, entries }
    }
}

impl Default for Keyring {
    fn default() -> Self {
        Self::new()
    }
}
