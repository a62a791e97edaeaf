use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

use keyquorum_core::{base64, serde, zeroize};

/// Plaintext data key. Not `Clone`; zeroed on drop.
pub struct PlaintextKey(Zeroizing<Vec<u8>>);

impl PlaintextKey {
    pub fn new(key: Zeroizing<Vec<u8>>) -> Self {
        PlaintextKey(key)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(&self.0[..]))
    }
}

impl From<Vec<u8>> for PlaintextKey {
    fn from(key: Vec<u8>) -> Self {
        PlaintextKey(Zeroizing::new(key))
    }
}

impl fmt::Debug for PlaintextKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PlaintextKey([REDACTED; {}])", self.0.len())
    }
}

/// Data key wrapped under a root key; opaque to everything but the KMS that produced it.
///
/// Serializes as standard base64.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        Ok(WrappedKey(STANDARD.decode(encoded)?))
    }
}

impl From<Vec<u8>> for WrappedKey {
    fn from(wrapped: Vec<u8>) -> Self {
        WrappedKey(wrapped)
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "WrappedKey({})", self.to_base64())
    }
}

impl Serialize for WrappedKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for WrappedKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<WrappedKey, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        WrappedKey::from_base64(&encoded).map_err(de::Error::custom)
    }
}

#[derive(Debug)]
pub struct DataKey {
    pub plaintext: PlaintextKey,
    pub wrapped: WrappedKey,
}
