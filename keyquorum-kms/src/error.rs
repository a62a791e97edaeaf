use std::{error::Error, fmt};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KmsError {
    KmsUnavailable(String),
    KeyNotFound(String),
    UnsupportedKeyType(String),
    /// The wrapped key failed authentication under the named root key
    InvalidWrappedKey,
}

impl fmt::Display for KmsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KmsError::KmsUnavailable(reason) => write!(f, "KmsUnavailable: {}", reason),
            KmsError::KeyNotFound(name) => write!(f, "KeyNotFound: {}", name),
            KmsError::UnsupportedKeyType(key_type) => write!(f, "UnsupportedKeyType: {}", key_type),
            KmsError::InvalidWrappedKey => write!(f, "InvalidWrappedKey"),
        }
    }
}

impl Error for KmsError {}
