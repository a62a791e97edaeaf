use std::{error::Error, fmt};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Tag mismatch, truncated frame or a recovered length that disagrees with the prefix
    AuthenticationFailed,
    InvalidKeyLength(usize),
    MalformedContainer(String),
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EnvelopeError::AuthenticationFailed => write!(f, "AuthenticationFailed"),
            EnvelopeError::InvalidKeyLength(len) => {
                write!(f, "InvalidKeyLength: expected 32 bytes, got {}", len)
            }
            EnvelopeError::MalformedContainer(reason) => {
                write!(f, "MalformedContainer: {}", reason)
            }
        }
    }
}

impl Error for EnvelopeError {}
