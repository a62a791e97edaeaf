use std::{fmt, str::FromStr};

use anyhow::anyhow;
use rand::{thread_rng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use keyquorum_core::{aes_gcm_siv, anyhow, chacha20poly1305, rand, serde, zeroize};

use crate::EnvelopeError;

pub const LENGTH_PREFIX_LEN: usize = 8;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub enum Cipher {
    #[serde(rename = "aes256-gcm-siv")]
    Aes256GcmSiv,
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

impl Cipher {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cipher::Aes256GcmSiv => "aes256-gcm-siv",
            Cipher::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }
}

impl Default for Cipher {
    fn default() -> Self {
        Cipher::Aes256GcmSiv
    }
}

impl fmt::Display for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Cipher {
    type Err = EnvelopeError;
    fn from_str(val: &str) -> Result<Cipher, EnvelopeError> {
        match val {
            "aes256-gcm-siv" => Ok(Cipher::Aes256GcmSiv),
            "chacha20-poly1305" => Ok(Cipher::ChaCha20Poly1305),
            other => Err(EnvelopeError::MalformedContainer(format!(
                "unknown cipher {}",
                other
            ))),
        }
    }
}

/// Encrypts payloads under a data encryption key.
///
/// Output frame: `len(plaintext) as u64 BE || nonce || ciphertext+tag`. The length
/// prefix is authenticated as associated data, and every call draws a fresh random nonce.
pub struct EnvelopeCodec {
    data_key: Zeroizing<Vec<u8>>,
    cipher: Cipher,
}

impl EnvelopeCodec {
    pub fn new(data_key: &[u8], cipher: Cipher) -> Result<Self, EnvelopeError> {
        if data_key.len() != 32 {
            return Err(EnvelopeError::InvalidKeyLength(data_key.len()));
        }
        Ok(EnvelopeCodec {
            data_key: Zeroizing::new(data_key.to_vec()),
            cipher,
        })
    }

    pub fn cipher(&self) -> Cipher {
        self.cipher
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
        let prefix = (plaintext.len() as u64).to_be_bytes();
        let mut n_raw = [0u8; NONCE_LEN];
        thread_rng().fill_bytes(&mut n_raw);

        let ciphertext = match self.cipher {
            Cipher::Aes256GcmSiv => {
                use aes_gcm_siv::{
                    aead::{Aead, NewAead, Payload},
                    Aes256GcmSiv, Key, Nonce,
                };

                let cipher = Aes256GcmSiv::new(Key::from_slice(&self.data_key));
                cipher
                    .encrypt(
                        Nonce::from_slice(&n_raw),
                        Payload {
                            msg: plaintext,
                            aad: &prefix,
                        },
                    )
                    .map_err(|err| anyhow!("{}", err))?
            }
            Cipher::ChaCha20Poly1305 => {
                use chacha20poly1305::{
                    aead::{Aead, NewAead, Payload},
                    ChaCha20Poly1305, Key, Nonce,
                };

                let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.data_key));
                cipher
                    .encrypt(
                        Nonce::from_slice(&n_raw),
                        Payload {
                            msg: plaintext,
                            aad: &prefix,
                        },
                    )
                    .map_err(|err| anyhow!("{}", err))?
            }
        };

        let mut framed = Vec::with_capacity(LENGTH_PREFIX_LEN + NONCE_LEN + ciphertext.len());
        framed.extend_from_slice(&prefix);
        framed.extend_from_slice(&n_raw);
        framed.extend_from_slice(&ciphertext);
        Ok(framed)
    }

    pub fn decrypt(&self, framed: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        if framed.len() < LENGTH_PREFIX_LEN + NONCE_LEN + TAG_LEN {
            return Err(EnvelopeError::AuthenticationFailed);
        }
        let (prefix, rest) = framed.split_at(LENGTH_PREFIX_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        let mut len_bytes = [0u8; LENGTH_PREFIX_LEN];
        len_bytes.copy_from_slice(prefix);
        let expected_len = u64::from_be_bytes(len_bytes);

        let plaintext = match self.cipher {
            Cipher::Aes256GcmSiv => {
                use aes_gcm_siv::{
                    aead::{Aead, NewAead, Payload},
                    Aes256GcmSiv, Key, Nonce,
                };

                let cipher = Aes256GcmSiv::new(Key::from_slice(&self.data_key));
                cipher.decrypt(
                    Nonce::from_slice(nonce),
                    Payload {
                        msg: ciphertext,
                        aad: prefix,
                    },
                )
            }
            Cipher::ChaCha20Poly1305 => {
                use chacha20poly1305::{
                    aead::{Aead, NewAead, Payload},
                    ChaCha20Poly1305, Key, Nonce,
                };

                let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.data_key));
                cipher.decrypt(
                    Nonce::from_slice(nonce),
                    Payload {
                        msg: ciphertext,
                        aad: prefix,
                    },
                )
            }
        }
        .map_err(|_| EnvelopeError::AuthenticationFailed)?;

        if plaintext.len() as u64 != expected_len {
            return Err(EnvelopeError::AuthenticationFailed);
        }
        Ok(plaintext)
    }
}
