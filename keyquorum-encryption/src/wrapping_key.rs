use anyhow::anyhow;
use rand::{thread_rng, RngCore};
use zeroize::Zeroizing;

use keyquorum_core::{aes_gcm_siv, anyhow, chacha20poly1305, rand, zeroize, Hash};
use keyquorum_entity::key_type::KeyType;

use crate::{EnvelopeError, KeyCustodian, RootSecret};

const NONCE_LEN: usize = 12;

/// Wraps and unwraps data keys under one unlocked root key.
///
/// A wrapped key is `nonce || aead(dek)` with the root key name as associated data.
pub struct WrappingKeyCustodian {
    name: String,
    key_type: KeyType,
    wrapping_key: Zeroizing<[u8; 32]>,
    wrapping_key_hash: Hash,
}

impl WrappingKeyCustodian {
    pub fn new(root: RootSecret) -> anyhow::Result<Self> {
        if root.key_type == KeyType::Rsa2048 {
            return Err(anyhow!("{} keys cannot wrap locally", root.key_type.as_str()));
        }
        let wrapping_key_hash = Hash::digest(&root.secret[..]);
        Ok(WrappingKeyCustodian {
            name: root.name,
            key_type: root.key_type,
            wrapping_key: root.secret,
            wrapping_key_hash,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> Hash {
        self.wrapping_key_hash.clone()
    }

    fn seal(&self, nonce: &[u8], msg: &[u8]) -> anyhow::Result<Vec<u8>> {
        let aad = self.name.as_bytes();
        match self.key_type {
            KeyType::Aes256Gcm96 => {
                use aes_gcm_siv::{
                    aead::{Aead, NewAead, Payload},
                    Aes256GcmSiv, Key, Nonce,
                };
                let cipher = Aes256GcmSiv::new(Key::from_slice(&self.wrapping_key[..]));
                cipher
                    .encrypt(Nonce::from_slice(nonce), Payload { msg, aad })
                    .map_err(|err| anyhow!("{}", err))
            }
            KeyType::ChaCha20Poly1305 => {
                use chacha20poly1305::{
                    aead::{Aead, NewAead, Payload},
                    ChaCha20Poly1305, Key, Nonce,
                };
                let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.wrapping_key[..]));
                cipher
                    .encrypt(Nonce::from_slice(nonce), Payload { msg, aad })
                    .map_err(|err| anyhow!("{}", err))
            }
            KeyType::Rsa2048 => Err(anyhow!("rsa-2048 keys cannot wrap locally")),
        }
    }

    fn open(&self, nonce: &[u8], msg: &[u8]) -> anyhow::Result<Vec<u8>> {
        let aad = self.name.as_bytes();
        let opened = match self.key_type {
            KeyType::Aes256Gcm96 => {
                use aes_gcm_siv::{
                    aead::{Aead, NewAead, Payload},
                    Aes256GcmSiv, Key, Nonce,
                };
                let cipher = Aes256GcmSiv::new(Key::from_slice(&self.wrapping_key[..]));
                cipher.decrypt(Nonce::from_slice(nonce), Payload { msg, aad })
            }
            KeyType::ChaCha20Poly1305 => {
                use chacha20poly1305::{
                    aead::{Aead, NewAead, Payload},
                    ChaCha20Poly1305, Key, Nonce,
                };
                let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.wrapping_key[..]));
                cipher.decrypt(Nonce::from_slice(nonce), Payload { msg, aad })
            }
            KeyType::Rsa2048 => return Err(anyhow!("rsa-2048 keys cannot unwrap locally")),
        };
        opened.map_err(|_| anyhow!(EnvelopeError::AuthenticationFailed))
    }
}

impl KeyCustodian for WrappingKeyCustodian {
    type Secret = Zeroizing<Vec<u8>>;
    type LockedKey = Vec<u8>;
    type ActiveLockedKey = Vec<u8>;

    fn gen_secret(&self) -> anyhow::Result<[u8; 32]> {
        let mut secret = [0u8; 32];
        thread_rng().fill_bytes(&mut secret);
        Ok(secret)
    }

    fn lock(&self, data_key: Self::Secret) -> anyhow::Result<Self::ActiveLockedKey> {
        let mut wrapped = vec![0u8; NONCE_LEN];
        thread_rng().fill_bytes(&mut wrapped);
        let sealed = self.seal(&wrapped, &data_key)?;
        wrapped.extend_from_slice(&sealed);
        Ok(wrapped)
    }

    fn unlock(&self, wrapped: Self::LockedKey) -> anyhow::Result<Self::Secret> {
        if wrapped.len() <= NONCE_LEN {
            return Err(anyhow!(EnvelopeError::AuthenticationFailed));
        }
        let (nonce, sealed) = wrapped.split_at(NONCE_LEN);
        Ok(Zeroizing::new(self.open(nonce, sealed)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custodian(key_type: KeyType) -> WrappingKeyCustodian {
        WrappingKeyCustodian::new(RootSecret {
            name: "my-sym-key".to_string(),
            key_type,
            secret: Zeroizing::new(*b"an example very very secret key."),
        })
        .expect("Invalid WrappingKeyCustodian")
    }

    #[test]
    fn test_wrapping_key_custodian() {
        for key_type in [KeyType::Aes256Gcm96, KeyType::ChaCha20Poly1305] {
            let wkc = custodian(key_type);
            assert_eq!(
                wkc.hash().to_string(),
                "Fgm9dLoNoRgdUwEWB5QLFHdhccYY2Zx5egCrY4gnqJpf".to_string()
            );
            let dek = wkc.gen_secret().expect("Invalid secret");
            let wrapped = wkc
                .lock(Zeroizing::new(dek.to_vec()))
                .expect("Invalid wrapped key");
            assert_ne!(&wrapped[NONCE_LEN..], &dek[..]);
            let unwrapped = wkc.unlock(wrapped).expect("Invalid unwrapped key");
            assert_eq!(unwrapped.as_slice(), &dek[..]);
        }
    }

    #[test]
    fn test_wrapping_key_custodian_tamper() {
        let wkc = custodian(KeyType::Aes256Gcm96);
        let wrapped = wkc
            .lock(Zeroizing::new(vec![9u8; 32]))
            .expect("Invalid wrapped key");
        for i in 0..wrapped.len() {
            let mut tampered = wrapped.clone();
            tampered[i] ^= 0x01;
            let err = wkc.unlock(tampered).expect_err("tampered key unwrapped");
            assert_eq!(
                err.downcast_ref::<EnvelopeError>(),
                Some(&EnvelopeError::AuthenticationFailed)
            );
        }
        assert!(wkc.unlock(wrapped[..NONCE_LEN].to_vec()).is_err());
    }

    #[test]
    fn test_wrapping_key_custodian_rejects_rsa() {
        assert!(WrappingKeyCustodian::new(RootSecret {
            name: "my-rsa-key".to_string(),
            key_type: KeyType::Rsa2048,
            secret: Zeroizing::new([0u8; 32]),
        })
        .is_err());
    }
}
