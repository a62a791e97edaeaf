use std::fmt;

use aes_gcm_siv::{
    aead::{Aead, NewAead, Payload},
    Aes256GcmSiv, Key, Nonce,
};
use anyhow::anyhow;
use chrono::Utc;
use rand::{thread_rng, RngCore};
use sea_orm::entity::*;
use zeroize::Zeroizing;

use keyquorum_core::{aes_gcm_siv, anyhow, chrono, rand, sea_orm, zeroize, Hash};
use keyquorum_entity::{key_type::KeyType, root_key};

use crate::{EnvelopeError, KeyCustodian};

/// A named root key in the clear. Only ever held long enough to wrap or unwrap a data key.
pub struct RootSecret {
    pub name: String,
    pub key_type: KeyType,
    pub secret: Zeroizing<[u8; 32]>,
}

impl PartialEq for RootSecret {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.key_type == other.key_type && *self.secret == *other.secret
    }
}

impl fmt::Debug for RootSecret {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RootSecret({}, {})", self.name, self.key_type.as_str())
    }
}

pub struct MasterKeyCustodian {
    master_key: Zeroizing<Vec<u8>>,
    master_key_hash: Hash,
}

impl MasterKeyCustodian {
    pub fn new(master_key: Vec<u8>) -> anyhow::Result<Self> {
        if master_key.len() != 32 {
            return Err(anyhow!(EnvelopeError::InvalidKeyLength(master_key.len())));
        }
        let master_key_hash = Hash::digest(&master_key);

        Ok(MasterKeyCustodian {
            master_key: Zeroizing::new(master_key),
            master_key_hash,
        })
    }

    pub fn hash(&self) -> Hash {
        self.master_key_hash.clone()
    }
}

impl KeyCustodian for MasterKeyCustodian {
    type Secret = RootSecret;
    type LockedKey = root_key::Model;
    type ActiveLockedKey = root_key::ActiveModel;

    fn gen_secret(&self) -> anyhow::Result<[u8; 32]> {
        let mut secret = [0u8; 32];
        thread_rng().fill_bytes(&mut secret);
        Ok(secret)
    }

    fn lock(&self, root_secret: Self::Secret) -> anyhow::Result<Self::ActiveLockedKey> {
        let key = Key::from_slice(&self.master_key);
        let cipher = Aes256GcmSiv::new(key);

        let mut n_raw = vec![0u8; 12];
        thread_rng().fill_bytes(&mut n_raw);
        let nonce = Nonce::from_slice(&n_raw);

        // Binding the name stops a locked key being replayed under another name
        let locked = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: &root_secret.secret[..],
                    aad: root_secret.name.as_bytes(),
                },
            )
            .map_err(|err| anyhow!("{}", err))?;

        Ok(root_key::ActiveModel {
            name: Set(root_secret.name.clone()),
            hash: Set(Hash::digest(&root_secret.secret[..])),
            master_key_hash: Set(self.master_key_hash.clone()),
            key_type: Set(root_secret.key_type.clone()),
            key: Set(locked),
            nonce: Set(n_raw),
            created_at: Set(Utc::now()),
        })
    }

    fn unlock(&self, locked_key: Self::LockedKey) -> anyhow::Result<Self::Secret> {
        if locked_key.master_key_hash != self.master_key_hash {
            return Err(anyhow!(
                "RootKey {} is locked under another master key",
                locked_key.name
            ));
        }
        if locked_key.nonce.len() != 12 {
            return Err(anyhow!(EnvelopeError::AuthenticationFailed));
        }
        let key = Key::from_slice(&self.master_key);
        let cipher = Aes256GcmSiv::new(key);
        let nonce = Nonce::from_slice(&locked_key.nonce);
        let secret = Zeroizing::new(
            cipher
                .decrypt(
                    nonce,
                    Payload {
                        msg: locked_key.key.as_ref(),
                        aad: locked_key.name.as_bytes(),
                    },
                )
                .map_err(|_| EnvelopeError::AuthenticationFailed)?,
        );
        let secret: [u8; 32] = secret
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("Invalid RootKey"))?;
        Ok(RootSecret {
            name: locked_key.name,
            key_type: locked_key.key_type,
            secret: Zeroizing::new(secret),
        })
    }
}
