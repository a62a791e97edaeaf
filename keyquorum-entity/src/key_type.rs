use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use keyquorum_core::{sea_orm, serde};

/// Wrapping key algorithms, named the way Vault transit names them
#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Deserialize, Serialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "key_type")]
#[serde(crate = "keyquorum_core::serde")]
pub enum KeyType {
    #[sea_orm(string_value = "aes256-gcm96")]
    #[serde(rename = "aes256-gcm96")]
    Aes256Gcm96,
    #[sea_orm(string_value = "chacha20-poly1305")]
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
    #[sea_orm(string_value = "rsa-2048")]
    #[serde(rename = "rsa-2048")]
    Rsa2048,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Aes256Gcm96 => "aes256-gcm96",
            KeyType::ChaCha20Poly1305 => "chacha20-poly1305",
            KeyType::Rsa2048 => "rsa-2048",
        }
    }
}

impl Default for KeyType {
    fn default() -> Self {
        KeyType::Aes256Gcm96
    }
}
