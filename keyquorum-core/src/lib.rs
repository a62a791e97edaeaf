#![deny(missing_docs)]

//! keyquorum-core re-exports all packages shared by other keyquorum crates and defines a number of core types.

#[cfg(feature = "http")]
pub use actix_cors;
#[cfg(feature = "http")]
pub use actix_rt;
#[cfg(feature = "http")]
pub use actix_web;
#[cfg(feature = "crypto")]
pub use aes_gcm_siv;
pub use anyhow;
#[cfg(feature = "async-core")]
pub use async_trait;
#[cfg(feature = "http")]
pub use awc;
#[cfg(feature = "encoding")]
pub use base64;
#[cfg(feature = "crypto")]
pub use bs58;
#[cfg(feature = "crypto")]
pub use chacha20poly1305;
#[cfg(feature = "time")]
pub use chrono;
#[cfg(feature = "http")]
pub use hyper;
#[cfg(feature = "lib")]
pub use log;
#[cfg(feature = "serialization")]
pub use lz4_flex;
#[cfg(feature = "random")]
pub use rand;
#[cfg(feature = "serialization")]
pub use rmp_serde;
#[cfg(feature = "sql")]
pub use sea_orm;
#[cfg(feature = "serialization")]
pub use serde;
#[cfg(feature = "serialization")]
pub use serde_json;
#[cfg(feature = "crypto")]
pub use sha3;
#[cfg(feature = "async-core")]
pub use tokio;
#[cfg(feature = "http")]
pub use url;
#[cfg(feature = "random")]
pub use uuid;
#[cfg(feature = "crypto")]
pub use zeroize;

mod types;
pub use types::*;
