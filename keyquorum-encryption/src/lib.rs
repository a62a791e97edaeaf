use keyquorum_core::anyhow;

mod codec;
mod container;
mod error;
mod master_key;
mod wrapping_key;

pub use codec::*;
pub use container::*;
pub use error::*;
pub use master_key::*;
pub use wrapping_key::*;

pub trait KeyCustodian {
    type Secret;
    type LockedKey;
    type ActiveLockedKey;

    fn gen_secret(&self) -> anyhow::Result<[u8; 32]>;
    fn lock(&self, secret: Self::Secret) -> anyhow::Result<Self::ActiveLockedKey>;
    fn unlock(&self, locked_key: Self::LockedKey) -> anyhow::Result<Self::Secret>;
}
