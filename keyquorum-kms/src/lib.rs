use async_trait::async_trait;

use keyquorum_core::async_trait;
use keyquorum_entity::key_type::KeyType;

mod custodian;
mod error;
mod key;
mod vault;

pub use custodian::*;
pub use error::*;
pub use key::*;
pub use vault::*;

/// Narrow interface to a key management service.
///
/// Implementations never cache plaintext key material between calls.
#[async_trait]
pub trait KeyManagementClient: Send + Sync {
    /// Creates a named root key. Creating a key that already exists is not an error.
    async fn create_key(&self, name: &str, key_type: KeyType) -> Result<(), KmsError>;

    /// Fresh random data key, both in the clear and wrapped under `name`.
    async fn generate_data_key(&self, name: &str) -> Result<DataKey, KmsError>;

    async fn wrap(&self, name: &str, plaintext: &PlaintextKey) -> Result<WrappedKey, KmsError>;

    async fn unwrap(&self, name: &str, wrapped: &WrappedKey) -> Result<PlaintextKey, KmsError>;

    async fn delete_key(&self, name: &str) -> Result<(), KmsError>;
}
