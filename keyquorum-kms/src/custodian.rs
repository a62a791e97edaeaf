use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr};
use zeroize::Zeroizing;

use keyquorum_core::{anyhow, async_trait, log, sea_orm, zeroize};
use keyquorum_encryption::{KeyCustodian, MasterKeyCustodian, RootSecret, WrappingKeyCustodian};
use keyquorum_entity::{key_type::KeyType, root_key};

use crate::{DataKey, KeyManagementClient, KmsError, PlaintextKey, WrappedKey};

fn unavailable(err: DbErr) -> KmsError {
    KmsError::KmsUnavailable(err.to_string())
}

/// Database backed KMS. Root keys live in `root_keys`, locked under a master key
/// that only this process holds.
#[derive(Clone)]
pub struct CustodianKms {
    master: Arc<MasterKeyCustodian>,
    database: DatabaseConnection,
}

impl CustodianKms {
    pub fn new(master_key: Vec<u8>, database: DatabaseConnection) -> anyhow::Result<Self> {
        Ok(CustodianKms {
            master: Arc::new(MasterKeyCustodian::new(master_key)?),
            database,
        })
    }

    async fn wrapping_custodian(&self, name: &str) -> Result<WrappingKeyCustodian, KmsError> {
        let locked = root_key::Entity::find()
            .filter(
                Condition::all()
                    .add(root_key::Column::Name.eq(name))
                    .add(root_key::Column::MasterKeyHash.eq(self.master.hash())),
            )
            .one(&self.database)
            .await
            .map_err(unavailable)?
            .ok_or_else(|| KmsError::KeyNotFound(name.to_string()))?;
        let root = self
            .master
            .unlock(locked)
            .map_err(|err| KmsError::KmsUnavailable(err.to_string()))?;
        WrappingKeyCustodian::new(root)
            .map_err(|err| KmsError::UnsupportedKeyType(err.to_string()))
    }
}

#[async_trait]
impl KeyManagementClient for CustodianKms {
    async fn create_key(&self, name: &str, key_type: KeyType) -> Result<(), KmsError> {
        if key_type == KeyType::Rsa2048 {
            return Err(KmsError::UnsupportedKeyType(key_type.as_str().to_string()));
        }
        let exists = root_key::Entity::find_by_id(name.to_string())
            .one(&self.database)
            .await
            .map_err(unavailable)?
            .is_some();
        if exists {
            debug!("RootKey {} already exists", name);
            return Ok(());
        }

        let secret = Zeroizing::new(
            self.master
                .gen_secret()
                .map_err(|err| KmsError::KmsUnavailable(err.to_string()))?,
        );
        let locked = self
            .master
            .lock(RootSecret {
                name: name.to_string(),
                key_type,
                secret,
            })
            .map_err(|err| KmsError::KmsUnavailable(err.to_string()))?;

        if let Err(err) = locked.insert(&self.database).await {
            // Lost a creation race
            let exists = root_key::Entity::find_by_id(name.to_string())
                .one(&self.database)
                .await
                .map_err(unavailable)?
                .is_some();
            if !exists {
                return Err(unavailable(err));
            }
        }
        info!("Created RootKey {}", name);
        Ok(())
    }

    async fn generate_data_key(&self, name: &str) -> Result<DataKey, KmsError> {
        let custodian = self.wrapping_custodian(name).await?;
        let secret = Zeroizing::new(
            custodian
                .gen_secret()
                .map_err(|err| KmsError::KmsUnavailable(err.to_string()))?,
        );
        let plaintext = Zeroizing::new(secret.to_vec());
        let wrapped = custodian
            .lock(plaintext.clone())
            .map_err(|err| KmsError::KmsUnavailable(err.to_string()))?;
        Ok(DataKey {
            plaintext: PlaintextKey::new(plaintext),
            wrapped: WrappedKey::from(wrapped),
        })
    }

    async fn wrap(&self, name: &str, plaintext: &PlaintextKey) -> Result<WrappedKey, KmsError> {
        let custodian = self.wrapping_custodian(name).await?;
        let wrapped = custodian
            .lock(Zeroizing::new(plaintext.as_bytes().to_vec()))
            .map_err(|err| KmsError::KmsUnavailable(err.to_string()))?;
        Ok(WrappedKey::from(wrapped))
    }

    async fn unwrap(&self, name: &str, wrapped: &WrappedKey) -> Result<PlaintextKey, KmsError> {
        let custodian = self.wrapping_custodian(name).await?;
        let plaintext = custodian
            .unlock(wrapped.as_bytes().to_vec())
            .map_err(|_| KmsError::InvalidWrappedKey)?;
        Ok(PlaintextKey::new(plaintext))
    }

    async fn delete_key(&self, name: &str) -> Result<(), KmsError> {
        let res = root_key::Entity::delete_many()
            .filter(
                Condition::all()
                    .add(root_key::Column::Name.eq(name))
                    .add(root_key::Column::MasterKeyHash.eq(self.master.hash())),
            )
            .exec(&self.database)
            .await
            .map_err(unavailable)?;
        if res.rows_affected == 0 {
            return Err(KmsError::KeyNotFound(name.to_string()));
        }
        info!("Deleted RootKey {}", name);
        Ok(())
    }
}
