use std::sync::Arc;

use log::debug;

use keyquorum_core::{anyhow, log};
use keyquorum_encryption::{Cipher, EnvelopeCodec, EnvelopeContainer, EnvelopeError};
use keyquorum_entity::key_type::KeyType;
use keyquorum_kms::{KeyManagementClient, PlaintextKey};

/// Data provider side of envelope encryption
#[derive(Clone)]
pub struct EnvelopeService {
    kms: Arc<dyn KeyManagementClient>,
}

impl EnvelopeService {
    pub fn new(kms: Arc<dyn KeyManagementClient>) -> Self {
        EnvelopeService { kms }
    }

    /// Encrypt `payload` under a fresh data key wrapped by the root key `key_name`.
    ///
    /// The root key is created when it does not exist yet.
    pub async fn seal(
        &self,
        key_name: &str,
        cipher: Cipher,
        payload: &[u8],
        aux_header: Option<Vec<u8>>,
    ) -> anyhow::Result<EnvelopeContainer> {
        self.kms.create_key(key_name, KeyType::default()).await?;
        let data_key = self.kms.generate_data_key(key_name).await?;
        let codec = EnvelopeCodec::new(data_key.plaintext.as_bytes(), cipher)?;
        let ciphertext = codec.encrypt(payload)?;
        debug!(
            "Sealed {} bytes under {} with {}",
            payload.len(),
            key_name,
            cipher
        );
        Ok(EnvelopeContainer {
            key_id: key_name.to_string(),
            wrapped_key: data_key.wrapped.into_vec(),
            cipher,
            ciphertext,
            aux_header,
        })
    }
}

/// Decrypt a container's payload with its released data key
pub fn open_container(
    container: &EnvelopeContainer,
    dek: &PlaintextKey,
) -> Result<Vec<u8>, EnvelopeError> {
    EnvelopeCodec::new(dek.as_bytes(), container.cipher)?.decrypt(&container.ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyquorum_core::tokio;
    use keyquorum_kms::{CustodianKms, WrappedKey};
    use keyquorum_migration::testing::testdb;

    async fn service() -> (EnvelopeService, Arc<CustodianKms>) {
        let database = testdb().await.expect("Failed to setup testdb");
        let kms = Arc::new(
            CustodianKms::new(b"an example very very secret key.".to_vec(), database)
                .expect("Invalid CustodianKms"),
        );
        (EnvelopeService::new(kms.clone()), kms)
    }

    #[tokio::test]
    async fn test_seal_open() {
        let (service, kms) = service().await;
        let payload = b"quarterly figures".to_vec();

        for cipher in [Cipher::Aes256GcmSiv, Cipher::ChaCha20Poly1305] {
            let container = service
                .seal("reports", cipher, &payload, Some(b"v1".to_vec()))
                .await
                .expect("Failed to seal");
            assert_eq!(container.key_id, "reports");
            assert_eq!(container.cipher, cipher);
            assert_eq!(container.aux_header.as_deref(), Some(&b"v1"[..]));

            let archive = container.to_archive().expect("Failed to archive");
            let opened = EnvelopeContainer::from_archive(&archive).expect("Invalid archive");
            let dek = kms
                .unwrap(&opened.key_id, &WrappedKey::from(opened.wrapped_key.clone()))
                .await
                .expect("Failed to unwrap");
            assert_eq!(open_container(&opened, &dek).expect("Failed to open"), payload);
        }
    }

    #[tokio::test]
    async fn test_open_with_wrong_key() {
        let (service, _) = service().await;
        let container = service
            .seal("reports", Cipher::default(), b"secret", None)
            .await
            .expect("Failed to seal");

        let wrong = PlaintextKey::from(vec![7u8; 32]);
        assert!(matches!(
            open_container(&container, &wrong),
            Err(EnvelopeError::AuthenticationFailed)
        ));
        let short = PlaintextKey::from(vec![7u8; 16]);
        assert!(matches!(
            open_container(&container, &short),
            Err(EnvelopeError::InvalidKeyLength(16))
        ));
    }
}
