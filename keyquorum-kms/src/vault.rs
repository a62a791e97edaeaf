use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hyper::{
    client::HttpConnector,
    http::{header::CONTENT_TYPE, StatusCode},
    Body, Client, Method, Request,
};
use log::{debug, trace, warn};
use serde_json::json;
use tokio::time::{timeout, Duration};
use zeroize::Zeroizing;

use keyquorum_core::{async_trait, base64, hyper, log, serde_json, tokio, zeroize};
use keyquorum_entity::key_type::KeyType;

use crate::{DataKey, KeyManagementClient, KmsError, PlaintextKey, WrappedKey};

const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Clone, Debug)]
pub struct VaultConfig {
    pub addr: String,
    pub token: String,
    /// Mount path of the transit secrets engine
    pub mount: String,
    pub timeout: Duration,
}

/// KMS client for the Vault transit secrets engine
#[derive(Clone)]
pub struct VaultTransitClient {
    config: VaultConfig,
    client: Client<HttpConnector>,
}

impl VaultTransitClient {
    pub fn new(config: VaultConfig) -> Self {
        VaultTransitClient {
            config,
            client: Client::new(),
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<(StatusCode, serde_json::Value), KmsError> {
        let uri = format!(
            "{}/v1/{}/{}",
            self.config.addr.trim_end_matches('/'),
            self.config.mount.trim_matches('/'),
            path
        );
        trace!("VAULT {} {}", method, uri);

        let body = match body {
            Some(body) => Body::from(
                serde_json::to_vec(&body).map_err(|err| KmsError::KmsUnavailable(err.to_string()))?,
            ),
            None => Body::empty(),
        };
        let req = Request::builder()
            .method(method.clone())
            .uri(&uri)
            .header(VAULT_TOKEN_HEADER, &self.config.token)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .map_err(|err| KmsError::KmsUnavailable(err.to_string()))?;

        let res = timeout(self.config.timeout, async {
            let res = self.client.request(req).await?;
            let status = res.status();
            let bytes = hyper::body::to_bytes(res.into_body()).await?;
            Ok::<_, hyper::Error>((status, bytes))
        })
        .await
        .map_err(|_| KmsError::KmsUnavailable(format!("{} {} timed out", method, path)))?
        .map_err(|err| KmsError::KmsUnavailable(err.to_string()))?;

        let (status, bytes) = res;
        debug!("VAULT {} {} {}", method, path, status);
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        Ok((status, value))
    }

    fn check_status(
        name: &str,
        status: StatusCode,
        value: &serde_json::Value,
    ) -> Result<(), KmsError> {
        if status.is_success() {
            return Ok(());
        }
        match status {
            StatusCode::NOT_FOUND => Err(KmsError::KeyNotFound(name.to_string())),
            _ => {
                warn!("Vault returned {} for {}: {}", status, name, value["errors"]);
                Err(KmsError::KmsUnavailable(format!(
                    "vault returned {}: {}",
                    status, value["errors"]
                )))
            }
        }
    }

    fn decode_plaintext(value: &serde_json::Value) -> Result<PlaintextKey, KmsError> {
        let encoded = value["data"]["plaintext"]
            .as_str()
            .ok_or_else(|| KmsError::KmsUnavailable("missing plaintext".to_string()))?;
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|err| KmsError::KmsUnavailable(err.to_string()))?;
        Ok(PlaintextKey::new(Zeroizing::new(decoded)))
    }

    fn decode_ciphertext(value: &serde_json::Value) -> Result<WrappedKey, KmsError> {
        let ciphertext = value["data"]["ciphertext"]
            .as_str()
            .ok_or_else(|| KmsError::KmsUnavailable("missing ciphertext".to_string()))?;
        Ok(WrappedKey::from(ciphertext.as_bytes().to_vec()))
    }
}

#[async_trait]
impl KeyManagementClient for VaultTransitClient {
    async fn create_key(&self, name: &str, key_type: KeyType) -> Result<(), KmsError> {
        let (status, value) = self
            .request(
                Method::POST,
                &format!("keys/{}", name),
                Some(json!({ "type": key_type.as_str() })),
            )
            .await?;
        let already_exists = status == StatusCode::BAD_REQUEST
            && value["errors"].to_string().contains("already exists");
        if already_exists {
            debug!("Vault key {} already exists", name);
            return Ok(());
        }
        Self::check_status(name, status, &value)
    }

    async fn generate_data_key(&self, name: &str) -> Result<DataKey, KmsError> {
        let (status, value) = self
            .request(
                Method::POST,
                &format!("datakey/plaintext/{}", name),
                Some(json!({})),
            )
            .await?;
        Self::check_status(name, status, &value)?;
        Ok(DataKey {
            plaintext: Self::decode_plaintext(&value)?,
            wrapped: Self::decode_ciphertext(&value)?,
        })
    }

    async fn wrap(&self, name: &str, plaintext: &PlaintextKey) -> Result<WrappedKey, KmsError> {
        let encoded = plaintext.to_base64();
        let (status, value) = self
            .request(
                Method::POST,
                &format!("encrypt/{}", name),
                Some(json!({ "plaintext": encoded.as_str() })),
            )
            .await?;
        Self::check_status(name, status, &value)?;
        Self::decode_ciphertext(&value)
    }

    async fn unwrap(&self, name: &str, wrapped: &WrappedKey) -> Result<PlaintextKey, KmsError> {
        let ciphertext =
            std::str::from_utf8(wrapped.as_bytes()).map_err(|_| KmsError::InvalidWrappedKey)?;
        let (status, value) = self
            .request(
                Method::POST,
                &format!("decrypt/{}", name),
                Some(json!({ "ciphertext": ciphertext })),
            )
            .await?;
        if status == StatusCode::BAD_REQUEST {
            return Err(KmsError::InvalidWrappedKey);
        }
        Self::check_status(name, status, &value)?;
        Self::decode_plaintext(&value)
    }

    async fn delete_key(&self, name: &str) -> Result<(), KmsError> {
        let (status, value) = self
            .request(
                Method::POST,
                &format!("keys/{}/config", name),
                Some(json!({ "deletion_allowed": true })),
            )
            .await?;
        Self::check_status(name, status, &value)?;
        let (status, value) = self
            .request(Method::DELETE, &format!("keys/{}", name), None)
            .await?;
        Self::check_status(name, status, &value)
    }
}
