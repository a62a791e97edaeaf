use std::{path::PathBuf, time::Duration};

use anyhow::anyhow;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Subcommand;
use log::info;
use serde::{Deserialize, Serialize};
use tokio::fs;
use zeroize::Zeroizing;

use keyquorum_core::{anyhow, awc, base64, log, serde, serde_json, tokio, url::Url, zeroize};
use keyquorum_encryption::{Cipher, EnvelopeContainer};
use keyquorum_gate::open_container;
use keyquorum_http::{endpoint_url, ReleaseRequest, ReleaseResponse};
use keyquorum_kms::{PlaintextKey, WrappedKey};

const MAX_ARCHIVE_LEN: usize = 64 * 1024 * 1024;

#[derive(clap::ArgEnum, Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub enum CipherOpt {
    Aes256GcmSiv,
    Chacha20Poly1305,
}

impl From<CipherOpt> for Cipher {
    fn from(val: CipherOpt) -> Cipher {
        match val {
            CipherOpt::Aes256GcmSiv => Cipher::Aes256GcmSiv,
            CipherOpt::Chacha20Poly1305 => Cipher::ChaCha20Poly1305,
        }
    }
}

#[derive(Subcommand)]
pub enum GateSubcommand {
    /// Seal a file through the gate and write the container archive
    Seal {
        #[clap(short, long)]
        key_name: String,

        #[clap(short, long, arg_enum, default_value_t = CipherOpt::Aes256GcmSiv)]
        cipher: CipherOpt,

        #[clap(short, long, parse(from_os_str))]
        input: PathBuf,

        #[clap(short, long, parse(from_os_str))]
        output: PathBuf,
    },
    /// Ask the gate for the data key of a container and print it
    Release {
        #[clap(short, long)]
        client_id: String,

        #[clap(short, long, parse(from_os_str))]
        input: PathBuf,
    },
    /// Release the data key of a container, then decrypt it locally
    Open {
        #[clap(short, long)]
        client_id: String,

        #[clap(short, long, parse(from_os_str))]
        input: PathBuf,

        #[clap(short, long, parse(from_os_str))]
        output: PathBuf,
    },
    Version {},
}

pub struct GateCtl {
    verbose: bool,
    endpoint: String,
}

impl GateCtl {
    pub fn new(verbose: bool, endpoint: String) -> Self {
        GateCtl {
            verbose,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn client(&self) -> awc::Client {
        awc::Client::builder()
            .add_default_header((
                "User-Agent",
                format!("keyquorum-cli/v{}", env!("CARGO_PKG_VERSION")),
            ))
            .timeout(Duration::from_secs(60))
            .finish()
    }

    pub async fn seal(
        &self,
        key_name: &str,
        cipher: Cipher,
        input: PathBuf,
        output: PathBuf,
    ) -> anyhow::Result<()> {
        let payload = fs::read(&input).await?;
        let url = self.seal_url(key_name, cipher)?;

        if self.verbose {
            println!("*****************************");
            println!("********** REQUEST **********");
            println!("*****************************");
            println!("{}", url);
            println!("{} bytes from {}", payload.len(), input.display());
        }

        let mut response = self
            .client()
            .post(url.as_str())
            .content_type("application/octet-stream")
            .send_body(payload)
            .await
            .map_err(|err| anyhow!("{}", err))?;
        let body = response.body().limit(MAX_ARCHIVE_LEN).await?;
        if self.verbose {
            println!("******************************");
            println!("********** RESPONSE **********");
            println!("******************************");
            println!("{:?}", response);
        }
        if !response.status().is_success() {
            return Err(anyhow!(
                "seal failed with {}: {}",
                response.status(),
                String::from_utf8_lossy(&body)
            ));
        }

        let container = EnvelopeContainer::from_archive(&body)?;
        fs::write(&output, &body).await?;
        info!(
            "Sealed {} into {} under {}",
            input.display(),
            output.display(),
            container.key_id
        );
        Ok(())
    }

    fn seal_url(&self, key_name: &str, cipher: Cipher) -> anyhow::Result<Url> {
        let mut url = endpoint_url(&self.endpoint, &["envelope", "seal"])?;
        url.query_pairs_mut()
            .append_pair("key_name", key_name)
            .append_pair("cipher", &cipher.to_string());
        Ok(url)
    }

    pub async fn release(&self, client_id: &str, input: PathBuf) -> anyhow::Result<()> {
        let container = EnvelopeContainer::from_archive(&fs::read(&input).await?)?;
        let dek = self.release_key(client_id, &container).await?;
        println!("{}", *dek.to_base64());
        Ok(())
    }

    pub async fn open(
        &self,
        client_id: &str,
        input: PathBuf,
        output: PathBuf,
    ) -> anyhow::Result<()> {
        let container = EnvelopeContainer::from_archive(&fs::read(&input).await?)?;
        let dek = self.release_key(client_id, &container).await?;
        let payload = Zeroizing::new(open_container(&container, &dek)?);
        drop(dek);
        fs::write(&output, &payload[..]).await?;
        info!("Opened {} into {}", input.display(), output.display());
        Ok(())
    }

    pub async fn version(&self) -> anyhow::Result<()> {
        let url = endpoint_url(&self.endpoint, &["version"])?;
        let mut response = self
            .client()
            .get(url.as_str())
            .send()
            .await
            .map_err(|err| anyhow!("{}", err))?;
        let response_json: serde_json::Value = response.json().await?;
        println!("{}", serde_json::to_string_pretty(&response_json)?);
        Ok(())
    }

    async fn release_key(
        &self,
        client_id: &str,
        container: &EnvelopeContainer,
    ) -> anyhow::Result<PlaintextKey> {
        let url = endpoint_url(&self.endpoint, &["release"])?;
        let req = ReleaseRequest {
            client_id: client_id.to_string(),
            wrapped_key: WrappedKey::from(container.wrapped_key.clone()),
            key_id: container.key_id.clone(),
        };

        if self.verbose {
            println!("*****************************");
            println!("********** REQUEST **********");
            println!("*****************************");
            println!("{}", url);
            println!("{}", serde_json::to_string_pretty(&req)?);
        }

        let mut response = self
            .client()
            .post(url.as_str())
            .send_json(&req)
            .await
            .map_err(|err| anyhow!("{}", err))?;
        if self.verbose {
            println!("******************************");
            println!("********** RESPONSE **********");
            println!("******************************");
            println!("{:?}", response);
        }
        if !response.status().is_success() {
            let body: serde_json::Value = response.json().await?;
            return Err(anyhow!(
                "release refused with {}: {}",
                response.status(),
                body
            ));
        }

        let released: ReleaseResponse = response.json().await?;
        let dek = Zeroizing::new(STANDARD.decode(&released.dek)?);
        Ok(PlaintextKey::new(dek))
    }
}
