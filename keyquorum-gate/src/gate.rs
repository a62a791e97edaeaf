use std::{error::Error, fmt, sync::Arc};

use anyhow::anyhow;
use log::{info, warn};

use keyquorum_core::{anyhow, log};
use keyquorum_entity::approval_task::TaskState;
use keyquorum_http::HttpError;
use keyquorum_kms::{KeyManagementClient, PlaintextKey, WrappedKey};

use crate::OutcomeSource;

/// Non-release outcomes of the gate. Pending and rejected tasks are both `Rejected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseDenied {
    NotFound,
    Rejected,
}

impl fmt::Display for ReleaseDenied {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Error for ReleaseDenied {}

impl From<ReleaseDenied> for HttpError {
    fn from(denied: ReleaseDenied) -> Self {
        match denied {
            ReleaseDenied::NotFound => HttpError::NotFound(denied.to_string()),
            ReleaseDenied::Rejected => HttpError::Rejected,
        }
    }
}

/// Unwraps a data key only for clients whose approval task is `Approved`.
///
/// Nothing is cached: every release consults the outcome source and the KMS.
#[derive(Clone)]
pub struct KeyReleaseGate {
    outcomes: Arc<dyn OutcomeSource>,
    kms: Arc<dyn KeyManagementClient>,
}

impl KeyReleaseGate {
    pub fn new(outcomes: Arc<dyn OutcomeSource>, kms: Arc<dyn KeyManagementClient>) -> Self {
        KeyReleaseGate { outcomes, kms }
    }

    pub async fn release_key(
        &self,
        client_id: &str,
        wrapped_key: &WrappedKey,
        key_id: &str,
    ) -> anyhow::Result<PlaintextKey> {
        match self.outcomes.state(client_id).await? {
            None => {
                warn!("Release denied for {}: no approval task", client_id);
                Err(anyhow!(ReleaseDenied::NotFound))
            }
            Some(TaskState::Approved) => {
                let dek = self.kms.unwrap(key_id, wrapped_key).await?;
                info!("Released data key of {} for {}", key_id, client_id);
                Ok(dek)
            }
            Some(_) => {
                warn!("Release denied for {}", client_id);
                Err(anyhow!(ReleaseDenied::Rejected))
            }
        }
    }
}
