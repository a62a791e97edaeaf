use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::time::Duration;

use keyquorum_coordinator::ApprovalStore;
use keyquorum_core::{anyhow, async_trait, tokio};
use keyquorum_entity::approval_task::TaskState;
use keyquorum_http::{endpoint_url, HttpError, JsonClient, OutcomeResponse};

/// Where the gate learns the state of an approval task
#[async_trait]
pub trait OutcomeSource: Send + Sync {
    /// `None` when no task exists for `client_id`
    async fn state(&self, client_id: &str) -> anyhow::Result<Option<TaskState>>;
}

/// Reads the approval store directly, for a gate that shares the coordinator's database
#[derive(Clone)]
pub struct StoreOutcomeSource {
    store: Arc<dyn ApprovalStore>,
}

impl StoreOutcomeSource {
    pub fn new(store: Arc<dyn ApprovalStore>) -> Self {
        StoreOutcomeSource { store }
    }
}

#[async_trait]
impl OutcomeSource for StoreOutcomeSource {
    async fn state(&self, client_id: &str) -> anyhow::Result<Option<TaskState>> {
        Ok(self.store.task(client_id).await?.map(|record| record.state()))
    }
}

/// Asks a coordinator over `GET /outcome/{client_id}`
#[derive(Clone)]
pub struct RemoteOutcomeSource {
    coordinator_url: String,
    client: JsonClient,
}

impl RemoteOutcomeSource {
    pub fn new(coordinator_url: String, timeout: Duration) -> Self {
        RemoteOutcomeSource {
            coordinator_url: coordinator_url.trim_end_matches('/').to_string(),
            client: JsonClient::new(timeout),
        }
    }
}

#[async_trait]
impl OutcomeSource for RemoteOutcomeSource {
    async fn state(&self, client_id: &str) -> anyhow::Result<Option<TaskState>> {
        let url = endpoint_url(&self.coordinator_url, &["outcome", client_id])
            .map_err(|err| anyhow!(HttpError::BadGateway(format!("coordinator {}", err))))?;
        match self.client.get::<OutcomeResponse>(url.as_str()).await {
            Ok(outcome) => Ok(Some(outcome.state)),
            Err(err) if err.status().map(|s| s.as_u16()) == Some(404) => Ok(None),
            Err(err) => Err(anyhow!(HttpError::BadGateway(format!(
                "coordinator {}",
                err
            )))),
        }
    }
}
