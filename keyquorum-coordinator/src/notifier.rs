use async_trait::async_trait;
use tokio::time::Duration;

use keyquorum_core::{async_trait, serde_json, tokio, ApproverId};
use keyquorum_http::{ApprovalNotice, JsonClient, TransportError};

/// Outbound transport from the coordinator to approver endpoints
#[async_trait]
pub trait ApprovalNotifier: Send + Sync {
    async fn notify(&self, target: &ApproverId, notice: &ApprovalNotice)
        -> Result<(), TransportError>;
}

/// `POST {approver}/approval`, one attempt bounded by the client timeout
#[derive(Clone)]
pub struct HttpApprovalNotifier {
    client: JsonClient,
}

impl HttpApprovalNotifier {
    pub fn new(timeout: Duration) -> Self {
        HttpApprovalNotifier {
            client: JsonClient::new(timeout),
        }
    }
}

#[async_trait]
impl ApprovalNotifier for HttpApprovalNotifier {
    async fn notify(
        &self,
        target: &ApproverId,
        notice: &ApprovalNotice,
    ) -> Result<(), TransportError> {
        let _: serde_json::Value = self.client.post(&target.join("approval"), notice).await?;
        Ok(())
    }
}
