use async_trait::async_trait;
use tokio::time::Duration;

use keyquorum_core::{async_trait, serde_json, tokio};
use keyquorum_http::{JsonClient, TransportError, VoteRequest};

/// Outbound transport from an approver back to the coordinator's callback address
#[async_trait]
pub trait VoteForwarder: Send + Sync {
    async fn forward(&self, callback_address: &str, vote: &VoteRequest)
        -> Result<(), TransportError>;
}

#[derive(Clone)]
pub struct HttpVoteForwarder {
    client: JsonClient,
}

impl HttpVoteForwarder {
    pub fn new(timeout: Duration) -> Self {
        HttpVoteForwarder {
            client: JsonClient::new(timeout),
        }
    }
}

#[async_trait]
impl VoteForwarder for HttpVoteForwarder {
    async fn forward(
        &self,
        callback_address: &str,
        vote: &VoteRequest,
    ) -> Result<(), TransportError> {
        let url = format!("{}/vote", callback_address.trim_end_matches('/'));
        let _: serde_json::Value = self.client.post(&url, vote).await?;
        Ok(())
    }
}
