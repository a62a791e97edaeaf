use std::sync::Arc;

use anyhow::anyhow;
use log::{info, warn};

use keyquorum_core::{anyhow, log};
use keyquorum_entity::delivery;
use keyquorum_http::{
    ApprovalError, ApprovalNotice, OutcomeResponse, RedeliverResponse, StartApprovalRequest,
    StartApprovalResponse, VoteRequest, VoteResponse,
};

use crate::{ApprovalNotifier, ApprovalPolicy, ApprovalStore, Dispatcher, NewTask};

/// Owns the lifecycle of approval tasks
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn ApprovalStore>,
    dispatcher: Dispatcher,
    callback_address: String,
}

impl Coordinator {
    /// `callback_address` is where approvers send their votes, normally this coordinator's own url
    pub fn new(
        store: Arc<dyn ApprovalStore>,
        notifier: Arc<dyn ApprovalNotifier>,
        callback_address: String,
    ) -> Self {
        Coordinator {
            dispatcher: Dispatcher::new(store.clone(), notifier),
            store,
            callback_address,
        }
    }

    pub fn store(&self) -> Arc<dyn ApprovalStore> {
        self.store.clone()
    }

    pub async fn start_approval(
        &self,
        req: StartApprovalRequest,
    ) -> anyhow::Result<StartApprovalResponse> {
        let policy = ApprovalPolicy::from_threshold(req.threshold, req.approvers.len())?;
        let deliveries = self
            .store
            .create_task(NewTask {
                client_id: req.client_id.clone(),
                content: req.content.clone(),
                callback_address: self.callback_address.clone(),
                approvers: req.approvers,
                policy,
            })
            .await?;
        let accepted_count = deliveries.len();

        // Fan-out is initiated, not awaited
        self.dispatcher.dispatch(
            ApprovalNotice {
                client_id: req.client_id.clone(),
                content: req.content,
                callback_address: self.callback_address.clone(),
            },
            deliveries,
        );
        // The task exists and its fan-out is running
        if let Err(err) = self.store.mark_awaiting(&req.client_id).await {
            warn!(
                "Failed to mark approval {} as awaiting quorum: {}",
                req.client_id, err
            );
        }
        info!(
            "Started approval {} across {} approvers",
            req.client_id, accepted_count
        );

        Ok(StartApprovalResponse {
            client_id: req.client_id,
            accepted_count,
        })
    }

    pub async fn receive_vote(&self, vote: VoteRequest) -> anyhow::Result<VoteResponse> {
        let record = self
            .store
            .apply_vote(&vote.client_id, &vote.approver, vote.decision)
            .await?;
        // Votes on terminal tasks are refused, so this vote decided it
        if record.state().is_terminal() {
            info!("Approval {} decided {:?}", vote.client_id, record.state());
        }
        Ok(VoteResponse {
            client_id: vote.client_id,
            state: record.state(),
        })
    }

    pub async fn get_outcome(&self, client_id: &str) -> anyhow::Result<OutcomeResponse> {
        let record = self
            .store
            .task(client_id)
            .await?
            .ok_or(anyhow!(ApprovalError::UnknownTask))?;
        Ok(OutcomeResponse {
            client_id: client_id.to_string(),
            state: record.state(),
            votes: record.votes(),
        })
    }

    pub async fn list_deliveries(&self, client_id: &str) -> anyhow::Result<Vec<delivery::Model>> {
        if self.store.task(client_id).await?.is_none() {
            return Err(anyhow!(ApprovalError::UnknownTask));
        }
        self.store.deliveries(client_id).await
    }

    /// Re-sends undelivered notifications of a task that is still collecting votes
    pub async fn redeliver(&self, client_id: &str) -> anyhow::Result<RedeliverResponse> {
        let (task, queued) = self.store.requeue_undelivered(client_id).await?;
        let redelivered = queued.len();
        if redelivered > 0 {
            info!("Redelivering {} notifications of {}", redelivered, client_id);
            self.dispatcher.dispatch(
                ApprovalNotice {
                    client_id: task.client_id.clone(),
                    content: task.content,
                    callback_address: task.callback_address,
                },
                queued,
            );
        }
        Ok(RedeliverResponse {
            client_id: task.client_id,
            redelivered,
        })
    }

    /// Dispatches deliveries left `Queued` by a previous run, returns how many were sent
    pub async fn resume_deliveries(&self) -> anyhow::Result<usize> {
        let mut resumed = 0;
        for (task, queued) in self.store.stranded_deliveries().await? {
            info!(
                "Resuming {} queued notifications of {}",
                queued.len(),
                task.client_id
            );
            resumed += queued.len();
            self.dispatcher.dispatch(
                ApprovalNotice {
                    client_id: task.client_id,
                    content: task.content,
                    callback_address: task.callback_address,
                },
                queued,
            );
        }
        Ok(resumed)
    }
}
