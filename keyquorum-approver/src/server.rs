use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use log::{debug, error, info, warn};
use sea_orm::{entity::*, query::*, sea_query::Expr, DatabaseConnection};

use keyquorum_core::{anyhow, chrono, log, sea_orm, ApproverId};
use keyquorum_entity::{approval_request, ballot::Decision, delivery::DeliveryStatus};
use keyquorum_http::{
    ApprovalError, ApprovalNotice, DecisionResponse, DeliveryReport, HttpError, RequestFilter,
    VoteRequest,
};

use crate::VoteForwarder;

/// One approver endpoint: keeps the tasks it was asked about and the decisions taken on them
#[derive(Clone)]
pub struct ApprovalServer {
    identity: ApproverId,
    database: DatabaseConnection,
    forwarder: Arc<dyn VoteForwarder>,
}

impl ApprovalServer {
    pub fn new(
        identity: ApproverId,
        database: DatabaseConnection,
        forwarder: Arc<dyn VoteForwarder>,
    ) -> Self {
        ApprovalServer {
            identity: identity.normalized(),
            database,
            forwarder,
        }
    }

    pub fn identity(&self) -> &ApproverId {
        &self.identity
    }

    /// Insert-if-absent; a re-delivered task is acknowledged without touching the stored one.
    /// Returns whether a new record was created.
    pub async fn receive_task(&self, notice: ApprovalNotice) -> anyhow::Result<bool> {
        if let Some(existing) = self.find(&notice.client_id).await? {
            if existing.content != notice.content
                || existing.callback_address != notice.callback_address
            {
                warn!(
                    "ApprovalRequest {} re-delivered with different content, keeping the original",
                    notice.client_id
                );
            }
            debug!("ApprovalRequest {} re-delivered", notice.client_id);
            return Ok(false);
        }

        let inserted = approval_request::ActiveModel {
            client_id: Set(notice.client_id.clone()),
            content: Set(notice.content),
            callback_address: Set(notice.callback_address),
            received_at: Set(Utc::now()),
            decision: Set(None),
            decided_at: Set(None),
            delivery_status: Set(None),
            delivery_error: Set(None),
        }
        .insert(&self.database)
        .await;

        match inserted {
            Ok(_) => {
                info!("Received ApprovalRequest {}", notice.client_id);
                Ok(true)
            }
            // Concurrent re-delivery won the insert
            Err(_) if self.find(&notice.client_id).await?.is_some() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Records the decision durably, then forwards it. A failed forward is reported in
    /// the response, never as an error.
    pub async fn submit_decision(
        &self,
        client_id: &str,
        decision: Decision,
    ) -> anyhow::Result<DecisionResponse> {
        let request = self
            .find(client_id)
            .await?
            .ok_or(anyhow!(ApprovalError::UnknownTask))?;
        if request.decision.is_some() {
            return Err(anyhow!(ApprovalError::DuplicateVote));
        }

        let res = approval_request::Entity::update_many()
            .col_expr(
                approval_request::Column::Decision,
                Expr::value(decision),
            )
            .col_expr(
                approval_request::Column::DecidedAt,
                Expr::value(Utc::now()),
            )
            .col_expr(
                approval_request::Column::DeliveryStatus,
                Expr::value(DeliveryStatus::Queued),
            )
            .filter(
                Condition::all()
                    .add(approval_request::Column::ClientId.eq(client_id))
                    .add(approval_request::Column::Decision.is_null()),
            )
            .exec(&self.database)
            .await?;
        if res.rows_affected == 0 {
            return Err(anyhow!(ApprovalError::DuplicateVote));
        }
        info!("Decided {} {:?}", client_id, decision);

        let delivery = self
            .forward(client_id, &request.callback_address, decision)
            .await;
        Ok(DecisionResponse {
            client_id: client_id.to_string(),
            decision,
            delivery,
        })
    }

    /// Re-sends a recorded decision whose delivery failed
    pub async fn redeliver_decision(&self, client_id: &str) -> anyhow::Result<DecisionResponse> {
        let request = self
            .find(client_id)
            .await?
            .ok_or(anyhow!(ApprovalError::UnknownTask))?;
        let decision = request.decision.ok_or(anyhow!(HttpError::BadRequest(format!(
            "No decision recorded for {}",
            client_id
        ))))?;

        let delivery = match request.delivery_status {
            Some(DeliveryStatus::Delivered) => DeliveryReport {
                status: DeliveryStatus::Delivered,
                error: None,
            },
            _ => {
                self.forward(client_id, &request.callback_address, decision)
                    .await
            }
        };
        Ok(DecisionResponse {
            client_id: client_id.to_string(),
            decision,
            delivery,
        })
    }

    pub async fn list_requests(
        &self,
        filter: Option<RequestFilter>,
    ) -> anyhow::Result<Vec<approval_request::Model>> {
        let mut query = approval_request::Entity::find();
        query = match filter {
            Some(RequestFilter::Pending) => {
                query.filter(approval_request::Column::Decision.is_null())
            }
            Some(RequestFilter::Decided) => {
                query.filter(approval_request::Column::Decision.is_not_null())
            }
            None => query,
        };
        Ok(query
            .order_by_asc(approval_request::Column::ReceivedAt)
            .all(&self.database)
            .await?)
    }

    pub async fn request(&self, client_id: &str) -> anyhow::Result<Option<approval_request::Model>> {
        self.find(client_id).await
    }

    async fn find(&self, client_id: &str) -> anyhow::Result<Option<approval_request::Model>> {
        Ok(approval_request::Entity::find_by_id(client_id.to_string())
            .one(&self.database)
            .await?)
    }

    async fn forward(
        &self,
        client_id: &str,
        callback_address: &str,
        decision: Decision,
    ) -> DeliveryReport {
        let vote = VoteRequest {
            client_id: client_id.to_string(),
            approver: self.identity.clone(),
            decision,
        };
        let report = match self.forwarder.forward(callback_address, &vote).await {
            Ok(()) => DeliveryReport {
                status: DeliveryStatus::Delivered,
                error: None,
            },
            // The coordinator already holds this vote, or no longer needs it
            Err(err) if err.status().map(|s| s.as_u16()) == Some(409) => {
                debug!("Coordinator already settled {}: {}", client_id, err);
                DeliveryReport {
                    status: DeliveryStatus::Delivered,
                    error: None,
                }
            }
            Err(err) => {
                warn!(
                    "NotificationDeliveryFailed decision {} -> {}: {}",
                    client_id, callback_address, err
                );
                DeliveryReport {
                    status: DeliveryStatus::Failed,
                    error: Some(err.to_string()),
                }
            }
        };

        // The decision is already durable
        if let Err(err) = self.record_delivery(client_id, &report).await {
            error!("Failed to record delivery status of {}: {}", client_id, err);
        }
        report
    }

    async fn record_delivery(
        &self,
        client_id: &str,
        report: &DeliveryReport,
    ) -> anyhow::Result<()> {
        approval_request::Entity::update_many()
            .col_expr(
                approval_request::Column::DeliveryStatus,
                Expr::value(report.status),
            )
            .col_expr(
                approval_request::Column::DeliveryError,
                Expr::value(report.error.clone()),
            )
            .filter(approval_request::Column::ClientId.eq(client_id))
            .exec(&self.database)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use async_trait::async_trait;

    use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};

    use keyquorum_core::{async_trait, tokio};
    use keyquorum_http::TransportError;
    use keyquorum_migration::testing::testdb;

    /// Records forwarded votes and answers with a scripted result
    struct ScriptedForwarder {
        sent: Mutex<Vec<(String, VoteRequest)>>,
        replies: Mutex<Vec<Result<(), TransportError>>>,
    }

    impl ScriptedForwarder {
        fn new(replies: Vec<Result<(), TransportError>>) -> Arc<Self> {
            Arc::new(ScriptedForwarder {
                sent: Mutex::new(vec![]),
                replies: Mutex::new(replies),
            })
        }

        fn sent(&self) -> Vec<(String, VoteRequest)> {
            self.sent.lock().expect("poisoned").clone()
        }
    }

    #[async_trait]
    impl VoteForwarder for ScriptedForwarder {
        async fn forward(
            &self,
            callback_address: &str,
            vote: &VoteRequest,
        ) -> Result<(), TransportError> {
            self.sent
                .lock()
                .expect("poisoned")
                .push((callback_address.to_string(), vote.clone()));
            let mut replies = self.replies.lock().expect("poisoned");
            if replies.is_empty() {
                Ok(())
            } else {
                replies.remove(0)
            }
        }
    }

    /// Moves the request table away while the vote is in flight
    struct TableHidingForwarder {
        database: DatabaseConnection,
    }

    #[async_trait]
    impl VoteForwarder for TableHidingForwarder {
        async fn forward(
            &self,
            _callback_address: &str,
            _vote: &VoteRequest,
        ) -> Result<(), TransportError> {
            rename_table(&self.database, "approval_requests", "approval_requests_hidden")
                .await
                .map_err(|err| TransportError::Unreachable(err.to_string()))
        }
    }

    async fn rename_table(
        database: &DatabaseConnection,
        from: &str,
        to: &str,
    ) -> Result<(), sea_orm::DbErr> {
        database
            .execute(Statement::from_string(
                DatabaseBackend::Sqlite,
                format!("ALTER TABLE {} RENAME TO {}", from, to),
            ))
            .await?;
        Ok(())
    }

    fn notice(client_id: &str) -> ApprovalNotice {
        ApprovalNotice {
            client_id: client_id.to_string(),
            content: "access request".to_string(),
            callback_address: "http://coordinator:7000".to_string(),
        }
    }

    async fn server(forwarder: Arc<ScriptedForwarder>) -> ApprovalServer {
        let database = testdb().await.expect("Failed to setup testdb");
        ApprovalServer::new(ApproverId::from("http://approver-a:7100/"), database, forwarder)
    }

    #[tokio::test]
    async fn test_receive_task_idempotent() {
        let server = server(ScriptedForwarder::new(vec![])).await;
        assert!(server.receive_task(notice("c1")).await.expect("Failed to receive"));
        let mut changed = notice("c1");
        changed.content = "something else".to_string();
        assert!(!server.receive_task(changed).await.expect("Failed to receive"));

        let all = server.list_requests(None).await.expect("Failed to list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content, "access request");
    }

    #[tokio::test]
    async fn test_submit_decision_forwards_vote() {
        let forwarder = ScriptedForwarder::new(vec![]);
        let server = server(forwarder.clone()).await;
        server.receive_task(notice("c1")).await.expect("Failed to receive");

        let res = server
            .submit_decision("c1", Decision::Approve)
            .await
            .expect("Failed to decide");
        assert_eq!(res.delivery.status, DeliveryStatus::Delivered);

        let sent = forwarder.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "http://coordinator:7000");
        assert_eq!(
            sent[0].1,
            VoteRequest {
                client_id: "c1".to_string(),
                approver: ApproverId::from("http://approver-a:7100"),
                decision: Decision::Approve,
            }
        );

        let err = server
            .submit_decision("c1", Decision::Reject)
            .await
            .expect_err("Second decision accepted");
        assert_eq!(
            err.downcast_ref::<ApprovalError>(),
            Some(&ApprovalError::DuplicateVote)
        );
        let stored = server.request("c1").await.expect("Failed").expect("Missing");
        assert_eq!(stored.decision, Some(Decision::Approve));
        assert_eq!(forwarder.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_decision_survives_callback_failure() {
        let forwarder = ScriptedForwarder::new(vec![
            Err(TransportError::Unreachable("connection refused".to_string())),
            Err(TransportError::Status(409, "DuplicateVote".to_string())),
        ]);
        let server = server(forwarder.clone()).await;
        server.receive_task(notice("c1")).await.expect("Failed to receive");

        let res = server
            .submit_decision("c1", Decision::Reject)
            .await
            .expect("Failed to decide");
        assert_eq!(res.decision, Decision::Reject);
        assert_eq!(res.delivery.status, DeliveryStatus::Failed);
        assert!(res.delivery.error.is_some());

        let stored = server.request("c1").await.expect("Failed").expect("Missing");
        assert_eq!(stored.decision, Some(Decision::Reject));
        assert_eq!(stored.delivery_status, Some(DeliveryStatus::Failed));

        // Coordinator answers 409: it already has the vote
        let res = server
            .redeliver_decision("c1")
            .await
            .expect("Failed to redeliver");
        assert_eq!(res.delivery.status, DeliveryStatus::Delivered);

        // Delivered decisions are not sent again
        server
            .redeliver_decision("c1")
            .await
            .expect("Failed to redeliver");
        assert_eq!(forwarder.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_and_undecided() {
        let server = server(ScriptedForwarder::new(vec![])).await;
        let err = server
            .submit_decision("nope", Decision::Approve)
            .await
            .expect_err("Unknown task accepted");
        assert_eq!(
            err.downcast_ref::<ApprovalError>(),
            Some(&ApprovalError::UnknownTask)
        );

        server.receive_task(notice("c1")).await.expect("Failed to receive");
        let err = server
            .redeliver_decision("c1")
            .await
            .expect_err("Redelivered an undecided task");
        assert!(matches!(
            err.downcast_ref::<HttpError>(),
            Some(HttpError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_list_requests_filter() {
        let server = server(ScriptedForwarder::new(vec![])).await;
        server.receive_task(notice("c1")).await.expect("Failed to receive");
        server.receive_task(notice("c2")).await.expect("Failed to receive");
        server
            .submit_decision("c2", Decision::Approve)
            .await
            .expect("Failed to decide");

        let pending = server
            .list_requests(Some(RequestFilter::Pending))
            .await
            .expect("Failed to list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].client_id, "c1");

        let decided = server
            .list_requests(Some(RequestFilter::Decided))
            .await
            .expect("Failed to list");
        assert_eq!(decided.len(), 1);
        assert_eq!(decided[0].client_id, "c2");
    }

    #[tokio::test]
    async fn test_decision_succeeds_when_status_write_fails() {
        let database = testdb().await.expect("Failed to setup testdb");
        let server = ApprovalServer::new(
            ApproverId::from("http://approver-a:7100/"),
            database.clone(),
            Arc::new(TableHidingForwarder {
                database: database.clone(),
            }),
        );
        server.receive_task(notice("c1")).await.expect("Failed to receive");

        let res = server
            .submit_decision("c1", Decision::Approve)
            .await
            .expect("Failed to decide");
        assert_eq!(res.decision, Decision::Approve);
        assert_eq!(res.delivery.status, DeliveryStatus::Delivered);

        rename_table(&database, "approval_requests_hidden", "approval_requests")
            .await
            .expect("Failed to restore table");
        let stored = server.request("c1").await.expect("Failed").expect("Missing");
        assert_eq!(stored.decision, Some(Decision::Approve));
        assert_eq!(stored.delivery_status, Some(DeliveryStatus::Queued));
    }
}
