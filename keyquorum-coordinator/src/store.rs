use std::collections::HashSet;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use sea_orm::{entity::*, query::*, DatabaseConnection};
use uuid::Uuid;

use keyquorum_core::{anyhow, async_trait, chrono, log, sea_orm, uuid, ApproverId};
use keyquorum_entity::{
    approval_task::{self, TaskState},
    ballot::{self, Decision},
    delivery::{self, DeliveryStatus},
};
use keyquorum_http::{ApprovalError, VoteEntry};

use crate::{ApprovalPolicy, TaskGuard, TaskLocks, Tally};

#[derive(Clone, Debug, PartialEq)]
pub struct NewTask {
    pub client_id: String,
    pub content: String,
    pub callback_address: String,
    pub approvers: Vec<ApproverId>,
    pub policy: ApprovalPolicy,
}

impl NewTask {
    /// Approvers normalized, non-empty and unique
    pub fn validate(&self) -> Result<Vec<ApproverId>, ApprovalError> {
        if self.approvers.is_empty() {
            return Err(ApprovalError::EmptyApproverSet);
        }
        let approvers: Vec<ApproverId> = self.approvers.iter().map(|a| a.normalized()).collect();
        let unique: HashSet<&ApproverId> = approvers.iter().collect();
        if unique.len() != approvers.len() {
            return Err(ApprovalError::DuplicateApprover);
        }
        if let ApprovalPolicy::Threshold(k) = self.policy {
            if k == 0 || k as usize > approvers.len() {
                return Err(ApprovalError::InvalidThreshold);
            }
        }
        Ok(approvers)
    }
}

/// Snapshot of one task and its ballots, ballots in approver order
#[derive(Clone, Debug, PartialEq)]
pub struct TaskRecord {
    pub task: approval_task::Model,
    pub ballots: Vec<ballot::Model>,
}

impl TaskRecord {
    pub fn state(&self) -> TaskState {
        self.task.state
    }

    pub fn expected_approvers(&self) -> Vec<ApproverId> {
        self.ballots
            .iter()
            .map(|b| ApproverId(b.approver.clone()))
            .collect()
    }

    pub fn votes(&self) -> Vec<VoteEntry> {
        self.ballots
            .iter()
            .filter_map(|b| {
                b.decision.map(|decision| VoteEntry {
                    approver: ApproverId(b.approver.clone()),
                    decision,
                })
            })
            .collect()
    }

    pub fn tally(&self) -> Tally {
        Tally::from_decisions(
            self.task.expected_count as usize,
            self.ballots.iter().map(|b| &b.decision),
        )
    }
}

/// Durable record of approval tasks, their votes and their outbound deliveries
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Insert-if-absent. Queues one delivery per approver in the same transaction.
    async fn create_task(&self, task: NewTask) -> anyhow::Result<Vec<delivery::Model>>;

    /// `Pending -> AwaitingQuorum`; no-op in any other state
    async fn mark_awaiting(&self, client_id: &str) -> anyhow::Result<()>;

    /// Appends a vote and re-evaluates the task as one atomic step
    async fn apply_vote(
        &self,
        client_id: &str,
        approver: &ApproverId,
        decision: Decision,
    ) -> anyhow::Result<TaskRecord>;

    async fn task(&self, client_id: &str) -> anyhow::Result<Option<TaskRecord>>;

    async fn deliveries(&self, client_id: &str) -> anyhow::Result<Vec<delivery::Model>>;

    async fn record_delivery(
        &self,
        delivery_id: &str,
        result: Result<(), String>,
    ) -> anyhow::Result<delivery::Model>;

    /// Every undelivered notification of a live task, failed ones reset to `Queued`.
    ///
    /// Rows still `Queued` are included, a send may have died with the process.
    async fn requeue_undelivered(
        &self,
        client_id: &str,
    ) -> anyhow::Result<(approval_task::Model, Vec<delivery::Model>)>;

    /// `Queued` deliveries of live tasks, grouped by task
    async fn stranded_deliveries(
        &self,
    ) -> anyhow::Result<Vec<(approval_task::Model, Vec<delivery::Model>)>>;
}

#[derive(Clone)]
pub struct DatabaseApprovalStore {
    database: DatabaseConnection,
    locks: TaskLocks,
}

impl DatabaseApprovalStore {
    pub fn new(database: DatabaseConnection) -> Self {
        DatabaseApprovalStore {
            database,
            locks: TaskLocks::new(),
        }
    }

    async fn guard(&self, client_id: &str) -> TaskGuard {
        self.locks.lock(client_id).await
    }

    async fn load_ballots<C: ConnectionTrait>(
        conn: &C,
        client_id: &str,
    ) -> anyhow::Result<Vec<ballot::Model>> {
        Ok(ballot::Entity::find()
            .filter(ballot::Column::ClientId.eq(client_id))
            .order_by_asc(ballot::Column::Position)
            .all(conn)
            .await?)
    }
}

#[async_trait]
impl ApprovalStore for DatabaseApprovalStore {
    async fn create_task(&self, new_task: NewTask) -> anyhow::Result<Vec<delivery::Model>> {
        let approvers = new_task.validate()?;
        let expected = approvers.len();
        let threshold = new_task.policy.required(expected);

        let _guard = self.guard(&new_task.client_id).await;
        let txn = self.database.begin().await?;

        if approval_task::Entity::find_by_id(new_task.client_id.clone())
            .one(&txn)
            .await?
            .is_some()
        {
            return Err(anyhow!(ApprovalError::DuplicateTask));
        }

        let now = Utc::now();
        approval_task::ActiveModel {
            client_id: Set(new_task.client_id.clone()),
            content: Set(new_task.content.clone()),
            callback_address: Set(new_task.callback_address.clone()),
            threshold: Set(threshold as i32),
            expected_count: Set(expected as i32),
            state: Set(TaskState::Pending),
            created_at: Set(now),
            updated_at: Set(now),
            decided_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let mut deliveries = Vec::with_capacity(expected);
        for (position, approver) in approvers.iter().enumerate() {
            ballot::ActiveModel {
                client_id: Set(new_task.client_id.clone()),
                approver: Set(approver.0.clone()),
                position: Set(position as i32),
                decision: Set(None),
                voted_at: Set(None),
            }
            .insert(&txn)
            .await?;

            deliveries.push(
                delivery::ActiveModel {
                    id: Set(Uuid::new_v4().to_simple().to_string()),
                    client_id: Set(new_task.client_id.clone()),
                    target: Set(approver.0.clone()),
                    status: Set(DeliveryStatus::Queued),
                    attempts: Set(0),
                    last_error: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?,
            );
        }

        txn.commit().await?;
        debug!(
            "Created ApprovalTask {} ({} of {})",
            new_task.client_id, threshold, expected
        );
        Ok(deliveries)
    }

    async fn mark_awaiting(&self, client_id: &str) -> anyhow::Result<()> {
        let _guard = self.guard(client_id).await;
        let txn = self.database.begin().await?;
        let task = approval_task::Entity::find_by_id(client_id.to_string())
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(anyhow!(ApprovalError::UnknownTask))?;
        if task.state == TaskState::Pending {
            let mut task: approval_task::ActiveModel = task.into();
            task.state = Set(TaskState::AwaitingQuorum);
            task.updated_at = Set(Utc::now());
            task.update(&txn).await?;
        }
        txn.commit().await?;
        Ok(())
    }

    async fn apply_vote(
        &self,
        client_id: &str,
        approver: &ApproverId,
        decision: Decision,
    ) -> anyhow::Result<TaskRecord> {
        let approver = approver.normalized();

        let _guard = self.guard(client_id).await;
        let txn = self.database.begin().await?;

        let task = approval_task::Entity::find_by_id(client_id.to_string())
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(anyhow!(ApprovalError::UnknownTask))?;
        if task.state.is_terminal() {
            return Err(anyhow!(ApprovalError::TaskAlreadyTerminal));
        }

        let ballot = ballot::Entity::find_by_id((client_id.to_string(), approver.0.clone()))
            .one(&txn)
            .await?
            .ok_or(anyhow!(ApprovalError::UnknownApprover))?;
        if ballot.decision.is_some() {
            return Err(anyhow!(ApprovalError::DuplicateVote));
        }

        let now = Utc::now();
        let mut ballot: ballot::ActiveModel = ballot.into();
        ballot.decision = Set(Some(decision));
        ballot.voted_at = Set(Some(now));
        ballot.update(&txn).await?;

        let ballots = Self::load_ballots(&txn, client_id).await?;
        let tally = Tally::from_decisions(
            task.expected_count as usize,
            ballots.iter().map(|b| &b.decision),
        );
        let policy = ApprovalPolicy::Threshold(task.threshold as u32);

        let mut task: approval_task::ActiveModel = task.into();
        if let Some(terminal) = policy.evaluate(&tally) {
            task.state = Set(terminal);
            task.decided_at = Set(Some(now));
        }
        task.updated_at = Set(now);
        let task = task.update(&txn).await?;

        txn.commit().await?;
        debug!(
            "ApprovalTask {} vote {} {:?} -> {:?}",
            client_id, approver, decision, task.state
        );
        Ok(TaskRecord { task, ballots })
    }

    async fn task(&self, client_id: &str) -> anyhow::Result<Option<TaskRecord>> {
        let task = match approval_task::Entity::find_by_id(client_id.to_string())
            .one(&self.database)
            .await?
        {
            Some(task) => task,
            None => return Ok(None),
        };
        let ballots = Self::load_ballots(&self.database, client_id).await?;
        Ok(Some(TaskRecord { task, ballots }))
    }

    async fn deliveries(&self, client_id: &str) -> anyhow::Result<Vec<delivery::Model>> {
        Ok(delivery::Entity::find()
            .filter(delivery::Column::ClientId.eq(client_id))
            .order_by_asc(delivery::Column::CreatedAt)
            .order_by_asc(delivery::Column::Target)
            .all(&self.database)
            .await?)
    }

    async fn record_delivery(
        &self,
        delivery_id: &str,
        result: Result<(), String>,
    ) -> anyhow::Result<delivery::Model> {
        let txn = self.database.begin().await?;
        let d = delivery::Entity::find_by_id(delivery_id.to_string())
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(anyhow!("Delivery {} not found", delivery_id))?;
        let attempts = d.attempts + 1;
        let mut d: delivery::ActiveModel = d.into();
        d.attempts = Set(attempts);
        match result {
            Ok(()) => {
                d.status = Set(DeliveryStatus::Delivered);
                d.last_error = Set(None);
            }
            Err(err) => {
                d.status = Set(DeliveryStatus::Failed);
                d.last_error = Set(Some(err));
            }
        }
        d.updated_at = Set(Utc::now());
        let d = d.update(&txn).await?;
        txn.commit().await?;
        Ok(d)
    }

    async fn requeue_undelivered(
        &self,
        client_id: &str,
    ) -> anyhow::Result<(approval_task::Model, Vec<delivery::Model>)> {
        let _guard = self.guard(client_id).await;
        let txn = self.database.begin().await?;

        let task = approval_task::Entity::find_by_id(client_id.to_string())
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or(anyhow!(ApprovalError::UnknownTask))?;
        if task.state.is_terminal() {
            return Err(anyhow!(ApprovalError::TaskAlreadyTerminal));
        }

        let undelivered = delivery::Entity::find()
            .filter(
                Condition::all()
                    .add(delivery::Column::ClientId.eq(client_id))
                    .add(delivery::Column::Status.ne(DeliveryStatus::Delivered)),
            )
            .order_by_asc(delivery::Column::Target)
            .lock_exclusive()
            .all(&txn)
            .await?;

        let now = Utc::now();
        let mut queued = Vec::with_capacity(undelivered.len());
        for d in undelivered {
            if d.status == DeliveryStatus::Queued {
                queued.push(d);
                continue;
            }
            let mut d: delivery::ActiveModel = d.into();
            d.status = Set(DeliveryStatus::Queued);
            d.updated_at = Set(now);
            queued.push(d.update(&txn).await?);
        }

        txn.commit().await?;
        Ok((task, queued))
    }

    async fn stranded_deliveries(
        &self,
    ) -> anyhow::Result<Vec<(approval_task::Model, Vec<delivery::Model>)>> {
        let queued = delivery::Entity::find()
            .filter(delivery::Column::Status.eq(DeliveryStatus::Queued))
            .order_by_asc(delivery::Column::ClientId)
            .order_by_asc(delivery::Column::Target)
            .find_also_related(approval_task::Entity)
            .all(&self.database)
            .await?;

        let mut stranded: Vec<(approval_task::Model, Vec<delivery::Model>)> = vec![];
        for (d, task) in queued {
            let task = match task {
                Some(task) if !task.state.is_terminal() => task,
                _ => continue,
            };
            match stranded.last_mut() {
                Some((last, deliveries)) if last.client_id == task.client_id => deliveries.push(d),
                _ => stranded.push((task, vec![d])),
            }
        }
        Ok(stranded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyquorum_core::tokio;
    use keyquorum_migration::testing::testdb;

    fn new_task(client_id: &str, approvers: &[&str], policy: ApprovalPolicy) -> NewTask {
        NewTask {
            client_id: client_id.to_string(),
            content: "access request".to_string(),
            callback_address: "http://coordinator".to_string(),
            approvers: approvers.iter().map(|a| ApproverId::from(*a)).collect(),
            policy,
        }
    }

    async fn store() -> DatabaseApprovalStore {
        DatabaseApprovalStore::new(testdb().await.expect("Failed to setup testdb"))
    }

    fn approval_error(err: anyhow::Error) -> ApprovalError {
        err.downcast().expect("Not an ApprovalError")
    }

    #[tokio::test]
    async fn test_create_task() {
        let store = store().await;
        let deliveries = store
            .create_task(new_task("c1", &["A", "B", "C"], ApprovalPolicy::Unanimous))
            .await
            .expect("Failed to create task");
        assert_eq!(deliveries.len(), 3);
        assert!(deliveries.iter().all(|d| d.status == DeliveryStatus::Queued));

        let record = store
            .task("c1")
            .await
            .expect("Failed to load task")
            .expect("Missing task");
        assert_eq!(record.state(), TaskState::Pending);
        assert_eq!(record.task.threshold, 3);
        assert_eq!(
            record.expected_approvers(),
            vec![
                ApproverId::from("A"),
                ApproverId::from("B"),
                ApproverId::from("C")
            ]
        );
        assert!(record.votes().is_empty());

        store.mark_awaiting("c1").await.expect("Failed to mark");
        assert_eq!(
            store.task("c1").await.expect("Failed").expect("Missing").state(),
            TaskState::AwaitingQuorum
        );
    }

    #[tokio::test]
    async fn test_create_task_rejects_duplicates_and_bad_sets() {
        let store = store().await;
        store
            .create_task(new_task("c1", &["A"], ApprovalPolicy::Unanimous))
            .await
            .expect("Failed to create task");
        let err = store
            .create_task(new_task("c1", &["B"], ApprovalPolicy::Unanimous))
            .await
            .expect_err("Duplicate accepted");
        assert_eq!(approval_error(err), ApprovalError::DuplicateTask);
        // Original task untouched
        let record = store.task("c1").await.expect("Failed").expect("Missing");
        assert_eq!(record.expected_approvers(), vec![ApproverId::from("A")]);

        let err = store
            .create_task(new_task("c2", &[], ApprovalPolicy::Unanimous))
            .await
            .expect_err("Empty set accepted");
        assert_eq!(approval_error(err), ApprovalError::EmptyApproverSet);

        let err = store
            .create_task(new_task(
                "c3",
                &["http://a:1/", "http://a:1"],
                ApprovalPolicy::Unanimous,
            ))
            .await
            .expect_err("Duplicate approver accepted");
        assert_eq!(approval_error(err), ApprovalError::DuplicateApprover);

        let err = store
            .create_task(new_task("c4", &["A", "B"], ApprovalPolicy::Threshold(3)))
            .await
            .expect_err("Threshold accepted");
        assert_eq!(approval_error(err), ApprovalError::InvalidThreshold);
        assert!(store.task("c2").await.expect("Failed").is_none());
    }

    #[tokio::test]
    async fn test_unanimous_approval() {
        let store = store().await;
        store
            .create_task(new_task("c1", &["A", "B", "C"], ApprovalPolicy::Unanimous))
            .await
            .expect("Failed to create task");
        store.mark_awaiting("c1").await.expect("Failed to mark");

        for a in ["A", "B"] {
            let record = store
                .apply_vote("c1", &ApproverId::from(a), Decision::Approve)
                .await
                .expect("Failed to vote");
            assert_eq!(record.state(), TaskState::AwaitingQuorum);
        }
        let record = store
            .apply_vote("c1", &ApproverId::from("C"), Decision::Approve)
            .await
            .expect("Failed to vote");
        assert_eq!(record.state(), TaskState::Approved);
        assert!(record.task.decided_at.is_some());
        assert_eq!(record.votes().len(), 3);
    }

    #[tokio::test]
    async fn test_reject_short_circuits_and_freezes() {
        let store = store().await;
        store
            .create_task(new_task("c1", &["A", "B", "C"], ApprovalPolicy::Unanimous))
            .await
            .expect("Failed to create task");
        store.mark_awaiting("c1").await.expect("Failed to mark");

        store
            .apply_vote("c1", &ApproverId::from("A"), Decision::Approve)
            .await
            .expect("Failed to vote");
        let record = store
            .apply_vote("c1", &ApproverId::from("B"), Decision::Reject)
            .await
            .expect("Failed to vote");
        assert_eq!(record.state(), TaskState::Rejected);

        let err = store
            .apply_vote("c1", &ApproverId::from("C"), Decision::Approve)
            .await
            .expect_err("Vote on terminal task accepted");
        assert_eq!(approval_error(err), ApprovalError::TaskAlreadyTerminal);

        let record = store.task("c1").await.expect("Failed").expect("Missing");
        assert_eq!(record.state(), TaskState::Rejected);
        assert_eq!(
            record.votes(),
            vec![
                VoteEntry {
                    approver: ApproverId::from("A"),
                    decision: Decision::Approve
                },
                VoteEntry {
                    approver: ApproverId::from("B"),
                    decision: Decision::Reject
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_reject_in_any_position() {
        for rejecter in 0..3 {
            let store = store().await;
            let approvers = ["A", "B", "C"];
            store
                .create_task(new_task("c1", &approvers, ApprovalPolicy::Unanimous))
                .await
                .expect("Failed to create task");
            for (i, a) in approvers.iter().enumerate().take(rejecter + 1) {
                let decision = if i == rejecter {
                    Decision::Reject
                } else {
                    Decision::Approve
                };
                let record = store
                    .apply_vote("c1", &ApproverId::from(*a), decision)
                    .await
                    .expect("Failed to vote");
                if i == rejecter {
                    assert_eq!(record.state(), TaskState::Rejected);
                } else {
                    assert!(!record.state().is_terminal());
                }
            }
        }
    }

    #[tokio::test]
    async fn test_duplicate_and_unknown_votes_do_not_mutate() {
        let store = store().await;
        store
            .create_task(new_task("c1", &["A", "B"], ApprovalPolicy::Unanimous))
            .await
            .expect("Failed to create task");
        store
            .apply_vote("c1", &ApproverId::from("A"), Decision::Approve)
            .await
            .expect("Failed to vote");
        let before = store.task("c1").await.expect("Failed").expect("Missing");

        let err = store
            .apply_vote("c1", &ApproverId::from("A"), Decision::Reject)
            .await
            .expect_err("Duplicate vote accepted");
        assert_eq!(approval_error(err), ApprovalError::DuplicateVote);

        let err = store
            .apply_vote("c1", &ApproverId::from("Z"), Decision::Approve)
            .await
            .expect_err("Unknown approver accepted");
        assert_eq!(approval_error(err), ApprovalError::UnknownApprover);

        let err = store
            .apply_vote("nope", &ApproverId::from("A"), Decision::Approve)
            .await
            .expect_err("Unknown task accepted");
        assert_eq!(approval_error(err), ApprovalError::UnknownTask);

        let after = store.task("c1").await.expect("Failed").expect("Missing");
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_threshold_task() {
        let store = store().await;
        store
            .create_task(new_task("c1", &["A", "B", "C"], ApprovalPolicy::Threshold(2)))
            .await
            .expect("Failed to create task");
        let record = store
            .apply_vote("c1", &ApproverId::from("A"), Decision::Reject)
            .await
            .expect("Failed to vote");
        assert_eq!(record.state(), TaskState::Pending);
        store
            .apply_vote("c1", &ApproverId::from("B"), Decision::Approve)
            .await
            .expect("Failed to vote");
        let record = store
            .apply_vote("c1", &ApproverId::from("C"), Decision::Approve)
            .await
            .expect("Failed to vote");
        assert_eq!(record.state(), TaskState::Approved);
    }

    #[tokio::test]
    async fn test_concurrent_votes() {
        let store = store().await;
        let approvers: Vec<String> = (0..6).map(|i| format!("http://approver-{}", i)).collect();
        let refs: Vec<&str> = approvers.iter().map(|a| a.as_str()).collect();
        store
            .create_task(new_task("c1", &refs, ApprovalPolicy::Unanimous))
            .await
            .expect("Failed to create task");

        let mut handles = vec![];
        for a in approvers.iter().cloned() {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .apply_vote("c1", &ApproverId::from(a), Decision::Approve)
                    .await
                    .map(|r| r.state())
            }));
        }
        let mut states = vec![];
        for h in handles {
            states.push(h.await.expect("task panicked").expect("Failed to vote"));
        }
        assert_eq!(
            states
                .iter()
                .filter(|s| **s == TaskState::Approved)
                .count(),
            1
        );
        let record = store.task("c1").await.expect("Failed").expect("Missing");
        assert_eq!(record.state(), TaskState::Approved);
        assert_eq!(record.votes().len(), 6);
    }

    #[tokio::test]
    async fn test_delivery_bookkeeping() {
        let store = store().await;
        let deliveries = store
            .create_task(new_task("c1", &["A", "B"], ApprovalPolicy::Unanimous))
            .await
            .expect("Failed to create task");
        store
            .record_delivery(&deliveries[0].id, Ok(()))
            .await
            .expect("Failed to record");
        let failed = store
            .record_delivery(&deliveries[1].id, Err("connection refused".to_string()))
            .await
            .expect("Failed to record");
        assert_eq!(failed.status, DeliveryStatus::Failed);
        assert_eq!(failed.attempts, 1);
        assert_eq!(failed.last_error.as_deref(), Some("connection refused"));

        let (_, queued) = store.requeue_undelivered("c1").await.expect("Failed to requeue");
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id, deliveries[1].id);
        assert_eq!(queued[0].status, DeliveryStatus::Queued);

        for a in ["A", "B"] {
            store
                .apply_vote("c1", &ApproverId::from(a), Decision::Approve)
                .await
                .expect("Failed to vote");
        }
        let err = store
            .requeue_undelivered("c1")
            .await
            .expect_err("Requeue on terminal task accepted");
        assert_eq!(approval_error(err), ApprovalError::TaskAlreadyTerminal);
    }

    #[tokio::test]
    async fn test_stranded_queued_deliveries() {
        let store = store().await;
        // No send ever recorded a result, as after a crash right after creation
        store
            .create_task(new_task("c1", &["A", "B"], ApprovalPolicy::Unanimous))
            .await
            .expect("Failed to create task");
        let deliveries = store
            .create_task(new_task("c2", &["A", "B"], ApprovalPolicy::Unanimous))
            .await
            .expect("Failed to create task");
        store
            .record_delivery(&deliveries[0].id, Ok(()))
            .await
            .expect("Failed to record");
        store
            .create_task(new_task("c3", &["A"], ApprovalPolicy::Unanimous))
            .await
            .expect("Failed to create task");
        store
            .apply_vote("c3", &ApproverId::from("A"), Decision::Reject)
            .await
            .expect("Failed to vote");

        let stranded = store
            .stranded_deliveries()
            .await
            .expect("Failed to list stranded deliveries");
        let summary: Vec<(String, usize)> = stranded
            .iter()
            .map(|(task, ds)| (task.client_id.clone(), ds.len()))
            .collect();
        assert_eq!(
            summary,
            vec![("c1".to_string(), 2), ("c2".to_string(), 1)]
        );

        let (_, queued) = store
            .requeue_undelivered("c1")
            .await
            .expect("Failed to requeue");
        assert_eq!(queued.len(), 2);
        assert!(queued.iter().all(|d| d.status == DeliveryStatus::Queued));

        let (_, queued) = store
            .requeue_undelivered("c2")
            .await
            .expect("Failed to requeue");
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].target, "B");
    }
}
