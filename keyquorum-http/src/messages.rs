use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use keyquorum_core::{serde, zeroize, ApproverId};
use keyquorum_encryption::Cipher;
use keyquorum_entity::{approval_task::TaskState, ballot::Decision, delivery::DeliveryStatus};
use keyquorum_kms::WrappedKey;

/// Coordinator to approver: `POST /approval`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct ApprovalNotice {
    pub client_id: String,
    pub content: String,
    pub callback_address: String,
}

/// Operator to approver: `POST /decision`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct DecisionRequest {
    pub client_id: String,
    pub decision: Decision,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct DeliveryReport {
    pub status: DeliveryStatus,
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct DecisionResponse {
    pub client_id: String,
    pub decision: Decision,
    pub delivery: DeliveryReport,
}

/// Approver to coordinator: `POST /vote`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct VoteRequest {
    pub client_id: String,
    pub approver: ApproverId,
    pub decision: Decision,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct VoteResponse {
    pub client_id: String,
    pub state: TaskState,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct VoteEntry {
    pub approver: ApproverId,
    pub decision: Decision,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct OutcomeResponse {
    pub client_id: String,
    pub state: TaskState,
    pub votes: Vec<VoteEntry>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct StartApprovalRequest {
    pub client_id: String,
    pub approvers: Vec<ApproverId>,
    pub content: String,
    /// Approvals required; all approvers when absent
    #[serde(default)]
    pub threshold: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct StartApprovalResponse {
    pub client_id: String,
    pub accepted_count: usize,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct RedeliverResponse {
    pub client_id: String,
    pub redelivered: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde", rename_all = "lowercase")]
pub enum RequestFilter {
    Pending,
    Decided,
}

/// `GET /approvals?type=pending|decided`
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct ListRequestsQuery {
    #[serde(rename = "type")]
    pub filter: Option<RequestFilter>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct ReleaseRequest {
    pub client_id: String,
    pub wrapped_key: WrappedKey,
    pub key_id: String,
}

/// Base64 data key handed to the requester. Zeroed on drop.
#[derive(Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct ReleaseResponse {
    pub dek: String,
}

impl fmt::Debug for ReleaseResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ReleaseResponse([REDACTED])")
    }
}

impl Drop for ReleaseResponse {
    fn drop(&mut self) {
        self.dek.zeroize();
    }
}

/// `POST /envelope/seal?key_name=...`; the body is the raw payload
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct SealQuery {
    pub key_name: String,
    pub cipher: Option<Cipher>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(crate = "keyquorum_core::serde")]
pub struct VersionResponse {
    pub name: String,
    pub version: String,
}
