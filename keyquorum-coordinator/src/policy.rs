use keyquorum_entity::{approval_task::TaskState, ballot::Decision};
use keyquorum_http::ApprovalError;

/// How many approvals a task needs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalPolicy {
    /// Every expected approver must approve. A single reject decides the task.
    Unanimous,
    Threshold(u32),
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        ApprovalPolicy::Unanimous
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub expected: usize,
    pub approvals: usize,
    pub rejections: usize,
}

impl Tally {
    pub fn from_decisions<'a>(
        expected: usize,
        decisions: impl IntoIterator<Item = &'a Option<Decision>>,
    ) -> Self {
        decisions.into_iter().fold(
            Tally {
                expected,
                ..Default::default()
            },
            |mut tally, decision| {
                match decision {
                    Some(Decision::Approve) => tally.approvals += 1,
                    Some(Decision::Reject) => tally.rejections += 1,
                    None => {}
                }
                tally
            },
        )
    }

    pub fn outstanding(&self) -> usize {
        self.expected
            .saturating_sub(self.approvals)
            .saturating_sub(self.rejections)
    }
}

impl ApprovalPolicy {
    pub fn from_threshold(threshold: Option<u32>, expected: usize) -> Result<Self, ApprovalError> {
        match threshold {
            None => Ok(ApprovalPolicy::Unanimous),
            Some(k) if k >= 1 && k as usize <= expected => {
                if k as usize == expected {
                    Ok(ApprovalPolicy::Unanimous)
                } else {
                    Ok(ApprovalPolicy::Threshold(k))
                }
            }
            Some(_) => Err(ApprovalError::InvalidThreshold),
        }
    }

    /// Approvals required out of `expected`
    pub fn required(&self, expected: usize) -> usize {
        match self {
            ApprovalPolicy::Unanimous => expected,
            ApprovalPolicy::Threshold(k) => (*k as usize).min(expected),
        }
    }

    /// Terminal state implied by the tally, if any
    pub fn evaluate(&self, tally: &Tally) -> Option<TaskState> {
        let required = self.required(tally.expected);
        if tally.approvals >= required {
            Some(TaskState::Approved)
        } else if tally.approvals + tally.outstanding() < required {
            Some(TaskState::Rejected)
        } else {
            None
        }
    }
}
