use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::voucher::{ApprovalAction, ApproverRole, VoucherStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherEvent {
    Submit,
    Approve,
    Reject,
}

impl VoucherEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for VoucherEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who should hear about a transition once it has committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTarget {
    Supervisor,
    NextApprover(ApproverRole),
    Employee,
    Accountant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEffect {
    StampSubmittedAt,
    ClearRejectionReason,
    SetRejectionReason,
    RecordHistory { role: ApproverRole, action: ApprovalAction },
    Notify(NotificationTarget),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: VoucherStatus,
    pub to: VoucherStatus,
    pub event: VoucherEvent,
    pub effects: Vec<FlowEffect>,
}

impl TransitionOutcome {
    pub fn notification_targets(&self) -> impl Iterator<Item = NotificationTarget> + '_ {
        self.effects.iter().filter_map(|effect| match effect {
            FlowEffect::Notify(target) => Some(*target),
            _ => None,
        })
    }

    pub fn is_final_approval(&self) -> bool {
        self.event == VoucherEvent::Approve && self.to == VoucherStatus::Approved
    }
}
