use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::voucher::{ApproverRole, VoucherId, VoucherMonth};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    Submitted,
    ForwardedForApproval { next_role: ApproverRole },
    FullyApproved,
    ReadyForProcessing,
    Returned,
}

impl NotificationKind {
    /// Action label carried on the wire to the e-mail service.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Submitted => "submit",
            Self::ForwardedForApproval { .. } | Self::FullyApproved => "approve",
            Self::ReadyForProcessing => "final_approval",
            Self::Returned => "reject",
        }
    }
}

/// Voucher facts rendered into every notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherSummary {
    pub voucher_id: VoucherId,
    pub employee_name: String,
    pub month: VoucherMonth,
    pub total_miles: Decimal,
    pub rejection_reason: Option<String>,
}

impl VoucherSummary {
    pub fn miles_display(&self) -> String {
        format!("{:.1}", self.total_miles.round_dp(1))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: String,
    pub summary: VoucherSummary,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub subject: String,
    pub heading: String,
    pub message: String,
    pub cta_label: String,
    pub cta_path: String,
}

impl Notification {
    pub fn template(&self) -> NotificationTemplate {
        let summary = &self.summary;
        let month = summary.month.display_name();
        match self.kind {
            NotificationKind::Submitted => NotificationTemplate {
                subject: format!(
                    "Mileage Voucher Pending Approval - {} ({month})",
                    summary.employee_name
                ),
                heading: "Mileage Voucher Awaiting Your Approval".to_owned(),
                message: "A new mileage voucher has been submitted and requires your approval."
                    .to_owned(),
                cta_label: "Review & Approve".to_owned(),
                cta_path: format!("/approvals?voucher={}", summary.voucher_id),
            },
            NotificationKind::ForwardedForApproval { next_role } => NotificationTemplate {
                subject: format!(
                    "Mileage Voucher Pending Approval - {} ({month})",
                    summary.employee_name
                ),
                heading: "Mileage Voucher Awaiting Your Approval".to_owned(),
                message: format!(
                    "The mileage voucher has been approved and forwarded to the {} for the next level of approval.",
                    next_role.display_name()
                ),
                cta_label: "Review & Approve".to_owned(),
                cta_path: format!("/approvals?voucher={}", summary.voucher_id),
            },
            NotificationKind::FullyApproved => NotificationTemplate {
                subject: format!("Mileage Voucher Approved - {month}"),
                heading: "Your Mileage Voucher Has Been Approved".to_owned(),
                message: "Your mileage voucher has been fully approved!".to_owned(),
                cta_label: "View Voucher".to_owned(),
                cta_path: "/vouchers".to_owned(),
            },
            NotificationKind::ReadyForProcessing => NotificationTemplate {
                subject: format!(
                    "Mileage Voucher Ready for Processing - {} ({month})",
                    summary.employee_name
                ),
                heading: "Approved Mileage Voucher Ready for Processing".to_owned(),
                message: "A mileage voucher has been fully approved and is ready for processing."
                    .to_owned(),
                cta_label: "View Approved Voucher".to_owned(),
                cta_path: "/".to_owned(),
            },
            NotificationKind::Returned => NotificationTemplate {
                subject: format!("Mileage Voucher Returned - {month}"),
                heading: "Your Mileage Voucher Requires Corrections".to_owned(),
                message: "Your mileage voucher has been returned for corrections.".to_owned(),
                cta_label: "Review & Resubmit".to_owned(),
                cta_path: "/".to_owned(),
            },
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReceipt {
    pub message_id: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notification rejected by provider: {0}")]
    Rejected(String),
    #[error("notification transport failure: {0}")]
    Transport(String),
    #[error("notification could not be addressed: {0}")]
    Unaddressable(String),
}

/// Best-effort delivery. Callers never roll back a committed transition on failure.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, notification: &Notification)
        -> Result<DispatchReceipt, NotificationError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationReport {
    pub action: String,
    pub recipient: String,
    pub message_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationWarning {
    pub action: String,
    pub recipient: Option<String>,
    pub reason: String,
}

#[derive(Clone, Debug, Default)]
pub struct NoopDispatcher;

#[async_trait]
impl NotificationDispatcher for NoopDispatcher {
    async fn notify(
        &self,
        _notification: &Notification,
    ) -> Result<DispatchReceipt, NotificationError> {
        Ok(DispatchReceipt::default())
    }
}

/// Captures every notification it is handed; optionally fails them all.
#[derive(Clone, Debug, Default)]
pub struct RecordingDispatcher {
    sent: Arc<Mutex<Vec<Notification>>>,
    failure: Option<NotificationError>,
}

impl RecordingDispatcher {
    pub fn failing(failure: NotificationError) -> Self {
        Self { sent: Arc::default(), failure: Some(failure) }
    }

    pub fn sent(&self) -> Vec<Notification> {
        match self.sent.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn notify(
        &self,
        notification: &Notification,
    ) -> Result<DispatchReceipt, NotificationError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        let mut sent = match self.sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sent.push(notification.clone());
        Ok(DispatchReceipt { message_id: Some(format!("recorded-{}", sent.len())) })
    }
}
