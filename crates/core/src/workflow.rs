//! Voucher workflow engine: sequences validation, authorization, conditional persistence,
//! and best-effort notification for every voucher operation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::approvals::{authorize_stage, queue_role};
use crate::directory::ProfileDirectory;
use crate::domain::voucher::{
    ApprovalHistoryEntry, ApproverRole, Principal, PrincipalId, Voucher, VoucherId, VoucherMonth,
};
use crate::errors::{DomainError, ValidationError, WorkflowError};
use crate::flows::{
    ApprovalChainFlow, FlowEffect, FlowEngine, NotificationTarget, TransitionOutcome, VoucherEvent,
};
use crate::mileage::MileageTotalProvider;
use crate::notifications::{
    DispatchReceipt, Notification, NotificationDispatcher, NotificationError, NotificationKind,
    NotificationReport, NotificationWarning, VoucherSummary,
};
use crate::roles::{RoleRegistry, RoleSet};
use crate::store::{ReasonUpdate, VoucherSnapshot, VoucherStore, VoucherTransition};
use crate::validation::{
    validate_email, validate_optional_email, validate_rejection_reason, validate_total_miles,
};

pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_millis(3_000);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub notify_timeout: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self { notify_timeout: DEFAULT_NOTIFY_TIMEOUT }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveVoucher {
    pub voucher_id: VoucherId,
    pub actor_id: PrincipalId,
    /// Required for every stage but the last.
    pub next_recipient_email: Option<String>,
    /// Only used on the final stage.
    pub accountant_email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectVoucher {
    pub voucher_id: VoucherId,
    pub actor_id: PrincipalId,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub voucher: Voucher,
    pub notifications: Vec<NotificationReport>,
    pub warnings: Vec<NotificationWarning>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalQueue {
    NoApproverRole,
    Pending { role: ApproverRole, vouchers: Vec<Voucher> },
}

/// A notification the engine decided to send, or the reason it could not be addressed.
enum PlannedNotification {
    Ready(Notification),
    Unaddressed { kind: NotificationKind, reason: String },
}

#[derive(Clone)]
pub struct VoucherWorkflowEngine {
    store: Arc<dyn VoucherStore>,
    roles: Arc<dyn RoleRegistry>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    directory: Arc<dyn ProfileDirectory>,
    flow: Arc<FlowEngine<ApprovalChainFlow>>,
    settings: WorkflowSettings,
}

impl VoucherWorkflowEngine {
    pub fn new(
        store: Arc<dyn VoucherStore>,
        roles: Arc<dyn RoleRegistry>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        directory: Arc<dyn ProfileDirectory>,
    ) -> Self {
        Self {
            store,
            roles,
            dispatcher,
            directory,
            flow: Arc::new(FlowEngine::default()),
            settings: WorkflowSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub async fn get_or_create_voucher(
        &self,
        principal: &Principal,
        month: VoucherMonth,
        total_miles: Decimal,
    ) -> Result<VoucherSnapshot, WorkflowError> {
        let total_miles = validate_total_miles(total_miles)?;
        let snapshot = self.store.get_or_create(&principal.id, month, total_miles).await?;
        self.record_contact(principal).await;

        info!(
            event_name = "voucher.get_or_create",
            voucher_id = %snapshot.voucher.id,
            actor_id = %principal.id,
            month = %month,
            origin = snapshot.origin.as_str(),
            status = snapshot.voucher.status.as_str(),
            "voucher resolved for month"
        );
        Ok(snapshot)
    }

    /// Pulls the current total from the mileage source, then resolves the month's voucher.
    pub async fn sync_voucher_for_month<M>(
        &self,
        principal: &Principal,
        month: VoucherMonth,
        mileage: &M,
    ) -> Result<VoucherSnapshot, WorkflowError>
    where
        M: MileageTotalProvider + ?Sized,
    {
        let total = mileage.total_for(&principal.id, month).await?;
        self.get_or_create_voucher(principal, month, total).await
    }

    pub async fn submit_voucher(
        &self,
        principal: &Principal,
        voucher_id: &VoucherId,
        supervisor_email: &str,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let supervisor_email = validate_email("supervisor_email", supervisor_email)?;
        let voucher = self.load(voucher_id).await?;

        if !voucher.is_owned_by(&principal.id) {
            return Err(WorkflowError::NotOwner {
                voucher_id: voucher.id.clone(),
                actor_id: principal.id.clone(),
            });
        }

        let outcome = self.flow.apply(&voucher.status, &VoucherEvent::Submit).map_err(|_| {
            WorkflowError::AlreadyInFlight { voucher_id: voucher.id.clone(), status: voucher.status }
        })?;

        let transition = build_transition(&voucher, &outcome, &principal.id, None);
        let updated = self.store.apply_transition(transition).await?;

        info!(
            event_name = "voucher.submitted",
            voucher_id = %updated.id,
            actor_id = %principal.id,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            "voucher submitted for approval"
        );

        self.record_contact(principal).await;
        let employee_name = match self.directory.profile(&principal.id).await {
            Ok(Some(profile)) => profile.display_name().to_owned(),
            _ => principal.email.clone(),
        };
        let summary = summarize(&updated, employee_name);
        let planned = outcome
            .notification_targets()
            .filter(|target| *target == NotificationTarget::Supervisor)
            .map(|_| {
                PlannedNotification::Ready(Notification {
                    kind: NotificationKind::Submitted,
                    recipient: supervisor_email.clone(),
                    summary: summary.clone(),
                })
            })
            .collect();

        Ok(self.finish(updated, planned).await)
    }

    pub async fn approve_voucher(
        &self,
        request: ApproveVoucher,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let next_recipient = validate_optional_email(
            "next_recipient_email",
            request.next_recipient_email.as_deref(),
        )?;
        let accountant_email =
            validate_optional_email("accountant_email", request.accountant_email.as_deref())?;

        let voucher = self.load(&request.voucher_id).await?;
        let stage = self.require_stage(&voucher, &request.actor_id).await?;
        let outcome = self
            .flow
            .apply(&voucher.status, &VoucherEvent::Approve)
            .map_err(DomainError::from)?;

        if !outcome.is_final_approval() && next_recipient.is_none() {
            return Err(ValidationError::Missing { field: "next_recipient_email" }.into());
        }

        let transition = build_transition(&voucher, &outcome, &request.actor_id, None);
        let updated = self.store.apply_transition(transition).await?;

        info!(
            event_name = "voucher.approved",
            voucher_id = %updated.id,
            actor_id = %request.actor_id,
            stage = stage.as_str(),
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            "voucher approved at stage"
        );

        let planned = self
            .plan_notifications(&updated, &outcome, next_recipient, accountant_email)
            .await;
        Ok(self.finish(updated, planned).await)
    }

    pub async fn reject_voucher(
        &self,
        request: RejectVoucher,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let reason = validate_rejection_reason(&request.reason)?;

        let voucher = self.load(&request.voucher_id).await?;
        let stage = self.require_stage(&voucher, &request.actor_id).await?;
        let outcome = self
            .flow
            .apply(&voucher.status, &VoucherEvent::Reject)
            .map_err(DomainError::from)?;

        let transition = build_transition(&voucher, &outcome, &request.actor_id, Some(&reason));
        let updated = self.store.apply_transition(transition).await?;

        info!(
            event_name = "voucher.rejected",
            voucher_id = %updated.id,
            actor_id = %request.actor_id,
            stage = stage.as_str(),
            "voucher returned to employee"
        );

        let planned = self.plan_notifications(&updated, &outcome, None, None).await;
        Ok(self.finish(updated, planned).await)
    }

    /// Vouchers awaiting the principal's most senior approver stage, oldest submission first.
    pub async fn list_pending_for(
        &self,
        actor_id: &PrincipalId,
    ) -> Result<ApprovalQueue, WorkflowError> {
        let roles = self.roles_of(actor_id).await?;
        let Some(role) = queue_role(&roles) else {
            return Ok(ApprovalQueue::NoApproverRole);
        };

        let vouchers = self.store.list_by_status(role.pending_status()).await?;
        info!(
            event_name = "approvals.queue_listed",
            actor_id = %actor_id,
            role = role.as_str(),
            pending = vouchers.len(),
            "approval queue listed"
        );
        Ok(ApprovalQueue::Pending { role, vouchers })
    }

    pub async fn voucher(&self, voucher_id: &VoucherId) -> Result<Voucher, WorkflowError> {
        self.load(voucher_id).await
    }

    /// Owner, any approver, accountant or admin may read a voucher. Everyone else sees not-found.
    pub async fn visible_voucher(
        &self,
        viewer_id: &PrincipalId,
        voucher_id: &VoucherId,
    ) -> Result<Voucher, WorkflowError> {
        let voucher = self.load(voucher_id).await?;
        if voucher.is_owned_by(viewer_id) {
            return Ok(voucher);
        }
        let roles = self.roles_of(viewer_id).await?;
        if roles.is_empty() {
            return Err(WorkflowError::NotFound(voucher_id.clone()));
        }
        Ok(voucher)
    }

    pub async fn vouchers_for(
        &self,
        employee_id: &PrincipalId,
    ) -> Result<Vec<Voucher>, WorkflowError> {
        Ok(self.store.list_for_employee(employee_id).await?)
    }

    pub async fn voucher_for_month(
        &self,
        employee_id: &PrincipalId,
        month: VoucherMonth,
    ) -> Result<Option<Voucher>, WorkflowError> {
        Ok(self.store.find_for_month(employee_id, month).await?)
    }

    pub async fn history(
        &self,
        voucher_id: &VoucherId,
    ) -> Result<Vec<ApprovalHistoryEntry>, WorkflowError> {
        self.load(voucher_id).await?;
        Ok(self.store.history(voucher_id).await?)
    }

    async fn load(&self, voucher_id: &VoucherId) -> Result<Voucher, WorkflowError> {
        self.store
            .find_by_id(voucher_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(voucher_id.clone()))
    }

    async fn roles_of(&self, actor_id: &PrincipalId) -> Result<RoleSet, WorkflowError> {
        self.roles.roles_of(actor_id).await.map_err(|error| {
            warn!(
                event_name = "roles.lookup_failed",
                actor_id = %actor_id,
                error = %error,
                "role registry lookup failed, denying"
            );
            WorkflowError::from(error)
        })
    }

    /// The voucher must be awaiting a stage the actor holds.
    async fn require_stage(
        &self,
        voucher: &Voucher,
        actor_id: &PrincipalId,
    ) -> Result<ApproverRole, WorkflowError> {
        let Some(stage) = voucher.status.pending_stage() else {
            return Err(WorkflowError::NotPending {
                voucher_id: voucher.id.clone(),
                status: voucher.status,
            });
        };

        let roles = self.roles_of(actor_id).await?;
        let decision = authorize_stage(actor_id, stage, &roles);
        if !decision.allowed {
            warn!(
                event_name = "voucher.authorization_denied",
                voucher_id = %voucher.id,
                actor_id = %actor_id,
                stage = stage.as_str(),
                reason = %decision.reason,
                "approver does not hold the current stage role"
            );
        }
        decision.into_result()?;
        Ok(stage)
    }

    /// Keeps the employee's sign-in address on file for returned and approved notices.
    /// A directory failure is logged and never fails the voucher operation.
    async fn record_contact(&self, principal: &Principal) {
        let Ok(email) = validate_email("principal_email", &principal.email) else {
            return;
        };
        if let Err(error) = self.directory.record_contact(&principal.id, &email).await {
            warn!(
                event_name = "directory.record_failed",
                actor_id = %principal.id,
                error = %error,
                "employee contact not recorded"
            );
        }
    }

    async fn plan_notifications(
        &self,
        voucher: &Voucher,
        outcome: &TransitionOutcome,
        next_recipient: Option<String>,
        accountant_email: Option<String>,
    ) -> Vec<PlannedNotification> {
        let employee = self.directory.profile(&voucher.employee_id).await;
        let employee_name = match &employee {
            Ok(Some(profile)) => profile.display_name().to_owned(),
            _ => voucher.employee_id.to_string(),
        };
        let summary = summarize(voucher, employee_name);

        let mut planned = Vec::new();
        for target in outcome.notification_targets() {
            match target {
                NotificationTarget::Supervisor => {}
                // approve_voucher refuses a mid-chain approval without this address.
                NotificationTarget::NextApprover(next_role) => {
                    if let Some(recipient) = &next_recipient {
                        planned.push(PlannedNotification::Ready(Notification {
                            kind: NotificationKind::ForwardedForApproval { next_role },
                            recipient: recipient.clone(),
                            summary: summary.clone(),
                        }));
                    }
                }
                NotificationTarget::Employee => {
                    let kind = if outcome.event == VoucherEvent::Reject {
                        NotificationKind::Returned
                    } else {
                        NotificationKind::FullyApproved
                    };
                    planned.push(match &employee {
                        Ok(Some(profile)) => PlannedNotification::Ready(Notification {
                            kind,
                            recipient: profile.email.clone(),
                            summary: summary.clone(),
                        }),
                        Ok(None) => PlannedNotification::Unaddressed {
                            kind,
                            reason: format!("no profile on file for `{}`", voucher.employee_id),
                        },
                        Err(error) => {
                            PlannedNotification::Unaddressed { kind, reason: error.to_string() }
                        }
                    });
                }
                NotificationTarget::Accountant => {
                    if let Some(recipient) = &accountant_email {
                        planned.push(PlannedNotification::Ready(Notification {
                            kind: NotificationKind::ReadyForProcessing,
                            recipient: recipient.clone(),
                            summary: summary.clone(),
                        }));
                    }
                }
            }
        }
        planned
    }

    /// Runs after the transition has committed. Nothing here can fail the operation.
    async fn finish(&self, voucher: Voucher, planned: Vec<PlannedNotification>) -> WorkflowOutcome {
        let mut notifications = Vec::new();
        let mut warnings = Vec::new();

        for item in planned {
            let notification = match item {
                PlannedNotification::Ready(notification) => notification,
                PlannedNotification::Unaddressed { kind, reason } => {
                    warn!(
                        event_name = "notification.unaddressed",
                        voucher_id = %voucher.id,
                        action = kind.action(),
                        reason = %reason,
                        "notification skipped"
                    );
                    warnings.push(NotificationWarning {
                        action: kind.action().to_owned(),
                        recipient: None,
                        reason,
                    });
                    continue;
                }
            };

            match self.dispatch(&notification).await {
                Ok(receipt) => {
                    info!(
                        event_name = "notification.sent",
                        voucher_id = %voucher.id,
                        action = notification.kind.action(),
                        "notification dispatched"
                    );
                    notifications.push(NotificationReport {
                        action: notification.kind.action().to_owned(),
                        recipient: notification.recipient,
                        message_id: receipt.message_id,
                    });
                }
                Err(error) => {
                    warn!(
                        event_name = "notification.failed",
                        voucher_id = %voucher.id,
                        action = notification.kind.action(),
                        error = %error,
                        "notification failed after commit"
                    );
                    warnings.push(NotificationWarning {
                        action: notification.kind.action().to_owned(),
                        recipient: Some(notification.recipient),
                        reason: error.to_string(),
                    });
                }
            }
        }

        WorkflowOutcome { voucher, notifications, warnings }
    }

    async fn dispatch(
        &self,
        notification: &Notification,
    ) -> Result<DispatchReceipt, NotificationError> {
        let timeout = self.settings.notify_timeout;
        match tokio::time::timeout(timeout, self.dispatcher.notify(notification)).await {
            Ok(result) => result,
            Err(_) => Err(NotificationError::Transport(format!(
                "timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }
}

fn summarize(voucher: &Voucher, employee_name: String) -> VoucherSummary {
    VoucherSummary {
        voucher_id: voucher.id.clone(),
        employee_name,
        month: voucher.month,
        total_miles: voucher.total_miles,
        rejection_reason: voucher.rejection_reason.clone(),
    }
}

fn build_transition(
    voucher: &Voucher,
    outcome: &TransitionOutcome,
    actor_id: &PrincipalId,
    reason: Option<&str>,
) -> VoucherTransition {
    let at = Utc::now();
    let mut transition = VoucherTransition::new(voucher.id.clone(), outcome.from, outcome.to, at);
    for effect in &outcome.effects {
        match effect {
            FlowEffect::StampSubmittedAt => transition.submitted_at = Some(at),
            FlowEffect::ClearRejectionReason => transition.rejection_reason = ReasonUpdate::Clear,
            FlowEffect::SetRejectionReason => {
                transition.rejection_reason =
                    ReasonUpdate::Set(reason.unwrap_or_default().to_owned());
            }
            FlowEffect::RecordHistory { role, action } => {
                transition.history = Some(ApprovalHistoryEntry::new(
                    voucher.id.clone(),
                    actor_id.clone(),
                    *role,
                    *action,
                    at,
                ));
            }
            FlowEffect::Notify(_) => {}
        }
    }
    transition
}
