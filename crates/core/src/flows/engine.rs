use thiserror::Error;

use crate::domain::voucher::{ApprovalAction, ApproverRole, VoucherStatus};
use crate::flows::states::{FlowEffect, NotificationTarget, TransitionOutcome, VoucherEvent};

pub trait FlowDefinition {
    fn initial_state(&self) -> VoucherStatus;
    fn transition(
        &self,
        current: &VoucherStatus,
        event: &VoucherEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Supervisor, then VP, then COO. A rejection at any stage returns the voucher to its owner.
#[derive(Clone, Debug, Default)]
pub struct ApprovalChainFlow;

impl FlowDefinition for ApprovalChainFlow {
    fn initial_state(&self) -> VoucherStatus {
        VoucherStatus::Draft
    }

    fn transition(
        &self,
        current: &VoucherStatus,
        event: &VoucherEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_approval_chain(current, event)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> VoucherStatus {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &VoucherStatus,
        event: &VoucherEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event)
    }
}

impl Default for FlowEngine<ApprovalChainFlow> {
    fn default() -> Self {
        Self::new(ApprovalChainFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from `{state}` using event `{event}`")]
    InvalidTransition { state: VoucherStatus, event: VoucherEvent },
}

fn transition_approval_chain(
    current: &VoucherStatus,
    event: &VoucherEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowEffect::{
        ClearRejectionReason, Notify, RecordHistory, SetRejectionReason, StampSubmittedAt,
    };
    use NotificationTarget::{Accountant, Employee, NextApprover, Supervisor};
    use VoucherEvent::{Approve, Reject, Submit};
    use VoucherStatus::{Approved, Draft, PendingCoo, PendingSupervisor, PendingVp, Rejected};

    let (to, effects) = match (current, event) {
        (Draft, Submit) | (Rejected, Submit) => {
            (PendingSupervisor, vec![StampSubmittedAt, ClearRejectionReason, Notify(Supervisor)])
        }
        (PendingSupervisor, Approve) => (
            PendingVp,
            vec![
                RecordHistory { role: ApproverRole::Supervisor, action: ApprovalAction::Approve },
                Notify(NextApprover(ApproverRole::Vp)),
            ],
        ),
        (PendingVp, Approve) => (
            PendingCoo,
            vec![
                RecordHistory { role: ApproverRole::Vp, action: ApprovalAction::Approve },
                Notify(NextApprover(ApproverRole::Coo)),
            ],
        ),
        (PendingCoo, Approve) => (
            Approved,
            vec![
                RecordHistory { role: ApproverRole::Coo, action: ApprovalAction::Approve },
                Notify(Employee),
                Notify(Accountant),
            ],
        ),
        (PendingSupervisor | PendingVp | PendingCoo, Reject) => {
            let Some(stage) = current.pending_stage() else {
                return Err(invalid(current, event));
            };
            (
                Rejected,
                vec![
                    SetRejectionReason,
                    RecordHistory { role: stage, action: ApprovalAction::Reject },
                    Notify(Employee),
                ],
            )
        }
        _ => return Err(invalid(current, event)),
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, effects })
}

fn invalid(current: &VoucherStatus, event: &VoucherEvent) -> FlowTransitionError {
    FlowTransitionError::InvalidTransition { state: *current, event: *event }
}

#[cfg(test)]
mod tests {
    use crate::domain::voucher::{ApprovalAction, ApproverRole, VoucherStatus};
    use crate::flows::engine::{ApprovalChainFlow, FlowEngine, FlowTransitionError};
    use crate::flows::states::{FlowEffect, NotificationTarget, VoucherEvent};

    #[test]
    fn full_chain_walks_every_stage_in_order() {
        let engine = FlowEngine::new(ApprovalChainFlow);
        let mut state = engine.initial_state();

        state = engine.apply(&state, &VoucherEvent::Submit).expect("draft -> supervisor").to;
        assert_eq!(state, VoucherStatus::PendingSupervisor);
        state = engine.apply(&state, &VoucherEvent::Approve).expect("supervisor -> vp").to;
        assert_eq!(state, VoucherStatus::PendingVp);
        state = engine.apply(&state, &VoucherEvent::Approve).expect("vp -> coo").to;
        assert_eq!(state, VoucherStatus::PendingCoo);

        let last = engine.apply(&state, &VoucherEvent::Approve).expect("coo -> approved");
        assert_eq!(last.to, VoucherStatus::Approved);
        assert!(last.is_final_approval());
        assert_eq!(
            last.notification_targets().collect::<Vec<_>>(),
            vec![NotificationTarget::Employee, NotificationTarget::Accountant]
        );
    }

    #[test]
    fn submit_stamps_and_clears_previous_rejection() {
        let engine = FlowEngine::default();
        let outcome =
            engine.apply(&VoucherStatus::Rejected, &VoucherEvent::Submit).expect("resubmit");

        assert_eq!(outcome.to, VoucherStatus::PendingSupervisor);
        assert!(outcome.effects.contains(&FlowEffect::StampSubmittedAt));
        assert!(outcome.effects.contains(&FlowEffect::ClearRejectionReason));
        assert!(!outcome
            .effects
            .iter()
            .any(|effect| matches!(effect, FlowEffect::RecordHistory { .. })));
    }

    #[test]
    fn mid_chain_approval_records_the_acting_stage_and_names_the_next() {
        let engine = FlowEngine::default();
        let outcome =
            engine.apply(&VoucherStatus::PendingVp, &VoucherEvent::Approve).expect("vp approves");

        assert_eq!(
            outcome.effects,
            vec![
                FlowEffect::RecordHistory {
                    role: ApproverRole::Vp,
                    action: ApprovalAction::Approve
                },
                FlowEffect::Notify(NotificationTarget::NextApprover(ApproverRole::Coo)),
            ]
        );
    }

    #[test]
    fn rejection_from_any_pending_stage_returns_to_employee() {
        let engine = FlowEngine::default();
        for role in ApproverRole::CHAIN {
            let outcome = engine
                .apply(&role.pending_status(), &VoucherEvent::Reject)
                .expect("pending stage can reject");
            assert_eq!(outcome.to, VoucherStatus::Rejected);
            assert!(outcome.effects.contains(&FlowEffect::SetRejectionReason));
            assert!(outcome
                .effects
                .contains(&FlowEffect::RecordHistory { role, action: ApprovalAction::Reject }));
        }
    }

    #[test]
    fn terminal_and_in_flight_states_reject_invalid_events() {
        let engine = FlowEngine::default();
        let cases = [
            (VoucherStatus::PendingSupervisor, VoucherEvent::Submit),
            (VoucherStatus::Approved, VoucherEvent::Submit),
            (VoucherStatus::Approved, VoucherEvent::Approve),
            (VoucherStatus::Approved, VoucherEvent::Reject),
            (VoucherStatus::Draft, VoucherEvent::Approve),
            (VoucherStatus::Rejected, VoucherEvent::Reject),
        ];

        for (state, event) in cases {
            let error = engine.apply(&state, &event).expect_err("must be rejected");
            assert_eq!(error, FlowTransitionError::InvalidTransition { state, event });
        }
    }
}
