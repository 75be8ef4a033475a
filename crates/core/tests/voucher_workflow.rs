use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Barrier;

use routetracker_core::{
    AppRole, ApprovalAction, ApprovalHistoryEntry, ApprovalQueue, ApproveVoucher, ApproverRole,
    DirectoryError, DispatchReceipt, ErrorKind, InMemoryProfileDirectory, InMemoryRoleRegistry,
    InMemoryVoucherStore, Notification, NotificationDispatcher, NotificationError,
    NotificationKind, Principal, PrincipalId, Profile, ProfileDirectory, RecordingDispatcher,
    RejectVoucher, RoleRegistry, RoleRegistryError, RoleSet, SnapshotOrigin, StaticMileageTotals,
    StoreError, ValidationError, Voucher, VoucherId, VoucherMonth, VoucherSnapshot, VoucherStatus,
    VoucherStore, VoucherTransition, VoucherWorkflowEngine, WorkflowError, WorkflowSettings,
};

fn employee() -> Principal {
    Principal::new("emp-1", "dana@example.com")
}

fn id(value: &str) -> PrincipalId {
    PrincipalId(value.to_owned())
}

fn march() -> VoucherMonth {
    VoucherMonth::from_ym(2025, 3).expect("month")
}

fn registry() -> InMemoryRoleRegistry {
    InMemoryRoleRegistry::with_roles(vec![
        ("sup-1", vec![AppRole::Supervisor]),
        ("sup-2", vec![AppRole::Supervisor]),
        ("vp-1", vec![AppRole::Vp]),
        ("coo-1", vec![AppRole::Coo]),
        ("lead-1", vec![AppRole::Supervisor, AppRole::Vp]),
        ("acct-1", vec![AppRole::Accountant]),
    ])
}

fn directory() -> InMemoryProfileDirectory {
    InMemoryProfileDirectory::with_profiles(vec![Profile {
        user_id: id("emp-1"),
        email: "dana@example.com".to_owned(),
        full_name: Some("Dana Reyes".to_owned()),
    }])
}

struct Harness {
    engine: VoucherWorkflowEngine,
    dispatcher: RecordingDispatcher,
}

fn harness() -> Harness {
    harness_with(Arc::new(InMemoryVoucherStore::default()), Arc::new(registry()))
}

fn harness_with(store: Arc<dyn VoucherStore>, roles: Arc<dyn RoleRegistry>) -> Harness {
    let dispatcher = RecordingDispatcher::default();
    let engine = VoucherWorkflowEngine::new(
        store,
        roles,
        Arc::new(dispatcher.clone()),
        Arc::new(directory()),
    );
    Harness { engine, dispatcher }
}

fn approve(voucher_id: &VoucherId, actor: &str, next: Option<&str>) -> ApproveVoucher {
    ApproveVoucher {
        voucher_id: voucher_id.clone(),
        actor_id: id(actor),
        next_recipient_email: next.map(str::to_owned),
        accountant_email: None,
    }
}

async fn submitted_voucher(engine: &VoucherWorkflowEngine) -> Voucher {
    let snapshot = engine
        .get_or_create_voucher(&employee(), march(), Decimal::new(1205, 1))
        .await
        .expect("create voucher");
    engine
        .submit_voucher(&employee(), &snapshot.voucher.id, "sup@x.com")
        .await
        .expect("submit voucher")
        .voucher
}

#[tokio::test]
async fn happy_path_walks_all_three_stages() {
    let Harness { engine, dispatcher } = harness();
    let voucher = submitted_voucher(&engine).await;
    assert_eq!(voucher.status, VoucherStatus::PendingSupervisor);
    assert!(voucher.submitted_at.is_some());

    let vp_stage = engine
        .approve_voucher(approve(&voucher.id, "sup-1", Some("vp@x.com")))
        .await
        .expect("supervisor approves");
    assert_eq!(vp_stage.voucher.status, VoucherStatus::PendingVp);

    let coo_stage = engine
        .approve_voucher(approve(&voucher.id, "vp-1", Some("coo@x.com")))
        .await
        .expect("vp approves");
    assert_eq!(coo_stage.voucher.status, VoucherStatus::PendingCoo);

    let mut last = approve(&voucher.id, "coo-1", None);
    last.accountant_email = Some("books@x.com".to_owned());
    let approved = engine.approve_voucher(last).await.expect("coo approves");
    assert_eq!(approved.voucher.status, VoucherStatus::Approved);
    assert!(approved.warnings.is_empty());

    let history = engine.history(&voucher.id).await.expect("history");
    let stages: Vec<(ApproverRole, ApprovalAction)> =
        history.iter().map(|entry| (entry.approver_role, entry.action)).collect();
    assert_eq!(
        stages,
        vec![
            (ApproverRole::Supervisor, ApprovalAction::Approve),
            (ApproverRole::Vp, ApprovalAction::Approve),
            (ApproverRole::Coo, ApprovalAction::Approve),
        ]
    );
    assert!(history.windows(2).all(|pair| pair[0].acted_at <= pair[1].acted_at));

    let sent: Vec<(NotificationKind, String)> = dispatcher
        .sent()
        .into_iter()
        .map(|notification| (notification.kind, notification.recipient))
        .collect();
    assert_eq!(
        sent,
        vec![
            (NotificationKind::Submitted, "sup@x.com".to_owned()),
            (
                NotificationKind::ForwardedForApproval { next_role: ApproverRole::Vp },
                "vp@x.com".to_owned()
            ),
            (
                NotificationKind::ForwardedForApproval { next_role: ApproverRole::Coo },
                "coo@x.com".to_owned()
            ),
            (NotificationKind::FullyApproved, "dana@example.com".to_owned()),
            (NotificationKind::ReadyForProcessing, "books@x.com".to_owned()),
        ]
    );
}

#[tokio::test]
async fn get_or_create_returns_the_same_voucher_for_a_month() {
    let Harness { engine, .. } = harness();

    let first = engine
        .get_or_create_voucher(&employee(), march(), Decimal::new(1205, 1))
        .await
        .expect("create");
    let second = engine
        .get_or_create_voucher(&employee(), march(), Decimal::new(1205, 1))
        .await
        .expect("reuse");

    assert_eq!(first.origin, SnapshotOrigin::Created);
    assert_eq!(first.voucher.id, second.voucher.id);
    assert_eq!(first.voucher.status, VoucherStatus::Draft);
    assert_eq!(engine.vouchers_for(&id("emp-1")).await.expect("list").len(), 1);
}

#[tokio::test]
async fn negative_miles_are_rejected_before_the_store() {
    let Harness { engine, .. } = harness();

    let error = engine
        .get_or_create_voucher(&employee(), march(), Decimal::new(-1, 0))
        .await
        .expect_err("negative miles");

    assert_eq!(error.kind(), ErrorKind::Validation);
    assert_eq!(engine.voucher_for_month(&id("emp-1"), march()).await.expect("read"), None);
}

#[tokio::test]
async fn sync_pulls_the_month_total_from_the_mileage_source() {
    let Harness { engine, .. } = harness();
    let mileage = StaticMileageTotals::default();
    mileage.set(id("emp-1"), march(), Decimal::new(8825, 2)).await;

    let snapshot =
        engine.sync_voucher_for_month(&employee(), march(), &mileage).await.expect("sync");

    assert_eq!(snapshot.voucher.total_miles, Decimal::new(8825, 2));
}

#[tokio::test]
async fn double_submit_is_already_in_flight() {
    let Harness { engine, .. } = harness();
    let voucher = submitted_voucher(&engine).await;

    let error = engine
        .submit_voucher(&employee(), &voucher.id, "sup@x.com")
        .await
        .expect_err("second submit");

    assert!(matches!(
        error,
        WorkflowError::AlreadyInFlight { status: VoucherStatus::PendingSupervisor, .. }
    ));
    assert_eq!(error.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn only_the_owner_can_submit() {
    let Harness { engine, .. } = harness();
    let snapshot = engine
        .get_or_create_voucher(&employee(), march(), Decimal::ONE)
        .await
        .expect("create");

    let error = engine
        .submit_voucher(&Principal::new("emp-2", "other@x.com"), &snapshot.voucher.id, "sup@x.com")
        .await
        .expect_err("stranger submit");

    assert!(matches!(error, WorkflowError::NotOwner { .. }));
    assert_eq!(error.kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn malformed_supervisor_email_is_a_validation_error() {
    let Harness { engine, .. } = harness();
    let snapshot = engine
        .get_or_create_voucher(&employee(), march(), Decimal::ONE)
        .await
        .expect("create");

    let error = engine
        .submit_voucher(&employee(), &snapshot.voucher.id, "not-an-email")
        .await
        .expect_err("bad email");

    assert!(matches!(error, WorkflowError::Validation(ValidationError::InvalidEmail { .. })));
    let unchanged = engine.voucher(&snapshot.voucher.id).await.expect("read");
    assert_eq!(unchanged.status, VoucherStatus::Draft);
}

#[tokio::test]
async fn vp_cannot_act_on_supervisor_stage() {
    let Harness { engine, .. } = harness();
    let voucher = submitted_voucher(&engine).await;

    let error = engine
        .approve_voucher(approve(&voucher.id, "vp-1", Some("coo@x.com")))
        .await
        .expect_err("vp on supervisor stage");

    assert_eq!(error.kind(), ErrorKind::Authorization);
    let unchanged = engine.voucher(&voucher.id).await.expect("read");
    assert_eq!(unchanged.status, VoucherStatus::PendingSupervisor);
    assert!(engine.history(&voucher.id).await.expect("history").is_empty());
}

#[tokio::test]
async fn mid_chain_approval_requires_next_recipient() {
    let Harness { engine, .. } = harness();
    let voucher = submitted_voucher(&engine).await;

    let error = engine
        .approve_voucher(approve(&voucher.id, "sup-1", None))
        .await
        .expect_err("missing next recipient");

    assert_eq!(
        error,
        WorkflowError::Validation(ValidationError::Missing { field: "next_recipient_email" })
    );
    assert_eq!(
        engine.voucher(&voucher.id).await.expect("read").status,
        VoucherStatus::PendingSupervisor
    );
}

#[tokio::test]
async fn approving_a_non_pending_voucher_is_not_pending() {
    let Harness { engine, .. } = harness();
    let snapshot = engine
        .get_or_create_voucher(&employee(), march(), Decimal::ONE)
        .await
        .expect("create");

    let error = engine
        .approve_voucher(approve(&snapshot.voucher.id, "sup-1", Some("vp@x.com")))
        .await
        .expect_err("draft is not pending");

    assert!(matches!(error, WorkflowError::NotPending { status: VoucherStatus::Draft, .. }));
}

#[tokio::test]
async fn unknown_voucher_is_not_found() {
    let Harness { engine, .. } = harness();

    let error = engine
        .approve_voucher(approve(&VoucherId("missing".to_owned()), "sup-1", Some("vp@x.com")))
        .await
        .expect_err("missing voucher");

    assert_eq!(error.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn reject_then_resubmit_clears_the_reason() {
    let Harness { engine, dispatcher } = harness();
    let voucher = submitted_voucher(&engine).await;
    let first_submitted_at = voucher.submitted_at.expect("stamped");

    let rejected = engine
        .reject_voucher(RejectVoucher {
            voucher_id: voucher.id.clone(),
            actor_id: id("sup-1"),
            reason: "missing receipts".to_owned(),
        })
        .await
        .expect("reject");
    assert_eq!(rejected.voucher.status, VoucherStatus::Rejected);
    assert_eq!(rejected.voucher.rejection_reason.as_deref(), Some("missing receipts"));

    let returned = dispatcher.sent().pop().expect("employee notified");
    assert_eq!(returned.kind, NotificationKind::Returned);
    assert_eq!(returned.recipient, "dana@example.com");
    assert_eq!(returned.summary.rejection_reason.as_deref(), Some("missing receipts"));

    tokio::time::sleep(Duration::from_millis(5)).await;
    let resubmitted = engine
        .submit_voucher(&employee(), &voucher.id, "sup@x.com")
        .await
        .expect("resubmit")
        .voucher;

    assert_eq!(resubmitted.status, VoucherStatus::PendingSupervisor);
    assert_eq!(resubmitted.rejection_reason, None);
    assert!(resubmitted.submitted_at.expect("restamped") > first_submitted_at);

    let history = engine.history(&voucher.id).await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, ApprovalAction::Reject);
}

#[tokio::test]
async fn rejection_requires_a_reason() {
    let Harness { engine, .. } = harness();
    let voucher = submitted_voucher(&engine).await;

    let error = engine
        .reject_voucher(RejectVoucher {
            voucher_id: voucher.id.clone(),
            actor_id: id("sup-1"),
            reason: "   ".to_owned(),
        })
        .await
        .expect_err("blank reason");

    assert_eq!(error, WorkflowError::Validation(ValidationError::Missing { field: "reason" }));
}

#[tokio::test]
async fn notification_failure_does_not_undo_the_transition() {
    let dispatcher =
        RecordingDispatcher::failing(NotificationError::Transport("connection refused".into()));
    let engine = VoucherWorkflowEngine::new(
        Arc::new(InMemoryVoucherStore::default()),
        Arc::new(registry()),
        Arc::new(dispatcher),
        Arc::new(directory()),
    );
    let snapshot = engine
        .get_or_create_voucher(&employee(), march(), Decimal::ONE)
        .await
        .expect("create");

    let outcome = engine
        .submit_voucher(&employee(), &snapshot.voucher.id, "sup@x.com")
        .await
        .expect("submit succeeds despite mail failure");

    assert_eq!(outcome.voucher.status, VoucherStatus::PendingSupervisor);
    assert!(outcome.notifications.is_empty());
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].action, "submit");
    assert!(outcome.warnings[0].reason.contains("connection refused"));
}

struct StalledDispatcher;

#[async_trait]
impl NotificationDispatcher for StalledDispatcher {
    async fn notify(
        &self,
        _notification: &Notification,
    ) -> Result<DispatchReceipt, NotificationError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(DispatchReceipt::default())
    }
}

#[tokio::test]
async fn slow_notification_times_out_into_a_warning() {
    let engine = VoucherWorkflowEngine::new(
        Arc::new(InMemoryVoucherStore::default()),
        Arc::new(registry()),
        Arc::new(StalledDispatcher),
        Arc::new(directory()),
    )
    .with_settings(WorkflowSettings { notify_timeout: Duration::from_millis(20) });
    let snapshot = engine
        .get_or_create_voucher(&employee(), march(), Decimal::ONE)
        .await
        .expect("create");

    let outcome = engine
        .submit_voucher(&employee(), &snapshot.voucher.id, "sup@x.com")
        .await
        .expect("submit");

    assert_eq!(outcome.voucher.status, VoucherStatus::PendingSupervisor);
    assert!(outcome.warnings[0].reason.contains("timed out"));
}

struct UnavailableDirectory;

#[async_trait]
impl ProfileDirectory for UnavailableDirectory {
    async fn profile(&self, _user_id: &PrincipalId) -> Result<Option<Profile>, DirectoryError> {
        Err(DirectoryError::Unavailable("directory offline".to_owned()))
    }

    async fn record_contact(
        &self,
        _user_id: &PrincipalId,
        _email: &str,
    ) -> Result<(), DirectoryError> {
        Err(DirectoryError::Unavailable("directory offline".to_owned()))
    }
}

#[tokio::test]
async fn final_approval_with_directory_down_still_succeeds() {
    let dispatcher = RecordingDispatcher::default();
    let engine = VoucherWorkflowEngine::new(
        Arc::new(InMemoryVoucherStore::default()),
        Arc::new(registry()),
        Arc::new(dispatcher.clone()),
        Arc::new(UnavailableDirectory),
    );
    let voucher = submitted_voucher(&engine).await;
    engine.approve_voucher(approve(&voucher.id, "sup-1", Some("vp@x.com"))).await.expect("sup");
    engine.approve_voucher(approve(&voucher.id, "vp-1", Some("coo@x.com"))).await.expect("vp");

    let outcome = engine.approve_voucher(approve(&voucher.id, "coo-1", None)).await.expect("coo");

    assert_eq!(outcome.voucher.status, VoucherStatus::Approved);
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].recipient, None);
    assert!(outcome.warnings[0].reason.contains("directory offline"));
    assert!(!dispatcher
        .sent()
        .iter()
        .any(|notification| notification.kind == NotificationKind::FullyApproved));
}

#[tokio::test]
async fn employee_address_from_sign_in_reaches_returned_and_approved_notices() {
    let dispatcher = RecordingDispatcher::default();
    let engine = VoucherWorkflowEngine::new(
        Arc::new(InMemoryVoucherStore::default()),
        Arc::new(registry()),
        Arc::new(dispatcher.clone()),
        Arc::new(InMemoryProfileDirectory::default()),
    );
    let voucher = submitted_voucher(&engine).await;

    let rejected = engine
        .reject_voucher(RejectVoucher {
            voucher_id: voucher.id.clone(),
            actor_id: id("sup-1"),
            reason: "missing receipts".to_owned(),
        })
        .await
        .expect("reject");
    assert!(rejected.warnings.is_empty(), "unexpected warnings: {:?}", rejected.warnings);
    let returned = dispatcher.sent().pop().expect("employee notified");
    assert_eq!(returned.kind, NotificationKind::Returned);
    assert_eq!(returned.recipient, "dana@example.com");

    engine.submit_voucher(&employee(), &voucher.id, "sup@x.com").await.expect("resubmit");
    engine.approve_voucher(approve(&voucher.id, "sup-1", Some("vp@x.com"))).await.expect("sup");
    engine.approve_voucher(approve(&voucher.id, "vp-1", Some("coo@x.com"))).await.expect("vp");
    let approved =
        engine.approve_voucher(approve(&voucher.id, "coo-1", None)).await.expect("coo");

    assert!(approved.warnings.is_empty());
    let fully_approved = dispatcher.sent().pop().expect("employee notified");
    assert_eq!(fully_approved.kind, NotificationKind::FullyApproved);
    assert_eq!(fully_approved.recipient, "dana@example.com");
}

#[tokio::test]
async fn rejected_voucher_takes_the_corrected_mileage_before_resubmission() {
    let Harness { engine, .. } = harness();
    let voucher = submitted_voucher(&engine).await;
    engine
        .reject_voucher(RejectVoucher {
            voucher_id: voucher.id.clone(),
            actor_id: id("sup-1"),
            reason: "missing receipts".to_owned(),
        })
        .await
        .expect("reject");

    let corrected = engine
        .get_or_create_voucher(&employee(), march(), Decimal::new(150, 0))
        .await
        .expect("refresh");
    assert_eq!(corrected.origin, SnapshotOrigin::Refreshed);
    assert_eq!(corrected.voucher.id, voucher.id);
    assert_eq!(corrected.voucher.status, VoucherStatus::Rejected);
    assert_eq!(corrected.voucher.total_miles, Decimal::new(150, 0));

    let resubmitted = engine
        .submit_voucher(&employee(), &voucher.id, "sup@x.com")
        .await
        .expect("resubmit")
        .voucher;
    assert_eq!(resubmitted.status, VoucherStatus::PendingSupervisor);
    assert_eq!(resubmitted.total_miles, Decimal::new(150, 0));
}

struct UnavailableRegistry;

#[async_trait]
impl RoleRegistry for UnavailableRegistry {
    async fn roles_of(&self, _principal: &PrincipalId) -> Result<RoleSet, RoleRegistryError> {
        Err(RoleRegistryError::Unavailable("connection reset".to_owned()))
    }
}

#[tokio::test]
async fn role_registry_failure_denies_and_leaves_voucher_unchanged() {
    let Harness { engine, .. } =
        harness_with(Arc::new(InMemoryVoucherStore::default()), Arc::new(UnavailableRegistry));
    let voucher = submitted_voucher(&engine).await;

    let error = engine
        .approve_voucher(approve(&voucher.id, "sup-1", Some("vp@x.com")))
        .await
        .expect_err("registry down");

    assert!(matches!(error, WorkflowError::RoleRegistryUnavailable(_)));
    assert_eq!(error.kind(), ErrorKind::Dependency);
    assert_eq!(
        engine.voucher(&voucher.id).await.expect("read").status,
        VoucherStatus::PendingSupervisor
    );
    assert!(matches!(
        engine.list_pending_for(&id("sup-1")).await,
        Err(WorkflowError::RoleRegistryUnavailable(_))
    ));
}

#[tokio::test]
async fn queue_uses_the_most_senior_role_and_oldest_first() {
    let Harness { engine, .. } = harness();
    let mut submitted = Vec::new();
    for (employee_id, miles) in [("emp-a", 10), ("emp-b", 20)] {
        let principal = Principal::new(employee_id, format!("{employee_id}@x.com"));
        let snapshot = engine
            .get_or_create_voucher(&principal, march(), Decimal::new(miles, 0))
            .await
            .expect("create");
        engine
            .submit_voucher(&principal, &snapshot.voucher.id, "sup@x.com")
            .await
            .expect("submit");
        engine
            .approve_voucher(approve(&snapshot.voucher.id, "sup-1", Some("vp@x.com")))
            .await
            .expect("supervisor approves");
        submitted.push(snapshot.voucher.id);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    let still_with_supervisor = submitted_voucher(&engine).await;

    match engine.list_pending_for(&id("lead-1")).await.expect("queue") {
        ApprovalQueue::Pending { role, vouchers } => {
            assert_eq!(role, ApproverRole::Vp);
            let ids: Vec<VoucherId> = vouchers.into_iter().map(|voucher| voucher.id).collect();
            assert_eq!(ids, submitted);
        }
        ApprovalQueue::NoApproverRole => panic!("lead holds approver roles"),
    }

    match engine.list_pending_for(&id("sup-2")).await.expect("queue") {
        ApprovalQueue::Pending { role, vouchers } => {
            assert_eq!(role, ApproverRole::Supervisor);
            assert_eq!(vouchers.len(), 1);
            assert_eq!(vouchers[0].id, still_with_supervisor.id);
        }
        ApprovalQueue::NoApproverRole => panic!("supervisor holds an approver role"),
    }

    assert_eq!(
        engine.list_pending_for(&id("acct-1")).await.expect("queue"),
        ApprovalQueue::NoApproverRole
    );
}

#[tokio::test]
async fn strangers_cannot_see_other_vouchers() {
    let Harness { engine, .. } = harness();
    let voucher = submitted_voucher(&engine).await;

    let stranger = engine.visible_voucher(&id("emp-9"), &voucher.id).await;
    assert!(matches!(stranger, Err(WorkflowError::NotFound(_))));

    let owner = engine.visible_voucher(&id("emp-1"), &voucher.id).await.expect("owner");
    assert_eq!(owner.id, voucher.id);
    let approver = engine.visible_voucher(&id("coo-1"), &voucher.id).await.expect("approver");
    assert_eq!(approver.id, voucher.id);
}

/// Holds every voucher read at a barrier once armed, so two callers observe the same status
/// before either writes.
struct GatedStore {
    inner: InMemoryVoucherStore,
    armed: AtomicBool,
    barrier: Barrier,
}

#[async_trait]
impl VoucherStore for GatedStore {
    async fn get_or_create(
        &self,
        employee_id: &PrincipalId,
        month: VoucherMonth,
        total_miles: Decimal,
    ) -> Result<VoucherSnapshot, StoreError> {
        self.inner.get_or_create(employee_id, month, total_miles).await
    }

    async fn find_by_id(&self, voucher_id: &VoucherId) -> Result<Option<Voucher>, StoreError> {
        let found = self.inner.find_by_id(voucher_id).await;
        if self.armed.load(Ordering::SeqCst) {
            self.barrier.wait().await;
        }
        found
    }

    async fn find_for_month(
        &self,
        employee_id: &PrincipalId,
        month: VoucherMonth,
    ) -> Result<Option<Voucher>, StoreError> {
        self.inner.find_for_month(employee_id, month).await
    }

    async fn list_for_employee(
        &self,
        employee_id: &PrincipalId,
    ) -> Result<Vec<Voucher>, StoreError> {
        self.inner.list_for_employee(employee_id).await
    }

    async fn list_by_status(&self, status: VoucherStatus) -> Result<Vec<Voucher>, StoreError> {
        self.inner.list_by_status(status).await
    }

    async fn apply_transition(&self, transition: VoucherTransition) -> Result<Voucher, StoreError> {
        self.inner.apply_transition(transition).await
    }

    async fn history(
        &self,
        voucher_id: &VoucherId,
    ) -> Result<Vec<ApprovalHistoryEntry>, StoreError> {
        self.inner.history(voucher_id).await
    }
}

#[tokio::test]
async fn concurrent_same_stage_approvals_yield_one_winner() {
    let store = Arc::new(GatedStore {
        inner: InMemoryVoucherStore::default(),
        armed: AtomicBool::new(false),
        barrier: Barrier::new(2),
    });
    let Harness { engine, .. } = harness_with(store.clone(), Arc::new(registry()));
    let voucher = submitted_voucher(&engine).await;

    store.armed.store(true, Ordering::SeqCst);
    let (first, second) = tokio::join!(
        engine.approve_voucher(approve(&voucher.id, "sup-1", Some("vp@x.com"))),
        engine.approve_voucher(approve(&voucher.id, "sup-2", Some("vp@x.com"))),
    );
    store.armed.store(false, Ordering::SeqCst);

    let results = [first, second];
    let winners = results.iter().filter(|result| result.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|result| matches!(result, Err(WorkflowError::Conflict { .. })))
        .count();
    assert_eq!((winners, conflicts), (1, 1));

    assert_eq!(engine.voucher(&voucher.id).await.expect("read").status, VoucherStatus::PendingVp);
    assert_eq!(engine.history(&voucher.id).await.expect("history").len(), 1);
}
