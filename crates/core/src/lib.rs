pub mod approvals;
pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod mileage;
pub mod notifications;
pub mod roles;
pub mod store;
pub mod validation;
pub mod workflow;

pub use approvals::{authorize_stage, queue_role, AuthorizationDenial, AuthorizationResult};
pub use directory::{DirectoryError, InMemoryProfileDirectory, ProfileDirectory};
pub use domain::profile::Profile;
pub use domain::voucher::{
    AppRole, ApprovalAction, ApprovalHistoryEntry, ApproverRole, Principal, PrincipalId, Voucher,
    VoucherId, VoucherMonth, VoucherStatus,
};
pub use errors::{DomainError, ErrorKind, InterfaceError, ValidationError, WorkflowError};
pub use mileage::{MileageError, MileageTotalProvider, StaticMileageTotals};
pub use notifications::{
    DispatchReceipt, NoopDispatcher, Notification, NotificationDispatcher, NotificationError,
    NotificationKind, NotificationReport, NotificationTemplate, NotificationWarning,
    RecordingDispatcher, VoucherSummary,
};
pub use roles::{
    InMemoryRoleRegistry, RoleAdminError, RoleAdministrator, RoleAssignment, RoleAssignmentStore,
    RoleRegistry, RoleRegistryError, RoleSet,
};
pub use store::{
    InMemoryVoucherStore, SnapshotOrigin, StoreError, VoucherSnapshot, VoucherStore,
    VoucherTransition,
};
pub use workflow::{
    ApprovalQueue, ApproveVoucher, RejectVoucher, VoucherWorkflowEngine, WorkflowOutcome,
    WorkflowSettings,
};
