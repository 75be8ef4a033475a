use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approvals::AuthorizationDenial;
use crate::domain::voucher::{PrincipalId, VoucherId, VoucherStatus};
use crate::flows::FlowTransitionError;
use crate::mileage::MileageError;
use crate::roles::RoleRegistryError;
use crate::store::StoreError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    FlowTransition(#[from] FlowTransitionError),
    #[error("unknown {kind} `{value}`")]
    UnknownValue { kind: &'static str, value: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Input problems detected before the store is touched.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("`{field}` is required")]
    Missing { field: &'static str },
    #[error("`{field}` is not a valid e-mail address: `{value}`")]
    InvalidEmail { field: &'static str, value: String },
    #[error("`{field}` must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("total miles must be non-negative, got {0}")]
    NegativeMiles(Decimal),
    #[error("`{0}` is not a month; expected YYYY-MM")]
    InvalidMonth(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    Conflict,
    NotFound,
    Dependency,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authorization => "authorization",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Dependency => "dependency",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("voucher `{0}` was not found")]
    NotFound(VoucherId),
    #[error("principal `{actor_id}` does not own voucher `{voucher_id}`")]
    NotOwner { voucher_id: VoucherId, actor_id: PrincipalId },
    #[error(transparent)]
    Forbidden(#[from] AuthorizationDenial),
    #[error("voucher `{voucher_id}` is already in flight with status `{status}`")]
    AlreadyInFlight { voucher_id: VoucherId, status: VoucherStatus },
    #[error("voucher `{voucher_id}` is not awaiting approval (status `{status}`)")]
    NotPending { voucher_id: VoucherId, status: VoucherStatus },
    #[error(
        "voucher `{voucher_id}` changed state since it was read (expected `{expected}`), please refresh"
    )]
    Conflict { voucher_id: VoucherId, expected: VoucherStatus },
    #[error("role registry unavailable: {0}")]
    RoleRegistryUnavailable(String),
    #[error("voucher store failure: {0}")]
    Store(String),
    #[error(transparent)]
    Mileage(#[from] MileageError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotOwner { .. } | Self::Forbidden(_) => ErrorKind::Authorization,
            Self::Domain(_)
            | Self::AlreadyInFlight { .. }
            | Self::NotPending { .. }
            | Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RoleRegistryUnavailable(_) | Self::Store(_) | Self::Mileage(_) => {
                ErrorKind::Dependency
            }
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(voucher_id) => Self::NotFound(voucher_id),
            StoreError::Conflict { voucher_id, expected } => Self::Conflict { voucher_id, expected },
            StoreError::Backend(message) => Self::Store(message),
        }
    }
}

impl From<RoleRegistryError> for WorkflowError {
    fn from(value: RoleRegistryError) -> Self {
        match value {
            RoleRegistryError::Unavailable(message) => Self::RoleRegistryUnavailable(message),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action on the voucher.",
            Self::NotFound { .. } => "The voucher could not be found.",
            Self::Conflict { .. } => "The voucher state changed. Please refresh and try again.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "validation",
            Self::Forbidden { .. } => "authorization",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::ServiceUnavailable { .. } => "dependency",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::ServiceUnavailable { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }
}

impl WorkflowError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<WorkflowError> for InterfaceError {
    fn from(value: WorkflowError) -> Self {
        let message = value.to_string();
        let correlation_id = "unassigned".to_owned();
        match value.kind() {
            ErrorKind::Validation => Self::BadRequest { message, correlation_id },
            ErrorKind::Authorization => Self::Forbidden { message, correlation_id },
            ErrorKind::NotFound => Self::NotFound { message, correlation_id },
            ErrorKind::Conflict => Self::Conflict { message, correlation_id },
            ErrorKind::Dependency => Self::ServiceUnavailable { message, correlation_id },
        }
    }
}
