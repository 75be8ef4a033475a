use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoucherId(pub String);

impl VoucherId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for VoucherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipalId(pub String);

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An already-authenticated caller, as handed over by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
}

impl Principal {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self { id: PrincipalId(id.into()), email: email.into() }
    }
}

/// Calendar month of a voucher, always stored as the first day of the month.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoucherMonth(NaiveDate);

impl VoucherMonth {
    pub fn containing(date: NaiveDate) -> Self {
        Self(date.with_day(1).unwrap_or(date))
    }

    pub fn from_ym(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    /// Accepts `YYYY-MM` or any `YYYY-MM-DD` date inside the month.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Some(Self::containing(date));
        }
        NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").ok().map(Self)
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    pub fn as_storage(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// Human form used in notifications, e.g. `March 2025`.
    pub fn display_name(&self) -> String {
        self.0.format("%B %Y").to_string()
    }
}

impl fmt::Display for VoucherMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_storage())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherStatus {
    Draft,
    PendingSupervisor,
    PendingVp,
    PendingCoo,
    Approved,
    Rejected,
}

impl VoucherStatus {
    pub const ALL: [VoucherStatus; 6] = [
        Self::Draft,
        Self::PendingSupervisor,
        Self::PendingVp,
        Self::PendingCoo,
        Self::Approved,
        Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingSupervisor => "pending_supervisor",
            Self::PendingVp => "pending_vp",
            Self::PendingCoo => "pending_coo",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Strict parse of the persisted form. Unknown strings are never coerced.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "pending_supervisor" => Some(Self::PendingSupervisor),
            "pending_vp" => Some(Self::PendingVp),
            "pending_coo" => Some(Self::PendingCoo),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::PendingSupervisor => "Pending Supervisor",
            Self::PendingVp => "Pending VP",
            Self::PendingCoo => "Pending COO",
            Self::Approved => "Approved",
            Self::Rejected => "Returned for Corrections",
        }
    }

    /// The approver stage currently expected to act, if any.
    pub fn pending_stage(&self) -> Option<ApproverRole> {
        match self {
            Self::PendingSupervisor => Some(ApproverRole::Supervisor),
            Self::PendingVp => Some(ApproverRole::Vp),
            Self::PendingCoo => Some(ApproverRole::Coo),
            Self::Draft | Self::Approved | Self::Rejected => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending_stage().is_some()
    }

    pub fn is_submittable(&self) -> bool {
        matches!(self, Self::Draft | Self::Rejected)
    }
}

impl std::str::FromStr for VoucherStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| DomainError::UnknownValue {
            kind: "voucher status",
            value: value.to_string(),
        })
    }
}

impl fmt::Display for VoucherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the three sequential approval stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    Supervisor,
    Vp,
    Coo,
}

impl ApproverRole {
    pub const CHAIN: [ApproverRole; 3] = [Self::Supervisor, Self::Vp, Self::Coo];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Vp => "vp",
            Self::Coo => "coo",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supervisor" => Some(Self::Supervisor),
            "vp" => Some(Self::Vp),
            "coo" => Some(Self::Coo),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Supervisor => "Supervisor",
            Self::Vp => "Vice President",
            Self::Coo => "Chief Operations Officer",
        }
    }

    pub fn pending_status(&self) -> VoucherStatus {
        match self {
            Self::Supervisor => VoucherStatus::PendingSupervisor,
            Self::Vp => VoucherStatus::PendingVp,
            Self::Coo => VoucherStatus::PendingCoo,
        }
    }

    pub fn next(&self) -> Option<ApproverRole> {
        match self {
            Self::Supervisor => Some(Self::Vp),
            Self::Vp => Some(Self::Coo),
            Self::Coo => None,
        }
    }

    pub fn as_app_role(&self) -> AppRole {
        match self {
            Self::Supervisor => AppRole::Supervisor,
            Self::Vp => AppRole::Vp,
            Self::Coo => AppRole::Coo,
        }
    }
}

impl fmt::Display for ApproverRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every role label a principal may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppRole {
    Supervisor,
    Vp,
    Coo,
    Admin,
    Accountant,
    User,
}

impl AppRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Vp => "vp",
            Self::Coo => "coo",
            Self::Admin => "admin",
            Self::Accountant => "accountant",
            Self::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supervisor" => Some(Self::Supervisor),
            "vp" => Some(Self::Vp),
            "coo" => Some(Self::Coo),
            "admin" => Some(Self::Admin),
            "accountant" => Some(Self::Accountant),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    pub fn approver_role(&self) -> Option<ApproverRole> {
        match self {
            Self::Supervisor => Some(ApproverRole::Supervisor),
            Self::Vp => Some(ApproverRole::Vp),
            Self::Coo => Some(ApproverRole::Coo),
            Self::Admin | Self::Accountant | Self::User => None,
        }
    }
}

impl std::str::FromStr for AppRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
            .ok_or_else(|| DomainError::UnknownValue { kind: "role", value: value.to_string() })
    }
}

impl fmt::Display for AppRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: VoucherId,
    pub employee_id: PrincipalId,
    pub month: VoucherMonth,
    pub total_miles: Decimal,
    pub status: VoucherStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    /// Informational only; routing is decided by role, never by this field.
    pub current_approver_id: Option<PrincipalId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Voucher {
    pub fn draft(employee_id: PrincipalId, month: VoucherMonth, total_miles: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: VoucherId::generate(),
            employee_id,
            month,
            total_miles,
            status: VoucherStatus::Draft,
            submitted_at: None,
            rejection_reason: None,
            current_approver_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, principal: &PrincipalId) -> bool {
        &self.employee_id == principal
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalHistoryEntry {
    pub id: String,
    pub voucher_id: VoucherId,
    pub approver_id: PrincipalId,
    pub approver_role: ApproverRole,
    pub action: ApprovalAction,
    pub acted_at: DateTime<Utc>,
}

impl ApprovalHistoryEntry {
    pub fn new(
        voucher_id: VoucherId,
        approver_id: PrincipalId,
        approver_role: ApproverRole,
        action: ApprovalAction,
        acted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            voucher_id,
            approver_id,
            approver_role,
            action,
            acted_at,
        }
    }
}
