use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::voucher::{
    ApprovalHistoryEntry, PrincipalId, Voucher, VoucherId, VoucherMonth, VoucherStatus,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("voucher `{0}` was not found")]
    NotFound(VoucherId),
    #[error("voucher `{voucher_id}` is no longer in status `{expected}`")]
    Conflict { voucher_id: VoucherId, expected: VoucherStatus },
    #[error("{0}")]
    Backend(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOrigin {
    Created,
    Refreshed,
    Unchanged,
}

impl SnapshotOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Refreshed => "refreshed",
            Self::Unchanged => "unchanged",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherSnapshot {
    pub voucher: Voucher,
    pub origin: SnapshotOrigin,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReasonUpdate {
    Keep,
    Clear,
    Set(String),
}

/// One conditional status change. Applied only while the stored status still equals `expected`;
/// the history row, when present, commits together with the status write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoucherTransition {
    pub voucher_id: VoucherId,
    pub expected: VoucherStatus,
    pub to: VoucherStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub rejection_reason: ReasonUpdate,
    pub history: Option<ApprovalHistoryEntry>,
    pub at: DateTime<Utc>,
}

impl VoucherTransition {
    pub fn new(
        voucher_id: VoucherId,
        expected: VoucherStatus,
        to: VoucherStatus,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            voucher_id,
            expected,
            to,
            submitted_at: None,
            rejection_reason: ReasonUpdate::Keep,
            history: None,
            at,
        }
    }

    fn apply_to(&self, voucher: &mut Voucher) {
        voucher.status = self.to;
        if let Some(submitted_at) = self.submitted_at {
            voucher.submitted_at = Some(submitted_at);
        }
        match &self.rejection_reason {
            ReasonUpdate::Keep => {}
            ReasonUpdate::Clear => voucher.rejection_reason = None,
            ReasonUpdate::Set(reason) => voucher.rejection_reason = Some(reason.clone()),
        }
        voucher.updated_at = self.at;
    }
}

#[async_trait]
pub trait VoucherStore: Send + Sync {
    /// At most one voucher exists per employee and month. A concurrent second caller observes
    /// the row the first one created. A differing mileage total is written in place whatever
    /// the status, and the status itself never changes here.
    async fn get_or_create(
        &self,
        employee_id: &PrincipalId,
        month: VoucherMonth,
        total_miles: Decimal,
    ) -> Result<VoucherSnapshot, StoreError>;

    async fn find_by_id(&self, voucher_id: &VoucherId) -> Result<Option<Voucher>, StoreError>;

    async fn find_for_month(
        &self,
        employee_id: &PrincipalId,
        month: VoucherMonth,
    ) -> Result<Option<Voucher>, StoreError>;

    /// Newest month first.
    async fn list_for_employee(&self, employee_id: &PrincipalId)
        -> Result<Vec<Voucher>, StoreError>;

    /// Oldest submission first.
    async fn list_by_status(&self, status: VoucherStatus) -> Result<Vec<Voucher>, StoreError>;

    async fn apply_transition(&self, transition: VoucherTransition) -> Result<Voucher, StoreError>;

    /// Oldest action first.
    async fn history(&self, voucher_id: &VoucherId)
        -> Result<Vec<ApprovalHistoryEntry>, StoreError>;
}

#[derive(Default)]
struct InMemoryState {
    vouchers: HashMap<VoucherId, Voucher>,
    by_month: HashMap<(PrincipalId, VoucherMonth), VoucherId>,
    history: Vec<ApprovalHistoryEntry>,
}

/// Single-lock store: every method holds the mutex for its whole body, so the conditional
/// transition and its history row are observed together.
#[derive(Default)]
pub struct InMemoryVoucherStore {
    state: Mutex<InMemoryState>,
}

#[async_trait]
impl VoucherStore for InMemoryVoucherStore {
    async fn get_or_create(
        &self,
        employee_id: &PrincipalId,
        month: VoucherMonth,
        total_miles: Decimal,
    ) -> Result<VoucherSnapshot, StoreError> {
        let mut state = self.state.lock().await;
        let key = (employee_id.clone(), month);

        if let Some(voucher_id) = state.by_month.get(&key).cloned() {
            let voucher = state.vouchers.get_mut(&voucher_id).ok_or_else(|| {
                StoreError::Backend(format!("month index points at missing voucher `{voucher_id}`"))
            })?;
            if voucher.total_miles != total_miles {
                voucher.total_miles = total_miles;
                voucher.updated_at = Utc::now();
                return Ok(VoucherSnapshot {
                    voucher: voucher.clone(),
                    origin: SnapshotOrigin::Refreshed,
                });
            }
            return Ok(VoucherSnapshot {
                voucher: voucher.clone(),
                origin: SnapshotOrigin::Unchanged,
            });
        }

        let voucher = Voucher::draft(employee_id.clone(), month, total_miles);
        state.by_month.insert(key, voucher.id.clone());
        state.vouchers.insert(voucher.id.clone(), voucher.clone());
        Ok(VoucherSnapshot { voucher, origin: SnapshotOrigin::Created })
    }

    async fn find_by_id(&self, voucher_id: &VoucherId) -> Result<Option<Voucher>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.vouchers.get(voucher_id).cloned())
    }

    async fn find_for_month(
        &self,
        employee_id: &PrincipalId,
        month: VoucherMonth,
    ) -> Result<Option<Voucher>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .by_month
            .get(&(employee_id.clone(), month))
            .and_then(|voucher_id| state.vouchers.get(voucher_id))
            .cloned())
    }

    async fn list_for_employee(
        &self,
        employee_id: &PrincipalId,
    ) -> Result<Vec<Voucher>, StoreError> {
        let state = self.state.lock().await;
        let mut vouchers: Vec<Voucher> = state
            .vouchers
            .values()
            .filter(|voucher| voucher.is_owned_by(employee_id))
            .cloned()
            .collect();
        vouchers.sort_by(|left, right| right.month.cmp(&left.month));
        Ok(vouchers)
    }

    async fn list_by_status(&self, status: VoucherStatus) -> Result<Vec<Voucher>, StoreError> {
        let state = self.state.lock().await;
        let mut vouchers: Vec<Voucher> =
            state.vouchers.values().filter(|voucher| voucher.status == status).cloned().collect();
        vouchers.sort_by(|left, right| {
            let left_key = (left.submitted_at.is_none(), left.submitted_at, &left.id);
            let right_key = (right.submitted_at.is_none(), right.submitted_at, &right.id);
            left_key.cmp(&right_key)
        });
        Ok(vouchers)
    }

    async fn apply_transition(&self, transition: VoucherTransition) -> Result<Voucher, StoreError> {
        let mut state = self.state.lock().await;
        let voucher = state
            .vouchers
            .get_mut(&transition.voucher_id)
            .ok_or_else(|| StoreError::NotFound(transition.voucher_id.clone()))?;

        if voucher.status != transition.expected {
            return Err(StoreError::Conflict {
                voucher_id: transition.voucher_id.clone(),
                expected: transition.expected,
            });
        }

        transition.apply_to(voucher);
        let updated = voucher.clone();
        if let Some(entry) = transition.history {
            state.history.push(entry);
        }
        Ok(updated)
    }

    async fn history(
        &self,
        voucher_id: &VoucherId,
    ) -> Result<Vec<ApprovalHistoryEntry>, StoreError> {
        let state = self.state.lock().await;
        let mut entries: Vec<ApprovalHistoryEntry> =
            state.history.iter().filter(|entry| &entry.voucher_id == voucher_id).cloned().collect();
        entries.sort_by(|left, right| left.acted_at.cmp(&right.acted_at));
        Ok(entries)
    }
}
