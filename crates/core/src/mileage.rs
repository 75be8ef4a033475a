use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::voucher::{PrincipalId, VoucherMonth};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MileageError {
    #[error("mileage source unavailable: {0}")]
    Unavailable(String),
}

/// Source of the monthly mileage total. Trip logging itself lives elsewhere.
#[async_trait]
pub trait MileageTotalProvider: Send + Sync {
    async fn total_for(
        &self,
        employee_id: &PrincipalId,
        month: VoucherMonth,
    ) -> Result<Decimal, MileageError>;
}

/// Fixed totals keyed by employee and month. Unknown months total zero.
#[derive(Default)]
pub struct StaticMileageTotals {
    totals: RwLock<HashMap<(PrincipalId, VoucherMonth), Decimal>>,
}

impl StaticMileageTotals {
    pub async fn set(&self, employee_id: PrincipalId, month: VoucherMonth, total: Decimal) {
        self.totals.write().await.insert((employee_id, month), total);
    }
}

#[async_trait]
impl MileageTotalProvider for StaticMileageTotals {
    async fn total_for(
        &self,
        employee_id: &PrincipalId,
        month: VoucherMonth,
    ) -> Result<Decimal, MileageError> {
        let totals = self.totals.read().await;
        Ok(totals.get(&(employee_id.clone(), month)).copied().unwrap_or(Decimal::ZERO))
    }
}
