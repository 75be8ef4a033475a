use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use routetracker_core::domain::voucher::{
    ApprovalAction, ApprovalHistoryEntry, ApproverRole, PrincipalId, Voucher, VoucherId,
    VoucherMonth, VoucherStatus,
};
use routetracker_core::store::{
    ReasonUpdate, SnapshotOrigin, StoreError, VoucherSnapshot, VoucherStore, VoucherTransition,
};

use super::{decode_column, decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

const VOUCHER_COLUMNS: &str = "id, employee_id, month, total_miles, status, submitted_at,
    rejection_reason, current_approver_id, created_at, updated_at";

pub struct SqlVoucherStore {
    pool: DbPool,
}

impl SqlVoucherStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn select_one(
        &self,
        clause: &str,
        binds: &[&str],
    ) -> Result<Option<Voucher>, RepositoryError> {
        let sql = format!("SELECT {VOUCHER_COLUMNS} FROM mileage_vouchers WHERE {clause}");
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(*value);
        }
        let row = query.fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_voucher).transpose()
    }

    async fn select_for_month(
        &self,
        employee_id: &PrincipalId,
        month: VoucherMonth,
    ) -> Result<Option<Voucher>, RepositoryError> {
        let month = month.as_storage();
        self.select_one("employee_id = ? AND month = ?", &[&employee_id.0, &month]).await
    }
}

fn row_to_voucher(row: &sqlx::sqlite::SqliteRow) -> Result<Voucher, RepositoryError> {
    let id: String = decode_column(row, "id")?;
    let employee_id: String = decode_column(row, "employee_id")?;
    let month_str: String = decode_column(row, "month")?;
    let miles_str: String = decode_column(row, "total_miles")?;
    let status_str: String = decode_column(row, "status")?;
    let submitted_at_str: Option<String> = decode_column(row, "submitted_at")?;
    let rejection_reason: Option<String> = decode_column(row, "rejection_reason")?;
    let current_approver_id: Option<String> = decode_column(row, "current_approver_id")?;
    let created_at_str: String = decode_column(row, "created_at")?;
    let updated_at_str: String = decode_column(row, "updated_at")?;

    let month = VoucherMonth::parse(&month_str)
        .ok_or_else(|| RepositoryError::Decode(format!("invalid month `{month_str}`")))?;
    let total_miles = Decimal::from_str(&miles_str)
        .map_err(|e| RepositoryError::Decode(format!("total_miles `{miles_str}`: {e}")))?;
    let status = VoucherStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown voucher status `{status_str}`")))?;
    let submitted_at =
        submitted_at_str.map(|value| decode_timestamp("submitted_at", &value)).transpose()?;

    Ok(Voucher {
        id: VoucherId(id),
        employee_id: PrincipalId(employee_id),
        month,
        total_miles,
        status,
        submitted_at,
        rejection_reason,
        current_approver_id: current_approver_id.map(PrincipalId),
        created_at: decode_timestamp("created_at", &created_at_str)?,
        updated_at: decode_timestamp("updated_at", &updated_at_str)?,
    })
}

fn row_to_history(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalHistoryEntry, RepositoryError> {
    let id: String = decode_column(row, "id")?;
    let voucher_id: String = decode_column(row, "voucher_id")?;
    let approver_id: String = decode_column(row, "approver_id")?;
    let role_str: String = decode_column(row, "approver_role")?;
    let action_str: String = decode_column(row, "action")?;
    let acted_at_str: String = decode_column(row, "acted_at")?;

    let approver_role = ApproverRole::parse(&role_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approver role `{role_str}`")))?;
    let action = ApprovalAction::parse(&action_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approval action `{action_str}`")))?;

    Ok(ApprovalHistoryEntry {
        id,
        voucher_id: VoucherId(voucher_id),
        approver_id: PrincipalId(approver_id),
        approver_role,
        action,
        acted_at: decode_timestamp("acted_at", &acted_at_str)?,
    })
}

enum TransitionWrite {
    Applied,
    Missing,
    Stale,
}

impl SqlVoucherStore {
    async fn write_transition(
        &self,
        transition: &VoucherTransition,
    ) -> Result<TransitionWrite, RepositoryError> {
        let (reason_mode, reason_value) = match &transition.rejection_reason {
            ReasonUpdate::Keep => ("keep", None),
            ReasonUpdate::Clear => ("set", None),
            ReasonUpdate::Set(reason) => ("set", Some(reason.as_str())),
        };

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE mileage_vouchers SET
                 status = ?,
                 submitted_at = COALESCE(?, submitted_at),
                 rejection_reason = CASE WHEN ? = 'keep' THEN rejection_reason ELSE ? END,
                 updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(transition.to.as_str())
        .bind(transition.submitted_at.map(encode_timestamp))
        .bind(reason_mode)
        .bind(reason_value)
        .bind(encode_timestamp(transition.at))
        .bind(&transition.voucher_id.0)
        .bind(transition.expected.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM mileage_vouchers WHERE id = ?")
                .bind(&transition.voucher_id.0)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();
            tx.rollback().await?;
            return Ok(if exists { TransitionWrite::Stale } else { TransitionWrite::Missing });
        }

        if let Some(entry) = &transition.history {
            sqlx::query(
                "INSERT INTO approval_history (id, voucher_id, approver_id, approver_role,
                                               action, acted_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&entry.id)
            .bind(&entry.voucher_id.0)
            .bind(&entry.approver_id.0)
            .bind(entry.approver_role.as_str())
            .bind(entry.action.as_str())
            .bind(encode_timestamp(entry.acted_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(TransitionWrite::Applied)
    }
}

#[async_trait]
impl VoucherStore for SqlVoucherStore {
    async fn get_or_create(
        &self,
        employee_id: &PrincipalId,
        month: VoucherMonth,
        total_miles: Decimal,
    ) -> Result<VoucherSnapshot, StoreError> {
        let draft = Voucher::draft(employee_id.clone(), month, total_miles);
        let inserted = sqlx::query(
            "INSERT INTO mileage_vouchers (id, employee_id, month, total_miles, status,
                                           created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(employee_id, month) DO NOTHING",
        )
        .bind(&draft.id.0)
        .bind(&draft.employee_id.0)
        .bind(month.as_storage())
        .bind(total_miles.to_string())
        .bind(VoucherStatus::Draft.as_str())
        .bind(encode_timestamp(draft.created_at))
        .bind(encode_timestamp(draft.updated_at))
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let existing = self.select_for_month(employee_id, month).await?.ok_or_else(|| {
            StoreError::Backend(format!("voucher for `{employee_id}` {month} vanished after insert"))
        })?;

        if inserted.rows_affected() == 1 {
            return Ok(VoucherSnapshot { voucher: existing, origin: SnapshotOrigin::Created });
        }
        if existing.total_miles == total_miles {
            return Ok(VoucherSnapshot { voucher: existing, origin: SnapshotOrigin::Unchanged });
        }

        // Status is left alone; a rejected voucher is corrected here before resubmission.
        let refreshed = sqlx::query(
            "UPDATE mileage_vouchers SET total_miles = ?, updated_at = ?
             WHERE id = ? AND total_miles <> ?",
        )
        .bind(total_miles.to_string())
        .bind(encode_timestamp(Utc::now()))
        .bind(&existing.id.0)
        .bind(total_miles.to_string())
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let origin = if refreshed.rows_affected() == 1 {
            SnapshotOrigin::Refreshed
        } else {
            SnapshotOrigin::Unchanged
        };
        let voucher = self
            .select_one("id = ?", &[&existing.id.0])
            .await?
            .ok_or_else(|| StoreError::NotFound(existing.id.clone()))?;
        Ok(VoucherSnapshot { voucher, origin })
    }

    async fn find_by_id(&self, voucher_id: &VoucherId) -> Result<Option<Voucher>, StoreError> {
        Ok(self.select_one("id = ?", &[&voucher_id.0]).await?)
    }

    async fn find_for_month(
        &self,
        employee_id: &PrincipalId,
        month: VoucherMonth,
    ) -> Result<Option<Voucher>, StoreError> {
        Ok(self.select_for_month(employee_id, month).await?)
    }

    async fn list_for_employee(
        &self,
        employee_id: &PrincipalId,
    ) -> Result<Vec<Voucher>, StoreError> {
        let sql = format!(
            "SELECT {VOUCHER_COLUMNS} FROM mileage_vouchers
             WHERE employee_id = ? ORDER BY month DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(&employee_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(rows.iter().map(row_to_voucher).collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_by_status(&self, status: VoucherStatus) -> Result<Vec<Voucher>, StoreError> {
        let sql = format!(
            "SELECT {VOUCHER_COLUMNS} FROM mileage_vouchers
             WHERE status = ?
             ORDER BY submitted_at IS NULL, submitted_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(rows.iter().map(row_to_voucher).collect::<Result<Vec<_>, _>>()?)
    }

    async fn apply_transition(&self, transition: VoucherTransition) -> Result<Voucher, StoreError> {
        match self.write_transition(&transition).await? {
            TransitionWrite::Applied => {}
            TransitionWrite::Missing => return Err(StoreError::NotFound(transition.voucher_id)),
            TransitionWrite::Stale => {
                return Err(StoreError::Conflict {
                    voucher_id: transition.voucher_id,
                    expected: transition.expected,
                })
            }
        }

        let voucher_id = transition.voucher_id;
        let updated = self.select_one("id = ?", &[&voucher_id.0]).await?;
        updated.ok_or(StoreError::NotFound(voucher_id))
    }

    async fn history(
        &self,
        voucher_id: &VoucherId,
    ) -> Result<Vec<ApprovalHistoryEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, voucher_id, approver_id, approver_role, action, acted_at
             FROM approval_history WHERE voucher_id = ?
             ORDER BY acted_at ASC, id ASC",
        )
        .bind(&voucher_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(rows.iter().map(row_to_history).collect::<Result<Vec<_>, _>>()?)
    }
}
