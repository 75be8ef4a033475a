use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use routetracker_core::domain::voucher::{AppRole, PrincipalId};
use routetracker_core::roles::{
    RoleAssignment, RoleAssignmentStore, RoleRegistry, RoleRegistryError, RoleSet,
};

use super::{decode_column, encode_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlRoleRegistry {
    pool: DbPool,
}

impl SqlRoleRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_role(value: &str) -> Result<AppRole, RepositoryError> {
    AppRole::parse(value).ok_or_else(|| RepositoryError::Decode(format!("unknown role `{value}`")))
}

#[async_trait]
impl RoleRegistry for SqlRoleRegistry {
    async fn roles_of(&self, principal: &PrincipalId) -> Result<RoleSet, RoleRegistryError> {
        let rows = sqlx::query("SELECT role FROM user_roles WHERE user_id = ?")
            .bind(&principal.0)
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        let mut roles = RoleSet::default();
        for row in &rows {
            let role: String = decode_column(row, "role")?;
            roles.insert(parse_role(&role)?);
        }
        Ok(roles)
    }
}

#[async_trait]
impl RoleAssignmentStore for SqlRoleRegistry {
    async fn insert_role(
        &self,
        user_id: &PrincipalId,
        role: AppRole,
    ) -> Result<bool, RoleRegistryError> {
        let result = sqlx::query(
            "INSERT INTO user_roles (id, user_id, role, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id, role) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user_id.0)
        .bind(role.as_str())
        .bind(encode_timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_role(
        &self,
        user_id: &PrincipalId,
        role: AppRole,
    ) -> Result<bool, RoleRegistryError> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role = ?")
            .bind(&user_id.0)
            .bind(role.as_str())
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_assignments(&self) -> Result<Vec<RoleAssignment>, RoleRegistryError> {
        let rows = sqlx::query("SELECT user_id, role FROM user_roles ORDER BY user_id, role")
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        let mut grouped: BTreeMap<String, RoleSet> = BTreeMap::new();
        for row in &rows {
            let user_id: String = decode_column(row, "user_id")?;
            let role: String = decode_column(row, "role")?;
            grouped.entry(user_id).or_default().insert(parse_role(&role)?);
        }

        Ok(grouped
            .into_iter()
            .map(|(user_id, roles)| RoleAssignment { user_id: PrincipalId(user_id), roles })
            .collect())
    }
}
