use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::voucher::{AppRole, ApproverRole, PrincipalId};

/// Roles held by one principal. `user` is implicit and never stored here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet(BTreeSet<AppRole>);

impl RoleSet {
    pub fn contains(&self, role: AppRole) -> bool {
        self.0.contains(&role)
    }

    pub fn holds_stage(&self, stage: ApproverRole) -> bool {
        self.contains(stage.as_app_role())
    }

    pub fn approver_roles(&self) -> Vec<ApproverRole> {
        self.0.iter().filter_map(AppRole::approver_role).collect()
    }

    pub fn is_admin(&self) -> bool {
        self.contains(AppRole::Admin)
    }

    pub fn insert(&mut self, role: AppRole) -> bool {
        if role == AppRole::User {
            return false;
        }
        self.0.insert(role)
    }

    pub fn remove(&mut self, role: AppRole) -> bool {
        self.0.remove(&role)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AppRole> {
        self.0.iter()
    }
}

impl FromIterator<AppRole> for RoleSet {
    fn from_iter<T: IntoIterator<Item = AppRole>>(iter: T) -> Self {
        let mut set = Self::default();
        for role in iter {
            set.insert(role);
        }
        set
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoleRegistryError {
    #[error("role registry unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RoleRegistry: Send + Sync {
    async fn roles_of(&self, principal: &PrincipalId) -> Result<RoleSet, RoleRegistryError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user_id: PrincipalId,
    pub roles: RoleSet,
}

/// Mutation side of the registry, only reachable through [`RoleAdministrator`].
#[async_trait]
pub trait RoleAssignmentStore: RoleRegistry {
    /// Returns `false` when the assignment already existed.
    async fn insert_role(
        &self,
        user_id: &PrincipalId,
        role: AppRole,
    ) -> Result<bool, RoleRegistryError>;

    /// Returns `false` when there was nothing to remove.
    async fn delete_role(
        &self,
        user_id: &PrincipalId,
        role: AppRole,
    ) -> Result<bool, RoleRegistryError>;

    async fn list_assignments(&self) -> Result<Vec<RoleAssignment>, RoleRegistryError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleChange {
    Grant,
    Revoke,
}

impl RoleChange {
    fn verb(&self) -> &'static str {
        match self {
            Self::Grant => "granted",
            Self::Revoke => "revoked",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoleAdminError {
    #[error("only admins can change role assignments")]
    NotAdmin,
    #[error("the admin role is protected and cannot be {0} through role administration")]
    ProtectedAdmin(&'static str),
    #[error("the user role is implicit and is never stored")]
    ImplicitUser,
    #[error("`{user_id}` already holds role `{role}`")]
    AlreadyAssigned { user_id: PrincipalId, role: AppRole },
    #[error("`{user_id}` does not hold role `{role}`")]
    NotAssigned { user_id: PrincipalId, role: AppRole },
    #[error(transparent)]
    Registry(#[from] RoleRegistryError),
}

/// Policy applied before any role mutation reaches the store.
pub fn check_role_change(
    change: RoleChange,
    role: AppRole,
    actor_roles: &RoleSet,
) -> Result<(), RoleAdminError> {
    if !actor_roles.is_admin() {
        return Err(RoleAdminError::NotAdmin);
    }
    match role {
        AppRole::Admin => Err(RoleAdminError::ProtectedAdmin(change.verb())),
        AppRole::User => Err(RoleAdminError::ImplicitUser),
        AppRole::Supervisor | AppRole::Vp | AppRole::Coo | AppRole::Accountant => Ok(()),
    }
}

pub struct RoleAdministrator<S> {
    store: S,
}

impl<S> RoleAdministrator<S>
where
    S: RoleAssignmentStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn grant(
        &self,
        actor_id: &PrincipalId,
        user_id: &PrincipalId,
        role: AppRole,
    ) -> Result<(), RoleAdminError> {
        let actor_roles = self.store.roles_of(actor_id).await?;
        check_role_change(RoleChange::Grant, role, &actor_roles)?;

        if !self.store.insert_role(user_id, role).await? {
            return Err(RoleAdminError::AlreadyAssigned { user_id: user_id.clone(), role });
        }

        info!(
            event_name = "roles.granted",
            actor_id = %actor_id,
            user_id = %user_id,
            role = role.as_str(),
            "role granted"
        );
        Ok(())
    }

    pub async fn revoke(
        &self,
        actor_id: &PrincipalId,
        user_id: &PrincipalId,
        role: AppRole,
    ) -> Result<(), RoleAdminError> {
        let actor_roles = self.store.roles_of(actor_id).await?;
        check_role_change(RoleChange::Revoke, role, &actor_roles)?;

        if !self.store.delete_role(user_id, role).await? {
            return Err(RoleAdminError::NotAssigned { user_id: user_id.clone(), role });
        }

        info!(
            event_name = "roles.revoked",
            actor_id = %actor_id,
            user_id = %user_id,
            role = role.as_str(),
            "role revoked"
        );
        Ok(())
    }

    pub async fn list(&self, actor_id: &PrincipalId) -> Result<Vec<RoleAssignment>, RoleAdminError> {
        let actor_roles = self.store.roles_of(actor_id).await?;
        if !actor_roles.is_admin() {
            return Err(RoleAdminError::NotAdmin);
        }
        Ok(self.store.list_assignments().await?)
    }
}

#[derive(Default)]
pub struct InMemoryRoleRegistry {
    assignments: RwLock<HashMap<PrincipalId, RoleSet>>,
}

impl InMemoryRoleRegistry {
    pub fn with_roles(entries: Vec<(&str, Vec<AppRole>)>) -> Self {
        let assignments = entries
            .into_iter()
            .map(|(user_id, roles)| (PrincipalId(user_id.to_string()), roles.into_iter().collect()))
            .collect();
        Self { assignments: RwLock::new(assignments) }
    }
}

#[async_trait]
impl RoleRegistry for InMemoryRoleRegistry {
    async fn roles_of(&self, principal: &PrincipalId) -> Result<RoleSet, RoleRegistryError> {
        let assignments = self.assignments.read().await;
        Ok(assignments.get(principal).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl RoleAssignmentStore for InMemoryRoleRegistry {
    async fn insert_role(
        &self,
        user_id: &PrincipalId,
        role: AppRole,
    ) -> Result<bool, RoleRegistryError> {
        let mut assignments = self.assignments.write().await;
        Ok(assignments.entry(user_id.clone()).or_default().insert(role))
    }

    async fn delete_role(
        &self,
        user_id: &PrincipalId,
        role: AppRole,
    ) -> Result<bool, RoleRegistryError> {
        let mut assignments = self.assignments.write().await;
        Ok(assignments.get_mut(user_id).map(|roles| roles.remove(role)).unwrap_or(false))
    }

    async fn list_assignments(&self) -> Result<Vec<RoleAssignment>, RoleRegistryError> {
        let assignments = self.assignments.read().await;
        let mut listed: Vec<RoleAssignment> = assignments
            .iter()
            .filter(|(_, roles)| !roles.is_empty())
            .map(|(user_id, roles)| RoleAssignment { user_id: user_id.clone(), roles: roles.clone() })
            .collect();
        listed.sort_by(|left, right| left.user_id.cmp(&right.user_id));
        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::voucher::{AppRole, ApproverRole, PrincipalId};
    use crate::roles::{
        check_role_change, InMemoryRoleRegistry, RoleAdminError, RoleAdministrator, RoleChange,
        RoleRegistry, RoleSet,
    };

    fn id(value: &str) -> PrincipalId {
        PrincipalId(value.to_string())
    }

    #[test]
    fn user_role_is_never_stored_in_a_role_set() {
        let roles: RoleSet = vec![AppRole::User, AppRole::Vp].into_iter().collect();
        assert!(!roles.contains(AppRole::User));
        assert_eq!(roles.approver_roles(), vec![ApproverRole::Vp]);
    }

    #[test]
    fn admin_and_user_roles_are_protected_from_changes() {
        let admin: RoleSet = vec![AppRole::Admin].into_iter().collect();

        assert_eq!(
            check_role_change(RoleChange::Grant, AppRole::Admin, &admin),
            Err(RoleAdminError::ProtectedAdmin("granted"))
        );
        assert_eq!(
            check_role_change(RoleChange::Revoke, AppRole::Admin, &admin),
            Err(RoleAdminError::ProtectedAdmin("revoked"))
        );
        assert_eq!(
            check_role_change(RoleChange::Grant, AppRole::User, &admin),
            Err(RoleAdminError::ImplicitUser)
        );
        assert!(check_role_change(RoleChange::Grant, AppRole::Accountant, &admin).is_ok());
    }

    #[test]
    fn non_admins_cannot_change_roles() {
        let supervisor: RoleSet = vec![AppRole::Supervisor].into_iter().collect();
        assert_eq!(
            check_role_change(RoleChange::Grant, AppRole::Vp, &supervisor),
            Err(RoleAdminError::NotAdmin)
        );
    }

    #[tokio::test]
    async fn administrator_grants_and_revokes_through_the_store() {
        let admin = RoleAdministrator::new(InMemoryRoleRegistry::with_roles(vec![(
            "admin-1",
            vec![AppRole::Admin],
        )]));

        admin.grant(&id("admin-1"), &id("u-7"), AppRole::Supervisor).await.expect("grant");
        let duplicate = admin.grant(&id("admin-1"), &id("u-7"), AppRole::Supervisor).await;
        assert!(matches!(duplicate, Err(RoleAdminError::AlreadyAssigned { .. })));

        let listed = admin.list(&id("admin-1")).await.expect("list");
        assert_eq!(listed.len(), 2);

        admin.revoke(&id("admin-1"), &id("u-7"), AppRole::Supervisor).await.expect("revoke");
        let missing = admin.revoke(&id("admin-1"), &id("u-7"), AppRole::Supervisor).await;
        assert!(matches!(missing, Err(RoleAdminError::NotAssigned { .. })));
    }

    #[tokio::test]
    async fn unknown_principals_have_no_roles() {
        let registry = InMemoryRoleRegistry::default();
        let roles = registry.roles_of(&id("nobody")).await.expect("lookup");
        assert!(roles.is_empty());
    }
}
