use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::voucher::{ApproverRole, PrincipalId};
use crate::roles::RoleSet;

/// Queue precedence when a principal holds several approver roles.
pub const QUEUE_PRECEDENCE: [ApproverRole; 3] =
    [ApproverRole::Coo, ApproverRole::Vp, ApproverRole::Supervisor];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationDenial {
    pub required: ApproverRole,
    pub held: Vec<ApproverRole>,
}

impl fmt::Display for AuthorizationDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.held.is_empty() {
            return write!(
                f,
                "principal holds no approver role; voucher is awaiting `{}` approval",
                self.required
            );
        }
        let held = self.held.iter().map(ApproverRole::as_str).collect::<Vec<_>>().join(", ");
        write!(
            f,
            "approver role(s) `{held}` cannot act on a voucher awaiting `{}` approval",
            self.required
        )
    }
}

impl std::error::Error for AuthorizationDenial {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResult {
    pub allowed: bool,
    pub reason: String,
    pub denial: Option<AuthorizationDenial>,
}

impl AuthorizationResult {
    fn allow(reason: impl Into<String>) -> Self {
        Self { allowed: true, reason: reason.into(), denial: None }
    }

    fn deny(denial: AuthorizationDenial) -> Self {
        Self { allowed: false, reason: denial.to_string(), denial: Some(denial) }
    }

    pub fn into_result(self) -> Result<(), AuthorizationDenial> {
        match self.denial {
            Some(denial) => Err(denial),
            None => Ok(()),
        }
    }
}

/// A principal may act on a pending voucher only when it holds the role of the current stage.
/// Holding a later stage's role grants nothing here.
pub fn authorize_stage(
    approver_id: &PrincipalId,
    required: ApproverRole,
    roles: &RoleSet,
) -> AuthorizationResult {
    if roles.holds_stage(required) {
        return AuthorizationResult::allow(format!(
            "approver `{approver_id}` holds the `{required}` role"
        ));
    }
    AuthorizationResult::deny(AuthorizationDenial { required, held: roles.approver_roles() })
}

/// The single stage whose queue a principal sees.
pub fn queue_role(roles: &RoleSet) -> Option<ApproverRole> {
    QUEUE_PRECEDENCE.into_iter().find(|role| roles.holds_stage(*role))
}

#[cfg(test)]
mod tests {
    use crate::approvals::{authorize_stage, queue_role, AuthorizationDenial};
    use crate::domain::voucher::{AppRole, ApproverRole, PrincipalId};
    use crate::roles::RoleSet;

    fn roles(values: &[AppRole]) -> RoleSet {
        values.iter().copied().collect()
    }

    #[test]
    fn matching_stage_role_is_allowed() {
        let result = authorize_stage(
            &PrincipalId("sup-1".to_owned()),
            ApproverRole::Supervisor,
            &roles(&[AppRole::Supervisor]),
        );

        assert!(result.allowed);
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn higher_stage_role_does_not_cover_lower_stage() {
        let result = authorize_stage(
            &PrincipalId("coo-1".to_owned()),
            ApproverRole::Supervisor,
            &roles(&[AppRole::Coo, AppRole::Admin]),
        );

        assert!(!result.allowed);
        assert_eq!(
            result.into_result(),
            Err(AuthorizationDenial {
                required: ApproverRole::Supervisor,
                held: vec![ApproverRole::Coo]
            })
        );
    }

    #[test]
    fn principal_without_approver_roles_is_denied_with_readable_reason() {
        let result = authorize_stage(
            &PrincipalId("acct-1".to_owned()),
            ApproverRole::Vp,
            &roles(&[AppRole::Accountant]),
        );

        assert!(!result.allowed);
        assert!(result.reason.contains("no approver role"));
    }

    #[test]
    fn queue_role_prefers_the_most_senior_stage() {
        assert_eq!(
            queue_role(&roles(&[AppRole::Supervisor, AppRole::Coo, AppRole::Vp])),
            Some(ApproverRole::Coo)
        );
        assert_eq!(
            queue_role(&roles(&[AppRole::Supervisor, AppRole::Vp])),
            Some(ApproverRole::Vp)
        );
        assert_eq!(queue_role(&roles(&[AppRole::Admin, AppRole::Accountant])), None);
    }
}
