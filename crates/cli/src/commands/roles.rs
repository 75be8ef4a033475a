use routetracker_core::domain::voucher::{AppRole, PrincipalId};
use routetracker_core::roles::{RoleAdminError, RoleAdministrator, RoleAssignment};
use routetracker_db::SqlRoleRegistry;

use crate::commands::{
    connect, load_config, runtime, CommandResult, EXIT_AUTHORIZATION, EXIT_CONFLICT,
    EXIT_DEPENDENCY, EXIT_VALIDATION,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleAction {
    Grant,
    Revoke,
}

impl RoleAction {
    fn command(&self) -> &'static str {
        match self {
            Self::Grant => "roles.grant",
            Self::Revoke => "roles.revoke",
        }
    }
}

pub fn change(action: RoleAction, actor: &str, user: &str, role: &str) -> CommandResult {
    let command = action.command();
    let Some(role) = AppRole::parse(role.trim()) else {
        return CommandResult::failure(
            command,
            "validation",
            format!(
                "unknown role `{role}` (expected supervisor|vp|coo|accountant|admin|user)"
            ),
            EXIT_VALIDATION,
        );
    };
    let actor = PrincipalId(actor.trim().to_string());
    let user = PrincipalId(user.trim().to_string());

    let outcome = with_administrator(command, |admin| async move {
        let changed = match action {
            RoleAction::Grant => admin.grant(&actor, &user, role).await,
            RoleAction::Revoke => admin.revoke(&actor, &user, role).await,
        };
        changed.map(|()| format!("{} `{role}` for `{user}`", past_tense(action)))
    });

    match outcome {
        Ok(message) => CommandResult::success(command, message),
        Err(failure) => failure,
    }
}

pub fn list(actor: &str) -> CommandResult {
    let actor = PrincipalId(actor.trim().to_string());
    let outcome = with_administrator("roles.list", |admin| async move {
        admin.list(&actor).await.map(|assignments| render_assignments(&assignments))
    });

    match outcome {
        Ok(message) => CommandResult::success("roles.list", message),
        Err(failure) => failure,
    }
}

fn with_administrator<F, Fut>(command: &str, operation: F) -> Result<String, CommandResult>
where
    F: FnOnce(RoleAdministrator<SqlRoleRegistry>) -> Fut,
    Fut: std::future::Future<Output = Result<String, RoleAdminError>>,
{
    let config = load_config(command)?;
    let runtime = runtime(command)?;

    runtime.block_on(async {
        let pool = connect(command, &config).await?;
        let result = operation(RoleAdministrator::new(SqlRoleRegistry::new(pool.clone()))).await;
        pool.close().await;
        result.map_err(|error| admin_failure(command, error))
    })
}

fn admin_failure(command: &str, error: RoleAdminError) -> CommandResult {
    let (error_class, exit_code) = match &error {
        RoleAdminError::NotAdmin => ("authorization", EXIT_AUTHORIZATION),
        RoleAdminError::ProtectedAdmin(_) | RoleAdminError::ImplicitUser => {
            ("validation", EXIT_VALIDATION)
        }
        RoleAdminError::AlreadyAssigned { .. } | RoleAdminError::NotAssigned { .. } => {
            ("conflict", EXIT_CONFLICT)
        }
        RoleAdminError::Registry(_) => ("dependency", EXIT_DEPENDENCY),
    };
    CommandResult::failure(command, error_class, error.to_string(), exit_code)
}

fn past_tense(action: RoleAction) -> &'static str {
    match action {
        RoleAction::Grant => "granted",
        RoleAction::Revoke => "revoked",
    }
}

fn render_assignments(assignments: &[RoleAssignment]) -> String {
    if assignments.is_empty() {
        return "no role assignments".to_string();
    }
    assignments
        .iter()
        .map(|assignment| {
            let roles: Vec<&str> = assignment.roles.iter().map(AppRole::as_str).collect();
            format!("{}: {}", assignment.user_id, roles.join(","))
        })
        .collect::<Vec<_>>()
        .join("; ")
}
