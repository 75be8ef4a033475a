use std::sync::Arc;

use routetracker_core::domain::voucher::PrincipalId;
use routetracker_core::errors::{ErrorKind, WorkflowError};
use routetracker_core::notifications::NoopDispatcher;
use routetracker_core::workflow::{ApprovalQueue, VoucherWorkflowEngine};
use routetracker_db::{SqlProfileDirectory, SqlRoleRegistry, SqlVoucherStore};

use crate::commands::{
    connect, load_config, runtime, CommandResult, EXIT_AUTHORIZATION, EXIT_CONFLICT,
    EXIT_DEPENDENCY, EXIT_VALIDATION,
};

pub fn run(actor: &str) -> CommandResult {
    let config = match load_config("queue") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("queue") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    let actor = PrincipalId(actor.trim().to_string());

    let result = runtime.block_on(async {
        let pool = connect("queue", &config).await?;
        let engine = VoucherWorkflowEngine::new(
            Arc::new(SqlVoucherStore::new(pool.clone())),
            Arc::new(SqlRoleRegistry::new(pool.clone())),
            Arc::new(NoopDispatcher),
            Arc::new(SqlProfileDirectory::new(pool.clone())),
        );
        let queue = engine.list_pending_for(&actor).await;
        pool.close().await;
        queue.map_err(workflow_failure)
    });

    match result {
        Ok(queue) => CommandResult::success("queue", render_queue(&queue)),
        Err(failure) => failure,
    }
}

fn workflow_failure(error: WorkflowError) -> CommandResult {
    let (error_class, exit_code) = match error.kind() {
        ErrorKind::Validation => ("validation", EXIT_VALIDATION),
        ErrorKind::Authorization => ("authorization", EXIT_AUTHORIZATION),
        ErrorKind::Conflict | ErrorKind::NotFound => ("conflict", EXIT_CONFLICT),
        ErrorKind::Dependency => ("dependency", EXIT_DEPENDENCY),
    };
    CommandResult::failure("queue", error_class, error.to_string(), exit_code)
}

fn render_queue(queue: &ApprovalQueue) -> String {
    match queue {
        ApprovalQueue::NoApproverRole => "no approver role; nothing to review".to_string(),
        ApprovalQueue::Pending { role, vouchers } if vouchers.is_empty() => {
            format!("{} queue is empty", role.display_name())
        }
        ApprovalQueue::Pending { role, vouchers } => {
            let entries: Vec<String> = vouchers
                .iter()
                .map(|voucher| {
                    format!(
                        "{} ({} {}, {} mi)",
                        voucher.id,
                        voucher.employee_id,
                        voucher.month.display_name(),
                        voucher.total_miles
                    )
                })
                .collect();
            format!("{} queue: {} pending: {}", role.display_name(), vouchers.len(), entries.join("; "))
        }
    }
}
