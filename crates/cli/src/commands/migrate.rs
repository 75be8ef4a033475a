use routetracker_db::migrations;

use crate::commands::{connect, load_config, runtime, CommandResult, EXIT_MIGRATION};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("migrate") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect("migrate", &config).await?;
        let applied = migrations::run_pending(&pool).await.map_err(|error| {
            CommandResult::failure("migrate", "migration", error.to_string(), EXIT_MIGRATION)
        });
        pool.close().await;
        applied
    });

    match result {
        Ok(()) => CommandResult::success(
            "migrate",
            format!("applied pending migrations ({} known)", migrations::MIGRATOR.iter().count()),
        ),
        Err(failure) => failure,
    }
}
