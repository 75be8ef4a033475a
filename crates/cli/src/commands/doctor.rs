use routetracker_core::config::{AppConfig, LoadOptions};
use routetracker_db::{connect_from_config, migrations::MIGRATOR, ping, DbPool};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.extend(check_database(&config));
            checks.push(check_notifications(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in ["database_connectivity", "schema_migrations", "notification_readiness"] {
                checks.push(DoctorCheck::skipped(
                    name,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    // A disabled notifier is reported as skipped and does not fail the run.
    let healthy = checks.iter().all(|check| {
        check.status == CheckStatus::Pass
            || (check.status == CheckStatus::Skipped && check.name == "notification_readiness")
    });
    let overall_status = if healthy { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if healthy {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::skipped("schema_migrations", "skipped because runtime did not start"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_from_config(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                    ),
                    DoctorCheck::skipped(
                        "schema_migrations",
                        "skipped because the database is unreachable",
                    ),
                ];
            }
        };

        let checks = match ping(&pool).await {
            Ok(()) => vec![
                DoctorCheck::pass(
                    "database_connectivity",
                    format!("connected using `{}`", config.database.url),
                ),
                check_migrations(&pool).await,
            ],
            Err(error) => vec![
                DoctorCheck::fail("database_connectivity", format!("ping failed: {error}")),
                DoctorCheck::skipped("schema_migrations", "skipped because ping failed"),
            ],
        };
        pool.close().await;
        checks
    })
}

async fn check_migrations(pool: &DbPool) -> DoctorCheck {
    let known = MIGRATOR.iter().count() as i64;
    let applied: Result<i64, sqlx::Error> =
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await;

    match applied {
        Ok(applied) if applied >= known => {
            DoctorCheck::pass("schema_migrations", format!("{applied}/{known} migrations applied"))
        }
        Ok(applied) => DoctorCheck::fail(
            "schema_migrations",
            format!("{applied}/{known} migrations applied; run `routetracker migrate`"),
        ),
        Err(_) => DoctorCheck::fail(
            "schema_migrations",
            "schema is not initialized; run `routetracker migrate`",
        ),
    }
}

fn check_notifications(config: &AppConfig) -> DoctorCheck {
    let notifications = &config.notifications;
    if !notifications.enabled {
        return DoctorCheck::skipped(
            "notification_readiness",
            "notifications disabled; workflow events will not send e-mail",
        );
    }

    DoctorCheck::pass(
        "notification_readiness",
        format!(
            "delivering to `{}` from `{}`",
            notifications.endpoint.as_deref().unwrap_or("<unset>"),
            notifications.from_address
        ),
    )
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
