use std::time::Instant;

use dentalfly_client::{fetch_catalog, ApiClient};
use dentalfly_core::config::{AppConfig, LoadOptions};
use dentalfly_db::repositories::{CatalogRepository, SqlCatalogRepository};
use dentalfly_db::{connect_with_config, migrations, DbPool};
use serde::Serialize;

use crate::commands::CommandResult;

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

const DATABASE_CHECKS: [&str; 3] = ["database_connectivity", "schema_migrations", "catalog_presence"];

/// Exit code is 0 when every check passes or is skipped, 1 otherwise.
pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Fail { 1 } else { 0 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.extend(runtime_checks(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in DATABASE_CHECKS.into_iter().chain(["api_backend"]) {
                checks.push(DoctorCheck::skipped(name, "skipped because configuration did not load"));
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn runtime_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DATABASE_CHECKS
                .into_iter()
                .chain(["api_backend"])
                .map(|name| DoctorCheck::fail(name, format!("failed to initialize async runtime: {error}")))
                .collect();
        }
    };

    runtime.block_on(async {
        let mut checks = database_checks(config).await;
        checks.push(api_check(config).await);
        checks
    })
}

async fn database_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let pool = match connect_with_config(&config.database).await {
        Ok(pool) => pool,
        Err(error) => {
            return vec![
                DoctorCheck::fail("database_connectivity", format!("failed to connect to database: {error}")),
                DoctorCheck::skipped("schema_migrations", "skipped because the database is unreachable"),
                DoctorCheck::skipped("catalog_presence", "skipped because the database is unreachable"),
            ];
        }
    };

    let mut checks =
        vec![DoctorCheck::pass("database_connectivity", format!("connected using `{}`", config.database.url))];
    let schema = schema_check(&pool).await;
    let schema_ready = schema.status == CheckStatus::Pass;
    checks.push(schema);
    checks.push(if schema_ready {
        catalog_check(&pool).await
    } else {
        DoctorCheck::skipped("catalog_presence", "skipped until migrations are applied")
    });

    pool.close().await;
    checks
}

async fn schema_check(pool: &DbPool) -> DoctorCheck {
    let known = migrations::known_migrations();
    match migrations::applied_migrations(pool).await {
        Ok(applied) if applied >= known as i64 => {
            DoctorCheck::pass("schema_migrations", format!("{applied} of {known} migrations applied"))
        }
        Ok(applied) => DoctorCheck::fail(
            "schema_migrations",
            format!("{applied} of {known} migrations applied; run `dentalfly migrate`"),
        ),
        Err(error) => DoctorCheck::fail("schema_migrations", format!("migration status unavailable: {error}")),
    }
}

async fn catalog_check(pool: &DbPool) -> DoctorCheck {
    match SqlCatalogRepository::new(pool.clone()).load_catalog().await {
        Ok(catalog) if catalog.treatments().is_empty() => {
            DoctorCheck::fail("catalog_presence", "no treatments found; run `dentalfly seed`")
        }
        Ok(catalog) => DoctorCheck::pass(
            "catalog_presence",
            format!(
                "{} treatments, {} packages, {} active special offers",
                catalog.treatments().len(),
                catalog.packages().len(),
                catalog.offers().len()
            ),
        ),
        Err(error) => DoctorCheck::fail("catalog_presence", format!("catalog could not be read: {error}")),
    }
}

async fn api_check(config: &AppConfig) -> DoctorCheck {
    if config.api.base_url.is_none() {
        return DoctorCheck::skipped("api_backend", "api.base_url is not configured; local database only");
    }

    let client = match ApiClient::from_config(&config.api) {
        Ok(client) => client,
        Err(error) => return DoctorCheck::fail("api_backend", error.to_string()),
    };

    let started = Instant::now();
    match fetch_catalog(&client).await {
        Ok(catalog) => DoctorCheck::pass(
            "api_backend",
            format!(
                "{} answered with {} treatments in {}ms",
                client.base_url(),
                catalog.treatments().len(),
                started.elapsed().as_millis()
            ),
        ),
        Err(error) => DoctorCheck::fail("api_backend", format!("{}: {error}", client.base_url())),
    }
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
