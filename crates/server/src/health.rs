use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use dentalfly_db::{migrations, DbPool};
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "dentalfly-server accepting quote requests".to_string(),
        },
        database,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

/// Ready only when the database answers and every bundled migration has run.
async fn database_check(pool: &DbPool) -> HealthCheck {
    if let Err(error) = sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        return HealthCheck { status: "degraded", detail: format!("database query failed: {error}") };
    }

    let known = migrations::known_migrations();
    match migrations::applied_migrations(pool).await {
        Ok(applied) if applied >= known as i64 => HealthCheck {
            status: "ready",
            detail: format!("database reachable, {applied} migrations applied"),
        },
        Ok(applied) => HealthCheck {
            status: "degraded",
            detail: format!("{applied} of {known} migrations applied"),
        },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("migration status unavailable: {error}"),
        },
    }
}
