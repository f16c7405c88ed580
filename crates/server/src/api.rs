//! JSON endpoints the quote builder talks to: catalog reads, promo code
//! validation and quote persistence.
//!
//! Every failure is answered with an [`ApiError`] body carrying the request's
//! correlation id, taken from `x-correlation-id` when the caller sends one.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::{info, warn};
use uuid::Uuid;

use dentalfly_core::config::PricingConfig;
use dentalfly_core::domain::quote::{QuoteId, QuoteState};
use dentalfly_core::domain::treatment::TreatmentId;
use dentalfly_core::errors::{ApplicationError, InterfaceError};
use dentalfly_core::quoting::{
    calculate_totals, snapshot_quote, validate_lines, PromoRequest, PromoResolver, QuoteStore,
    ResolveError,
};
use dentalfly_core::wire::{
    ApiError, ApplyPromoRequest, ApplyPromoResponse, PackageDto, QuoteResponse, SaveQuoteRequest,
    SaveQuoteResponse, SpecialOfferDto, TreatmentDto,
};
use dentalfly_db::repositories::{
    CatalogRepository, SqlCatalogRepository, SqlPromoCodeRepository, SqlQuoteRepository,
};
use dentalfly_db::{DbPool, RepositoryPromoResolver, RepositoryQuoteStore};

const CORRELATION_HEADER: &str = "x-correlation-id";

type ApiRejection = (StatusCode, Json<ApiError>);
type ApiResult<T> = Result<T, ApiRejection>;

#[derive(Clone)]
pub struct ApiState {
    catalog: Arc<SqlCatalogRepository>,
    promos: Arc<RepositoryPromoResolver<SqlPromoCodeRepository>>,
    quotes: Arc<RepositoryQuoteStore<SqlQuoteRepository>>,
    pricing: PricingConfig,
}

impl ApiState {
    pub fn new(db_pool: DbPool, pricing: PricingConfig) -> Self {
        Self {
            catalog: Arc::new(SqlCatalogRepository::new(db_pool.clone())),
            promos: Arc::new(RepositoryPromoResolver::new(SqlPromoCodeRepository::new(
                db_pool.clone(),
            ))),
            quotes: Arc::new(RepositoryQuoteStore::new(SqlQuoteRepository::new(db_pool))),
            pricing,
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/treatments", get(list_treatments))
        .route("/packages", get(list_packages))
        .route("/special-offers", get(list_special_offers))
        .route("/promo-codes/apply", post(apply_promo_code))
        .route("/quotes", post(save_quote))
        .route("/quotes/{id}", get(get_quote))
        .with_state(state)
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("req-{}", Uuid::new_v4().simple()))
}

fn reject(status: StatusCode, mut error: ApiError, correlation_id: &str) -> ApiRejection {
    error.correlation_id = Some(correlation_id.to_string());
    (status, Json(error))
}

fn application_error(error: ApplicationError, correlation_id: &str) -> ApiRejection {
    let mapped = error.into_interface(correlation_id);
    let (status, code) = match &mapped {
        InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
        InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        InterfaceError::ServiceUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
        InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };

    if status.is_server_error() {
        warn!(
            event_name = "api.request.failed",
            correlation_id,
            status = status.as_u16(),
            error = %mapped,
            "request failed"
        );
    }

    reject(status, ApiError::new(mapped.message()).with_code(code), correlation_id)
}

async fn list_treatments(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<TreatmentDto>>> {
    let correlation_id = correlation_id(&headers);
    let treatments = state
        .catalog
        .list_treatments()
        .await
        .map_err(|error| application_error(error.into(), &correlation_id))?;
    Ok(Json(treatments.iter().map(TreatmentDto::from).collect()))
}

async fn list_packages(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<PackageDto>>> {
    let correlation_id = correlation_id(&headers);
    let packages = state
        .catalog
        .list_packages()
        .await
        .map_err(|error| application_error(error.into(), &correlation_id))?;
    Ok(Json(packages.iter().map(PackageDto::from).collect()))
}

async fn list_special_offers(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<SpecialOfferDto>>> {
    let correlation_id = correlation_id(&headers);
    let offers = state
        .catalog
        .list_offers()
        .await
        .map_err(|error| application_error(error.into(), &correlation_id))?;
    Ok(Json(offers.iter().map(SpecialOfferDto::from).collect()))
}

/// 404 for unknown or inactive codes, 422 when the code exists but does not
/// apply to this quote.
async fn apply_promo_code(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<ApplyPromoRequest>,
) -> ApiResult<Json<ApplyPromoResponse>> {
    let correlation_id = correlation_id(&headers);
    let promo = PromoRequest::new(
        request.code,
        request.treatments.into_iter().map(TreatmentId).collect(),
        request.subtotal.unwrap_or_default(),
    );

    match state.promos.resolve(&promo).await {
        Ok(discount) => {
            info!(
                event_name = "api.promo.applied",
                correlation_id = %correlation_id,
                code = %discount.source_id,
                kind = discount.kind.as_str(),
                "promo code accepted"
            );
            Ok(Json(ApplyPromoResponse { discount }))
        }
        Err(ResolveError::NotFound { code }) => Err(reject(
            StatusCode::NOT_FOUND,
            ApiError::new(format!("promo code `{code}` is not valid")).with_code("promo_not_found"),
            &correlation_id,
        )),
        Err(ResolveError::NotApplicable { reason, .. }) => Err(reject(
            StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::new(reason).with_code("promo_not_applicable"),
            &correlation_id,
        )),
        Err(error @ ResolveError::Network(_)) => Err(application_error(error.into(), &correlation_id)),
    }
}

/// Recomputes the totals from the submitted lines and discounts and refuses
/// the quote when the caller's total disagrees.
async fn save_quote(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<SaveQuoteRequest>,
) -> ApiResult<(StatusCode, Json<SaveQuoteResponse>)> {
    let correlation_id = correlation_id(&headers);
    let mut draft = request.into_draft();

    let report = validate_lines(&draft.snapshot.line_items);
    if !report.valid {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            ApiError::new(report.summary()).with_code(report.codes().join(",")),
            &correlation_id,
        ));
    }

    if draft.snapshot.reference_currency != state.pricing.reference_currency
        || draft.snapshot.local_currency != state.pricing.local_currency
    {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            ApiError::new(format!(
                "quotes are priced in {}/{}, got {}/{}",
                state.pricing.reference_currency,
                state.pricing.local_currency,
                draft.snapshot.reference_currency,
                draft.snapshot.local_currency
            ))
            .with_code("currency_mismatch"),
            &correlation_id,
        ));
    }

    let quote_state = QuoteState::restore(&draft.snapshot)
        .map_err(|error| application_error(error.into(), &correlation_id))?;
    let totals = calculate_totals(&quote_state);
    if totals.total != draft.snapshot.total {
        warn!(
            event_name = "api.quote.total_mismatch",
            correlation_id = %correlation_id,
            submitted = %draft.snapshot.total,
            recomputed = %totals.total,
            "quote total does not match its lines"
        );
        return Err(reject(
            StatusCode::BAD_REQUEST,
            ApiError::new(format!(
                "total {} does not match recomputed total {}",
                draft.snapshot.total, totals.total
            ))
            .with_code("total_mismatch"),
            &correlation_id,
        ));
    }

    let is_new = draft.id.is_none();
    draft.snapshot = snapshot_quote(
        &quote_state,
        &draft.snapshot.reference_currency,
        &draft.snapshot.local_currency,
    );
    let status = draft.status;

    let id = state
        .quotes
        .save(draft)
        .await
        .map_err(|error| application_error(error, &correlation_id))?;
    info!(
        event_name = "api.quote.saved",
        correlation_id = %correlation_id,
        quote_id = %id,
        status = status.as_str(),
        total = %totals.total,
        "quote saved"
    );

    let code = if is_new { StatusCode::CREATED } else { StatusCode::OK };
    Ok((code, Json(SaveQuoteResponse { id: id.0 })))
}

async fn get_quote(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<QuoteResponse>> {
    let correlation_id = correlation_id(&headers);
    let record = state
        .quotes
        .load(&QuoteId(id))
        .await
        .map_err(|error| application_error(error, &correlation_id))?;
    Ok(Json(QuoteResponse::from(record)))
}
