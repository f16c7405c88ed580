//! `dentalfly quote`: drive a [`QuoteSession`] from command-line arguments and
//! print the priced result.
//!
//! Steps run in a fixed order: package, treatments, offer, promo code. A promo
//! code that is unknown or does not apply is reported in the output and the
//! quote is still priced; only malformed input and unreachable backends fail
//! the command.

use std::sync::Arc;

use dentalfly_client::{fetch_catalog, ApiClient, HttpPromoResolver, HttpQuoteStore};
use dentalfly_core::config::AppConfig;
use dentalfly_core::domain::offer::SpecialOfferId;
use dentalfly_core::domain::package::PackageId;
use dentalfly_core::domain::treatment::TreatmentId;
use dentalfly_core::errors::ApplicationError;
use dentalfly_core::quoting::{
    Catalog, PromoOutcome, PromoResolver, QuoteNotice, QuoteSession, QuoteStore,
};
use dentalfly_db::repositories::{
    CatalogRepository, SqlCatalogRepository, SqlPromoCodeRepository, SqlQuoteRepository,
};
use dentalfly_db::{connect_with_config, migrations, RepositoryPromoResolver, RepositoryQuoteStore};
use serde_json::{json, Value};

use crate::commands::{
    prepare, CommandResult, EXIT_CONFIG, EXIT_DATABASE, EXIT_MIGRATION, EXIT_QUOTE_INPUT,
};
use crate::QuoteArgs;

type Failure = (&'static str, String, u8);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotePlan {
    pub package: Option<PackageId>,
    pub treatments: Vec<(TreatmentId, u32)>,
    pub offer: Option<SpecialOfferId>,
    pub promo: Option<String>,
    pub persist: Persist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persist {
    No,
    Save,
    Submit,
}

impl QuotePlan {
    pub fn from_args(args: &QuoteArgs) -> Result<Self, String> {
        let treatments =
            args.treatments.iter().map(|raw| parse_treatment(raw)).collect::<Result<Vec<_>, _>>()?;
        let package = non_blank(args.package.as_deref()).map(PackageId);
        if package.is_none() && treatments.is_empty() {
            return Err("a quote needs at least one --treatment or a --package".to_string());
        }

        let persist = match (args.save, args.submit) {
            (_, true) => Persist::Submit,
            (true, false) => Persist::Save,
            (false, false) => Persist::No,
        };

        Ok(Self {
            package,
            treatments,
            offer: non_blank(args.offer.as_deref()).map(SpecialOfferId),
            promo: non_blank(args.promo.as_deref()),
            persist,
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

/// `implant` or `implant:2`. Quantity must be at least one.
pub fn parse_treatment(raw: &str) -> Result<(TreatmentId, u32), String> {
    let (id, quantity) = match raw.split_once(':') {
        Some((id, quantity)) => {
            let quantity = quantity
                .trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid quantity in `{raw}`; expected ID[:QTY]"))?;
            (id.trim(), quantity)
        }
        None => (raw.trim(), 1),
    };

    if id.is_empty() {
        return Err(format!("missing treatment id in `{raw}`"));
    }
    if quantity == 0 {
        return Err(format!("quantity for `{id}` must be at least 1"));
    }
    Ok((TreatmentId(id.to_string()), quantity))
}

pub fn run(args: &QuoteArgs) -> CommandResult {
    let plan = match QuotePlan::from_args(args) {
        Ok(plan) => plan,
        Err(message) => {
            return CommandResult::failure("quote", "quote_input", message, EXIT_QUOTE_INPUT)
        }
    };

    let (config, runtime) = match prepare("quote") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        if args.remote {
            run_remote(&config, &plan).await
        } else {
            run_local(&config, &plan).await
        }
    });

    match result {
        Ok(details) => {
            let message = summary(&details);
            CommandResult::success_with_details("quote", message, Some(details))
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("quote", error_class, message, exit_code)
        }
    }
}

async fn run_local(config: &AppConfig, plan: &QuotePlan) -> Result<Value, Failure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;

    let catalog = SqlCatalogRepository::new(pool.clone())
        .load_catalog()
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
    if catalog.treatments().is_empty() {
        return Err((
            "quote_input",
            "the catalog is empty; run `dentalfly seed` first".to_string(),
            EXIT_QUOTE_INPUT,
        ));
    }

    let session = QuoteSession::new(
        Arc::new(catalog),
        RepositoryPromoResolver::new(SqlPromoCodeRepository::new(pool.clone())),
        RepositoryQuoteStore::new(SqlQuoteRepository::new(pool.clone())),
        config.pricing.clone(),
    );
    let result = build_quote(&session, plan, "local").await;
    pool.close().await;
    result
}

async fn run_remote(config: &AppConfig, plan: &QuotePlan) -> Result<Value, Failure> {
    let client = ApiClient::from_config(&config.api)
        .map_err(|error| ("config_validation", error.to_string(), EXIT_CONFIG))?;
    let catalog: Catalog = fetch_catalog(&client)
        .await
        .map_err(|error| ("api_unavailable", error.to_string(), EXIT_DATABASE))?;

    let session = QuoteSession::new(
        Arc::new(catalog),
        HttpPromoResolver::new(client.clone()),
        HttpQuoteStore::new(client),
        config.pricing.clone(),
    );
    build_quote(&session, plan, "remote").await
}

async fn build_quote<R, S>(
    session: &QuoteSession<R, S>,
    plan: &QuotePlan,
    source: &str,
) -> Result<Value, Failure>
where
    R: PromoResolver,
    S: QuoteStore,
{
    let mut notices: Vec<QuoteNotice> = Vec::new();

    if let Some(package_id) = &plan.package {
        notices.extend(session.select_package(package_id).await.map_err(input_failure)?);
    }
    for (treatment_id, quantity) in &plan.treatments {
        notices.extend(session.add_treatment(treatment_id, *quantity).await.map_err(input_failure)?);
    }

    let mut promo = Value::Null;
    if let Some(offer_id) = &plan.offer {
        let application = session.apply_offer(offer_id).await.map_err(input_failure)?;
        notices.extend(application.notices);
        if let Some(outcome) = application.embedded_promo {
            promo = promo_report(outcome, true);
        }
    }
    if let Some(code) = &plan.promo {
        promo = promo_report(session.apply_promo_code(code).await, false);
    }

    let pricing = session.totals().await;
    let snapshot = session.snapshot().await;

    let quote_id = match plan.persist {
        Persist::No => None,
        Persist::Save => Some(session.save().await.map_err(persist_failure)?),
        Persist::Submit => Some(session.submit().await.map_err(persist_failure)?),
    };

    let status = match plan.persist {
        Persist::No => "draft",
        Persist::Save => "saved",
        Persist::Submit => "submitted",
    };

    Ok(json!({
        "source": source,
        "quoteId": quote_id.map(|id| id.0),
        "status": status,
        "lineItems": snapshot.line_items,
        "discounts": pricing.discounts,
        "promo": promo,
        "notices": notices,
        "currency": snapshot.reference_currency,
        "localCurrency": snapshot.local_currency,
        "subtotal": pricing.subtotal,
        "subtotalLocal": pricing.subtotal_local,
        "bundleSavings": pricing.bundle_savings,
        "totalDiscount": pricing.total_discount,
        "total": pricing.total,
    }))
}

/// A rejected code is part of the answer, not a command failure.
fn promo_report(outcome: Result<PromoOutcome, ApplicationError>, via_offer: bool) -> Value {
    match outcome {
        Ok(PromoOutcome::Applied(discount)) => {
            json!({"status": "applied", "code": discount.source_id, "viaOffer": via_offer})
        }
        Ok(PromoOutcome::Degraded(discount)) => json!({
            "status": "degraded",
            "code": discount.source_id,
            "viaOffer": via_offer,
            "message": "validator unreachable; discount estimated from the code",
        }),
        Ok(PromoOutcome::Superseded) => json!({"status": "superseded", "viaOffer": via_offer}),
        Err(error) => {
            let status = if error.is_retryable() { "unavailable" } else { "rejected" };
            json!({"status": status, "viaOffer": via_offer, "message": error.to_string()})
        }
    }
}

fn input_failure(error: ApplicationError) -> Failure {
    ("quote_input", error.to_string(), EXIT_QUOTE_INPUT)
}

fn persist_failure(error: ApplicationError) -> Failure {
    if error.is_retryable() {
        ("quote_persistence", error.to_string(), EXIT_DATABASE)
    } else {
        ("quote_input", error.to_string(), EXIT_QUOTE_INPUT)
    }
}

fn summary(details: &Value) -> String {
    let currency = details["currency"].as_str().unwrap_or_default();
    let total = details["total"].as_str().unwrap_or("0");
    let lines = details["lineItems"].as_array().map(Vec::len).unwrap_or_default();
    match details["quoteId"].as_str() {
        Some(id) => {
            let status = details["status"].as_str().unwrap_or_default();
            format!("quote {id} {status}: {lines} line items, total {total} {currency}")
        }
        None => format!("quote priced: {lines} line items, total {total} {currency}"),
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_treatment, Persist, QuotePlan};
    use crate::QuoteArgs;
    use dentalfly_core::domain::treatment::TreatmentId;

    #[test]
    fn treatment_specs_default_to_one() {
        assert_eq!(parse_treatment("implant"), Ok((TreatmentId("implant".into()), 1)));
        assert_eq!(parse_treatment(" veneer : 8 "), Ok((TreatmentId("veneer".into()), 8)));
    }

    #[test]
    fn malformed_treatment_specs_are_rejected() {
        assert!(parse_treatment("implant:0").is_err());
        assert!(parse_treatment("implant:two").is_err());
        assert!(parse_treatment(":2").is_err());
    }

    #[test]
    fn plan_requires_something_to_quote() {
        let error = QuotePlan::from_args(&QuoteArgs { promo: Some("SUMMER15".into()), ..QuoteArgs::default() })
            .expect_err("nothing selected");
        assert!(error.contains("--treatment"));
    }

    #[test]
    fn plan_normalises_blank_options_and_persistence() {
        let plan = QuotePlan::from_args(&QuoteArgs {
            treatments: vec!["crown:2".into()],
            offer: Some("  ".into()),
            promo: Some(" smile10 ".into()),
            submit: true,
            ..QuoteArgs::default()
        })
        .expect("plan");

        assert_eq!(plan.offer, None);
        assert_eq!(plan.promo.as_deref(), Some("smile10"));
        assert_eq!(plan.persist, Persist::Submit);
        assert_eq!(plan.treatments, vec![(TreatmentId("crown".into()), 2)]);
    }
}
