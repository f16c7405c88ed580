use std::collections::HashSet;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use dentalfly_core::domain::offer::SpecialOfferId;
use dentalfly_core::domain::package::PackageId;
use dentalfly_core::domain::treatment::TreatmentId;
use dentalfly_db::repositories::{
    CatalogRepository, PromoCodeRepository, SqlCatalogRepository, SqlPromoCodeRepository,
};
use dentalfly_db::{connect_with_settings, migrations, DemoCatalog, DbPool};

type SeedContractTestResult<T = ()> = Result<T, String>;

macro_rules! require {
    ($cond:expr) => {
        if !$cond {
            return Err(format!("assertion failed: `{}`", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            return Err(format!($($arg)*));
        }
    };
}

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
    ($left:expr, $right:expr, $($arg:tt)*) => {
        if $left != $right {
            return Err(format!($($arg)*));
        }
    };
}

#[derive(Debug, Deserialize)]
struct TreatmentContract {
    id: String,
    price_reference: String,
    price_local: String,
}

#[derive(Debug, Deserialize)]
struct PackageContract {
    id: String,
    price: String,
    savings: String,
    treatments: Vec<ComponentContract>,
}

#[derive(Debug, Deserialize)]
struct ComponentContract {
    id: String,
    quantity: u32,
}

#[derive(Debug, Deserialize)]
struct OfferContract {
    id: String,
    bonus_treatments: Vec<String>,
    promo_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromoContract {
    code: String,
    kind: String,
    value: String,
    active: bool,
}

#[derive(Debug, Deserialize)]
struct SeedContract {
    dataset_version: String,
    reference_currency: String,
    local_currency: String,
    treatments: Vec<TreatmentContract>,
    packages: Vec<PackageContract>,
    offers: Vec<OfferContract>,
    promo_codes: Vec<PromoContract>,
}

fn contract() -> SeedContractTestResult<SeedContract> {
    serde_json::from_str(include_str!("../../../config/fixtures/demo_catalog_contract.json"))
        .map_err(|error| format!("seed contract JSON must parse: {error}"))
}

fn decimal(value: &str) -> SeedContractTestResult<Decimal> {
    Decimal::from_str(value).map_err(|error| format!("`{value}` is not a decimal: {error}"))
}

async fn seeded_pool() -> SeedContractTestResult<DbPool> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;
    DemoCatalog::load(&pool).await.map_err(|error| format!("seed: {error}"))?;
    Ok(pool)
}

#[test]
fn seed_contract_matches_demo_catalog_sql_fixture() -> SeedContractTestResult {
    let contract = contract()?;
    let fixture_sql = DemoCatalog::SQL;

    require!(!contract.dataset_version.is_empty());
    require_eq!(contract.reference_currency, "GBP");
    require_eq!(contract.local_currency, "TRY");

    let mut treatment_ids = HashSet::new();
    for treatment in &contract.treatments {
        require!(treatment_ids.insert(treatment.id.as_str()), "duplicate treatment {}", treatment.id);
        require!(
            fixture_sql.contains(&format!(
                "'{}', '{}'",
                treatment.price_local, treatment.price_reference
            )),
            "seed SQL should price {} at {} / {}",
            treatment.id,
            treatment.price_local,
            treatment.price_reference
        );
    }

    for package in &contract.packages {
        require!(
            fixture_sql.contains(&format!("'{}'", package.id)),
            "seed SQL should include package {}",
            package.id
        );
        for component in &package.treatments {
            require!(
                treatment_ids.contains(component.id.as_str()),
                "package {} references unknown treatment {}",
                package.id,
                component.id
            );
            require!(component.quantity > 0);
        }
    }

    for offer in &contract.offers {
        for treatment in &offer.bonus_treatments {
            require!(treatment_ids.contains(treatment.as_str()));
        }
        if let Some(code) = &offer.promo_code {
            require!(
                contract.promo_codes.iter().any(|promo| &promo.code == code && promo.active),
                "offer {} embeds code {} which must be an active promo code",
                offer.id,
                code
            );
        }
    }

    Ok(())
}

#[test]
fn package_prices_are_below_individual_prices() -> SeedContractTestResult {
    let contract = contract()?;

    for package in &contract.packages {
        let mut individual = Decimal::ZERO;
        for component in &package.treatments {
            let treatment = contract
                .treatments
                .iter()
                .find(|treatment| treatment.id == component.id)
                .ok_or_else(|| format!("unknown treatment {}", component.id))?;
            individual += decimal(&treatment.price_reference)? * Decimal::from(component.quantity);
        }
        let price = decimal(&package.price)?;
        let savings = decimal(&package.savings)?;
        require!(savings > Decimal::ZERO && savings < Decimal::ONE_HUNDRED);
        require!(
            price < individual,
            "package {} costs {} but its treatments sum to {}",
            package.id,
            price,
            individual
        );
    }

    Ok(())
}

#[tokio::test]
async fn seeded_database_matches_contract() -> SeedContractTestResult {
    let contract = contract()?;
    let pool = seeded_pool().await?;

    let verification = DemoCatalog::verify(&pool).await.map_err(|error| error.to_string())?;
    require!(verification.all_present, "verification failed: {:?}", verification.checks);

    let catalog = SqlCatalogRepository::new(pool.clone())
        .load_catalog()
        .await
        .map_err(|error| error.to_string())?;

    require_eq!(catalog.treatments().len(), contract.treatments.len());
    for expected in &contract.treatments {
        let treatment = catalog
            .find_treatment(&TreatmentId(expected.id.clone()))
            .ok_or_else(|| format!("treatment {} missing", expected.id))?;
        require_eq!(treatment.price_reference, decimal(&expected.price_reference)?);
        require_eq!(treatment.price_local, decimal(&expected.price_local)?);
    }

    for expected in &contract.packages {
        let package = catalog
            .find_package(&PackageId(expected.id.clone()))
            .ok_or_else(|| format!("package {} missing", expected.id))?;
        let components: Vec<(&str, u32)> = package
            .treatments
            .iter()
            .map(|line| (line.treatment_id.0.as_str(), line.quantity))
            .collect();
        let expected_components: Vec<(&str, u32)> = expected
            .treatments
            .iter()
            .map(|component| (component.id.as_str(), component.quantity))
            .collect();
        require_eq!(components, expected_components);
        require_eq!(package.price, decimal(&expected.price)?);
    }

    for expected in &contract.offers {
        let offer = catalog
            .find_offer(&SpecialOfferId(expected.id.clone()))
            .ok_or_else(|| format!("offer {} missing", expected.id))?;
        require_eq!(offer.promo_code, expected.promo_code);
        let bonus: Vec<&str> =
            offer.bonus_treatments.iter().map(|bonus| bonus.treatment_id.0.as_str()).collect();
        require_eq!(bonus, expected.bonus_treatments.iter().map(String::as_str).collect::<Vec<_>>());
    }

    let promos = SqlPromoCodeRepository::new(pool);
    for expected in &contract.promo_codes {
        let rule = promos
            .find_by_code(&expected.code)
            .await
            .map_err(|error| error.to_string())?
            .ok_or_else(|| format!("promo code {} missing", expected.code))?;
        require_eq!(rule.kind.as_str(), expected.kind.as_str());
        require_eq!(rule.value, decimal(&expected.value)?);
        require_eq!(rule.active, expected.active);
    }

    Ok(())
}
