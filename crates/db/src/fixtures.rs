use rust_decimal::Decimal;
use sqlx::Executor;
use std::str::FromStr;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Reference prices the demo data promises; the CLI `seed` command and the
/// end-to-end tests rely on them.
const TREATMENT_PRICES: &[(&str, &str)] = &[
    ("consultation", "50"),
    ("implant", "900"),
    ("crown", "300"),
    ("veneer", "280"),
    ("whitening", "210"),
    ("root_canal", "200"),
];

const PACKAGE_CONTRACT: &[PackageContract] = &[
    PackageContract {
        id: "pkg-001",
        price: "1200",
        savings: "15",
        treatment_ids: &["implant", "crown", "whitening"],
    },
    PackageContract {
        id: "pkg-002",
        price: "4000",
        savings: "20",
        treatment_ids: &["veneer", "consultation", "whitening"],
    },
];

const OFFER_IDS: &[&str] = &["offer-free-consult", "offer-spring-smile"];

const PROMO_CODES: &[(&str, bool)] = &[
    ("SUMMER15", true),
    ("SMILE10", true),
    ("WELCOME50", true),
    ("IMPLANT20", true),
    ("WINTER25", false),
];

/// Demo catalog for a single partner clinic: six treatments, two packages,
/// two special offers (one with a bonus consultation, one carrying a promo
/// code) and a handful of promo codes.
pub struct DemoCatalog;

impl DemoCatalog {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_catalog.sql");

    /// Loads the fixture. Rows that already exist are left untouched, so
    /// loading twice is harmless.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            treatments: TREATMENT_PRICES.len(),
            packages: PACKAGE_CONTRACT.len(),
            offers: OFFER_IDS.len(),
            promo_codes: PROMO_CODES.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for (id, expected_price) in TREATMENT_PRICES {
            let price: Option<String> =
                sqlx::query_scalar("SELECT price_reference FROM treatment WHERE id = ?1")
                    .bind(*id)
                    .fetch_optional(pool)
                    .await?;
            checks.push((*id, decimal_matches(price.as_deref(), expected_price)));
        }

        for package in PACKAGE_CONTRACT {
            let row: Option<(String, String)> =
                sqlx::query_as("SELECT price, savings FROM treatment_package WHERE id = ?1")
                    .bind(package.id)
                    .fetch_optional(pool)
                    .await?;
            let pricing_ok = row.as_ref().is_some_and(|(price, savings)| {
                decimal_matches(Some(price.as_str()), package.price)
                    && decimal_matches(Some(savings.as_str()), package.savings)
            });
            checks.push((package.id, pricing_ok));

            let components: Vec<String> = sqlx::query_scalar(
                "SELECT treatment_id FROM package_treatment WHERE package_id = ?1 ORDER BY position",
            )
            .bind(package.id)
            .fetch_all(pool)
            .await?;
            checks.push((package.components_label(), components == package.treatment_ids));
        }

        for id in OFFER_IDS {
            let active: Option<i64> =
                sqlx::query_scalar("SELECT active FROM special_offer WHERE id = ?1")
                    .bind(*id)
                    .fetch_optional(pool)
                    .await?;
            checks.push((*id, active == Some(1)));
        }

        for (code, expected_active) in PROMO_CODES {
            let active: Option<i64> =
                sqlx::query_scalar("SELECT active FROM promo_code WHERE code = ?1")
                    .bind(*code)
                    .fetch_optional(pool)
                    .await?;
            checks.push((*code, active.map(|value| value != 0) == Some(*expected_active)));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo rows. Quotes referencing demo treatments are kept;
    /// they carry their own copies of names and prices.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let offers = sql_array_from_ids(OFFER_IDS);
        let packages =
            sql_array_from_ids(&PACKAGE_CONTRACT.iter().map(|package| package.id).collect::<Vec<_>>());
        let treatments =
            sql_array_from_ids(&TREATMENT_PRICES.iter().map(|(id, _)| *id).collect::<Vec<_>>());
        let codes = sql_array_from_ids(&PROMO_CODES.iter().map(|(code, _)| *code).collect::<Vec<_>>());

        sqlx::query(&format!("DELETE FROM promo_code WHERE code IN {codes}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM offer_bonus_treatment WHERE offer_id IN {offers}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM special_offer WHERE id IN {offers}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM package_treatment WHERE package_id IN {packages}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM treatment_package WHERE id IN {packages}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM treatment WHERE id IN {treatments}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct PackageContract {
    id: &'static str,
    price: &'static str,
    savings: &'static str,
    treatment_ids: &'static [&'static str],
}

impl PackageContract {
    fn components_label(&self) -> &'static str {
        match self.id {
            "pkg-001" => "pkg-001-components",
            _ => "pkg-002-components",
        }
    }
}

fn decimal_matches(actual: Option<&str>, expected: &str) -> bool {
    match (actual.map(Decimal::from_str), Decimal::from_str(expected)) {
        (Some(Ok(actual)), Ok(expected)) => actual == expected,
        _ => false,
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedResult {
    pub treatments: usize,
    pub packages: usize,
    pub offers: usize,
    pub promo_codes: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use dentalfly_core::domain::package::PackageId;
    use dentalfly_core::domain::treatment::TreatmentId;

    use super::*;
    use crate::repositories::{CatalogRepository, SqlCatalogRepository};
    use crate::{connect_with_settings, migrations};

    async fn seeded_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect to test database");
        migrations::run_pending(&pool).await.expect("run migrations");
        DemoCatalog::load(&pool).await.expect("load demo catalog");
        pool
    }

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!DemoCatalog::SQL.is_empty());
        for (id, _) in TREATMENT_PRICES {
            assert!(DemoCatalog::SQL.contains(&format!("'{id}'")), "fixture is missing {id}");
        }
    }

    #[tokio::test]
    async fn verify_seed_contract_and_idempotency() {
        let pool = seeded_pool().await;
        let first = DemoCatalog::verify(&pool).await.expect("verify seed fixtures");
        assert!(first.all_present, "{:?}", first.checks);

        let second_load = DemoCatalog::load(&pool).await.expect("reload seed fixtures");
        assert_eq!(second_load.packages, 2);
        let second = DemoCatalog::verify(&pool).await.expect("re-verify seed fixtures");
        assert!(second.all_present);
        assert_eq!(first.checks, second.checks);
    }

    #[tokio::test]
    async fn seeded_catalog_loads_through_repository() {
        let pool = seeded_pool().await;
        let catalog = SqlCatalogRepository::new(pool).load_catalog().await.expect("catalog");

        let implant = catalog.find_treatment(&TreatmentId("implant".into())).expect("implant");
        assert_eq!(implant.price_reference, Decimal::from(900));

        let starter = catalog.find_package(&PackageId("pkg-001".into())).expect("pkg-001");
        assert_eq!(starter.price, Decimal::from(1200));
        assert_eq!(starter.savings, Decimal::from(15));
        assert_eq!(starter.treatments.len(), 3);

        assert_eq!(catalog.offers().len(), 2);
        assert!(catalog.offers().iter().any(|offer| offer.promo_code.as_deref() == Some("SMILE10")));
    }

    #[tokio::test]
    async fn clean_removes_demo_rows() {
        let pool = seeded_pool().await;
        DemoCatalog::clean(&pool).await.expect("clean");

        let verification = DemoCatalog::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        assert!(verification.checks.iter().all(|(_, ok)| !ok));
    }
}
