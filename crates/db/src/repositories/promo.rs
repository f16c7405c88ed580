use sqlx::sqlite::SqliteRow;

use dentalfly_core::domain::discount::DiscountKind;
use dentalfly_core::domain::treatment::TreatmentId;
use dentalfly_core::quoting::promo::{normalize_code, PromoCodeRule};

use super::{column, parse_decimal, parse_enum, parse_timestamp, PromoCodeRepository, RepositoryError};
use crate::DbPool;

const SELECT_PROMO: &str = "SELECT code, discount_kind, discount_value, active, min_subtotal,
        applicable_treatments, expires_at
 FROM promo_code";

pub struct SqlPromoCodeRepository {
    pool: DbPool,
}

impl SqlPromoCodeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_rule(row: &SqliteRow) -> Result<PromoCodeRule, RepositoryError> {
    let kind: String = column(row, "discount_kind")?;
    let value: String = column(row, "discount_value")?;
    let active: i64 = column(row, "active")?;
    let min_subtotal: Option<String> = column(row, "min_subtotal")?;
    let applicable_json: String = column(row, "applicable_treatments")?;
    let expires_at: Option<String> = column(row, "expires_at")?;

    let applicable: Vec<String> = serde_json::from_str(&applicable_json)
        .map_err(|e| RepositoryError::Decode(format!("applicable_treatments: {e}")))?;

    Ok(PromoCodeRule {
        code: column(row, "code")?,
        kind: parse_enum::<DiscountKind>("discount_kind", &kind)?,
        value: parse_decimal("discount_value", &value)?,
        active: active != 0,
        min_subtotal: min_subtotal
            .as_deref()
            .map(|value| parse_decimal("min_subtotal", value))
            .transpose()?,
        applicable_treatments: applicable.into_iter().map(TreatmentId).collect(),
        expires_at: expires_at
            .as_deref()
            .map(|value| parse_timestamp("expires_at", value))
            .transpose()?,
    })
}

#[async_trait::async_trait]
impl PromoCodeRepository for SqlPromoCodeRepository {
    async fn find_by_code(&self, code: &str) -> Result<Option<PromoCodeRule>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_PROMO} WHERE code = ?"))
            .bind(normalize_code(code))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_rule(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, rule: PromoCodeRule) -> Result<(), RepositoryError> {
        let applicable: Vec<&str> =
            rule.applicable_treatments.iter().map(|id| id.0.as_str()).collect();
        let applicable_json = serde_json::to_string(&applicable)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO promo_code (code, discount_kind, discount_value, active, min_subtotal,
                                     applicable_treatments, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(code) DO UPDATE SET
                 discount_kind = excluded.discount_kind,
                 discount_value = excluded.discount_value,
                 active = excluded.active,
                 min_subtotal = excluded.min_subtotal,
                 applicable_treatments = excluded.applicable_treatments,
                 expires_at = excluded.expires_at",
        )
        .bind(normalize_code(&rule.code))
        .bind(rule.kind.as_str())
        .bind(rule.value.to_string())
        .bind(i64::from(rule.active))
        .bind(rule.min_subtotal.map(|value| value.to_string()))
        .bind(applicable_json)
        .bind(rule.expires_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<PromoCodeRule>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_PROMO} ORDER BY code"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_rule).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use dentalfly_core::domain::treatment::TreatmentId;
    use dentalfly_core::quoting::promo::PromoCodeRule;

    use super::SqlPromoCodeRepository;
    use crate::repositories::PromoCodeRepository;
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlPromoCodeRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        SqlPromoCodeRepository::new(pool)
    }

    #[tokio::test]
    async fn restricted_rule_round_trips() {
        let repository = repository().await;
        let mut rule = PromoCodeRule::percentage("implant20", Decimal::from(20));
        rule.min_subtotal = Some(Decimal::new(49_950, 2));
        rule.applicable_treatments = vec![TreatmentId("implant".to_string())];
        rule.expires_at = Some(Utc.with_ymd_and_hms(2027, 1, 31, 23, 59, 59).unwrap());
        repository.save(rule.clone()).await.expect("save rule");

        let found = repository.find_by_code(" Implant20 ").await.expect("find").expect("present");
        assert_eq!(found, rule);
    }

    #[tokio::test]
    async fn missing_code_is_none_and_list_is_sorted() {
        let repository = repository().await;
        repository
            .save(PromoCodeRule::percentage("SUMMER15", Decimal::from(15)))
            .await
            .expect("save summer");
        let mut retired = PromoCodeRule::percentage("AUTUMN10", Decimal::from(10));
        retired.active = false;
        repository.save(retired).await.expect("save autumn");

        assert!(repository.find_by_code("NOPE").await.expect("find").is_none());

        let codes: Vec<String> =
            repository.list().await.expect("list").into_iter().map(|rule| rule.code).collect();
        assert_eq!(codes, vec!["AUTUMN10".to_string(), "SUMMER15".to_string()]);

        let autumn = repository.find_by_code("autumn10").await.expect("find").expect("present");
        assert!(!autumn.active);
    }
}
