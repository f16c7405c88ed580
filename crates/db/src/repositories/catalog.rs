use std::collections::HashMap;

use sqlx::sqlite::SqliteRow;

use dentalfly_core::domain::discount::DiscountKind;
use dentalfly_core::domain::offer::{BonusTreatment, SpecialOffer, SpecialOfferId};
use dentalfly_core::domain::package::{PackageId, PackageTreatment, TreatmentPackage};
use dentalfly_core::domain::treatment::{Treatment, TreatmentId};

use super::{column, parse_decimal, parse_enum, parse_quantity, CatalogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_treatment(row: &SqliteRow) -> Result<Treatment, RepositoryError> {
    let price_local: String = column(row, "price_local")?;
    let price_reference: String = column(row, "price_reference")?;

    Ok(Treatment {
        id: TreatmentId(column(row, "id")?),
        name: column(row, "name")?,
        price_local: parse_decimal("price_local", &price_local)?,
        price_reference: parse_decimal("price_reference", &price_reference)?,
        description: column(row, "description")?,
        guarantee: column(row, "guarantee")?,
    })
}

fn row_to_component(row: &SqliteRow) -> Result<(String, TreatmentId, u32), RepositoryError> {
    let owner: String = column(row, "owner_id")?;
    let treatment_id: String = column(row, "treatment_id")?;
    let quantity: i64 = column(row, "quantity")?;
    Ok((owner, TreatmentId(treatment_id), parse_quantity("quantity", quantity)?))
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn list_treatments(&self) -> Result<Vec<Treatment>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, price_local, price_reference, description, guarantee
             FROM treatment ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_treatment).collect()
    }

    async fn list_packages(&self) -> Result<Vec<TreatmentPackage>, RepositoryError> {
        let component_rows = sqlx::query(
            "SELECT package_id AS owner_id, treatment_id, quantity
             FROM package_treatment ORDER BY package_id, position",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut components: HashMap<String, Vec<PackageTreatment>> = HashMap::new();
        for row in &component_rows {
            let (package_id, treatment_id, quantity) = row_to_component(row)?;
            components
                .entry(package_id)
                .or_default()
                .push(PackageTreatment { treatment_id, quantity });
        }

        let rows = sqlx::query(
            "SELECT id, name, price, savings FROM treatment_package ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = column(row, "id")?;
                let price: String = column(row, "price")?;
                let savings: String = column(row, "savings")?;
                Ok(TreatmentPackage {
                    treatments: components.remove(&id).unwrap_or_default(),
                    id: PackageId(id),
                    name: column(row, "name")?,
                    price: parse_decimal("price", &price)?,
                    savings: parse_decimal("savings", &savings)?,
                })
            })
            .collect()
    }

    async fn list_offers(&self) -> Result<Vec<SpecialOffer>, RepositoryError> {
        let bonus_rows = sqlx::query(
            "SELECT offer_id AS owner_id, treatment_id, quantity
             FROM offer_bonus_treatment ORDER BY offer_id, rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut bonuses: HashMap<String, Vec<BonusTreatment>> = HashMap::new();
        for row in &bonus_rows {
            let (offer_id, treatment_id, quantity) = row_to_component(row)?;
            bonuses.entry(offer_id).or_default().push(BonusTreatment { treatment_id, quantity });
        }

        let rows = sqlx::query(
            "SELECT id, title, clinic_id, discount_kind, discount_value, promo_code
             FROM special_offer WHERE active = 1 ORDER BY sort_order, id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = column(row, "id")?;
                let kind: String = column(row, "discount_kind")?;
                let value: String = column(row, "discount_value")?;
                Ok(SpecialOffer {
                    bonus_treatments: bonuses.remove(&id).unwrap_or_default(),
                    id: SpecialOfferId(id),
                    title: column(row, "title")?,
                    clinic_id: column(row, "clinic_id")?,
                    discount_kind: parse_enum::<DiscountKind>("discount_kind", &kind)?,
                    discount_value: parse_decimal("discount_value", &value)?,
                    promo_code: column(row, "promo_code")?,
                })
            })
            .collect()
    }

    async fn save_treatment(&self, treatment: Treatment) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO treatment (id, name, price_local, price_reference, description, guarantee, sort_order)
             VALUES (?, ?, ?, ?, ?, ?, (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM treatment))
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 price_local = excluded.price_local,
                 price_reference = excluded.price_reference,
                 description = excluded.description,
                 guarantee = excluded.guarantee",
        )
        .bind(&treatment.id.0)
        .bind(&treatment.name)
        .bind(treatment.price_local.to_string())
        .bind(treatment.price_reference.to_string())
        .bind(&treatment.description)
        .bind(&treatment.guarantee)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_package(&self, package: TreatmentPackage) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO treatment_package (id, name, price, savings, sort_order)
             VALUES (?, ?, ?, ?, (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM treatment_package))
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 price = excluded.price,
                 savings = excluded.savings",
        )
        .bind(&package.id.0)
        .bind(&package.name)
        .bind(package.price.to_string())
        .bind(package.savings.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM package_treatment WHERE package_id = ?")
            .bind(&package.id.0)
            .execute(&mut *tx)
            .await?;

        for (position, component) in package.treatments.iter().enumerate() {
            sqlx::query(
                "INSERT INTO package_treatment (package_id, treatment_id, quantity, position)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&package.id.0)
            .bind(&component.treatment_id.0)
            .bind(i64::from(component.quantity))
            .bind(position as i64 + 1)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn save_offer(&self, offer: SpecialOffer) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO special_offer (id, title, clinic_id, discount_kind, discount_value, promo_code, active, sort_order)
             VALUES (?, ?, ?, ?, ?, ?, 1, (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM special_offer))
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 clinic_id = excluded.clinic_id,
                 discount_kind = excluded.discount_kind,
                 discount_value = excluded.discount_value,
                 promo_code = excluded.promo_code,
                 active = 1",
        )
        .bind(&offer.id.0)
        .bind(&offer.title)
        .bind(&offer.clinic_id)
        .bind(offer.discount_kind.as_str())
        .bind(offer.discount_value.to_string())
        .bind(&offer.promo_code)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM offer_bonus_treatment WHERE offer_id = ?")
            .bind(&offer.id.0)
            .execute(&mut *tx)
            .await?;

        for bonus in &offer.bonus_treatments {
            sqlx::query(
                "INSERT INTO offer_bonus_treatment (offer_id, treatment_id, quantity) VALUES (?, ?, ?)",
            )
            .bind(&offer.id.0)
            .bind(&bonus.treatment_id.0)
            .bind(i64::from(bonus.quantity))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
