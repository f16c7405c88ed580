use sqlx::sqlite::SqliteRow;

use dentalfly_core::domain::discount::{DiscountDescriptor, DiscountKind, DiscountSource};
use dentalfly_core::domain::line_item::{LineItemSnapshot, OriginKind};
use dentalfly_core::domain::quote::{QuoteId, QuoteRecord, QuoteSnapshot, QuoteStatus};

use super::{
    column, parse_decimal, parse_enum, parse_quantity, parse_timestamp, QuoteRepository,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlQuoteRepository {
    pool: DbPool,
}

impl SqlQuoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_lines(&self, quote_id: &str) -> Result<Vec<LineItemSnapshot>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT line_id, treatment_id, name, unit_price_local, unit_price_reference,
                    quantity, origin, origin_id
             FROM quote_line_item WHERE quote_id = ? ORDER BY position",
        )
        .bind(quote_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_line).collect()
    }

    async fn load_discounts(
        &self,
        quote_id: &str,
    ) -> Result<Vec<DiscountDescriptor>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT source, source_id, kind, value FROM quote_discount WHERE quote_id = ?",
        )
        .bind(quote_id)
        .fetch_all(&self.pool)
        .await?;

        let mut discounts = rows.iter().map(row_to_discount).collect::<Result<Vec<_>, _>>()?;
        discounts.sort_by_key(|discount| discount.source);
        Ok(discounts)
    }
}

fn row_to_line(row: &SqliteRow) -> Result<LineItemSnapshot, RepositoryError> {
    let unit_price_local: String = column(row, "unit_price_local")?;
    let unit_price_reference: String = column(row, "unit_price_reference")?;
    let quantity: i64 = column(row, "quantity")?;
    let origin: String = column(row, "origin")?;

    let unit_price_local = parse_decimal("unit_price_local", &unit_price_local)?;
    let unit_price_reference = parse_decimal("unit_price_reference", &unit_price_reference)?;
    let quantity = parse_quantity("quantity", quantity)?;
    let origin = parse_enum::<OriginKind>("origin", &origin)?;

    Ok(LineItemSnapshot {
        id: column(row, "line_id")?,
        treatment_id: column(row, "treatment_id")?,
        name: column(row, "name")?,
        unit_price_local,
        unit_price_reference,
        quantity,
        subtotal_local: unit_price_local * rust_decimal::Decimal::from(quantity),
        subtotal_reference: unit_price_reference * rust_decimal::Decimal::from(quantity),
        is_locked: origin != OriginKind::Selected,
        is_bonus: origin == OriginKind::Bonus,
        is_package: origin == OriginKind::Package,
        origin,
        origin_id: column(row, "origin_id")?,
    })
}

fn row_to_discount(row: &SqliteRow) -> Result<DiscountDescriptor, RepositoryError> {
    let source: String = column(row, "source")?;
    let kind: String = column(row, "kind")?;
    let value: String = column(row, "value")?;

    Ok(DiscountDescriptor {
        kind: parse_enum::<DiscountKind>("kind", &kind)?,
        value: parse_decimal("value", &value)?,
        source: parse_enum::<DiscountSource>("source", &source)?,
        source_id: column(row, "source_id")?,
    })
}

#[async_trait::async_trait]
impl QuoteRepository for SqlQuoteRepository {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<QuoteRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, status, subtotal, total_discount, total, reference_currency,
                    local_currency, promo_via_offer, created_at, updated_at
             FROM quote WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = column(&row, "status")?;
        let subtotal: String = column(&row, "subtotal")?;
        let total_discount: String = column(&row, "total_discount")?;
        let total: String = column(&row, "total")?;
        let created_at: String = column(&row, "created_at")?;
        let updated_at: String = column(&row, "updated_at")?;

        let snapshot = QuoteSnapshot {
            line_items: self.load_lines(&id.0).await?,
            discounts: self.load_discounts(&id.0).await?,
            promo_via_offer: column(&row, "promo_via_offer")?,
            subtotal: parse_decimal("subtotal", &subtotal)?,
            total_discount: parse_decimal("total_discount", &total_discount)?,
            total: parse_decimal("total", &total)?,
            reference_currency: column(&row, "reference_currency")?,
            local_currency: column(&row, "local_currency")?,
        };

        Ok(Some(QuoteRecord {
            id: QuoteId(column(&row, "id")?),
            status: parse_enum::<QuoteStatus>("status", &status)?,
            snapshot,
            created_at: parse_timestamp("created_at", &created_at)?,
            updated_at: parse_timestamp("updated_at", &updated_at)?,
        }))
    }

    /// Upserts the quote and replaces its lines and discounts in one transaction.
    async fn save(&self, quote: QuoteRecord) -> Result<(), RepositoryError> {
        let snapshot = &quote.snapshot;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO quote (id, status, subtotal, total_discount, total, reference_currency,
                                local_currency, promo_via_offer, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 subtotal = excluded.subtotal,
                 total_discount = excluded.total_discount,
                 total = excluded.total,
                 reference_currency = excluded.reference_currency,
                 local_currency = excluded.local_currency,
                 promo_via_offer = excluded.promo_via_offer,
                 updated_at = excluded.updated_at",
        )
        .bind(&quote.id.0)
        .bind(quote.status.as_str())
        .bind(snapshot.subtotal.to_string())
        .bind(snapshot.total_discount.to_string())
        .bind(snapshot.total.to_string())
        .bind(&snapshot.reference_currency)
        .bind(&snapshot.local_currency)
        .bind(&snapshot.promo_via_offer)
        .bind(quote.created_at.to_rfc3339())
        .bind(quote.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM quote_line_item WHERE quote_id = ?")
            .bind(&quote.id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM quote_discount WHERE quote_id = ?")
            .bind(&quote.id.0)
            .execute(&mut *tx)
            .await?;

        for (position, line) in snapshot.line_items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO quote_line_item (quote_id, line_id, position, treatment_id, name,
                                              unit_price_local, unit_price_reference, quantity,
                                              origin, origin_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&quote.id.0)
            .bind(&line.id)
            .bind(position as i64)
            .bind(&line.treatment_id)
            .bind(&line.name)
            .bind(line.unit_price_local.to_string())
            .bind(line.unit_price_reference.to_string())
            .bind(i64::from(line.quantity))
            .bind(line.origin.as_str())
            .bind(&line.origin_id)
            .execute(&mut *tx)
            .await?;
        }

        for discount in &snapshot.discounts {
            sqlx::query(
                "INSERT INTO quote_discount (quote_id, source, source_id, kind, value)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&quote.id.0)
            .bind(discount.source.as_str())
            .bind(&discount.source_id)
            .bind(discount.kind.as_str())
            .bind(discount.value.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
