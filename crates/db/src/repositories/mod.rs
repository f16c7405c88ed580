use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use dentalfly_core::domain::offer::SpecialOffer;
use dentalfly_core::domain::package::TreatmentPackage;
use dentalfly_core::domain::quote::{QuoteId, QuoteRecord};
use dentalfly_core::domain::treatment::Treatment;
use dentalfly_core::errors::ApplicationError;
use dentalfly_core::quoting::catalog::Catalog;
use dentalfly_core::quoting::promo::PromoCodeRule;

pub mod catalog;
pub mod memory;
pub mod promo;
pub mod quote;

pub use catalog::SqlCatalogRepository;
pub use memory::{InMemoryCatalogRepository, InMemoryPromoCodeRepository, InMemoryQuoteRepository};
pub use promo::SqlPromoCodeRepository;
pub use quote::SqlQuoteRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_treatments(&self) -> Result<Vec<Treatment>, RepositoryError>;
    async fn list_packages(&self) -> Result<Vec<TreatmentPackage>, RepositoryError>;
    /// Active offers only.
    async fn list_offers(&self) -> Result<Vec<SpecialOffer>, RepositoryError>;
    async fn save_treatment(&self, treatment: Treatment) -> Result<(), RepositoryError>;
    async fn save_package(&self, package: TreatmentPackage) -> Result<(), RepositoryError>;
    async fn save_offer(&self, offer: SpecialOffer) -> Result<(), RepositoryError>;

    async fn load_catalog(&self) -> Result<Catalog, RepositoryError> {
        Ok(Catalog::new(
            self.list_treatments().await?,
            self.list_packages().await?,
            self.list_offers().await?,
        ))
    }
}

#[async_trait]
pub trait PromoCodeRepository: Send + Sync {
    /// Lookup is case-insensitive; inactive codes are returned so the caller can
    /// tell "retired" from "never existed" if it wants to.
    async fn find_by_code(&self, code: &str) -> Result<Option<PromoCodeRule>, RepositoryError>;
    async fn save(&self, rule: PromoCodeRule) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<PromoCodeRule>, RepositoryError>;
}

#[async_trait]
pub trait QuoteRepository: Send + Sync {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<QuoteRecord>, RepositoryError>;
    async fn save(&self, quote: QuoteRecord) -> Result<(), RepositoryError>;
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(format!("{name}: {e}")))
}

pub(crate) fn parse_decimal(name: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value.trim())
        .map_err(|e| RepositoryError::Decode(format!("{name}: `{value}` is not a decimal ({e})")))
}

pub(crate) fn parse_quantity(name: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{name}: `{value}` is not a valid quantity")))
}

pub(crate) fn parse_timestamp(name: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{name}: `{value}` ({e})")))
}

pub(crate) fn parse_enum<T>(name: &str, value: &str) -> Result<T, RepositoryError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| RepositoryError::Decode(format!("{name}: {e}")))
}
