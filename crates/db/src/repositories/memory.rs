use std::collections::HashMap;

use tokio::sync::RwLock;

use dentalfly_core::domain::offer::SpecialOffer;
use dentalfly_core::domain::package::TreatmentPackage;
use dentalfly_core::domain::quote::{QuoteId, QuoteRecord};
use dentalfly_core::domain::treatment::Treatment;
use dentalfly_core::quoting::promo::{normalize_code, PromoCodeRule};

use super::{CatalogRepository, PromoCodeRepository, QuoteRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryQuoteRepository {
    quotes: RwLock<HashMap<String, QuoteRecord>>,
}

#[async_trait::async_trait]
impl QuoteRepository for InMemoryQuoteRepository {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<QuoteRecord>, RepositoryError> {
        let quotes = self.quotes.read().await;
        Ok(quotes.get(&id.0).cloned())
    }

    async fn save(&self, mut quote: QuoteRecord) -> Result<(), RepositoryError> {
        let mut quotes = self.quotes.write().await;
        if let Some(existing) = quotes.get(&quote.id.0) {
            quote.created_at = existing.created_at;
        }
        quotes.insert(quote.id.0.clone(), quote);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPromoCodeRepository {
    rules: RwLock<HashMap<String, PromoCodeRule>>,
}

impl InMemoryPromoCodeRepository {
    pub fn with_rules(rules: impl IntoIterator<Item = PromoCodeRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|mut rule| {
                rule.code = normalize_code(&rule.code);
                (rule.code.clone(), rule)
            })
            .collect();
        Self { rules: RwLock::new(rules) }
    }
}

#[async_trait::async_trait]
impl PromoCodeRepository for InMemoryPromoCodeRepository {
    async fn find_by_code(&self, code: &str) -> Result<Option<PromoCodeRule>, RepositoryError> {
        let rules = self.rules.read().await;
        Ok(rules.get(&normalize_code(code)).cloned())
    }

    async fn save(&self, mut rule: PromoCodeRule) -> Result<(), RepositoryError> {
        rule.code = normalize_code(&rule.code);
        let mut rules = self.rules.write().await;
        rules.insert(rule.code.clone(), rule);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PromoCodeRule>, RepositoryError> {
        let rules = self.rules.read().await;
        let mut listed: Vec<PromoCodeRule> = rules.values().cloned().collect();
        listed.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(listed)
    }
}

/// Catalog kept in insertion order, matching the SQL repository's `sort_order`.
#[derive(Default)]
pub struct InMemoryCatalogRepository {
    treatments: RwLock<Vec<Treatment>>,
    packages: RwLock<Vec<TreatmentPackage>>,
    offers: RwLock<Vec<SpecialOffer>>,
}

fn upsert<T>(items: &mut Vec<T>, item: T, same: impl Fn(&T, &T) -> bool) {
    match items.iter_mut().find(|existing| same(existing, &item)) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn list_treatments(&self) -> Result<Vec<Treatment>, RepositoryError> {
        Ok(self.treatments.read().await.clone())
    }

    async fn list_packages(&self) -> Result<Vec<TreatmentPackage>, RepositoryError> {
        Ok(self.packages.read().await.clone())
    }

    async fn list_offers(&self) -> Result<Vec<SpecialOffer>, RepositoryError> {
        Ok(self.offers.read().await.clone())
    }

    async fn save_treatment(&self, treatment: Treatment) -> Result<(), RepositoryError> {
        upsert(&mut *self.treatments.write().await, treatment, |a, b| a.id == b.id);
        Ok(())
    }

    async fn save_package(&self, package: TreatmentPackage) -> Result<(), RepositoryError> {
        upsert(&mut *self.packages.write().await, package, |a, b| a.id == b.id);
        Ok(())
    }

    async fn save_offer(&self, offer: SpecialOffer) -> Result<(), RepositoryError> {
        upsert(&mut *self.offers.write().await, offer, |a, b| a.id == b.id);
        Ok(())
    }
}
