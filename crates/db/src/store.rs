//! Adapters that let a [`QuoteSession`](dentalfly_core::QuoteSession) and the
//! HTTP server talk to the repositories.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use dentalfly_core::domain::discount::DiscountDescriptor;
use dentalfly_core::domain::quote::{QuoteId, QuoteRecord, QuoteStatus};
use dentalfly_core::errors::{ApplicationError, DomainError};
use dentalfly_core::quoting::promo::{normalize_code, PromoRequest, PromoResolver, ResolveError};
use dentalfly_core::quoting::session::{QuoteDraft, QuoteStore};

use crate::repositories::{PromoCodeRepository, QuoteRepository};

pub fn new_quote_id() -> QuoteId {
    QuoteId(format!("Q-{}", Uuid::new_v4().simple()))
}

pub struct RepositoryQuoteStore<R> {
    repository: R,
}

impl<R> RepositoryQuoteStore<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }
}

#[async_trait]
impl<R: QuoteRepository> QuoteStore for RepositoryQuoteStore<R> {
    /// Creates a record for a draft without an id; otherwise updates the
    /// existing record after checking the status transition.
    async fn save(&self, draft: QuoteDraft) -> Result<QuoteId, ApplicationError> {
        let now = Utc::now();
        let record = match draft.id {
            Some(id) => {
                let mut record = self
                    .repository
                    .find_by_id(&id)
                    .await?
                    .ok_or_else(|| ApplicationError::not_found("quote", id.0.clone()))?;
                record.transition_to(draft.status)?;
                record.snapshot = draft.snapshot;
                record.updated_at = now;
                record
            }
            None => {
                if draft.status == QuoteStatus::Cancelled {
                    return Err(DomainError::InvalidQuoteTransition {
                        from: QuoteStatus::Draft,
                        to: draft.status,
                    }
                    .into());
                }
                QuoteRecord {
                    id: new_quote_id(),
                    status: draft.status,
                    snapshot: draft.snapshot,
                    created_at: now,
                    updated_at: now,
                }
            }
        };

        let id = record.id.clone();
        let status = record.status;
        self.repository.save(record).await?;
        debug!(
            event_name = "db.quote.saved",
            quote_id = %id,
            status = status.as_str(),
            "quote persisted"
        );
        Ok(id)
    }

    async fn load(&self, id: &QuoteId) -> Result<QuoteRecord, ApplicationError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("quote", id.0.clone()))
    }
}

/// Validates codes against the `promo_code` table. A storage failure is
/// reported as the validator being unavailable.
pub struct RepositoryPromoResolver<R> {
    repository: R,
}

impl<R> RepositoryPromoResolver<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<R: PromoCodeRepository> PromoResolver for RepositoryPromoResolver<R> {
    async fn resolve(&self, request: &PromoRequest) -> Result<DiscountDescriptor, ResolveError> {
        let code = normalize_code(&request.code);
        if code.is_empty() {
            return Err(ResolveError::NotFound { code });
        }

        let rule = self.repository.find_by_code(&code).await.map_err(|error| {
            warn!(event_name = "db.promo.lookup_failed", code = %code, error = %error);
            ResolveError::Network(error.to_string())
        })?;

        match rule {
            Some(rule) => rule.evaluate(request, Utc::now()),
            None => Err(ResolveError::NotFound { code }),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use dentalfly_core::domain::discount::DiscountDescriptor;
    use dentalfly_core::domain::quote::{QuoteId, QuoteSnapshot, QuoteStatus};
    use dentalfly_core::domain::treatment::TreatmentId;
    use dentalfly_core::errors::{ApplicationError, DomainError};
    use dentalfly_core::quoting::promo::{PromoCodeRule, PromoRequest, PromoResolver, ResolveError};
    use dentalfly_core::quoting::session::{QuoteDraft, QuoteStore};

    use super::{RepositoryPromoResolver, RepositoryQuoteStore};
    use crate::repositories::{
        InMemoryPromoCodeRepository, InMemoryQuoteRepository, PromoCodeRepository,
        RepositoryError,
    };

    fn snapshot(total: i64) -> QuoteSnapshot {
        QuoteSnapshot {
            line_items: Vec::new(),
            discounts: Vec::new(),
            promo_via_offer: None,
            subtotal: Decimal::from(total),
            total_discount: Decimal::ZERO,
            total: Decimal::from(total),
            reference_currency: "GBP".into(),
            local_currency: "TRY".into(),
        }
    }

    #[tokio::test]
    async fn first_save_generates_id_and_resave_updates_same_record() {
        let store = RepositoryQuoteStore::new(InMemoryQuoteRepository::default());

        let id = store
            .save(QuoteDraft { id: None, status: QuoteStatus::Saved, snapshot: snapshot(900) })
            .await
            .expect("first save");
        assert!(id.0.starts_with("Q-"));

        let again = store
            .save(QuoteDraft {
                id: Some(id.clone()),
                status: QuoteStatus::Submitted,
                snapshot: snapshot(1200),
            })
            .await
            .expect("re-save");
        assert_eq!(again, id);

        let record = store.load(&id).await.expect("load");
        assert_eq!(record.status, QuoteStatus::Submitted);
        assert_eq!(record.snapshot.total, Decimal::from(1200));
        assert!(record.updated_at >= record.created_at);
    }

    #[tokio::test]
    async fn submitted_quote_cannot_be_saved_again() {
        let store = RepositoryQuoteStore::new(InMemoryQuoteRepository::default());
        let id = store
            .save(QuoteDraft { id: None, status: QuoteStatus::Submitted, snapshot: snapshot(300) })
            .await
            .expect("submit");

        let error = store
            .save(QuoteDraft { id: Some(id), status: QuoteStatus::Saved, snapshot: snapshot(300) })
            .await
            .expect_err("transition rejected");
        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::InvalidQuoteTransition { .. })
        ));
    }

    #[tokio::test]
    async fn saving_unknown_id_or_loading_missing_quote_is_not_found() {
        let store = RepositoryQuoteStore::new(InMemoryQuoteRepository::default());
        let unknown = QuoteId("Q-unknown".into());

        let save = store
            .save(QuoteDraft {
                id: Some(unknown.clone()),
                status: QuoteStatus::Saved,
                snapshot: snapshot(50),
            })
            .await;
        assert!(matches!(save, Err(ApplicationError::NotFound { entity: "quote", .. })));

        let load = store.load(&unknown).await;
        assert!(matches!(load, Err(ApplicationError::NotFound { .. })));
    }

    #[tokio::test]
    async fn new_quote_cannot_start_cancelled() {
        let store = RepositoryQuoteStore::new(InMemoryQuoteRepository::default());
        let result = store
            .save(QuoteDraft { id: None, status: QuoteStatus::Cancelled, snapshot: snapshot(50) })
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::InvalidQuoteTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn resolver_evaluates_rules_from_repository() {
        let mut implant_only = PromoCodeRule::percentage("IMPLANT20", Decimal::from(20));
        implant_only.applicable_treatments = vec![TreatmentId("implant".into())];
        let mut expired = PromoCodeRule::percentage("EASTER12", Decimal::from(12));
        expired.expires_at = Some(Utc::now() - Duration::days(2));

        let resolver = RepositoryPromoResolver::new(InMemoryPromoCodeRepository::with_rules([
            PromoCodeRule::percentage("SUMMER15", Decimal::from(15)),
            implant_only,
            expired,
        ]));

        let request = |code: &str, treatment: &str| {
            PromoRequest::new(code, vec![TreatmentId(treatment.into())], Decimal::from(900))
        };

        let summer: DiscountDescriptor =
            resolver.resolve(&request("summer15", "crown")).await.expect("valid code");
        assert_eq!(summer.value, Decimal::from(15));

        assert!(matches!(
            resolver.resolve(&request("IMPLANT20", "crown")).await,
            Err(ResolveError::NotApplicable { .. })
        ));
        assert!(matches!(
            resolver.resolve(&request("EASTER12", "implant")).await,
            Err(ResolveError::NotApplicable { .. })
        ));
        assert!(matches!(
            resolver.resolve(&request("MISSING", "implant")).await,
            Err(ResolveError::NotFound { .. })
        ));
        assert!(matches!(
            resolver.resolve(&request("  ", "implant")).await,
            Err(ResolveError::NotFound { .. })
        ));
    }

    struct BrokenRepository;

    #[async_trait]
    impl PromoCodeRepository for BrokenRepository {
        async fn find_by_code(&self, _code: &str) -> Result<Option<PromoCodeRule>, RepositoryError> {
            Err(RepositoryError::Decode("disk I/O error".into()))
        }

        async fn save(&self, _rule: PromoCodeRule) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn list(&self) -> Result<Vec<PromoCodeRule>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn storage_failure_surfaces_as_network_error() {
        let resolver = RepositoryPromoResolver::new(BrokenRepository);
        let result = resolver
            .resolve(&PromoRequest::new("SUMMER15", Vec::new(), Decimal::from(100)))
            .await;
        assert!(result.expect_err("lookup fails").is_network());
    }
}
