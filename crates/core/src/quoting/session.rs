//! One patient's quote-building session.
//!
//! Holds the working [`QuoteState`] behind an async lock and routes every edit
//! through [`reduce`]. Promo validation and persistence are the only awaits;
//! the lock is never held across them.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
use crate::config::PricingConfig;
use crate::domain::discount::DiscountDescriptor;
use crate::domain::line_item::LineItemId;
use crate::domain::offer::SpecialOfferId;
use crate::domain::package::PackageId;
use crate::domain::quote::{QuoteId, QuoteRecord, QuoteSnapshot, QuoteState, QuoteStatus};
use crate::domain::treatment::TreatmentId;
use crate::errors::{ApplicationError, DomainError};
use crate::quoting::aggregator::{reduce, IgnoredReason, QuoteAction, QuoteNotice};
use crate::quoting::catalog::Catalog;
use crate::quoting::constraints::validate_for_submit;
use crate::quoting::pricing::{price_quote, price_quote_with_trace, snapshot_quote, PricingResult};
use crate::quoting::promo::{degraded_discount, normalize_code, PromoRequest, PromoResolver, ResolveError};
use crate::quoting::sequence::RequestSequencer;

/// What persistence receives. `id` is set when re-saving a known quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteDraft {
    pub id: Option<QuoteId>,
    pub status: QuoteStatus,
    pub snapshot: QuoteSnapshot,
}

#[async_trait]
pub trait QuoteStore: Send + Sync {
    async fn save(&self, draft: QuoteDraft) -> Result<QuoteId, ApplicationError>;
    async fn load(&self, id: &QuoteId) -> Result<QuoteRecord, ApplicationError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromoOutcome {
    Applied(DiscountDescriptor),
    /// Validator unreachable; discount guessed from the code itself.
    Degraded(DiscountDescriptor),
    /// A newer request or edit made this response irrelevant. Nothing changed.
    Superseded,
}

impl PromoOutcome {
    pub fn discount(&self) -> Option<&DiscountDescriptor> {
        match self {
            Self::Applied(discount) | Self::Degraded(discount) => Some(discount),
            Self::Superseded => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OfferApplication {
    pub notices: Vec<QuoteNotice>,
    pub embedded_promo: Option<Result<PromoOutcome, ApplicationError>>,
}

#[derive(Clone, Debug, Default)]
struct SessionState {
    quote: QuoteState,
    quote_id: Option<QuoteId>,
    status: Option<QuoteStatus>,
    /// Bumped on every change to `quote`; never goes backwards.
    revision: u64,
}

impl SessionState {
    fn status(&self) -> QuoteStatus {
        self.status.unwrap_or(QuoteStatus::Draft)
    }

    fn fresh(&self) -> Self {
        Self { revision: self.revision + 1, ..Self::default() }
    }
}

pub struct QuoteSession<R, S> {
    session_id: String,
    catalog: Arc<Catalog>,
    resolver: R,
    store: S,
    pricing: PricingConfig,
    state: RwLock<SessionState>,
    sequencer: RequestSequencer,
    audit: Arc<dyn AuditSink>,
}

impl<R, S> QuoteSession<R, S>
where
    R: PromoResolver,
    S: QuoteStore,
{
    pub fn new(catalog: Arc<Catalog>, resolver: R, store: S, pricing: PricingConfig) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            catalog,
            resolver,
            store,
            pricing,
            state: RwLock::new(SessionState::default()),
            sequencer: RequestSequencer::new(),
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub async fn state(&self) -> QuoteState {
        self.state.read().await.quote.clone()
    }

    pub async fn quote_id(&self) -> Option<QuoteId> {
        self.state.read().await.quote_id.clone()
    }

    pub async fn status(&self) -> QuoteStatus {
        self.state.read().await.status()
    }

    pub async fn add_treatment(
        &self,
        treatment_id: &TreatmentId,
        quantity: u32,
    ) -> Result<Vec<QuoteNotice>, ApplicationError> {
        let treatment = self.catalog.treatment(treatment_id)?.clone();
        Ok(self.dispatch(QuoteAction::AddTreatment { treatment, quantity }).await)
    }

    pub async fn remove_treatment(&self, line_item_id: &LineItemId) -> Vec<QuoteNotice> {
        self.dispatch(QuoteAction::RemoveTreatment { line_item_id: line_item_id.clone() }).await
    }

    pub async fn update_quantity(&self, line_item_id: &LineItemId, quantity: u32) -> Vec<QuoteNotice> {
        self.dispatch(QuoteAction::UpdateQuantity { line_item_id: line_item_id.clone(), quantity })
            .await
    }

    /// Resolves the whole package before touching the quote, so an unknown
    /// package leaves the previous selection in place.
    pub async fn select_package(
        &self,
        package_id: &PackageId,
    ) -> Result<Vec<QuoteNotice>, ApplicationError> {
        let bundle = self.catalog.resolve_package(package_id)?;
        self.sequencer.cancel_pending();
        Ok(self.dispatch(QuoteAction::SelectPackage(bundle)).await)
    }

    pub async fn apply_offer(
        &self,
        offer_id: &SpecialOfferId,
    ) -> Result<OfferApplication, ApplicationError> {
        let offer = self.catalog.resolve_offer(offer_id)?;
        let notices = self.dispatch(QuoteAction::ApplyOffer(offer)).await;

        let mut embedded_promo = None;
        for notice in &notices {
            match notice {
                QuoteNotice::EmbeddedPromoRequested { offer_id, code } => {
                    let offer_id = SpecialOfferId(offer_id.clone());
                    embedded_promo = Some(self.validate_and_apply(code, Some(offer_id)).await);
                }
                QuoteNotice::OfferPromoConflict { offer_id, offer_code, current_code } => {
                    info!(
                        event_name = "quote.offer_promo_conflict",
                        session_id = %self.session_id,
                        offer_id = %offer_id,
                        offer_code = %offer_code,
                        current_code = %current_code,
                        "offer code ignored, patient code kept"
                    );
                }
                _ => {}
            }
        }

        Ok(OfferApplication { notices, embedded_promo })
    }

    pub async fn remove_offer(&self) -> Vec<QuoteNotice> {
        self.sequencer.cancel_pending();
        self.dispatch(QuoteAction::RemoveOffer).await
    }

    pub async fn apply_promo_code(&self, code: &str) -> Result<PromoOutcome, ApplicationError> {
        self.validate_and_apply(code, None).await
    }

    pub async fn remove_promo_code(&self) -> Vec<QuoteNotice> {
        self.sequencer.cancel_pending();
        self.dispatch(QuoteAction::RemovePromo).await
    }

    pub async fn reset(&self) {
        self.sequencer.cancel_pending();
        let mut guard = self.state.write().await;
        let fresh = guard.fresh();
        *guard = fresh;
        self.emit(AuditCategory::Selection, "quote.reset", AuditOutcome::Success, None, &[]);
    }

    pub async fn totals(&self) -> PricingResult {
        let guard = self.state.read().await;
        price_quote_with_trace(&guard.quote, &self.pricing.reference_currency)
    }

    pub async fn snapshot(&self) -> QuoteSnapshot {
        let guard = self.state.read().await;
        snapshot_quote(&guard.quote, &self.pricing.reference_currency, &self.pricing.local_currency)
    }

    /// Persists the quote as `saved`. Saving again updates the same record.
    pub async fn save(&self) -> Result<QuoteId, ApplicationError> {
        let (quote_id, _) = self.persist(QuoteStatus::Saved).await?;
        let mut guard = self.state.write().await;
        guard.quote_id = Some(quote_id.clone());
        guard.status = Some(QuoteStatus::Saved);
        Ok(quote_id)
    }

    /// Persists the quote as `submitted` and starts a fresh one. Edits made
    /// while the store was writing are kept as a new unsaved draft.
    pub async fn submit(&self) -> Result<QuoteId, ApplicationError> {
        let (quote_id, submitted_revision) = self.persist(QuoteStatus::Submitted).await?;
        let mut guard = self.state.write().await;
        if guard.revision == submitted_revision {
            self.sequencer.cancel_pending();
            let fresh = guard.fresh();
            *guard = fresh;
        } else {
            warn!(
                event_name = "quote.edited_during_submit",
                session_id = %self.session_id,
                quote_id = %quote_id,
                "quote changed while submitting; edits kept as a new draft"
            );
            guard.quote_id = None;
            guard.status = None;
        }
        Ok(quote_id)
    }

    pub async fn load(&self, quote_id: &QuoteId) -> Result<(), ApplicationError> {
        let record = self.store.load(quote_id).await?;
        let quote = QuoteState::restore(&record.snapshot)?;

        self.sequencer.cancel_pending();
        let mut guard = self.state.write().await;
        let revision = guard.revision + 1;
        *guard = SessionState {
            quote,
            quote_id: Some(record.id.clone()),
            status: Some(record.status),
            revision,
        };
        self.emit(
            AuditCategory::Persistence,
            "quote.loaded",
            AuditOutcome::Success,
            Some(record.id),
            &[("status", record.status.as_str())],
        );
        Ok(())
    }

    async fn dispatch(&self, action: QuoteAction) -> Vec<QuoteNotice> {
        let kind = action_name(&action);
        let edits_lines = matches!(
            action,
            QuoteAction::AddTreatment { .. }
                | QuoteAction::RemoveTreatment { .. }
                | QuoteAction::UpdateQuantity { .. }
        );
        let mut guard = self.state.write().await;
        let reduction = reduce(&guard.quote, action);
        let ignored = reduction.was_ignored();
        guard.quote = reduction.state;
        if !ignored {
            guard.revision += 1;
            // A promo validated against the previous lines no longer applies.
            if edits_lines {
                self.sequencer.cancel_pending();
            }
        }

        let outcome = if ignored { AuditOutcome::Rejected } else { AuditOutcome::Success };
        debug!(
            event_name = "quote.action_reduced",
            session_id = %self.session_id,
            action = kind,
            ignored,
            line_items = guard.quote.line_items().len(),
            "quote action reduced"
        );
        self.emit(AuditCategory::Selection, kind, outcome, guard.quote_id.clone(), &[]);
        reduction.notices
    }

    async fn validate_and_apply(
        &self,
        code: &str,
        via_offer: Option<SpecialOfferId>,
    ) -> Result<PromoOutcome, ApplicationError> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(ApplicationError::validation("promo code must not be empty"));
        }

        let token = self.sequencer.next();
        let request = {
            let guard = self.state.read().await;
            PromoRequest::new(code.clone(), guard.quote.treatment_ids(), price_quote(&guard.quote))
        };

        let (discount, degraded) = match self.resolver.resolve(&request).await {
            Ok(discount) => (discount, false),
            Err(error) if !self.sequencer.is_current(token) => {
                debug!(
                    event_name = "quote.promo_superseded",
                    session_id = %self.session_id,
                    code = %code,
                    error = %error,
                    "stale promo failure dropped"
                );
                return Ok(PromoOutcome::Superseded);
            }
            Err(ResolveError::Network(message)) if self.pricing.degraded_promo_fallback => {
                match degraded_discount(&code) {
                    Some(discount) => {
                        warn!(
                            event_name = "quote.promo_degraded",
                            session_id = %self.session_id,
                            code = %code,
                            error = %message,
                            "promo validator unreachable, using offline estimate"
                        );
                        (discount, true)
                    }
                    None => return Err(self.reject(&code, ResolveError::Network(message))),
                }
            }
            Err(error) => return Err(self.reject(&code, error)),
        };

        let mut guard = self.state.write().await;
        if !self.sequencer.is_current(token) {
            return Ok(PromoOutcome::Superseded);
        }
        let reduction =
            reduce(&guard.quote, QuoteAction::ApplyPromo { discount: discount.clone(), via_offer });
        match reduction.notices.first() {
            Some(QuoteNotice::Ignored { reason: IgnoredReason::OfferNoLongerActive }) => {
                return Ok(PromoOutcome::Superseded);
            }
            Some(QuoteNotice::Ignored { reason }) => {
                return Err(ApplicationError::validation(format!(
                    "promo code `{code}` returned an unusable discount ({reason:?})"
                )));
            }
            _ => {}
        }
        guard.quote = reduction.state;
        guard.revision += 1;

        self.emit(
            AuditCategory::Discount,
            "discount.promo_applied",
            AuditOutcome::Success,
            guard.quote_id.clone(),
            &[
                ("code", code.as_str()),
                ("kind", discount.kind.as_str()),
                ("value", discount.value.to_string().as_str()),
                ("degraded", if degraded { "true" } else { "false" }),
            ],
        );

        Ok(if degraded { PromoOutcome::Degraded(discount) } else { PromoOutcome::Applied(discount) })
    }

    fn reject(&self, code: &str, error: ResolveError) -> ApplicationError {
        let outcome = if error.is_network() { AuditOutcome::Failed } else { AuditOutcome::Rejected };
        self.emit(
            AuditCategory::Discount,
            "discount.promo_rejected",
            outcome,
            None,
            &[("code", code), ("reason", error.to_string().as_str())],
        );
        error.into()
    }

    /// Returns the stored id and the revision that was written.
    async fn persist(&self, status: QuoteStatus) -> Result<(QuoteId, u64), ApplicationError> {
        let (draft, revision) = {
            let guard = self.state.read().await;
            let current = guard.status();
            if !current.can_transition_to(status) {
                return Err(DomainError::InvalidQuoteTransition { from: current, to: status }.into());
            }

            let report = validate_for_submit(&guard.quote);
            if !report.valid {
                return Err(ApplicationError::validation(report.summary()));
            }

            let draft = QuoteDraft {
                id: guard.quote_id.clone(),
                status,
                snapshot: snapshot_quote(
                    &guard.quote,
                    &self.pricing.reference_currency,
                    &self.pricing.local_currency,
                ),
            };
            (draft, guard.revision)
        };
        let total = draft.snapshot.total;

        match self.store.save(draft).await {
            Ok(quote_id) => {
                info!(
                    event_name = "quote.persisted",
                    session_id = %self.session_id,
                    quote_id = %quote_id,
                    status = status.as_str(),
                    total = %total,
                    "quote persisted"
                );
                self.emit(
                    AuditCategory::Persistence,
                    if status == QuoteStatus::Submitted { "quote.submitted" } else { "quote.saved" },
                    AuditOutcome::Success,
                    Some(quote_id.clone()),
                    &[("total", total.to_string().as_str())],
                );
                Ok((quote_id, revision))
            }
            Err(error) => {
                warn!(
                    event_name = "quote.persist_failed",
                    session_id = %self.session_id,
                    status = status.as_str(),
                    error = %error,
                    "quote could not be persisted"
                );
                self.emit(
                    AuditCategory::Persistence,
                    "quote.persist_failed",
                    AuditOutcome::Failed,
                    None,
                    &[("error", error.to_string().as_str())],
                );
                Err(error)
            }
        }
    }

    fn emit(
        &self,
        category: AuditCategory,
        event_type: &str,
        outcome: AuditOutcome,
        quote_id: Option<QuoteId>,
        metadata: &[(&str, &str)],
    ) {
        let mut event = AuditEvent::new(
            self.session_id.clone(),
            Uuid::new_v4().to_string(),
            event_type,
            category,
            outcome,
        );
        if let Some(quote_id) = quote_id {
            event = event.for_quote(quote_id);
        }
        for (key, value) in metadata {
            event = event.with_metadata(*key, *value);
        }
        self.audit.emit(event);
    }
}

fn action_name(action: &QuoteAction) -> &'static str {
    match action {
        QuoteAction::AddTreatment { .. } => "selection.treatment_added",
        QuoteAction::RemoveTreatment { .. } => "selection.treatment_removed",
        QuoteAction::UpdateQuantity { .. } => "selection.quantity_updated",
        QuoteAction::SelectPackage(_) => "selection.package_selected",
        QuoteAction::ApplyOffer(_) => "selection.offer_toggled",
        QuoteAction::RemoveOffer => "selection.offer_removed",
        QuoteAction::ApplyPromo { .. } => "discount.promo_applied",
        QuoteAction::RemovePromo => "discount.promo_removed",
        QuoteAction::Reset => "quote.reset",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tokio::sync::Notify;

    use super::{PromoOutcome, QuoteDraft, QuoteSession, QuoteStore};
    use crate::audit::InMemoryAuditSink;
    use crate::config::PricingConfig;
    use crate::domain::discount::{DiscountDescriptor, DiscountKind, DiscountSource};
    use crate::domain::line_item::LineItemId;
    use crate::domain::offer::{SpecialOffer, SpecialOfferId};
    use crate::domain::package::{PackageId, PackageTreatment, TreatmentPackage};
    use crate::domain::quote::{QuoteId, QuoteRecord, QuoteStatus};
    use crate::domain::treatment::{Treatment, TreatmentId};
    use crate::errors::ApplicationError;
    use crate::quoting::aggregator::QuoteNotice;
    use crate::quoting::catalog::Catalog;
    use crate::quoting::promo::{
        PromoCodeRule, PromoRequest, PromoResolver, ResolveError, StaticPromoResolver,
    };

    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<HashMap<String, QuoteRecord>>,
        saves: AtomicUsize,
    }

    #[async_trait]
    impl QuoteStore for Arc<MemoryStore> {
        async fn save(&self, draft: QuoteDraft) -> Result<QuoteId, ApplicationError> {
            let sequence = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
            let id = draft.id.unwrap_or_else(|| QuoteId(format!("Q-{sequence}")));
            let now = Utc::now();
            let record = QuoteRecord {
                id: id.clone(),
                status: draft.status,
                snapshot: draft.snapshot,
                created_at: now,
                updated_at: now,
            };
            self.records
                .lock()
                .map_err(|_| ApplicationError::Persistence("poisoned".into()))?
                .insert(id.0.clone(), record);
            Ok(id)
        }

        async fn load(&self, id: &QuoteId) -> Result<QuoteRecord, ApplicationError> {
            self.records
                .lock()
                .map_err(|_| ApplicationError::Persistence("poisoned".into()))?
                .get(&id.0)
                .cloned()
                .ok_or_else(|| ApplicationError::not_found("quote", id.0.clone()))
        }
    }

    struct OfflineStore;

    #[async_trait]
    impl QuoteStore for OfflineStore {
        async fn save(&self, _draft: QuoteDraft) -> Result<QuoteId, ApplicationError> {
            Err(ApplicationError::Persistence("database is locked".into()))
        }

        async fn load(&self, id: &QuoteId) -> Result<QuoteRecord, ApplicationError> {
            Err(ApplicationError::not_found("quote", id.0.clone()))
        }
    }

    struct OfflineResolver;

    #[async_trait]
    impl PromoResolver for OfflineResolver {
        async fn resolve(&self, _request: &PromoRequest) -> Result<DiscountDescriptor, ResolveError> {
            Err(ResolveError::Network("connection refused".into()))
        }
    }

    /// Holds `SLOW*` codes until released; everything else answers at once.
    struct GatedResolver {
        inner: StaticPromoResolver,
        gate: Notify,
        slow_calls: AtomicUsize,
    }

    #[async_trait]
    impl PromoResolver for Arc<GatedResolver> {
        async fn resolve(&self, request: &PromoRequest) -> Result<DiscountDescriptor, ResolveError> {
            if request.code.starts_with("SLOW") {
                self.slow_calls.fetch_add(1, Ordering::SeqCst);
                self.gate.notified().await;
            }
            self.inner.resolve(request).await
        }
    }

    /// Holds every save until released.
    struct GatedStore {
        inner: Arc<MemoryStore>,
        gate: Notify,
        pending: AtomicUsize,
    }

    #[async_trait]
    impl QuoteStore for Arc<GatedStore> {
        async fn save(&self, draft: QuoteDraft) -> Result<QuoteId, ApplicationError> {
            self.pending.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            self.inner.save(draft).await
        }

        async fn load(&self, id: &QuoteId) -> Result<QuoteRecord, ApplicationError> {
            self.inner.load(id).await
        }
    }

    fn treatment(id: &str, reference: i64) -> Treatment {
        Treatment {
            id: TreatmentId(id.to_string()),
            name: id.to_string(),
            price_local: Decimal::from(reference * 34),
            price_reference: Decimal::from(reference),
            description: String::new(),
            guarantee: None,
        }
    }

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog::new(
            vec![treatment("implant", 900), treatment("crown", 300), treatment("whitening", 250)],
            vec![TreatmentPackage {
                id: PackageId("pkg-001".to_string()),
                name: "Implant Starter".to_string(),
                treatments: vec![
                    PackageTreatment { treatment_id: TreatmentId("implant".into()), quantity: 1 },
                    PackageTreatment { treatment_id: TreatmentId("crown".into()), quantity: 1 },
                ],
                price: Decimal::from(1000),
                savings: Decimal::from(15),
            }],
            vec![SpecialOffer {
                id: SpecialOfferId("offer-smile".to_string()),
                title: "Smile week".to_string(),
                clinic_id: None,
                discount_kind: DiscountKind::FixedAmount,
                discount_value: Decimal::from(100),
                promo_code: Some("SMILE10".to_string()),
                bonus_treatments: Vec::new(),
            }],
        ))
    }

    fn rules() -> StaticPromoResolver {
        StaticPromoResolver::new([
            PromoCodeRule::percentage("SUMMER15", Decimal::from(15)),
            PromoCodeRule::percentage("SMILE10", Decimal::from(10)),
            PromoCodeRule::percentage("FAST20", Decimal::from(20)),
            PromoCodeRule::percentage("SLOW10", Decimal::from(10)),
            PromoCodeRule {
                applicable_treatments: vec![TreatmentId("implant".to_string())],
                ..PromoCodeRule::percentage("SLOW20", Decimal::from(20))
            },
        ])
    }

    fn pricing(fallback: bool) -> PricingConfig {
        PricingConfig {
            reference_currency: "GBP".to_string(),
            local_currency: "TRY".to_string(),
            degraded_promo_fallback: fallback,
        }
    }

    fn session() -> (QuoteSession<StaticPromoResolver, Arc<MemoryStore>>, Arc<MemoryStore>, InMemoryAuditSink)
    {
        let store = Arc::new(MemoryStore::default());
        let audit = InMemoryAuditSink::default();
        let session = QuoteSession::new(catalog(), rules(), Arc::clone(&store), pricing(false))
            .with_audit(Arc::new(audit.clone()));
        (session, store, audit)
    }

    fn implant() -> TreatmentId {
        TreatmentId("implant".to_string())
    }

    #[tokio::test]
    async fn promo_code_applies_and_is_audited() {
        let (session, _, audit) = session();
        session.add_treatment(&implant(), 2).await.expect("known treatment");

        let outcome = session.apply_promo_code(" summer15 ").await.expect("valid code");

        assert!(matches!(outcome, PromoOutcome::Applied(_)));
        let totals = session.totals().await;
        assert_eq!(totals.total, Decimal::from(1530));
        assert_eq!(totals.trace.currency, "GBP");
        assert_eq!(audit.events_of("discount.promo_applied").len(), 1);
    }

    #[tokio::test]
    async fn unknown_code_leaves_quote_untouched() {
        let (session, _, audit) = session();
        session.add_treatment(&implant(), 2).await.expect("known treatment");
        let before = session.state().await;

        let error = session.apply_promo_code("BOGUS").await.expect_err("unknown code");

        assert!(matches!(error, ApplicationError::NotFound { entity: "promo code", .. }));
        assert_eq!(session.state().await, before);
        assert_eq!(audit.events_of("discount.promo_rejected").len(), 1);
    }

    #[tokio::test]
    async fn unknown_treatment_is_not_found() {
        let (session, _, _) = session();
        let result = session.add_treatment(&TreatmentId("veneer".into()), 1).await;
        assert!(matches!(result, Err(ApplicationError::NotFound { entity: "treatment", .. })));
    }

    #[tokio::test]
    async fn unknown_package_keeps_previous_selection() {
        let (session, _, _) = session();
        session.select_package(&PackageId("pkg-001".into())).await.expect("package");
        let before = session.state().await;

        let result = session.select_package(&PackageId("pkg-404".into())).await;

        assert!(matches!(result, Err(ApplicationError::NotFound { entity: "package", .. })));
        assert_eq!(session.state().await, before);
        assert_eq!(session.totals().await.subtotal, Decimal::from(1000));
    }

    #[tokio::test]
    async fn offer_embedded_code_is_validated_and_removed_with_offer() {
        let (session, _, _) = session();
        session.add_treatment(&implant(), 1).await.expect("known treatment");

        let applied = session.apply_offer(&SpecialOfferId("offer-smile".into())).await.expect("offer");

        assert!(matches!(applied.embedded_promo, Some(Ok(PromoOutcome::Applied(_)))));
        let state = session.state().await;
        assert_eq!(state.promo_code(), Some("SMILE10"));
        assert_eq!(state.promo_via_offer(), Some(&SpecialOfferId("offer-smile".into())));
        assert_eq!(session.totals().await.total, Decimal::from(710));

        let toggled = session.apply_offer(&SpecialOfferId("offer-smile".into())).await.expect("offer");
        assert!(toggled.embedded_promo.is_none());
        assert!(session.state().await.discounts().is_empty());
    }

    #[tokio::test]
    async fn offer_embedded_code_does_not_replace_patient_code() {
        let (session, _, _) = session();
        session.add_treatment(&implant(), 1).await.expect("known treatment");
        session.apply_promo_code("SUMMER15").await.expect("valid code");

        let applied = session.apply_offer(&SpecialOfferId("offer-smile".into())).await.expect("offer");

        assert!(applied.embedded_promo.is_none());
        assert!(applied
            .notices
            .iter()
            .any(|notice| matches!(notice, QuoteNotice::OfferPromoConflict { .. })));
        assert_eq!(session.state().await.promo_code(), Some("SUMMER15"));
    }

    #[tokio::test]
    async fn superseded_promo_response_is_discarded() {
        let resolver = Arc::new(GatedResolver {
            inner: rules(),
            gate: Notify::new(),
            slow_calls: AtomicUsize::new(0),
        });
        let session = Arc::new(QuoteSession::new(
            catalog(),
            Arc::clone(&resolver),
            Arc::new(MemoryStore::default()),
            pricing(false),
        ));
        session.add_treatment(&implant(), 1).await.expect("known treatment");

        let slow = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.apply_promo_code("SLOW10").await }
        });
        while resolver.slow_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let fast = session.apply_promo_code("FAST20").await.expect("fast code");
        resolver.gate.notify_one();
        let slow = slow.await.expect("task joins").expect("slow code");

        assert!(matches!(fast, PromoOutcome::Applied(_)));
        assert_eq!(slow, PromoOutcome::Superseded);
        assert_eq!(session.state().await.promo_code(), Some("FAST20"));
    }

    #[tokio::test]
    async fn line_edit_during_validation_discards_the_response() {
        let resolver = Arc::new(GatedResolver {
            inner: rules(),
            gate: Notify::new(),
            slow_calls: AtomicUsize::new(0),
        });
        let session = Arc::new(QuoteSession::new(
            catalog(),
            Arc::clone(&resolver),
            Arc::new(MemoryStore::default()),
            pricing(false),
        ));
        session.add_treatment(&implant(), 1).await.expect("known treatment");
        session.add_treatment(&TreatmentId("crown".into()), 1).await.expect("known treatment");
        let implant_line = session
            .state()
            .await
            .line_items()
            .iter()
            .find(|line| line.treatment_id == implant())
            .map(|line| line.id.clone())
            .expect("implant line");

        let pending = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.apply_promo_code("SLOW20").await }
        });
        while resolver.slow_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        session.remove_treatment(&implant_line).await;
        resolver.gate.notify_one();
        let outcome = pending.await.expect("task joins").expect("no error");

        assert_eq!(outcome, PromoOutcome::Superseded);
        let state = session.state().await;
        assert_eq!(state.promo_code(), None);
        assert_eq!(state.treatment_ids(), vec![TreatmentId("crown".into())]);
        assert_eq!(session.totals().await.total, Decimal::from(300));
    }

    #[tokio::test]
    async fn ignored_line_edit_keeps_pending_validation() {
        let resolver = Arc::new(GatedResolver {
            inner: rules(),
            gate: Notify::new(),
            slow_calls: AtomicUsize::new(0),
        });
        let session = Arc::new(QuoteSession::new(
            catalog(),
            Arc::clone(&resolver),
            Arc::new(MemoryStore::default()),
            pricing(false),
        ));
        session.add_treatment(&implant(), 1).await.expect("known treatment");

        let pending = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.apply_promo_code("SLOW10").await }
        });
        while resolver.slow_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        session.remove_treatment(&LineItemId("li-missing".into())).await;
        resolver.gate.notify_one();
        let outcome = pending.await.expect("task joins").expect("valid code");

        assert!(matches!(outcome, PromoOutcome::Applied(_)));
        assert_eq!(session.state().await.promo_code(), Some("SLOW10"));
    }

    #[tokio::test]
    async fn network_failure_without_fallback_is_retryable_error() {
        let session = QuoteSession::new(
            catalog(),
            OfflineResolver,
            Arc::new(MemoryStore::default()),
            pricing(false),
        );
        session.add_treatment(&implant(), 1).await.expect("known treatment");

        let error = session.apply_promo_code("SUMMER15").await.expect_err("offline");

        assert!(error.is_retryable());
        assert!(session.state().await.discounts().is_empty());
    }

    #[tokio::test]
    async fn network_failure_with_fallback_is_tagged_degraded() {
        let session = QuoteSession::new(
            catalog(),
            OfflineResolver,
            Arc::new(MemoryStore::default()),
            pricing(true),
        );
        session.add_treatment(&implant(), 2).await.expect("known treatment");

        let outcome = session.apply_promo_code("SUMMER15").await.expect("degraded");

        assert_eq!(outcome.discount().map(|discount| discount.value), Some(Decimal::from(15)));
        assert!(matches!(outcome, PromoOutcome::Degraded(_)));
        assert_eq!(session.totals().await.total, Decimal::from(1530));

        let unguessable = session.apply_promo_code("FREESMILE").await;
        assert!(matches!(unguessable, Err(ApplicationError::Network(_))));
    }

    #[tokio::test]
    async fn edits_during_submit_survive_as_new_draft() {
        let memory = Arc::new(MemoryStore::default());
        let store = Arc::new(GatedStore {
            inner: Arc::clone(&memory),
            gate: Notify::new(),
            pending: AtomicUsize::new(0),
        });
        let session = Arc::new(QuoteSession::new(
            catalog(),
            rules(),
            Arc::clone(&store),
            pricing(false),
        ));
        session.add_treatment(&implant(), 1).await.expect("known treatment");

        let submitting = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.submit().await }
        });
        while store.pending.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        session.add_treatment(&TreatmentId("crown".into()), 1).await.expect("known treatment");
        store.gate.notify_one();
        let submitted = submitting.await.expect("task joins").expect("submitted");

        let record = memory.load(&submitted).await.expect("stored");
        assert_eq!(record.status, QuoteStatus::Submitted);
        assert_eq!(record.snapshot.total, Decimal::from(900));

        assert_eq!(session.state().await.line_items().len(), 2);
        assert_eq!(session.quote_id().await, None);
        assert_eq!(session.status().await, QuoteStatus::Draft);
        assert_eq!(session.totals().await.total, Decimal::from(1200));
    }

    #[tokio::test]
    async fn save_is_idempotent_and_submit_starts_fresh_quote() {
        let (session, store, audit) = session();
        session.add_treatment(&implant(), 2).await.expect("known treatment");

        let first = session.save().await.expect("saved");
        let second = session.save().await.expect("re-saved");
        assert_eq!(first, second);
        assert_eq!(session.status().await, QuoteStatus::Saved);

        let submitted = session.submit().await.expect("submitted");
        assert_eq!(submitted, first);
        assert!(session.state().await.is_empty());
        assert_eq!(session.quote_id().await, None);

        let record = store.load(&first).await.expect("stored");
        assert_eq!(record.status, QuoteStatus::Submitted);
        assert_eq!(record.snapshot.total, Decimal::from(1800));
        assert_eq!(audit.events_of("quote.submitted").len(), 1);
    }

    #[tokio::test]
    async fn empty_quote_cannot_be_submitted() {
        let (session, _, _) = session();
        let error = session.submit().await.expect_err("empty quote");
        assert!(matches!(error, ApplicationError::Domain(_)));
    }

    #[tokio::test]
    async fn persistence_failure_keeps_quote() {
        let session =
            QuoteSession::new(catalog(), rules(), OfflineStore, pricing(false));
        session.add_treatment(&implant(), 1).await.expect("known treatment");
        let before = session.state().await;

        let error = session.submit().await.expect_err("store offline");

        assert!(error.is_retryable());
        assert_eq!(session.state().await, before);
    }

    #[tokio::test]
    async fn load_restores_saved_quote_for_editing() {
        let (session, _, _) = session();
        session.add_treatment(&implant(), 2).await.expect("known treatment");
        session.apply_promo_code("SUMMER15").await.expect("valid code");
        let quote_id = session.save().await.expect("saved");
        session.reset().await;

        session.load(&quote_id).await.expect("loaded");
        session.update_quantity(&LineItemId("li-1".into()), 3).await;

        assert_eq!(session.quote_id().await, Some(quote_id));
        assert_eq!(session.state().await.promo_code(), Some("SUMMER15"));
        assert_eq!(session.totals().await.subtotal, Decimal::from(2700));
    }

    #[tokio::test]
    async fn selecting_package_leaves_only_package_discount() {
        let (session, _, _) = session();
        session.add_treatment(&implant(), 1).await.expect("known treatment");
        session.select_package(&PackageId("pkg-001".into())).await.expect("package");

        let discount = DiscountDescriptor::percentage(DiscountSource::Package, "pkg-001", Decimal::from(15))
            .expect("valid");
        assert_eq!(session.state().await.discounts().to_vec(), vec![discount]);
    }
}
