use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::discount::{AppliedDiscounts, DiscountDescriptor, DiscountSource};
use crate::domain::line_item::{LineItemId, LineItemSnapshot, TreatmentLineItem};
use crate::domain::offer::SpecialOfferId;
use crate::domain::package::PackageId;
use crate::domain::treatment::TreatmentId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

impl fmt::Display for QuoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Saved,
    Submitted,
    Cancelled,
}

impl QuoteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Saved => "saved",
            Self::Submitted => "submitted",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(self, next: QuoteStatus) -> bool {
        matches!(
            (self, next),
            (QuoteStatus::Draft, QuoteStatus::Saved)
                | (QuoteStatus::Draft, QuoteStatus::Submitted)
                | (QuoteStatus::Saved, QuoteStatus::Saved)
                | (QuoteStatus::Saved, QuoteStatus::Submitted)
                | (QuoteStatus::Draft, QuoteStatus::Cancelled)
                | (QuoteStatus::Saved, QuoteStatus::Cancelled)
        )
    }
}

impl std::str::FromStr for QuoteStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "saved" => Ok(Self::Saved),
            "submitted" => Ok(Self::Submitted),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::Validation(format!("unknown quote status `{other}`"))),
        }
    }
}

/// The working quote a patient edits. Mutated only through
/// [`crate::quoting::aggregator::reduce`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuoteState {
    pub(crate) line_items: Vec<TreatmentLineItem>,
    pub(crate) discounts: AppliedDiscounts,
    pub(crate) promo_via_offer: Option<SpecialOfferId>,
    pub(crate) next_line_seq: u64,
}

impl QuoteState {
    pub fn line_items(&self) -> &[TreatmentLineItem] {
        &self.line_items
    }

    pub fn discounts(&self) -> &AppliedDiscounts {
        &self.discounts
    }

    pub fn is_empty(&self) -> bool {
        self.line_items.is_empty() && self.discounts.is_empty()
    }

    pub fn find_line(&self, id: &LineItemId) -> Option<&TreatmentLineItem> {
        self.line_items.iter().find(|line| &line.id == id)
    }

    pub fn treatment_ids(&self) -> Vec<TreatmentId> {
        let mut ids: Vec<TreatmentId> =
            self.line_items.iter().map(|line| line.treatment_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn active_package(&self) -> Option<PackageId> {
        self.discounts
            .get(DiscountSource::Package)
            .map(|discount| PackageId(discount.source_id.clone()))
    }

    pub fn active_offer(&self) -> Option<SpecialOfferId> {
        self.discounts
            .get(DiscountSource::SpecialOffer)
            .map(|discount| SpecialOfferId(discount.source_id.clone()))
    }

    pub fn promo_code(&self) -> Option<&str> {
        self.discounts.get(DiscountSource::PromoCode).map(|discount| discount.source_id.as_str())
    }

    /// Offer whose embedded code currently fills the promo slot, if any.
    pub fn promo_via_offer(&self) -> Option<&SpecialOfferId> {
        self.promo_via_offer.as_ref()
    }

    pub(crate) fn next_line_id(&mut self) -> LineItemId {
        self.next_line_seq += 1;
        LineItemId(format!("li-{}", self.next_line_seq))
    }

    /// Rebuilds a working quote from a persisted snapshot, re-validating every
    /// line and the one-discount-per-source rule.
    pub fn restore(snapshot: &QuoteSnapshot) -> Result<Self, DomainError> {
        let mut line_items = Vec::with_capacity(snapshot.line_items.len());
        for line in &snapshot.line_items {
            let item = TreatmentLineItem::try_from(line.clone())?;
            if line_items.iter().any(|existing: &TreatmentLineItem| existing.id == item.id) {
                return Err(DomainError::InvariantViolation(format!(
                    "duplicate line item id `{}` in snapshot",
                    item.id
                )));
            }
            line_items.push(item);
        }

        let next_line_seq = line_items
            .iter()
            .filter_map(|line| line.id.0.strip_prefix("li-")?.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            .max(line_items.len() as u64);

        Ok(Self {
            line_items,
            discounts: AppliedDiscounts::try_from(snapshot.discounts.clone())?,
            promo_via_offer: snapshot.promo_via_offer.clone().map(SpecialOfferId),
            next_line_seq,
        })
    }
}

/// Serialized form of a quote: what gets saved, submitted and sent over the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSnapshot {
    pub line_items: Vec<LineItemSnapshot>,
    pub discounts: Vec<DiscountDescriptor>,
    #[serde(default)]
    pub promo_via_offer: Option<String>,
    pub subtotal: Decimal,
    pub total_discount: Decimal,
    pub total: Decimal,
    pub reference_currency: String,
    pub local_currency: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRecord {
    pub id: QuoteId,
    pub status: QuoteStatus,
    pub snapshot: QuoteSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QuoteRecord {
    pub fn transition_to(&mut self, next: QuoteStatus) -> Result<(), DomainError> {
        if self.status.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidQuoteTransition { from: self.status, to: next })
    }
}
