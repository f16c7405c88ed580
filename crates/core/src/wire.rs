//! JSON bodies exchanged with the quote backend. Field names are camelCase.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::discount::{DiscountDescriptor, DiscountKind};
use crate::domain::line_item::LineItemSnapshot;
use crate::domain::offer::{BonusTreatment, SpecialOffer, SpecialOfferId};
use crate::domain::package::{PackageId, PackageTreatment, TreatmentPackage};
use crate::domain::quote::{QuoteId, QuoteRecord, QuoteSnapshot, QuoteStatus};
use crate::domain::treatment::{Treatment, TreatmentId};
use crate::quoting::session::QuoteDraft;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentDto {
    pub id: String,
    pub name: String,
    pub price_local: Decimal,
    pub price_reference: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guarantee: Option<String>,
}

impl From<TreatmentDto> for Treatment {
    fn from(dto: TreatmentDto) -> Self {
        Self {
            id: TreatmentId(dto.id),
            name: dto.name,
            price_local: dto.price_local,
            price_reference: dto.price_reference,
            description: dto.description,
            guarantee: dto.guarantee,
        }
    }
}

impl From<&Treatment> for TreatmentDto {
    fn from(treatment: &Treatment) -> Self {
        Self {
            id: treatment.id.0.clone(),
            name: treatment.name.clone(),
            price_local: treatment.price_local,
            price_reference: treatment.price_reference,
            description: treatment.description.clone(),
            guarantee: treatment.guarantee.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentQuantityDto {
    pub treatment_id: String,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDto {
    pub id: String,
    pub name: String,
    pub treatments: Vec<TreatmentQuantityDto>,
    pub price: Decimal,
    pub savings: Decimal,
}

impl From<PackageDto> for TreatmentPackage {
    fn from(dto: PackageDto) -> Self {
        Self {
            id: PackageId(dto.id),
            name: dto.name,
            treatments: dto
                .treatments
                .into_iter()
                .map(|entry| PackageTreatment {
                    treatment_id: TreatmentId(entry.treatment_id),
                    quantity: entry.quantity,
                })
                .collect(),
            price: dto.price,
            savings: dto.savings,
        }
    }
}

impl From<&TreatmentPackage> for PackageDto {
    fn from(package: &TreatmentPackage) -> Self {
        Self {
            id: package.id.0.clone(),
            name: package.name.clone(),
            treatments: package
                .treatments
                .iter()
                .map(|entry| TreatmentQuantityDto {
                    treatment_id: entry.treatment_id.0.clone(),
                    quantity: entry.quantity,
                })
                .collect(),
            price: package.price,
            savings: package.savings,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialOfferDto {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinic_id: Option<String>,
    pub discount_type: DiscountKind,
    pub discount_value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
    #[serde(default)]
    pub bonus_treatments: Vec<TreatmentQuantityDto>,
}

impl From<SpecialOfferDto> for SpecialOffer {
    fn from(dto: SpecialOfferDto) -> Self {
        Self {
            id: SpecialOfferId(dto.id),
            title: dto.title,
            clinic_id: dto.clinic_id,
            discount_kind: dto.discount_type,
            discount_value: dto.discount_value,
            promo_code: dto.promo_code,
            bonus_treatments: dto
                .bonus_treatments
                .into_iter()
                .map(|entry| BonusTreatment {
                    treatment_id: TreatmentId(entry.treatment_id),
                    quantity: entry.quantity,
                })
                .collect(),
        }
    }
}

impl From<&SpecialOffer> for SpecialOfferDto {
    fn from(offer: &SpecialOffer) -> Self {
        Self {
            id: offer.id.0.clone(),
            title: offer.title.clone(),
            clinic_id: offer.clinic_id.clone(),
            discount_type: offer.discount_kind,
            discount_value: offer.discount_value,
            promo_code: offer.promo_code.clone(),
            bonus_treatments: offer
                .bonus_treatments
                .iter()
                .map(|entry| TreatmentQuantityDto {
                    treatment_id: entry.treatment_id.0.clone(),
                    quantity: entry.quantity,
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPromoRequest {
    pub code: String,
    #[serde(default)]
    pub treatments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyPromoResponse {
    pub discount: DiscountDescriptor,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveQuoteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<QuoteStatus>,
    pub line_items: Vec<LineItemSnapshot>,
    #[serde(default)]
    pub discounts: Vec<DiscountDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_via_offer: Option<String>,
    pub total: Decimal,
    pub reference_currency: String,
    pub local_currency: String,
}

impl SaveQuoteRequest {
    /// Subtotal and discount are left at zero; the receiver recomputes them.
    pub fn into_draft(self) -> QuoteDraft {
        QuoteDraft {
            id: self.id.map(QuoteId),
            status: self.status.unwrap_or(QuoteStatus::Saved),
            snapshot: QuoteSnapshot {
                line_items: self.line_items,
                discounts: self.discounts,
                promo_via_offer: self.promo_via_offer,
                subtotal: Decimal::ZERO,
                total_discount: Decimal::ZERO,
                total: self.total,
                reference_currency: self.reference_currency,
                local_currency: self.local_currency,
            },
        }
    }
}

impl From<QuoteDraft> for SaveQuoteRequest {
    fn from(draft: QuoteDraft) -> Self {
        Self {
            id: draft.id.map(|id| id.0),
            status: Some(draft.status),
            line_items: draft.snapshot.line_items,
            discounts: draft.snapshot.discounts,
            promo_via_offer: draft.snapshot.promo_via_offer,
            total: draft.snapshot.total,
            reference_currency: draft.snapshot.reference_currency,
            local_currency: draft.snapshot.local_currency,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveQuoteResponse {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub id: String,
    pub status: QuoteStatus,
    pub line_items: Vec<LineItemSnapshot>,
    pub discounts: Vec<DiscountDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_via_offer: Option<String>,
    pub subtotal: Decimal,
    pub total_discount: Decimal,
    pub total: Decimal,
    pub reference_currency: String,
    pub local_currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<QuoteRecord> for QuoteResponse {
    fn from(record: QuoteRecord) -> Self {
        let snapshot = record.snapshot;
        Self {
            id: record.id.0,
            status: record.status,
            line_items: snapshot.line_items,
            discounts: snapshot.discounts,
            promo_via_offer: snapshot.promo_via_offer,
            subtotal: snapshot.subtotal,
            total_discount: snapshot.total_discount,
            total: snapshot.total,
            reference_currency: snapshot.reference_currency,
            local_currency: snapshot.local_currency,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl From<QuoteResponse> for QuoteRecord {
    fn from(response: QuoteResponse) -> Self {
        Self {
            id: QuoteId(response.id),
            status: response.status,
            snapshot: QuoteSnapshot {
                line_items: response.line_items,
                discounts: response.discounts,
                promo_via_offer: response.promo_via_offer,
                subtotal: response.subtotal,
                total_discount: response.total_discount,
                total: response.total,
                reference_currency: response.reference_currency,
                local_currency: response.local_currency,
            },
            created_at: response.created_at,
            updated_at: response.updated_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ApiError {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into(), code: None, correlation_id: None }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{ApplyPromoRequest, PackageDto, SaveQuoteRequest, SpecialOfferDto, TreatmentDto};
    use crate::domain::discount::DiscountKind;
    use crate::domain::offer::SpecialOffer;
    use crate::domain::package::TreatmentPackage;
    use crate::domain::quote::QuoteStatus;
    use crate::domain::treatment::Treatment;

    #[test]
    fn treatment_payload_uses_camel_case_and_optional_guarantee() {
        let dto: TreatmentDto = serde_json::from_value(json!({
            "id": "implant",
            "name": "Dental Implant",
            "priceLocal": "30600",
            "priceReference": 900,
            "description": "Titanium implant"
        }))
        .expect("treatment payload");

        let treatment = Treatment::from(dto);
        assert_eq!(treatment.price_reference, Decimal::from(900));
        assert_eq!(treatment.guarantee, None);

        let echoed = serde_json::to_value(TreatmentDto::from(&treatment)).expect("serialize");
        assert!(echoed.get("priceLocal").is_some());
        assert!(echoed.get("guarantee").is_none());
    }

    #[test]
    fn package_and_offer_payloads_map_to_domain() {
        let package: TreatmentPackage = serde_json::from_value::<PackageDto>(json!({
            "id": "pkg-001",
            "name": "Implant Starter",
            "treatments": [{"treatmentId": "implant", "quantity": 1}],
            "price": 1200,
            "savings": 15
        }))
        .expect("package payload")
        .into();
        assert_eq!(package.treatments[0].treatment_id.0, "implant");

        let offer: SpecialOffer = serde_json::from_value::<SpecialOfferDto>(json!({
            "id": "offer-1",
            "title": "Spring smile",
            "discountType": "fixed_amount",
            "discountValue": 100,
            "promoCode": "SPRING10"
        }))
        .expect("offer payload")
        .into();
        assert_eq!(offer.discount_kind, DiscountKind::FixedAmount);
        assert!(offer.bonus_treatments.is_empty());
        assert_eq!(offer.embedded_promo_code(), Some("SPRING10"));
    }

    #[test]
    fn promo_request_defaults_missing_fields() {
        let request: ApplyPromoRequest =
            serde_json::from_value(json!({"code": "SUMMER15"})).expect("promo request");
        assert!(request.treatments.is_empty());
        assert_eq!(request.subtotal, None);
    }

    #[test]
    fn save_request_defaults_to_saved_status() {
        let request: SaveQuoteRequest = serde_json::from_value(json!({
            "lineItems": [],
            "total": "0",
            "referenceCurrency": "GBP",
            "localCurrency": "TRY"
        }))
        .expect("save request");

        let draft = request.into_draft();
        assert_eq!(draft.status, QuoteStatus::Saved);
        assert_eq!(draft.id, None);
        assert!(draft.snapshot.discounts.is_empty());
    }
}
