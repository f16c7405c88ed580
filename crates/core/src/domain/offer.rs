use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::discount::{DiscountDescriptor, DiscountKind, DiscountSource};
use crate::domain::treatment::TreatmentId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecialOfferId(pub String);

impl fmt::Display for SpecialOfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Complimentary treatment that comes with an offer. Bonus lines are locked and
/// priced at zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusTreatment {
    pub treatment_id: TreatmentId,
    pub quantity: u32,
}

/// Clinic-submitted, admin-approved promotion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialOffer {
    pub id: SpecialOfferId,
    pub title: String,
    pub clinic_id: Option<String>,
    pub discount_kind: DiscountKind,
    pub discount_value: Decimal,
    pub promo_code: Option<String>,
    pub bonus_treatments: Vec<BonusTreatment>,
}

impl SpecialOffer {
    pub fn discount(&self) -> Result<DiscountDescriptor, DomainError> {
        DiscountDescriptor::new(
            self.discount_kind,
            self.discount_value,
            DiscountSource::SpecialOffer,
            self.id.0.clone(),
        )
    }

    pub fn embedded_promo_code(&self) -> Option<&str> {
        self.promo_code.as_deref().map(str::trim).filter(|code| !code.is_empty())
    }
}
