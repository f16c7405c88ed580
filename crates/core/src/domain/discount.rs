use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Percentage,
    FixedAmount,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountSource {
    Package,
    SpecialOffer,
    PromoCode,
}

impl DiscountKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::FixedAmount => "fixed_amount",
        }
    }
}

impl DiscountSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::SpecialOffer => "special_offer",
            Self::PromoCode => "promo_code",
        }
    }
}

impl fmt::Display for DiscountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscountKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "percentage" | "percent" => Ok(Self::Percentage),
            "fixed_amount" | "fixed" => Ok(Self::FixedAmount),
            other => Err(DomainError::Validation(format!(
                "unsupported discount kind `{other}` (expected percentage|fixed_amount)"
            ))),
        }
    }
}

impl FromStr for DiscountSource {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "package" => Ok(Self::Package),
            "special_offer" => Ok(Self::SpecialOffer),
            "promo_code" => Ok(Self::PromoCode),
            other => Err(DomainError::Validation(format!(
                "unsupported discount source `{other}` (expected package|special_offer|promo_code)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountDescriptor {
    pub kind: DiscountKind,
    pub value: Decimal,
    pub source: DiscountSource,
    pub source_id: String,
}

impl DiscountDescriptor {
    pub fn new(
        kind: DiscountKind,
        value: Decimal,
        source: DiscountSource,
        source_id: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let descriptor = Self { kind, value, source, source_id: source_id.into() };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn percentage(
        source: DiscountSource,
        source_id: impl Into<String>,
        value: Decimal,
    ) -> Result<Self, DomainError> {
        Self::new(DiscountKind::Percentage, value, source, source_id)
    }

    pub fn fixed_amount(
        source: DiscountSource,
        source_id: impl Into<String>,
        value: Decimal,
    ) -> Result<Self, DomainError> {
        Self::new(DiscountKind::FixedAmount, value, source, source_id)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.source_id.trim().is_empty() {
            return Err(DomainError::Validation("discount source id must not be empty".into()));
        }
        match self.kind {
            DiscountKind::Percentage if self.value < Decimal::ZERO || self.value > ONE_HUNDRED => {
                Err(DomainError::Validation(format!(
                    "percentage discount must be within 0..=100, got {}",
                    self.value
                )))
            }
            DiscountKind::FixedAmount if self.value < Decimal::ZERO => Err(DomainError::Validation(
                format!("fixed discount must not be negative, got {}", self.value),
            )),
            _ => Ok(()),
        }
    }

    /// Monetary contribution against the pre-discount subtotal. Percentages do
    /// not compound with other discounts.
    pub fn contribution(&self, subtotal: Decimal) -> Decimal {
        match self.kind {
            DiscountKind::Percentage => (subtotal * self.value / ONE_HUNDRED).round_dp(2),
            DiscountKind::FixedAmount => self.value,
        }
    }
}

/// One slot per discount source: a new discount from the same source replaces
/// the previous one, different sources combine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscounts {
    package: Option<DiscountDescriptor>,
    special_offer: Option<DiscountDescriptor>,
    promo_code: Option<DiscountDescriptor>,
}

impl AppliedDiscounts {
    pub fn get(&self, source: DiscountSource) -> Option<&DiscountDescriptor> {
        match source {
            DiscountSource::Package => self.package.as_ref(),
            DiscountSource::SpecialOffer => self.special_offer.as_ref(),
            DiscountSource::PromoCode => self.promo_code.as_ref(),
        }
    }

    /// Installs the descriptor in its source slot and returns whatever it replaced.
    pub fn install(&mut self, descriptor: DiscountDescriptor) -> Option<DiscountDescriptor> {
        self.slot_mut(descriptor.source).replace(descriptor)
    }

    pub fn clear(&mut self, source: DiscountSource) -> Option<DiscountDescriptor> {
        self.slot_mut(source).take()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscountDescriptor> {
        [&self.package, &self.special_offer, &self.promo_code].into_iter().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn to_vec(&self) -> Vec<DiscountDescriptor> {
        self.iter().cloned().collect()
    }

    fn slot_mut(&mut self, source: DiscountSource) -> &mut Option<DiscountDescriptor> {
        match source {
            DiscountSource::Package => &mut self.package,
            DiscountSource::SpecialOffer => &mut self.special_offer,
            DiscountSource::PromoCode => &mut self.promo_code,
        }
    }
}

impl TryFrom<Vec<DiscountDescriptor>> for AppliedDiscounts {
    type Error = DomainError;

    fn try_from(descriptors: Vec<DiscountDescriptor>) -> Result<Self, Self::Error> {
        let mut applied = Self::default();
        for descriptor in descriptors {
            descriptor.validate()?;
            let source = descriptor.source;
            if applied.install(descriptor).is_some() {
                return Err(DomainError::InvariantViolation(format!(
                    "more than one `{source}` discount in snapshot"
                )));
            }
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{AppliedDiscounts, DiscountDescriptor, DiscountKind, DiscountSource};

    #[test]
    fn percentage_contribution_uses_subtotal() {
        let discount =
            DiscountDescriptor::percentage(DiscountSource::PromoCode, "SUMMER15", Decimal::from(15))
                .expect("valid discount");

        assert_eq!(discount.contribution(Decimal::from(1800)), Decimal::from(270));
        assert_eq!(discount.contribution(Decimal::new(3333, 2)), Decimal::new(500, 2));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(DiscountDescriptor::percentage(DiscountSource::PromoCode, "X", Decimal::from(101))
            .is_err());
        assert!(DiscountDescriptor::fixed_amount(
            DiscountSource::SpecialOffer,
            "offer-1",
            Decimal::NEGATIVE_ONE
        )
        .is_err());
        assert!(DiscountDescriptor::new(
            DiscountKind::Percentage,
            Decimal::TEN,
            DiscountSource::Package,
            "  "
        )
        .is_err());
    }

    #[test]
    fn install_replaces_within_source_and_combines_across_sources() {
        let mut applied = AppliedDiscounts::default();
        let first = DiscountDescriptor::percentage(DiscountSource::PromoCode, "A10", Decimal::TEN)
            .expect("valid");
        let second =
            DiscountDescriptor::percentage(DiscountSource::PromoCode, "B20", Decimal::from(20))
                .expect("valid");
        let offer =
            DiscountDescriptor::fixed_amount(DiscountSource::SpecialOffer, "offer-1", Decimal::TEN)
                .expect("valid");

        assert_eq!(applied.install(first.clone()), None);
        assert_eq!(applied.install(second.clone()), Some(first));
        applied.install(offer);

        assert_eq!(applied.len(), 2);
        assert_eq!(applied.get(DiscountSource::PromoCode), Some(&second));
    }

    #[test]
    fn snapshot_with_duplicate_sources_is_rejected() {
        let descriptors = vec![
            DiscountDescriptor::percentage(DiscountSource::PromoCode, "A10", Decimal::TEN)
                .expect("valid"),
            DiscountDescriptor::percentage(DiscountSource::PromoCode, "B20", Decimal::from(20))
                .expect("valid"),
        ];

        assert!(AppliedDiscounts::try_from(descriptors).is_err());
    }

    #[test]
    fn parses_wire_names() {
        assert_eq!("fixed_amount".parse::<DiscountKind>(), Ok(DiscountKind::FixedAmount));
        assert_eq!("special_offer".parse::<DiscountSource>(), Ok(DiscountSource::SpecialOffer));
        assert!("bogus".parse::<DiscountKind>().is_err());
    }
}
