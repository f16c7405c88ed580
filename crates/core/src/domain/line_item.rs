use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::offer::SpecialOfferId;
use crate::domain::package::PackageId;
use crate::domain::treatment::{Treatment, TreatmentId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineItemId(pub String);

impl fmt::Display for LineItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a line came from. Anything other than `Selected` is locked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum LineItemOrigin {
    Selected,
    Bonus { offer_id: SpecialOfferId },
    Package { package_id: PackageId },
}

/// A line before it has been given an id inside a quote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineDraft {
    pub treatment_id: TreatmentId,
    pub name: String,
    pub unit_price_local: Decimal,
    pub unit_price_reference: Decimal,
    pub quantity: u32,
    pub origin: LineItemOrigin,
}

impl LineDraft {
    pub fn selected(treatment: &Treatment, quantity: u32) -> Self {
        Self {
            treatment_id: treatment.id.clone(),
            name: treatment.name.clone(),
            unit_price_local: treatment.price_local,
            unit_price_reference: treatment.price_reference,
            quantity,
            origin: LineItemOrigin::Selected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreatmentLineItem {
    pub id: LineItemId,
    pub treatment_id: TreatmentId,
    pub name: String,
    unit_price_local: Decimal,
    unit_price_reference: Decimal,
    quantity: u32,
    origin: LineItemOrigin,
}

impl TreatmentLineItem {
    pub fn new(id: LineItemId, draft: LineDraft) -> Result<Self, DomainError> {
        if draft.quantity < 1 {
            return Err(DomainError::Validation(format!(
                "line item for `{}` must have quantity >= 1",
                draft.treatment_id
            )));
        }
        if draft.unit_price_local < Decimal::ZERO || draft.unit_price_reference < Decimal::ZERO {
            return Err(DomainError::Validation(format!(
                "line item for `{}` has a negative unit price",
                draft.treatment_id
            )));
        }

        Ok(Self {
            id,
            treatment_id: draft.treatment_id,
            name: draft.name,
            unit_price_local: draft.unit_price_local,
            unit_price_reference: draft.unit_price_reference,
            quantity: draft.quantity,
            origin: draft.origin,
        })
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price_local(&self) -> Decimal {
        self.unit_price_local
    }

    pub fn unit_price_reference(&self) -> Decimal {
        self.unit_price_reference
    }

    pub fn origin(&self) -> &LineItemOrigin {
        &self.origin
    }

    pub fn subtotal_local(&self) -> Decimal {
        self.unit_price_local * Decimal::from(self.quantity)
    }

    pub fn subtotal_reference(&self) -> Decimal {
        self.unit_price_reference * Decimal::from(self.quantity)
    }

    pub fn is_locked(&self) -> bool {
        !matches!(self.origin, LineItemOrigin::Selected)
    }

    pub fn is_bonus(&self) -> bool {
        matches!(self.origin, LineItemOrigin::Bonus { .. })
    }

    pub fn is_package(&self) -> bool {
        matches!(self.origin, LineItemOrigin::Package { .. })
    }

    pub fn is_bonus_of(&self, offer_id: &SpecialOfferId) -> bool {
        matches!(&self.origin, LineItemOrigin::Bonus { offer_id: id } if id == offer_id)
    }

    pub fn set_quantity(&mut self, quantity: u32) -> Result<(), DomainError> {
        if quantity < 1 {
            return Err(DomainError::Validation("quantity must be at least 1".to_string()));
        }
        if self.is_locked() {
            return Err(DomainError::Validation(format!("line item `{}` is locked", self.id)));
        }
        self.quantity = quantity;
        Ok(())
    }

    pub fn snapshot(&self) -> LineItemSnapshot {
        let (origin_kind, origin_id) = match &self.origin {
            LineItemOrigin::Selected => (OriginKind::Selected, None),
            LineItemOrigin::Bonus { offer_id } => (OriginKind::Bonus, Some(offer_id.0.clone())),
            LineItemOrigin::Package { package_id } => {
                (OriginKind::Package, Some(package_id.0.clone()))
            }
        };

        LineItemSnapshot {
            id: self.id.0.clone(),
            treatment_id: self.treatment_id.0.clone(),
            name: self.name.clone(),
            unit_price_local: self.unit_price_local,
            unit_price_reference: self.unit_price_reference,
            quantity: self.quantity,
            subtotal_local: self.subtotal_local(),
            subtotal_reference: self.subtotal_reference(),
            is_locked: self.is_locked(),
            is_bonus: self.is_bonus(),
            is_package: self.is_package(),
            origin: origin_kind,
            origin_id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    Selected,
    Bonus,
    Package,
}

impl OriginKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Selected => "selected",
            Self::Bonus => "bonus",
            Self::Package => "package",
        }
    }
}

impl std::str::FromStr for OriginKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "selected" => Ok(Self::Selected),
            "bonus" => Ok(Self::Bonus),
            "package" => Ok(Self::Package),
            other => Err(DomainError::Validation(format!("unknown line item origin `{other}`"))),
        }
    }
}

/// Persisted and wire form of a line item. Subtotals and flags are written out
/// for consumers but recomputed from price and quantity when read back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemSnapshot {
    pub id: String,
    pub treatment_id: String,
    pub name: String,
    pub unit_price_local: Decimal,
    pub unit_price_reference: Decimal,
    pub quantity: u32,
    pub subtotal_local: Decimal,
    pub subtotal_reference: Decimal,
    pub is_locked: bool,
    pub is_bonus: bool,
    pub is_package: bool,
    pub origin: OriginKind,
    pub origin_id: Option<String>,
}

impl TryFrom<LineItemSnapshot> for TreatmentLineItem {
    type Error = DomainError;

    fn try_from(snapshot: LineItemSnapshot) -> Result<Self, Self::Error> {
        let origin = match (snapshot.origin, snapshot.origin_id) {
            (OriginKind::Selected, _) => LineItemOrigin::Selected,
            (OriginKind::Bonus, Some(id)) => LineItemOrigin::Bonus { offer_id: SpecialOfferId(id) },
            (OriginKind::Package, Some(id)) => {
                LineItemOrigin::Package { package_id: PackageId(id) }
            }
            (kind, None) => {
                return Err(DomainError::Validation(format!(
                    "line item `{}` with origin `{}` is missing its origin id",
                    snapshot.id,
                    kind.as_str()
                )))
            }
        };

        TreatmentLineItem::new(
            LineItemId(snapshot.id),
            LineDraft {
                treatment_id: TreatmentId(snapshot.treatment_id),
                name: snapshot.name,
                unit_price_local: snapshot.unit_price_local,
                unit_price_reference: snapshot.unit_price_reference,
                quantity: snapshot.quantity,
                origin,
            },
        )
    }
}
