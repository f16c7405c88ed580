use crate::domain::discount::DiscountDescriptor;
use crate::domain::line_item::{LineDraft, LineItemOrigin};
use crate::domain::offer::{SpecialOffer, SpecialOfferId};
use crate::domain::package::{PackageId, TreatmentPackage};
use crate::domain::treatment::{Treatment, TreatmentId};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    treatments: Vec<Treatment>,
    packages: Vec<TreatmentPackage>,
    offers: Vec<SpecialOffer>,
}

/// An offer with its discount validated and bonus treatments priced out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedOffer {
    pub offer_id: SpecialOfferId,
    pub title: String,
    pub discount: DiscountDescriptor,
    pub promo_code: Option<String>,
    pub bonus_lines: Vec<LineDraft>,
}

impl Catalog {
    pub fn new(
        treatments: Vec<Treatment>,
        packages: Vec<TreatmentPackage>,
        offers: Vec<SpecialOffer>,
    ) -> Self {
        Self { treatments, packages, offers }
    }

    pub fn treatments(&self) -> &[Treatment] {
        &self.treatments
    }

    pub fn packages(&self) -> &[TreatmentPackage] {
        &self.packages
    }

    pub fn offers(&self) -> &[SpecialOffer] {
        &self.offers
    }

    pub fn find_treatment(&self, treatment_id: &TreatmentId) -> Option<&Treatment> {
        self.treatments.iter().find(|treatment| &treatment.id == treatment_id)
    }

    pub fn find_package(&self, package_id: &PackageId) -> Option<&TreatmentPackage> {
        self.packages.iter().find(|package| &package.id == package_id)
    }

    pub fn find_offer(&self, offer_id: &SpecialOfferId) -> Option<&SpecialOffer> {
        self.offers.iter().find(|offer| &offer.id == offer_id)
    }

    pub fn treatment(&self, treatment_id: &TreatmentId) -> Result<&Treatment, ApplicationError> {
        self.find_treatment(treatment_id)
            .ok_or_else(|| ApplicationError::not_found("treatment", treatment_id.0.clone()))
    }

    pub fn resolve_offer(&self, offer_id: &SpecialOfferId) -> Result<ResolvedOffer, ApplicationError> {
        let offer = self
            .find_offer(offer_id)
            .ok_or_else(|| ApplicationError::not_found("special offer", offer_id.0.clone()))?;
        resolve_offer(offer, self)
    }
}

pub fn resolve_offer(
    offer: &SpecialOffer,
    catalog: &Catalog,
) -> Result<ResolvedOffer, ApplicationError> {
    let discount = offer.discount()?;

    let mut bonus_lines = Vec::with_capacity(offer.bonus_treatments.len());
    for bonus in &offer.bonus_treatments {
        if bonus.quantity == 0 {
            continue;
        }
        let treatment = catalog.treatment(&bonus.treatment_id)?;
        bonus_lines.push(LineDraft {
            treatment_id: treatment.id.clone(),
            name: treatment.name.clone(),
            unit_price_local: rust_decimal::Decimal::ZERO,
            unit_price_reference: rust_decimal::Decimal::ZERO,
            quantity: bonus.quantity,
            origin: LineItemOrigin::Bonus { offer_id: offer.id.clone() },
        });
    }

    Ok(ResolvedOffer {
        offer_id: offer.id.clone(),
        title: offer.title.clone(),
        discount,
        promo_code: offer.embedded_promo_code().map(str::to_owned),
        bonus_lines,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::Catalog;
    use crate::domain::discount::DiscountKind;
    use crate::domain::offer::{BonusTreatment, SpecialOffer, SpecialOfferId};
    use crate::domain::treatment::{Treatment, TreatmentId};
    use crate::errors::ApplicationError;

    fn catalog(bonus: &str) -> Catalog {
        Catalog::new(
            vec![Treatment {
                id: TreatmentId("consultation".to_string()),
                name: "Consultation".to_string(),
                price_local: Decimal::from(1500),
                price_reference: Decimal::from(50),
                description: "Initial consultation".to_string(),
                guarantee: None,
            }],
            Vec::new(),
            vec![SpecialOffer {
                id: SpecialOfferId("offer-spring".to_string()),
                title: "Spring smile".to_string(),
                clinic_id: Some("clinic-istanbul".to_string()),
                discount_kind: DiscountKind::FixedAmount,
                discount_value: Decimal::from(100),
                promo_code: Some("  ".to_string()),
                bonus_treatments: vec![BonusTreatment {
                    treatment_id: TreatmentId(bonus.to_string()),
                    quantity: 1,
                }],
            }],
        )
    }

    #[test]
    fn resolves_offer_with_free_bonus_lines() {
        let resolved = catalog("consultation")
            .resolve_offer(&SpecialOfferId("offer-spring".to_string()))
            .expect("offer resolves");

        assert_eq!(resolved.discount.value, Decimal::from(100));
        assert_eq!(resolved.promo_code, None, "blank embedded code is ignored");
        assert_eq!(resolved.bonus_lines.len(), 1);
        assert_eq!(resolved.bonus_lines[0].unit_price_reference, Decimal::ZERO);
    }

    #[test]
    fn unknown_offer_or_bonus_treatment_is_not_found() {
        let missing_offer =
            catalog("consultation").resolve_offer(&SpecialOfferId("nope".to_string()));
        assert!(matches!(missing_offer, Err(ApplicationError::NotFound { .. })));

        let missing_bonus =
            catalog("whitening").resolve_offer(&SpecialOfferId("offer-spring".to_string()));
        assert!(matches!(
            missing_bonus,
            Err(ApplicationError::NotFound { entity: "treatment", .. })
        ));
    }
}
