use rust_decimal::Decimal;

use crate::domain::discount::{DiscountDescriptor, DiscountSource};
use crate::domain::line_item::{LineDraft, LineItemOrigin};
use crate::domain::package::{PackageId, TreatmentPackage};
use crate::errors::{ApplicationError, DomainError};
use crate::quoting::catalog::Catalog;

/// A package expanded into locked lines whose reference subtotals add up to
/// exactly the package price.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageBundle {
    pub package_id: PackageId,
    pub name: String,
    pub lines: Vec<LineDraft>,
    pub discount: DiscountDescriptor,
    pub individual_total: Decimal,
}

impl Catalog {
    pub fn resolve_package(&self, package_id: &PackageId) -> Result<PackageBundle, ApplicationError> {
        let package = self
            .find_package(package_id)
            .ok_or_else(|| ApplicationError::not_found("package", package_id.0.clone()))?;
        expand_package(package, self)
    }
}

/// Expands a package into line drafts. Either the whole bundle resolves or an
/// error is returned; nothing partial escapes.
pub fn expand_package(
    package: &TreatmentPackage,
    catalog: &Catalog,
) -> Result<PackageBundle, ApplicationError> {
    let discount =
        DiscountDescriptor::percentage(DiscountSource::Package, package.id.0.clone(), package.savings)?;
    if package.price < Decimal::ZERO {
        return Err(DomainError::Validation(format!("package `{}` has a negative price", package.id))
            .into());
    }

    let mut lines = Vec::with_capacity(package.treatments.len());
    for component in package.treatments.iter().filter(|component| component.quantity > 0) {
        let treatment = catalog.treatment(&component.treatment_id)?;
        lines.push(LineDraft {
            treatment_id: treatment.id.clone(),
            name: treatment.name.clone(),
            unit_price_local: treatment.price_local,
            unit_price_reference: treatment.price_reference,
            quantity: component.quantity,
            origin: LineItemOrigin::Package { package_id: package.id.clone() },
        });
    }
    if lines.is_empty() {
        return Err(DomainError::InvariantViolation(format!(
            "package `{}` contains no treatments",
            package.id
        ))
        .into());
    }

    let individual_total: Decimal = lines
        .iter()
        .map(|line| line.unit_price_reference * Decimal::from(line.quantity))
        .sum();
    if individual_total.is_zero() {
        return Err(DomainError::InvariantViolation(format!(
            "package `{}` has no priced treatments",
            package.id
        ))
        .into());
    }

    distribute_bundle_price(&mut lines, individual_total, package.price);

    Ok(PackageBundle {
        package_id: package.id.clone(),
        name: package.name.clone(),
        lines,
        discount,
        individual_total,
    })
}

/// Scales unit prices by `price / individual_total`. The rounding remainder is
/// put on one unit whose price stays non-negative after absorbing it: the last
/// single-quantity line if one can, otherwise a unit split off the last line
/// that can.
fn distribute_bundle_price(lines: &mut Vec<LineDraft>, individual_total: Decimal, price: Decimal) {
    let ratio = price / individual_total;
    for line in lines.iter_mut() {
        line.unit_price_reference = (line.unit_price_reference * ratio).round_dp(2);
        line.unit_price_local = (line.unit_price_local * ratio).round_dp(2);
    }

    let distributed: Decimal =
        lines.iter().map(|line| line.unit_price_reference * Decimal::from(line.quantity)).sum();
    let remainder = price - distributed;
    if remainder.is_zero() {
        return;
    }

    let absorbs = |line: &LineDraft| line.unit_price_reference + remainder >= Decimal::ZERO;
    if let Some(line) = lines.iter_mut().rev().find(|line| line.quantity == 1 && absorbs(line)) {
        line.unit_price_reference += remainder;
        return;
    }

    let Some(index) = lines.iter().rposition(|line| absorbs(line)) else {
        return;
    };
    lines[index].quantity -= 1;
    let mut single = lines[index].clone();
    single.quantity = 1;
    single.unit_price_reference += remainder;
    lines.insert(index + 1, single);
}
