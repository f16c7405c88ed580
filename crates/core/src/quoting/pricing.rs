use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::discount::{DiscountKind, DiscountSource};
use crate::domain::quote::{QuoteSnapshot, QuoteState};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTrace {
    pub currency: String,
    pub steps: Vec<PricingTraceStep>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountLine {
    pub source: DiscountSource,
    pub source_id: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub amount: Decimal,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteTotals {
    pub subtotal: Decimal,
    pub total_discount: Decimal,
    pub total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingResult {
    pub subtotal: Decimal,
    pub subtotal_local: Decimal,
    pub total_discount: Decimal,
    pub total: Decimal,
    /// What the active package saves against individual prices. Already part of
    /// the package line prices, so it is not in `total_discount`.
    pub bundle_savings: Decimal,
    pub discounts: Vec<DiscountLine>,
    pub trace: PricingTrace,
}

impl PricingResult {
    pub fn totals(&self) -> QuoteTotals {
        QuoteTotals {
            subtotal: self.subtotal,
            total_discount: self.total_discount,
            total: self.total,
        }
    }
}

pub fn calculate_totals(state: &QuoteState) -> QuoteTotals {
    price_quote_with_trace(state, "").totals()
}

pub fn price_quote(state: &QuoteState) -> Decimal {
    state.line_items().iter().map(|line| line.subtotal_reference()).sum()
}

pub fn price_quote_with_trace(state: &QuoteState, currency: &str) -> PricingResult {
    let subtotal = price_quote(state);
    let subtotal_local = state.line_items().iter().map(|line| line.subtotal_local()).sum();
    let mut steps = vec![PricingTraceStep {
        stage: "subtotal".to_string(),
        detail: "sum(unit_price_reference * quantity)".to_string(),
        amount: subtotal,
    }];

    let mut discounts = Vec::new();
    let mut bundle_savings = Decimal::ZERO;
    for discount in state.discounts().iter() {
        let amount = match discount.source {
            DiscountSource::Package => {
                bundle_savings = package_savings(state, discount.value);
                steps.push(PricingTraceStep {
                    stage: "bundle_savings".to_string(),
                    detail: format!("package {} saves {}% (priced into lines)", discount.source_id, discount.value),
                    amount: bundle_savings,
                });
                Decimal::ZERO
            }
            DiscountSource::SpecialOffer | DiscountSource::PromoCode => {
                let amount = discount.contribution(subtotal);
                steps.push(PricingTraceStep {
                    stage: discount.source.as_str().to_string(),
                    detail: match discount.kind {
                        DiscountKind::Percentage => {
                            format!("{} {}% of subtotal", discount.source_id, discount.value)
                        }
                        DiscountKind::FixedAmount => format!("{} fixed amount", discount.source_id),
                    },
                    amount,
                });
                amount
            }
        };
        discounts.push(DiscountLine {
            source: discount.source,
            source_id: discount.source_id.clone(),
            kind: discount.kind,
            value: discount.value,
            amount,
        });
    }

    let requested: Decimal = discounts.iter().map(|line| line.amount).sum();
    let total_discount = requested.min(subtotal);
    if total_discount < requested {
        steps.push(PricingTraceStep {
            stage: "discount_cap".to_string(),
            detail: "discounts capped at subtotal".to_string(),
            amount: total_discount,
        });
    }

    let total = (subtotal - total_discount).max(Decimal::ZERO);
    steps.push(PricingTraceStep {
        stage: "total".to_string(),
        detail: "max(0, subtotal - total_discount)".to_string(),
        amount: total,
    });

    PricingResult {
        subtotal,
        subtotal_local,
        total_discount,
        total,
        bundle_savings,
        discounts,
        trace: PricingTrace { currency: currency.to_string(), steps },
    }
}

/// Savings are quoted relative to individual prices, so the package lines
/// (which sum to the bundle price) represent `100 - savings` percent.
fn package_savings(state: &QuoteState, savings_pct: Decimal) -> Decimal {
    if savings_pct >= Decimal::ONE_HUNDRED {
        return Decimal::ZERO;
    }
    let bundle: Decimal = state
        .line_items()
        .iter()
        .filter(|line| line.is_package())
        .map(|line| line.subtotal_reference())
        .sum();
    (bundle * savings_pct / (Decimal::ONE_HUNDRED - savings_pct)).round_dp(2)
}

pub fn snapshot_quote(
    state: &QuoteState,
    reference_currency: &str,
    local_currency: &str,
) -> QuoteSnapshot {
    let totals = calculate_totals(state);
    QuoteSnapshot {
        line_items: state.line_items().iter().map(|line| line.snapshot()).collect(),
        discounts: state.discounts().to_vec(),
        promo_via_offer: state.promo_via_offer().map(|offer_id| offer_id.0.clone()),
        subtotal: totals.subtotal,
        total_discount: totals.total_discount,
        total: totals.total,
        reference_currency: reference_currency.to_string(),
        local_currency: local_currency.to_string(),
    }
}
