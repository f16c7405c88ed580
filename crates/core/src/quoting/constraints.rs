use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::line_item::LineItemSnapshot;
use crate::domain::quote::QuoteState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteViolation {
    pub code: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl QuoteViolation {
    fn new(code: &str, message: String, suggestion: &str) -> Self {
        Self { code: code.to_string(), message, suggestion: Some(suggestion.to_string()) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub violations: Vec<QuoteViolation>,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self { valid: true, violations: Vec::new() }
    }
}

impl ValidationReport {
    pub fn codes(&self) -> Vec<&str> {
        self.violations.iter().map(|violation| violation.code.as_str()).collect()
    }

    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|violation| violation.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub fn validate_for_submit(state: &QuoteState) -> ValidationReport {
    let lines: Vec<LineItemSnapshot> = state.line_items().iter().map(|line| line.snapshot()).collect();
    validate_lines(&lines)
}

/// Checks lines received from outside the reducer, where none of its
/// invariants can be assumed.
pub fn validate_lines(lines: &[LineItemSnapshot]) -> ValidationReport {
    if lines.is_empty() {
        return ValidationReport {
            valid: false,
            violations: vec![QuoteViolation::new(
                "EMPTY_QUOTE",
                "Quote must contain at least one treatment".to_string(),
                "Add a treatment or choose a package before submitting",
            )],
        };
    }

    let mut report = ValidationReport::default();
    let mut seen_ids: HashSet<&str> = HashSet::new();

    for line in lines {
        let id = line.id.trim();
        if !seen_ids.insert(id) {
            report.violations.push(QuoteViolation::new(
                "DUPLICATE_LINE_ID",
                format!("Line item id `{id}` appears more than once"),
                "Give every line item a unique id",
            ));
        }

        if line.quantity == 0 {
            report.violations.push(QuoteViolation::new(
                "ZERO_QUANTITY",
                format!("Treatment {} has zero quantity", line.treatment_id),
                "Use a quantity of at least 1",
            ));
        }

        if line.unit_price_reference < Decimal::ZERO || line.unit_price_local < Decimal::ZERO {
            report.violations.push(QuoteViolation::new(
                "NEGATIVE_UNIT_PRICE",
                format!("Treatment {} has a negative unit price", line.treatment_id),
                "Reload the catalog prices and rebuild the quote",
            ));
        }
    }

    report.valid = report.violations.is_empty();
    report
}
