//! Promo code validation.
//!
//! A [`PromoResolver`] turns a code into a [`DiscountDescriptor`] or explains
//! why it cannot. Rules live in a table of [`PromoCodeRule`]s; the backend API
//! and the database both feed the same evaluation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::discount::{DiscountDescriptor, DiscountKind, DiscountSource};
use crate::domain::treatment::TreatmentId;
use crate::errors::ApplicationError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoRequest {
    pub code: String,
    pub treatments: Vec<TreatmentId>,
    pub subtotal: Decimal,
}

impl PromoRequest {
    pub fn new(code: impl Into<String>, treatments: Vec<TreatmentId>, subtotal: Decimal) -> Self {
        Self { code: code.into(), treatments, subtotal }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("promo code `{code}` is not valid")]
    NotFound { code: String },
    #[error("promo code `{code}` does not apply: {reason}")]
    NotApplicable { code: String, reason: String },
    #[error("promo validation unavailable: {0}")]
    Network(String),
}

impl ResolveError {
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<ResolveError> for ApplicationError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::NotFound { code } => ApplicationError::not_found("promo code", code),
            error @ ResolveError::NotApplicable { .. } => {
                ApplicationError::validation(error.to_string())
            }
            ResolveError::Network(message) => ApplicationError::Network(message),
        }
    }
}

/// Flattened validation answer, as shown to a patient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoValidation {
    pub valid: bool,
    pub discount: Option<DiscountDescriptor>,
    pub message: Option<String>,
}

impl From<Result<DiscountDescriptor, ResolveError>> for PromoValidation {
    fn from(result: Result<DiscountDescriptor, ResolveError>) -> Self {
        match result {
            Ok(discount) => Self { valid: true, discount: Some(discount), message: None },
            Err(error) => Self { valid: false, discount: None, message: Some(error.to_string()) },
        }
    }
}

#[async_trait]
pub trait PromoResolver: Send + Sync {
    async fn resolve(&self, request: &PromoRequest) -> Result<DiscountDescriptor, ResolveError>;

    async fn validate(&self, request: &PromoRequest) -> PromoValidation {
        self.resolve(request).await.into()
    }
}

/// Canonical form used for lookups: trimmed and upper-cased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCodeRule {
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub active: bool,
    #[serde(default)]
    pub min_subtotal: Option<Decimal>,
    #[serde(default)]
    pub applicable_treatments: Vec<TreatmentId>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl PromoCodeRule {
    pub fn percentage(code: impl Into<String>, value: Decimal) -> Self {
        Self {
            code: normalize_code(&code.into()),
            kind: DiscountKind::Percentage,
            value,
            active: true,
            min_subtotal: None,
            applicable_treatments: Vec::new(),
            expires_at: None,
        }
    }

    pub fn evaluate(
        &self,
        request: &PromoRequest,
        now: DateTime<Utc>,
    ) -> Result<DiscountDescriptor, ResolveError> {
        let code = self.code.clone();
        if !self.active {
            return Err(ResolveError::NotFound { code });
        }
        if self.expires_at.is_some_and(|expires_at| expires_at <= now) {
            return Err(ResolveError::NotApplicable { code, reason: "the code has expired".into() });
        }
        if let Some(minimum) = self.min_subtotal {
            if request.subtotal < minimum {
                return Err(ResolveError::NotApplicable {
                    code,
                    reason: format!("requires a subtotal of at least {minimum}"),
                });
            }
        }
        if !self.applicable_treatments.is_empty()
            && !request
                .treatments
                .iter()
                .any(|treatment| self.applicable_treatments.contains(treatment))
        {
            return Err(ResolveError::NotApplicable {
                code,
                reason: "none of the selected treatments qualify".into(),
            });
        }

        DiscountDescriptor::new(self.kind, self.value, DiscountSource::PromoCode, code.clone())
            .map_err(|error| ResolveError::NotApplicable { code, reason: error.to_string() })
    }
}

/// Resolver over an in-process rule table.
#[derive(Clone, Debug, Default)]
pub struct StaticPromoResolver {
    rules: HashMap<String, PromoCodeRule>,
}

impl StaticPromoResolver {
    pub fn new(rules: impl IntoIterator<Item = PromoCodeRule>) -> Self {
        let mut resolver = Self::default();
        for rule in rules {
            resolver.insert(rule);
        }
        resolver
    }

    pub fn insert(&mut self, mut rule: PromoCodeRule) {
        rule.code = normalize_code(&rule.code);
        self.rules.insert(rule.code.clone(), rule);
    }

    pub fn rule(&self, code: &str) -> Option<&PromoCodeRule> {
        self.rules.get(&normalize_code(code))
    }

    pub fn resolve_at(
        &self,
        request: &PromoRequest,
        now: DateTime<Utc>,
    ) -> Result<DiscountDescriptor, ResolveError> {
        let code = normalize_code(&request.code);
        if code.is_empty() {
            return Err(ResolveError::NotFound { code });
        }
        self.rules.get(&code).ok_or(ResolveError::NotFound { code })?.evaluate(request, now)
    }
}

#[async_trait]
impl PromoResolver for StaticPromoResolver {
    async fn resolve(&self, request: &PromoRequest) -> Result<DiscountDescriptor, ResolveError> {
        self.resolve_at(request, Utc::now())
    }
}

/// Offline guess used only when the validator cannot be reached: the first
/// two-digit run in the code, if it lies in 5..=50, is read as a percentage.
pub fn degraded_discount(code: &str) -> Option<DiscountDescriptor> {
    let code = normalize_code(code);
    let bytes = code.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if !bytes[index].is_ascii_digit() {
            index += 1;
            continue;
        }
        let start = index;
        while index < bytes.len() && bytes[index].is_ascii_digit() {
            index += 1;
        }
        if index - start != 2 {
            continue;
        }
        let percent: u32 = code[start..index].parse().ok()?;
        if !(5..=50).contains(&percent) {
            return None;
        }
        return DiscountDescriptor::percentage(DiscountSource::PromoCode, code.clone(), Decimal::from(percent))
            .ok();
    }
    None
}
