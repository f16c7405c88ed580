use async_trait::async_trait;
use dentalfly_core::domain::discount::{DiscountDescriptor, DiscountSource};
use dentalfly_core::quoting::promo::{normalize_code, PromoRequest, PromoResolver, ResolveError};
use dentalfly_core::wire::{ApplyPromoRequest, ApplyPromoResponse};
use tracing::warn;

use crate::api::ApiClient;

/// Promo validation against `POST /promo-codes/apply`.
#[derive(Clone, Debug)]
pub struct HttpPromoResolver {
    client: ApiClient,
}

impl HttpPromoResolver {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PromoResolver for HttpPromoResolver {
    async fn resolve(&self, request: &PromoRequest) -> Result<DiscountDescriptor, ResolveError> {
        let code = normalize_code(&request.code);
        let body = ApplyPromoRequest {
            code: code.clone(),
            treatments: request.treatments.iter().map(|id| id.0.clone()).collect(),
            subtotal: Some(request.subtotal),
        };

        let response: ApplyPromoResponse =
            self.client.post_json("/promo-codes/apply", &body).await.map_err(|error| {
                match error.status() {
                    Some(404) => ResolveError::NotFound { code: code.clone() },
                    Some(422) => {
                        ResolveError::NotApplicable { code: code.clone(), reason: error.message() }
                    }
                    // Auth failures and malformed requests say nothing about the code.
                    _ => {
                        warn!(
                            event_name = "client.promo.unavailable",
                            code = %code,
                            error = %error,
                            "promo validation failed"
                        );
                        ResolveError::Network(error.to_string())
                    }
                }
            })?;

        let discount = response.discount;
        if discount.source != DiscountSource::PromoCode {
            return Err(ResolveError::Network(format!(
                "backend returned a `{}` discount for promo code {code}",
                discount.source
            )));
        }
        discount.validate().map_err(|error| ResolveError::NotApplicable {
            code,
            reason: error.to_string(),
        })?;
        Ok(discount)
    }
}
