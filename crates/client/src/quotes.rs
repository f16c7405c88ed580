use async_trait::async_trait;
use dentalfly_core::domain::quote::{QuoteId, QuoteRecord};
use dentalfly_core::errors::ApplicationError;
use dentalfly_core::quoting::session::{QuoteDraft, QuoteStore};
use dentalfly_core::wire::{QuoteResponse, SaveQuoteRequest, SaveQuoteResponse};

use crate::api::ApiClient;

/// Quote persistence over `POST /quotes` and `GET /quotes/{id}`. One attempt
/// per call; retrying is left to the caller.
#[derive(Clone, Debug)]
pub struct HttpQuoteStore {
    client: ApiClient,
}

impl HttpQuoteStore {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QuoteStore for HttpQuoteStore {
    async fn save(&self, draft: QuoteDraft) -> Result<QuoteId, ApplicationError> {
        let request = SaveQuoteRequest::from(draft);
        let response: SaveQuoteResponse = self.client.post_json("/quotes", &request).await?;
        Ok(QuoteId(response.id))
    }

    async fn load(&self, id: &QuoteId) -> Result<QuoteRecord, ApplicationError> {
        let path = format!("/quotes/{}", id.0);
        match self.client.get_json::<QuoteResponse>(&path).await {
            Ok(response) => Ok(response.into()),
            Err(error) if error.status() == Some(404) => {
                Err(ApplicationError::not_found("quote", id.0.clone()))
            }
            Err(error) => Err(error.into()),
        }
    }
}
