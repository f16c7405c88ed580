use std::time::Duration;

use dentalfly_core::config::ApiConfig;
use dentalfly_core::wire::ApiError;
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::ClientError;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<SecretString>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        auth_token: Option<SecretString>,
    ) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ClientError::Configuration("api base url must not be empty".into()));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url, auth_token })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ClientError> {
        let base_url = config.base_url.as_deref().ok_or_else(|| {
            ClientError::Configuration("api.base_url is not configured".to_string())
        })?;
        Self::new(base_url, Duration::from_secs(config.timeout_secs), config.auth_token.clone())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self.http.request(method, url);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        debug!(event_name = "client.request", method = "GET", path);
        let response = self.request(Method::GET, path).send().await?;
        decode(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(event_name = "client.request", method = "POST", path);
        let response = self.request(Method::POST, path).json(body).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(|e| ClientError::Decode(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiError>(&body)
        .map(|error| error.error)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body
            }
        });

    Err(ClientError::Status { status: status.as_u16(), message })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dentalfly_core::config::ApiConfig;

    use super::ApiClient;
    use crate::error::ClientError;

    #[test]
    fn base_url_is_normalised() {
        let client =
            ApiClient::new(" https://api.example.test/v1/ ", Duration::from_secs(5), None).expect("client");
        assert_eq!(client.base_url(), "https://api.example.test/v1");
    }

    #[test]
    fn missing_base_url_is_a_configuration_error() {
        let config = ApiConfig { base_url: None, timeout_secs: 10, auth_token: None };
        assert!(matches!(ApiClient::from_config(&config), Err(ClientError::Configuration(_))));
    }

    #[test]
    fn debug_output_hides_token() {
        let client = ApiClient::new(
            "https://api.example.test",
            Duration::from_secs(5),
            Some("s3cr3t".to_string().into()),
        )
        .expect("client");
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("<redacted>"));
    }
}
