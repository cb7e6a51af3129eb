use super::client::HttpClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that sends an API key header on every request.
///
/// Some government feed gateways require a key even for public data; the
/// header name varies per gateway (`X-API-Key`, `Authorization`, ...).
pub struct ApiKey<C> {
    inner: C,
    header_name: HeaderName,
    value: HeaderValue,
}

impl<C> ApiKey<C> {
    pub fn new(inner: C, header_name: &str, key: &str) -> Result<Self> {
        let header_name = HeaderName::from_bytes(header_name.as_bytes())
            .with_context(|| format!("invalid API key header name '{header_name}'"))?;
        let mut value = HeaderValue::from_str(key).context("API key is not a valid header value")?;
        value.set_sensitive(true);

        Ok(Self { inner, header_name, value })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut()
            .insert(self.header_name.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::BasicClient;
    use std::time::Duration;

    #[test]
    fn test_rejects_invalid_header_name() {
        let inner = BasicClient::new(Duration::from_secs(1)).unwrap();
        assert!(ApiKey::new(inner, "bad header", "k").is_err());
    }

    #[test]
    fn test_key_value_is_sensitive() {
        let inner = BasicClient::new(Duration::from_secs(1)).unwrap();
        let client = ApiKey::new(inner, "X-API-Key", "secret").unwrap();
        assert!(client.value.is_sensitive());
        assert_eq!(client.header_name, "x-api-key");
    }
}
