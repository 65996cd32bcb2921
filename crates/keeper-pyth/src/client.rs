//! HTTP client for the Pyth price service.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use alloy::primitives::{Bytes, B256};
use base64::Engine;
use reqwest::Client;
use tracing::debug;

use crate::error::{PythError, PythResult};

/// Default timeout for price-service requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The capability the off-chain keeper needs: signed update data for a feed.
pub trait PriceService: Send + Sync {
    fn latest_vaas(&self, feed_id: B256) -> BoxFuture<'_, PythResult<Vec<Bytes>>>;
}

/// Client for the Pyth price-service `latest_vaas` endpoint.
pub struct PythPriceClient {
    client: Client,
    base_url: String,
}

impl PythPriceClient {
    /// # Arguments
    /// * `base_url` - Price-service root, e.g. `https://xc-mainnet.pyth.network`
    pub fn new(base_url: impl Into<String>) -> PythResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| PythError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    async fn fetch_latest_vaas(&self, feed_id: B256) -> PythResult<Vec<Bytes>> {
        let url = format!("{}/api/latest_vaas", self.base_url);
        let id = format!("{feed_id:#x}");

        let response = self
            .client
            .get(&url)
            .query(&[("ids[]", id.as_str())])
            .send()
            .await
            .map_err(|e| PythError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PythError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // The endpoint returns a JSON array of base64-encoded VAAs.
        let encoded: Vec<String> = response
            .json()
            .await
            .map_err(|e| PythError::Malformed(e.to_string()))?;

        if encoded.is_empty() {
            return Err(PythError::Malformed(format!(
                "no update data returned for feed {id}"
            )));
        }

        let updates = encoded
            .iter()
            .map(|vaa| {
                base64::engine::general_purpose::STANDARD
                    .decode(vaa)
                    .map(Bytes::from)
                    .map_err(|e| PythError::Malformed(format!("bad base64 VAA: {e}")))
            })
            .collect::<PythResult<Vec<Bytes>>>()?;

        debug!(feed = %id, count = updates.len(), "Fetched Pyth update data");
        Ok(updates)
    }
}

impl PriceService for PythPriceClient {
    fn latest_vaas(&self, feed_id: B256) -> BoxFuture<'_, PythResult<Vec<Bytes>>> {
        Box::pin(self.fetch_latest_vaas(feed_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalised() {
        let client = PythPriceClient::new("https://example.org/").unwrap();
        assert_eq!(client.base_url, "https://example.org");
    }

    #[test]
    fn decodes_base64_payloads() {
        let raw = b"\x01\x02\x03update";
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .unwrap();
        assert_eq!(decoded, raw);
    }
}
