use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::HttpSettings;
use crate::error::Result;

/// Host whose API expects the key as an `appid` query parameter
const APPID_HOST: &str = "openweathermap.org";

/// Fetches a remote resource body. The pipeline only depends on this trait,
/// so tests can serve canned payloads without a network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str, api_key: Option<&str>) -> Result<Vec<u8>>;
}

/// reqwest-backed fetcher with a bounded timeout and a browser user agent
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str, api_key: Option<&str>) -> Result<Vec<u8>> {
        let url = with_appid(url, api_key);
        let mut request = self.client.get(&url);
        if let Some(key) = api_key {
            request = request
                .header("Authorization", format!("Bearer {key}"))
                .header("x-api-key", key);
        }

        let response = request.send().await?.error_for_status()?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!(%status, bytes = body.len(), "Fetched remote resource");
        Ok(body.to_vec())
    }
}

/// Append `appid=<key>` for hosts that only accept the key in the query
pub fn with_appid(url: &str, api_key: Option<&str>) -> String {
    match api_key {
        Some(key) if url.contains(APPID_HOST) && !url.contains("appid=") => {
            let connector = if url.contains('?') { '&' } else { '?' };
            format!("{url}{connector}appid={key}")
        }
        _ => url.to_string(),
    }
}
