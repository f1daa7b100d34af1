use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode, header::RETRY_AFTER};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

use crate::errors::SourceError;

pub const USER_AGENT: &str = concat!("activist-dataset/", env!("CARGO_PKG_VERSION"));

/// JSON-over-HTTP client bound to one base URL.
///
/// Responses are mapped onto [`SourceError`]: 429 is `RateLimited`, 5xx and
/// transport failures are `Transient`, every other non-success status and
/// undecodable bodies are `Permanent`.
pub struct JsonHttp {
    client: Client,
    base_url: String,
}

impl JsonHttp {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).query(query).send().await?;
        decode(&url, response).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        body: &B,
    ) -> Result<T, SourceError> {
        let response = self.client.post(&self.base_url).json(body).send().await?;
        decode(&self.base_url, response).await
    }
}

async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, SourceError> {
    match response.status() {
        s if s.is_success() => Ok(response.json::<T>().await?),
        StatusCode::TOO_MANY_REQUESTS => Err(SourceError::RateLimited {
            retry_after: retry_after(&response),
        }),
        s if s.is_server_error() => Err(SourceError::Transient(format!("HTTP {s} from {url}"))),
        s => {
            let body = response.text().await.unwrap_or_default();
            Err(SourceError::Permanent(format!("HTTP {s} from {url}: {body}")))
        }
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
