//! Thin HTTP helpers for the upstream proxy fan-outs, grounded on
//! `modules/external-validator-proxy/utils.go`'s `SendHTTPRequest`/
//! `SendHTTPRequestWithRetries` (fixed-delay retry, no backoff growth).

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("exceeded max retries")]
    MaxRetriesExceeded,
}

pub async fn send_request<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    body: Option<&B>,
) -> Result<reqwest::Response, HttpError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(body);
    }
    let response = request.send().await?;
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(HttpError::Status(response.status()))
    }
}

pub async fn send_request_with_retries<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    body: Option<&B>,
    max_retries: u32,
) -> Result<reqwest::Response, HttpError> {
    let mut attempt = 0;
    loop {
        match send_request(client, method.clone(), url, body).await {
            Ok(response) => return Ok(response),
            Err(_) if attempt < max_retries => {
                attempt += 1;
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(_) => return Err(HttpError::MaxRetriesExceeded),
        }
    }
}

pub async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<Option<T>, HttpError> {
    if response.status() == reqwest::StatusCode::NO_CONTENT {
        return Ok(None);
    }
    Ok(Some(response.json::<T>().await?))
}
