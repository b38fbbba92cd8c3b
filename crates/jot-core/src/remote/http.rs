//! reqwest-backed [`RemoteClient`]

use std::time::Duration;

use async_stream::stream;
use futures::StreamExt;
use reqwest::{Response, StatusCode};
use serde::Deserialize;

use crate::models::{ChangeNotice, ItemPayload, RemoteItem, RemoteKey};
use crate::util::{compact_text, is_http_url, normalize_text_option};

use super::sse::SseDecoder;
use super::{ChangeEvent, ChangeStream, RemoteClient, RemoteError, RemoteResult};

/// HTTP client for the `/items` resource of a Jot service
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpRemoteClient {
    /// Builds a client for an API base URL.
    ///
    /// `timeout` bounds every REST call. The change stream is long-lived and
    /// only bounded until its response headers arrive.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> RemoteResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            base_url,
            client,
            timeout,
        })
    }

    fn items_url(&self) -> String {
        format!("{}/items", self.base_url)
    }

    fn item_url(&self, key: &RemoteKey) -> String {
        format!(
            "{}/items/{}",
            self.base_url,
            urlencoding::encode(key.as_str())
        )
    }
}

impl RemoteClient for HttpRemoteClient {
    async fn list(&self) -> RemoteResult<Vec<RemoteItem>> {
        let response = self
            .client
            .get(self.items_url())
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await?;
        let response = expect_success(response).await?;
        decode_json(response).await
    }

    async fn create(&self, payload: &ItemPayload) -> RemoteResult<RemoteItem> {
        let response = self
            .client
            .post(self.items_url())
            .json(payload)
            .timeout(self.timeout)
            .send()
            .await?;
        let response = expect_success(response).await?;
        decode_json(response).await
    }

    async fn update(&self, key: &RemoteKey, payload: &ItemPayload) -> RemoteResult<()> {
        let response = self
            .client
            .put(self.item_url(key))
            .json(payload)
            .timeout(self.timeout)
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn delete(&self, key: &RemoteKey) -> RemoteResult<()> {
        let response = self
            .client
            .delete(self.item_url(key))
            .timeout(self.timeout)
            .send()
            .await?;
        expect_success(response).await?;
        Ok(())
    }

    async fn get(&self, key: &RemoteKey) -> RemoteResult<Option<RemoteItem>> {
        let response = self
            .client
            .get(self.item_url(key))
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .send()
            .await?;
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Ok(None);
        }
        let response = expect_success(response).await?;
        decode_json(response).await.map(Some)
    }

    async fn changes(&self) -> RemoteResult<ChangeStream> {
        let request = self
            .client
            .get(format!("{}/stream", self.items_url()))
            .header("Accept", "text/event-stream")
            .send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| {
                RemoteError::Unavailable(format!(
                    "change stream sent no response within {}s",
                    self.timeout.as_secs()
                ))
            })??;
        let response = expect_success(response).await?;

        let mut bytes = Box::pin(response.bytes_stream());
        let events = stream! {
            let mut decoder = SseDecoder::new();
            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        for event in decoder.feed(&chunk) {
                            let notice = serde_json::from_str::<ChangeNotice>(&event.data).ok();
                            yield Ok::<_, RemoteError>(ChangeEvent { notice });
                        }
                    }
                    Err(error) => {
                        yield Err(RemoteError::from(error));
                        break;
                    }
                }
            }
        };
        Ok(events.boxed())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

async fn expect_success(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::status(
        status.as_u16(),
        parse_api_error(status, &body),
    ))
}

async fn decode_json<T: serde::de::DeserializeOwned>(response: Response) -> RemoteResult<T> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|error| {
        RemoteError::Decode(format!("{error}: {}", compact_text(&body)))
    })
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> RemoteResult<String> {
    let base_url = normalize_text_option(Some(raw))
        .ok_or_else(|| RemoteError::Unavailable("API URL must not be empty".to_string()))?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(RemoteError::Unavailable(
            "API URL must include http:// or https://".to_string(),
        ))
    }
}
