//! Service API client (event producer → notilog server).
//!
//! Requests use body-signed HMAC-SHA256 authentication via
//! [`SignedObject`].

use reqwest::Client;
use url::Url;

use super::{ClientError, parse_response};
use crate::objects::{AppendEventRequest, AppendEventResponse};
use crate::signature::{SIGNATURE_HEADER, SignedObject};

/// Typed HTTP client for event ingestion.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: Client,
    base_url: Url,
    secret: Vec<u8>,
}

impl ServiceClient {
    /// * `base_url` – root URL of the notilog server.
    /// * `producer_secret` – the shared HMAC secret for body signing.
    pub fn new(base_url: Url, producer_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            secret: producer_secret.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/v1/events` – append an event to the store.
    pub async fn append_event(
        &self,
        request: AppendEventRequest,
    ) -> Result<AppendEventResponse, ClientError> {
        let signed = SignedObject::new(request, &self.secret).map_err(ClientError::Json)?;

        let url = self.base_url.join("/api/v1/events")?;

        let resp = self
            .http
            .post(url)
            .header(SIGNATURE_HEADER, signed.to_header())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(signed.json)
            .send()
            .await?;

        parse_response(resp).await
    }
}
