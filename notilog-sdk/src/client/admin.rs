//! Admin API client.
//!
//! All requests carry the plaintext admin secret in the
//! `Notilog-Admin-Authorization` header.

use reqwest::Client;
use url::Url;

use super::{ClientError, parse_response};
use crate::objects::PublisherStatusResponse;
use crate::signature::ADMIN_AUTH_HEADER;

/// Typed HTTP client for the admin API.
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: Client,
    base_url: Url,
    admin_secret: String,
}

impl AdminClient {
    pub fn new(base_url: Url, admin_secret: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            admin_secret: admin_secret.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `GET /api/v1/admin/publisher` – tracker position and scheduler status.
    pub async fn publisher_status(&self) -> Result<PublisherStatusResponse, ClientError> {
        let url = self.base_url.join("/api/v1/admin/publisher")?;

        let resp = self
            .http
            .get(url)
            .header(ADMIN_AUTH_HEADER, &self.admin_secret)
            .send()
            .await?;

        parse_response(resp).await
    }

    /// `POST /api/v1/admin/publisher/publish` – ask for an immediate cycle.
    pub async fn trigger_publish(&self) -> Result<(), ClientError> {
        let url = self.base_url.join("/api/v1/admin/publisher/publish")?;

        let resp = self
            .http
            .post(url)
            .header(ADMIN_AUTH_HEADER, &self.admin_secret)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        Ok(())
    }
}
