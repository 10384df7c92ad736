//! Feed client (pull-based consumer → notilog server).
//!
//! The feed needs no authentication. Consumers that missed push delivery
//! call [`FeedClient::catch_up`] with the last notification id they
//! processed and receive everything after it, in order.

use reqwest::{Client, StatusCode};
use url::Url;

use super::{ClientError, parse_response};
use crate::objects::{NotificationLogRepresentation, NotificationRepresentation};

/// Typed HTTP client for the notification feed.
#[derive(Debug, Clone)]
pub struct FeedClient {
    http: Client,
    base_url: Url,
}

impl FeedClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `GET /api/v1/notifications` – the current page, `None` if the store
    /// is empty.
    pub async fn current(&self) -> Result<Option<NotificationLogRepresentation>, ClientError> {
        self.fetch("/api/v1/notifications").await
    }

    /// `GET /api/v1/notifications/{log_id}` – a specific page, `None` if it
    /// does not exist.
    pub async fn log(
        &self,
        log_id: &str,
    ) -> Result<Option<NotificationLogRepresentation>, ClientError> {
        self.fetch(&format!("/api/v1/notifications/{log_id}")).await
    }

    /// Follow a `self_link`, `previous_link` or `next_link`.
    pub async fn follow(
        &self,
        link: &str,
    ) -> Result<Option<NotificationLogRepresentation>, ClientError> {
        self.fetch(link).await
    }

    /// Every notification with an id greater than `after`, ascending.
    ///
    /// Walks backwards from the current page until it reaches the page that
    /// holds `after + 1`, then returns the collected entries in feed order.
    /// Fails with [`ClientError::MissingPage`] if a `previous_link` on the
    /// way is gone, e.g. after the server's page size changed.
    pub async fn catch_up(
        &self,
        after: u64,
    ) -> Result<Vec<NotificationRepresentation>, ClientError> {
        let Some(mut page) = self.current().await? else {
            return Ok(Vec::new());
        };

        let mut pages = Vec::new();
        loop {
            let previous = match &page.previous_link {
                Some(link) if !page.reaches_back_to(after + 1) => Some(link.clone()),
                _ => None,
            };
            pages.push(page);
            let Some(link) = previous else { break };
            // A vanished page would silently drop everything behind it.
            page = self
                .follow(&link)
                .await?
                .ok_or(ClientError::MissingPage { link })?;
        }

        Ok(pages
            .iter()
            .rev()
            .flat_map(|p| p.notifications_after(after).cloned())
            .collect())
    }

    async fn fetch(
        &self,
        path: &str,
    ) -> Result<Option<NotificationLogRepresentation>, ClientError> {
        let url = self.base_url.join(path)?;
        let resp = self.http.get(url).send().await?;
        match resp.status() {
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(None),
            _ => parse_response(resp).await.map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::Path, http::StatusCode as AxumStatus, routing::get};

    fn page(low: u64, high: u64, previous: Option<&str>) -> NotificationLogRepresentation {
        NotificationLogRepresentation {
            id: format!("{low}-{high}"),
            self_link: format!("/api/v1/notifications/{low}-{high}"),
            previous_link: previous.map(str::to_string),
            next_link: None,
            archived: false,
            notifications: (low..=high)
                .map(|id| NotificationRepresentation {
                    id,
                    type_name: "TenantProvisioned".into(),
                    occurred_on: time::OffsetDateTime::UNIX_EPOCH,
                    body: serde_json::json!({ "tenant": id }),
                })
                .collect(),
        }
    }

    /// Serves `current` as 5-6, and 3-4 / 1-2 behind it unless `drop_first`.
    async fn feed_server(drop_first: bool) -> FeedClient {
        let app = Router::new()
            .route(
                "/api/v1/notifications",
                get(|| async { Json(page(5, 6, Some("/api/v1/notifications/3-4"))) }),
            )
            .route(
                "/api/v1/notifications/{log_id}",
                get(move |Path(log_id): Path<String>| async move {
                    match log_id.as_str() {
                        "3-4" => Ok(Json(page(3, 4, Some("/api/v1/notifications/1-2")))),
                        "1-2" if !drop_first => Ok(Json(page(1, 2, None))),
                        _ => Err(AxumStatus::NOT_FOUND),
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        FeedClient::new(Url::parse(&format!("http://{addr}")).unwrap())
    }

    #[tokio::test]
    async fn test_catch_up_walks_back_to_cursor() {
        let client = feed_server(false).await;

        let ids: Vec<u64> = client.catch_up(1).await.unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 3, 4, 5, 6]);

        let ids: Vec<u64> = client.catch_up(4).await.unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![5, 6]);
    }

    #[tokio::test]
    async fn test_catch_up_fails_on_missing_page() {
        let client = feed_server(true).await;

        let err = client.catch_up(0).await.unwrap_err();
        assert!(
            matches!(err, ClientError::MissingPage { ref link } if link == "/api/v1/notifications/1-2"),
            "unexpected error {err:?}"
        );
        // Nothing behind the gap is needed here, so the walk stops early.
        assert_eq!(client.catch_up(3).await.unwrap().len(), 3);
    }
}
