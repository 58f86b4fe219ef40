use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use super::{ApiError, ApiFuture, PaperApi, read_envelope};
use crate::query::PaperQuery;
use crate::{Config, CustomTag, Paper, PaperId, PaperPage, StatusKind, TagRef};

/// HTTP client for the paper server.
pub struct RemoteClient {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.api_base_url.clone(), config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, ApiError> {
        let resp = self.client.get(self.url(path)).query(query).send().await?;
        let (data, _) = read_envelope(resp).await?;
        Ok(data)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), ApiError> {
        let resp = self.client.post(self.url(path)).json(&body).send().await?;
        read_envelope::<serde_json::Value>(resp).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct FullText {
    #[serde(default)]
    fulltext: Option<String>,
}

impl PaperApi for RemoteClient {
    fn fetch_papers<'a>(&'a self, query: &'a PaperQuery) -> ApiFuture<'a, PaperPage> {
        Box::pin(async move {
            let resp = self
                .client
                .get(self.url("/papers"))
                .query(&query.query_pairs())
                .send()
                .await?;
            let (papers, pagination) = read_envelope::<Vec<Paper>>(resp).await?;
            let papers = papers.unwrap_or_default();
            tracing::debug!(count = papers.len(), "fetched papers");
            Ok(PaperPage { papers, pagination })
        })
    }

    fn set_status<'a>(
        &'a self,
        kind: StatusKind,
        paper_id: &'a PaperId,
        value: bool,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let (path, body) = match kind {
                StatusKind::Read => (
                    "/status/read",
                    json!({ "paper_id": paper_id, "is_read": value }),
                ),
                StatusKind::Favorite => (
                    "/status/favorite",
                    json!({ "paper_id": paper_id, "is_favorite": value }),
                ),
            };
            self.post(path, body).await
        })
    }

    fn fetch_status_set(&self, kind: StatusKind) -> ApiFuture<'_, Vec<PaperId>> {
        Box::pin(async move {
            let path = match kind {
                StatusKind::Read => "/user/read_papers",
                StatusKind::Favorite => "/user/favorite_papers",
            };
            Ok(self.get(path, &[]).await?.unwrap_or_default())
        })
    }

    fn fetch_taxonomy(&self) -> ApiFuture<'_, Vec<CustomTag>> {
        Box::pin(async move { Ok(self.get("/tags", &[]).await?.unwrap_or_default()) })
    }

    fn fetch_paper_tags<'a>(&'a self, paper_id: &'a PaperId) -> ApiFuture<'a, Vec<TagRef>> {
        Box::pin(async move {
            let query = [("paper_id", paper_id.to_string())];
            Ok(self.get("/tags/load", &query).await?.unwrap_or_default())
        })
    }

    fn assign_tag<'a>(&'a self, paper_id: &'a PaperId, tag_id: i64) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.post("/tags/save", json!({ "tag_id": tag_id, "paper_id": paper_id }))
                .await
        })
    }

    fn remove_tag<'a>(&'a self, paper_id: &'a PaperId, tag_id: i64) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.post("/tags/delete", json!({ "tag_id": tag_id, "paper_id": paper_id }))
                .await
        })
    }

    fn fetch_categories(&self) -> ApiFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.get("/categories", &[]).await?.unwrap_or_default()) })
    }

    fn fetch_fulltext<'a>(&'a self, paper_id: &'a PaperId) -> ApiFuture<'a, String> {
        Box::pin(async move {
            let query = [("paper_id", paper_id.to_string())];
            let text: Option<FullText> = self.get("/chinese_fulltext", &query).await?;
            Ok(text.and_then(|t| t.fulltext).unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = RemoteClient::new("http://localhost:8889/api/", Duration::from_secs(1));
        assert_eq!(client.base_url(), "http://localhost:8889/api");
        assert_eq!(client.url("/tags"), "http://localhost:8889/api/tags");
    }

    #[test]
    fn from_config_uses_base_url() {
        let config = Config {
            api_base_url: "http://example.test/api".into(),
            ..Config::default()
        };
        assert_eq!(RemoteClient::from_config(&config).base_url(), "http://example.test/api");
    }
}
