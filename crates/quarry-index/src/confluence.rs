//! Confluence REST content source.

use std::fmt;

use serde::Deserialize;

use crate::source::{ContentSource, DocumentSummary, SourceDocument, SourceError};

type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

const DEFAULT_PAGE_SIZE: u32 = 50;

pub struct ConfluenceSource {
    client: reqwest::Client,
    base_url: String,
    space_key: String,
    username: String,
    api_token: String,
    page_size: u32,
}

impl fmt::Debug for ConfluenceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfluenceSource")
            .field("base_url", &self.base_url)
            .field("space_key", &self.space_key)
            .field("username", &self.username)
            .field("api_token", &"<redacted>")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl ConfluenceSource {
    #[must_use]
    pub fn new(
        mut base_url: String,
        space_key: String,
        username: String,
        api_token: String,
    ) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: quarry_llm::http::default_client(),
            base_url,
            space_key,
            username,
            api_token,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size.max(1);
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.api_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(url.to_owned()));
        }
        if !status.is_success() {
            tracing::error!("confluence API error {status} for {url}");
            return Err(SourceError::Api {
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl ContentSource for ConfluenceSource {
    fn list(&self) -> BoxFuture<'_, Result<Vec<DocumentSummary>, SourceError>> {
        Box::pin(async move {
            let mut listing = Vec::new();
            let mut start = 0u32;

            loop {
                let url = format!(
                    "{}/rest/api/content?spaceKey={}&type=page&limit={}&start={start}&expand=version",
                    self.base_url, self.space_key, self.page_size
                );
                let page: ListPage = self.get_json(&url).await?;
                let fetched = page.results.len();

                for entry in page.results {
                    listing.push(DocumentSummary {
                        id: entry.id,
                        version_token: entry.version.number.to_string(),
                    });
                }

                if fetched < self.page_size as usize {
                    break;
                }
                start += self.page_size;
            }

            tracing::debug!(
                pages = listing.len(),
                space = %self.space_key,
                "confluence listing complete"
            );
            Ok(listing)
        })
    }

    fn fetch(&self, id: &str) -> BoxFuture<'_, Result<SourceDocument, SourceError>> {
        let id = id.to_owned();
        Box::pin(async move {
            let url = format!(
                "{}/rest/api/content/{id}?expand=body.storage,version,metadata.labels,_links.webui",
                self.base_url
            );
            let page: ContentPage = self.get_json(&url).await?;

            let webui = page.links.and_then(|l| l.webui).unwrap_or_default();
            let labels = page
                .metadata
                .and_then(|m| m.labels)
                .map(|l| l.results.into_iter().map(|e| e.name).collect())
                .unwrap_or_default();

            Ok(SourceDocument {
                id: page.id,
                title: page.title,
                body: page.body.and_then(|b| b.storage).map(|s| s.value).unwrap_or_default(),
                version_token: page.version.number.to_string(),
                url: format!("{}{webui}", self.base_url),
                labels,
            })
        })
    }

    fn name(&self) -> &str {
        "confluence"
    }
}

#[derive(Deserialize)]
struct ListPage {
    results: Vec<ListEntry>,
}

#[derive(Deserialize)]
struct ListEntry {
    id: String,
    version: Version,
}

#[derive(Deserialize)]
struct Version {
    number: u64,
}

#[derive(Deserialize)]
struct ContentPage {
    id: String,
    title: String,
    version: Version,
    #[serde(default)]
    body: Option<Body>,
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(rename = "_links", default)]
    links: Option<Links>,
}

#[derive(Deserialize)]
struct Body {
    #[serde(default)]
    storage: Option<Storage>,
}

#[derive(Deserialize)]
struct Storage {
    value: String,
}

#[derive(Deserialize)]
struct Metadata {
    #[serde(default)]
    labels: Option<Labels>,
}

#[derive(Deserialize)]
struct Labels {
    #[serde(default)]
    results: Vec<Label>,
}

#[derive(Deserialize)]
struct Label {
    name: String,
}

#[derive(Deserialize)]
struct Links {
    #[serde(default)]
    webui: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(base_url: &str) -> ConfluenceSource {
        ConfluenceSource::new(
            base_url.into(),
            "ENG".into(),
            "svc-account".into(),
            "token".into(),
        )
    }

    #[test]
    fn debug_redacts_token() {
        let s = source("https://wiki.example.com");
        let debug = format!("{s:?}");
        assert!(!debug.contains("token\""));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn base_url_strips_trailing_slash() {
        let s = source("https://wiki.example.com/");
        assert_eq!(s.base_url, "https://wiki.example.com");
    }

    #[tokio::test]
    async fn list_paginates_until_short_page() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/rest/api/content"))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"id": "1", "version": {"number": 3}},
                    {"id": "2", "version": {"number": 1}}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content"))
            .and(query_param("start", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": "3", "version": {"number": 7}}]
            })))
            .mount(&server)
            .await;

        let s = source(&server.uri()).with_page_size(2);
        let listing = s.list().await.unwrap();
        assert_eq!(listing.len(), 3);
        assert_eq!(listing[0].id, "1");
        assert_eq!(listing[0].version_token, "3");
        assert_eq!(listing[2].id, "3");
    }

    #[tokio::test]
    async fn fetch_decodes_storage_body_and_labels() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/content/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "42",
                "title": "Deploy Runbook",
                "version": {"number": 9},
                "body": {"storage": {"value": "<h1>Deploy</h1><p>steps</p>"}},
                "metadata": {"labels": {"results": [{"name": "outdated"}]}},
                "_links": {"webui": "/spaces/ENG/pages/42"}
            })))
            .mount(&server)
            .await;

        let s = source(&server.uri());
        let doc = s.fetch("42").await.unwrap();
        assert_eq!(doc.title, "Deploy Runbook");
        assert_eq!(doc.version_token, "9");
        assert!(doc.body.contains("<h1>Deploy</h1>"));
        assert_eq!(doc.labels, vec!["outdated".to_owned()]);
        assert!(doc.url.ends_with("/spaces/ENG/pages/42"));
    }

    #[tokio::test]
    async fn fetch_missing_page_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let s = source(&server.uri());
        assert!(matches!(
            s.fetch("99").await,
            Err(SourceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn server_error_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let s = source(&server.uri());
        assert!(matches!(
            s.list().await,
            Err(SourceError::Api { status: 503 })
        ));
    }
}
