use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::app::error::NetworkError;
use crate::app::Result;
use crate::config::{FetcherConfig, SourcesConfig};
use crate::fetcher::{Fetcher, Resource};

/// reqwest-backed transport for both upstream APIs.
pub struct HttpFetcher {
    client: Client,
    item_base: Url,
    search_base: Url,
}

impl HttpFetcher {
    pub fn new(sources: &SourcesConfig, fetcher: &FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(fetcher.timeout())
            .gzip(true)
            .brotli(true)
            .user_agent(fetcher.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            item_base: base_url(&sources.item_base_url)?,
            search_base: base_url(&sources.search_base_url)?,
        })
    }

    pub fn url_for(&self, resource: &Resource) -> std::result::Result<Url, NetworkError> {
        let joined = match resource {
            Resource::TopStories => self.item_base.join("topstories.json"),
            Resource::Item(id) => self.item_base.join(&format!("item/{}.json", id)),
            Resource::FrontPage { hits } => self
                .search_base
                .join(&format!("search?tags=front_page&hitsPerPage={}", hits)),
        };
        joined.map_err(|e| NetworkError::InvalidUrl {
            resource: resource.to_string(),
            message: e.to_string(),
        })
    }
}

/// `Url::join` drops the last path segment unless the base ends in `/`.
fn base_url(raw: &str) -> Result<Url> {
    if raw.ends_with('/') {
        Ok(Url::parse(raw)?)
    } else {
        Ok(Url::parse(&format!("{}/", raw))?)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, resource: &Resource) -> std::result::Result<Value, NetworkError> {
        let url = self.url_for(resource)?;
        tracing::debug!("GET {}", url);

        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                NetworkError::Timeout {
                    resource: resource.to_string(),
                }
            } else {
                NetworkError::Transport {
                    resource: resource.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let response = self.client.get(url).send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(NetworkError::Status {
                resource: resource.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;

        serde_json::from_slice(&body).map_err(|e| NetworkError::Body {
            resource: resource.to_string(),
            message: e.to_string(),
        })
    }
}
