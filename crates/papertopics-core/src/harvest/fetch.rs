use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use scraper::{ElementRef, Html};
use thiserror::Error;

use super::schema::{parse_selector, ExtractionSchema, FieldKind};
use crate::config::HarvestConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Request to {url} failed with status {status}")]
    Status { url: String, status: u16 },
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
    #[error("Invalid extraction schema: {0}")]
    InvalidSchema(String),
    #[error("Invalid URL template: {0}")]
    InvalidTemplate(String),
}

pub type FetchResult<T> = Result<T, FetchError>;

/// Field name to extracted text, one per matched base element.
pub type ExtractedItem = BTreeMap<String, String>;

/// Fetches one page and extracts structured items from it.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, schema: &ExtractionSchema) -> FetchResult<Vec<ExtractedItem>>;
}

/// Plain HTTP GET plus CSS-selector extraction.
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    pub fn new(config: &HarvestConfig) -> FetchResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client })
    }

    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str, schema: &ExtractionSchema) -> FetchResult<Vec<ExtractedItem>> {
        tracing::debug!(url, schema = %schema.name, "Fetching page");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        extract_items(&body, schema)
    }
}

/// Applies `schema` to an HTML document. Fields whose selector matches
/// nothing inside a base element are left out of that item.
pub fn extract_items(html: &str, schema: &ExtractionSchema) -> FetchResult<Vec<ExtractedItem>> {
    let base = parse_selector(&schema.base_selector)?;
    let fields = schema
        .fields
        .iter()
        .map(|f| parse_selector(&f.selector).map(|s| (f, s)))
        .collect::<FetchResult<Vec<_>>>()?;

    let document = Html::parse_document(html);

    let items = document
        .select(&base)
        .map(|element| {
            let mut item = ExtractedItem::new();
            for (spec, selector) in &fields {
                let Some(found) = element.select(selector).next() else {
                    continue;
                };
                let value = match spec.kind {
                    FieldKind::Text => element_text(found),
                    FieldKind::Html => found.inner_html(),
                    FieldKind::Attribute => {
                        let Some(value) = spec
                            .attribute
                            .as_deref()
                            .and_then(|name| found.value().attr(name))
                        else {
                            continue;
                        };
                        value.to_string()
                    }
                };
                item.insert(spec.name.clone(), value);
            }
            item
        })
        .collect();

    Ok(items)
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
