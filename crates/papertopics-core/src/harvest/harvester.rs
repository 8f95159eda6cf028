use std::sync::LazyLock;

use regex::Regex;
use url::form_urlencoded;

use super::fetch::{ExtractedItem, FetchError, FetchResult, PageFetcher};
use super::schema::ExtractionSchema;
use crate::config::HarvestConfig;
use crate::record::Record;

static PAGE_OF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Page \d+ of (\d+)").expect("pagination pattern"));

/// Walks a numbered result set from page 1 to the last page, one request at a
/// time, accumulating records in page order.
pub struct Harvester {
    fetcher: Box<dyn PageFetcher>,
    info_url_template: String,
    page_url_template: String,
    pagination_schema: ExtractionSchema,
    record_schema: ExtractionSchema,
    max_pages: Option<u32>,
}

impl Harvester {
    #[must_use]
    pub fn new(fetcher: Box<dyn PageFetcher>, config: &HarvestConfig) -> Self {
        Self {
            fetcher,
            info_url_template: config.info_url_template.clone(),
            page_url_template: config.page_url_template.clone(),
            pagination_schema: config.pagination_schema.clone(),
            record_schema: config.record_schema.clone(),
            max_pages: None,
        }
    }

    /// Caps the number of pages fetched regardless of what the site reports.
    #[must_use]
    pub const fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn info_url(&self, query: &str) -> FetchResult<String> {
        render_template(&self.info_url_template, query, None)
    }

    pub fn page_url(&self, query: &str, page: u32) -> FetchResult<String> {
        render_template(&self.page_url_template, query, Some(page))
    }

    /// Reads the total page count from the pagination banner. Any failure
    /// along the way falls back to a single page.
    pub async fn page_count(&self, query: &str) -> u32 {
        let url = match self.info_url(query) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot build pagination URL; assuming one page");
                return 1;
            }
        };

        let items = match self.fetcher.fetch(&url, &self.pagination_schema).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Pagination lookup failed; assuming one page");
                return 1;
            }
        };

        let Some(banner) = items.first().and_then(|item| item.get("pagination")) else {
            tracing::warn!(url = %url, "No pagination banner found; assuming one page");
            return 1;
        };

        parse_total_pages(banner).unwrap_or_else(|| {
            tracing::warn!(
                url = %url,
                banner = %banner,
                "Unparseable pagination banner; assuming one page"
            );
            1
        })
    }

    pub async fn harvest(&self, query: &str) -> FetchResult<Vec<Record>> {
        let reported = self.page_count(query).await;
        let pages = self.max_pages.map_or(reported, |cap| reported.min(cap));
        tracing::info!(query, reported, pages, "Harvesting result pages");

        let mut records = Vec::new();
        for page in 1..=pages {
            let url = self.page_url(query, page)?;
            let items = self.fetcher.fetch(&url, &self.record_schema).await?;
            tracing::debug!(page, items = items.len(), "Page harvested");
            records.extend(items.iter().map(item_to_record));
        }

        tracing::info!(records = records.len(), "Harvest complete");
        Ok(records)
    }
}

fn item_to_record(item: &ExtractedItem) -> Record {
    Record {
        title: item.get("title").cloned().unwrap_or_default(),
        description: item.get("description").cloned().unwrap_or_default(),
    }
}

/// Extracts `Y` from a "Page X of Y" banner.
pub fn parse_total_pages(text: &str) -> Option<u32> {
    PAGE_OF
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Substitutes `{query}` (form-encoded) and, when given, `{page}`.
pub fn render_template(template: &str, query: &str, page: Option<u32>) -> FetchResult<String> {
    if !template.contains("{query}") {
        return Err(FetchError::InvalidTemplate(format!(
            "'{template}' has no {{query}} placeholder"
        )));
    }

    let encoded: String = form_urlencoded::byte_serialize(query.as_bytes()).collect();
    let mut url = template.replace("{query}", &encoded);

    if let Some(page) = page {
        if !url.contains("{page}") {
            return Err(FetchError::InvalidTemplate(format!(
                "'{template}' has no {{page}} placeholder"
            )));
        }
        url = url.replace("{page}", &page.to_string());
    }

    Ok(url)
}
