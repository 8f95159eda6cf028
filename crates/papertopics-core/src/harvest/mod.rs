mod fetch;
mod harvester;
mod schema;

pub use fetch::{extract_items, ExtractedItem, FetchError, FetchResult, HttpPageFetcher, PageFetcher};
pub use harvester::{parse_total_pages, render_template, Harvester};
pub use schema::{ExtractionSchema, FieldKind, FieldSpec};
