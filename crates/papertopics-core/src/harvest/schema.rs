use scraper::Selector;
use serde::{Deserialize, Serialize};

use super::fetch::{FetchError, FetchResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Whitespace-collapsed text content
    #[default]
    Text,
    /// Inner HTML of the matched element
    Html,
    /// Value of the attribute named by `FieldSpec::attribute`
    Attribute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub selector: String,
    #[serde(rename = "type", default)]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl FieldSpec {
    #[must_use]
    pub fn text(name: &str, selector: &str) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.to_string(),
            kind: FieldKind::Text,
            attribute: None,
        }
    }
}

/// CSS-selector schema: every element matching `base_selector` becomes one
/// item whose fields are looked up inside that element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSchema {
    pub name: String,
    #[serde(rename = "baseSelector")]
    pub base_selector: String,
    pub fields: Vec<FieldSpec>,
}

impl ExtractionSchema {
    /// The "Page X of Y" banner on SINTA result pages.
    #[must_use]
    pub fn pagination() -> Self {
        Self {
            name: "Pagination Info".into(),
            base_selector: "div.text-center.pagination-text".into(),
            fields: vec![FieldSpec::text("pagination", "small")],
        }
    }

    /// One entry per search result on SINTA result pages.
    #[must_use]
    pub fn records() -> Self {
        Self {
            name: "Sinta Papers".into(),
            base_selector: "div.ar-list-item".into(),
            fields: vec![
                FieldSpec::text("title", "div.ar-title"),
                FieldSpec::text("description", "div.ar-meta"),
            ],
        }
    }

    /// Checks that every selector parses and attribute fields name an attribute.
    pub fn validate(&self) -> FetchResult<()> {
        parse_selector(&self.base_selector)?;
        for field in &self.fields {
            parse_selector(&field.selector)?;
            if field.kind == FieldKind::Attribute && field.attribute.is_none() {
                return Err(FetchError::InvalidSchema(format!(
                    "field '{}' in schema '{}' has type attribute but no attribute name",
                    field.name, self.name
                )));
            }
        }
        Ok(())
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }
}

pub(crate) fn parse_selector(selector: &str) -> FetchResult<Selector> {
    Selector::parse(selector)
        .map_err(|e| FetchError::InvalidSelector(format!("{selector}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schemas_validate() {
        assert!(ExtractionSchema::pagination().validate().is_ok());
        assert!(ExtractionSchema::records().validate().is_ok());
        assert!(ExtractionSchema::records().has_field("title"));
        assert!(ExtractionSchema::records().has_field("description"));
    }

    #[test]
    fn test_invalid_selector() {
        let mut schema = ExtractionSchema::records();
        schema.base_selector = "div[".into();
        assert!(matches!(schema.validate(), Err(FetchError::InvalidSelector(_))));
    }

    #[test]
    fn test_attribute_field_requires_name() {
        let mut schema = ExtractionSchema::records();
        schema.fields.push(FieldSpec {
            name: "link".into(),
            selector: "a".into(),
            kind: FieldKind::Attribute,
            attribute: None,
        });
        assert!(matches!(schema.validate(), Err(FetchError::InvalidSchema(_))));
    }

    #[test]
    fn test_schema_json_shape() {
        let raw = r#"{
            "name": "Sinta Papers",
            "baseSelector": "div.ar-list-item",
            "fields": [
                {"name": "title", "selector": "div.ar-title", "type": "text"},
                {"name": "link", "selector": "a", "type": "attribute", "attribute": "href"}
            ]
        }"#;
        let schema: ExtractionSchema = serde_json::from_str(raw).unwrap();

        assert_eq!(schema.base_selector, "div.ar-list-item");
        assert_eq!(schema.fields[0].kind, FieldKind::Text);
        assert_eq!(schema.fields[1].attribute.as_deref(), Some("href"));
        assert!(schema.validate().is_ok());
    }
}
