//! Declarative extraction schemas
//!
//! A [`Schema`] names a base selector, whose matches each anchor one output
//! record, and an ordered list of [`FieldSpec`]s evaluated against every
//! match. Schemas are checked once when they are built or loaded; the
//! extractor never has to re-validate them.
//!
//! The JSON form is the one used by the crawler's schema files:
//!
//! ```json
//! {
//!   "name": "Restaurant Listings",
//!   "baseSelector": ".XIWnB.z.y",
//!   "fields": [
//!     { "name": "restaurant_name", "selector": "div.fiohW", "type": "text" },
//!     { "name": "restaurant_url", "selector": "a.BMQDV", "type": "attribute", "attribute": "href" }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use scraper::Selector;
use serde::Deserialize;
use tracing::warn;

use crate::error::SchemaError;

/// A selector string together with its parsed form.
///
/// Selector syntax is not validated: a string that does not parse simply
/// matches nothing.
#[derive(Debug, Clone)]
pub struct CompiledSelector {
    source: String,
    parsed: Option<Selector>,
}

impl CompiledSelector {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let parsed = match Selector::parse(&source) {
            Ok(selector) => Some(selector),
            Err(e) => {
                warn!("Selector `{}` does not parse and will match nothing: {:?}", source, e);
                None
            }
        };
        Self { source, parsed }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The parsed selector, or `None` when the source did not parse.
    pub fn selector(&self) -> Option<&Selector> {
        self.parsed.as_ref()
    }
}

/// How a field turns its matched element(s) into a value.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Trimmed text of the first match.
    Text,
    /// Raw value of the named attribute on the first match.
    Attribute(String),
    /// Inner HTML of the first match.
    Html,
    /// One entry per match: its trimmed text, or the value of the single
    /// scalar subfield evaluated against it.
    List(Option<Box<FieldSpec>>),
    /// One nested record per match.
    NestedList(Vec<FieldSpec>),
    /// One nested record from the first match.
    Nested(Vec<FieldSpec>),
}

impl FieldKind {
    fn is_scalar(&self) -> bool {
        matches!(self, Self::Text | Self::Attribute(_) | Self::Html)
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub selector: CompiledSelector,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn text(name: impl Into<String>, selector: &str) -> Self {
        Self::with_kind(name, selector, FieldKind::Text)
    }

    pub fn attribute(name: impl Into<String>, selector: &str, attribute: impl Into<String>) -> Self {
        Self::with_kind(name, selector, FieldKind::Attribute(attribute.into()))
    }

    pub fn html(name: impl Into<String>, selector: &str) -> Self {
        Self::with_kind(name, selector, FieldKind::Html)
    }

    pub fn list(name: impl Into<String>, selector: &str) -> Self {
        Self::with_kind(name, selector, FieldKind::List(None))
    }

    pub fn list_of(name: impl Into<String>, selector: &str, item: FieldSpec) -> Self {
        Self::with_kind(name, selector, FieldKind::List(Some(Box::new(item))))
    }

    pub fn nested_list(name: impl Into<String>, selector: &str, subfields: Vec<FieldSpec>) -> Self {
        Self::with_kind(name, selector, FieldKind::NestedList(subfields))
    }

    pub fn nested(name: impl Into<String>, selector: &str, subfields: Vec<FieldSpec>) -> Self {
        Self::with_kind(name, selector, FieldKind::Nested(subfields))
    }

    fn with_kind(name: impl Into<String>, selector: &str, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            selector: CompiledSelector::new(selector),
            kind,
        }
    }
}

/// A validated extraction schema.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    base_selector: CompiledSelector,
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(
        name: impl Into<String>,
        base_selector: &str,
        fields: Vec<FieldSpec>,
    ) -> Result<Self, SchemaError> {
        validate_fields(&fields, "")?;
        Ok(Self {
            name: name.into(),
            base_selector: CompiledSelector::new(base_selector),
            fields,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let raw: RawSchema = serde_json::from_str(json)?;
        let fields = raw
            .fields
            .into_iter()
            .map(|f| f.into_spec(""))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(raw.name, &raw.base_selector, fields)
    }

    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let json = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_selector(&self) -> &CompiledSelector {
        &self.base_selector
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn validate_fields(fields: &[FieldSpec], parent: &str) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();

    for field in fields {
        let path = join_path(parent, &field.name);

        if field.name.trim().is_empty() {
            return Err(SchemaError::EmptyName { path });
        }
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateField {
                path: parent.to_string(),
                name: field.name.clone(),
            });
        }

        match &field.kind {
            FieldKind::Attribute(attr) if attr.trim().is_empty() => {
                return Err(SchemaError::MissingAttribute { path });
            }
            FieldKind::List(Some(item)) => {
                if !item.kind.is_scalar() {
                    return Err(SchemaError::NonScalarListSubfield { path });
                }
                validate_fields(std::slice::from_ref(item.as_ref()), &path)?;
            }
            FieldKind::NestedList(subfields) | FieldKind::Nested(subfields) => {
                if subfields.is_empty() {
                    return Err(SchemaError::MissingSubfields { path });
                }
                validate_fields(subfields, &path)?;
            }
            _ => {}
        }
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSchema {
    #[serde(default)]
    name: String,
    base_selector: String,
    #[serde(default)]
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum RawKind {
    Text,
    Attribute,
    Html,
    List,
    NestedList,
    Nested,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: String,
    selector: String,
    #[serde(rename = "type")]
    kind: RawKind,
    #[serde(default)]
    attribute: Option<String>,
    #[serde(default, alias = "subfields")]
    fields: Option<Vec<RawField>>,
}

impl RawField {
    fn into_spec(self, parent: &str) -> Result<FieldSpec, SchemaError> {
        let path = join_path(parent, &self.name);

        if self.attribute.is_some() && self.kind != RawKind::Attribute {
            return Err(SchemaError::UnexpectedAttribute { path });
        }

        let subfields = match self.fields {
            Some(fields) => {
                if !matches!(self.kind, RawKind::List | RawKind::NestedList | RawKind::Nested) {
                    return Err(SchemaError::UnexpectedSubfields { path });
                }
                fields
                    .into_iter()
                    .map(|f| f.into_spec(&path))
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => Vec::new(),
        };

        let kind = match self.kind {
            RawKind::Text => FieldKind::Text,
            RawKind::Html => FieldKind::Html,
            RawKind::Attribute => match self.attribute {
                Some(attr) => FieldKind::Attribute(attr),
                None => return Err(SchemaError::MissingAttribute { path }),
            },
            RawKind::List => {
                let count = subfields.len();
                let mut subfields = subfields.into_iter();
                match (subfields.next(), count) {
                    (None, _) => FieldKind::List(None),
                    (Some(item), 1) => FieldKind::List(Some(Box::new(item))),
                    (Some(_), count) => {
                        return Err(SchemaError::TooManyListSubfields { path, count });
                    }
                }
            }
            RawKind::NestedList => FieldKind::NestedList(subfields),
            RawKind::Nested => FieldKind::Nested(subfields),
        };

        Ok(FieldSpec {
            name: self.name,
            selector: CompiledSelector::new(self.selector),
            kind,
        })
    }
}
