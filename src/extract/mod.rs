//! Schema-driven DOM extraction
//!
//! [`extract_all`] locates every base element of a [`Schema`] and builds one
//! [`ExtractedRecord`] per element; [`extract_field`] evaluates a single
//! field against one element. Both are pure functions of their inputs.
//!
//! A selector that matches nothing is data, not an error: scalar fields come
//! out as `null` and list fields as an empty list, and the key is always
//! present in the record.

mod record;

pub use record::{ExtractedRecord, FieldValue};

use scraper::{ElementRef, Html};

use crate::schema::{CompiledSelector, FieldKind, FieldSpec, Schema};

/// Runs `schema` against a parsed document, one record per base element in
/// document order.
pub fn extract_all(document: &Html, schema: &Schema) -> Vec<ExtractedRecord> {
    let Some(base) = schema.base_selector().selector() else {
        return Vec::new();
    };

    document
        .select(base)
        .map(|root| extract_record(root, schema.fields()))
        .collect()
}

/// Parses `html` and runs `schema` against it.
pub fn extract_from_html(html: &str, schema: &Schema) -> Vec<ExtractedRecord> {
    let document = Html::parse_document(html);
    extract_all(&document, schema)
}

/// Builds one record from `node`, preserving the order of `fields`.
pub fn extract_record(node: ElementRef<'_>, fields: &[FieldSpec]) -> ExtractedRecord {
    let mut record = ExtractedRecord::with_capacity(fields.len());
    for field in fields {
        record.insert(field.name.clone(), extract_field(node, field));
    }
    record
}

pub fn extract_field(node: ElementRef<'_>, field: &FieldSpec) -> FieldValue {
    match &field.kind {
        FieldKind::Text => first_match(node, &field.selector).map(element_text).into(),
        FieldKind::Attribute(attr) => first_match(node, &field.selector)
            .and_then(|el| el.value().attr(attr).map(str::to_string))
            .into(),
        FieldKind::Html => first_match(node, &field.selector)
            .map(|el| el.inner_html().trim().to_string())
            .into(),
        FieldKind::List(item) => FieldValue::List(
            all_matches(node, &field.selector)
                .into_iter()
                .filter_map(|el| match item {
                    Some(item) => match extract_field(el, item) {
                        FieldValue::Null => None,
                        value => Some(value),
                    },
                    None => Some(FieldValue::Text(element_text(el))),
                })
                .collect(),
        ),
        FieldKind::NestedList(subfields) => FieldValue::List(
            all_matches(node, &field.selector)
                .into_iter()
                .map(|el| FieldValue::Record(extract_record(el, subfields)))
                .collect(),
        ),
        FieldKind::Nested(subfields) => first_match(node, &field.selector)
            .map_or(FieldValue::Null, |el| FieldValue::Record(extract_record(el, subfields))),
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

// Descendants only; a node never matches its own field selectors.
fn all_matches<'a>(node: ElementRef<'a>, selector: &CompiledSelector) -> Vec<ElementRef<'a>> {
    match selector.selector() {
        Some(sel) => node.select(sel).filter(|el| el.id() != node.id()).collect(),
        None => Vec::new(),
    }
}

fn first_match<'a>(node: ElementRef<'a>, selector: &CompiledSelector) -> Option<ElementRef<'a>> {
    let sel = selector.selector()?;
    node.select(sel).find(|el| el.id() != node.id())
}
