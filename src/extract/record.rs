//! Values produced by the extractor

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The value of one extracted field.
///
/// Serializes to plain JSON: `null`, a string, an array, or an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Text(String),
    List(Vec<FieldValue>),
    Record(ExtractedRecord),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&ExtractedRecord> {
        match self {
            Self::Record(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Null, Self::Text)
    }
}

/// One record: field names mapped to values, in schema order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedRecord {
    entries: Vec<(String, FieldValue)>,
}

impl ExtractedRecord {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Sets `name`, keeping its original position when it already exists.
    pub(crate) fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Text of `name`, or `None` when the field is absent, null or not text.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, FieldValue)> for ExtractedRecord {
    fn from_iter<I: IntoIterator<Item = (K, FieldValue)>>(iter: I) -> Self {
        let mut record = Self::default();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for ExtractedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ExtractedRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = ExtractedRecord;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object of extracted fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut record = ExtractedRecord::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((k, v)) = access.next_entry::<String, FieldValue>()? {
                    record.insert(k, v);
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_in_insertion_order() {
        let record: ExtractedRecord = [
            ("zeta", FieldValue::Text("z".into())),
            ("alpha", FieldValue::Null),
            ("tags", FieldValue::List(vec![FieldValue::Text("a".into())])),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"zeta":"z","alpha":null,"tags":["a"]}"#);
    }

    #[test]
    fn json_round_trip_preserves_nested_values() {
        let inner: ExtractedRecord = [("day", FieldValue::Text("Mon".into())), ("times", FieldValue::Null)]
            .into_iter()
            .collect();
        let record: ExtractedRecord = [
            ("name", FieldValue::Text("Pedro Lemos".into())),
            ("schedule", FieldValue::List(vec![FieldValue::Record(inner)])),
            ("tags", FieldValue::List(Vec::new())),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&vec![record.clone()]).unwrap();
        let back: Vec<ExtractedRecord> = serde_json::from_str(&json).unwrap();

        assert_eq!(back, vec![record]);
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut record = ExtractedRecord::default();
        record.insert("a", FieldValue::Null);
        record.insert("b", FieldValue::Null);
        record.insert("a", FieldValue::Text("x".into()));

        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(record.text("a"), Some("x"));
    }
}
