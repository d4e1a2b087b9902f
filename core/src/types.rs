//! Record model shared by the encoder and the decoder.
//!
//! # Design
//! A field value is either scalar text or an attachment group (a related
//! module's rows embedded in the parent field). The distinction is an explicit
//! enum variant rather than something inferred from the value at encode time.
//!
//! `Record` preserves insertion order so the generated XML is reproducible.
//! It (de)serializes as a plain JSON object, keeping key order, which lets
//! hosts and test fixtures describe records as ordinary JSON.

use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::CrmError;

/// Value of a single record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Attachment(AttachmentGroup),
}

impl FieldValue {
    /// The scalar text, or `None` for an attachment group.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Attachment(_) => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<AttachmentGroup> for FieldValue {
    fn from(value: AttachmentGroup) -> Self {
        FieldValue::Attachment(value)
    }
}

macro_rules! text_from_display {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::Text(value.to_string())
                }
            }
        )*
    };
}

text_from_display!(bool, i32, i64, u32, u64, f64);

/// Rows of related modules embedded in one parent field, e.g. contact roles
/// attached to a potential. Module order and row order are preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachmentGroup {
    modules: Vec<(String, Vec<Record>)>,
}

impl AttachmentGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`AttachmentGroup::push`].
    pub fn with_module(mut self, module: impl Into<String>, rows: Vec<Record>) -> Self {
        self.push(module, rows);
        self
    }

    pub fn push(&mut self, module: impl Into<String>, rows: Vec<Record>) {
        self.modules.push((module.into(), rows));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Record])> {
        self.modules.iter().map(|(module, rows)| (module.as_str(), rows.as_slice()))
    }

    /// Number of nested rows across every module in the group.
    pub fn row_count(&self) -> usize {
        self.modules.iter().map(|(_, rows)| rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// One entity instance: an ordered mapping of field name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Record::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets `key`, keeping its original position if it already exists.
    /// Returns the replaced value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(existing, _)| existing == key).map(|(_, value)| value)
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_text)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

/// Convert a dynamic JSON array of objects into records.
///
/// Fails with `TypeMismatch` when `value` is not an array or when any entry
/// is not a JSON object.
pub fn records_from_json(value: &serde_json::Value) -> Result<Vec<Record>, CrmError> {
    let entries = value.as_array().ok_or_else(|| {
        CrmError::TypeMismatch(format!("records must be a list, got {}", json_kind(value)))
    })?;
    entries
        .iter()
        .map(|entry| {
            if !entry.is_object() {
                return Err(CrmError::TypeMismatch(format!(
                    "records must be mappings inside a list, got {}",
                    json_kind(entry)
                )));
            }
            Record::deserialize(entry).map_err(|e| CrmError::TypeMismatch(e.to_string()))
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "mapping",
    }
}

// ---------------------------------------------------------------------------
// serde
// ---------------------------------------------------------------------------

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Text(text) => serializer.serialize_str(text),
            FieldValue::Attachment(group) => group.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(FieldValueVisitor)
    }
}

struct FieldValueVisitor;

impl<'de> Visitor<'de> for FieldValueVisitor {
    type Value = FieldValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar field value or an attachment mapping")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(FieldValue::from(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(FieldValue::from(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(FieldValue::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(FieldValue::from(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(FieldValue::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(FieldValue::from(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(FieldValue::from(""))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        AttachmentGroupVisitor.visit_map(map).map(FieldValue::Attachment)
    }
}

impl Serialize for AttachmentGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.modules.len()))?;
        for (module, rows) in &self.modules {
            map.serialize_entry(module, rows)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AttachmentGroup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(AttachmentGroupVisitor)
    }
}

struct AttachmentGroupVisitor;

impl<'de> Visitor<'de> for AttachmentGroupVisitor {
    type Value = AttachmentGroup;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping of module name to a list of records")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut group = AttachmentGroup::new();
        while let Some((module, rows)) = map.next_entry::<String, Vec<Record>>()? {
            group.push(module, rows);
        }
        Ok(group)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping of field name to value")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut record = Record::new();
        while let Some((key, value)) = map.next_entry::<String, FieldValue>()? {
            record.insert(key, value);
        }
        Ok(record)
    }
}
