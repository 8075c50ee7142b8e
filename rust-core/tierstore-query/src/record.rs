// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Records: an identifier plus a case-insensitive map of field values.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::FieldValue;

/// Reserved field name under which a record's identifier is visible to
/// conditions and ordering.
pub const ID_FIELD: &str = "_oid";

/// Normalise a field name for storage and lookup.
pub fn normalize_field(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// A structured record held by an object table.
///
/// Field names are stored lowercased, so `Num`, `NUM` and `num` address the
/// same field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    /// Unique, immutable identifier.
    pub id: String,
    /// Field values keyed by normalised field name.
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    /// An empty record with the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field, returning the previous value.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.fields.insert(normalize_field(name), value.into())
    }

    /// Remove a field, returning its value.
    pub fn unset(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(&normalize_field(name))
    }

    /// Look up a field. The reserved [`ID_FIELD`] yields the identifier.
    pub fn field(&self, name: &str) -> Option<Cow<'_, FieldValue>> {
        let key = normalize_field(name);
        if key == ID_FIELD {
            return Some(Cow::Owned(FieldValue::String(self.id.clone())));
        }
        self.fields.get(&key).map(Cow::Borrowed)
    }

    /// Whether the record carries no field values.
    pub fn is_blank(&self) -> bool {
        self.fields.is_empty()
    }

    /// Merge `other`'s fields into this record, overwriting on conflict.
    pub fn merge(&mut self, other: &Record) {
        for (name, value) in &other.fields {
            self.fields.insert(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_are_case_insensitive() {
        let record = Record::new("r1").with("Num", 3).with("STR_VAL", "hello");
        assert_eq!(record.field("num").as_deref(), Some(&FieldValue::Integer(3)));
        assert_eq!(
            record.field("Str_Val").as_deref(),
            Some(&FieldValue::from("hello"))
        );
        assert!(record.field("missing").is_none());
    }

    #[test]
    fn test_id_field_is_reserved() {
        let record = Record::new("abc");
        assert_eq!(record.field("_OID").as_deref(), Some(&FieldValue::from("abc")));
        assert!(record.is_blank());
    }

    #[test]
    fn test_merge_overwrites() {
        let mut a = Record::new("r").with("x", 1).with("y", 2);
        let b = Record::new("r").with("y", 20).with("z", 30);
        a.merge(&b);
        assert_eq!(a.fields.len(), 3);
        assert_eq!(a.field("y").as_deref(), Some(&FieldValue::Integer(20)));
        assert_eq!(a.unset("x"), Some(FieldValue::Integer(1)));
    }

    #[test]
    fn test_bracketed_field_names() {
        let record = Record::new("r").with("num[0].val", 7);
        assert_eq!(
            record.field("NUM[0].VAL").as_deref(),
            Some(&FieldValue::Integer(7))
        );
    }
}
