// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Table names and field declarations.
//!
//! A [`Schema`] is built once, before a table is opened, and is read-only
//! afterwards. Every write is checked against it before any backend is
//! touched.

use std::collections::BTreeMap;

use tierstore_query::{normalize_field, FieldType, FieldValue, ID_FIELD};

use crate::error::StackError;

/// Check a table (or map) name. Names must be non-empty, must not start with
/// a digit and may only contain letters, digits, `_` and `-`.
pub fn validate_table_name(name: &str) -> Result<(), StackError> {
    let invalid = |reason: &str| StackError::InvalidTableName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let first = name.chars().next().ok_or_else(|| invalid("must not be empty"))?;
    if first.is_ascii_digit() {
        return Err(invalid("must not start with a digit"));
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
        return Err(invalid("may only contain letters, digits, '_' and '-'"));
    }
    Ok(())
}

/// The declared fields of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    table: String,
    fields: BTreeMap<String, FieldType>,
}

impl Schema {
    /// An empty schema for `table`. Fails fast on an invalid name.
    pub fn new(table: &str) -> Result<Self, StackError> {
        validate_table_name(table)?;
        Ok(Self {
            table: table.to_string(),
            fields: BTreeMap::new(),
        })
    }

    /// Declare a field. Re-declaring with the same type is a no-op.
    pub fn declare(&mut self, name: &str, field_type: FieldType) -> Result<(), StackError> {
        let key = normalize_field(name);
        if key.is_empty() || key == ID_FIELD {
            return Err(self.violation(name, "field name is empty or reserved"));
        }
        match self.fields.get(&key) {
            Some(existing) if *existing != field_type => Err(self.violation(
                name,
                &format!("already declared as {}", existing),
            )),
            _ => {
                self.fields.insert(key, field_type);
                Ok(())
            }
        }
    }

    /// Builder-style [`Schema::declare`].
    pub fn with_field(mut self, name: &str, field_type: FieldType) -> Result<Self, StackError> {
        self.declare(name, field_type)?;
        Ok(self)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Declared fields, by normalised name.
    pub fn fields(&self) -> &BTreeMap<String, FieldType> {
        &self.fields
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(&normalize_field(name)).copied()
    }

    /// Fail unless `name` is declared.
    pub fn require(&self, name: &str) -> Result<FieldType, StackError> {
        self.field_type(name)
            .ok_or_else(|| self.violation(name, "field is not declared"))
    }

    /// Check one field write.
    pub fn check(&self, name: &str, value: &FieldValue) -> Result<(), StackError> {
        let declared = self.require(name)?;
        if declared.accepts(value) {
            Ok(())
        } else {
            Err(self.violation(
                name,
                &format!("expected {}, got {}", declared, value),
            ))
        }
    }

    /// Check every field of a write.
    pub fn check_all<'a>(
        &self,
        fields: impl IntoIterator<Item = (&'a String, &'a FieldValue)>,
    ) -> Result<(), StackError> {
        for (name, value) in fields {
            self.check(name, value)?;
        }
        Ok(())
    }

    fn violation(&self, field: &str, reason: &str) -> StackError {
        StackError::SchemaViolation {
            table: self.table.clone(),
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}
