//! Resolved resource model: catalog validated and flattened for runtime use.

use crate::config::{FieldType, OnDelete, Role, UniqueMode};
use regex::Regex;
use std::collections::HashMap;

/// Path segment of the resource that backs authentication.
pub const USER_RESOURCE: &str = "users";

/// Validation constraints with the pattern compiled once at resolve time.
#[derive(Clone, Debug, Default)]
pub struct FieldRule {
    pub required: bool,
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
    pub pattern: Option<Regex>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

/// Target of a foreign-key field.
#[derive(Clone, Debug)]
pub struct ResolvedReference {
    pub label: String,
    pub table_name: String,
    pub pk_column: String,
    pub on_delete: OnDelete,
}

#[derive(Clone, Debug)]
pub struct ResolvedField {
    pub key: String,
    pub column: String,
    pub field_type: FieldType,
    pub primary_key: bool,
    pub unique: Option<UniqueMode>,
    pub reference: Option<ResolvedReference>,
    pub default: Option<String>,
    pub rule: FieldRule,
}

impl ResolvedField {
    /// PostgreSQL type used for parameter casts and DDL.
    pub fn pg_type(&self) -> &'static str {
        match self.field_type {
            FieldType::Integer | FieldType::Year => "integer",
            FieldType::Float => "double precision",
            FieldType::Text | FieldType::Password => "text",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
        }
    }

    pub fn is_write_only(&self) -> bool {
        self.field_type == FieldType::Password
    }

    pub fn is_writable(&self) -> bool {
        !self.primary_key
    }

    pub fn nullable(&self) -> bool {
        !self.primary_key && !self.rule.required
    }
}

/// LEFT JOIN against a referenced table exposing one of its columns under `key`.
#[derive(Clone, Debug)]
pub struct ResolvedBackref {
    pub key: String,
    /// Table alias used in generated SELECTs (`b0`, `b1`, ...).
    pub alias: String,
    pub fk_column: String,
    pub table_name: String,
    pub pk_column: String,
    pub display_column: String,
}

#[derive(Clone, Debug)]
pub enum ComposedPart {
    /// Column of the resource's own table.
    Column(String),
    /// Column exposed by a backref join.
    Joined { alias: String, column: String },
}

#[derive(Clone, Debug)]
pub struct ResolvedComposed {
    pub key: String,
    pub separator: String,
    pub parts: Vec<ComposedPart>,
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub path_segment: String,
    pub table_name: String,
    pub label: String,
    pub pk_column: String,
    pub role: Role,
    /// Declared order; primary key first.
    pub fields: Vec<ResolvedField>,
    pub backrefs: Vec<ResolvedBackref>,
    pub composed: Vec<ResolvedComposed>,
}

impl ResolvedEntity {
    pub fn field(&self, key: &str) -> Option<&ResolvedField> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn writable_fields(&self) -> impl Iterator<Item = &ResolvedField> {
        self.fields.iter().filter(|f| f.is_writable())
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub entities: Vec<ResolvedEntity>,
    pub entity_by_path: HashMap<String, ResolvedEntity>,
}

impl ResolvedModel {
    pub fn entity_by_path(&self, path: &str) -> Option<&ResolvedEntity> {
        self.entity_by_path.get(path)
    }

    pub fn users(&self) -> Option<&ResolvedEntity> {
        self.entity_by_path(USER_RESOURCE)
    }
}
