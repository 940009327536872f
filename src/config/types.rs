//! Raw catalog types matching the resource catalog JSON (see `inventory.json`).

use crate::case::to_snake_case;
use serde::{Deserialize, Serialize};

/// Value type of a field. Drives request validation, the SQL cast applied to
/// bound parameters and the column type in generated DDL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
    /// Calendar date as `YYYY-MM-DD`.
    Date,
    /// Integer year, bounded to 1600 ..= current year.
    Year,
    /// Write-only text, stored as an Argon2id hash and never selected.
    Password,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniqueMode {
    #[default]
    Exact,
    CaseInsensitive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    #[default]
    Restrict,
    Cascade,
    SetNull,
}

impl OnDelete {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OnDelete::Restrict => "RESTRICT",
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
        }
    }
}

/// Role a caller needs to reach a resource. Admins satisfy `User` too.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Path segment of the referenced resource.
    pub resource: String,
    #[serde(default)]
    pub on_delete: OnDelete,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Internal column name.
    pub column: String,
    /// Public API key. Defaults to the snake_case form of `column`.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(rename = "type")]
    pub type_: FieldType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub unique: Option<UniqueMode>,
    #[serde(default)]
    pub references: Option<ReferenceConfig>,
    /// SQL default expression used in DDL, e.g. `FALSE`.
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub validation: ValidationRule,
}

impl FieldConfig {
    pub fn api_key(&self) -> String {
        self.key.clone().unwrap_or_else(|| to_snake_case(&self.column))
    }
}

/// Read-only field resolved through a foreign key: exposes one column of the referenced row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackrefConfig {
    pub key: String,
    /// Public key of the foreign-key field on this resource.
    pub via: String,
    /// Column of the referenced table to expose.
    pub display: String,
}

/// Read-only display field concatenated from fields and backrefs of the same resource.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComposedConfig {
    pub key: String,
    pub parts: Vec<String>,
    #[serde(default = "default_separator")]
    pub separator: String,
}

fn default_separator() -> String {
    " ".into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub path_segment: String,
    pub table: String,
    /// Human-readable name used in error messages.
    pub label: String,
    #[serde(default)]
    pub role: Role,
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub backrefs: Vec<BackrefConfig>,
    #[serde(default)]
    pub composed: Vec<ComposedConfig>,
}

/// Whole catalog. Resources are listed in dependency order: a resource may only
/// reference resources declared before it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    pub resources: Vec<ResourceConfig>,
}
