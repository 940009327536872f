//! Catalog validation: referential integrity between resources and field consistency.

use crate::config::{FieldType, FullConfig, OnDelete, ResourceConfig, USER_RESOURCE};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    if config.resources.is_empty() {
        return Err(ConfigError::Validation("at least one resource required".into()));
    }

    // path segment -> resource, only for resources already seen (declaration order = dependency order)
    let mut declared: HashMap<&str, &ResourceConfig> = HashMap::new();
    let mut tables = HashSet::new();

    for res in &config.resources {
        if declared.contains_key(res.path_segment.as_str()) {
            return Err(ConfigError::DuplicatePathSegment(res.path_segment.clone()));
        }
        if !tables.insert(res.table.as_str()) {
            return Err(ConfigError::Validation(format!("table {} declared twice", res.table)));
        }
        validate_resource(res, &declared)?;
        declared.insert(res.path_segment.as_str(), res);
    }

    validate_user_resource(declared.get(USER_RESOURCE).copied())
}

fn validate_resource(
    res: &ResourceConfig,
    declared: &HashMap<&str, &ResourceConfig>,
) -> Result<(), ConfigError> {
    let pks: Vec<_> = res.fields.iter().filter(|f| f.primary_key).collect();
    if pks.len() != 1 || pks[0].type_ != FieldType::Integer {
        return Err(ConfigError::InvalidPrimaryKey(res.path_segment.clone()));
    }

    let mut keys = HashSet::new();
    let mut columns = HashSet::new();
    for f in &res.fields {
        let key = f.api_key();
        if !keys.insert(key.clone()) || !columns.insert(f.column.as_str()) {
            return Err(ConfigError::DuplicateField {
                resource: res.path_segment.clone(),
                field: key,
            });
        }
        if let Some(pattern) = &f.validation.pattern {
            regex::Regex::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("{}.{}: invalid pattern: {}", res.path_segment, key, e))
            })?;
        }
        if let Some(r) = &f.references {
            if !declared.contains_key(r.resource.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "resource",
                    id: format!("{} (from {}.{})", r.resource, res.path_segment, key),
                });
            }
            if f.type_ != FieldType::Integer {
                return Err(ConfigError::Validation(format!(
                    "{}.{}: foreign keys must be integer",
                    res.path_segment, key
                )));
            }
            if r.on_delete == OnDelete::SetNull && f.validation.required {
                return Err(ConfigError::Validation(format!(
                    "{}.{}: required foreign key cannot use set_null",
                    res.path_segment, key
                )));
            }
        }
    }

    for b in &res.backrefs {
        if !keys.insert(b.key.clone()) {
            return Err(ConfigError::DuplicateField {
                resource: res.path_segment.clone(),
                field: b.key.clone(),
            });
        }
        let via = res
            .fields
            .iter()
            .find(|f| f.api_key() == b.via)
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "backref field",
                id: format!("{}.{}", res.path_segment, b.via),
            })?;
        let target = via
            .references
            .as_ref()
            .and_then(|r| declared.get(r.resource.as_str()))
            .ok_or_else(|| {
                ConfigError::Validation(format!("{}.{}: backref via a non-reference field", res.path_segment, b.key))
            })?;
        if !target.fields.iter().any(|f| f.column == b.display && f.type_ != FieldType::Password) {
            return Err(ConfigError::MissingReference {
                kind: "backref display column",
                id: format!("{}.{}", target.path_segment, b.display),
            });
        }
    }

    for c in &res.composed {
        if !keys.insert(c.key.clone()) {
            return Err(ConfigError::DuplicateField {
                resource: res.path_segment.clone(),
                field: c.key.clone(),
            });
        }
        if c.parts.is_empty() {
            return Err(ConfigError::Validation(format!("{}.{}: composed field has no parts", res.path_segment, c.key)));
        }
        for part in &c.parts {
            let is_field = res
                .fields
                .iter()
                .any(|f| f.api_key() == *part && f.type_ != FieldType::Password);
            let is_backref = res.backrefs.iter().any(|b| b.key == *part);
            if !is_field && !is_backref {
                return Err(ConfigError::MissingReference {
                    kind: "composed part",
                    id: format!("{}.{}", res.path_segment, part),
                });
            }
        }
    }

    Ok(())
}

/// Authentication reads `login`, `password` and `is_admin` from the user resource.
fn validate_user_resource(users: Option<&ResourceConfig>) -> Result<(), ConfigError> {
    let users = users.ok_or_else(|| ConfigError::MissingReference {
        kind: "resource",
        id: USER_RESOURCE.into(),
    })?;
    for (key, ty) in [
        ("login", FieldType::Text),
        ("password", FieldType::Password),
        ("is_admin", FieldType::Boolean),
    ] {
        if !users.fields.iter().any(|f| f.api_key() == key && f.type_ == ty) {
            return Err(ConfigError::Validation(format!(
                "{} resource needs a {:?} field '{}'",
                USER_RESOURCE, ty, key
            )));
        }
    }
    Ok(())
}
