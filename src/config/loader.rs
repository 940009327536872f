//! Load the resource catalog (built-in or from a file) and resolve it into the runtime model.

use crate::config::resolved::{
    ComposedPart, FieldRule, ResolvedBackref, ResolvedComposed, ResolvedEntity, ResolvedField, ResolvedModel,
    ResolvedReference,
};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("inventory.json");

/// The inventory catalog compiled into the binary.
pub fn builtin() -> Result<FullConfig, ConfigError> {
    parse(BUILTIN_CATALOG)
}

pub fn parse(json: &str) -> Result<FullConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
}

pub async fn load_from_file(path: &Path) -> Result<FullConfig, ConfigError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    parse(&raw)
}

/// Build resolved model from catalog. Validates first.
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;

    let resources_by_path: HashMap<_, _> = config
        .resources
        .iter()
        .map(|r| (r.path_segment.as_str(), r))
        .collect();

    let mut entities = Vec::new();
    let mut entity_by_path = HashMap::new();

    for res in &config.resources {
        let mut fields = Vec::with_capacity(res.fields.len());
        for f in &res.fields {
            let reference = match &f.references {
                Some(r) => {
                    let target = resources_by_path.get(r.resource.as_str()).ok_or_else(|| {
                        ConfigError::MissingReference {
                            kind: "resource",
                            id: r.resource.clone(),
                        }
                    })?;
                    Some(ResolvedReference {
                        label: target.label.clone(),
                        table_name: target.table.clone(),
                        pk_column: pk_column(target)?,
                        on_delete: r.on_delete,
                    })
                }
                None => None,
            };
            fields.push(ResolvedField {
                key: f.api_key(),
                column: f.column.clone(),
                field_type: f.type_,
                primary_key: f.primary_key,
                unique: f.unique,
                reference,
                default: f.default.clone(),
                rule: compile_rule(&f.validation)?,
            });
        }
        // primary key first so SELECT and DDL output lead with it
        fields.sort_by_key(|f| !f.primary_key);

        let mut backrefs = Vec::with_capacity(res.backrefs.len());
        for (i, b) in res.backrefs.iter().enumerate() {
            let via = fields
                .iter()
                .find(|f| f.key == b.via)
                .and_then(|f| f.reference.as_ref().map(|r| (f, r)))
                .ok_or_else(|| ConfigError::MissingReference {
                    kind: "backref field",
                    id: format!("{}.{}", res.path_segment, b.via),
                })?;
            backrefs.push(ResolvedBackref {
                key: b.key.clone(),
                alias: format!("b{}", i),
                fk_column: via.0.column.clone(),
                table_name: via.1.table_name.clone(),
                pk_column: via.1.pk_column.clone(),
                display_column: b.display.clone(),
            });
        }

        let composed = res
            .composed
            .iter()
            .map(|c| resolve_composed(c, &fields, &backrefs))
            .collect::<Result<Vec<_>, _>>()?;

        let entity = ResolvedEntity {
            path_segment: res.path_segment.clone(),
            table_name: res.table.clone(),
            label: res.label.clone(),
            pk_column: pk_column(res)?,
            role: res.role,
            fields,
            backrefs,
            composed,
        };
        entity_by_path.insert(res.path_segment.clone(), entity.clone());
        entities.push(entity);
    }

    Ok(ResolvedModel {
        entities,
        entity_by_path,
    })
}

fn pk_column(res: &ResourceConfig) -> Result<String, ConfigError> {
    res.fields
        .iter()
        .find(|f| f.primary_key)
        .map(|f| f.column.clone())
        .ok_or_else(|| ConfigError::InvalidPrimaryKey(res.path_segment.clone()))
}

fn compile_rule(rule: &ValidationRule) -> Result<FieldRule, ConfigError> {
    let pattern = rule
        .pattern
        .as_deref()
        .map(regex::Regex::new)
        .transpose()
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    Ok(FieldRule {
        required: rule.required,
        min_length: rule.min_length,
        max_length: rule.max_length,
        pattern,
        minimum: rule.minimum,
        maximum: rule.maximum,
    })
}

fn resolve_composed(
    c: &ComposedConfig,
    fields: &[ResolvedField],
    backrefs: &[ResolvedBackref],
) -> Result<ResolvedComposed, ConfigError> {
    let mut parts = Vec::with_capacity(c.parts.len());
    for name in &c.parts {
        if let Some(f) = fields.iter().find(|f| f.key == *name) {
            parts.push(ComposedPart::Column(f.column.clone()));
        } else if let Some(b) = backrefs.iter().find(|b| b.key == *name) {
            parts.push(ComposedPart::Joined {
                alias: b.alias.clone(),
                column: b.display_column.clone(),
            });
        } else {
            return Err(ConfigError::MissingReference {
                kind: "composed part",
                id: name.clone(),
            });
        }
    }
    Ok(ResolvedComposed {
        key: c.key.clone(),
        separator: c.separator.clone(),
        parts,
    })
}
