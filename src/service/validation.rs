//! Request validation from resolved field rules.

use crate::config::{FieldType, ResolvedEntity, ResolvedField};
use crate::error::{AppError, FieldErrors};
use chrono::{Datelike, NaiveDate, Utc};
use serde_json::{Map, Value};

/// Lowest accepted value for `year` fields.
pub const MIN_YEAR: i64 = 1600;

pub struct RequestValidator;

impl RequestValidator {
    /// Validate a create body. All required fields must be present and non-null.
    /// Unknown and read-only keys are ignored.
    pub fn validate(body: &Map<String, Value>, entity: &ResolvedEntity) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        for field in entity.writable_fields() {
            match body.get(&field.key) {
                None | Some(Value::Null) if field.rule.required => {
                    errors.insert(field.key.clone(), "is required".into());
                }
                Some(v) => check(field, v, &mut errors),
                None => {}
            }
        }
        finish(errors)
    }

    /// Validate only the fields present in body (for PATCH). Required fields may be omitted but not nulled.
    pub fn validate_partial(body: &Map<String, Value>, entity: &ResolvedEntity) -> Result<(), AppError> {
        let mut errors = FieldErrors::new();
        for field in entity.writable_fields() {
            let Some(v) = body.get(&field.key) else { continue };
            if v.is_null() && field.rule.required {
                errors.insert(field.key.clone(), "may not be null".into());
                continue;
            }
            check(field, v, &mut errors);
        }
        finish(errors)
    }
}

fn finish(errors: FieldErrors) -> Result<(), AppError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

fn check(field: &ResolvedField, v: &Value, errors: &mut FieldErrors) {
    if let Err(message) = validate_field(field, v) {
        errors.insert(field.key.clone(), message);
    }
}

fn validate_field(field: &ResolvedField, v: &Value) -> Result<(), String> {
    if v.is_null() {
        return Ok(());
    }
    let rule = &field.rule;
    match field.field_type {
        FieldType::Integer => {
            v.as_i64().ok_or("must be an integer")?;
        }
        FieldType::Year => {
            let year = v.as_i64().ok_or("must be an integer year")?;
            let current = i64::from(Utc::now().year());
            if year < MIN_YEAR || year > current {
                return Err(format!("must be between {} and {}", MIN_YEAR, current));
            }
        }
        FieldType::Float => {
            v.as_f64().ok_or("must be a number")?;
        }
        FieldType::Boolean => {
            v.as_bool().ok_or("must be a boolean")?;
        }
        FieldType::Text | FieldType::Password => {
            v.as_str().ok_or("must be a string")?;
        }
        FieldType::Date => {
            let s = v.as_str().ok_or("must be a date string")?;
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| "must be a date in YYYY-MM-DD format")?;
        }
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(min) = rule.min_length {
            if len < min as usize {
                return Err(format!("must be at least {} characters", min));
            }
        }
        if let Some(max) = rule.max_length {
            if len > max as usize {
                return Err(format!("must be at most {} characters", max));
            }
        }
        if let Some(re) = &rule.pattern {
            if !re.is_match(s) {
                return Err("does not match required pattern".into());
            }
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(format!("must be at least {}", min));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(format!("must be at most {}", max));
            }
        }
    }
    if field.reference.is_some() && v.as_i64().is_some_and(|id| id < 1 || id > i64::from(i32::MAX)) {
        return Err("must be a valid id".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin, resolve, ResolvedModel};
    use serde_json::json;

    fn model() -> ResolvedModel {
        resolve(&builtin().unwrap()).unwrap()
    }

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn field_errors(result: Result<(), AppError>) -> FieldErrors {
        match result {
            Err(AppError::Validation(fields)) => fields,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn missing_required_fields_are_all_reported() {
        let model = model();
        let buildings = model.entity_by_path("buildings").unwrap();
        let errors = field_errors(RequestValidator::validate(&body(json!({"land": 10})), buildings));
        assert_eq!(errors.get("name").map(String::as_str), Some("is required"));
        assert_eq!(errors.get("address").map(String::as_str), Some("is required"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn unknown_and_read_only_keys_are_ignored() {
        let model = model();
        let materials = model.entity_by_path("materials").unwrap();
        let ok = body(json!({"id": 99, "name": "Brick", "colour": "red"}));
        assert!(RequestValidator::validate(&ok, materials).is_ok());
    }

    #[test]
    fn year_bounds_follow_the_calendar() {
        let model = model();
        let buildings = model.entity_by_path("buildings").unwrap();
        let next_year = i64::from(Utc::now().year()) + 1;
        for year in [json!(1599), json!(next_year)] {
            let errors = field_errors(RequestValidator::validate_partial(&body(json!({"year": year})), buildings));
            assert!(errors["year"].starts_with("must be between 1600 and"));
        }
        assert!(RequestValidator::validate_partial(&body(json!({"year": 1600})), buildings).is_ok());
        let this_year = Utc::now().year();
        assert!(RequestValidator::validate_partial(&body(json!({"year": this_year})), buildings).is_ok());

        let units = model.entity_by_path("units").unwrap();
        let errors = field_errors(RequestValidator::validate_partial(&body(json!({"cost_year": 1500})), units));
        assert!(errors.contains_key("cost_year"));
    }

    #[test]
    fn percentages_are_range_checked() {
        let model = model();
        let buildings = model.entity_by_path("buildings").unwrap();
        let errors = field_errors(RequestValidator::validate_partial(
            &body(json!({"wear": 101, "flow": 0})),
            buildings,
        ));
        assert_eq!(errors["wear"], "must be at most 100");
        assert_eq!(errors["flow"], "must be at least 1");
        assert!(RequestValidator::validate_partial(&body(json!({"wear": 0, "flow": 100})), buildings).is_ok());
    }

    #[test]
    fn types_are_enforced() {
        let model = model();
        let halls = model.entity_by_path("halls").unwrap();
        let errors = field_errors(RequestValidator::validate_partial(
            &body(json!({"number": "12", "square": "big", "building_id": 1.5})),
            halls,
        ));
        assert_eq!(errors["number"], "must be an integer");
        assert_eq!(errors["square"], "must be a number");
        assert_eq!(errors["building_id"], "must be an integer");
    }

    #[test]
    fn dates_must_be_iso() {
        let model = model();
        let units = model.entity_by_path("units").unwrap();
        let errors = field_errors(RequestValidator::validate_partial(
            &body(json!({"date_start": "01.02.2020"})),
            units,
        ));
        assert!(errors.contains_key("date_start"));
        assert!(RequestValidator::validate_partial(&body(json!({"date_start": "2020-02-01"})), units).is_ok());
    }

    #[test]
    fn partial_update_rejects_nulling_required_field() {
        let model = model();
        let halls = model.entity_by_path("halls").unwrap();
        let errors = field_errors(RequestValidator::validate_partial(
            &body(json!({"building_id": null, "target_id": null})),
            halls,
        ));
        assert_eq!(errors["building_id"], "may not be null");
        assert!(!errors.contains_key("target_id"));
    }

    #[test]
    fn phone_pattern_and_lengths() {
        let model = model();
        let departments = model.entity_by_path("departments").unwrap();
        let errors = field_errors(RequestValidator::validate_partial(
            &body(json!({"phone": "call me", "name": ""})),
            departments,
        ));
        assert_eq!(errors["phone"], "does not match required pattern");
        assert_eq!(errors["name"], "must be at least 1 characters");
        assert!(RequestValidator::validate_partial(&body(json!({"phone": "+7 (495) 123-45-67"})), departments).is_ok());
    }

    #[test]
    fn foreign_ids_must_be_positive() {
        let model = model();
        let units = model.entity_by_path("units").unwrap();
        let errors = field_errors(RequestValidator::validate_partial(&body(json!({"hall_id": 0})), units));
        assert_eq!(errors["hall_id"], "must be a valid id");
    }
}
