//! Case conversion from internal column names (PascalCase) to public API keys (snake_case).

/// Convert a single identifier from PascalCase or camelCase to snake_case.
/// e.g. "CostYear" -> "cost_year", "IsAdmin" -> "is_admin"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pascal_columns_become_snake_keys() {
        assert_eq!(to_snake_case("Id"), "id");
        assert_eq!(to_snake_case("CostYear"), "cost_year");
        assert_eq!(to_snake_case("IsAdmin"), "is_admin");
        assert_eq!(to_snake_case("MaterialId"), "material_id");
    }

    #[test]
    fn already_snake_is_unchanged() {
        assert_eq!(to_snake_case("date_start"), "date_start");
        assert_eq!(to_snake_case("Date_Start"), "date_start");
    }
}
