use super::Dialect;
use crate::types::TypeTag;
use serde_json::Value;

/// Microsoft SQL Server column types and bracket quoting.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl Dialect for MssqlDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn native_type(&self, tag: TypeTag) -> Option<String> {
        let native = match tag {
            TypeTag::Boolean => "BIT",
            TypeTag::Integer => "BIGINT",
            TypeTag::Float => "FLOAT",
            TypeTag::String | TypeTag::Null => "NVARCHAR(MAX)",
        };
        Some(native.to_string())
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn max_identifier_length(&self) -> usize {
        128
    }

    fn quote_literal(&self, value: &str) -> String {
        format!("N'{}'", value.replace('\'', "''"))
    }

    fn csv_field(&self, value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            // BIT columns load from 1/0
            Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_brackets() {
        assert_eq!(MssqlDialect.quote_identifier("order"), "[order]");
        assert_eq!(MssqlDialect.quote_identifier("a]b"), "[a]]b]");
    }

    #[test]
    fn test_bit_fields_render_as_digits() {
        assert_eq!(MssqlDialect.csv_field(&json!(true)).as_deref(), Some("1"));
        assert_eq!(MssqlDialect.csv_field(&json!(false)).as_deref(), Some("0"));
        assert_eq!(MssqlDialect.csv_field(&json!(null)), None);
    }

    #[test]
    fn test_unicode_literals() {
        assert_eq!(MssqlDialect.quote_literal("o'brien"), "N'o''brien'");
    }
}
