use super::Dialect;
use crate::types::TypeTag;

/// PostgreSQL (and Redshift-compatible) column types.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn native_type(&self, tag: TypeTag) -> Option<String> {
        let native = match tag {
            TypeTag::Boolean => "BOOLEAN",
            TypeTag::Integer => "BIGINT",
            TypeTag::Float => "DOUBLE PRECISION",
            // A column that only ever held null has no better guess than text
            TypeTag::String | TypeTag::Null => "TEXT",
        };
        Some(native.to_string())
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn max_identifier_length(&self) -> usize {
        63
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier_doubles_quotes() {
        assert_eq!(PostgresDialect.quote_identifier("name"), "\"name\"");
        assert_eq!(PostgresDialect.quote_identifier("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_column_types() {
        let d = PostgresDialect;
        assert_eq!(d.column_type(TypeTag::Integer, false).unwrap(), "BIGINT NOT NULL");
        assert_eq!(d.column_type(TypeTag::Float, true).unwrap(), "DOUBLE PRECISION NULL");
        assert_eq!(d.column_type(TypeTag::Null, true).unwrap(), "TEXT NULL");
    }
}
