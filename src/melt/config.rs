use serde::{Deserialize, Serialize};

/// What to do with arrays whose elements are all scalars
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScalarArrayPolicy {
    /// Emit one child row per element, holding the element in the value column
    #[default]
    ChildTable,
    /// Collapse the array into one text column, elements joined by `delimiter`
    Join { delimiter: String },
}

/// Configuration for the flattening process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeltConfig {
    /// Separator joining nested keys into column and table names
    pub separator: String,

    /// Synthetic row identifier column, present in every table
    pub id_column: String,

    /// Column in child rows holding the parent row's identifier
    pub parent_id_column: String,

    /// Column in child rows holding the element's position in its array
    pub index_column: String,

    /// Column holding a non-object array element (or a non-object record)
    pub value_column: String,

    pub scalar_arrays: ScalarArrayPolicy,

    /// Nesting depth past which arrays and objects are stored as JSON text
    pub max_depth: usize,

    /// Flattened paths whose value is always stored as JSON text
    pub scalar_fields: Vec<String>,
}

impl Default for MeltConfig {
    fn default() -> Self {
        MeltConfig {
            separator: String::from("_"),
            id_column: String::from("_rid_"),
            parent_id_column: String::from("_parent_rid_"),
            index_column: String::from("_index_"),
            value_column: String::from("_val_"),
            scalar_arrays: ScalarArrayPolicy::ChildTable,
            max_depth: 32,
            scalar_fields: vec![],
        }
    }
}

impl MeltConfig {
    /// Synthetic columns linking child rows to their parents.
    pub fn linkage_columns(&self) -> Vec<String> {
        vec![
            self.id_column.clone(),
            self.parent_id_column.clone(),
            self.index_column.clone(),
        ]
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn with_scalar_arrays(mut self, policy: ScalarArrayPolicy) -> Self {
        self.scalar_arrays = policy;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_scalar_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scalar_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: MeltConfig = serde_json::from_value(json!({
            "separator": "__",
            "scalar_arrays": {"mode": "join", "delimiter": "|"}
        }))
        .unwrap();

        assert_eq!(config.separator, "__");
        assert_eq!(config.id_column, "_rid_");
        assert_eq!(
            config.scalar_arrays,
            ScalarArrayPolicy::Join { delimiter: "|".to_string() }
        );
        assert_eq!(config.max_depth, MeltConfig::default().max_depth);
    }
}
