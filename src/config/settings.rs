//! TOML-based configuration for polyquery.
//!
//! Supports a config file (polyquery.toml) with environment variable
//! expansion in table and schema names.
//!
//! Example configuration:
//! ```toml
//! [compiler]
//! dialect = "postgres"
//! type_column = "kind"
//!
//! [default]
//! table = "content_items"
//! columns = ["id", "kind", "title", "published_at"]
//! default_order_by = ["published_at DESC", "id"]
//!
//! [types.article]
//! table = "articles"
//! schema = "${CONTENT_SCHEMA}"
//! columns = ["id", "title", "published_at"]
//! default_order_by = ["published_at DESC", "id"]
//!
//! [types.post]
//! subtypes = ["article", "blog_post"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::sql::dialect::Dialect;
use crate::sql::query::TableRef;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Compiler-wide naming and dialect.
    pub compiler: CompilerSettings,

    /// Generic source holding every type, used by the forced-default plan.
    pub default: Option<TypeSettings>,

    /// Per-type sources keyed by type name.
    pub types: BTreeMap<String, TypeSettings>,
}

/// Compiler configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Target SQL dialect (duckdb, postgres, tsql, mysql, sqlite).
    pub dialect: String,

    /// Column of the default source that holds the type name.
    pub type_column: String,

    /// Alias of the derived table wrapping the UNION.
    pub subquery_alias: String,

    /// Synthetic row-number-within-source column.
    pub row_number_column: String,

    /// Synthetic 0-based source registration index column.
    pub source_ordinal_column: String,

    /// Synthetic source type literal column.
    pub source_type_column: String,

    /// Alias of the total row count.
    pub total_count_alias: String,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            dialect: "duckdb".to_string(),
            type_column: "type".to_string(),
            subquery_alias: "combined".to_string(),
            row_number_column: "__row_number".to_string(),
            source_ordinal_column: "__source_ordinal".to_string(),
            source_type_column: "__source_type".to_string(),
            total_count_alias: "total_count".to_string(),
        }
    }
}

impl CompilerSettings {
    /// Parse the configured dialect.
    pub fn dialect(&self) -> Result<Dialect, SettingsError> {
        self.dialect
            .parse()
            .map_err(|_| SettingsError::UnsupportedDialect(self.dialect.clone()))
    }

    /// The three synthetic column names, in emission order.
    pub fn synthetic_columns(&self) -> [&str; 3] {
        [
            self.row_number_column.as_str(),
            self.source_ordinal_column.as_str(),
            self.source_type_column.as_str(),
        ]
    }
}

/// One source's table and shape.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TypeSettings {
    /// Table name (supports ${ENV_VAR} expansion). Defaults to the type name.
    pub table: Option<String>,

    /// Schema name (supports ${ENV_VAR} expansion).
    pub schema: Option<String>,

    /// Known column names, used to expand `*` and to pad missing columns.
    pub columns: Vec<String>,

    /// Order specs used when paging needs a deterministic order.
    pub default_order_by: Vec<String>,

    /// Concrete types this name stands for.
    pub subtypes: Vec<String>,
}

impl TypeSettings {
    /// Table reference for `type_name`, without expansion.
    pub fn table_ref(&self, type_name: &str) -> TableRef {
        let table = TableRef::new(self.table.as_deref().unwrap_or(type_name));
        match &self.schema {
            Some(schema) => table.with_schema(schema),
            None => table,
        }
    }

    /// Copy with environment variables expanded in table and schema.
    pub fn resolved(&self) -> Result<Self, SettingsError> {
        Ok(Self {
            table: self.table.as_deref().map(expand_env_vars).transpose()?,
            schema: self.schema.as_deref().map(expand_env_vars).transpose()?,
            ..self.clone()
        })
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), types = settings.types.len(), "loaded settings");
        Ok(settings)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `POLYQUERY_CONFIG`
    /// 2. `./polyquery.toml`
    /// 3. `~/.config/polyquery/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("POLYQUERY_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("polyquery.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("polyquery").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Check cross-references and naming.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.compiler.dialect()?;

        let synthetic = self.compiler.synthetic_columns();
        if synthetic.iter().any(|name| name.is_empty()) {
            return Err(SettingsError::InvalidConfig(
                "synthetic column names must not be empty".to_string(),
            ));
        }
        if synthetic[0] == synthetic[1]
            || synthetic[1] == synthetic[2]
            || synthetic[0] == synthetic[2]
        {
            return Err(SettingsError::InvalidConfig(
                "synthetic column names must be distinct".to_string(),
            ));
        }

        for (name, settings) in &self.types {
            for subtype in &settings.subtypes {
                if !self.types.contains_key(subtype) {
                    return Err(SettingsError::InvalidConfig(format!(
                        "type '{}' lists unknown subtype '{}'",
                        name, subtype
                    )));
                }
            }
        }
        Ok(())
    }

    /// Get a type by name.
    pub fn get_type(&self, name: &str) -> Result<&TypeSettings, SettingsError> {
        self.types
            .get(name)
            .ok_or_else(|| SettingsError::UnknownType(name.to_string()))
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var_name: String = if chars.next_if_eq(&'{').is_some() {
            chars.by_ref().take_while(|&ch| ch != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(ch) = chars.next_if(|ch| ch.is_alphanumeric() || *ch == '_') {
                name.push(ch);
            }
            if name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
            name
        };

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars_braces() {
        env::set_var("POLYQUERY_TEST_VAR", "hello");
        assert_eq!(expand_env_vars("${POLYQUERY_TEST_VAR}").unwrap(), "hello");
        assert_eq!(
            expand_env_vars("prefix_${POLYQUERY_TEST_VAR}_suffix").unwrap(),
            "prefix_hello_suffix"
        );
        env::remove_var("POLYQUERY_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_no_braces() {
        env::set_var("POLYQUERY_TEST_VAR2", "world");
        assert_eq!(expand_env_vars("$POLYQUERY_TEST_VAR2").unwrap(), "world");
        assert_eq!(expand_env_vars("$POLYQUERY_TEST_VAR2!").unwrap(), "world!");
        assert_eq!(expand_env_vars("cost $ 5").unwrap(), "cost $ 5");
        env::remove_var("POLYQUERY_TEST_VAR2");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("${NONEXISTENT_VAR_12345}");
        assert!(matches!(result, Err(SettingsError::MissingEnvVar(_))));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[compiler]
dialect = "tsql"
type_column = "kind"

[default]
table = "content_items"
columns = ["id", "kind", "title"]

[types.article]
table = "articles"
schema = "content"
columns = ["id", "title", "published_at"]
default_order_by = ["published_at DESC", "id"]

[types.blog_post]
columns = ["id", "title", "author"]

[types.post]
subtypes = ["article", "blog_post"]
"#;

        let settings = Settings::from_toml(toml).unwrap();

        assert_eq!(settings.compiler.dialect().unwrap(), Dialect::TSql);
        assert_eq!(settings.compiler.type_column, "kind");
        assert_eq!(settings.compiler.subquery_alias, "combined");
        assert_eq!(settings.types.len(), 3);

        let article = settings.get_type("article").unwrap();
        assert_eq!(article.default_order_by, vec!["published_at DESC", "id"]);
        assert_eq!(
            article.table_ref("article"),
            TableRef::new("articles").with_schema("content")
        );

        let blog = settings.get_type("blog_post").unwrap();
        assert_eq!(blog.table_ref("blog_post"), TableRef::new("blog_post"));

        assert_eq!(
            settings.default.as_ref().map(|d| d.columns.len()),
            Some(3)
        );
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert_eq!(settings.compiler.dialect().unwrap(), Dialect::DuckDb);
        assert_eq!(settings.compiler.row_number_column, "__row_number");
        assert!(settings.default.is_none());
        assert!(settings.types.is_empty());
        settings.validate().unwrap();
    }

    #[test]
    fn test_invalid_dialect() {
        let result = Settings::from_toml("[compiler]\ndialect = \"oracle\"\n");
        assert!(matches!(result, Err(SettingsError::UnsupportedDialect(d)) if d == "oracle"));
    }

    #[test]
    fn test_unknown_subtype() {
        let result = Settings::from_toml("[types.post]\nsubtypes = [\"nope\"]\n");
        assert!(matches!(result, Err(SettingsError::InvalidConfig(_))));
    }

    #[test]
    fn test_duplicate_synthetic_names() {
        let result =
            Settings::from_toml("[compiler]\nrow_number_column = \"x\"\nsource_type_column = \"x\"\n");
        assert!(matches!(result, Err(SettingsError::InvalidConfig(_))));
    }

    #[test]
    fn test_resolved_expands_table() {
        env::set_var("POLYQUERY_TEST_SCHEMA", "tenant_a");
        let settings = TypeSettings {
            table: Some("articles".into()),
            schema: Some("${POLYQUERY_TEST_SCHEMA}".into()),
            ..Default::default()
        };
        let resolved = settings.resolved().unwrap();
        assert_eq!(resolved.schema.as_deref(), Some("tenant_a"));
        env::remove_var("POLYQUERY_TEST_SCHEMA");
    }
}
