//! Integration tests for loading settings and building a compiler from them.

use std::fs;
use std::path::PathBuf;

use polyquery::catalog::{SourceCatalog, StaticCatalog};
use polyquery::compiler::{CompileOptions, QueryCompiler};
use polyquery::config::{Settings, SettingsError};
use polyquery::sql::query::TableRef;
use polyquery::sql::Dialect;

fn temp_config(name: &str, content: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("polyquery-settings-test");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_from_file() {
    let path = temp_config(
        "from_file.toml",
        r#"
[compiler]
dialect = "mysql"
subquery_alias = "merged"

[types.article]
table = "articles"
columns = ["id", "title"]
default_order_by = ["id"]

[types.note]
table = "notes"
columns = ["id", "title"]
default_order_by = ["id"]
"#,
    );

    let settings = Settings::from_file(&path).unwrap();
    let mut compiler = QueryCompiler::from_settings(&settings).unwrap();
    assert_eq!(compiler.dialect(), Dialect::MySql);

    compiler
        .register_type("article")
        .unwrap()
        .register_type("note")
        .unwrap();
    let compiled = compiler.compile(&CompileOptions::new()).unwrap().unwrap();
    assert_eq!(compiled.dialect, Dialect::MySql);
    assert!(compiled.sql.contains(") AS `merged`"));
    assert!(compiled.sql.contains("FROM `notes`"));
}

#[test]
fn test_missing_file() {
    let err = Settings::from_file("/nonexistent/polyquery.toml").unwrap_err();
    assert!(matches!(err, SettingsError::FileNotFound(_)));
}

#[test]
fn test_malformed_toml() {
    let err = Settings::from_toml("[types.article\ntable = 1").unwrap_err();
    assert!(matches!(err, SettingsError::ParseError(_)));
}

#[test]
fn test_schema_from_environment() {
    std::env::set_var("POLYQUERY_SETTINGS_TEST_SCHEMA", "tenant_7");
    let settings = Settings::from_toml(
        r#"
[types.article]
table = "articles"
schema = "${POLYQUERY_SETTINGS_TEST_SCHEMA}"
"#,
    )
    .unwrap();

    let catalog = StaticCatalog::from_settings(&settings).unwrap();
    assert_eq!(
        catalog.table_for("article"),
        TableRef::new("articles").with_schema("tenant_7")
    );
    std::env::remove_var("POLYQUERY_SETTINGS_TEST_SCHEMA");
}

#[test]
fn test_missing_environment_variable() {
    let settings = Settings::from_toml(
        r#"
[types.article]
table = "${POLYQUERY_SETTINGS_TEST_UNSET_TABLE}"
"#,
    )
    .unwrap();

    let err = QueryCompiler::from_settings(&settings).unwrap_err();
    assert!(matches!(err, SettingsError::MissingEnvVar(v) if v == "POLYQUERY_SETTINGS_TEST_UNSET_TABLE"));
}

#[test]
fn test_custom_synthetic_names() {
    let settings = Settings::from_toml(
        r#"
[compiler]
dialect = "postgres"
row_number_column = "rn"
source_ordinal_column = "src"
source_type_column = "kind"

[types.article]
columns = ["id"]
default_order_by = ["id"]

[types.page]
columns = ["id"]
default_order_by = ["id"]
"#,
    )
    .unwrap();

    let mut compiler = QueryCompiler::from_settings(&settings).unwrap();
    compiler
        .register_type("article")
        .unwrap()
        .register_type("page")
        .unwrap();

    let sql = compiler.compile(&CompileOptions::new()).unwrap().unwrap().sql;
    assert!(sql.contains("ROW_NUMBER() OVER (ORDER BY \"id\") AS \"rn\""));
    assert!(sql.contains("'page' AS \"kind\""));
    assert!(sql.ends_with("ORDER BY \"src\" ASC, \"rn\" ASC"));
    assert!(!sql.contains("__row_number"));
}

#[test]
fn test_unknown_type_uses_its_own_name() {
    let settings = Settings::from_toml("[compiler]\ndialect = \"sqlite\"\n").unwrap();
    let mut compiler = QueryCompiler::from_settings(&settings).unwrap();
    compiler.register_type("audit_log").unwrap();

    let compiled = compiler.compile(&CompileOptions::new()).unwrap().unwrap();
    assert_eq!(compiled.sql, "SELECT\n  *\nFROM \"audit_log\"");
    assert_eq!(compiled.columns, vec!["*"]);
}
