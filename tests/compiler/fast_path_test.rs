//! Integration tests for the single-source fast path.

use polyquery::compiler::{CompileOptions, PlanKind, QueryCompiler};
use polyquery::config::Settings;
use polyquery::error::CompileError;
use polyquery::sql::query::{Query, TableRef};
use polyquery::sql::test_utils::validate_sql;
use polyquery::sql::{col, count_star, param, Dialect, ExprExt};

const SETTINGS: &str = r#"
[compiler]
dialect = "duckdb"
total_count_alias = "row_total"

[default]
table = "content_items"
schema = "content"
columns = ["id", "type", "title", "views"]
default_order_by = ["id"]

[types.article]
table = "articles"
schema = "content"
columns = ["id", "title", "author_id", "views"]
default_order_by = ["id"]
"#;

fn compiler() -> QueryCompiler {
    let settings = Settings::from_toml(SETTINGS).unwrap();
    QueryCompiler::from_settings(&settings).unwrap()
}

#[test]
fn test_single_type_has_no_union() {
    let mut compiler = compiler();
    compiler
        .register_type("article")
        .unwrap()
        .set_columns("id, title")
        .unwrap()
        .order_by("views DESC")
        .unwrap();

    let compiled = compiler.compile(&CompileOptions::new()).unwrap().unwrap();
    assert_eq!(compiled.kind, PlanKind::Single);
    assert!(!compiled.is_nested);
    assert_eq!(
        compiled.sql,
        "SELECT\n  \"id\",\n  \"title\",\n  \"author_id\",\n  \"views\"\nFROM \"content\".\"articles\"\nORDER BY \"views\" DESC, \"id\""
    );
}

#[test]
fn test_no_default_columns_keeps_globals_only() {
    let mut compiler = compiler();
    compiler
        .register_type("article")
        .unwrap()
        .set_columns("id, title, summary")
        .unwrap()
        .no_default_columns();

    let compiled = compiler.compile(&CompileOptions::new()).unwrap().unwrap();
    assert_eq!(compiled.columns, vec!["id", "title", "summary"]);
    assert!(compiled.sql.contains("NULL AS \"summary\""));
}

#[test]
fn test_fast_path_and_forced_union_have_same_columns() {
    let mut compiler = compiler();
    compiler
        .register_type("article")
        .unwrap()
        .set_columns("id, title")
        .unwrap()
        .no_default_columns()
        .filter(col("views").gt(param("min_views")))
        .param("min_views", 10)
        .max_records(5);

    let fast = compiler.compile(&CompileOptions::new()).unwrap().unwrap();
    let union = compiler
        .compile(&CompileOptions::new().force_union())
        .unwrap()
        .unwrap();

    assert_eq!(fast.kind, PlanKind::Single);
    assert_eq!(union.kind, PlanKind::Union);
    assert_eq!(fast.columns, union.columns);
    assert_eq!(fast.params, union.params);
    assert!(fast.total_count.is_some());
    assert!(union.total_count.is_some());
}

#[test]
fn test_scalar_subquery_embeds_in_outer_query() {
    let mut compiler = compiler();
    compiler
        .register_type("article")
        .unwrap()
        .set_column_specs([polyquery::source::ColumnSpec::expr(count_star(), "n")])
        .as_scalar_subquery();

    let compiled = compiler.compile(&CompileOptions::new()).unwrap().unwrap();
    assert!(compiled.is_subquery);
    assert!(!compiled.sql.contains("ORDER BY"));

    let outer = Query::new()
        .select(vec![compiled.to_subquery_expr().alias("article_count")])
        .from(TableRef::new("dashboards"));
    let sql = outer.to_sql(Dialect::Postgres);
    assert!(sql.contains("(SELECT\n  COUNT(*) AS \"n\"\nFROM \"content\".\"articles\") AS \"article_count\""));
    validate_sql(&sql, Dialect::Postgres).unwrap();
}

#[test]
fn test_in_list_requires_one_column() {
    let mut compiler = compiler();
    compiler.register_type("article").unwrap().as_in_list();

    let err = compiler.compile(&CompileOptions::new()).unwrap_err();
    assert_eq!(err, CompileError::NotSingleColumn { found: 0 });

    compiler.set_columns("author_id").unwrap();
    let compiled = compiler.compile(&CompileOptions::new()).unwrap().unwrap();
    let filter = compiled.in_list_of(col("id"));
    assert!(filter
        .to_sql(Dialect::DuckDb)
        .starts_with("\"id\" IN (SELECT\n  \"author_id\"\nFROM"));
}

#[test]
fn test_source_grouping_with_global_order_nests() {
    let mut compiler = compiler();
    compiler
        .register_type_with("article", |q| {
            q.set_columns("author_id")?
                .add_columns("SUM(views) AS total_views")?
                .group_by(vec![col("author_id")]);
            Ok(())
        })
        .unwrap()
        .order_by("total_views DESC")
        .unwrap();

    let compiled = compiler.compile(&CompileOptions::new()).unwrap().unwrap();
    assert_eq!(compiled.kind, PlanKind::Single);
    assert!(compiled.is_nested);
    assert_eq!(compiled.columns, vec!["author_id", "total_views"]);
    assert!(compiled.sql.contains("GROUP BY \"author_id\"\n) AS \"combined\""));
    assert!(compiled.sql.ends_with("ORDER BY \"total_views\" DESC, \"__source_ordinal\" ASC, \"__row_number\" ASC"));
}

#[test]
fn test_default_filtered_total_count() {
    let mut compiler = compiler();
    compiler
        .register_type("article")
        .unwrap()
        .exclude_type_columns()
        .set_columns("id, title")
        .unwrap()
        .max_records(10);

    let compiled = compiler.compile(&CompileOptions::new()).unwrap().unwrap();
    assert_eq!(compiled.kind, PlanKind::DefaultFiltered);
    assert_eq!(
        compiled.total_count_sql().unwrap(),
        "SELECT\n  (SELECT\n  COUNT(*)\nFROM \"content\".\"content_items\"\nWHERE \"type\" IN ('article')) AS \"row_total\""
    );
}
