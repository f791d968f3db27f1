//! Integration tests for compiling several typed sources through the union path.
//!
//! Sources are configured through TOML settings the way the CLI loads them.

use insta::assert_snapshot;
use polyquery::compiler::{CompileOptions, PlanKind, QueryCompiler};
use polyquery::config::Settings;
use polyquery::error::CompileError;
use polyquery::sql::query::TableRef;
use polyquery::sql::test_utils::validate_sql;
use polyquery::sql::{col, param, Dialect, ExprExt};
use serde_json::json;

const SETTINGS: &str = r#"
[compiler]
dialect = "postgres"

[default]
table = "content_items"
columns = ["id", "type", "title", "published_at"]
default_order_by = ["id"]

[types.article]
table = "articles"
columns = ["id", "title", "published_at"]
default_order_by = ["published_at DESC", "id"]

[types.blog_post]
table = "blog_posts"
columns = ["id", "title", "author", "published_at"]
default_order_by = ["id"]

[types.page]
table = "pages"
columns = ["id", "title"]

[types.post]
subtypes = ["article", "blog_post"]
"#;

fn compiler() -> QueryCompiler {
    let settings = Settings::from_toml(SETTINGS).unwrap();
    QueryCompiler::from_settings(&settings).unwrap()
}

// ============================================================================
// Column Shape
// ============================================================================

#[test]
fn test_two_sources_with_placeholder() {
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .set_columns("id, title, author")
        .unwrap()
        .no_default_columns();

    let compiled = compiler.compile(&CompileOptions::new()).unwrap().unwrap();
    assert_eq!(compiled.kind, PlanKind::Union);
    assert_eq!(compiled.columns, vec!["id", "title", "author"]);
    assert_snapshot!(compiled.sql);
}

#[test]
fn test_every_branch_has_the_same_columns() {
    let mut compiler = compiler();
    compiler
        .register_type("article")
        .unwrap()
        .register_type("blog_post")
        .unwrap()
        .register_type("page")
        .unwrap();

    let compiled = compiler.compile(&CompileOptions::new()).unwrap().unwrap();
    assert_eq!(
        compiled.columns,
        vec!["id", "title", "published_at", "author"]
    );

    let sql = &compiled.sql;
    assert_eq!(sql.matches("NULL AS \"author\"").count(), 2);
    assert_eq!(sql.matches("NULL AS \"published_at\"").count(), 1);
    assert_eq!(sql.matches(" AS \"__row_number\"").count(), 3);
    validate_sql(sql, Dialect::Postgres).unwrap();
}

#[test]
fn test_source_columns_win_over_globals() {
    let mut compiler = compiler();
    compiler
        .register_type_with("article", |q| {
            q.set_columns("id, UPPER(title) AS title")?;
            Ok(())
        })
        .unwrap()
        .register_type("blog_post")
        .unwrap()
        .set_columns("id, title")
        .unwrap()
        .no_default_columns();

    let sql = compiler.compile(&CompileOptions::new()).unwrap().unwrap().sql;
    assert!(sql.contains("UPPER(title) AS \"title\""));
    assert!(!sql.contains("UPPER(\"title\")"));
}

// ============================================================================
// Plan Selection
// ============================================================================

#[test]
fn test_empty_compiler() {
    let compiler = QueryCompiler::default();
    assert!(compiler.compile(&CompileOptions::new()).unwrap().is_none());
}

#[test]
fn test_forced_default_with_type_filter() {
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .exclude_type_columns()
        .set_columns("id, title")
        .unwrap();

    let compiled = compiler.compile(&CompileOptions::new()).unwrap().unwrap();
    assert_eq!(compiled.kind, PlanKind::DefaultFiltered);
    assert!(!compiled.sql.contains("UNION"));
    assert!(compiled
        .sql
        .contains("FROM \"content_items\"\nWHERE \"type\" IN ('article', 'blog_post')"));
    assert_eq!(compiled.columns, vec!["id", "title"]);
}

#[test]
fn test_default_source_alone() {
    let compiler = compiler();
    let compiled = compiler.compile(&CompileOptions::new()).unwrap().unwrap();
    assert_eq!(compiled.kind, PlanKind::Default);
    assert!(compiled.sql.contains("FROM \"content_items\""));
}

#[test]
fn test_custom_source_reads_from_given_table() {
    let mut compiler = compiler();
    compiler
        .register_type("article")
        .unwrap()
        .set_custom_source(TableRef::new("articles_archive").with_schema("history"))
        .unwrap();

    let compiled = compiler.compile(&CompileOptions::new()).unwrap().unwrap();
    assert_eq!(compiled.kind, PlanKind::Union);
    assert!(compiled.sql.contains("FROM \"history\".\"articles_archive\""));
    assert!(!compiled.sql.contains("FROM \"articles\""));
}

#[test]
fn test_custom_source_on_many_types() {
    let mut compiler = compiler();
    compiler.register_type("post").unwrap();
    let err = compiler
        .set_custom_source(TableRef::new("archive"))
        .unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedOperation(_)));
}

// ============================================================================
// Ordering and Paging
// ============================================================================

#[test]
fn test_default_union_order() {
    let mut compiler = compiler();
    compiler.register_type("post").unwrap();
    let sql = compiler.compile(&CompileOptions::new()).unwrap().unwrap().sql;
    assert!(sql.ends_with("ORDER BY \"__source_ordinal\" ASC, \"__row_number\" ASC"));
}

#[test]
fn test_paged_union_without_order() {
    let mut compiler = compiler();
    compiler
        .register_type("article")
        .unwrap()
        .register_type("page")
        .unwrap()
        .max_records(10);

    let err = compiler.compile(&CompileOptions::new()).unwrap_err();
    assert_eq!(
        err,
        CompileError::MissingOrderBy {
            source_type: "page".into()
        }
    );
}

#[test]
fn test_top_limits_remaining_rows() {
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .offset(20)
        .max_records(10)
        .top(25);

    let sql = compiler.compile(&CompileOptions::new()).unwrap().unwrap().sql;
    assert!(sql.ends_with("LIMIT 5 OFFSET 20"));
}

#[test]
fn test_paging_override_per_call() {
    let mut compiler = compiler();
    compiler.register_type("post").unwrap().max_records(10);

    let first = compiler.compile(&CompileOptions::new()).unwrap().unwrap();
    let other_page = compiler
        .compile(&CompileOptions::new().paging(polyquery::source::Paging {
            offset: 10,
            max_records: Some(10),
            top: None,
        }))
        .unwrap()
        .unwrap();

    assert!(first.sql.ends_with("LIMIT 10"));
    assert!(other_page.sql.ends_with("LIMIT 10 OFFSET 10"));
    assert_eq!(first.total_count, other_page.total_count);
}

// ============================================================================
// Parameters
// ============================================================================

#[test]
fn test_colliding_parameters_are_renamed() {
    let mut compiler = compiler();
    compiler
        .register_type_with("article", |q| {
            q.filter(col("views").gt(param("min"))).param("min", 100);
            Ok(())
        })
        .unwrap()
        .register_type_with("blog_post", |q| {
            q.filter(col("views").gt(param("min"))).param("min", 10);
            Ok(())
        })
        .unwrap();

    let compiled = compiler
        .compile(&CompileOptions::new().dialect(Dialect::TSql))
        .unwrap()
        .unwrap();
    assert_eq!(compiled.params.to_json(), json!({"min": 100, "min_1": 10}));
    assert!(compiled.sql.contains("[views] > @min)"));
    assert!(compiled.sql.contains("[views] > @min_1)"));
}

#[test]
fn test_compile_does_not_mutate_compiler() {
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .filter(col("title").like(param("needle")))
        .param("needle", "%rust%");

    let before = compiler.queries().to_vec();
    let first = compiler.compile(&CompileOptions::new()).unwrap();
    let second = compiler.compile(&CompileOptions::new()).unwrap();

    assert_eq!(first, second);
    assert_eq!(compiler.queries(), before.as_slice());
    assert!(compiler.queries().iter().all(|q| q.filter.is_none()));
}
