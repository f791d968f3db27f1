//! Every statement the compiler emits must parse in every target dialect.
//!
//! Uses sqlparser-rs through `validate_sql` so the emitted text is checked
//! without a live database.

use polyquery::compiler::{CompileOptions, CompiledQuery, QueryCompiler};
use polyquery::config::Settings;
use polyquery::sql::test_utils::validate_sql;
use polyquery::sql::{col, param, Dialect, ExprExt};

const DIALECTS: [Dialect; 5] = [
    Dialect::DuckDb,
    Dialect::Postgres,
    Dialect::MySql,
    Dialect::TSql,
    Dialect::Sqlite,
];

const SETTINGS: &str = r#"
[default]
table = "content_items"
schema = "content"
columns = ["id", "type", "title", "published_at"]
default_order_by = ["published_at DESC", "id"]

[types.article]
table = "articles"
schema = "content"
columns = ["id", "title", "published_at", "views"]
default_order_by = ["published_at DESC", "id"]

[types.blog_post]
table = "blog_posts"
schema = "content"
columns = ["id", "title", "author", "published_at", "views"]
default_order_by = ["id"]

[types.post]
subtypes = ["article", "blog_post"]
"#;

fn compiler() -> QueryCompiler {
    let settings = Settings::from_toml(SETTINGS).unwrap();
    QueryCompiler::from_settings(&settings).unwrap()
}

fn compile_all(compiler: &QueryCompiler) -> Vec<CompiledQuery> {
    DIALECTS
        .iter()
        .map(|d| {
            compiler
                .compile(&CompileOptions::new().dialect(*d))
                .unwrap()
                .unwrap()
        })
        .collect()
}

/// Validate the statement and, when present, its total count query.
fn assert_valid(compiled: &[CompiledQuery]) {
    for c in compiled {
        validate_sql(&c.sql, c.dialect).unwrap();
        if let Some(count) = c.total_count_sql() {
            validate_sql(&count, c.dialect).unwrap();
        }
    }
}

// ============================================================================
// Union Path
// ============================================================================

#[test]
fn test_union_all_dialects() {
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .set_columns("id, title, author")
        .unwrap()
        .no_default_columns();

    let compiled = compile_all(&compiler);
    assert_valid(&compiled);
    assert!(compiled.iter().all(|c| c.sql.contains("UNION")));
}

#[test]
fn test_paged_union_all_dialects() {
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .filter(col("views").gt(param("min_views")))
        .param("min_views", 10)
        .order_by("title")
        .unwrap()
        .offset(20)
        .max_records(10);

    let compiled = compile_all(&compiler);
    assert_valid(&compiled);
    assert!(compiled.iter().all(|c| c.total_count.is_some()));

    let tsql = &compiled[3];
    assert!(tsql.sql.ends_with("OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"));
    assert!(tsql.sql.contains("@min_views"));
}

#[test]
fn test_grouped_union_all_dialects() {
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .set_columns("published_at")
        .unwrap()
        .add_columns("SUM(views) AS total_views")
        .unwrap()
        .no_default_columns()
        .group_by(vec![col("published_at")])
        .max_records(5);

    let compiled = compile_all(&compiler);
    assert_valid(&compiled);
    for c in &compiled {
        assert_eq!(c.columns, vec!["published_at", "total_views"]);
    }
}

#[test]
fn test_result_filter_all_dialects() {
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .set_columns("id, title")
        .unwrap()
        .filter(col("title").like(param("needle")))
        .param("needle", "%rust%")
        .filter_on_result()
        .max_records(10);

    assert_valid(&compile_all(&compiler));
}

// ============================================================================
// Fast Path and Default Source
// ============================================================================

#[test]
fn test_fast_path_all_dialects() {
    let mut compiler = compiler();
    compiler
        .register_type("article")
        .unwrap()
        .filter(col("title").like(param("needle")))
        .param("needle", "%rust%")
        .offset(10);

    let compiled = compile_all(&compiler);
    assert_valid(&compiled);
    assert!(compiled.iter().all(|c| !c.is_nested));
    assert!(compiled[4].sql.ends_with("LIMIT -1 OFFSET 10"));
}

#[test]
fn test_default_filtered_all_dialects() {
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .exclude_type_columns()
        .set_columns("id, title")
        .unwrap()
        .max_records(25);

    assert_valid(&compile_all(&compiler));
}

#[test]
fn test_in_list_subquery_all_dialects() {
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .set_columns("id")
        .unwrap()
        .no_default_columns()
        .as_in_list();

    for c in compile_all(&compiler) {
        let outer = polyquery::sql::query::Query::new()
            .select(vec![col("name")])
            .from(polyquery::sql::query::TableRef::new("authors"))
            .filter(c.in_list_of(col("id")));
        validate_sql(&outer.to_sql(c.dialect), c.dialect).unwrap();
    }
}
