//! Execution tests: compiled queries run against an in-memory SQLite database.
//!
//! These check row-level behavior that string assertions cannot: the fast
//! path and the union path return the same rows, unions keep source order,
//! and total counts match the unpaged result.

use polyquery::compiler::{CompileOptions, CompiledQuery, QueryCompiler};
use polyquery::config::Settings;
use polyquery::source::ColumnSpec;
use polyquery::sql::query::{OrderByExpr, Query, TableRef};
use polyquery::sql::{col, count_star, param, raw_sql, sum, Dialect, ExprExt};
use polyquery::Parameters;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::Value as JsonValue;

const SETTINGS: &str = r#"
[compiler]
dialect = "sqlite"

[types.article]
table = "articles"
columns = ["id", "title", "published_at", "views"]
default_order_by = ["published_at DESC", "id"]

[types.blog_post]
table = "blog_posts"
columns = ["id", "title", "author", "published_at", "views"]
default_order_by = ["id"]

[types.post]
subtypes = ["article", "blog_post"]
"#;

const SCHEMA: &str = r#"
CREATE TABLE articles (id INTEGER, title TEXT, published_at TEXT, views INTEGER);
CREATE TABLE blog_posts (id INTEGER, title TEXT, author TEXT, published_at TEXT, views INTEGER);

INSERT INTO articles VALUES
    (1, 'Rust ownership', '2024-03-01', 120),
    (2, 'Async Rust', '2024-05-10', 80),
    (3, 'Lifetimes', '2024-01-15', 300),
    (4, 'Macros', '2024-05-10', 40);

INSERT INTO blog_posts VALUES
    (1, 'Hello', 'alice', '2024-02-01', 10),
    (2, 'Release notes', 'bob', '2024-04-01', 500),
    (3, 'Rust tips', 'alice', '2024-06-01', 90);
"#;

// ============================================================================
// Helpers
// ============================================================================

fn connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    conn
}

fn compiler() -> QueryCompiler {
    let settings = Settings::from_toml(SETTINGS).unwrap();
    QueryCompiler::from_settings(&settings).unwrap()
}

fn to_sql_value(value: &JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Run `sql` with named parameters bound and return every row.
fn query(conn: &Connection, sql: &str, params: &Parameters) -> Vec<Vec<SqlValue>> {
    let mut stmt = conn
        .prepare(sql)
        .unwrap_or_else(|e| panic!("failed to prepare: {}\n{}", e, sql));
    for (name, value) in params.iter() {
        if let Some(index) = stmt.parameter_index(&format!(":{}", name)).unwrap() {
            stmt.raw_bind_parameter(index, to_sql_value(value)).unwrap();
        }
    }

    let width = stmt.column_count();
    let mut rows = stmt.raw_query();
    let mut out = Vec::new();
    while let Some(row) = rows.next().unwrap() {
        out.push((0..width).map(|i| row.get::<_, SqlValue>(i).unwrap()).collect());
    }
    out
}

fn rows(conn: &Connection, compiled: &CompiledQuery) -> Vec<Vec<SqlValue>> {
    query(conn, &compiled.sql, &compiled.params)
}

fn total_count(conn: &Connection, compiled: &CompiledQuery) -> i64 {
    let sql = compiled.total_count_sql().expect("paged query has a total count");
    match query(conn, &sql, &compiled.params).as_slice() {
        [row] => match row.as_slice() {
            [SqlValue::Integer(n)] => *n,
            other => panic!("unexpected count row: {:?}", other),
        },
        other => panic!("unexpected count result: {:?}", other),
    }
}

fn titles(rows: &[Vec<SqlValue>], index: usize) -> Vec<String> {
    rows.iter()
        .map(|row| match &row[index] {
            SqlValue::Text(s) => s.clone(),
            other => panic!("expected text, got {:?}", other),
        })
        .collect()
}

fn compile(compiler: &QueryCompiler, options: &CompileOptions) -> CompiledQuery {
    compiler.compile(options).unwrap().unwrap()
}

// ============================================================================
// Fast-Path Equivalence
// ============================================================================

#[test]
fn test_fast_path_matches_union_path() {
    let conn = connection();
    let mut compiler = compiler();
    compiler
        .register_type("article")
        .unwrap()
        .set_columns("id, title")
        .unwrap()
        .no_default_columns()
        .filter(col("views").gt(param("min_views")))
        .param("min_views", 50)
        .order_by("title")
        .unwrap();

    let fast = compile(&compiler, &CompileOptions::new());
    let union = compile(&compiler, &CompileOptions::new().force_union());
    assert!(!fast.is_nested);
    assert!(union.is_nested);

    let fast_rows = rows(&conn, &fast);
    assert_eq!(fast_rows, rows(&conn, &union));
    assert_eq!(
        titles(&fast_rows, 1),
        vec!["Async Rust", "Lifetimes", "Rust ownership"]
    );
}

#[test]
fn test_fast_path_matches_union_path_when_paged() {
    let conn = connection();
    let mut compiler = compiler();
    compiler
        .register_type("article")
        .unwrap()
        .max_records(2)
        .offset(1);

    let fast = compile(&compiler, &CompileOptions::new());
    let union = compile(&compiler, &CompileOptions::new().force_union());

    let fast_rows = rows(&conn, &fast);
    assert_eq!(fast_rows, rows(&conn, &union));
    assert_eq!(titles(&fast_rows, 1), vec!["Macros", "Rust ownership"]);
    assert_eq!(total_count(&conn, &fast), 4);
    assert_eq!(total_count(&conn, &union), 4);
}

// ============================================================================
// Union Ordering
// ============================================================================

#[test]
fn test_union_keeps_each_source_in_order() {
    let conn = connection();
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .set_columns("title, author")
        .unwrap()
        .no_default_columns();

    let result = rows(&conn, &compile(&compiler, &CompileOptions::new()));
    assert_eq!(
        titles(&result, 0),
        vec![
            "Async Rust",
            "Macros",
            "Rust ownership",
            "Lifetimes",
            "Hello",
            "Release notes",
            "Rust tips",
        ]
    );
    // Articles have no author column.
    assert!(result[..4].iter().all(|row| row[1] == SqlValue::Null));
    assert_eq!(result[4][1], SqlValue::Text("alice".into()));
}

#[test]
fn test_interleaved_union() {
    let conn = connection();
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .set_columns("title")
        .unwrap()
        .no_default_columns()
        .interleave_sources();

    let result = rows(&conn, &compile(&compiler, &CompileOptions::new()));
    assert_eq!(
        titles(&result, 0),
        vec![
            "Async Rust",
            "Hello",
            "Macros",
            "Release notes",
            "Rust ownership",
            "Rust tips",
            "Lifetimes",
        ]
    );
}

#[test]
fn test_global_order_spans_sources() {
    let conn = connection();
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .set_columns("title")
        .unwrap()
        .no_default_columns()
        .order_by("views DESC")
        .unwrap();

    let compiled = compile(&compiler, &CompileOptions::new());
    assert_eq!(compiled.columns, vec!["title"]);

    let result = rows(&conn, &compiled);
    assert_eq!(result[0].len(), 1);
    assert_eq!(
        titles(&result, 0),
        vec![
            "Release notes",
            "Lifetimes",
            "Rust ownership",
            "Rust tips",
            "Async Rust",
            "Macros",
            "Hello",
        ]
    );
}

// ============================================================================
// Total Count
// ============================================================================

#[test]
fn test_paged_union_total_count() {
    let conn = connection();
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .set_columns("id, title")
        .unwrap()
        .no_default_columns()
        .filter(col("views").gt(param("min_views")))
        .param("min_views", 50)
        .max_records(2)
        .offset(1);

    let compiled = compile(&compiler, &CompileOptions::new());
    let page = rows(&conn, &compiled);
    assert_eq!(titles(&page, 1), vec!["Rust ownership", "Lifetimes"]);

    let all = compile(
        &compiler,
        &CompileOptions::new().paging(Default::default()),
    );
    let unpaged = rows(&conn, &all);
    assert_eq!(unpaged.len(), 5);
    assert_eq!(total_count(&conn, &compiled), 5);
}

#[test]
fn test_result_filter_total_count() {
    let conn = connection();
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .set_columns("title")
        .unwrap()
        .no_default_columns()
        .filter(raw_sql("views >= :min_views"))
        .param("min_views", 100)
        .filter_on_result()
        .max_records(10);

    let compiled = compile(&compiler, &CompileOptions::new());
    assert_eq!(compiled.columns, vec!["title"]);

    let result = rows(&conn, &compiled);
    assert_eq!(
        titles(&result, 0),
        vec!["Rust ownership", "Lifetimes", "Release notes"]
    );
    assert_eq!(total_count(&conn, &compiled), 3);
}

#[test]
fn test_colliding_parameters_bind_separately() {
    let conn = connection();
    let mut compiler = compiler();
    compiler
        .register_type_with("article", |q| {
            q.filter(col("views").gt(param("min")));
            q.param("min", 100);
            Ok(())
        })
        .unwrap()
        .register_type_with("blog_post", |q| {
            q.filter(col("views").gt(param("min")));
            q.param("min", 50);
            Ok(())
        })
        .unwrap()
        .set_columns("title")
        .unwrap()
        .no_default_columns();

    let compiled = compile(&compiler, &CompileOptions::new());
    assert_eq!(compiled.params.len(), 2);

    let result = rows(&conn, &compiled);
    assert_eq!(
        titles(&result, 0),
        vec!["Rust ownership", "Lifetimes", "Release notes", "Rust tips"]
    );
}

// ============================================================================
// Grouping and Subqueries
// ============================================================================

#[test]
fn test_grouped_union_counts_every_row() {
    let conn = connection();
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .set_column_specs([
            ColumnSpec::name("published_at"),
            ColumnSpec::expr(count_star(), "n"),
        ])
        .no_default_columns()
        .group_by(vec![col("published_at")])
        .order_by("published_at")
        .unwrap();

    let result = rows(&conn, &compile(&compiler, &CompileOptions::new()));
    let counts: Vec<(String, i64)> = result
        .iter()
        .map(|row| match row.as_slice() {
            [SqlValue::Text(day), SqlValue::Integer(n)] => (day.clone(), *n),
            other => panic!("unexpected row: {:?}", other),
        })
        .collect();

    assert_eq!(
        counts,
        vec![
            ("2024-01-15".to_string(), 1),
            ("2024-02-01".to_string(), 1),
            ("2024-03-01".to_string(), 1),
            ("2024-04-01".to_string(), 1),
            ("2024-05-10".to_string(), 2),
            ("2024-06-01".to_string(), 1),
        ]
    );
    assert_eq!(counts.iter().map(|(_, n)| n).sum::<i64>(), 7);
}

#[test]
fn test_grouped_single_source_matches_direct_query() {
    let conn = connection();
    let mut compiler = compiler();
    compiler
        .register_type("article")
        .unwrap()
        .set_column_specs([
            ColumnSpec::name("published_at"),
            ColumnSpec::expr(sum(col("views")), "total_views"),
        ])
        .group_by(vec![col("published_at")])
        .order_by("published_at")
        .unwrap();

    let compiled = compile(&compiler, &CompileOptions::new());
    let expected = query(
        &conn,
        "SELECT published_at, SUM(views) FROM articles GROUP BY published_at ORDER BY published_at",
        &Parameters::new(),
    );
    assert_eq!(rows(&conn, &compiled), expected);
}

#[test]
fn test_scalar_subquery_over_union() {
    let conn = connection();
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .set_column_specs([ColumnSpec::expr(count_star(), "n")])
        .as_scalar_subquery();

    let compiled = compile(&compiler, &CompileOptions::new());
    let outer = Query::new().select(vec![compiled.to_subquery_expr().alias("total")]);
    let result = query(&conn, &outer.to_sql(Dialect::Sqlite), &compiled.params);
    assert_eq!(result, vec![vec![SqlValue::Integer(7)]]);
}

#[test]
fn test_in_list_subquery_over_union() {
    let conn = connection();
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .set_columns("id")
        .unwrap()
        .no_default_columns()
        .filter(col("views").gt(param("min_views")))
        .param("min_views", 100)
        .as_in_list();

    // Ids 1 and 3 from articles, 2 from blog posts.
    let compiled = compile(&compiler, &CompileOptions::new());
    let outer = Query::new()
        .select(vec![col("title")])
        .from(TableRef::new("articles"))
        .filter(compiled.in_list_of(col("id")))
        .order_by(vec![OrderByExpr::asc(col("id"))]);
    let result = query(&conn, &outer.to_sql(Dialect::Sqlite), &compiled.params);
    assert_eq!(
        titles(&result, 0),
        vec!["Rust ownership", "Async Rust", "Lifetimes"]
    );
}

// ============================================================================
// Global Parameters
// ============================================================================

#[test]
fn test_global_column_params_bind_without_filter() {
    let conn = connection();
    let mut compiler = compiler();
    compiler
        .register_type("post")
        .unwrap()
        .set_column_specs([
            ColumnSpec::name("title"),
            ColumnSpec::expr(col("views").add(param("bonus")), "score"),
        ])
        .no_default_columns()
        .param("bonus", 1000);

    let compiled = compile(&compiler, &CompileOptions::new());
    assert_eq!(compiled.params.len(), 1);

    let scores: Vec<SqlValue> = rows(&conn, &compiled)
        .into_iter()
        .map(|row| row[1].clone())
        .collect();
    assert_eq!(
        scores,
        [1080, 1040, 1120, 1300, 1010, 1500, 1090]
            .into_iter()
            .map(SqlValue::Integer)
            .collect::<Vec<_>>()
    );

}

#[test]
fn test_global_column_params_bind_on_fast_path() {
    let conn = connection();
    let mut compiler = compiler();
    compiler
        .register_type("article")
        .unwrap()
        .set_column_specs([
            ColumnSpec::name("title"),
            ColumnSpec::expr(col("views").add(param("bonus")), "score"),
        ])
        .param("bonus", 1000);

    let compiled = compile(&compiler, &CompileOptions::new());
    assert!(!compiled.is_nested);

    let result = rows(&conn, &compiled);
    assert_eq!(
        titles(&result, 0),
        vec!["Async Rust", "Macros", "Rust ownership", "Lifetimes"]
    );
    assert_eq!(
        result.iter().map(|row| row[1].clone()).collect::<Vec<_>>(),
        [1080, 1040, 1120, 1300]
            .into_iter()
            .map(SqlValue::Integer)
            .collect::<Vec<_>>()
    );
}
