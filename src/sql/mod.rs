//! SQL generation module.
//!
//! This module provides a type-safe SQL builder that generates multi-dialect SQL.
//! It includes:
//!
//! - [`query`] - SELECT / UNION query builder
//! - [`expr`] - Expression AST and builder DSL
//! - [`token`] - Token types for SQL generation
//! - [`dialect`] - SQL dialect implementations

pub mod dialect;
pub mod expr;
pub mod query;
pub mod token;

#[doc(hidden)]
pub mod test_utils;

// Re-export commonly used types at the sql module level
pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    avg, coalesce, col, count, count_distinct, count_star, func, lit_bool, lit_float, lit_int,
    lit_null, lit_str, max, min, param, raw_sql, row_number, star, sum, table_col, table_star,
    BinaryOperator, Expr, ExprExt, Literal, UnaryOperator, WindowExt, WindowOrderBy,
};
pub use query::{
    FromSource, LimitOffset, NullsOrder, OrderByExpr, Query, SelectExpr, SetOperation, SortDir,
    TableRef,
};
pub use token::{Token, TokenStream};
