//! Compiled result.

use crate::source::Parameters;
use crate::sql::dialect::Dialect;
use crate::sql::expr::{Expr, ExprExt};
use crate::sql::query::Query;

use super::plan::PlanKind;

/// One executable statement plus everything needed to run and page it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// SQL text for `dialect`.
    pub sql: String,
    /// Structured form of `sql`, for embedding or re-rendering.
    pub query: Query,
    /// Merged bound parameters; names match the placeholders in `sql`.
    pub params: Parameters,
    pub dialect: Dialect,
    /// Output column names in order. `*` stands for every source column.
    pub columns: Vec<String>,
    pub kind: PlanKind,
    /// Compiled for use as a scalar or IN-list sub-query.
    pub is_subquery: bool,
    /// The sources are wrapped in an outer query.
    pub is_nested: bool,
    /// Total row count ignoring paging, when the result is paged.
    pub total_count: Option<Expr>,
    pub total_count_alias: String,
}

impl CompiledQuery {
    /// `SELECT <total count> AS <alias>`.
    pub fn total_count_query(&self) -> Option<Query> {
        self.total_count
            .as_ref()
            .map(|count| Query::new().select(vec![count.clone().alias(&self.total_count_alias)]))
    }

    pub fn total_count_sql(&self) -> Option<String> {
        self.total_count_query().map(|q| q.to_sql(self.dialect))
    }

    /// The query as a scalar sub-query expression.
    pub fn to_subquery_expr(&self) -> Expr {
        Expr::from(self.query.clone())
    }

    /// `expr IN (<query>)`.
    pub fn in_list_of(&self, expr: Expr) -> Expr {
        expr.in_subquery(self.query.clone())
    }

    /// Render the same query for another dialect.
    pub fn render(&self, dialect: Dialect) -> String {
        self.query.to_sql(dialect)
    }
}

impl std::fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sql)
    }
}
