//! Single-source query: one entity type's slice of a compiled result.

use std::collections::HashMap;

use serde_json::Value;

use crate::catalog::SourceCatalog;
use crate::error::CompileResult;
use crate::sql::dialect::Dialect;
use crate::sql::expr::{col, Expr, ExprExt};
use crate::sql::query::{FromSource, LimitOffset, OrderByExpr, Query, SelectExpr};

use super::columns::{parse_column_specs, parse_order_specs, ColumnList, ColumnSpec};
use super::params::Parameters;

// =============================================================================
// Paging
// =============================================================================

/// Row window: skip `offset`, return at most `max_records`, never past row `top`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Paging {
    pub offset: u64,
    pub max_records: Option<u64>,
    pub top: Option<u64>,
}

impl Paging {
    /// Effective LIMIT after combining `max_records` and `top`.
    pub fn limit(&self) -> Option<u64> {
        let remaining_top = self.top.map(|t| t.saturating_sub(self.offset));
        match (self.max_records, remaining_top) {
            (Some(m), Some(t)) => Some(m.min(t)),
            (m, t) => m.or(t),
        }
    }

    pub fn is_paged(&self) -> bool {
        self.offset > 0 || self.limit().is_some()
    }

    pub fn to_limit_offset(&self) -> Option<LimitOffset> {
        if !self.is_paged() {
            return None;
        }
        Some(LimitOffset {
            limit: self.limit(),
            offset: (self.offset > 0).then_some(self.offset),
        })
    }
}

// =============================================================================
// Source Query
// =============================================================================

/// A SELECT over one entity type's table.
///
/// Configuration methods return `&mut Self` so callers can chain them
/// inside a `register_type_with` callback.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceQuery {
    pub type_name: String,
    pub from: FromSource,
    pub filter: Option<Expr>,
    pub params: Parameters,
    pub columns: ColumnList,
    pub order_by: Vec<OrderByExpr>,
    /// Used only when paging needs a deterministic order and none was set.
    pub default_order_by: Vec<OrderByExpr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub paging: Paging,
    /// Columns the catalog reported for this type; empty when unknown.
    pub default_columns: Vec<String>,
}

impl SourceQuery {
    /// A query returning every column of `from`.
    pub fn new(type_name: &str, from: impl Into<FromSource>) -> Self {
        Self {
            type_name: type_name.to_string(),
            from: from.into(),
            filter: None,
            params: Parameters::new(),
            columns: ColumnList::wildcard(),
            order_by: vec![],
            default_order_by: vec![],
            group_by: vec![],
            having: None,
            paging: Paging::default(),
            default_columns: vec![],
        }
    }

    /// A query for `type_name` with table, default columns and default
    /// order taken from `catalog`.
    pub fn from_catalog(catalog: &dyn SourceCatalog, type_name: &str) -> CompileResult<Self> {
        let mut query = Self::new(type_name, catalog.table_for(type_name));
        query.default_columns = catalog.default_columns(type_name);
        query.default_order_by = catalog
            .default_order_by(type_name)
            .iter()
            .map(|spec| parse_order_specs(spec))
            .collect::<CompileResult<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect();
        Ok(query)
    }

    /// Deep copy used before a query is folded into a compiled plan.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    // -------------------------------------------------------------------------
    // Columns
    // -------------------------------------------------------------------------

    /// Replace the column list from a spec string.
    pub fn set_columns(&mut self, spec: &str) -> CompileResult<&mut Self> {
        self.columns.load(spec)?;
        Ok(self)
    }

    /// Append columns whose output names are not present yet.
    ///
    /// Adding to a list that is still `*` keeps the wildcard, so the new
    /// entries extend the default columns.
    pub fn add_columns(&mut self, spec: &str) -> CompileResult<&mut Self> {
        self.columns.add_unique(parse_column_specs(spec)?);
        Ok(self)
    }

    pub fn set_column_specs(&mut self, specs: impl IntoIterator<Item = ColumnSpec>) -> &mut Self {
        self.columns = ColumnList::from_specs(specs);
        self
    }

    pub fn add_column(&mut self, spec: ColumnSpec) -> &mut Self {
        self.columns.add_unique([spec]);
        self
    }

    /// Whether the caller narrowed the columns away from `*`.
    pub fn has_explicit_columns(&self) -> bool {
        !self.columns.returns_all_columns() || self.columns.len() > 1
    }

    // -------------------------------------------------------------------------
    // Ordering
    // -------------------------------------------------------------------------

    /// Replace the ORDER BY from a spec string.
    pub fn order_by(&mut self, spec: &str) -> CompileResult<&mut Self> {
        self.order_by = parse_order_specs(spec)?;
        Ok(self)
    }

    /// Replace the ORDER BY with one descending column.
    pub fn order_by_desc(&mut self, column: &str) -> &mut Self {
        self.order_by = vec![OrderByExpr::desc(col(column))];
        self
    }

    /// Append ORDER BY terms.
    pub fn then_by(&mut self, spec: &str) -> CompileResult<&mut Self> {
        self.order_by.extend(parse_order_specs(spec)?);
        Ok(self)
    }

    pub fn order_by_expr(&mut self, order: OrderByExpr) -> &mut Self {
        self.order_by.push(order);
        self
    }

    pub fn set_default_order_by(&mut self, spec: &str) -> CompileResult<&mut Self> {
        self.default_order_by = parse_order_specs(spec)?;
        Ok(self)
    }

    /// Explicit order, else the grouping keys of a grouped query, else the
    /// default order.
    pub fn resolved_order(&self) -> Vec<OrderByExpr> {
        if !self.order_by.is_empty() {
            self.order_by.clone()
        } else if self.is_grouped() {
            self.group_by.iter().cloned().map(OrderByExpr::new).collect()
        } else {
            self.default_order_by.clone()
        }
    }

    // -------------------------------------------------------------------------
    // Filtering and grouping
    // -------------------------------------------------------------------------

    /// AND a condition onto the filter.
    pub fn filter(&mut self, condition: Expr) -> &mut Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn param(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.params.set(name, value);
        self
    }

    pub fn group_by(&mut self, exprs: Vec<Expr>) -> &mut Self {
        self.group_by = exprs;
        self
    }

    pub fn having(&mut self, condition: Expr) -> &mut Self {
        self.having = Some(condition);
        self
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || self.having.is_some()
    }

    // -------------------------------------------------------------------------
    // Paging and source
    // -------------------------------------------------------------------------

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.paging.offset = offset;
        self
    }

    pub fn max_records(&mut self, max_records: u64) -> &mut Self {
        self.paging.max_records = Some(max_records);
        self
    }

    pub fn top(&mut self, top: u64) -> &mut Self {
        self.paging.top = Some(top);
        self
    }

    pub fn set_from(&mut self, from: impl Into<FromSource>) -> &mut Self {
        self.from = from.into();
        self
    }

    // -------------------------------------------------------------------------
    // Parameters
    // -------------------------------------------------------------------------

    /// Rename bound parameters in every clause and in the parameter set.
    pub fn rename_params(&mut self, renames: &HashMap<String, String>) {
        if renames.is_empty() {
            return;
        }
        if let Some(f) = &mut self.filter {
            f.rename_params(renames);
        }
        if let Some(h) = &mut self.having {
            h.rename_params(renames);
        }
        for g in &mut self.group_by {
            g.rename_params(renames);
        }
        for o in self.order_by.iter_mut().chain(self.default_order_by.iter_mut()) {
            o.expr.rename_params(renames);
        }
        self.columns.rename_params(renames);
        if let FromSource::Subquery { query, .. } = &mut self.from {
            query.rename_params(renames);
        }

        self.params = self
            .params
            .iter()
            .map(|(name, value)| {
                let name = renames.get(name).map_or(name, String::as_str);
                (name.to_string(), value.clone())
            })
            .collect();
    }

    /// Placeholders used anywhere in the query that have no bound value.
    pub fn unbound_params(&self) -> Vec<String> {
        let used = self.columns.param_names().into_iter().chain(
            self.filter
                .iter()
                .chain(self.group_by.iter())
                .chain(self.having.iter())
                .chain(self.order_by.iter().map(|o| &o.expr))
                .flat_map(Expr::param_names),
        );

        let mut unbound: Vec<String> = Vec::new();
        for name in used {
            if !self.params.contains(&name) && !unbound.contains(&name) {
                unbound.push(name);
            }
        }
        unbound
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    /// The SELECT this source stands for on its own.
    ///
    /// The default order applies only when the query is paged.
    pub fn to_query(&self) -> Query {
        let select = if self.columns.is_empty() {
            vec![SelectExpr::new(crate::sql::expr::star())]
        } else {
            self.columns.to_select_exprs()
        };

        let order_by = if self.paging.is_paged() {
            self.resolved_order()
        } else {
            self.order_by.clone()
        };

        Query {
            select,
            from: Some(self.from.clone()),
            where_clause: self.filter.clone(),
            group_by: self.group_by.clone(),
            having: self.having.clone(),
            order_by,
            limit_offset: self.paging.to_limit_offset(),
            set_op: None,
        }
    }

    /// SQL text and bound parameters for `dialect`.
    pub fn render(&self, dialect: Dialect) -> (String, Parameters) {
        (self.to_query().to_sql(dialect), self.params.clone())
    }
}
