//! Fast path for a single source.
//!
//! The source's own SELECT is extended in place with the global columns,
//! filter, order and paging. Results that need an outer query fall back to
//! the union path with one branch.

use crate::error::CompileResult;
use crate::source::{ColumnList, SourceQuery};
use crate::sql::expr::Expr;
use crate::sql::query::OrderByExpr;

use super::{count_rows, Compilation, CompiledQuery, PlanKind};

impl Compilation<'_> {
    pub(super) fn compile_single(
        &self,
        mut source: SourceQuery,
        kind: PlanKind,
    ) -> CompileResult<CompiledQuery> {
        if self.needs_nesting(&source) {
            tracing::debug!(source = %source.type_name, "single source needs an outer query");
            return self.compile_union(vec![source], kind);
        }

        self.prepare_columns(&mut source, false)?;
        let renames = self.include_global_params(&mut source);
        self.push_global_columns(&mut source, &renames);
        self.push_global_filter(&mut source, &renames);

        if self.is_subquery() && !self.global_columns().is_empty() {
            source.columns = ColumnList::from_specs(self.global_columns().into_iter().cloned());
            source.columns.rename_params(&renames);
        }
        self.warn_unbound(&source);

        let names = source.columns.output_names();
        let output: Vec<String> = if source.columns.returns_all_columns() {
            std::iter::once("*".to_string()).chain(names).collect()
        } else {
            names
        };
        self.check_output(&output)?;

        let own_paged = source.paging.is_paged();
        let order_by: Vec<OrderByExpr> = if self.is_subquery() && !own_paged {
            vec![]
        } else {
            let mut order = self.global_order(&renames);
            order.extend(source.resolved_order());
            order
        };
        if !own_paged {
            source.paging = self.paging;
        }

        let mut query = source.to_query();
        query.order_by = order_by;

        let total_count = if self.paging.is_paged() && !self.is_subquery() {
            let mut unpaged = query.clone();
            unpaged.order_by.clear();
            unpaged.limit_offset = None;
            Some(Expr::from(count_rows(&unpaged)))
        } else {
            None
        };

        Ok(self.finish(query, source.params, output, kind, false, total_count))
    }

    /// Whether the global settings can only be applied over the source's
    /// result rather than merged into it.
    fn needs_nesting(&self, source: &SourceQuery) -> bool {
        let c = self.compiler;
        let has_globals = !self.global_columns().is_empty();
        let has_order = !c.order_by.is_empty();

        self.result_filter().is_some()
            || self.is_grouped()
            || (source.is_grouped() && (has_globals || has_order))
            || (source.paging.is_paged() && (self.paging.is_paged() || has_order))
    }
}
