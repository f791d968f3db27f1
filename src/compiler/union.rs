//! Union path.
//!
//! Every source becomes one branch of a `UNION`. Branches are aligned to the
//! same column shape, tagged with synthetic ordering columns, and wrapped in
//! an outer query that applies the global order, grouping and paging.

use crate::error::{CompileError, CompileResult};
use crate::source::{merge_missing, ColumnList, ColumnSpec, Parameters, SourceQuery};
use crate::sql::expr::{
    col, lit_int, lit_str, row_number, star, Expr, ExprExt, WindowExt, WindowOrderBy,
};
use crate::sql::query::{OrderByExpr, Query, SelectExpr};

use super::{count_rows, rename_outer_params, Compilation, CompiledQuery, PlanKind, SourceOrdering};

impl Compilation<'_> {
    pub(super) fn compile_union(
        &self,
        mut sources: Vec<SourceQuery>,
        kind: PlanKind,
    ) -> CompileResult<CompiledQuery> {
        let c = self.compiler;
        let multi = sources.len() > 1;

        let mut explicit: Vec<String> = Vec::new();
        let mut helpers: Vec<String> = Vec::new();
        for source in &mut sources {
            self.prepare_columns(source, multi)?;
            let renames = self.include_global_params(source);
            self.push_global_columns(source, &renames);
            for name in source.columns.output_names() {
                if !explicit.contains(&name) {
                    explicit.push(name);
                }
            }
            self.push_helper_columns(source, &mut helpers);
            self.push_global_filter(source, &renames);
            self.warn_unbound(source);
        }
        helpers.retain(|h| !explicit.contains(h));

        let wildcard_single = !multi && sources.iter().all(|s| s.columns.returns_all_columns());
        let column_lists: Vec<ColumnList> = if multi {
            merge_missing(&sources.iter().map(|s| &s.columns).collect::<Vec<_>>())?
        } else {
            sources.iter().map(|s| s.columns.clone()).collect()
        };

        let paged = self.paging.is_paged();
        // Synthetic columns keep every branch row distinct under UNION. They
        // order the result only when it is neither grouped nor a subquery.
        let tag_rows = !wildcard_single;
        let order_by_source = tag_rows && !self.is_grouped() && !self.is_subquery();
        if paged && order_by_source && multi {
            if let Some(source) = sources.iter().find(|s| s.resolved_order().is_empty()) {
                return Err(CompileError::MissingOrderBy {
                    source_type: source.type_name.clone(),
                });
            }
        }

        let output: Vec<String> = if self.projects_globals_only() {
            self.global_columns()
                .iter()
                .filter_map(|spec| spec.output_name())
                .collect()
        } else {
            let names = column_lists
                .first()
                .map(ColumnList::output_names)
                .unwrap_or_default();
            if wildcard_single {
                std::iter::once("*".to_string()).chain(names).collect()
            } else {
                names.into_iter().filter(|n| !helpers.contains(n)).collect()
            }
        };
        self.check_output(&output)?;

        // Branches
        let mut params = Parameters::new();
        let mut branches = Vec::with_capacity(sources.len());
        let mut subtotals = Vec::new();
        for (ordinal, (source, columns)) in sources.iter().zip(&column_lists).enumerate() {
            let mut select = self.branch_select(columns);
            if tag_rows {
                select.extend(self.synthetic_columns(source, ordinal));
            } else if select.is_empty() {
                select.push(lit_str(&source.type_name).alias(&c.settings.source_type_column));
            }

            let own_paged = source.paging.is_paged();
            let mut branch = Query {
                select,
                from: Some(source.from.clone()),
                where_clause: source.filter.clone(),
                group_by: source.group_by.clone(),
                having: source.having.clone(),
                order_by: if own_paged {
                    source.resolved_order()
                } else {
                    vec![]
                },
                limit_offset: source.paging.to_limit_offset(),
                set_op: None,
            };
            let renames = params.include(&source.params);
            branch.rename_params(&renames);

            if paged && !self.is_subquery() {
                subtotals.push(count_rows(&branch));
            }
            branches.push(branch);
        }

        let Some(combined) = Query::union_of(branches, false) else {
            return Err(CompileError::UnsupportedOperation(
                "the union path needs at least one source".to_string(),
            ));
        };

        // Outer query
        let select: Vec<SelectExpr> = if self.projects_globals_only() {
            self.global_columns()
                .iter()
                .map(|spec| spec.to_select_expr())
                .collect()
        } else if wildcard_single {
            vec![SelectExpr::new(star())]
        } else {
            output.iter().map(|n| SelectExpr::new(col(n))).collect()
        };

        let mut outer = Query::new()
            .select(select)
            .from_subquery(combined, &c.settings.subquery_alias);
        outer.where_clause = self.result_filter().cloned();
        outer.group_by = c.group_by.clone();
        outer.having = c.having.clone();
        outer.order_by = self.outer_order(&sources, order_by_source, wildcard_single);
        outer.limit_offset = self.paging.to_limit_offset();

        let renames = params.include(&c.params);
        rename_outer_params(&mut outer, &renames);

        let total_count = if paged && !self.is_subquery() {
            if self.is_grouped() || self.result_filter().is_some() {
                let mut unpaged = outer.clone();
                unpaged.limit_offset = None;
                unpaged.order_by.clear();
                Some(Expr::from(count_rows(&unpaged)))
            } else {
                sum_counts(subtotals)
            }
        } else {
            None
        };

        tracing::debug!(
            branches = sources.len(),
            columns = output.len(),
            tagged = tag_rows,
            paged,
            "compiled union"
        );
        Ok(self.finish(outer, params, output, kind, true, total_count))
    }

    /// Add columns the outer query reads but a source does not project.
    ///
    /// Names added this way are recorded in `helpers` and left out of the
    /// result unless some source projects them on its own.
    fn push_helper_columns(&self, source: &mut SourceQuery, helpers: &mut Vec<String>) {
        if source.columns.returns_all_columns() {
            return;
        }
        let c = self.compiler;
        let globals = self.global_columns();

        let global_refs: Vec<String> = if self.projects_globals_only() {
            globals.iter().flat_map(|g| g.referenced_columns()).collect()
        } else {
            vec![]
        };
        let aliases: Vec<String> = globals
            .iter()
            .filter(|g| matches!(g, ColumnSpec::Expr { .. }))
            .filter_map(|g| g.output_name())
            .filter(|name| !global_refs.contains(name))
            .collect();

        let mut needed = global_refs.clone();
        needed.extend(c.order_by.iter().flat_map(|o| o.expr.referenced_columns()));
        needed.extend(c.group_by.iter().flat_map(Expr::referenced_columns));
        needed.extend(c.having.iter().flat_map(Expr::referenced_columns));
        needed.extend(self.result_filter().into_iter().flat_map(Expr::referenced_columns));

        for name in needed {
            if aliases.contains(&name) || source.columns.contains(&name) {
                continue;
            }
            let spec = if Self::source_has(source, &name) {
                ColumnSpec::name(&name)
            } else {
                ColumnSpec::null_as(&name)
            };
            source.columns.add_unique([spec]);
            if !helpers.contains(&name) {
                helpers.push(name);
            }
        }
    }

    /// Branch projections. Unaliased expressions take their output name so
    /// the outer query can address them.
    fn branch_select(&self, columns: &ColumnList) -> Vec<SelectExpr> {
        columns
            .entries()
            .iter()
            .map(|spec| {
                let mut item = spec.to_select_expr();
                if item.alias.is_none() && item.expr.as_column_name().is_none() {
                    item.alias = spec.output_name();
                }
                item
            })
            .collect()
    }

    /// Row number within the source, source ordinal, source type.
    fn synthetic_columns(&self, source: &SourceQuery, ordinal: usize) -> Vec<SelectExpr> {
        let settings = &self.compiler.settings;
        let window: Vec<WindowOrderBy> = source
            .resolved_order()
            .iter()
            .map(|o| WindowOrderBy {
                expr: o.expr.clone(),
                dir: o.dir,
                nulls: o.nulls,
            })
            .collect();

        vec![
            row_number()
                .over()
                .order_by(window)
                .build()
                .alias(&settings.row_number_column),
            lit_int(ordinal as i64).alias(&settings.source_ordinal_column),
            lit_str(&source.type_name).alias(&settings.source_type_column),
        ]
    }

    fn outer_order(
        &self,
        sources: &[SourceQuery],
        order_by_source: bool,
        wildcard_single: bool,
    ) -> Vec<OrderByExpr> {
        if self.is_subquery() {
            return vec![];
        }
        let c = self.compiler;
        let mut order = c.order_by.clone();

        if order_by_source {
            let ordinal = OrderByExpr::asc(col(&c.settings.source_ordinal_column));
            let row = OrderByExpr::asc(col(&c.settings.row_number_column));
            match c.ordering {
                SourceOrdering::Sequential => order.extend([ordinal, row]),
                SourceOrdering::Interleaved => order.extend([row, ordinal]),
            }
        } else if wildcard_single && !self.is_grouped() {
            if let Some(source) = sources.first() {
                order.extend(source.resolved_order());
            }
        } else if self.is_grouped() && self.paging.is_paged() && order.is_empty() {
            order = c.group_by.iter().cloned().map(OrderByExpr::asc).collect();
        }
        order
    }
}

/// Sum of per-branch counts as one expression.
fn sum_counts(subtotals: Vec<Query>) -> Option<Expr> {
    subtotals
        .into_iter()
        .map(Expr::from)
        .reduce(|total, next| total.add(next))
}
