//! Multi-source query compiler.
//!
//! [`QueryCompiler`] collects per-type source queries plus global
//! projection, filtering, ordering, grouping and paging, and compiles them
//! into one statement:
//!
//! ```text
//! register types ──► plan selector ──┬─► fast path: one cloned source,
//!                                    │   globals merged in place
//!                                    └─► union path: clone all sources,
//!                                        align columns, inject ordering
//!                                        columns, UNION, wrap in an
//!                                        outer query
//! ```
//!
//! Configuration takes `&mut self`; [`QueryCompiler::compile`] takes
//! `&self` and may be called repeatedly with different options.

mod output;
mod plan;
mod single;
mod union;

pub use output::CompiledQuery;
pub use plan::{PlanKind, QueryPlan};

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::catalog::{IdentityCatalog, SourceCatalog, StaticCatalog};
use crate::config::{CompilerSettings, Settings, SettingsError};
use crate::error::{CompileError, CompileResult};
use crate::source::{
    parse_column_specs, parse_order_specs, ColumnList, ColumnSpec, Paging, Parameters,
    SourceQuery,
};
use crate::sql::dialect::Dialect;
use crate::sql::expr::{col, count_star, lit_str, Expr, ExprExt};
use crate::sql::query::{FromSource, OrderByExpr, Query};

use plan::PlanInput;

/// Type name given to the default source.
pub const DEFAULT_SOURCE: &str = "default";

/// Type name given to a custom source when no type is registered.
pub const CUSTOM_SOURCE: &str = "custom";

/// Alias of the derived table a row count wraps.
const COUNTED_ALIAS: &str = "counted";

// =============================================================================
// Options
// =============================================================================

/// Whether the result is embedded in another query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubqueryMode {
    #[default]
    None,
    /// `(SELECT x ...)` used as a value.
    Scalar,
    /// `expr IN (SELECT x ...)`.
    InList,
}

/// Tie-break order between sources in a union.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceOrdering {
    /// All rows of the first source, then the second, and so on.
    #[default]
    Sequential,
    /// First row of each source, then the second row of each, and so on.
    Interleaved,
}

/// Execution-time options for [`QueryCompiler::compile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Overrides the compiler's dialect.
    pub dialect: Option<Dialect>,
    /// Overrides the compiler's paging.
    pub paging: Option<Paging>,
    /// Take the union path even for a single source.
    pub force_union: bool,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn paging(mut self, paging: Paging) -> Self {
        self.paging = Some(paging);
        self
    }

    pub fn force_union(mut self) -> Self {
        self.force_union = true;
        self
    }
}

// =============================================================================
// Compiler
// =============================================================================

/// Builds one SQL statement over several entity types.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    catalog: Arc<dyn SourceCatalog>,
    settings: CompilerSettings,
    dialect: Dialect,

    queries: Vec<SourceQuery>,
    index: HashMap<String, usize>,
    default_query: Option<SourceQuery>,
    custom_source: Option<FromSource>,

    columns: ColumnList,
    order_by: Vec<OrderByExpr>,
    exclude_type_columns: bool,
    no_default_columns: bool,

    filter: Option<Expr>,
    params: Parameters,
    filter_on_result: bool,

    group_by: Vec<Expr>,
    having: Option<Expr>,
    paging: Paging,

    subquery_mode: SubqueryMode,
    ordering: SourceOrdering,
}

impl Default for QueryCompiler {
    fn default() -> Self {
        Self::new(IdentityCatalog)
    }
}

impl QueryCompiler {
    pub fn new(catalog: impl SourceCatalog + 'static) -> Self {
        Self::with_catalog(Arc::new(catalog))
    }

    pub fn with_catalog(catalog: Arc<dyn SourceCatalog>) -> Self {
        Self {
            catalog,
            settings: CompilerSettings::default(),
            dialect: Dialect::default(),
            queries: vec![],
            index: HashMap::new(),
            default_query: None,
            custom_source: None,
            columns: ColumnList::new(),
            order_by: vec![],
            exclude_type_columns: false,
            no_default_columns: false,
            filter: None,
            params: Parameters::new(),
            filter_on_result: false,
            group_by: vec![],
            having: None,
            paging: Paging::default(),
            subquery_mode: SubqueryMode::None,
            ordering: SourceOrdering::Sequential,
        }
    }

    /// Apply compiler naming and dialect settings.
    pub fn with_settings(mut self, settings: CompilerSettings) -> Result<Self, SettingsError> {
        self.dialect = settings.dialect()?;
        self.settings = settings;
        Ok(self)
    }

    /// Compiler over a [`StaticCatalog`] built from `settings`, with the
    /// `[default]` source installed when configured.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let catalog = StaticCatalog::from_settings(settings)?;
        let mut compiler = Self::new(catalog).with_settings(settings.compiler.clone())?;

        if let Some(default) = &settings.default {
            let default = default.resolved()?;
            if default.table.is_none() {
                return Err(SettingsError::InvalidConfig(
                    "[default] needs a table".to_string(),
                ));
            }
            let mut query = SourceQuery::new(DEFAULT_SOURCE, default.table_ref(DEFAULT_SOURCE));
            query.default_columns = default.columns.clone();
            query.default_order_by = parse_order_specs(&default.default_order_by.join(", "))
                .map_err(|e| SettingsError::InvalidConfig(e.to_string()))?;
            compiler.set_default_source(query);
        }
        Ok(compiler)
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn set_dialect(&mut self, dialect: Dialect) -> &mut Self {
        self.dialect = dialect;
        self
    }

    // -------------------------------------------------------------------------
    // Sources
    // -------------------------------------------------------------------------

    /// Register every concrete type `name` resolves to.
    pub fn register_type(&mut self, name: &str) -> CompileResult<&mut Self> {
        for type_name in self.catalog.resolve_types(name) {
            self.ensure_query(&type_name)?;
        }
        Ok(self)
    }

    /// Register `name` and run `configure` on each of its concrete types.
    pub fn register_type_with<F>(&mut self, name: &str, mut configure: F) -> CompileResult<&mut Self>
    where
        F: FnMut(&mut SourceQuery) -> CompileResult<()>,
    {
        for type_name in self.catalog.resolve_types(name) {
            configure(self.ensure_query(&type_name)?)?;
        }
        Ok(self)
    }

    /// The source for `type_name`, created from the catalog on first use.
    pub fn ensure_query(&mut self, type_name: &str) -> CompileResult<&mut SourceQuery> {
        let position = match self.index.get(type_name) {
            Some(&position) => position,
            None => {
                let query = SourceQuery::from_catalog(self.catalog.as_ref(), type_name)?;
                tracing::debug!(
                    type_name,
                    ordinal = self.queries.len(),
                    known_columns = query.default_columns.len(),
                    "registered source"
                );
                self.queries.push(query);
                self.index.insert(type_name.to_string(), self.queries.len() - 1);
                self.queries.len() - 1
            }
        };
        Ok(&mut self.queries[position])
    }

    pub fn query(&self, type_name: &str) -> Option<&SourceQuery> {
        self.index.get(type_name).map(|&i| &self.queries[i])
    }

    /// Registered sources in registration order.
    pub fn queries(&self) -> &[SourceQuery] {
        &self.queries
    }

    pub fn type_names(&self) -> Vec<&str> {
        self.queries.iter().map(|q| q.type_name.as_str()).collect()
    }

    /// Generic source used when no type is registered or per-type columns
    /// are excluded.
    pub fn set_default_source(&mut self, query: SourceQuery) -> &mut Self {
        self.default_query = Some(query);
        self
    }

    pub fn default_source(&self) -> Option<&SourceQuery> {
        self.default_query.as_ref()
    }

    /// Read the single source from `from` instead of its table.
    pub fn set_custom_source(&mut self, from: impl Into<FromSource>) -> CompileResult<&mut Self> {
        if self.queries.len() > 1 {
            return Err(CompileError::UnsupportedOperation(format!(
                "a custom source needs at most one registered type, found {}",
                self.queries.len()
            )));
        }
        self.custom_source = Some(from.into());
        Ok(self)
    }

    // -------------------------------------------------------------------------
    // Global projection and order
    // -------------------------------------------------------------------------

    /// Replace the global column list from a spec string.
    pub fn set_columns(&mut self, spec: &str) -> CompileResult<&mut Self> {
        self.columns.load(spec)?;
        Ok(self)
    }

    pub fn add_columns(&mut self, spec: &str) -> CompileResult<&mut Self> {
        self.columns.add_unique(parse_column_specs(spec)?);
        Ok(self)
    }

    pub fn set_column_specs(&mut self, specs: impl IntoIterator<Item = ColumnSpec>) -> &mut Self {
        self.columns = ColumnList::from_specs(specs);
        self
    }

    /// Replace the global ORDER BY from a spec string.
    pub fn order_by(&mut self, spec: &str) -> CompileResult<&mut Self> {
        self.order_by = parse_order_specs(spec)?;
        Ok(self)
    }

    pub fn order_by_desc(&mut self, column: &str) -> &mut Self {
        self.order_by = vec![OrderByExpr::desc(col(column))];
        self
    }

    /// Append global ORDER BY terms.
    pub fn then_by(&mut self, spec: &str) -> CompileResult<&mut Self> {
        self.order_by.extend(parse_order_specs(spec)?);
        Ok(self)
    }

    /// Sources without explicit columns contribute only what global
    /// columns and ordering need.
    pub fn no_default_columns(&mut self) -> &mut Self {
        self.no_default_columns = true;
        self
    }

    /// Ignore per-type columns; the result has the global columns only.
    pub fn exclude_type_columns(&mut self) -> &mut Self {
        self.exclude_type_columns = true;
        self
    }

    // -------------------------------------------------------------------------
    // Global filter, grouping and paging
    // -------------------------------------------------------------------------

    /// AND a condition onto the global filter.
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

    /// Apply the global filter to the combined result instead of each source.
    pub fn filter_on_result(&mut self) -> &mut Self {
        self.filter_on_result = true;
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

    // -------------------------------------------------------------------------
    // Result shape
    // -------------------------------------------------------------------------

    pub fn as_scalar_subquery(&mut self) -> &mut Self {
        self.subquery_mode = SubqueryMode::Scalar;
        self
    }

    pub fn as_in_list(&mut self) -> &mut Self {
        self.subquery_mode = SubqueryMode::InList;
        self
    }

    /// Order a union by row number first, so sources alternate.
    pub fn interleave_sources(&mut self) -> &mut Self {
        self.ordering = SourceOrdering::Interleaved;
        self
    }

    // -------------------------------------------------------------------------
    // Compilation
    // -------------------------------------------------------------------------

    /// The plan `compile` would take with `options`.
    pub fn plan(&self, options: &CompileOptions) -> QueryPlan {
        plan::select_plan(&PlanInput {
            type_names: self.type_names(),
            has_default: self.default_query.is_some(),
            exclude_type_columns: self.exclude_type_columns,
            has_custom_source: self.custom_source.is_some(),
            force_union: options.force_union,
        })
    }

    /// Compile to one statement, or `None` when nothing is registered.
    pub fn compile(&self, options: &CompileOptions) -> CompileResult<Option<CompiledQuery>> {
        self.check_settings()?;

        let dialect = options.dialect.unwrap_or(self.dialect);
        let paging = match self.subquery_mode {
            SubqueryMode::None => options.paging.unwrap_or(self.paging),
            SubqueryMode::Scalar | SubqueryMode::InList => Paging::default(),
        };

        let plan = self.plan(options);
        tracing::debug!(?plan, %dialect, sources = self.queries.len(), "selected query plan");

        let compiled = match plan {
            QueryPlan::Empty => return Ok(None),
            QueryPlan::DefaultFiltered { types } => {
                let Some(default) = &self.default_query else {
                    return Ok(None);
                };
                let mut source = default.fork();
                source.filter(
                    col(&self.settings.type_column)
                        .in_list(types.iter().map(|t| lit_str(t)).collect()),
                );
                Compilation::new(self, dialect, paging, true)
                    .compile_single(source, PlanKind::DefaultFiltered)?
            }
            QueryPlan::Default => {
                let Some(default) = &self.default_query else {
                    return Ok(None);
                };
                Compilation::new(self, dialect, paging, true)
                    .compile_single(default.fork(), PlanKind::Default)?
            }
            QueryPlan::Single(position) => {
                let Some(source) = self.queries.get(position) else {
                    return Ok(None);
                };
                Compilation::new(self, dialect, paging, false)
                    .compile_single(source.fork(), PlanKind::Single)?
            }
            QueryPlan::Union => {
                let (sources, uses_default) = self.union_sources();
                if sources.is_empty() {
                    return Ok(None);
                }
                Compilation::new(self, dialect, paging, uses_default)
                    .compile_union(sources, PlanKind::Union)?
            }
        };

        tracing::trace!(sql = %compiled.sql, "compiled query");
        Ok(Some(compiled))
    }

    /// Errors that depend on the combination of settings.
    fn check_settings(&self) -> CompileResult<()> {
        if self.custom_source.is_none() {
            return Ok(());
        }
        if self.queries.len() > 1 {
            return Err(CompileError::UnsupportedOperation(format!(
                "a custom source needs at most one registered type, found {}",
                self.queries.len()
            )));
        }
        if let Some(query) = self.queries.iter().find(|q| q.has_explicit_columns()) {
            return Err(CompileError::ConflictingSettings(format!(
                "custom source cannot be combined with explicit columns on '{}'",
                query.type_name
            )));
        }
        Ok(())
    }

    /// Cloned sources for the union path, with the custom source applied.
    fn union_sources(&self) -> (Vec<SourceQuery>, bool) {
        let (mut sources, uses_default) = if !self.queries.is_empty() {
            (self.queries.iter().map(SourceQuery::fork).collect(), false)
        } else if let Some(default) = &self.default_query {
            (vec![default.fork()], true)
        } else {
            match &self.custom_source {
                Some(custom) => (vec![SourceQuery::new(CUSTOM_SOURCE, custom.clone())], false),
                None => (vec![], false),
            }
        };

        if let Some(custom) = &self.custom_source {
            for source in &mut sources {
                source.set_from(custom.clone());
            }
        }
        (sources, uses_default)
    }
}

// =============================================================================
// Compilation state shared by both paths
// =============================================================================

/// One `compile` call: the compiler plus the options resolved for it.
struct Compilation<'a> {
    compiler: &'a QueryCompiler,
    dialect: Dialect,
    paging: Paging,
    /// The sources are the default source rather than per-type sources.
    uses_default: bool,
}

impl<'a> Compilation<'a> {
    fn new(compiler: &'a QueryCompiler, dialect: Dialect, paging: Paging, uses_default: bool) -> Self {
        Self {
            compiler,
            dialect,
            paging,
            uses_default,
        }
    }

    fn is_grouped(&self) -> bool {
        !self.compiler.group_by.is_empty() || self.compiler.having.is_some()
    }

    fn is_subquery(&self) -> bool {
        self.compiler.subquery_mode != SubqueryMode::None
    }

    fn result_filter(&self) -> Option<&Expr> {
        if self.compiler.filter_on_result {
            self.compiler.filter.as_ref()
        } else {
            None
        }
    }

    fn global_columns(&self) -> Vec<&ColumnSpec> {
        self.compiler
            .columns
            .entries()
            .iter()
            .filter(|e| !e.is_wildcard())
            .collect()
    }

    /// The result is exactly the global columns, evaluated over the sources.
    fn projects_globals_only(&self) -> bool {
        !self.global_columns().is_empty() && (self.is_grouped() || self.is_subquery())
    }

    fn excludes_source_columns(&self) -> bool {
        self.compiler.exclude_type_columns
            && (!self.uses_default || !self.global_columns().is_empty())
    }

    /// Whether `source` can provide column `name`.
    fn source_has(source: &SourceQuery, name: &str) -> bool {
        source.columns.contains(name)
            || source.default_columns.is_empty()
            || source.default_columns.iter().any(|d| d == name)
    }

    /// Resolve a source's own columns before global columns are merged in.
    fn prepare_columns(&self, source: &mut SourceQuery, expansion_required: bool) -> CompileResult<()> {
        if self.excludes_source_columns() {
            source.columns.clear();
            return Ok(());
        }
        if !source.columns.returns_all_columns() {
            return Ok(());
        }
        if self.compiler.no_default_columns {
            source.columns.remove_wildcard();
            return Ok(());
        }

        let attempt = expansion_required || !self.global_columns().is_empty();
        if attempt && !source.columns.expand_wildcard(&source.default_columns) {
            if expansion_required {
                return Err(CompileError::UnresolvedWildcard {
                    source_type: source.type_name.clone(),
                });
            }
            tracing::debug!(source = %source.type_name, "keeping '*' with unknown default columns");
        }
        Ok(())
    }

    /// Bind the global parameters in a source.
    ///
    /// The returned renames apply to every global expression placed in that
    /// source. Raw fragments hide their placeholders from `param_names`, so
    /// all global parameters are bound whether or not they appear used.
    fn include_global_params(&self, source: &mut SourceQuery) -> HashMap<String, String> {
        source.params.include(&self.compiler.params)
    }

    /// Global order with renames from [`Self::include_global_params`] applied.
    fn global_order(&self, renames: &HashMap<String, String>) -> Vec<OrderByExpr> {
        self.compiler
            .order_by
            .iter()
            .cloned()
            .map(|mut o| {
                o.expr.rename_params(renames);
                o
            })
            .collect()
    }

    /// Append global columns the source does not define itself. A global
    /// column reading a column the source lacks becomes `NULL AS name`.
    fn push_global_columns(&self, source: &mut SourceQuery, renames: &HashMap<String, String>) {
        if self.projects_globals_only() {
            return;
        }
        for spec in self.global_columns() {
            let Some(name) = spec.output_name() else {
                continue;
            };
            if source.columns.contains(&name) {
                continue;
            }
            // `*` over unknown columns already returns a bare column.
            if source.columns.returns_all_columns() && matches!(spec, ColumnSpec::Name(_)) {
                continue;
            }
            let available = spec
                .referenced_columns()
                .iter()
                .all(|r| Self::source_has(source, r));
            let spec = if available {
                let mut spec = spec.clone();
                spec.rename_params(renames);
                spec
            } else {
                ColumnSpec::null_as(&name)
            };
            source.columns.add_unique([spec]);
        }
    }

    /// AND the global filter onto a source.
    fn push_global_filter(&self, source: &mut SourceQuery, renames: &HashMap<String, String>) {
        if self.compiler.filter_on_result {
            return;
        }
        let Some(filter) = &self.compiler.filter else {
            return;
        };
        let mut filter = filter.clone();
        filter.rename_params(renames);
        source.filter(filter);
    }

    fn warn_unbound(&self, source: &SourceQuery) {
        let c = self.compiler;
        let global: Vec<String> = c
            .columns
            .param_names()
            .into_iter()
            .chain(
                c.order_by
                    .iter()
                    .map(|o| &o.expr)
                    .chain(c.group_by.iter())
                    .chain(c.having.iter())
                    .flat_map(Expr::param_names),
            )
            .filter(|name| !c.params.contains(name))
            .collect();

        for name in source.unbound_params().into_iter().chain(global) {
            tracing::warn!(
                source = %source.type_name,
                param = %name,
                "query references a parameter with no bound value"
            );
        }
    }

    /// Reject results that cannot be produced in the requested shape.
    fn check_output(&self, output: &[String]) -> CompileResult<()> {
        if self.is_subquery() {
            let single = output.len() == 1 && output[0] != "*";
            if !single {
                return Err(CompileError::NotSingleColumn {
                    found: output.iter().filter(|n| n.as_str() != "*").count(),
                });
            }
        } else if output.is_empty() {
            return Err(CompileError::ConflictingSettings(
                "the result has no columns: per-type columns are excluded and no global columns are set"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn finish(
        &self,
        query: Query,
        params: Parameters,
        columns: Vec<String>,
        kind: PlanKind,
        is_nested: bool,
        total_count: Option<Expr>,
    ) -> CompiledQuery {
        CompiledQuery {
            sql: query.to_sql(self.dialect),
            query,
            params,
            dialect: self.dialect,
            columns,
            kind,
            is_subquery: self.is_subquery(),
            is_nested,
            total_count,
            total_count_alias: self.compiler.settings.total_count_alias.clone(),
        }
    }
}

/// `SELECT COUNT(*)` over the rows `query` returns.
///
/// A plain filtered SELECT is counted against its own FROM; anything that
/// groups, pages or combines is wrapped as a derived table.
fn count_rows(query: &Query) -> Query {
    let plain = query.group_by.is_empty()
        && query.having.is_none()
        && query.limit_offset.is_none()
        && query.set_op.is_none();

    if plain {
        Query {
            select: vec![count_star().into()],
            from: query.from.clone(),
            where_clause: query.where_clause.clone(),
            ..Default::default()
        }
    } else {
        let mut inner = query.clone();
        if inner.limit_offset.is_none() {
            inner.order_by.clear();
        }
        Query::new()
            .select(vec![count_star()])
            .from_subquery(inner, COUNTED_ALIAS)
    }
}

/// Rename parameters in a query's own clauses, leaving its FROM alone.
fn rename_outer_params(query: &mut Query, renames: &HashMap<String, String>) {
    for item in &mut query.select {
        item.expr.rename_params(renames);
    }
    if let Some(w) = &mut query.where_clause {
        w.rename_params(renames);
    }
    for g in &mut query.group_by {
        g.rename_params(renames);
    }
    if let Some(h) = &mut query.having {
        h.rename_params(renames);
    }
    for o in &mut query.order_by {
        o.expr.rename_params(renames);
    }
}
