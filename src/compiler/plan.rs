//! Query plan selection.
//!
//! Picks how a compiler's registered sources become one statement. Rules
//! are tried in order and the first match wins:
//!
//! 1. Nothing registered, no default source, no custom source: no query.
//! 2. A custom source or a forced union: the union path.
//! 3. Per-type columns excluded and a default source exists: the default
//!    source filtered to the registered type names.
//! 4. No per-type sources: the default source unfiltered.
//! 5. One per-type source: that source alone.
//! 6. Otherwise: the union path.

/// How a compiled query was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanKind {
    DefaultFiltered,
    Default,
    Single,
    Union,
}

impl std::fmt::Display for PlanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlanKind::DefaultFiltered => "default-filtered",
            PlanKind::Default => "default",
            PlanKind::Single => "single",
            PlanKind::Union => "union",
        };
        write!(f, "{}", name)
    }
}

/// The selected plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPlan {
    /// Nothing to compile.
    Empty,
    /// The default source restricted to these type names.
    DefaultFiltered { types: Vec<String> },
    /// The default source as-is.
    Default,
    /// The per-type source at this registration index.
    Single(usize),
    /// Every source, aligned and combined with UNION.
    Union,
}

impl QueryPlan {
    pub fn kind(&self) -> Option<PlanKind> {
        match self {
            QueryPlan::Empty => None,
            QueryPlan::DefaultFiltered { .. } => Some(PlanKind::DefaultFiltered),
            QueryPlan::Default => Some(PlanKind::Default),
            QueryPlan::Single(_) => Some(PlanKind::Single),
            QueryPlan::Union => Some(PlanKind::Union),
        }
    }
}

/// What the selector needs to know about a compiler.
#[derive(Debug, Clone, Default)]
pub(crate) struct PlanInput<'a> {
    pub type_names: Vec<&'a str>,
    pub has_default: bool,
    pub exclude_type_columns: bool,
    pub has_custom_source: bool,
    pub force_union: bool,
}

pub(crate) fn select_plan(input: &PlanInput<'_>) -> QueryPlan {
    let count = input.type_names.len();

    if count == 0 && !input.has_default && !input.has_custom_source {
        return QueryPlan::Empty;
    }
    if input.has_custom_source || input.force_union {
        return QueryPlan::Union;
    }
    if input.exclude_type_columns && input.has_default && count > 0 {
        return QueryPlan::DefaultFiltered {
            types: input.type_names.iter().map(|t| t.to_string()).collect(),
        };
    }
    match count {
        0 => QueryPlan::Default,
        1 => QueryPlan::Single(0),
        _ => QueryPlan::Union,
    }
}
