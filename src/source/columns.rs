//! Column lists and column-spec parsing.
//!
//! A column list is an ordered set of projections keyed by output name.
//! Lists are built from explicit [`ColumnSpec`]s or parsed from a
//! comma-separated spec string such as `"id, UPPER(title) AS title, *"`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CompileError, CompileResult};
use crate::sql::expr::{col, lit_null, raw_sql, star, Expr};
use crate::sql::query::{NullsOrder, OrderByExpr, SelectExpr, SortDir};

// =============================================================================
// Column Spec
// =============================================================================

/// One projection in a column list.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSpec {
    /// A bare column of the source, projected under its own name.
    Name(String),
    /// An arbitrary expression, optionally aliased.
    Expr { expr: Expr, alias: Option<String> },
    /// `*`: every column the source has.
    Wildcard,
}

impl ColumnSpec {
    pub fn name(name: &str) -> Self {
        ColumnSpec::Name(name.to_string())
    }

    pub fn expr(expr: Expr, alias: &str) -> Self {
        ColumnSpec::Expr {
            expr,
            alias: Some(alias.to_string()),
        }
    }

    /// `NULL AS name`, used to pad a source that lacks a column.
    pub fn null_as(name: &str) -> Self {
        Self::expr(lit_null(), name)
    }

    /// The name this projection appears under in the result.
    pub fn output_name(&self) -> Option<String> {
        match self {
            ColumnSpec::Name(name) => Some(name.clone()),
            ColumnSpec::Expr {
                alias: Some(alias), ..
            } => Some(alias.clone()),
            ColumnSpec::Expr { expr, alias: None } => Some(match expr {
                Expr::Column { column, .. } => column.clone(),
                Expr::Raw(sql) => sql.clone(),
                other => other.to_sql(Default::default()),
            }),
            ColumnSpec::Wildcard => None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, ColumnSpec::Wildcard)
    }

    /// Source columns this projection reads.
    pub fn referenced_columns(&self) -> Vec<String> {
        match self {
            ColumnSpec::Name(name) => vec![name.clone()],
            ColumnSpec::Expr { expr, .. } => expr.referenced_columns(),
            ColumnSpec::Wildcard => vec![],
        }
    }

    /// Placeholders this projection uses.
    pub fn param_names(&self) -> Vec<String> {
        match self {
            ColumnSpec::Expr { expr, .. } => expr.param_names(),
            _ => vec![],
        }
    }

    pub fn rename_params(&mut self, renames: &HashMap<String, String>) {
        if let ColumnSpec::Expr { expr, .. } = self {
            expr.rename_params(renames);
        }
    }

    pub fn to_select_expr(&self) -> SelectExpr {
        match self {
            ColumnSpec::Name(name) => SelectExpr::new(col(name)),
            ColumnSpec::Expr { expr, alias } => SelectExpr {
                expr: expr.clone(),
                alias: alias.clone(),
            },
            ColumnSpec::Wildcard => SelectExpr::new(star()),
        }
    }
}

// =============================================================================
// Column List
// =============================================================================

/// Ordered projections with unique output names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnList {
    entries: Vec<ColumnSpec>,
}

impl ColumnList {
    pub fn new() -> Self {
        Self::default()
    }

    /// A list that returns every column of its source.
    pub fn wildcard() -> Self {
        Self {
            entries: vec![ColumnSpec::Wildcard],
        }
    }

    /// Parse a comma-separated column spec string.
    pub fn parse(spec: &str) -> CompileResult<Self> {
        Ok(Self::from_specs(parse_column_specs(spec)?))
    }

    /// Build from explicit specs; later duplicates of an output name are dropped.
    pub fn from_specs(specs: impl IntoIterator<Item = ColumnSpec>) -> Self {
        let mut list = Self::new();
        list.add_unique(specs);
        list
    }

    /// Replace the contents with a parsed spec string.
    pub fn load(&mut self, spec: &str) -> CompileResult<()> {
        *self = Self::parse(spec)?;
        Ok(())
    }

    /// Append entries whose output name is not already present.
    pub fn add_unique(&mut self, specs: impl IntoIterator<Item = ColumnSpec>) {
        for spec in specs {
            let present = match spec.output_name() {
                Some(name) => self.contains(&name),
                None => self.returns_all_columns(),
            };
            if !present {
                self.entries.push(spec);
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&ColumnSpec> {
        self.entries
            .iter()
            .find(|e| e.output_name().as_deref() == Some(name))
    }

    pub fn entries(&self) -> &[ColumnSpec] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn returns_all_columns(&self) -> bool {
        self.entries.iter().any(ColumnSpec::is_wildcard)
    }

    pub fn is_single_column(&self) -> bool {
        self.entries.len() == 1 && !self.returns_all_columns()
    }

    /// Output names in order. The wildcard contributes nothing.
    pub fn output_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(ColumnSpec::output_name)
            .collect()
    }

    /// Source columns read by any entry, first-seen order.
    pub fn referenced_columns(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for entry in &self.entries {
            for name in entry.referenced_columns() {
                if !out.contains(&name) {
                    out.push(name);
                }
            }
        }
        out
    }

    pub fn param_names(&self) -> Vec<String> {
        self.entries.iter().flat_map(ColumnSpec::param_names).collect()
    }

    pub fn rename_params(&mut self, renames: &HashMap<String, String>) {
        for entry in &mut self.entries {
            entry.rename_params(renames);
        }
    }

    pub fn to_select_exprs(&self) -> Vec<SelectExpr> {
        self.entries.iter().map(ColumnSpec::to_select_expr).collect()
    }

    /// Replace `*` with `defaults`.
    ///
    /// Defaults come first, except names an explicit entry already defines;
    /// explicit entries follow in their original order. Returns `false` and
    /// leaves the list untouched when `*` is present but `defaults` is empty.
    pub fn expand_wildcard(&mut self, defaults: &[String]) -> bool {
        if !self.returns_all_columns() {
            return true;
        }
        if defaults.is_empty() {
            return false;
        }

        let explicit: Vec<ColumnSpec> = self
            .entries
            .drain(..)
            .filter(|e| !e.is_wildcard())
            .collect();
        let explicit_names: Vec<String> =
            explicit.iter().filter_map(ColumnSpec::output_name).collect();

        self.add_unique(
            defaults
                .iter()
                .filter(|d| !explicit_names.contains(d))
                .map(|d| ColumnSpec::Name(d.clone())),
        );
        self.add_unique(explicit);
        true
    }

    /// Drop `*`, keeping explicit entries.
    pub fn remove_wildcard(&mut self) {
        self.entries.retain(|e| !e.is_wildcard());
    }
}

/// Align several column lists to one shape.
///
/// The canonical order is every output name in order of first appearance
/// across `lists`. Each returned list follows that order, with `NULL AS name`
/// for names it lacks. A list still holding `*` cannot be aligned.
pub fn merge_missing(lists: &[&ColumnList]) -> CompileResult<Vec<ColumnList>> {
    if let Some(index) = lists.iter().position(|l| l.returns_all_columns()) {
        return Err(CompileError::ConflictingSettings(format!(
            "column list {} still holds '*' and cannot be aligned",
            index
        )));
    }

    let mut canonical: Vec<String> = Vec::new();
    for list in lists {
        for name in list.output_names() {
            if !canonical.contains(&name) {
                canonical.push(name);
            }
        }
    }

    Ok(lists
        .iter()
        .map(|list| ColumnList {
            entries: canonical
                .iter()
                .map(|name| {
                    list.get(name)
                        .cloned()
                        .unwrap_or_else(|| ColumnSpec::null_as(name))
                })
                .collect(),
        })
        .collect())
}

// =============================================================================
// Spec String Parsing
// =============================================================================

static PLAIN_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

static QUOTED_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"((?:[^"]|"")+)"$"#).unwrap());

/// `AS alias` ending a column spec.
static ALIAS_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)^\s+as\s+("(?:[^"]|"")+"|[A-Za-z_][A-Za-z0-9_]*)\s*$"#).unwrap()
});

/// `expr [ASC|DESC] [NULLS FIRST|LAST]`
static ORDER_TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(.*?)(?:\s+(asc|desc))?(?:\s+nulls\s+(first|last))?$").unwrap()
});

/// Split on commas that are outside parentheses and quotes.
fn split_top_level(spec: &str) -> CompileResult<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in spec.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth < 0 {
                    return Err(CompileError::ColumnParse(format!(
                        "unbalanced ')' in '{}'",
                        spec
                    )));
                }
            }
            (None, ',') if depth == 0 => {
                parts.push(&spec[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 || quote.is_some() {
        return Err(CompileError::ColumnParse(format!(
            "unterminated parenthesis or quote in '{}'",
            spec
        )));
    }
    parts.push(&spec[start..]);
    Ok(parts)
}

/// Split `body AS alias` at a top-level `AS`.
fn split_alias(part: &str) -> (&str, Option<String>) {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    for (i, c) in part.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, c) if depth == 0 && c.is_whitespace() => {
                if let Some(caps) = ALIAS_TAIL.captures(&part[i..]) {
                    let alias = caps.get(1).map_or("", |m| m.as_str());
                    return (part[..i].trim(), Some(unquote_ident(alias)));
                }
            }
            _ => {}
        }
    }
    (part, None)
}

fn unquote_ident(ident: &str) -> String {
    match QUOTED_IDENT.captures(ident) {
        Some(caps) => caps
            .get(1)
            .map_or(String::new(), |m| m.as_str().replace("\"\"", "\"")),
        None => ident.to_string(),
    }
}

/// Turn one spec fragment into a column reference if it is one.
fn as_identifier(body: &str) -> Option<String> {
    if PLAIN_IDENT.is_match(body) {
        Some(body.to_string())
    } else if QUOTED_IDENT.is_match(body) {
        Some(unquote_ident(body))
    } else {
        None
    }
}

/// Parse `"id, UPPER(title) AS title, *"` into specs.
///
/// An empty or blank string yields no specs.
pub fn parse_column_specs(spec: &str) -> CompileResult<Vec<ColumnSpec>> {
    if spec.trim().is_empty() {
        return Ok(vec![]);
    }

    split_top_level(spec)?
        .into_iter()
        .map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return Err(CompileError::ColumnParse(format!(
                    "empty column in '{}'",
                    spec
                )));
            }
            if part == "*" {
                return Ok(ColumnSpec::Wildcard);
            }

            let (body, alias) = split_alias(part);
            Ok(match (as_identifier(body), alias) {
                (Some(name), None) => ColumnSpec::Name(name),
                (Some(name), Some(alias)) if alias == name => ColumnSpec::Name(name),
                (Some(name), Some(alias)) => ColumnSpec::Expr {
                    expr: col(&name),
                    alias: Some(alias),
                },
                (None, alias) => ColumnSpec::Expr {
                    expr: raw_sql(body),
                    alias,
                },
            })
        })
        .collect()
}

/// Parse `"published_at DESC NULLS LAST, id"` into ORDER BY terms.
pub fn parse_order_specs(spec: &str) -> CompileResult<Vec<OrderByExpr>> {
    if spec.trim().is_empty() {
        return Ok(vec![]);
    }

    split_top_level(spec)?
        .into_iter()
        .map(|part| {
            let part = part.trim();
            let caps = ORDER_TERM
                .captures(part)
                .ok_or_else(|| CompileError::ColumnParse(format!("bad order term '{}'", part)))?;
            let body = caps.get(1).map_or("", |m| m.as_str()).trim();
            if body.is_empty() {
                return Err(CompileError::ColumnParse(format!(
                    "empty order term in '{}'",
                    spec
                )));
            }

            let expr = match as_identifier(body) {
                Some(name) => col(&name),
                None => raw_sql(body),
            };
            let dir = caps.get(2).map(|m| {
                if m.as_str().eq_ignore_ascii_case("desc") {
                    SortDir::Desc
                } else {
                    SortDir::Asc
                }
            });
            let nulls = caps.get(3).map(|m| {
                if m.as_str().eq_ignore_ascii_case("first") {
                    NullsOrder::First
                } else {
                    NullsOrder::Last
                }
            });
            Ok(OrderByExpr { expr, dir, nulls })
        })
        .collect()
}
