//! T-SQL (SQL Server / Azure SQL) dialect.
//!
//! Differences from ANSI that matter here:
//! - Square bracket identifier quoting (`[name]`)
//! - No native boolean literals
//! - OFFSET FETCH for pagination (requires ORDER BY)
//! - `@name` parameter placeholders
//! - N'...' prefix for Unicode strings
//! - String concatenation with `+`

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;

/// T-SQL (SQL Server) dialect.
#[derive(Debug, Clone, Copy)]
pub struct TSql;

impl SqlDialect for TSql {
    fn name(&self) -> &'static str {
        "tsql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_bracket(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        if !s.is_ascii() {
            helpers::quote_string_unicode(s)
        } else {
            helpers::quote_string_single(s)
        }
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn format_param(&self, name: &str) -> String {
        helpers::format_param_at(name)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_tsql(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        true
    }

    fn concat_operator(&self) -> &'static str {
        "+"
    }

    fn supports_nulls_ordering(&self) -> bool {
        // NULLS FIRST/LAST only exists from SQL Server 2022
        false
    }

    fn requires_window_order_by(&self) -> bool {
        true
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_tsql(name)
    }
}
