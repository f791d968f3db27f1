//! SQLite dialect.
//!
//! - ANSI identifier quoting (`"`)
//! - Booleans are integers
//! - `LIMIT -1` means "no limit" and is required before a bare OFFSET
//! - Compound SELECT operands cannot be parenthesized

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;

/// SQLite dialect.
#[derive(Debug, Clone, Copy)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_requiring_limit(limit, offset, "-1")
    }

    fn supports_parenthesized_set_operands(&self) -> bool {
        false
    }

    fn supports_groups_frame(&self) -> bool {
        true
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_sqlite(name)
    }
}
