//! MySQL / MariaDB dialect.
//!
//! - Backtick identifier quoting
//! - `||` is logical OR unless PIPES_AS_CONCAT is set
//! - OFFSET is only valid after LIMIT

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;

/// Largest row count MySQL accepts in LIMIT; stands in for "no limit".
const UNBOUNDED_LIMIT: &str = "18446744073709551615";

/// MySQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn format_bool(&self, b: bool) -> &'static str {
        helpers::format_bool_numeric(b)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_requiring_limit(limit, offset, UNBOUNDED_LIMIT)
    }

    fn concat_operator(&self) -> &'static str {
        // Only meaningful with PIPES_AS_CONCAT; callers should use CONCAT()
        "||"
    }

    fn supports_concat_operator(&self) -> bool {
        false
    }

    fn supports_nulls_ordering(&self) -> bool {
        false
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_mysql(name)
    }
}
