//! # Polyquery
//!
//! Compiles queries over several entity types, each stored in its own table,
//! into one multi-dialect SQL statement.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Catalog (type → table, columns, order)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [register_type]
//! ┌─────────────────────────────────────────────────────────┐
//! │       SourceQuery per type  +  global settings           │
//! │  (columns, filter, params, order, grouping, paging)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [plan selector]
//! ┌─────────────────────────────────────────────────────────┐
//! │   fast path (one source)   │   union path (aligned,      │
//! │                            │   ordered, wrapped)         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [sql]
//! ┌─────────────────────────────────────────────────────────┐
//! │        CompiledQuery: SQL + parameters + total count     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use polyquery::prelude::*;
//!
//! let mut compiler = QueryCompiler::from_settings(&Settings::load()?)?;
//! compiler
//!     .register_type("post")?
//!     .set_columns("id, title, author")?
//!     .filter(col("title").like(param("needle")))
//!     .param("needle", "%rust%")
//!     .max_records(20);
//!
//! if let Some(compiled) = compiler.compile(&CompileOptions::new())? {
//!     println!("{}", compiled.sql);
//! }
//! ```

pub mod catalog;
pub mod compiler;
pub mod config;
pub mod error;
pub mod source;
pub mod sql;

pub use sql::dialect;
pub use sql::expr;
pub use sql::query;
pub use sql::token;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::catalog::{IdentityCatalog, SourceCatalog, StaticCatalog};
    pub use crate::compiler::{
        CompileOptions, CompiledQuery, PlanKind, QueryCompiler, QueryPlan, SourceOrdering,
        SubqueryMode,
    };
    pub use crate::config::{CompilerSettings, Settings, SettingsError, TypeSettings};
    pub use crate::dialect::{Dialect, SqlDialect};
    pub use crate::error::{CompileError, CompileResult};
    pub use crate::expr::{
        // Constructors
        col,
        count_star,
        func,
        lit_bool,
        lit_int,
        lit_null,
        lit_str,
        param,
        raw_sql,
        star,
        // Types
        Expr,
        ExprExt,
    };
    pub use crate::query::{FromSource, OrderByExpr, Query, SelectExpr, TableRef};
    pub use crate::source::{ColumnList, ColumnSpec, Paging, Parameters, SourceQuery};
}

pub use compiler::{CompileOptions, CompiledQuery, QueryCompiler};
pub use dialect::Dialect;
pub use error::{CompileError, CompileResult};
pub use source::{Parameters, SourceQuery};
