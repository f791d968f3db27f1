//! Compilation errors.
//!
//! Every variant is a caller configuration defect detected before any SQL
//! text is produced. An empty compiler is not an error; it compiles to
//! `Ok(None)`.

/// Error raised while configuring or compiling a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("source '{source_type}' has no ORDER BY and no default order, but the paged union needs a deterministic order")]
    MissingOrderBy { source_type: String },

    #[error("Conflicting settings: {0}")]
    ConflictingSettings(String),

    #[error("cannot expand '*' for source '{source_type}': its default columns are unknown")]
    UnresolvedWildcard { source_type: String },

    #[error("sub-query mode needs exactly one output column, found {found}")]
    NotSingleColumn { found: usize },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid column spec: {0}")]
    ColumnParse(String),
}

pub type CompileResult<T> = Result<T, CompileError>;
