//! Per-type query building blocks.
//!
//! - [`params`] - bound parameter set with rename-on-collision merging
//! - [`columns`] - column lists and spec-string parsing
//! - [`query`] - the single-source query a compiler folds into its result

pub mod columns;
pub mod params;
pub mod query;

pub use columns::{merge_missing, parse_column_specs, parse_order_specs, ColumnList, ColumnSpec};
pub use params::Parameters;
pub use query::{Paging, SourceQuery};
