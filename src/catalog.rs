//! SourceCatalog trait definition.
//!
//! The catalog maps entity type names to the tables they live in and the
//! columns those tables are known to have. The compiler asks it when a type
//! is first registered; after that every source query owns its own copy.

use std::collections::BTreeMap;

use crate::config::{Settings, SettingsError, TypeSettings};
use crate::sql::query::TableRef;

/// Trait for resolving entity types to tables.
///
/// Every method has a default, so an empty impl maps each type to a table
/// of the same name with unknown columns.
///
/// # Example
///
/// ```ignore
/// use polyquery::catalog::{SourceCatalog, StaticCatalog};
///
/// let catalog = StaticCatalog::from_settings(&settings)?;
/// let concrete = catalog.resolve_types("post");   // ["article", "blog_post"]
/// let table = catalog.table_for("article");       // content.articles
/// ```
pub trait SourceCatalog: Send + Sync + std::fmt::Debug {
    /// Concrete types a requested name stands for.
    fn resolve_types(&self, name: &str) -> Vec<String> {
        vec![name.to_string()]
    }

    /// Table backing a concrete type.
    fn table_for(&self, type_name: &str) -> TableRef {
        TableRef::new(type_name)
    }

    /// Column names the type's table has; empty when unknown.
    fn default_columns(&self, type_name: &str) -> Vec<String> {
        let _ = type_name;
        vec![]
    }

    /// Order specs giving the type a deterministic row order.
    fn default_order_by(&self, type_name: &str) -> Vec<String> {
        let _ = type_name;
        vec![]
    }
}

/// Catalog that knows nothing beyond type names.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCatalog;

impl SourceCatalog for IdentityCatalog {}

// =============================================================================
// Static catalog
// =============================================================================

/// Catalog backed by `[types.<name>]` settings.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    types: BTreeMap<String, TypeSettings>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from settings, expanding environment variables in table names.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let types = settings
            .types
            .iter()
            .map(|(name, ts)| Ok((name.clone(), ts.resolved()?)))
            .collect::<Result<BTreeMap<_, _>, SettingsError>>()?;
        Ok(Self { types })
    }

    pub fn with_type(mut self, name: &str, settings: TypeSettings) -> Self {
        self.types.insert(name.to_string(), settings);
        self
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&TypeSettings> {
        self.types.get(name)
    }

    fn expand_into(&self, name: &str, path: &mut Vec<String>, out: &mut Vec<String>) {
        if path.iter().any(|s| s == name) {
            tracing::warn!(type_name = name, "subtype cycle ignored");
            return;
        }
        path.push(name.to_string());

        match self.types.get(name) {
            Some(ts) if !ts.subtypes.is_empty() => {
                for subtype in &ts.subtypes {
                    self.expand_into(subtype, path, out);
                }
            }
            _ => {
                if !out.iter().any(|o| o == name) {
                    out.push(name.to_string());
                }
            }
        }
        path.pop();
    }
}

impl SourceCatalog for StaticCatalog {
    /// Expands subtypes depth first; a type without subtypes is concrete.
    fn resolve_types(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        self.expand_into(name, &mut Vec::new(), &mut out);
        out
    }

    fn table_for(&self, type_name: &str) -> TableRef {
        match self.types.get(type_name) {
            Some(ts) => ts.table_ref(type_name),
            None => TableRef::new(type_name),
        }
    }

    fn default_columns(&self, type_name: &str) -> Vec<String> {
        self.types
            .get(type_name)
            .map(|ts| ts.columns.clone())
            .unwrap_or_default()
    }

    fn default_order_by(&self, type_name: &str) -> Vec<String> {
        self.types
            .get(type_name)
            .map(|ts| ts.default_order_by.clone())
            .unwrap_or_default()
    }
}
