//! Operation registry: id → operation, grouped by category for listing

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;

use super::analysis::LinearRegression;
use super::input::{DefineConstant, FromCsv};
use super::math::{ColumnMath, ConstantMath};
use super::table::{FilterRows, SortRows};
use super::{Args, Category, Operation};
use crate::error::{BakeError, Result};

static BUILTIN: Lazy<Registry> = Lazy::new(Registry::builtin);

/// The built-in catalog, constructed once per process
pub fn builtin_registry() -> &'static Registry {
    &BUILTIN
}

/// Immutable catalog. Registration order is kept for listing.
#[derive(Clone, Default)]
pub struct Registry {
    order: Vec<Arc<dyn Operation>>,
    by_id: HashMap<&'static str, Arc<dyn Operation>>,
}

impl Registry {
    pub fn builtin() -> Self {
        Self::from_operations(vec![
            Arc::new(FromCsv) as Arc<dyn Operation>,
            Arc::new(DefineConstant),
            Arc::new(FilterRows),
            Arc::new(ColumnMath::new()),
            Arc::new(SortRows),
            Arc::new(ConstantMath::new()),
            Arc::new(LinearRegression),
        ])
    }

    /// Build from a list; a later duplicate id replaces the earlier one
    pub fn from_operations(ops: Vec<Arc<dyn Operation>>) -> Self {
        let mut registry = Self::default();
        for op in ops {
            if let Some(pos) = registry.order.iter().position(|o| o.id() == op.id()) {
                registry.order.remove(pos);
            }
            registry.by_id.insert(op.id(), Arc::clone(&op));
            registry.order.push(op);
        }
        registry
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Operation>> {
        self.by_id.get(id)
    }

    /// Like [`get`](Self::get) but fails with `UnknownOperation`
    pub fn require(&self, id: &str) -> Result<&Arc<dyn Operation>> {
        self.get(id).ok_or_else(|| BakeError::UnknownOperation {
            operation_id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Operation>> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn by_category(&self) -> BTreeMap<Category, Vec<&Arc<dyn Operation>>> {
        let mut groups: BTreeMap<Category, Vec<&Arc<dyn Operation>>> = BTreeMap::new();
        for op in &self.order {
            groups.entry(op.category()).or_default().push(op);
        }
        groups
    }

    /// Argument defaults for a new step of operation `id`
    pub fn defaults_for(&self, id: &str) -> Result<Args> {
        Ok(self.require(id)?.default_args())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.order.iter().map(|op| op.id()))
            .finish()
    }
}
