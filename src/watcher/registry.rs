//! Unit registry: the set of logical units that should have a file.
//!
//! The registry is shared between whoever decides the unit population and
//! the synchronizer that mirrors it onto disk. Readers take a snapshot of
//! the names; nothing here touches the filesystem.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use super::WatchError;

/// Read-only view of the active unit names.
pub trait UnitRegistry: Send + Sync {
    fn unit_names(&self) -> BTreeSet<String>;
}

/// Shared in-memory unit registry.
///
/// Cloning is cheap and every clone sees the same units.
#[derive(Debug, Clone, Default)]
pub struct Units {
    inner: Arc<RwLock<BTreeSet<String>>>,
}

impl Units {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit, returning whether it was newly added.
    pub fn insert(&self, name: impl Into<String>) -> Result<bool, WatchError> {
        let name = name.into();
        validate_name(&name)?;

        Ok(self.inner.write().insert(name))
    }

    /// Unregister a unit, returning whether it was present.
    pub fn remove(&self, name: &str) -> bool {
        self.inner.write().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains(name)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Register units named `0` through `count - 1`.
    ///
    /// Returns the number of units that were not already present.
    pub fn populate(&self, count: usize) -> usize {
        let mut units = self.inner.write();
        let mut added = 0;
        for i in 0..count {
            let name = i.to_string();
            if units.insert(name.clone()) {
                crate::debug_event!("registry", "created unit", "{name}");
                added += 1;
            }
        }
        added
    }
}

impl UnitRegistry for Units {
    fn unit_names(&self) -> BTreeSet<String> {
        self.inner.read().clone()
    }
}

/// Unit names become file names under the base directory.
fn validate_name(name: &str) -> Result<(), WatchError> {
    let is_plain = !name.is_empty()
        && name != "."
        && name != ".."
        && Path::new(name).file_name().is_some_and(|f| f == name);

    if is_plain {
        Ok(())
    } else {
        Err(WatchError::InvalidUnitName {
            name: name.to_string(),
        })
    }
}
