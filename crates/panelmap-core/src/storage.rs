//! Remembers which property mapping was applied to a created panel property
//!
//! After a mapping is resolved and the panel property is created, the
//! runtime stores the property mapping under the property's id. Later writes
//! look it up here to find the right transformer without matching again.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::model::ResolvedProperty;

#[derive(Debug, Default)]
pub struct PropertyMappingStore {
    entries: RwLock<HashMap<Uuid, Arc<ResolvedProperty>>>,
}

impl PropertyMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a mapping, replacing any previous one for the same property
    pub fn store(&self, property_id: Uuid, mapping: impl Into<Arc<ResolvedProperty>>) {
        self.entries.write().insert(property_id, mapping.into());
    }

    pub fn get(&self, property_id: &Uuid) -> Option<Arc<ResolvedProperty>> {
        self.entries.read().get(property_id).cloned()
    }

    pub fn remove(&self, property_id: &Uuid) -> Option<Arc<ResolvedProperty>> {
        self.entries.write().remove(property_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
