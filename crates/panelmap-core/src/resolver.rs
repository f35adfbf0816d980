//! Priority-ordered mapping lookup with a per-context cache
//!
//! The mapping list and its cache live together in one [`ResolverState`]
//! that is replaced wholesale on reload, so a lookup always sees a list and
//! a cache from the same generation.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::derivation::DerivationRule;
use crate::model::{ChannelCategory, MappingContext, PropertyCategory, ResolvedMapping};

/// Mapping list plus the lookups cached against it
#[derive(Debug, Default)]
struct ResolverState {
    mappings: Vec<Arc<ResolvedMapping>>,
    /// Context -> first matching mapping, `None` cached as well
    cache: RwLock<HashMap<MappingContext, Option<Arc<ResolvedMapping>>>>,
    generation: u64,
}

/// Derived property declared for a channel category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelDerivation {
    pub identifier: PropertyCategory,
    pub source_property: PropertyCategory,
    pub rule: DerivationRule,
}

#[derive(Debug, Default)]
pub struct MappingResolver {
    state: RwLock<Arc<ResolverState>>,
}

impl MappingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a resolver over an initial mapping set
    pub fn with_mappings(mappings: Vec<ResolvedMapping>) -> Self {
        let resolver = Self::new();
        resolver.replace(mappings);
        resolver
    }

    fn snapshot(&self) -> Arc<ResolverState> {
        self.state.read().clone()
    }

    /// First mapping, in priority order, whose condition matches the context
    pub fn find(&self, context: &MappingContext) -> Option<Arc<ResolvedMapping>> {
        let state = self.snapshot();

        if let Some(cached) = state.cache.read().get(context) {
            debug!(key = %context.cache_key(), hit = cached.is_some(), "Mapping cache hit");
            return cached.clone();
        }

        let result = state
            .mappings
            .iter()
            .find(|mapping| mapping.condition.matches(context))
            .cloned();

        debug!(
            key = %context.cache_key(),
            mapping = result.as_ref().map(|m| m.name.as_str()).unwrap_or("<none>"),
            "Mapping cache miss"
        );

        let found = state
            .cache
            .write()
            .entry(context.clone())
            .or_insert(result)
            .clone();
        found
    }

    /// Swap in a new mapping set and an empty cache in a single step
    ///
    /// Mappings are ordered by priority, highest first. Equal priorities keep
    /// the order they were given in.
    pub fn replace(&self, mut mappings: Vec<ResolvedMapping>) {
        mappings.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut state = self.state.write();
        let next = ResolverState {
            mappings: mappings.into_iter().map(Arc::new).collect(),
            cache: RwLock::new(HashMap::new()),
            generation: state.generation + 1,
        };
        *state = Arc::new(next);
    }

    /// Drop cached lookups, keeping the mapping set
    pub fn clear_cache(&self) {
        self.snapshot().cache.write().clear();
    }

    pub fn cache_size(&self) -> usize {
        self.snapshot().cache.read().len()
    }

    /// Current mapping set in match order
    pub fn mappings(&self) -> Vec<Arc<ResolvedMapping>> {
        self.snapshot().mappings.clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of mapping sets swapped in so far
    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Derived properties declared on channels of a category, first wins
    pub fn derived_properties_for_channel(&self, category: ChannelCategory) -> Vec<ChannelDerivation> {
        let state = self.snapshot();
        let mut results: Vec<ChannelDerivation> = Vec::new();

        let channels = state
            .mappings
            .iter()
            .flat_map(|mapping| mapping.channels.iter())
            .filter(|channel| channel.category == category);

        for channel in channels {
            for derived in &channel.derived_properties {
                let Some(rule) = &derived.rule else {
                    continue;
                };
                if results.iter().any(|r| r.identifier == derived.identifier) {
                    continue;
                }
                results.push(ChannelDerivation {
                    identifier: derived.identifier,
                    source_property: derived.source_property,
                    rule: rule.clone(),
                });
            }
        }

        results
    }
}
