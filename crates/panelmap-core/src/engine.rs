//! Mapping engine: owns the registries and resolver and drives reloads
//!
//! Each load pass reads into fresh registries seeded with the built-in
//! transformers. The registries, the resolver over the new mapping set and
//! the load report are then swapped in as one [`MappingCatalog`], so a reader
//! never pairs one pass's transformers with another pass's mappings, and
//! names that disappear from the files also disappear from lookups.

use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::derivation::DerivationRegistry;
use crate::loader::{FileLoadResult, LoadReport, MappingError, MappingLoader, MappingPaths};
use crate::model::{ChannelCategory, MappingContext, ResolvedMapping, ResolvedProperty};
use crate::resolver::{ChannelDerivation, MappingResolver};
use crate::storage::PropertyMappingStore;
use crate::template;
use crate::transformer::{Transformer, TransformerRegistry};

/// Everything produced by one load pass
#[derive(Debug)]
pub struct MappingCatalog {
    pub transformers: TransformerRegistry,
    pub derivations: DerivationRegistry,
    pub resolver: MappingResolver,
    /// `None` until the first pass has run
    pub report: Option<LoadReport>,
    /// Number of passes swapped in so far
    pub generation: u64,
}

impl MappingCatalog {
    fn empty() -> Self {
        Self {
            transformers: TransformerRegistry::with_builtins(),
            derivations: DerivationRegistry::new(),
            resolver: MappingResolver::new(),
            report: None,
            generation: 0,
        }
    }
}

#[derive(Debug)]
pub struct MappingEngine {
    loader: MappingLoader,
    catalog: RwLock<Arc<MappingCatalog>>,
    properties: PropertyMappingStore,
    /// Serializes load passes
    reload_lock: Mutex<()>,
}

impl MappingEngine {
    /// Create an engine over the given tiers; nothing is loaded yet
    pub fn new(paths: MappingPaths) -> Result<Self, MappingError> {
        Ok(Self {
            loader: MappingLoader::new(paths)?,
            catalog: RwLock::new(Arc::new(MappingCatalog::empty())),
            properties: PropertyMappingStore::new(),
            reload_lock: Mutex::new(()),
        })
    }

    /// Create an engine and run the first load pass
    pub fn load(paths: MappingPaths) -> Result<Self, MappingError> {
        let engine = Self::new(paths)?;
        engine.load_all();
        Ok(engine)
    }

    /// Read every tier and atomically replace the active catalog
    pub fn load_all(&self) -> LoadReport {
        let _guard = self.reload_lock.lock();

        let transformers = TransformerRegistry::with_builtins();
        let derivations = DerivationRegistry::new();
        let outcome = self.loader.load(&transformers, &derivations);

        let next = MappingCatalog {
            transformers,
            derivations,
            resolver: MappingResolver::with_mappings(outcome.mappings),
            report: Some(outcome.report.clone()),
            generation: self.catalog.read().generation + 1,
        };
        *self.catalog.write() = Arc::new(next);

        outcome.report
    }

    /// Re-run a full load pass; the lookup cache starts empty afterwards
    pub fn reload(&self) -> LoadReport {
        info!(
            builtin = %self.builtin_mappings_path().display(),
            user = %self.user_mappings_path().display(),
            "Reloading mappings"
        );
        self.load_all()
    }

    /// Current catalog; stays consistent while held, even across a reload
    pub fn catalog(&self) -> Arc<MappingCatalog> {
        self.catalog.read().clone()
    }

    pub fn find(&self, context: &MappingContext) -> Option<Arc<ResolvedMapping>> {
        self.catalog().resolver.find(context)
    }

    /// Named transformer, identity when unknown
    pub fn transformer(&self, name: &str) -> Arc<Transformer> {
        self.catalog().transformers.get(name)
    }

    /// Transformer for a resolved property, inline definition first
    pub fn transformer_for(&self, property: &ResolvedProperty) -> Arc<Transformer> {
        self.catalog().transformers.for_property(property)
    }

    pub fn property_store(&self) -> &PropertyMappingStore {
        &self.properties
    }

    pub fn has_derivation(&self, name: &str) -> bool {
        self.catalog().derivations.has(name)
    }

    pub fn derived_properties_for_channel(&self, category: ChannelCategory) -> Vec<ChannelDerivation> {
        self.catalog().resolver.derived_properties_for_channel(category)
    }

    /// Per-file results of the last load pass
    pub fn load_results(&self) -> Vec<FileLoadResult> {
        self.catalog()
            .report
            .as_ref()
            .map(|report| report.files.clone())
            .unwrap_or_default()
    }

    pub fn last_report(&self) -> Option<LoadReport> {
        self.catalog().report.clone()
    }

    pub fn mappings(&self) -> Vec<Arc<ResolvedMapping>> {
        self.catalog().resolver.mappings()
    }

    pub fn clear_cache(&self) {
        self.catalog().resolver.clear_cache();
    }

    pub fn cache_size(&self) -> usize {
        self.catalog().resolver.cache_size()
    }

    pub fn generation(&self) -> u64 {
        self.catalog().generation
    }

    pub fn builtin_mappings_path(&self) -> &Path {
        &self.loader.paths().builtin
    }

    pub fn user_mappings_path(&self) -> &Path {
        &self.loader.paths().user
    }

    pub fn interpolate(&self, template: &str, context: &MappingContext) -> String {
        template::interpolate(template, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoadWarning;
    use crate::model::{ComponentType, DeviceCategory};
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), content).unwrap();
    }

    const USER_TRANSFORMER: &str = r#"
version: "1.0"
transformers:
  custom_scale:
    type: scale
    input_range: [0, 10]
    output_range: [0, 100]
mappings: []
"#;

    #[test]
    fn test_registries_are_swapped_on_reload() {
        let dir = TempDir::new().unwrap();
        let user = dir.path().join("user");
        write(&user, "custom.yaml", USER_TRANSFORMER);

        let engine = MappingEngine::load(MappingPaths::new(dir.path().join("builtin"), &user)).unwrap();
        assert!(engine.catalog().transformers.has("custom_scale"));
        assert!(engine.catalog().transformers.has("boolean_state"));

        std::fs::remove_file(user.join("custom.yaml")).unwrap();
        engine.reload();
        assert!(!engine.catalog().transformers.has("custom_scale"));
        assert!(engine.catalog().transformers.has("boolean_state"));
        assert!(engine.transformer("custom_scale").is_identity());
    }

    #[test]
    fn test_held_catalog_is_not_mixed_with_a_reload() {
        let dir = TempDir::new().unwrap();
        let user = dir.path().join("user");
        write(
            &user,
            "custom.yaml",
            r#"
version: "1.0"
transformers:
  custom_scale:
    type: scale
    input_range: [0, 10]
    output_range: [0, 100]
mappings:
  - name: scaled_switch
    match:
      component_type: switch
    channels:
      - identifier: "switch:{key}"
        category: switcher
        properties:
          - device_property: level
            panel:
              identifier: level
              data_type: uchar
            transformer: custom_scale
"#,
        );

        let engine = MappingEngine::load(MappingPaths::new(dir.path().join("builtin"), &user)).unwrap();
        let context = MappingContext::new(ComponentType::Switch, 0, DeviceCategory::Generic);
        let before = engine.catalog();
        assert_eq!(before.generation, 1);

        std::fs::remove_file(user.join("custom.yaml")).unwrap();
        engine.reload();

        let mapping = before.resolver.find(&context).unwrap();
        let property = &mapping.channels[0].properties[0];
        assert!(!before.transformers.for_property(property).is_identity());

        let after = engine.catalog();
        assert_eq!(after.generation, 2);
        assert!(after.resolver.find(&context).is_none());
        assert!(!after.transformers.has("custom_scale"));
    }

    #[test]
    fn test_missing_roots_load_empty() {
        let dir = TempDir::new().unwrap();
        let engine = MappingEngine::load(MappingPaths::new(dir.path().join("a"), dir.path().join("b"))).unwrap();
        let report = engine.last_report().unwrap();
        assert_eq!(report.mappings_loaded, 0);
        assert_eq!(report.files_failed, 0);
        assert!(engine.load_results().is_empty());
        assert!(matches!(
            report.pass_warnings.as_slice(),
            [LoadWarning::MissingDerivationRules { .. }]
        ));
        assert_eq!(report.warnings, 1);
        assert!(engine
            .find(&MappingContext::new(ComponentType::Switch, 0, DeviceCategory::Generic))
            .is_none());
    }

    #[test]
    fn test_interpolate_delegates() {
        let dir = TempDir::new().unwrap();
        let engine = MappingEngine::new(MappingPaths::new(dir.path(), dir.path())).unwrap();
        let context = MappingContext::new(ComponentType::Cover, 3, DeviceCategory::WindowCovering);
        assert_eq!(engine.interpolate("cover:{key}", &context), "cover:3");
    }
}
