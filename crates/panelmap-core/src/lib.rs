//! Panelmap Core - Mapping and value transformation engine
//!
//! This crate adapts a third-party device's native component model to the
//! panel's device/channel/property model:
//! - Declarative YAML mapping files across three priority tiers
//! - Recursive match conditions with priority-ordered, first-match lookup
//! - Bidirectional value transformers with a sandboxed formula evaluator
//! - Named derivation rules for computed properties

pub mod condition;
pub mod derivation;
pub mod engine;
pub mod formula;
pub mod loader;
pub mod model;
pub mod resolver;
pub mod storage;
pub mod template;
pub mod transformer;
pub mod value;

pub use condition::{MatchCondition, MatchFields};
pub use derivation::{DerivationDefinition, DerivationRegistry, DerivationRule, ThresholdEntry};
pub use engine::{MappingCatalog, MappingEngine};
pub use formula::{Formula, FormulaError};
pub use loader::{
    FailureKind, FileLoadResult, LoadReport, LoadWarning, MappingError, MappingLoader,
    MappingPaths,
};
pub use model::{
    ChannelCategory, ComponentType, DataType, DeviceCategory, MappingContext, MappingSource,
    PropertyCategory, ResolvedChannel, ResolvedDerivedProperty, ResolvedMapping,
    ResolvedPanelProperty, ResolvedProperty, ResolvedStaticProperty, TransformDirection,
};
pub use resolver::{ChannelDerivation, MappingResolver};
pub use storage::PropertyMappingStore;
pub use template::interpolate;
pub use transformer::{
    CompiledTransform, InlineTransform, Transformer, TransformerDefinition, TransformerRegistry,
};
pub use value::PropertyValue;
