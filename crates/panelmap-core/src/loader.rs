//! Mapping file discovery, validation and resolution
//!
//! Three tiers are read in order: built-in generic files (top level of the
//! built-in root), built-in device-specific files (`devices/`, recursive) and
//! user files (recursive). Every file is checked to resolve inside its tier
//! root, parsed as YAML, validated against the embedded JSON Schema and then
//! resolved into [`ResolvedMapping`] records. A bad file only fails itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::condition::{MatchCondition, MatchFields};
use crate::derivation::{DerivationDefinition, DerivationRegistry, DerivationRule, DerivationRulesDocument};
use crate::model::{
    ChannelCategory, ComponentType, DataType, DeviceCategory, MappingSource, PropertyCategory,
    ResolvedChannel, ResolvedDerivedProperty, ResolvedMapping, ResolvedPanelProperty,
    ResolvedProperty, ResolvedStaticProperty, TransformDirection, ValueFormat,
};
use crate::transformer::{
    CompiledTransform, InlineTransform, Transformer, TransformerDefinition, TransformerIssue,
    TransformerRegistry,
};
use crate::value::PropertyValue;

/// Shared derivation rules, loaded before any mapping file
pub const DERIVATION_RULES_FILE: &str = "derivation-rules.yaml";

/// Sub-directory of the built-in root holding device-specific mappings
pub const DEVICES_DIR: &str = "devices";

/// Environment variable overriding the user mappings root
pub const USER_MAPPINGS_ENV: &str = "PANELMAP_USER_MAPPINGS_PATH";

const MAPPING_SCHEMA: &str = include_str!("../schema/mapping-schema.json");

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Failed to read mapping file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Failed to convert document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Schema validation failed with {} error(s)", .0.len())]
    Schema(Vec<String>),
    #[error("Path {} resolves outside of {}", .path.display(), .root.display())]
    PathTraversal { path: PathBuf, root: PathBuf },
    #[error("Invalid mapping document: {0}")]
    InvalidDocument(String),
    #[error("{} mapping(s) could not be resolved", .0.len())]
    InvalidMappings(Vec<String>),
}

impl MappingError {
    pub fn kind(&self) -> FailureKind {
        match self {
            MappingError::Io(_) => FailureKind::Read,
            MappingError::Yaml(_)
            | MappingError::Json(_)
            | MappingError::InvalidDocument(_)
            | MappingError::InvalidMappings(_) => FailureKind::Parse,
            MappingError::Schema(_) => FailureKind::Schema,
            MappingError::PathTraversal { .. } => FailureKind::PathTraversal,
        }
    }

    /// Error lines for a load report, one per schema violation
    pub fn messages(&self) -> Vec<String> {
        match self {
            MappingError::Schema(errors) | MappingError::InvalidMappings(errors) => errors.clone(),
            other => vec![other.to_string()],
        }
    }
}

/// Why a file was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Read,
    Parse,
    Schema,
    PathTraversal,
}

/// Non-fatal problem recorded against a loaded file
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadWarning {
    #[error("mapping '{mapping}' property '{property}' references unknown transformer '{transformer}'")]
    UnknownTransformer {
        mapping: String,
        property: String,
        transformer: String,
    },
    #[error("mapping '{mapping}' derived property '{property}' references unknown derivation '{derivation}'")]
    UnknownDerivation {
        mapping: String,
        property: String,
        derivation: String,
    },
    #[error("mapping '{mapping}' derived property '{property}' has no derivation rule")]
    MissingDerivation { mapping: String, property: String },
    #[error("transformer '{transformer}': {message}")]
    DegenerateRange { transformer: String, message: String },
    #[error("transformer '{transformer}': {message}")]
    UnsafeFormula { transformer: String, message: String },
    #[error("derivation rules file {} not found, derived properties fall back to their source", .path.display())]
    MissingDerivationRules { path: PathBuf },
}

impl LoadWarning {
    fn from_issue(transformer: &str, issue: TransformerIssue) -> Self {
        let message = issue.to_string();
        match issue {
            TransformerIssue::UnsafeFormula(_) => LoadWarning::UnsafeFormula {
                transformer: transformer.to_string(),
                message,
            },
            TransformerIssue::DegenerateRange { .. } | TransformerIssue::InvertedBounds { .. } => {
                LoadWarning::DegenerateRange {
                    transformer: transformer.to_string(),
                    message,
                }
            }
        }
    }
}

/// Outcome of loading one file
#[derive(Debug, Clone, Serialize)]
pub struct FileLoadResult {
    pub path: PathBuf,
    pub source: MappingSource,
    pub success: bool,
    pub failure: Option<FailureKind>,
    pub errors: Vec<String>,
    pub warnings: Vec<LoadWarning>,
    pub mappings: usize,
    /// SHA256 of the file content, when it could be read
    pub sha256: Option<String>,
}

impl FileLoadResult {
    fn failed(path: &Path, source: MappingSource, sha256: Option<String>, err: &MappingError) -> Self {
        Self {
            path: path.to_path_buf(),
            source,
            success: false,
            failure: Some(err.kind()),
            errors: err.messages(),
            warnings: Vec::new(),
            mappings: 0,
            sha256,
        }
    }
}

/// Aggregate outcome of a load pass
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub loaded_at: DateTime<Utc>,
    pub files_loaded: usize,
    pub files_failed: usize,
    pub mappings_loaded: usize,
    pub errors: usize,
    pub warnings: usize,
    /// Warnings about the pass itself rather than a loaded file
    pub pass_warnings: Vec<LoadWarning>,
    pub files: Vec<FileLoadResult>,
}

impl LoadReport {
    pub fn new(files: Vec<FileLoadResult>, pass_warnings: Vec<LoadWarning>) -> Self {
        Self {
            loaded_at: Utc::now(),
            files_loaded: files.iter().filter(|f| f.success).count(),
            files_failed: files.iter().filter(|f| !f.success).count(),
            mappings_loaded: files.iter().map(|f| f.mappings).sum(),
            errors: files.iter().map(|f| f.errors.len()).sum(),
            warnings: files.iter().map(|f| f.warnings.len()).sum::<usize>() + pass_warnings.len(),
            pass_warnings,
            files,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.files_failed == 0 && self.warnings == 0
    }
}

/// Roots of the mapping tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingPaths {
    /// Built-in root: generic files, `devices/` and the derivation rules
    pub builtin: PathBuf,
    pub user: PathBuf,
}

/// Definitions shipped with this crate
pub fn bundled_definitions_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("definitions")
}

impl MappingPaths {
    pub fn new(builtin: impl Into<PathBuf>, user: impl Into<PathBuf>) -> Self {
        Self {
            builtin: builtin.into(),
            user: user.into(),
        }
    }

    /// Apply the user root override from the environment
    pub fn from_env(builtin: impl Into<PathBuf>, default_user: impl Into<PathBuf>) -> Self {
        Self::new(builtin, default_user).with_user_override(std::env::var(USER_MAPPINGS_ENV).ok())
    }

    pub fn with_user_override(mut self, user: Option<String>) -> Self {
        if let Some(user) = user.filter(|u| !u.trim().is_empty()) {
            self.user = PathBuf::from(user);
        }
        self
    }

    pub fn devices(&self) -> PathBuf {
        self.builtin.join(DEVICES_DIR)
    }

    pub fn derivation_rules(&self) -> PathBuf {
        self.builtin.join(DERIVATION_RULES_FILE)
    }
}

/// Mappings resolved by a load pass, with the report describing it
#[derive(Debug)]
pub struct LoadOutcome {
    /// In discovery order, not yet sorted by priority
    pub mappings: Vec<ResolvedMapping>,
    pub report: LoadReport,
}

#[derive(Debug, Deserialize)]
struct MappingDocument {
    #[allow(dead_code)]
    version: String,
    #[serde(default)]
    transformers: BTreeMap<String, TransformerDefinition>,
    #[serde(default)]
    derivations: BTreeMap<String, DerivationDefinition>,
    mappings: Vec<serde_json::Value>,
}

/// A document whose every mapping deserialized; files apply whole or not at all
#[derive(Debug)]
struct ParsedDocument {
    transformers: BTreeMap<String, TransformerDefinition>,
    derivations: BTreeMap<String, DerivationDefinition>,
    mappings: Vec<MappingDeclaration>,
}

#[derive(Debug, Deserialize)]
struct MappingDeclaration {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_priority")]
    priority: Option<i64>,
    #[serde(rename = "match")]
    condition: ConditionDeclaration,
    channels: Vec<ChannelDeclaration>,
}

#[derive(Debug, Deserialize)]
struct ConditionDeclaration {
    #[serde(default)]
    component_type: Option<String>,
    #[serde(default)]
    device_category: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    profile: Option<String>,
    #[serde(default)]
    all_of: Option<Vec<ConditionDeclaration>>,
    #[serde(default)]
    any_of: Option<Vec<ConditionDeclaration>>,
}

#[derive(Debug, Deserialize)]
struct ChannelDeclaration {
    identifier: String,
    #[serde(default)]
    name: Option<String>,
    category: String,
    #[serde(default)]
    parent_identifier: Option<String>,
    #[serde(default)]
    properties: Vec<PropertyDeclaration>,
    #[serde(default)]
    static_properties: Vec<StaticPropertyDeclaration>,
    #[serde(default)]
    derived_properties: Vec<DerivedPropertyDeclaration>,
}

#[derive(Debug, Deserialize)]
struct PropertyDeclaration {
    #[serde(alias = "shelly_property")]
    device_property: String,
    #[serde(default)]
    direction: Option<String>,
    panel: PanelDeclaration,
    #[serde(default)]
    transformer: Option<String>,
    #[serde(default)]
    transform: Option<InlineTransform>,
}

#[derive(Debug, Deserialize)]
struct PanelDeclaration {
    identifier: String,
    #[serde(default)]
    name: Option<String>,
    data_type: String,
    #[serde(default)]
    format: Option<ValueFormat>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    settable: Option<bool>,
    #[serde(default)]
    queryable: Option<bool>,
    #[serde(default)]
    invalid: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StaticPropertyDeclaration {
    identifier: String,
    #[serde(default)]
    name: Option<String>,
    data_type: String,
    #[serde(default)]
    format: Option<ValueFormat>,
    #[serde(default)]
    unit: Option<String>,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct DerivedPropertyDeclaration {
    identifier: String,
    #[serde(default)]
    name: Option<String>,
    data_type: String,
    #[serde(default)]
    format: Option<ValueFormat>,
    #[serde(default)]
    unit: Option<String>,
    source_property: String,
    #[serde(default)]
    derivation: Option<String>,
    #[serde(default)]
    derive: Option<DerivationRule>,
}

/// Priority offsets may be written as integral floats (`5.0`)
fn deserialize_priority<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;

    match Option::<serde_json::Number>::deserialize(deserializer)? {
        None => Ok(None),
        Some(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() <= i64::MAX as f64 => Ok(Some(f as i64)),
                _ => Err(D::Error::custom(format!("priority {} is not an integer", n))),
            }
        }
    }
}

/// Compute SHA256 hash of data and return as hex string
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Reads and resolves mapping files from the configured tiers
pub struct MappingLoader {
    paths: MappingPaths,
    schema: jsonschema::Validator,
}

impl std::fmt::Debug for MappingLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingLoader")
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

impl MappingLoader {
    pub fn new(paths: MappingPaths) -> Result<Self, MappingError> {
        let schema: serde_json::Value = serde_json::from_str(MAPPING_SCHEMA)?;
        let schema = jsonschema::validator_for(&schema)
            .map_err(|e| MappingError::InvalidDocument(format!("mapping schema: {}", e)))?;
        Ok(Self { paths, schema })
    }

    pub fn paths(&self) -> &MappingPaths {
        &self.paths
    }

    /// Run a full load pass into the given registries
    ///
    /// The registries are expected to be fresh staging instances; the caller
    /// swaps them in together with the returned mappings.
    pub fn load(&self, transformers: &TransformerRegistry, derivations: &DerivationRegistry) -> LoadOutcome {
        let mut files = Vec::new();
        let mut mappings = Vec::new();
        let mut pass_warnings = Vec::new();

        match self.load_derivation_rules(derivations) {
            Ok(result) => files.push(result),
            Err(warning) => pass_warnings.push(warning),
        }

        let tiers = [
            (MappingSource::BuiltinGeneric, self.paths.builtin.clone(), false),
            (MappingSource::BuiltinDeviceSpecific, self.paths.devices(), true),
            (MappingSource::User, self.paths.user.clone(), true),
        ];

        for (source, root, recursive) in tiers {
            if !root.is_dir() {
                debug!(path = %root.display(), tier = %source, "Mapping root not present");
                continue;
            }
            for path in discover_files(&root, recursive) {
                let (result, resolved) = self.load_file(&path, &root, source, transformers, derivations);
                files.push(result);
                mappings.extend(resolved);
            }
        }

        let report = LoadReport::new(files, pass_warnings);
        info!(
            mappings = report.mappings_loaded,
            files = report.files_loaded,
            failed = report.files_failed,
            warnings = report.warnings,
            "Mapping load pass complete"
        );

        LoadOutcome { mappings, report }
    }

    /// Register the shared derivation rules
    ///
    /// A missing file is a warning on the report. Read and parse failures
    /// become a failed file entry.
    fn load_derivation_rules(
        &self,
        derivations: &DerivationRegistry,
    ) -> Result<FileLoadResult, LoadWarning> {
        let path = self.paths.derivation_rules();
        if !path.exists() {
            warn!(path = %path.display(), "Derivation rules file not found, derived properties may not resolve");
            return Err(LoadWarning::MissingDerivationRules { path });
        }

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                let err = MappingError::from(e);
                error!(path = %path.display(), error = %err, "Failed to read derivation rules");
                return Ok(FileLoadResult::failed(&path, MappingSource::BuiltinGeneric, None, &err));
            }
        };
        let sha256 = Some(sha256_hex(content.as_bytes()));

        match serde_yaml::from_str::<DerivationRulesDocument>(&content) {
            Ok(document) => {
                derivations.register_all(&document.derivations);
                info!(path = %path.display(), derivations = document.derivations.len(), "Registered derivation rules");
                Ok(FileLoadResult {
                    path,
                    source: MappingSource::BuiltinGeneric,
                    success: true,
                    failure: None,
                    errors: Vec::new(),
                    warnings: Vec::new(),
                    mappings: 0,
                    sha256,
                })
            }
            Err(e) => {
                let err = MappingError::from(e);
                error!(path = %path.display(), error = %err, "Failed to parse derivation rules");
                Ok(FileLoadResult::failed(&path, MappingSource::BuiltinGeneric, sha256, &err))
            }
        }
    }

    /// Load a single mapping file belonging to the tier rooted at `root`
    pub fn load_file(
        &self,
        path: &Path,
        root: &Path,
        source: MappingSource,
        transformers: &TransformerRegistry,
        derivations: &DerivationRegistry,
    ) -> (FileLoadResult, Vec<ResolvedMapping>) {
        if let Err(err) = ensure_within_root(path, root) {
            warn!(path = %path.display(), root = %root.display(), "Skipping mapping file outside of its root");
            return (FileLoadResult::failed(path, source, None, &err), Vec::new());
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                let err = MappingError::from(e);
                warn!(path = %path.display(), error = %err, "Failed to read mapping file");
                return (FileLoadResult::failed(path, source, None, &err), Vec::new());
            }
        };
        let sha256 = sha256_hex(content.as_bytes());

        let document = match self.parse_document(&content) {
            Ok(document) => document,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Rejected mapping file");
                for message in err.messages() {
                    debug!(path = %path.display(), "{}", message);
                }
                return (FileLoadResult::failed(path, source, Some(sha256), &err), Vec::new());
            }
        };

        let mut warnings: Vec<LoadWarning> = transformers
            .register_all(&document.transformers)
            .into_iter()
            .map(|(name, issue)| LoadWarning::from_issue(&name, issue))
            .collect();
        derivations.register_all(&document.derivations);

        let resolved: Vec<ResolvedMapping> = document
            .mappings
            .into_iter()
            .map(|declaration| resolve_mapping(declaration, source, transformers, derivations, &mut warnings))
            .collect();

        for warning in &warnings {
            warn!(path = %path.display(), "{}", warning);
        }
        info!(path = %path.display(), tier = %source, mappings = resolved.len(), "Loaded mapping file");

        let result = FileLoadResult {
            path: path.to_path_buf(),
            source,
            success: true,
            failure: None,
            errors: Vec::new(),
            warnings,
            mappings: resolved.len(),
            sha256: Some(sha256),
        };
        (result, resolved)
    }

    fn parse_document(&self, content: &str) -> Result<ParsedDocument, MappingError> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
        let json = serde_json::to_value(&yaml)?;

        let errors: Vec<String> = self
            .schema
            .iter_errors(&json)
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect();
        if !errors.is_empty() {
            return Err(MappingError::Schema(errors));
        }

        let document: MappingDocument =
            serde_json::from_value(json).map_err(|e| MappingError::InvalidDocument(e.to_string()))?;

        Ok(ParsedDocument {
            transformers: document.transformers,
            derivations: document.derivations,
            mappings: deserialize_mappings(document.mappings)?,
        })
    }
}

/// Deserialize every mapping of a document, failing if any one fails
fn deserialize_mappings(raw: Vec<serde_json::Value>) -> Result<Vec<MappingDeclaration>, MappingError> {
    let mut mappings = Vec::with_capacity(raw.len());
    let mut errors = Vec::new();
    for (index, value) in raw.into_iter().enumerate() {
        let label = value
            .get("name")
            .and_then(|n| n.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", index));
        match serde_json::from_value::<MappingDeclaration>(value) {
            Ok(declaration) => mappings.push(declaration),
            Err(e) => errors.push(format!("/mappings/{}: mapping '{}': {}", index, label, e)),
        }
    }
    if errors.is_empty() {
        Ok(mappings)
    } else {
        Err(MappingError::InvalidMappings(errors))
    }
}

/// Reject paths that resolve outside of their tier root
pub fn ensure_within_root(path: &Path, root: &Path) -> Result<PathBuf, MappingError> {
    let canonical_root = root.canonicalize()?;
    let canonical = path.canonicalize()?;
    if canonical.starts_with(&canonical_root) {
        Ok(canonical)
    } else {
        Err(MappingError::PathTraversal {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        })
    }
}

fn is_mapping_file(path: &Path) -> bool {
    let is_yaml = path
        .extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false);
    let reserved = path
        .file_name()
        .map(|n| n == DERIVATION_RULES_FILE)
        .unwrap_or(false);
    is_yaml && !reserved
}

/// Mapping files under `root`, in file-name order
pub fn discover_files(root: &Path, recursive: bool) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut visited = HashSet::new();
    discover_into(root, recursive, &mut visited, &mut files);
    files
}

fn discover_into(dir: &Path, recursive: bool, visited: &mut HashSet<PathBuf>, files: &mut Vec<PathBuf>) {
    if let Ok(canonical) = dir.canonicalize() {
        if !visited.insert(canonical) {
            return;
        }
    }

    let mut entries: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Failed to read mapping directory");
            return;
        }
    };
    entries.sort();

    for path in entries {
        if path.is_dir() {
            if recursive {
                discover_into(&path, recursive, visited, files);
            }
        } else if is_mapping_file(&path) {
            files.push(path);
        }
    }
}

fn resolve_condition(declaration: ConditionDeclaration) -> MatchCondition {
    let fields = MatchFields {
        component_type: declaration
            .component_type
            .map(|t| ComponentType::from_name(&t).unwrap_or(ComponentType::FALLBACK)),
        device_category: declaration
            .device_category
            .map(|c| DeviceCategory::from_name(&c).unwrap_or(DeviceCategory::FALLBACK)),
        model: declaration.model,
        profile: declaration.profile,
    };
    let all_of = declaration
        .all_of
        .map(|conditions| conditions.into_iter().map(resolve_condition).collect());
    let any_of = declaration
        .any_of
        .map(|conditions| conditions.into_iter().map(resolve_condition).collect());
    MatchCondition::from_parts(fields, all_of, any_of)
}

fn data_type(name: &str) -> DataType {
    DataType::from_name(name).unwrap_or(DataType::FALLBACK)
}

fn resolve_mapping(
    declaration: MappingDeclaration,
    source: MappingSource,
    transformers: &TransformerRegistry,
    derivations: &DerivationRegistry,
    warnings: &mut Vec<LoadWarning>,
) -> ResolvedMapping {
    let mapping_name = declaration.name;

    let channels = declaration
        .channels
        .into_iter()
        .map(|channel| {
            let properties = channel
                .properties
                .into_iter()
                .map(|p| resolve_property(&mapping_name, p, transformers, warnings))
                .collect();
            let static_properties = channel
                .static_properties
                .into_iter()
                .map(|s| ResolvedStaticProperty {
                    identifier: PropertyCategory::resolve(&s.identifier),
                    name: s.name,
                    data_type: data_type(&s.data_type),
                    format: s.format,
                    unit: s.unit,
                    value: PropertyValue::from(s.value),
                })
                .collect();
            let derived_properties = channel
                .derived_properties
                .into_iter()
                .map(|d| resolve_derived(&mapping_name, d, derivations, warnings))
                .collect();

            ResolvedChannel {
                identifier: channel.identifier,
                name: channel.name,
                category: ChannelCategory::from_name(&channel.category).unwrap_or(ChannelCategory::FALLBACK),
                parent_identifier: channel.parent_identifier,
                properties,
                static_properties,
                derived_properties,
            }
        })
        .collect();

    ResolvedMapping {
        name: mapping_name,
        description: declaration.description,
        priority: source.priority(declaration.priority),
        condition: resolve_condition(declaration.condition),
        channels,
    }
}

fn resolve_property(
    mapping: &str,
    declaration: PropertyDeclaration,
    transformers: &TransformerRegistry,
    warnings: &mut Vec<LoadWarning>,
) -> ResolvedProperty {
    if let Some(name) = &declaration.transformer {
        if !transformers.has(name) {
            warnings.push(LoadWarning::UnknownTransformer {
                mapping: mapping.to_string(),
                property: declaration.device_property.clone(),
                transformer: name.clone(),
            });
        }
    }
    let compiled_transform = declaration.transform.as_ref().map(|inline| {
        let label = format!("{}/{} (inline)", mapping, declaration.device_property);
        let (transformer, issues) = Transformer::from_inline(inline);
        warnings.extend(issues.into_iter().map(|issue| LoadWarning::from_issue(&label, issue)));
        CompiledTransform::new(transformer)
    });

    let panel = declaration.panel;
    ResolvedProperty {
        source_field_name: declaration.device_property,
        direction: declaration
            .direction
            .as_deref()
            .and_then(TransformDirection::from_name)
            .unwrap_or_default(),
        panel: ResolvedPanelProperty {
            identifier: PropertyCategory::resolve(&panel.identifier),
            name: panel.name,
            data_type: data_type(&panel.data_type),
            format: panel.format,
            unit: panel.unit,
            settable: panel.settable.unwrap_or(true),
            queryable: panel.queryable.unwrap_or(true),
            invalid: panel.invalid.map(PropertyValue::from),
        },
        transformer_name: declaration.transformer,
        inline_transform: declaration.transform,
        compiled_transform,
    }
}

fn resolve_derived(
    mapping: &str,
    declaration: DerivedPropertyDeclaration,
    derivations: &DerivationRegistry,
    warnings: &mut Vec<LoadWarning>,
) -> ResolvedDerivedProperty {
    let named = declaration.derivation.as_deref().and_then(|name| {
        let found = derivations.get(name);
        if found.is_none() {
            warnings.push(LoadWarning::UnknownDerivation {
                mapping: mapping.to_string(),
                property: declaration.identifier.clone(),
                derivation: name.to_string(),
            });
        }
        found
    });

    if declaration.derivation.is_none() && declaration.derive.is_none() {
        warnings.push(LoadWarning::MissingDerivation {
            mapping: mapping.to_string(),
            property: declaration.identifier.clone(),
        });
    }

    let rule = declaration
        .derive
        .clone()
        .or_else(|| named.map(|definition| definition.rule.clone()));

    ResolvedDerivedProperty {
        identifier: PropertyCategory::resolve(&declaration.identifier),
        name: declaration.name,
        data_type: data_type(&declaration.data_type),
        format: declaration.format,
        unit: declaration.unit,
        source_property: PropertyCategory::resolve(&declaration.source_property),
        derivation_name: declaration.derivation,
        inline_derivation: declaration.derive,
        rule,
    }
}
