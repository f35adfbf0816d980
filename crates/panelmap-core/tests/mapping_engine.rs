use std::path::Path;
use std::sync::Arc;

use panelmap_core::loader::bundled_definitions_path;
use panelmap_core::{
    ChannelCategory, ComponentType, DeviceCategory, FailureKind, LoadWarning, MappingContext,
    MappingEngine, MappingPaths, MappingSource, PropertyCategory, PropertyValue,
};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn mapping_file(name: &str, priority: Option<i64>, condition: &str, channel: &str) -> String {
    let priority = priority
        .map(|p| format!("    priority: {}\n", p))
        .unwrap_or_default();
    format!(
        r#"version: "1.0"
mappings:
  - name: {name}
{priority}    match:
{condition}
    channels:
      - identifier: "{channel}:{{key}}"
        category: {channel}
"#
    )
}

struct Tiers {
    _dir: TempDir,
    builtin: std::path::PathBuf,
    user: std::path::PathBuf,
}

impl Tiers {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let builtin = dir.path().join("builtin");
        let user = dir.path().join("user");
        std::fs::create_dir_all(builtin.join("devices")).unwrap();
        std::fs::create_dir_all(&user).unwrap();
        Self {
            _dir: dir,
            builtin,
            user,
        }
    }

    fn engine(&self) -> MappingEngine {
        MappingEngine::load(MappingPaths::new(&self.builtin, &self.user)).unwrap()
    }
}

fn switch_context(category: DeviceCategory) -> MappingContext {
    MappingContext::new(ComponentType::Switch, 0, category)
}

#[test]
fn test_bundled_definitions_load_cleanly() {
    let user = TempDir::new().unwrap();
    let engine = MappingEngine::load(MappingPaths::new(bundled_definitions_path(), user.path())).unwrap();
    let report = engine.last_report().unwrap();

    assert_eq!(report.files_failed, 0, "{:#?}", report.files);
    assert_eq!(report.warnings, 0, "{:#?}", report.files);
    assert!(report.mappings_loaded > 0);
    assert!(engine.has_derivation("battery_status"));

    let cover = MappingContext::new(ComponentType::Cover, 1, DeviceCategory::WindowCovering)
        .with_model("SNSW-102P16EU")
        .with_profile("cover");
    let mapping = engine.find(&cover).unwrap();
    assert_eq!(mapping.name, "plus_2pm_cover_profile");
    assert_eq!(
        mapping.priority,
        MappingSource::BuiltinDeviceSpecific.priority(Some(200))
    );
    assert_eq!(
        engine.interpolate(&mapping.channels[0].identifier, &cover),
        "window_covering:1"
    );

    let plain_cover = MappingContext::new(ComponentType::Cover, 0, DeviceCategory::WindowCovering);
    assert_eq!(engine.find(&plain_cover).unwrap().name, "cover_window");
}

#[test]
fn test_bundled_transformers_apply_to_resolved_properties() {
    let user = TempDir::new().unwrap();
    let engine = MappingEngine::load(MappingPaths::new(bundled_definitions_path(), user.path())).unwrap();

    let mapping = engine.find(&switch_context(DeviceCategory::Outlet)).unwrap();
    assert_eq!(mapping.name, "switch_outlet");

    let energy = mapping
        .channels
        .iter()
        .find(|c| c.category == ChannelCategory::ElectricalEnergy)
        .unwrap();
    let property = &energy.properties[0];
    let transformer = engine.transformer_for(property);
    assert_eq!(transformer.read(&PropertyValue::Int(2500)), PropertyValue::Float(2.5));
    // read-only formula leaves writes untouched
    assert_eq!(transformer.write(&PropertyValue::Int(7)), PropertyValue::Int(7));

    let rgb = engine
        .find(&MappingContext::new(ComponentType::Rgb, 0, DeviceCategory::Lighting))
        .unwrap();
    let white = rgb.channels[0]
        .properties
        .iter()
        .find(|p| p.panel.identifier == PropertyCategory::ColorWhite)
        .unwrap();
    let transformer = engine.transformer_for(white);
    assert_eq!(transformer.read(&PropertyValue::Int(255)), PropertyValue::Int(100));
    assert_eq!(transformer.write(&PropertyValue::Int(50)), PropertyValue::Int(128));
    assert!(Arc::ptr_eq(&transformer, &engine.transformer_for(white)));

    let battery = engine.derived_properties_for_channel(ChannelCategory::Battery);
    assert_eq!(battery.len(), 1);
    assert_eq!(
        battery[0].rule.evaluate(&PropertyValue::Int(12)),
        Some(PropertyValue::from("low"))
    );
}

#[test]
fn test_higher_tier_wins_over_generic() {
    let tiers = Tiers::new();
    let switch = "      component_type: switch";
    write(&tiers.builtin, "generic.yaml", &mapping_file("generic_switch", Some(300), switch, "switcher"));
    write(&tiers.builtin, "devices/vendor/model.yaml", &mapping_file("device_switch", None, switch, "outlet"));
    write(&tiers.user, "override.yaml", &mapping_file("user_switch", Some(0), switch, "light"));

    let engine = tiers.engine();
    assert_eq!(engine.find(&switch_context(DeviceCategory::Generic)).unwrap().name, "user_switch");

    let priorities: Vec<i64> = engine.mappings().iter().map(|m| m.priority).collect();
    assert_eq!(priorities, vec![1000, 600, 300]);
}

#[test]
fn test_priority_beats_discovery_order() {
    let tiers = Tiers::new();
    let switch = "      component_type: switch";
    write(&tiers.builtin, "a.yaml", &mapping_file("low", Some(100), switch, "switcher"));
    write(&tiers.builtin, "b.yaml", &mapping_file("high", Some(500), switch, "switcher"));

    let engine = tiers.engine();
    assert_eq!(engine.find(&switch_context(DeviceCategory::Generic)).unwrap().name, "high");
}

#[test]
fn test_equal_priority_keeps_discovery_order() {
    let tiers = Tiers::new();
    let switch = "      component_type: switch";
    write(&tiers.user, "b.yaml", &mapping_file("second", None, switch, "switcher"));
    write(&tiers.user, "a.yaml", &mapping_file("first", None, switch, "switcher"));
    write(&tiers.user, "c/nested.yaml", &mapping_file("third", None, switch, "switcher"));

    let engine = tiers.engine();
    assert_eq!(engine.find(&switch_context(DeviceCategory::Generic)).unwrap().name, "first");
    let names: Vec<String> = engine.mappings().iter().map(|m| m.name.clone()).collect();
    assert_eq!(names, vec!["first", "second", "third"]);
}

#[test]
fn test_all_of_and_any_of_conditions() {
    let tiers = Tiers::new();
    write(
        &tiers.builtin,
        "all.yaml",
        &mapping_file(
            "switch_lighting",
            Some(200),
            "      all_of:\n        - component_type: switch\n        - device_category: lighting",
            "light",
        ),
    );
    write(
        &tiers.builtin,
        "any.yaml",
        &mapping_file(
            "color",
            Some(100),
            "      any_of:\n        - component_type: rgb\n        - component_type: rgbw",
            "light",
        ),
    );

    let engine = tiers.engine();
    assert_eq!(
        engine.find(&switch_context(DeviceCategory::Lighting)).unwrap().name,
        "switch_lighting"
    );
    assert!(engine.find(&switch_context(DeviceCategory::Outlet)).is_none());
    assert_eq!(
        engine
            .find(&MappingContext::new(ComponentType::Rgbw, 0, DeviceCategory::Generic))
            .unwrap()
            .name,
        "color"
    );
    assert!(engine
        .find(&MappingContext::new(ComponentType::Cct, 0, DeviceCategory::Generic))
        .is_none());
}

#[test]
fn test_cache_returns_same_instance_and_reload_clears_it() {
    let tiers = Tiers::new();
    write(
        &tiers.user,
        "switch.yaml",
        &mapping_file("user_switch", None, "      component_type: switch", "switcher"),
    );
    let engine = tiers.engine();
    let context = switch_context(DeviceCategory::Generic);

    let first = engine.find(&context).unwrap();
    let size = engine.cache_size();
    let second = engine.find(&context).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(engine.cache_size(), size);

    let generation = engine.generation();
    let report = engine.reload();
    assert_eq!(report.mappings_loaded, 1);
    assert_eq!(engine.cache_size(), 0);
    assert_eq!(engine.generation(), generation + 1);
    assert!(!Arc::ptr_eq(&first, &engine.find(&context).unwrap()));
}

#[test]
fn test_reload_picks_up_changed_files() {
    let tiers = Tiers::new();
    let switch = "      component_type: switch";
    write(&tiers.user, "switch.yaml", &mapping_file("before", None, switch, "switcher"));
    let engine = tiers.engine();
    assert_eq!(engine.find(&switch_context(DeviceCategory::Generic)).unwrap().name, "before");

    write(&tiers.user, "switch.yaml", &mapping_file("after", None, switch, "switcher"));
    engine.reload();
    assert_eq!(engine.find(&switch_context(DeviceCategory::Generic)).unwrap().name, "after");
}

#[test]
fn test_invalid_file_does_not_affect_others() {
    let tiers = Tiers::new();
    write(
        &tiers.user,
        "good.yaml",
        &mapping_file("good", None, "      component_type: switch", "switcher"),
    );
    write(
        &tiers.user,
        "bad.yaml",
        "version: \"1.0\"\nmappings:\n  - name: bad\n    match:\n      all_of: []\n    channels: []\n",
    );

    let engine = tiers.engine();
    let report = engine.last_report().unwrap();
    assert_eq!(report.files_loaded, 1);
    assert_eq!(report.files_failed, 1);

    let bad = engine
        .load_results()
        .into_iter()
        .find(|r| r.path.ends_with("bad.yaml"))
        .unwrap();
    assert_eq!(bad.failure, Some(FailureKind::Schema));
    assert!(bad.errors.len() >= 2);
    assert!(bad.sha256.is_some());
    assert!(engine.find(&switch_context(DeviceCategory::Generic)).is_some());
}

#[test]
fn test_unknown_categories_fall_back() {
    let tiers = Tiers::new();
    write(
        &tiers.user,
        "odd.yaml",
        r#"version: "1.0"
mappings:
  - name: odd
    match:
      component_type: teleporter
      device_category: toaster
    channels:
      - identifier: "thing:{key}"
        category: flux_capacitor
        properties:
          - shelly_property: output
            panel:
              identifier: wattage
              data_type: quaternion
"#,
    );

    let engine = tiers.engine();
    let report = engine.last_report().unwrap();
    assert_eq!(report.files_failed, 0);

    let mapping = engine.find(&switch_context(DeviceCategory::Generic)).unwrap();
    assert_eq!(mapping.name, "odd");
    let channel = &mapping.channels[0];
    assert_eq!(channel.category, ChannelCategory::Generic);
    assert_eq!(channel.properties[0].source_field_name, "output");
    assert_eq!(channel.properties[0].panel.identifier, PropertyCategory::Measured);
    assert_eq!(channel.properties[0].panel.data_type, panelmap_core::DataType::String);
}

#[test]
fn test_missing_derivation_rules_is_not_fatal() {
    let tiers = Tiers::new();
    write(
        &tiers.builtin,
        "battery.yaml",
        r#"version: "1.0"
mappings:
  - name: battery
    match:
      component_type: devicepower
    channels:
      - identifier: "battery:{key}"
        category: battery
        derived_properties:
          - identifier: status
            data_type: enum
            source_property: percentage
            derivation: battery_status
"#,
    );

    let engine = tiers.engine();
    let report = engine.last_report().unwrap();
    assert_eq!(report.files_loaded, 1);
    assert_eq!(report.files_failed, 0);
    assert_eq!(report.warnings, 2);
    assert!(matches!(
        report.pass_warnings.as_slice(),
        [LoadWarning::MissingDerivationRules { .. }]
    ));

    let mapping = engine
        .find(&MappingContext::new(ComponentType::DevicePower, 0, DeviceCategory::Sensor))
        .unwrap();
    assert!(mapping.channels[0].derived_properties[0].rule.is_none());
}

#[test]
fn test_malformed_derivation_rules_are_recorded() {
    let tiers = Tiers::new();
    write(&tiers.builtin, "derivation-rules.yaml", "version: [not, a, string\n");

    let engine = tiers.engine();
    let results = engine.load_results();
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
    assert_eq!(results[0].failure, Some(FailureKind::Parse));
}

#[cfg(unix)]
#[test]
fn test_symlink_escaping_user_root_is_rejected() {
    let tiers = Tiers::new();
    let outside = tiers.user.parent().unwrap().join("outside");
    write(
        &outside,
        "evil.yaml",
        &mapping_file("evil", Some(999), "      component_type: switch", "switcher"),
    );
    std::os::unix::fs::symlink(outside.join("evil.yaml"), tiers.user.join("evil.yaml")).unwrap();
    write(
        &tiers.user,
        "good.yaml",
        &mapping_file("good", None, "      component_type: switch", "switcher"),
    );

    let engine = tiers.engine();
    let rejected = engine
        .load_results()
        .into_iter()
        .find(|r| r.path.ends_with("evil.yaml"))
        .unwrap();
    assert_eq!(rejected.failure, Some(FailureKind::PathTraversal));
    assert!(engine.mappings().iter().all(|m| m.name != "evil"));
    assert_eq!(engine.find(&switch_context(DeviceCategory::Generic)).unwrap().name, "good");
}

#[test]
fn test_user_path_override() {
    let tiers = Tiers::new();
    let custom = tiers.user.parent().unwrap().join("custom");
    write(
        &custom,
        "custom.yaml",
        &mapping_file("custom", None, "      component_type: switch", "switcher"),
    );

    let paths = MappingPaths::new(&tiers.builtin, &tiers.user)
        .with_user_override(Some(custom.to_string_lossy().to_string()));
    let engine = MappingEngine::load(paths).unwrap();
    assert_eq!(engine.user_mappings_path(), custom.as_path());
    assert_eq!(engine.find(&switch_context(DeviceCategory::Generic)).unwrap().name, "custom");
}
