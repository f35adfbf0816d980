//! Match conditions over a mapping context
//!
//! A condition node carries optional equality fields plus optional `all_of`
//! and `any_of` compositions. Fields present on a node must always hold;
//! compositions add further requirements, they never replace the fields.

use serde::{Deserialize, Serialize};

use crate::model::{ComponentType, DeviceCategory, MappingContext};

/// Equality checks on a single condition node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_type: Option<ComponentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_category: Option<DeviceCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl MatchFields {
    pub fn is_empty(&self) -> bool {
        self.component_type.is_none()
            && self.device_category.is_none()
            && self.model.is_none()
            && self.profile.is_none()
    }

    /// Every present field equals the context's value
    pub fn matches(&self, context: &MappingContext) -> bool {
        if let Some(component_type) = self.component_type {
            if component_type != context.component_type {
                return false;
            }
        }
        if let Some(device_category) = self.device_category {
            if device_category != context.device_category {
                return false;
            }
        }
        if let Some(model) = &self.model {
            if context.model.as_deref() != Some(model.as_str()) {
                return false;
            }
        }
        if let Some(profile) = &self.profile {
            if context.profile.as_deref() != Some(profile.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Recursive match predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCondition {
    Simple(MatchFields),
    AllOf(Vec<MatchCondition>),
    AnyOf(Vec<MatchCondition>),
    Combined {
        fields: MatchFields,
        all_of: Option<Vec<MatchCondition>>,
        any_of: Option<Vec<MatchCondition>>,
    },
}

impl MatchCondition {
    /// Build the narrowest variant for the given parts
    pub fn from_parts(
        fields: MatchFields,
        all_of: Option<Vec<MatchCondition>>,
        any_of: Option<Vec<MatchCondition>>,
    ) -> Self {
        match (fields.is_empty(), all_of, any_of) {
            (_, None, None) => MatchCondition::Simple(fields),
            (true, Some(all), None) => MatchCondition::AllOf(all),
            (true, None, Some(any)) => MatchCondition::AnyOf(any),
            (_, all_of, any_of) => MatchCondition::Combined {
                fields,
                all_of,
                any_of,
            },
        }
    }

    /// A condition with no checks, matching every context
    pub fn always() -> Self {
        MatchCondition::Simple(MatchFields::default())
    }

    /// Evaluate against a context
    ///
    /// Fields are checked first, then `all_of` (every branch), then `any_of`
    /// (at least one branch).
    pub fn matches(&self, context: &MappingContext) -> bool {
        match self {
            MatchCondition::Simple(fields) => fields.matches(context),
            MatchCondition::AllOf(conditions) => all_match(conditions, context),
            MatchCondition::AnyOf(conditions) => any_match(conditions, context),
            MatchCondition::Combined {
                fields,
                all_of,
                any_of,
            } => {
                if !fields.matches(context) {
                    return false;
                }
                if let Some(conditions) = all_of {
                    if !all_match(conditions, context) {
                        return false;
                    }
                }
                if let Some(conditions) = any_of {
                    if !any_match(conditions, context) {
                        return false;
                    }
                }
                true
            }
        }
    }
}

fn all_match(conditions: &[MatchCondition], context: &MappingContext) -> bool {
    conditions.iter().all(|c| c.matches(context))
}

fn any_match(conditions: &[MatchCondition], context: &MappingContext) -> bool {
    conditions.iter().any(|c| c.matches(context))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(t: ComponentType) -> MatchCondition {
        MatchCondition::Simple(MatchFields {
            component_type: Some(t),
            ..Default::default()
        })
    }

    fn category(c: DeviceCategory) -> MatchCondition {
        MatchCondition::Simple(MatchFields {
            device_category: Some(c),
            ..Default::default()
        })
    }

    fn ctx(t: ComponentType, c: DeviceCategory) -> MappingContext {
        MappingContext::new(t, 0, c)
    }

    #[test]
    fn test_empty_condition_matches_everything() {
        let condition = MatchCondition::always();
        assert!(condition.matches(&ctx(ComponentType::Cover, DeviceCategory::Generic)));
    }

    #[test]
    fn test_simple_fields() {
        let condition = MatchCondition::Simple(MatchFields {
            component_type: Some(ComponentType::Switch),
            model: Some("SNSW-102P16EU".to_string()),
            ..Default::default()
        });

        let plain = ctx(ComponentType::Switch, DeviceCategory::Switcher);
        assert!(!condition.matches(&plain));
        assert!(condition.matches(&plain.clone().with_model("SNSW-102P16EU")));
        assert!(!condition.matches(&plain.with_model("SNSW-001X16EU")));
    }

    #[test]
    fn test_all_of() {
        let condition = MatchCondition::AllOf(vec![
            component(ComponentType::Switch),
            category(DeviceCategory::Lighting),
        ]);

        assert!(condition.matches(&ctx(ComponentType::Switch, DeviceCategory::Lighting)));
        assert!(!condition.matches(&ctx(ComponentType::Switch, DeviceCategory::Outlet)));
        assert!(!condition.matches(&ctx(ComponentType::Cover, DeviceCategory::Lighting)));
    }

    #[test]
    fn test_any_of() {
        let condition = MatchCondition::AnyOf(vec![
            component(ComponentType::Rgb),
            component(ComponentType::Rgbw),
        ]);

        assert!(condition.matches(&ctx(ComponentType::Rgb, DeviceCategory::Lighting)));
        assert!(condition.matches(&ctx(ComponentType::Rgbw, DeviceCategory::Generic)));
        assert!(!condition.matches(&ctx(ComponentType::Light, DeviceCategory::Lighting)));
    }

    #[test]
    fn test_fields_still_required_alongside_composition() {
        let condition = MatchCondition::from_parts(
            MatchFields {
                device_category: Some(DeviceCategory::Lighting),
                ..Default::default()
            },
            None,
            Some(vec![
                component(ComponentType::Switch),
                component(ComponentType::Light),
            ]),
        );
        assert!(matches!(condition, MatchCondition::Combined { .. }));

        assert!(condition.matches(&ctx(ComponentType::Light, DeviceCategory::Lighting)));
        // any_of holds but the node's own field does not
        assert!(!condition.matches(&ctx(ComponentType::Light, DeviceCategory::Outlet)));
    }

    #[test]
    fn test_nested_composition() {
        let condition = MatchCondition::AllOf(vec![
            category(DeviceCategory::WindowCovering),
            MatchCondition::AnyOf(vec![
                component(ComponentType::Cover),
                component(ComponentType::Switch),
            ]),
        ]);

        assert!(condition.matches(&ctx(ComponentType::Switch, DeviceCategory::WindowCovering)));
        assert!(!condition.matches(&ctx(ComponentType::Light, DeviceCategory::WindowCovering)));
    }

    #[test]
    fn test_from_parts_picks_narrowest_variant() {
        let all = MatchCondition::from_parts(MatchFields::default(), Some(vec![MatchCondition::always()]), None);
        assert!(matches!(all, MatchCondition::AllOf(_)));
        let any = MatchCondition::from_parts(MatchFields::default(), None, Some(vec![MatchCondition::always()]));
        assert!(matches!(any, MatchCondition::AnyOf(_)));
        let simple = MatchCondition::from_parts(MatchFields::default(), None, None);
        assert!(matches!(simple, MatchCondition::Simple(_)));
    }
}
