//! Identifier and name templates

use crate::model::MappingContext;

/// Placeholder replaced by the component index
pub const KEY_PLACEHOLDER: &str = "{key}";

/// Substitute the component index into a template
///
/// Every `{key}` occurrence is replaced with the context's component key in
/// base 10. Other brace tokens are left as written.
pub fn interpolate(template: &str, context: &MappingContext) -> String {
    template.replace(KEY_PLACEHOLDER, &context.component_key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComponentType, DeviceCategory};

    fn context(key: u32) -> MappingContext {
        MappingContext::new(ComponentType::Switch, key, DeviceCategory::Switcher)
    }

    #[test]
    fn test_single_placeholder() {
        assert_eq!(interpolate("switch:{key}", &context(5)), "switch:5");
    }

    #[test]
    fn test_multiple_placeholders() {
        assert_eq!(
            interpolate("cover:{key}:position:{key}", &context(2)),
            "cover:2:position:2"
        );
    }

    #[test]
    fn test_unknown_tokens_left_in_place() {
        assert_eq!(
            interpolate("{model}:{key}", &context(0)),
            "{model}:0"
        );
        assert_eq!(interpolate("device_information", &context(9)), "device_information");
    }
}
