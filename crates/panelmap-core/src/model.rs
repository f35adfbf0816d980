//! Panel and device model types used by resolved mappings
//!
//! Category and type strings from mapping files are resolved into these
//! enumerations case-insensitively. Unknown strings never fail resolution,
//! they fall back to a documented default for each enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::condition::MatchCondition;
use crate::derivation::DerivationRule;
use crate::transformer::{CompiledTransform, InlineTransform};
use crate::value::PropertyValue;

/// Declares a string-backed enumeration with lenient name resolution.
macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $name:ident, default = $default:ident {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Canonical lowercase name
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            /// Case-insensitive lookup by canonical name
            pub fn from_name(name: &str) -> Option<Self> {
                let lower = name.trim().to_lowercase();
                match lower.as_str() {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }

            /// Fallback used when a configuration names an unknown value
            pub const FALLBACK: $name = $name::$default;
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

named_enum! {
    /// Native component type reported by the device
    ComponentType, default = Switch {
        Switch => "switch",
        Cover => "cover",
        Light => "light",
        Rgb => "rgb",
        Rgbw => "rgbw",
        Cct => "cct",
        Input => "input",
        DevicePower => "devicepower",
        Humidity => "humidity",
        Temperature => "temperature",
        Pm1 => "pm1",
        Wifi => "wifi",
        Ethernet => "ethernet",
    }
}

named_enum! {
    /// User-selected category of a panel device
    DeviceCategory, default = Generic {
        Generic => "generic",
        AirConditioner => "air_conditioner",
        AirDehumidifier => "air_dehumidifier",
        AirHumidifier => "air_humidifier",
        AirPurifier => "air_purifier",
        AvReceiver => "av_receiver",
        Alarm => "alarm",
        Camera => "camera",
        Door => "door",
        Doorbell => "doorbell",
        Fan => "fan",
        GameConsole => "game_console",
        HeatingUnit => "heating_unit",
        Lighting => "lighting",
        Lock => "lock",
        Media => "media",
        Outlet => "outlet",
        Projector => "projector",
        Pump => "pump",
        RobotVacuum => "robot_vacuum",
        Sensor => "sensor",
        SetTopBox => "set_top_box",
        Speaker => "speaker",
        Sprinkler => "sprinkler",
        StreamingService => "streaming_service",
        Switcher => "switcher",
        Television => "television",
        Thermostat => "thermostat",
        Valve => "valve",
        WaterHeater => "water_heater",
        WindowCovering => "window_covering",
    }
}

named_enum! {
    /// Category of a panel channel
    ChannelCategory, default = Generic {
        Generic => "generic",
        AirParticulate => "air_particulate",
        AirQuality => "air_quality",
        Alarm => "alarm",
        Battery => "battery",
        Camera => "camera",
        CarbonDioxide => "carbon_dioxide",
        CarbonMonoxide => "carbon_monoxide",
        Contact => "contact",
        Cooler => "cooler",
        Dehumidifier => "dehumidifier",
        DeviceInformation => "device_information",
        Door => "door",
        Doorbell => "doorbell",
        ElectricalEnergy => "electrical_energy",
        ElectricalPower => "electrical_power",
        Fan => "fan",
        Filter => "filter",
        Flow => "flow",
        Gas => "gas",
        Heater => "heater",
        Humidifier => "humidifier",
        Humidity => "humidity",
        Illuminance => "illuminance",
        Leak => "leak",
        Light => "light",
        Lock => "lock",
        MediaInput => "media_input",
        MediaPlayback => "media_playback",
        Microphone => "microphone",
        Motion => "motion",
        NitrogenDioxide => "nitrogen_dioxide",
        Occupancy => "occupancy",
        Outlet => "outlet",
        Ozone => "ozone",
        Pressure => "pressure",
        RobotVacuum => "robot_vacuum",
        Smoke => "smoke",
        Speaker => "speaker",
        SulphurDioxide => "sulphur_dioxide",
        Switcher => "switcher",
        Television => "television",
        Temperature => "temperature",
        Thermostat => "thermostat",
        Valve => "valve",
        VolatileOrganicCompounds => "volatile_organic_compounds",
        WindowCovering => "window_covering",
    }
}

named_enum! {
    /// Category of a panel property
    PropertyCategory, default = Measured {
        Generic => "generic",
        Active => "active",
        Brightness => "brightness",
        ColorBlue => "color_blue",
        ColorGreen => "color_green",
        ColorRed => "color_red",
        ColorTemperature => "color_temperature",
        ColorWhite => "color_white",
        Command => "command",
        ConnectionType => "connection_type",
        Consumption => "consumption",
        Current => "current",
        Density => "density",
        Detected => "detected",
        Direction => "direction",
        Event => "event",
        Fault => "fault",
        FirmwareRevision => "firmware_revision",
        Frequency => "frequency",
        HardwareRevision => "hardware_revision",
        Hue => "hue",
        Humidity => "humidity",
        InUse => "in_use",
        Level => "level",
        LinkQuality => "link_quality",
        Locked => "locked",
        Manufacturer => "manufacturer",
        Measured => "measured",
        Model => "model",
        Mode => "mode",
        On => "on",
        OverCurrent => "over_current",
        OverVoltage => "over_voltage",
        OverPower => "over_power",
        Percentage => "percentage",
        Position => "position",
        Power => "power",
        Rate => "rate",
        Remaining => "remaining",
        Reset => "reset",
        Saturation => "saturation",
        SerialNumber => "serial_number",
        Source => "source",
        State => "state",
        Speed => "speed",
        Status => "status",
        Tampered => "tampered",
        Temperature => "temperature",
        Tilt => "tilt",
        Triggered => "triggered",
        Type => "type",
        Voltage => "voltage",
    }
}

named_enum! {
    /// Panel data type of a property
    DataType, default = String {
        Char => "char",
        Uchar => "uchar",
        Short => "short",
        Ushort => "ushort",
        Int => "int",
        Uint => "uint",
        Float => "float",
        Bool => "bool",
        String => "string",
        Enum => "enum",
        Unknown => "unknown",
    }
}

named_enum! {
    /// Which conversions of a property or transformer are meaningful
    TransformDirection, default = Bidirectional {
        Bidirectional => "bidirectional",
        ReadOnly => "read_only",
        WriteOnly => "write_only",
    }
}

impl TransformDirection {
    pub fn can_read(&self) -> bool {
        matches!(self, TransformDirection::Bidirectional | TransformDirection::ReadOnly)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, TransformDirection::Bidirectional | TransformDirection::WriteOnly)
    }
}

impl PropertyCategory {
    /// Resolve a property identifier, accepting the `switch` alias for `on`
    pub fn resolve(name: &str) -> Self {
        if let Some(category) = Self::from_name(name) {
            return category;
        }
        match name.trim().to_lowercase().as_str() {
            "switch" => PropertyCategory::On,
            _ => Self::FALLBACK,
        }
    }
}

/// Tier a mapping file was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MappingSource {
    BuiltinGeneric,
    BuiltinDeviceSpecific,
    User,
}

/// Offset applied when a mapping does not declare a priority
pub const DEFAULT_PRIORITY_OFFSET: i64 = 100;

impl MappingSource {
    /// Base of this tier's priority band
    pub fn base_priority(&self) -> i64 {
        match self {
            MappingSource::BuiltinGeneric => 0,
            MappingSource::BuiltinDeviceSpecific => 500,
            MappingSource::User => 1000,
        }
    }

    /// Effective priority for a mapping declared in this tier
    pub fn priority(&self, offset: Option<i64>) -> i64 {
        self.base_priority() + offset.unwrap_or(DEFAULT_PRIORITY_OFFSET)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MappingSource::BuiltinGeneric => "builtin-generic",
            MappingSource::BuiltinDeviceSpecific => "builtin-device-specific",
            MappingSource::User => "user",
        }
    }
}

impl fmt::Display for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime description of a discovered device component
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingContext {
    pub component_type: ComponentType,
    /// Component index on the device (`switch:0`, `switch:1`, ...)
    pub component_key: u32,
    pub device_category: DeviceCategory,
    pub model: Option<String>,
    pub profile: Option<String>,
}

impl MappingContext {
    pub fn new(
        component_type: ComponentType,
        component_key: u32,
        device_category: DeviceCategory,
    ) -> Self {
        Self {
            component_type,
            component_key,
            device_category,
            model: None,
            profile: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Deterministic label for logs; distinct contexts never share one
    ///
    /// Model and profile are quoted with escapes, absent values print as `-`.
    pub fn cache_key(&self) -> String {
        fn quoted(value: Option<&str>) -> String {
            value.map(|v| format!("{:?}", v)).unwrap_or_else(|| "-".to_string())
        }

        format!(
            "{}|{}|{}|{}|{}",
            self.component_type,
            self.component_key,
            self.device_category,
            quoted(self.model.as_deref()),
            quoted(self.profile.as_deref())
        )
    }
}

/// Value format of a panel property: numeric range or enum members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueFormat {
    Numeric(Vec<f64>),
    Enum(Vec<String>),
}

/// Panel side of a property mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPanelProperty {
    pub identifier: PropertyCategory,
    pub name: Option<String>,
    pub data_type: DataType,
    pub format: Option<ValueFormat>,
    pub unit: Option<String>,
    pub settable: bool,
    pub queryable: bool,
    pub invalid: Option<PropertyValue>,
}

/// A device property bound to a panel property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedProperty {
    /// Field name in the device's native component model
    pub source_field_name: String,
    pub direction: TransformDirection,
    pub panel: ResolvedPanelProperty,
    pub transformer_name: Option<String>,
    pub inline_transform: Option<InlineTransform>,
    /// `inline_transform` compiled once when the mapping was loaded
    #[serde(skip)]
    pub compiled_transform: Option<CompiledTransform>,
}

/// A panel property with a fixed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStaticProperty {
    pub identifier: PropertyCategory,
    pub name: Option<String>,
    pub data_type: DataType,
    pub format: Option<ValueFormat>,
    pub unit: Option<String>,
    pub value: PropertyValue,
}

/// A panel property computed from another property of the same channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedDerivedProperty {
    pub identifier: PropertyCategory,
    pub name: Option<String>,
    pub data_type: DataType,
    pub format: Option<ValueFormat>,
    pub unit: Option<String>,
    pub source_property: PropertyCategory,
    pub derivation_name: Option<String>,
    pub inline_derivation: Option<DerivationRule>,
    /// Effective rule: the inline one, else the named registry entry
    pub rule: Option<DerivationRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedChannel {
    /// Identifier template, may contain the `{key}` placeholder
    pub identifier: String,
    /// Name template, may contain the `{key}` placeholder
    pub name: Option<String>,
    pub category: ChannelCategory,
    pub parent_identifier: Option<String>,
    pub properties: Vec<ResolvedProperty>,
    pub static_properties: Vec<ResolvedStaticProperty>,
    pub derived_properties: Vec<ResolvedDerivedProperty>,
}

/// A mapping after enum and reference resolution, ready for matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMapping {
    pub name: String,
    pub description: Option<String>,
    pub priority: i64,
    #[serde(rename = "match")]
    pub condition: MatchCondition,
    pub channels: Vec<ResolvedChannel>,
}
