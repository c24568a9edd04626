//! Human-readable names for host codes.
//!
//! Used by tracing and error messages. Unknown codes fall back to their
//! four-character or numeric form, so these functions never fail.

use halite_utils::code_to_string;

use crate::types::{class, format, operation, scope, selector};

type Table = &'static [(u32, &'static str)];

const CLASSES: Table = &[
    (class::OBJECT, "Object"),
    (class::PLUGIN, "PlugIn"),
    (class::DEVICE, "Device"),
    (class::STREAM, "Stream"),
    (class::CONTROL, "Control"),
    (class::LEVEL_CONTROL, "LevelControl"),
    (class::VOLUME_CONTROL, "VolumeControl"),
    (class::BOOLEAN_CONTROL, "BooleanControl"),
    (class::MUTE_CONTROL, "MuteControl"),
];

const SELECTORS: Table = &[
    (selector::BASE_CLASS, "BaseClass"),
    (selector::CLASS, "Class"),
    (selector::OWNER, "Owner"),
    (selector::NAME, "Name"),
    (selector::MODEL_NAME, "ModelName"),
    (selector::MANUFACTURER, "Manufacturer"),
    (selector::ELEMENT_NAME, "ElementName"),
    (selector::OWNED_OBJECTS, "OwnedObjects"),
    (selector::CUSTOM_PROPERTY_INFO_LIST, "CustomPropertyInfoList"),
    (selector::SERIAL_NUMBER, "SerialNumber"),
    (selector::FIRMWARE_VERSION, "FirmwareVersion"),
    (selector::DEVICE_LIST, "DeviceList"),
    (selector::TRANSLATE_UID_TO_DEVICE, "TranslateUIDToDevice"),
    (selector::BOX_LIST, "BoxList"),
    (selector::CLOCK_DEVICE_LIST, "ClockDeviceList"),
    (selector::RESOURCE_BUNDLE, "ResourceBundle"),
    (selector::DEVICE_UID, "DeviceUID"),
    (selector::MODEL_UID, "ModelUID"),
    (selector::TRANSPORT_TYPE, "TransportType"),
    (selector::RELATED_DEVICES, "RelatedDevices"),
    (selector::CLOCK_DOMAIN, "ClockDomain"),
    (selector::DEVICE_IS_ALIVE, "DeviceIsAlive"),
    (selector::DEVICE_IS_RUNNING, "DeviceIsRunning"),
    (selector::DEVICE_CAN_BE_DEFAULT, "DeviceCanBeDefaultDevice"),
    (selector::DEVICE_CAN_BE_DEFAULT_FOR_SYSTEM, "DeviceCanBeDefaultSystemDevice"),
    (selector::LATENCY, "Latency"),
    (selector::STREAMS, "Streams"),
    (selector::CONTROL_LIST, "ControlList"),
    (selector::SAFETY_OFFSET, "SafetyOffset"),
    (selector::NOMINAL_SAMPLE_RATE, "NominalSampleRate"),
    (selector::AVAILABLE_NOMINAL_SAMPLE_RATES, "AvailableNominalSampleRates"),
    (selector::IS_HIDDEN, "IsHidden"),
    (selector::PREFERRED_CHANNELS_FOR_STEREO, "PreferredChannelsForStereo"),
    (selector::ZERO_TIMESTAMP_PERIOD, "ZeroTimeStampPeriod"),
    (selector::CLOCK_IS_STABLE, "ClockIsStable"),
    (selector::IS_ACTIVE, "IsActive"),
    (selector::DIRECTION, "Direction"),
    (selector::TERMINAL_TYPE, "TerminalType"),
    (selector::STARTING_CHANNEL, "StartingChannel"),
    (selector::VIRTUAL_FORMAT, "VirtualFormat"),
    (selector::AVAILABLE_VIRTUAL_FORMATS, "AvailableVirtualFormats"),
    (selector::PHYSICAL_FORMAT, "PhysicalFormat"),
    (selector::AVAILABLE_PHYSICAL_FORMATS, "AvailablePhysicalFormats"),
    (selector::CONTROL_SCOPE, "Scope"),
    (selector::CONTROL_ELEMENT, "Element"),
    (selector::SCALAR_VALUE, "ScalarValue"),
    (selector::DECIBEL_VALUE, "DecibelValue"),
    (selector::DECIBEL_RANGE, "DecibelRange"),
    (selector::CONVERT_SCALAR_TO_DECIBELS, "ConvertScalarToDecibels"),
    (selector::CONVERT_DECIBELS_TO_SCALAR, "ConvertDecibelsToScalar"),
    (selector::BOOLEAN_VALUE, "Value"),
    (selector::WILDCARD, "Wildcard"),
];

const SCOPES: Table = &[
    (scope::GLOBAL, "Global"),
    (scope::INPUT, "Input"),
    (scope::OUTPUT, "Output"),
    (scope::PLAY_THROUGH, "PlayThrough"),
    (scope::WILDCARD, "Wildcard"),
];

const OPERATIONS: Table = &[
    (operation::THREAD, "Thread"),
    (operation::CYCLE, "Cycle"),
    (operation::READ_INPUT, "ReadInput"),
    (operation::CONVERT_INPUT, "ConvertInput"),
    (operation::PROCESS_INPUT, "ProcessInput"),
    (operation::PROCESS_OUTPUT, "ProcessOutput"),
    (operation::MIX_OUTPUT, "MixOutput"),
    (operation::PROCESS_MIX, "ProcessMix"),
    (operation::CONVERT_MIX, "ConvertMix"),
    (operation::WRITE_MIX, "WriteMix"),
];

const FORMAT_IDS: Table = &[(format::LINEAR_PCM, "LinearPCM")];

const FORMAT_FLAGS: Table = &[
    (format::FLAG_IS_FLOAT, "IsFloat"),
    (format::FLAG_IS_BIG_ENDIAN, "IsBigEndian"),
    (format::FLAG_IS_SIGNED_INTEGER, "IsSignedInteger"),
    (format::FLAG_IS_PACKED, "IsPacked"),
    (format::FLAG_IS_ALIGNED_HIGH, "IsAlignedHigh"),
    (format::FLAG_IS_NON_INTERLEAVED, "IsNonInterleaved"),
    (format::FLAG_IS_NON_MIXABLE, "IsNonMixable"),
];

fn lookup(table: Table, code: u32) -> Option<&'static str> {
    table.iter().find(|(c, _)| *c == code).map(|(_, name)| *name)
}

fn name_or_code(table: Table, code: u32) -> String {
    lookup(table, code).map_or_else(|| code_to_string(code), str::to_owned)
}

pub fn class_id_to_string(class: u32) -> String {
    name_or_code(CLASSES, class)
}

pub fn property_selector_to_string(selector: u32) -> String {
    name_or_code(SELECTORS, selector)
}

pub fn scope_to_string(scope: u32) -> String {
    name_or_code(SCOPES, scope)
}

pub fn operation_to_string(operation: u32) -> String {
    name_or_code(OPERATIONS, operation)
}

pub fn format_id_to_string(format_id: u32) -> String {
    name_or_code(FORMAT_IDS, format_id)
}

/// Render format flags as `IsFloat|IsPacked`.
///
/// Bits without a name are printed as one hexadecimal remainder.
pub fn format_flags_to_string(flags: u32) -> String {
    if flags == 0 {
        return "0".to_owned();
    }
    let mut parts: Vec<String> = FORMAT_FLAGS
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| (*name).to_owned())
        .collect();
    let known = FORMAT_FLAGS.iter().fold(0, |acc, (bit, _)| acc | bit);
    let rest = flags & !known;
    if rest != 0 {
        parts.push(format!("{rest:#x}"));
    }
    parts.join("|")
}

/// Name of a host status code. `0` is `OK`.
pub fn status_to_string(status: i32) -> String {
    const STATUSES: &[(crate::Status, &str)] = &[
        (crate::Status::OK, "OK"),
        (crate::Status::NOT_RUNNING, "NotRunning"),
        (crate::Status::UNSPECIFIED, "Unspecified"),
        (crate::Status::UNKNOWN_PROPERTY, "UnknownProperty"),
        (crate::Status::BAD_PROPERTY_SIZE, "BadPropertySize"),
        (crate::Status::ILLEGAL_OPERATION, "IllegalOperation"),
        (crate::Status::BAD_OBJECT, "BadObject"),
        (crate::Status::BAD_DEVICE, "BadDevice"),
        (crate::Status::BAD_STREAM, "BadStream"),
        (crate::Status::UNSUPPORTED_OPERATION, "UnsupportedOperation"),
        (crate::Status::NOT_READY, "NotReady"),
        (crate::Status::UNSUPPORTED_FORMAT, "UnsupportedFormat"),
    ];
    STATUSES
        .iter()
        .find(|(s, _)| s.code() == status)
        .map_or_else(|| code_to_string(status as u32), |(_, name)| (*name).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(class_id_to_string(class::VOLUME_CONTROL), "VolumeControl");
        assert_eq!(property_selector_to_string(selector::DEVICE_UID), "DeviceUID");
        assert_eq!(scope_to_string(scope::OUTPUT), "Output");
        assert_eq!(operation_to_string(operation::WRITE_MIX), "WriteMix");
        assert_eq!(format_id_to_string(format::LINEAR_PCM), "LinearPCM");
    }

    #[test]
    fn test_unknown_codes_fall_back() {
        assert_eq!(property_selector_to_string(0x7a7a_7a7a), "'zzzz'");
        assert_eq!(class_id_to_string(17), "17");
    }

    #[test]
    fn test_format_flags() {
        let flags = format::FLAG_IS_FLOAT | format::FLAG_IS_PACKED;
        assert_eq!(format_flags_to_string(flags), "IsFloat|IsPacked");
        assert_eq!(format_flags_to_string(0), "0");
        assert_eq!(format_flags_to_string(1 << 12), "0x1000");
    }

    #[test]
    fn test_status_names() {
        assert_eq!(status_to_string(0), "OK");
        assert_eq!(status_to_string(crate::Status::BAD_STREAM.code()), "BadStream");
        assert_eq!(status_to_string(-1), "4294967295");
    }
}
