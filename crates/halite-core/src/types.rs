//! Host-facing identifiers and four-character code tables.
//!
//! The audio server speaks in 32-bit codes: class ids, property selectors,
//! scopes, elements, IO operation ids and format ids. This module names the
//! ones the object model understands. Codes not listed here are still
//! accepted as plain `u32` values and reported as unknown.

use halite_utils::fourcc;

// =============================================================================
// Object ids
// =============================================================================

/// Host-visible object identifier.
///
/// `0` is never a valid object. `1` is reserved for the plugin object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl ObjectId {
    /// The null object id.
    pub const UNKNOWN: Self = Self(0);
    /// The well-known id of the plugin object.
    pub const PLUGIN: Self = Self(1);
    /// First id handed out to dynamically registered objects.
    pub const FIRST_DYNAMIC: Self = Self(2);

    /// Raw id as seen by the host.
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ObjectId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Four-character class id (`'adev'`, `'vlme'`, ...).
pub type ClassId = u32;
/// Four-character property selector.
pub type PropertySelector = u32;
/// Four-character property scope.
pub type PropertyScope = u32;
/// Property element. `0` is the main element.
pub type PropertyElement = u32;

/// Addresses one property of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyAddress {
    pub selector: PropertySelector,
    pub scope: PropertyScope,
    pub element: PropertyElement,
}

impl PropertyAddress {
    pub const fn new(selector: PropertySelector, scope: PropertyScope, element: PropertyElement) -> Self {
        Self {
            selector,
            scope,
            element,
        }
    }

    /// Global scope, main element.
    pub const fn global(selector: PropertySelector) -> Self {
        Self::new(selector, scope::GLOBAL, ELEMENT_MAIN)
    }
}

/// The main element of any scope.
pub const ELEMENT_MAIN: PropertyElement = 0;
/// Matches every element.
pub const ELEMENT_WILDCARD: PropertyElement = 0xFFFF_FFFF;

/// Stream direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Output,
    Input,
}

impl Direction {
    /// Value of the stream direction property (`1` for input).
    pub const fn code(self) -> u32 {
        match self {
            Self::Output => 0,
            Self::Input => 1,
        }
    }

    /// The device scope streams of this direction are listed under.
    pub const fn scope(self) -> PropertyScope {
        match self {
            Self::Output => scope::OUTPUT,
            Self::Input => scope::INPUT,
        }
    }
}

/// Scope of a control, as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlScope {
    Global,
    Input,
    #[default]
    Output,
    PlayThrough,
}

impl ControlScope {
    pub const fn code(self) -> PropertyScope {
        match self {
            Self::Global => scope::GLOBAL,
            Self::Input => scope::INPUT,
            Self::Output => scope::OUTPUT,
            Self::PlayThrough => scope::PLAY_THROUGH,
        }
    }
}

// =============================================================================
// Code tables
// =============================================================================

/// Class ids.
pub mod class {
    use super::*;

    pub const OBJECT: ClassId = fourcc!(b"aobj");
    pub const PLUGIN: ClassId = fourcc!(b"aplg");
    pub const DEVICE: ClassId = fourcc!(b"adev");
    pub const STREAM: ClassId = fourcc!(b"astr");
    pub const CONTROL: ClassId = fourcc!(b"actl");
    pub const LEVEL_CONTROL: ClassId = fourcc!(b"levl");
    pub const VOLUME_CONTROL: ClassId = fourcc!(b"vlme");
    pub const BOOLEAN_CONTROL: ClassId = fourcc!(b"togl");
    pub const MUTE_CONTROL: ClassId = fourcc!(b"mute");
}

/// Property scopes.
pub mod scope {
    use super::*;

    pub const GLOBAL: PropertyScope = fourcc!(b"glob");
    pub const INPUT: PropertyScope = fourcc!(b"inpt");
    pub const OUTPUT: PropertyScope = fourcc!(b"outp");
    pub const PLAY_THROUGH: PropertyScope = fourcc!(b"ptru");
    pub const WILDCARD: PropertyScope = fourcc!(b"****");
}

/// Property selectors.
pub mod selector {
    use super::*;

    // Every object
    pub const BASE_CLASS: PropertySelector = fourcc!(b"bcls");
    pub const CLASS: PropertySelector = fourcc!(b"clas");
    pub const OWNER: PropertySelector = fourcc!(b"stdv");
    pub const NAME: PropertySelector = fourcc!(b"lnam");
    pub const MODEL_NAME: PropertySelector = fourcc!(b"lmod");
    pub const MANUFACTURER: PropertySelector = fourcc!(b"lmak");
    pub const ELEMENT_NAME: PropertySelector = fourcc!(b"lchn");
    pub const OWNED_OBJECTS: PropertySelector = fourcc!(b"ownd");
    pub const CUSTOM_PROPERTY_INFO_LIST: PropertySelector = fourcc!(b"cust");
    pub const SERIAL_NUMBER: PropertySelector = fourcc!(b"snum");
    pub const FIRMWARE_VERSION: PropertySelector = fourcc!(b"fwvn");
    pub const WILDCARD: PropertySelector = fourcc!(b"****");

    // Plugin
    pub const DEVICE_LIST: PropertySelector = fourcc!(b"dev#");
    pub const TRANSLATE_UID_TO_DEVICE: PropertySelector = fourcc!(b"uidd");
    pub const BOX_LIST: PropertySelector = fourcc!(b"box#");
    pub const CLOCK_DEVICE_LIST: PropertySelector = fourcc!(b"clk#");
    pub const RESOURCE_BUNDLE: PropertySelector = fourcc!(b"rsrc");

    // Device
    pub const DEVICE_UID: PropertySelector = fourcc!(b"uid ");
    pub const MODEL_UID: PropertySelector = fourcc!(b"muid");
    pub const TRANSPORT_TYPE: PropertySelector = fourcc!(b"tran");
    pub const RELATED_DEVICES: PropertySelector = fourcc!(b"akin");
    pub const CLOCK_DOMAIN: PropertySelector = fourcc!(b"clkd");
    pub const DEVICE_IS_ALIVE: PropertySelector = fourcc!(b"livn");
    pub const DEVICE_IS_RUNNING: PropertySelector = fourcc!(b"goin");
    pub const DEVICE_CAN_BE_DEFAULT: PropertySelector = fourcc!(b"dflt");
    pub const DEVICE_CAN_BE_DEFAULT_FOR_SYSTEM: PropertySelector = fourcc!(b"sflt");
    pub const LATENCY: PropertySelector = fourcc!(b"ltnc");
    pub const STREAMS: PropertySelector = fourcc!(b"stm#");
    pub const CONTROL_LIST: PropertySelector = fourcc!(b"ctrl");
    pub const SAFETY_OFFSET: PropertySelector = fourcc!(b"saft");
    pub const NOMINAL_SAMPLE_RATE: PropertySelector = fourcc!(b"nsrt");
    pub const AVAILABLE_NOMINAL_SAMPLE_RATES: PropertySelector = fourcc!(b"nsr#");
    pub const IS_HIDDEN: PropertySelector = fourcc!(b"hidn");
    pub const PREFERRED_CHANNELS_FOR_STEREO: PropertySelector = fourcc!(b"dch2");
    pub const ZERO_TIMESTAMP_PERIOD: PropertySelector = fourcc!(b"ring");
    pub const CLOCK_IS_STABLE: PropertySelector = fourcc!(b"cstb");

    // Stream
    pub const IS_ACTIVE: PropertySelector = fourcc!(b"sact");
    pub const DIRECTION: PropertySelector = fourcc!(b"sdir");
    pub const TERMINAL_TYPE: PropertySelector = fourcc!(b"term");
    pub const STARTING_CHANNEL: PropertySelector = fourcc!(b"schn");
    pub const VIRTUAL_FORMAT: PropertySelector = fourcc!(b"sfmt");
    pub const AVAILABLE_VIRTUAL_FORMATS: PropertySelector = fourcc!(b"sfma");
    pub const PHYSICAL_FORMAT: PropertySelector = fourcc!(b"pft ");
    pub const AVAILABLE_PHYSICAL_FORMATS: PropertySelector = fourcc!(b"pfta");

    // Controls
    pub const CONTROL_SCOPE: PropertySelector = fourcc!(b"cscp");
    pub const CONTROL_ELEMENT: PropertySelector = fourcc!(b"celm");
    pub const SCALAR_VALUE: PropertySelector = fourcc!(b"lcsv");
    pub const DECIBEL_VALUE: PropertySelector = fourcc!(b"lcdv");
    pub const DECIBEL_RANGE: PropertySelector = fourcc!(b"lcdr");
    pub const CONVERT_SCALAR_TO_DECIBELS: PropertySelector = fourcc!(b"lcsd");
    pub const CONVERT_DECIBELS_TO_SCALAR: PropertySelector = fourcc!(b"lcds");
    pub const BOOLEAN_VALUE: PropertySelector = fourcc!(b"bcvl");
}

/// IO operation ids passed to the begin/do/end IO calls.
pub mod operation {
    use halite_utils::fourcc;

    pub const THREAD: u32 = fourcc!(b"thrd");
    pub const CYCLE: u32 = fourcc!(b"cycl");
    pub const READ_INPUT: u32 = fourcc!(b"read");
    pub const CONVERT_INPUT: u32 = fourcc!(b"cinp");
    pub const PROCESS_INPUT: u32 = fourcc!(b"pinp");
    pub const PROCESS_OUTPUT: u32 = fourcc!(b"pout");
    pub const MIX_OUTPUT: u32 = fourcc!(b"mixo");
    pub const PROCESS_MIX: u32 = fourcc!(b"pmix");
    pub const CONVERT_MIX: u32 = fourcc!(b"cmix");
    pub const WRITE_MIX: u32 = fourcc!(b"rite");
}

/// Transport types.
pub mod transport {
    use halite_utils::fourcc;

    pub const UNKNOWN: u32 = 0;
    pub const BUILT_IN: u32 = fourcc!(b"bltn");
    pub const VIRTUAL: u32 = fourcc!(b"virt");
}

/// Stream terminal types.
pub mod terminal {
    use halite_utils::fourcc;

    pub const UNKNOWN: u32 = 0;
    pub const LINE: u32 = fourcc!(b"line");
    pub const SPEAKER: u32 = fourcc!(b"spkr");
    pub const MICROPHONE: u32 = fourcc!(b"micr");
}

/// Format ids and linear PCM format flags.
pub mod format {
    use halite_utils::fourcc;

    pub const LINEAR_PCM: u32 = fourcc!(b"lpcm");

    pub const FLAG_IS_FLOAT: u32 = 1 << 0;
    pub const FLAG_IS_BIG_ENDIAN: u32 = 1 << 1;
    pub const FLAG_IS_SIGNED_INTEGER: u32 = 1 << 2;
    pub const FLAG_IS_PACKED: u32 = 1 << 3;
    pub const FLAG_IS_ALIGNED_HIGH: u32 = 1 << 4;
    pub const FLAG_IS_NON_INTERLEAVED: u32 = 1 << 5;
    pub const FLAG_IS_NON_MIXABLE: u32 = 1 << 6;

    /// Big-endian flag on big-endian targets, nothing otherwise.
    pub const FLAG_NATIVE_ENDIAN: u32 = if cfg!(target_endian = "big") {
        FLAG_IS_BIG_ENDIAN
    } else {
        0
    };
}

/// Data types advertised in the custom property info list.
pub mod custom_type {
    use halite_utils::fourcc;

    pub const STRING: u32 = fourcc!(b"cfst");
    pub const NONE: u32 = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_values() {
        assert_eq!(selector::NAME, 0x6C6E_616D);
        assert_eq!(selector::DEVICE_UID, 0x7569_6420);
        assert_eq!(class::DEVICE, 0x6164_6576);
    }

    #[test]
    fn test_direction_scope() {
        assert_eq!(Direction::Input.scope(), scope::INPUT);
        assert_eq!(Direction::Output.code(), 0);
        assert_eq!(Direction::Input.code(), 1);
    }

    #[test]
    fn test_reserved_ids() {
        assert_eq!(ObjectId::PLUGIN.get(), 1);
        assert!(ObjectId::FIRST_DYNAMIC > ObjectId::PLUGIN);
    }
}
