//! Typed property values.
//!
//! [`Value`] is the safe, owned representation of everything that travels
//! through the property interface. The byte layout used on the host side is
//! handled by [`convert`](crate::convert).

use serde::{Deserialize, Serialize};

use crate::convert::ConversionError;
use crate::types::{format, ObjectId};

// =============================================================================
// Plain data carried by values
// =============================================================================

/// Closed range of `f64` values, used for sample rates and decibel ranges.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ValueRange {
    pub minimum: f64,
    pub maximum: f64,
}

impl ValueRange {
    pub const fn new(minimum: f64, maximum: f64) -> Self {
        Self { minimum, maximum }
    }

    /// Degenerate range containing a single value.
    pub const fn point(value: f64) -> Self {
        Self::new(value, value)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.minimum && value <= self.maximum
    }
}

/// Sample layout of a linear PCM stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    F32,
    I16,
    I24,
    I32,
}

impl SampleFormat {
    pub const fn bits(self) -> u32 {
        match self {
            Self::I16 => 16,
            Self::I24 => 24,
            Self::F32 | Self::I32 => 32,
        }
    }

    const fn flags(self) -> u32 {
        let kind = match self {
            Self::F32 => format::FLAG_IS_FLOAT,
            _ => format::FLAG_IS_SIGNED_INTEGER,
        };
        kind | format::FLAG_IS_PACKED | format::FLAG_NATIVE_ENDIAN
    }
}

/// Description of a stream's data layout (40 bytes on the host side).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamFormat {
    pub sample_rate: f64,
    pub format_id: u32,
    pub format_flags: u32,
    pub bytes_per_packet: u32,
    pub frames_per_packet: u32,
    pub bytes_per_frame: u32,
    pub channels_per_frame: u32,
    pub bits_per_channel: u32,
}

impl StreamFormat {
    /// Packed, interleaved, native-endian linear PCM.
    pub const fn pcm(sample_rate: f64, channels: u32, sample: SampleFormat) -> Self {
        let bytes_per_frame = channels * (sample.bits() / 8);
        Self {
            sample_rate,
            format_id: format::LINEAR_PCM,
            format_flags: sample.flags(),
            bytes_per_packet: bytes_per_frame,
            frames_per_packet: 1,
            bytes_per_frame,
            channels_per_frame: channels,
            bits_per_channel: sample.bits(),
        }
    }

    /// 32-bit float interleaved PCM, the canonical virtual format.
    pub const fn float32(sample_rate: f64, channels: u32) -> Self {
        Self::pcm(sample_rate, channels, SampleFormat::F32)
    }

    /// Same layout at another sample rate.
    pub const fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Decode the sample layout from format id and flags.
    ///
    /// Only packed, interleaved, native-endian linear PCM is understood.
    pub fn sample_format(&self) -> Result<SampleFormat, ConversionError> {
        if self.format_id != format::LINEAR_PCM {
            return Err(ConversionError::UnknownCode(self.format_id));
        }
        let unsupported = format::FLAG_IS_NON_INTERLEAVED
            | (format::FLAG_IS_BIG_ENDIAN & !format::FLAG_NATIVE_ENDIAN);
        if self.format_flags & unsupported != 0 {
            return Err(ConversionError::UnknownCode(self.format_flags));
        }
        let is_float = self.format_flags & format::FLAG_IS_FLOAT != 0;
        match (is_float, self.bits_per_channel) {
            (true, 32) => Ok(SampleFormat::F32),
            (false, 16) => Ok(SampleFormat::I16),
            (false, 24) => Ok(SampleFormat::I24),
            (false, 32) => Ok(SampleFormat::I32),
            _ => Err(ConversionError::UnknownCode(self.bits_per_channel)),
        }
    }

    /// True when the size fields agree with channels and bit depth.
    pub fn is_consistent(&self) -> bool {
        self.channels_per_frame > 0
            && self.sample_rate > 0.0
            && self.frames_per_packet == 1
            && self.bytes_per_frame == self.channels_per_frame * (self.bits_per_channel / 8)
            && self.bytes_per_packet == self.bytes_per_frame
    }

    /// Same layout, ignoring sample rate.
    pub fn same_layout(&self, other: &Self) -> bool {
        self.format_id == other.format_id
            && self.format_flags == other.format_flags
            && self.bytes_per_packet == other.bytes_per_packet
            && self.frames_per_packet == other.frames_per_packet
            && self.bytes_per_frame == other.bytes_per_frame
            && self.channels_per_frame == other.channels_per_frame
            && self.bits_per_channel == other.bits_per_channel
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self::float32(48_000.0, 2)
    }
}

/// A stream format together with the sample rates it supports
/// (56 bytes on the host side).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangedFormat {
    pub format: StreamFormat,
    pub rate_range: ValueRange,
}

impl RangedFormat {
    /// A format available at exactly its own sample rate.
    pub fn fixed(format: StreamFormat) -> Self {
        Self {
            format,
            rate_range: ValueRange::point(format.sample_rate),
        }
    }

    /// True when `candidate` has this layout at a supported rate.
    pub fn accepts(&self, candidate: &StreamFormat) -> bool {
        self.format.same_layout(candidate) && self.rate_range.contains(candidate.sample_rate)
    }
}

/// Entry of the custom property info list (12 bytes on the host side).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomPropertyInfo {
    pub selector: u32,
    pub data_type: u32,
    pub qualifier_type: u32,
}

// =============================================================================
// Value
// =============================================================================

/// Type tag of a [`Value`], used by property descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    U32,
    F32,
    F64,
    String,
    Object,
    ObjectList,
    U32List,
    Range,
    RangeList,
    Format,
    FormatList,
    CustomInfoList,
    Blob,
}

impl ValueKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::U32 => "u32",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::String => "string",
            Self::Object => "object",
            Self::ObjectList => "object list",
            Self::U32List => "u32 list",
            Self::Range => "range",
            Self::RangeList => "range list",
            Self::Format => "format",
            Self::FormatList => "format list",
            Self::CustomInfoList => "custom property info list",
            Self::Blob => "blob",
        }
    }
}

/// A property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U32(u32),
    F32(f32),
    F64(f64),
    String(String),
    Object(ObjectId),
    ObjectList(Vec<ObjectId>),
    U32List(Vec<u32>),
    Range(ValueRange),
    RangeList(Vec<ValueRange>),
    Format(StreamFormat),
    FormatList(Vec<RangedFormat>),
    CustomInfoList(Vec<CustomPropertyInfo>),
    Blob(Vec<u8>),
}

macro_rules! accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        #[doc = concat!("The contained value if this is a `", stringify!($variant), "`.")]
        pub fn $name(&self) -> Result<$ty, ConversionError> {
            match self {
                Self::$variant(v) => Ok(v.clone()),
                other => Err(other.mismatch(ValueKind::$variant)),
            }
        }
    };
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::U32(_) => ValueKind::U32,
            Self::F32(_) => ValueKind::F32,
            Self::F64(_) => ValueKind::F64,
            Self::String(_) => ValueKind::String,
            Self::Object(_) => ValueKind::Object,
            Self::ObjectList(_) => ValueKind::ObjectList,
            Self::U32List(_) => ValueKind::U32List,
            Self::Range(_) => ValueKind::Range,
            Self::RangeList(_) => ValueKind::RangeList,
            Self::Format(_) => ValueKind::Format,
            Self::FormatList(_) => ValueKind::FormatList,
            Self::CustomInfoList(_) => ValueKind::CustomInfoList,
            Self::Blob(_) => ValueKind::Blob,
        }
    }

    /// Boolean properties are `u32` 0 or 1 on the host side.
    pub fn from_bool(value: bool) -> Self {
        Self::U32(u32::from(value))
    }

    fn mismatch(&self, expected: ValueKind) -> ConversionError {
        ConversionError::KindMismatch {
            expected,
            actual: self.kind(),
        }
    }

    accessor!(as_u32, U32, u32);
    accessor!(as_f32, F32, f32);
    accessor!(as_f64, F64, f64);
    accessor!(as_object, Object, ObjectId);
    accessor!(as_format, Format, StreamFormat);
    accessor!(as_u32_list, U32List, Vec<u32>);

    /// Borrow the contained string.
    pub fn as_str(&self) -> Result<&str, ConversionError> {
        match self {
            Self::String(s) => Ok(s),
            other => Err(other.mismatch(ValueKind::String)),
        }
    }
}
