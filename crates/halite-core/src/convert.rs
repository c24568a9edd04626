//! Conversion between [`Value`]s and the host's native byte layout.
//!
//! Property data crosses the host boundary as untyped buffers. Scalars,
//! lists and structures are laid out exactly like the host headers declare
//! them, in native byte order. Strings are the exception: the host passes
//! reference-counted string handles, so a [`StringCodec`] turns Rust strings
//! into pointer-sized handles and back.
//!
//! Conversions never allocate more than the input describes and never
//! write past the destination buffer.

use std::ffi::{c_void, CStr, CString};

use crate::types::ObjectId;
use crate::value::{CustomPropertyInfo, RangedFormat, StreamFormat, Value, ValueKind, ValueRange};

/// Size of an encoded stream format.
pub const FORMAT_SIZE: usize = 40;
/// Size of an encoded ranged stream format.
pub const RANGED_FORMAT_SIZE: usize = 56;
/// Size of an encoded value range.
pub const RANGE_SIZE: usize = 16;
/// Size of an encoded custom property info entry.
pub const CUSTOM_INFO_SIZE: usize = 12;
/// Size of an encoded string handle.
pub const STRING_HANDLE_SIZE: usize = std::mem::size_of::<*const c_void>();

// =============================================================================
// Errors
// =============================================================================

/// Conversion failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// Input size does not match the property type.
    SizeMismatch { expected: usize, actual: usize },
    /// Output buffer is too small for the value.
    BufferTooSmall { needed: usize, available: usize },
    /// The value has a different kind than the property.
    KindMismatch { expected: ValueKind, actual: ValueKind },
    /// A required string handle was null.
    NullString,
    /// A string handle did not contain valid text.
    InvalidString,
    /// A numeric code has no meaning here.
    UnknownCode(u32),
}

impl std::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SizeMismatch { expected, actual } => {
                write!(f, "expected {expected} bytes, got {actual}")
            }
            Self::BufferTooSmall { needed, available } => {
                write!(f, "buffer holds {available} bytes, {needed} needed")
            }
            Self::KindMismatch { expected, actual } => {
                write!(f, "expected {}, got {}", expected.name(), actual.name())
            }
            Self::NullString => write!(f, "null string reference"),
            Self::InvalidString => write!(f, "string is not valid UTF-8"),
            Self::UnknownCode(code) => {
                write!(f, "unknown code {}", halite_utils::code_to_string(*code))
            }
        }
    }
}

impl std::error::Error for ConversionError {}

// =============================================================================
// Strings
// =============================================================================

/// Converts strings to and from host string handles.
///
/// Handles returned by [`encode`](Self::encode) are owned by the receiver,
/// which is the host for property reads. Handles passed to
/// [`decode`](Self::decode) are borrowed.
pub trait StringCodec: Send + Sync {
    /// Create a new handle holding `value`.
    fn encode(&self, value: &str) -> Result<*const c_void, ConversionError>;

    /// Read a borrowed handle.
    ///
    /// # Safety
    /// `handle` must be null or a live handle of the kind this codec creates.
    unsafe fn decode(&self, handle: *const c_void) -> Result<String, ConversionError>;

    /// Release a handle created by [`encode`](Self::encode).
    ///
    /// # Safety
    /// `handle` must come from `encode` on this codec and not be released twice.
    unsafe fn release(&self, handle: *const c_void);
}

/// Codec using heap-allocated NUL-terminated UTF-8 strings.
///
/// Used when no platform string type is available, and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct CStringCodec;

impl StringCodec for CStringCodec {
    fn encode(&self, value: &str) -> Result<*const c_void, ConversionError> {
        let owned = CString::new(value).map_err(|_| ConversionError::InvalidString)?;
        Ok(owned.into_raw() as *const c_void)
    }

    unsafe fn decode(&self, handle: *const c_void) -> Result<String, ConversionError> {
        if handle.is_null() {
            return Err(ConversionError::NullString);
        }
        // SAFETY: caller guarantees a live NUL-terminated string.
        let text = unsafe { CStr::from_ptr(handle as *const std::ffi::c_char) };
        text.to_str()
            .map(str::to_owned)
            .map_err(|_| ConversionError::InvalidString)
    }

    unsafe fn release(&self, handle: *const c_void) {
        if !handle.is_null() {
            // SAFETY: handle came from CString::into_raw in encode.
            drop(unsafe { CString::from_raw(handle as *mut std::ffi::c_char) });
        }
    }
}

// =============================================================================
// Sizes
// =============================================================================

/// Fixed element size of a kind, `None` for blobs.
pub const fn element_size(kind: ValueKind) -> Option<usize> {
    match kind {
        ValueKind::U32 | ValueKind::F32 | ValueKind::Object => Some(4),
        ValueKind::ObjectList | ValueKind::U32List => Some(4),
        ValueKind::F64 => Some(8),
        ValueKind::String => Some(STRING_HANDLE_SIZE),
        ValueKind::Range | ValueKind::RangeList => Some(RANGE_SIZE),
        ValueKind::Format => Some(FORMAT_SIZE),
        ValueKind::FormatList => Some(RANGED_FORMAT_SIZE),
        ValueKind::CustomInfoList => Some(CUSTOM_INFO_SIZE),
        ValueKind::Blob => None,
    }
}

const fn is_list(kind: ValueKind) -> bool {
    matches!(
        kind,
        ValueKind::ObjectList
            | ValueKind::U32List
            | ValueKind::RangeList
            | ValueKind::FormatList
            | ValueKind::CustomInfoList
    )
}

/// Number of bytes `value` occupies on the host side.
///
/// Strings report the handle size without creating a handle.
pub fn encoded_size(value: &Value) -> usize {
    match value {
        Value::ObjectList(v) => v.len() * 4,
        Value::U32List(v) => v.len() * 4,
        Value::RangeList(v) => v.len() * RANGE_SIZE,
        Value::FormatList(v) => v.len() * RANGED_FORMAT_SIZE,
        Value::CustomInfoList(v) => v.len() * CUSTOM_INFO_SIZE,
        Value::Blob(v) => v.len(),
        other => element_size(other.kind()).unwrap_or(0),
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Byte writer over a destination slice.
struct Writer<'a> {
    out: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(out: &'a mut [u8]) -> Self {
        Self { out, pos: 0 }
    }

    // Callers check capacity before writing.
    fn put(&mut self, bytes: &[u8]) {
        self.out[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn u32(&mut self, v: u32) {
        self.put(&v.to_ne_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.put(&v.to_ne_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.put(&v.to_ne_bytes());
    }

    fn range(&mut self, r: &ValueRange) {
        self.f64(r.minimum);
        self.f64(r.maximum);
    }

    fn format(&mut self, f: &StreamFormat) {
        self.f64(f.sample_rate);
        self.u32(f.format_id);
        self.u32(f.format_flags);
        self.u32(f.bytes_per_packet);
        self.u32(f.frames_per_packet);
        self.u32(f.bytes_per_frame);
        self.u32(f.channels_per_frame);
        self.u32(f.bits_per_channel);
        // trailing reserved field
        self.u32(0);
    }
}

/// Encode `value` into `out`, returning the number of bytes written.
///
/// Scalars and structures need the whole encoded size. Lists are
/// truncated to the number of whole elements that fit, which is how the
/// host reads variable-length properties. String handles are created only
/// once the destination is known to be large enough.
pub fn encode(value: &Value, out: &mut [u8], strings: &dyn StringCodec) -> Result<usize, ConversionError> {
    let kind = value.kind();
    if !is_list(kind) && kind != ValueKind::Blob {
        let needed = encoded_size(value);
        if out.len() < needed {
            return Err(ConversionError::BufferTooSmall {
                needed,
                available: out.len(),
            });
        }
    }

    let available = out.len();
    let capacity = |elem: usize, len: usize| (available / elem).min(len);

    match value {
        Value::U32(v) => Writer::new(out).u32(*v),
        Value::F32(v) => Writer::new(out).f32(*v),
        Value::F64(v) => Writer::new(out).f64(*v),
        Value::Object(id) => Writer::new(out).u32(id.get()),
        Value::String(s) => {
            let handle = strings.encode(s)?;
            Writer::new(out).put(&(handle as usize).to_ne_bytes());
        }
        Value::Range(r) => Writer::new(out).range(r),
        Value::Format(f) => Writer::new(out).format(f),
        Value::ObjectList(ids) => {
            let n = capacity(4, ids.len());
            let mut w = Writer::new(out);
            ids[..n].iter().for_each(|id| w.u32(id.get()));
            return Ok(n * 4);
        }
        Value::U32List(items) => {
            let n = capacity(4, items.len());
            let mut w = Writer::new(out);
            items[..n].iter().for_each(|v| w.u32(*v));
            return Ok(n * 4);
        }
        Value::RangeList(items) => {
            let n = capacity(RANGE_SIZE, items.len());
            let mut w = Writer::new(out);
            items[..n].iter().for_each(|r| w.range(r));
            return Ok(n * RANGE_SIZE);
        }
        Value::FormatList(items) => {
            let n = capacity(RANGED_FORMAT_SIZE, items.len());
            let mut w = Writer::new(out);
            for item in &items[..n] {
                w.format(&item.format);
                w.range(&item.rate_range);
            }
            return Ok(n * RANGED_FORMAT_SIZE);
        }
        Value::CustomInfoList(items) => {
            let n = capacity(CUSTOM_INFO_SIZE, items.len());
            let mut w = Writer::new(out);
            for item in &items[..n] {
                w.u32(item.selector);
                w.u32(item.data_type);
                w.u32(item.qualifier_type);
            }
            return Ok(n * CUSTOM_INFO_SIZE);
        }
        Value::Blob(bytes) => {
            let n = bytes.len().min(out.len());
            out[..n].copy_from_slice(&bytes[..n]);
            return Ok(n);
        }
    }
    Ok(encoded_size(value))
}

// =============================================================================
// Decoding
// =============================================================================

/// Byte reader over a source slice whose size was already validated.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        bytes
    }

    fn u32(&mut self) -> u32 {
        u32::from_ne_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_ne_bytes(self.take())
    }

    fn f64(&mut self) -> f64 {
        f64::from_ne_bytes(self.take())
    }

    fn usize(&mut self) -> usize {
        usize::from_ne_bytes(self.take())
    }

    fn range(&mut self) -> ValueRange {
        ValueRange::new(self.f64(), self.f64())
    }

    fn format(&mut self) -> StreamFormat {
        let format = StreamFormat {
            sample_rate: self.f64(),
            format_id: self.u32(),
            format_flags: self.u32(),
            bytes_per_packet: self.u32(),
            frames_per_packet: self.u32(),
            bytes_per_frame: self.u32(),
            channels_per_frame: self.u32(),
            bits_per_channel: self.u32(),
        };
        let _reserved = self.u32();
        format
    }

    fn list<T>(&mut self, elem: usize, mut read: impl FnMut(&mut Self) -> T) -> Vec<T> {
        let n = self.data.len() / elem;
        (0..n).map(|_| read(self)).collect()
    }
}

/// Decode host bytes as a value of `kind`.
///
/// Scalars and structures must match their size exactly. Lists must be a
/// whole number of elements. String handles are borrowed, not released.
///
/// # Safety
/// For [`ValueKind::String`] the bytes must hold null or a live handle
/// understood by `strings`.
pub unsafe fn decode(kind: ValueKind, data: &[u8], strings: &dyn StringCodec) -> Result<Value, ConversionError> {
    if let Some(elem) = element_size(kind) {
        let valid = if is_list(kind) {
            data.len() % elem == 0
        } else {
            data.len() == elem
        };
        if !valid {
            return Err(ConversionError::SizeMismatch {
                expected: elem,
                actual: data.len(),
            });
        }
    }

    let mut r = Reader::new(data);
    let value = match kind {
        ValueKind::U32 => Value::U32(r.u32()),
        ValueKind::F32 => Value::F32(r.f32()),
        ValueKind::F64 => Value::F64(r.f64()),
        ValueKind::Object => Value::Object(ObjectId(r.u32())),
        ValueKind::String => {
            let handle = r.usize() as *const c_void;
            // SAFETY: forwarded from the caller.
            Value::String(unsafe { strings.decode(handle) }?)
        }
        ValueKind::Range => Value::Range(r.range()),
        ValueKind::Format => Value::Format(r.format()),
        ValueKind::ObjectList => Value::ObjectList(r.list(4, |r| ObjectId(r.u32()))),
        ValueKind::U32List => Value::U32List(r.list(4, Reader::u32)),
        ValueKind::RangeList => Value::RangeList(r.list(RANGE_SIZE, Reader::range)),
        ValueKind::FormatList => Value::FormatList(r.list(RANGED_FORMAT_SIZE, |r| RangedFormat {
            format: r.format(),
            rate_range: r.range(),
        })),
        ValueKind::CustomInfoList => Value::CustomInfoList(r.list(CUSTOM_INFO_SIZE, |r| {
            CustomPropertyInfo {
                selector: r.u32(),
                data_type: r.u32(),
                qualifier_type: r.u32(),
            }
        })),
        ValueKind::Blob => Value::Blob(data.to_vec()),
    };
    Ok(value)
}

/// Release the string handle inside an encoded string value.
///
/// Used when an encoded value never reaches the host.
///
/// # Safety
/// `data` must hold a handle produced by `encode` with the same codec.
pub unsafe fn release_encoded_string(data: &[u8], strings: &dyn StringCodec) {
    if data.len() >= STRING_HANDLE_SIZE {
        let handle = Reader::new(&data[..STRING_HANDLE_SIZE]).usize() as *const c_void;
        // SAFETY: forwarded from the caller.
        unsafe { strings.release(handle) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::SampleFormat;

    fn decode_plain(kind: ValueKind, data: &[u8]) -> Result<Value, ConversionError> {
        // SAFETY: no string kinds are decoded through this helper.
        unsafe { decode(kind, data, &CStringCodec) }
    }

    #[test]
    fn test_u32_layout_is_native() {
        let mut out = [0u8; 4];
        let n = encode(&Value::U32(0x0102_0304), &mut out, &CStringCodec).unwrap();
        assert_eq!(n, 4);
        assert_eq!(out, 0x0102_0304u32.to_ne_bytes());
    }

    #[test]
    fn test_scalar_buffer_too_small() {
        let mut out = [0u8; 4];
        let err = encode(&Value::F64(1.0), &mut out, &CStringCodec).unwrap_err();
        assert_eq!(
            err,
            ConversionError::BufferTooSmall {
                needed: 8,
                available: 4
            }
        );
    }

    #[test]
    fn test_scalar_size_must_match() {
        let err = decode_plain(ValueKind::U32, &[0u8; 2]).unwrap_err();
        assert_eq!(err, ConversionError::SizeMismatch { expected: 4, actual: 2 });
        assert!(decode_plain(ValueKind::F64, &[0u8; 4]).is_err());
    }

    #[test]
    fn test_list_truncated_to_whole_elements() {
        let list = Value::ObjectList(vec![ObjectId(2), ObjectId(3), ObjectId(4)]);
        let mut out = [0u8; 10];
        let n = encode(&list, &mut out, &CStringCodec).unwrap();
        assert_eq!(n, 8);
        assert_eq!(
            decode_plain(ValueKind::ObjectList, &out[..n]).unwrap(),
            Value::ObjectList(vec![ObjectId(2), ObjectId(3)])
        );
    }

    #[test]
    fn test_list_size_must_be_whole() {
        assert!(decode_plain(ValueKind::U32List, &[0u8; 6]).is_err());
        assert_eq!(
            decode_plain(ValueKind::U32List, &[]).unwrap(),
            Value::U32List(Vec::new())
        );
    }

    #[test]
    fn test_format_is_forty_bytes() {
        let fmt = StreamFormat::pcm(44_100.0, 2, SampleFormat::I16);
        let mut out = [0xAAu8; FORMAT_SIZE];
        assert_eq!(encode(&Value::Format(fmt), &mut out, &CStringCodec), Ok(FORMAT_SIZE));
        assert_eq!(&out[36..40], &[0, 0, 0, 0]);
        assert_eq!(decode_plain(ValueKind::Format, &out).unwrap(), Value::Format(fmt));
    }

    #[test]
    fn test_ranged_format_layout() {
        let ranged = RangedFormat {
            format: StreamFormat::float32(48_000.0, 2),
            rate_range: ValueRange::new(44_100.0, 48_000.0),
        };
        let value = Value::FormatList(vec![ranged]);
        assert_eq!(encoded_size(&value), RANGED_FORMAT_SIZE);
        let mut out = [0u8; RANGED_FORMAT_SIZE];
        encode(&value, &mut out, &CStringCodec).unwrap();
        assert_eq!(f64::from_ne_bytes(out[40..48].try_into().unwrap()), 44_100.0);
        assert_eq!(decode_plain(ValueKind::FormatList, &out).unwrap(), value);
    }

    #[test]
    fn test_string_handle_round_trip() {
        let codec = CStringCodec;
        let mut out = [0u8; STRING_HANDLE_SIZE];
        let n = encode(&Value::String("Halite".into()), &mut out, &codec).unwrap();
        assert_eq!(n, STRING_HANDLE_SIZE);

        // SAFETY: out holds a handle created by the same codec.
        let decoded = unsafe { decode(ValueKind::String, &out, &codec) }.unwrap();
        assert_eq!(decoded, Value::String("Halite".into()));
        // SAFETY: released exactly once.
        unsafe { release_encoded_string(&out, &codec) };
    }

    #[test]
    fn test_null_string_rejected() {
        let out = [0u8; STRING_HANDLE_SIZE];
        // SAFETY: a null handle is allowed input.
        let err = unsafe { decode(ValueKind::String, &out, &CStringCodec) }.unwrap_err();
        assert_eq!(err, ConversionError::NullString);
    }

    #[test]
    fn test_string_not_created_when_buffer_small() {
        let mut out = [0u8; 2];
        let err = encode(&Value::String("x".into()), &mut out, &CStringCodec).unwrap_err();
        assert!(matches!(err, ConversionError::BufferTooSmall { .. }));
    }

    #[test]
    fn test_custom_info_layout() {
        let info = Value::CustomInfoList(vec![CustomPropertyInfo {
            selector: 0x6162_6364,
            data_type: crate::types::custom_type::STRING,
            qualifier_type: 0,
        }]);
        let mut out = [0u8; 24];
        assert_eq!(encode(&info, &mut out, &CStringCodec), Ok(CUSTOM_INFO_SIZE));
        assert_eq!(decode_plain(ValueKind::CustomInfoList, &out[..12]).unwrap(), info);
    }
}
