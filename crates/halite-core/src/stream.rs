//! Streams.
//!
//! A stream is one direction of audio data on a device. Its virtual format
//! is what clients see in their IO buffers. Halite does not convert sample
//! formats, so the physical format is the same value.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::{base_property, Interface, Object, ObjectCore, PropertySpec};
use crate::types::{class, selector, terminal, ClassId, Direction, ObjectId, PropertyAddress};
use crate::value::{RangedFormat, StreamFormat, Value, ValueKind};

const CLASSES: &[ClassId] = &[class::STREAM, class::OBJECT];

const PROPERTIES: &[PropertySpec] = &[
    PropertySpec::read_write(selector::IS_ACTIVE, ValueKind::U32),
    PropertySpec::read(selector::DIRECTION, ValueKind::U32),
    PropertySpec::read(selector::TERMINAL_TYPE, ValueKind::U32),
    PropertySpec::read(selector::STARTING_CHANNEL, ValueKind::U32),
    PropertySpec::read(selector::LATENCY, ValueKind::U32),
    PropertySpec::read_write(selector::VIRTUAL_FORMAT, ValueKind::Format),
    PropertySpec::read(selector::AVAILABLE_VIRTUAL_FORMATS, ValueKind::FormatList),
    PropertySpec::read_write(selector::PHYSICAL_FORMAT, ValueKind::Format),
    PropertySpec::read(selector::AVAILABLE_PHYSICAL_FORMATS, ValueKind::FormatList),
];

/// Construction parameters of a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamParameters {
    pub name: String,
    pub direction: Direction,
    /// First device channel of this stream, counting from 1.
    pub starting_channel: u32,
    pub terminal_type: u32,
    /// Latency in frames on top of the device latency.
    pub latency: u32,
    pub format: StreamFormat,
    /// Formats a client may switch to. Empty means only `format`.
    pub available_formats: Vec<RangedFormat>,
}

impl Default for StreamParameters {
    fn default() -> Self {
        Self {
            name: String::new(),
            direction: Direction::Output,
            starting_channel: 1,
            terminal_type: terminal::UNKNOWN,
            latency: 0,
            format: StreamFormat::default(),
            available_formats: Vec::new(),
        }
    }
}

impl StreamParameters {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_format(mut self, format: StreamFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_available_formats(mut self, formats: Vec<RangedFormat>) -> Self {
        self.available_formats = formats;
        self
    }

    pub fn with_terminal_type(mut self, terminal_type: u32) -> Self {
        self.terminal_type = terminal_type;
        self
    }

    pub fn with_starting_channel(mut self, channel: u32) -> Self {
        self.starting_channel = channel;
        self
    }

    /// Effective list of available formats.
    pub fn formats(&self) -> Vec<RangedFormat> {
        if self.available_formats.is_empty() {
            vec![RangedFormat::fixed(self.format)]
        } else {
            self.available_formats.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.starting_channel == 0 {
            return Err(Error::InvalidValue("starting channel counts from 1".into()));
        }
        for candidate in std::iter::once(&self.format).chain(self.available_formats.iter().map(|f| &f.format)) {
            if !candidate.is_consistent() {
                return Err(Error::InvalidValue(format!(
                    "inconsistent stream format {candidate:?}"
                )));
            }
            candidate.sample_format().map_err(|_| Error::UnsupportedFormat)?;
        }
        if !self.formats().iter().any(|f| f.accepts(&self.format)) {
            return Err(Error::UnsupportedFormat);
        }
        Ok(())
    }
}

/// A stream object.
pub struct Stream {
    core: ObjectCore,
    direction: Direction,
    starting_channel: u32,
    terminal_type: u32,
    latency: u32,
    active: AtomicBool,
    format: RwLock<StreamFormat>,
    // Mirrors `format` for the IO thread.
    bytes_per_frame: AtomicU32,
    available: Vec<RangedFormat>,
}

impl Stream {
    pub fn new(context: &Arc<Context>, id: ObjectId, device: ObjectId, params: StreamParameters) -> Self {
        let available = params.formats();
        Self {
            core: ObjectCore::new(context, id, device, CLASSES).with_name(params.name),
            direction: params.direction,
            starting_channel: params.starting_channel,
            terminal_type: params.terminal_type,
            latency: params.latency,
            active: AtomicBool::new(true),
            bytes_per_frame: AtomicU32::new(params.format.bytes_per_frame),
            format: RwLock::new(params.format),
            available,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn starting_channel(&self) -> u32 {
        self.starting_channel
    }

    pub fn latency(&self) -> u32 {
        self.latency
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        if self.active.swap(active, Ordering::AcqRel) != active {
            self.core.notify(&[selector::IS_ACTIVE]);
        }
    }

    /// Current virtual format.
    pub fn format(&self) -> StreamFormat {
        *self.format.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn available_formats(&self) -> &[RangedFormat] {
        &self.available
    }

    /// Switch to another advertised format.
    pub fn set_format(&self, format: StreamFormat) -> Result<()> {
        self.update_format(|_| format)
    }

    /// Replace the format with `change(current)` under the format lock.
    fn update_format(&self, change: impl FnOnce(StreamFormat) -> StreamFormat) -> Result<()> {
        let format = {
            let mut current = self.format.write().unwrap_or_else(|e| e.into_inner());
            let format = change(*current);
            if !self.available.iter().any(|f| f.accepts(&format)) {
                return Err(Error::UnsupportedFormat);
            }
            if *current == format {
                return Ok(());
            }
            *current = format;
            self.bytes_per_frame
                .store(format.bytes_per_frame, Ordering::Release);
            format
        };
        log::debug!(
            "stream {} format: {} Hz, {} channels",
            self.id(),
            format.sample_rate,
            format.channels_per_frame
        );
        self.core
            .notify(&[selector::VIRTUAL_FORMAT, selector::PHYSICAL_FORMAT]);
        Ok(())
    }

    /// Follow a device sample rate change when the current layout allows it.
    pub(crate) fn follow_sample_rate(&self, sample_rate: f64) {
        if self
            .update_format(|current| current.with_sample_rate(sample_rate))
            .is_err()
        {
            log::debug!("stream {} does not support {sample_rate} Hz", self.id());
        }
    }

    /// Size of an IO buffer holding `frames` frames. Realtime safe.
    pub fn buffer_len(&self, frames: u32) -> usize {
        frames as usize * self.bytes_per_frame.load(Ordering::Acquire) as usize
    }
}

impl Object for Stream {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn interfaces(&self) -> &'static [Interface] {
        &[Interface::Unknown, Interface::Properties, Interface::Io]
    }

    fn property_specs(&self) -> &'static [PropertySpec] {
        PROPERTIES
    }

    fn get_property(&self, address: &PropertyAddress, qualifier: Option<&Value>) -> Result<Value> {
        let value = match address.selector {
            selector::IS_ACTIVE => Value::from_bool(self.is_active()),
            selector::DIRECTION => Value::U32(self.direction.code()),
            selector::TERMINAL_TYPE => Value::U32(self.terminal_type),
            selector::STARTING_CHANNEL => Value::U32(self.starting_channel),
            selector::LATENCY => Value::U32(self.latency),
            selector::VIRTUAL_FORMAT | selector::PHYSICAL_FORMAT => Value::Format(self.format()),
            selector::AVAILABLE_VIRTUAL_FORMATS | selector::AVAILABLE_PHYSICAL_FORMATS => {
                Value::FormatList(self.available.clone())
            }
            _ => return base_property(self, address, qualifier),
        };
        Ok(value)
    }

    fn set_property(&self, address: &PropertyAddress, value: &Value) -> Result<()> {
        match address.selector {
            selector::IS_ACTIVE => match value.as_u32()? {
                0 => self.set_active(false),
                1 => self.set_active(true),
                other => return Err(Error::InvalidValue(format!("{other} is not a boolean"))),
            },
            selector::VIRTUAL_FORMAT | selector::PHYSICAL_FORMAT => {
                self.set_format(value.as_format()?)?
            }
            _ => return self.core.set_base_property(address, value),
        }
        Ok(())
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id())
            .field("direction", &self.direction)
            .field("format", &self.format())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::RecordingHost;
    use crate::value::{SampleFormat, ValueRange};

    fn stream(context: &Arc<Context>) -> Stream {
        let params = StreamParameters::new(Direction::Input).with_available_formats(vec![
            RangedFormat {
                format: StreamFormat::float32(48_000.0, 2),
                rate_range: ValueRange::new(44_100.0, 48_000.0),
            },
            RangedFormat::fixed(StreamFormat::pcm(48_000.0, 2, SampleFormat::I16)),
        ]);
        params.validate().unwrap();
        Stream::new(context, ObjectId(3), ObjectId(2), params)
    }

    #[test]
    fn test_defaults() {
        let context = Arc::new(Context::new());
        let stream = stream(&context);
        let get = |sel| stream.get_property(&PropertyAddress::global(sel), None).unwrap();
        assert_eq!(get(selector::DIRECTION), Value::U32(1));
        assert_eq!(get(selector::STARTING_CHANNEL), Value::U32(1));
        assert_eq!(get(selector::IS_ACTIVE), Value::U32(1));
        assert_eq!(get(selector::CLASS), Value::U32(class::STREAM));
        assert_eq!(get(selector::OWNER), Value::Object(ObjectId(2)));
        assert_eq!(stream.buffer_len(512), 512 * 8);
    }

    #[test]
    fn test_set_format_within_range() {
        let host = Arc::new(RecordingHost::default());
        let context = Arc::new(Context::new().with_host(host.clone()));
        let stream = stream(&context);

        stream.set_format(StreamFormat::float32(44_100.0, 2)).unwrap();
        assert_eq!(stream.format().sample_rate, 44_100.0);
        assert_eq!(
            host.changed_selectors(ObjectId(3)),
            vec![selector::VIRTUAL_FORMAT, selector::PHYSICAL_FORMAT]
        );

        stream.set_format(StreamFormat::pcm(48_000.0, 2, SampleFormat::I16)).unwrap();
        assert_eq!(stream.buffer_len(10), 40);
    }

    #[test]
    fn test_set_unsupported_format() {
        let context = Arc::new(Context::new());
        let stream = stream(&context);
        let before = stream.format();
        assert_eq!(
            stream.set_format(StreamFormat::float32(96_000.0, 2)),
            Err(Error::UnsupportedFormat)
        );
        assert_eq!(stream.format(), before);
    }

    #[test]
    fn test_rate_follow_keeps_concurrent_layout_change() {
        let context = Arc::new(Context::new());
        let stream = stream(&context);
        let packed = StreamFormat::pcm(48_000.0, 2, SampleFormat::I16);

        for _ in 0..100 {
            stream.set_format(StreamFormat::float32(48_000.0, 2)).unwrap();
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    for _ in 0..50 {
                        stream.follow_sample_rate(48_000.0);
                    }
                });
                stream.set_format(packed).unwrap();
            });
            assert_eq!(stream.format(), packed);
        }
    }

    #[test]
    fn test_is_active_rejects_non_boolean() {
        let context = Arc::new(Context::new());
        let stream = stream(&context);
        let address = PropertyAddress::global(selector::IS_ACTIVE);
        assert!(stream.set_property(&address, &Value::U32(2)).is_err());
        assert!(stream.is_active());
        stream.set_property(&address, &Value::U32(0)).unwrap();
        assert!(!stream.is_active());
    }

    #[test]
    fn test_parameters_validation() {
        assert!(StreamParameters::default().validate().is_ok());

        let mut bad = StreamParameters::default();
        bad.format.bytes_per_frame = 3;
        assert!(bad.validate().is_err());

        let mismatch = StreamParameters::default()
            .with_available_formats(vec![RangedFormat::fixed(StreamFormat::float32(44_100.0, 2))]);
        assert_eq!(mismatch.validate(), Err(Error::UnsupportedFormat));
    }
}
