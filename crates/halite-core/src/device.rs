//! Devices.
//!
//! A device owns streams and controls, tracks its clients, runs the IO
//! clock and answers the host's IO cycle calls. Audio data itself goes
//! through the device's [`IoRequestHandler`].
//!
//! # Configuration changes
//!
//! The nominal sample rate can't change under a running IO cycle. When a
//! host is connected, setting it records a pending change and asks the
//! host to schedule it; the host later performs or aborts the change by
//! its action id. Without a host the change applies immediately.
//!
//! # Zero timestamps
//!
//! While IO runs, the device timeline is anchored at the host time IO
//! started. Every `zero_timestamp_period` frames the zero timestamp
//! advances by one period, both in sample time and in host ticks.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{Error, Missing, Result};
use crate::io::{ClientInfo, IoCycleInfo, IoOperation, IoRequestHandler, SilentIoHandler, ZeroTimestamp};
use crate::mute::{MuteControl, MuteParameters};
use crate::object::{base_property, Interface, Object, ObjectCore, PropertySpec};
use crate::registry::Registry;
use crate::stream::{Stream, StreamParameters};
use crate::types::{class, scope, selector, transport, ClassId, Direction, ObjectId, PropertyAddress};
use crate::value::{Value, ValueKind, ValueRange};
use crate::volume::{VolumeControl, VolumeParameters};

const CLASSES: &[ClassId] = &[class::DEVICE, class::OBJECT];

const PROPERTIES: &[PropertySpec] = &[
    PropertySpec::read(selector::DEVICE_UID, ValueKind::String),
    PropertySpec::read(selector::MODEL_UID, ValueKind::String),
    PropertySpec::read(selector::TRANSPORT_TYPE, ValueKind::U32),
    PropertySpec::read(selector::RELATED_DEVICES, ValueKind::ObjectList),
    PropertySpec::read(selector::CLOCK_DOMAIN, ValueKind::U32),
    PropertySpec::read(selector::DEVICE_IS_ALIVE, ValueKind::U32),
    PropertySpec::read(selector::DEVICE_IS_RUNNING, ValueKind::U32),
    PropertySpec::read(selector::DEVICE_CAN_BE_DEFAULT, ValueKind::U32),
    PropertySpec::read(selector::DEVICE_CAN_BE_DEFAULT_FOR_SYSTEM, ValueKind::U32),
    PropertySpec::read(selector::LATENCY, ValueKind::U32),
    PropertySpec::read(selector::STREAMS, ValueKind::ObjectList),
    PropertySpec::read(selector::CONTROL_LIST, ValueKind::ObjectList),
    PropertySpec::read(selector::SAFETY_OFFSET, ValueKind::U32),
    PropertySpec::read_write(selector::NOMINAL_SAMPLE_RATE, ValueKind::F64),
    PropertySpec::read(selector::AVAILABLE_NOMINAL_SAMPLE_RATES, ValueKind::RangeList),
    PropertySpec::read(selector::IS_HIDDEN, ValueKind::U32),
    PropertySpec::read_write(selector::PREFERRED_CHANNELS_FOR_STEREO, ValueKind::U32List),
    PropertySpec::read(selector::ZERO_TIMESTAMP_PERIOD, ValueKind::U32),
    PropertySpec::read(selector::CLOCK_IS_STABLE, ValueKind::U32),
];

// =============================================================================
// Parameters
// =============================================================================

/// Construction parameters of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceParameters {
    pub name: String,
    pub manufacturer: String,
    /// Persistent unique id. Generated when empty.
    pub device_uid: String,
    /// Shared by devices of the same model. Generated when empty.
    pub model_uid: String,
    pub transport_type: u32,
    pub clock_domain: u32,
    pub sample_rate: f64,
    /// Supported nominal rates. Empty means only `sample_rate`.
    pub available_sample_rates: Vec<f64>,
    /// Latency in frames.
    pub latency: u32,
    /// Safety offset in frames.
    pub safety_offset: u32,
    /// Frames between two zero timestamps.
    pub zero_timestamp_period: u32,
    pub can_be_default: bool,
    pub can_be_default_for_system_sounds: bool,
    pub is_hidden: bool,
    pub clock_is_stable: bool,
    /// Left and right channel, counting from 1.
    pub preferred_channels_for_stereo: [u32; 2],
}

impl Default for DeviceParameters {
    fn default() -> Self {
        Self {
            name: String::new(),
            manufacturer: String::new(),
            device_uid: String::new(),
            model_uid: String::new(),
            transport_type: transport::VIRTUAL,
            clock_domain: 0,
            sample_rate: 48_000.0,
            available_sample_rates: Vec::new(),
            latency: 0,
            safety_offset: 0,
            zero_timestamp_period: 16_384,
            can_be_default: true,
            can_be_default_for_system_sounds: true,
            is_hidden: false,
            clock_is_stable: true,
            preferred_channels_for_stereo: [1, 2],
        }
    }
}

impl DeviceParameters {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = manufacturer.into();
        self
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.device_uid = uid.into();
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_available_sample_rates(mut self, rates: Vec<f64>) -> Self {
        self.available_sample_rates = rates;
        self
    }

    pub fn with_latency(mut self, latency: u32) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_zero_timestamp_period(mut self, period: u32) -> Self {
        self.zero_timestamp_period = period;
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.is_hidden = hidden;
        self
    }

    /// Effective list of nominal sample rates.
    pub fn sample_rates(&self) -> Vec<f64> {
        if self.available_sample_rates.is_empty() {
            vec![self.sample_rate]
        } else {
            self.available_sample_rates.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rates().iter().any(|&r| !(r > 0.0)) {
            return Err(Error::InvalidValue("sample rates must be positive".into()));
        }
        if !self.sample_rates().contains(&self.sample_rate) {
            return Err(Error::InvalidValue(format!(
                "{} Hz is not an available sample rate",
                self.sample_rate
            )));
        }
        if self.zero_timestamp_period == 0 {
            return Err(Error::InvalidValue("zero timestamp period must not be 0".into()));
        }
        if self.preferred_channels_for_stereo.contains(&0) {
            return Err(Error::InvalidValue("channels count from 1".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Device
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum PendingChange {
    SampleRate(f64),
}

/// A device object.
pub struct Device {
    core: ObjectCore,
    device_uid: String,
    model_uid: String,
    transport_type: u32,
    clock_domain: u32,
    sample_rates: Vec<f64>,
    latency: u32,
    safety_offset: u32,
    zero_timestamp_period: u32,
    can_be_default: bool,
    can_be_default_for_system_sounds: bool,
    is_hidden: bool,
    clock_is_stable: bool,

    sample_rate: AtomicU64,
    /// Left channel in the high half, right in the low half.
    preferred_stereo: AtomicU64,
    streams: RwLock<Vec<(ObjectId, Direction)>>,
    controls: RwLock<Vec<ObjectId>>,
    clients: RwLock<HashMap<u32, ClientInfo>>,

    // IO state. `io_clients` is only changed under its mutex; the atomics
    // mirror it for the IO thread.
    io_clients: Mutex<u32>,
    running: AtomicBool,
    anchor_host_time: AtomicU64,
    timeline_seed: AtomicU64,
    handler: RwLock<Arc<dyn IoRequestHandler>>,

    pending: Mutex<HashMap<u64, PendingChange>>,
    next_action: AtomicU64,
}

impl Device {
    /// Parameters must have passed [`DeviceParameters::validate`].
    pub fn new(context: &Arc<Context>, id: ObjectId, plugin: ObjectId, params: DeviceParameters) -> Self {
        let sample_rates = params.sample_rates();
        let device_uid = if params.device_uid.is_empty() {
            crate::uid::generate("device")
        } else {
            params.device_uid
        };
        let model_uid = if params.model_uid.is_empty() {
            crate::uid::generate("model")
        } else {
            params.model_uid
        };
        let [left, right] = params.preferred_channels_for_stereo;
        Self {
            core: ObjectCore::new(context, id, plugin, CLASSES)
                .with_name(params.name)
                .with_manufacturer(params.manufacturer),
            device_uid,
            model_uid,
            transport_type: params.transport_type,
            clock_domain: params.clock_domain,
            sample_rates,
            latency: params.latency,
            safety_offset: params.safety_offset,
            zero_timestamp_period: params.zero_timestamp_period,
            can_be_default: params.can_be_default,
            can_be_default_for_system_sounds: params.can_be_default_for_system_sounds,
            is_hidden: params.is_hidden,
            clock_is_stable: params.clock_is_stable,
            sample_rate: AtomicU64::new(params.sample_rate.to_bits()),
            preferred_stereo: AtomicU64::new(pack_stereo(left, right)),
            streams: RwLock::new(Vec::new()),
            controls: RwLock::new(Vec::new()),
            clients: RwLock::new(HashMap::new()),
            io_clients: Mutex::new(0),
            running: AtomicBool::new(false),
            anchor_host_time: AtomicU64::new(0),
            timeline_seed: AtomicU64::new(1),
            handler: RwLock::new(Arc::new(SilentIoHandler)),
            pending: Mutex::new(HashMap::new()),
            next_action: AtomicU64::new(1),
        }
    }

    pub fn uid(&self) -> &str {
        &self.device_uid
    }

    pub fn model_uid(&self) -> &str {
        &self.model_uid
    }

    /// Current nominal sample rate. Realtime safe.
    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate.load(Ordering::Acquire))
    }

    pub fn available_sample_rates(&self) -> &[f64] {
        &self.sample_rates
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Replace the IO handler.
    pub fn set_io_handler(&self, handler: Arc<dyn IoRequestHandler>) {
        *self.handler.write().unwrap_or_else(|e| e.into_inner()) = handler;
    }

    fn handler(&self) -> Result<Arc<dyn IoRequestHandler>> {
        // Never block the IO thread on a concurrent handler swap.
        match self.handler.try_read() {
            Ok(handler) => Ok(Arc::clone(&handler)),
            Err(std::sync::TryLockError::Poisoned(e)) => Ok(Arc::clone(&e.into_inner())),
            Err(std::sync::TryLockError::WouldBlock) => Err(Error::NotReady(self.id())),
        }
    }

    // -------------------------------------------------------------------------
    // Children
    // -------------------------------------------------------------------------

    /// Create, register and activate a stream owned by this device.
    pub fn add_stream(&self, params: StreamParameters) -> Result<ObjectId> {
        params.validate()?;
        let context = self.core.context()?;
        let direction = params.direction;
        let owner = self.id();
        let id = context
            .registry()
            .register(|id| Stream::new(&context, id, owner, params))?;
        self.streams
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, direction));
        context.registry().activate(id)?;
        log::debug!("device {owner}: added {direction:?} stream {id}");
        self.core
            .notify_addresses(&children_changed(selector::STREAMS, direction.scope()));
        Ok(id)
    }

    /// Unregister a stream of this device.
    pub fn remove_stream(&self, id: ObjectId) -> Result<()> {
        let direction = {
            let mut streams = self.streams.write().unwrap_or_else(|e| e.into_inner());
            let index = streams
                .iter()
                .position(|(s, _)| *s == id)
                .ok_or(Error::NotFound(Missing::Stream(id)))?;
            streams.remove(index).1
        };
        self.core.context()?.registry().unregister(id)?;
        self.core
            .notify_addresses(&children_changed(selector::STREAMS, direction.scope()));
        Ok(())
    }

    /// Create, register and activate a volume control.
    pub fn add_volume_control(&self, params: VolumeParameters) -> Result<ObjectId> {
        params.validate()?;
        let context = self.core.context()?;
        let owner = self.id();
        let id = context
            .registry()
            .register(|id| VolumeControl::new(&context, id, owner, params))?;
        self.attach_control(&context, id)
    }

    /// Create, register and activate a mute control.
    pub fn add_mute_control(&self, params: MuteParameters) -> Result<ObjectId> {
        let context = self.core.context()?;
        let owner = self.id();
        let id = context
            .registry()
            .register(|id| MuteControl::new(&context, id, owner, params))?;
        self.attach_control(&context, id)
    }

    fn attach_control(&self, context: &Context, id: ObjectId) -> Result<ObjectId> {
        self.controls
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(id);
        context.registry().activate(id)?;
        log::debug!("device {}: added control {id}", self.id());
        self.core
            .notify(&[selector::CONTROL_LIST, selector::OWNED_OBJECTS]);
        Ok(id)
    }

    /// Unregister a control of this device.
    pub fn remove_control(&self, id: ObjectId) -> Result<()> {
        {
            let mut controls = self.controls.write().unwrap_or_else(|e| e.into_inner());
            let index = controls
                .iter()
                .position(|c| *c == id)
                .ok_or(Error::NotFound(Missing::Object(id)))?;
            controls.remove(index);
        }
        self.core.context()?.registry().unregister(id)?;
        self.core
            .notify(&[selector::CONTROL_LIST, selector::OWNED_OBJECTS]);
        Ok(())
    }

    /// Stream ids, optionally only those of one direction.
    pub fn streams(&self, direction: Option<Direction>) -> Vec<ObjectId> {
        self.streams
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, d)| direction.map_or(true, |want| *d == want))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn controls(&self) -> Vec<ObjectId> {
        self.controls
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn has_streams(&self, direction: Direction) -> Result<bool> {
        let streams = self
            .streams
            .try_read()
            .map_err(|_| Error::NotReady(self.id()))?;
        Ok(streams.iter().any(|(_, d)| *d == direction))
    }

    fn streams_for_scope(&self, scope: u32) -> Vec<ObjectId> {
        match scope {
            scope::INPUT => self.streams(Some(Direction::Input)),
            scope::OUTPUT => self.streams(Some(Direction::Output)),
            _ => self.streams(None),
        }
    }

    // -------------------------------------------------------------------------
    // Clients
    // -------------------------------------------------------------------------

    pub fn add_client(&self, client: ClientInfo) -> Result<()> {
        log::debug!(
            "device {}: client {} (pid {}) connected",
            self.id(),
            client.client_id,
            client.process_id
        );
        self.clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(client.client_id, client);
        Ok(())
    }

    pub fn remove_client(&self, client_id: u32) -> Result<ClientInfo> {
        let removed = self
            .clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&client_id)
            .ok_or(Error::NotFound(Missing::Client(client_id)))?;
        log::debug!("device {}: client {client_id} disconnected", self.id());
        Ok(removed)
    }

    pub fn client(&self, client_id: u32) -> Option<ClientInfo> {
        self.clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&client_id)
            .cloned()
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        let mut clients: Vec<_> = self
            .clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        clients.sort_by_key(|c| c.client_id);
        clients
    }

    // -------------------------------------------------------------------------
    // Configuration changes
    // -------------------------------------------------------------------------

    /// Change the nominal sample rate, deferred through the host if one is
    /// connected.
    pub fn request_sample_rate(&self, sample_rate: f64) -> Result<()> {
        if !self.sample_rates.contains(&sample_rate) {
            return Err(Error::InvalidValue(format!(
                "{sample_rate} Hz is not an available sample rate"
            )));
        }
        if sample_rate == self.sample_rate() {
            return Ok(());
        }
        let context = self.core.context()?;
        let Some(host) = context.host() else {
            self.apply(PendingChange::SampleRate(sample_rate));
            return Ok(());
        };

        let action = self.next_action.fetch_add(1, Ordering::Relaxed);
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(action, PendingChange::SampleRate(sample_rate));
        log::debug!(
            "device {}: requesting sample rate {sample_rate} Hz (action {action})",
            self.id()
        );
        if let Err(err) = host.request_configuration_change(self.id(), action) {
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&action);
            return Err(err);
        }
        Ok(())
    }

    /// Apply a pending change the host has scheduled.
    pub fn perform_configuration_change(&self, action: u64) -> Result<()> {
        let change = self.take_pending(action)?;
        self.apply(change);
        Ok(())
    }

    /// Drop a pending change the host has refused.
    pub fn abort_configuration_change(&self, action: u64) -> Result<()> {
        let change = self.take_pending(action)?;
        log::debug!("device {}: aborted {change:?}", self.id());
        Ok(())
    }

    fn take_pending(&self, action: u64) -> Result<PendingChange> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&action)
            .ok_or(Error::NotFound(Missing::ConfigurationChange(action)))
    }

    fn apply(&self, change: PendingChange) {
        match change {
            PendingChange::SampleRate(sample_rate) => {
                self.sample_rate
                    .store(sample_rate.to_bits(), Ordering::Release);
                log::info!("device {}: sample rate is now {sample_rate} Hz", self.id());
                if let Ok(context) = self.core.context() {
                    for id in self.streams(None) {
                        if let Some(stream) = context.registry().lookup(id) {
                            if let Some(stream) = stream.downcast_ref::<Stream>() {
                                stream.follow_sample_rate(sample_rate);
                            }
                        }
                    }
                }
                self.core.notify(&[selector::NOMINAL_SAMPLE_RATE]);
            }
        }
    }

    // -------------------------------------------------------------------------
    // IO
    // -------------------------------------------------------------------------

    /// Start IO for one client. The first start anchors the timeline.
    pub fn start_io(&self, client_id: u32) -> Result<()> {
        let context = self.core.context()?;
        let mut count = self.io_clients.lock().unwrap_or_else(|e| e.into_inner());
        if *count == 0 {
            self.handler()?.on_start_io(self.id())?;
            self.anchor_host_time
                .store(context.clock().now(), Ordering::Release);
            self.timeline_seed.fetch_add(1, Ordering::AcqRel);
            self.running.store(true, Ordering::Release);
            log::info!("device {}: IO started by client {client_id}", self.id());
        }
        *count += 1;
        let first = *count == 1;
        drop(count);
        if first {
            self.core.notify(&[selector::DEVICE_IS_RUNNING]);
        }
        Ok(())
    }

    /// Stop IO for one client. Stopping more often than starting fails.
    pub fn stop_io(&self, client_id: u32) -> Result<()> {
        let mut count = self.io_clients.lock().unwrap_or_else(|e| e.into_inner());
        if *count == 0 {
            return Err(Error::NotRunning(self.id()));
        }
        *count -= 1;
        let last = *count == 0;
        if last {
            self.running.store(false, Ordering::Release);
            self.anchor_host_time.store(0, Ordering::Release);
            if let Ok(handler) = self.handler() {
                handler.on_stop_io(self.id());
            }
            log::info!("device {}: IO stopped by client {client_id}", self.id());
        }
        drop(count);
        if last {
            self.core.notify(&[selector::DEVICE_IS_RUNNING]);
        }
        Ok(())
    }

    /// Current zero timestamp. Realtime safe.
    pub fn zero_timestamp(&self) -> Result<ZeroTimestamp> {
        let anchor = self.anchor_host_time.load(Ordering::Acquire);
        if anchor == 0 {
            return Err(Error::NotRunning(self.id()));
        }
        let context = self.core.context()?;
        let clock = context.clock();

        let period = f64::from(self.zero_timestamp_period);
        let ticks_per_period = clock.ticks_per_second() * period / self.sample_rate();
        let elapsed = clock.now().saturating_sub(anchor) as f64;
        let periods = (elapsed / ticks_per_period).floor();

        Ok(ZeroTimestamp {
            sample_time: periods * period,
            host_time: anchor + (periods * ticks_per_period) as u64,
            seed: self.timeline_seed.load(Ordering::Acquire),
        })
    }

    /// Whether the device takes part in `operation`, and whether it works
    /// in place. Realtime safe.
    pub fn will_do_io_operation(&self, operation: IoOperation) -> Result<(bool, bool)> {
        let will_do = match operation {
            IoOperation::ReadInput | IoOperation::ProcessInput => self.has_streams(Direction::Input)?,
            IoOperation::ProcessOutput | IoOperation::WriteMix => self.has_streams(Direction::Output)?,
            _ => false,
        };
        Ok((will_do, true))
    }

    /// Start of one IO operation in the current cycle.
    pub fn begin_io_operation(&self, _operation: IoOperation, _frames: u32, _cycle: &IoCycleInfo) -> Result<()> {
        self.ensure_running()
    }

    /// End of one IO operation in the current cycle.
    pub fn end_io_operation(&self, _operation: IoOperation, _frames: u32, _cycle: &IoCycleInfo) -> Result<()> {
        self.ensure_running()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::NotRunning(self.id()))
        }
    }

    /// Run one IO operation on a stream buffer. Realtime safe as long as
    /// the handler is.
    pub fn do_io_operation(
        &self,
        client_id: u32,
        stream: &Stream,
        operation: IoOperation,
        frames: u32,
        cycle: &IoCycleInfo,
        buffer: &mut [u8],
    ) -> Result<()> {
        self.ensure_running()?;
        if !stream.is_active() {
            if operation == IoOperation::ReadInput {
                buffer.fill(0);
            }
            return Ok(());
        }
        let handler = self.handler()?;
        match operation {
            IoOperation::ReadInput => handler.on_read_input(client_id, stream, cycle, frames, buffer),
            IoOperation::ProcessInput => {
                handler.on_process_input(client_id, stream, cycle, frames, buffer)
            }
            IoOperation::ProcessOutput => {
                handler.on_process_output(client_id, stream, cycle, frames, buffer)
            }
            IoOperation::WriteMix => handler.on_write_mix(stream, cycle, frames, buffer),
            _ => Ok(()),
        }
    }
}

/// Addresses to notify when the stream list of a scope changes.
fn children_changed(list: u32, list_scope: u32) -> [PropertyAddress; 3] {
    [
        PropertyAddress::global(list),
        PropertyAddress::new(list, list_scope, crate::types::ELEMENT_MAIN),
        PropertyAddress::global(selector::OWNED_OBJECTS),
    ]
}

impl Object for Device {
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

    fn owned_objects(&self) -> Vec<ObjectId> {
        let mut owned = self.streams(None);
        owned.extend(self.controls());
        owned
    }

    fn get_property(&self, address: &PropertyAddress, qualifier: Option<&Value>) -> Result<Value> {
        let value = match address.selector {
            selector::DEVICE_UID => Value::String(self.device_uid.clone()),
            selector::MODEL_UID => Value::String(self.model_uid.clone()),
            selector::TRANSPORT_TYPE => Value::U32(self.transport_type),
            selector::RELATED_DEVICES => Value::ObjectList(vec![self.id()]),
            selector::CLOCK_DOMAIN => Value::U32(self.clock_domain),
            selector::DEVICE_IS_ALIVE => Value::from_bool(true),
            selector::DEVICE_IS_RUNNING => Value::from_bool(self.is_running()),
            selector::DEVICE_CAN_BE_DEFAULT => Value::from_bool(self.can_be_default),
            selector::DEVICE_CAN_BE_DEFAULT_FOR_SYSTEM => {
                Value::from_bool(self.can_be_default_for_system_sounds)
            }
            selector::LATENCY => Value::U32(self.latency),
            selector::STREAMS => Value::ObjectList(self.streams_for_scope(address.scope)),
            selector::CONTROL_LIST => Value::ObjectList(self.controls()),
            selector::SAFETY_OFFSET => Value::U32(self.safety_offset),
            selector::NOMINAL_SAMPLE_RATE => Value::F64(self.sample_rate()),
            selector::AVAILABLE_NOMINAL_SAMPLE_RATES => Value::RangeList(
                self.sample_rates.iter().map(|&r| ValueRange::point(r)).collect(),
            ),
            selector::IS_HIDDEN => Value::from_bool(self.is_hidden),
            selector::PREFERRED_CHANNELS_FOR_STEREO => {
                let (left, right) = unpack_stereo(self.preferred_stereo.load(Ordering::Acquire));
                Value::U32List(vec![left, right])
            }
            selector::ZERO_TIMESTAMP_PERIOD => Value::U32(self.zero_timestamp_period),
            selector::CLOCK_IS_STABLE => Value::from_bool(self.clock_is_stable),
            _ => return base_property(self, address, qualifier),
        };
        Ok(value)
    }

    fn set_property(&self, address: &PropertyAddress, value: &Value) -> Result<()> {
        match address.selector {
            selector::NOMINAL_SAMPLE_RATE => self.request_sample_rate(value.as_f64()?),
            selector::PREFERRED_CHANNELS_FOR_STEREO => {
                let channels = value.as_u32_list()?;
                let [left, right] = <[u32; 2]>::try_from(channels.as_slice())
                    .map_err(|_| Error::InvalidValue("expected two channels".into()))?;
                if left == 0 || right == 0 {
                    return Err(Error::InvalidValue("channels count from 1".into()));
                }
                self.preferred_stereo
                    .store(pack_stereo(left, right), Ordering::Release);
                self.core.notify(&[selector::PREFERRED_CHANNELS_FOR_STEREO]);
                Ok(())
            }
            _ => self.core.set_base_property(address, value),
        }
    }

    fn retire_children(&self, registry: &Registry) {
        let streams = std::mem::take(&mut *self.streams.write().unwrap_or_else(|e| e.into_inner()));
        let controls = std::mem::take(&mut *self.controls.write().unwrap_or_else(|e| e.into_inner()));
        for id in streams.into_iter().map(|(id, _)| id).chain(controls) {
            if let Err(err) = registry.unregister(id) {
                log::warn!("device {}: failed to retire child {id}: {err}", self.id());
            }
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id())
            .field("uid", &self.device_uid)
            .field("sample_rate", &self.sample_rate())
            .field("running", &self.is_running())
            .finish()
    }
}

fn pack_stereo(left: u32, right: u32) -> u64 {
    (u64::from(left) << 32) | u64::from(right)
}

fn unpack_stereo(packed: u64) -> (u32, u32) {
    ((packed >> 32) as u32, packed as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::{ManualClock, RecordingHost};
    use crate::registry::Lifecycle;

    struct Fixture {
        context: Arc<Context>,
        clock: Arc<ManualClock>,
        device: ObjectId,
    }

    impl Fixture {
        fn new(host: Option<Arc<RecordingHost>>) -> Self {
            let clock = Arc::new(ManualClock::starting_at(1_000));
            let mut context = Context::new().with_clock(clock.clone());
            if let Some(host) = host {
                context = context.with_host(host);
            }
            let context = Arc::new(context);
            let params = DeviceParameters::new("Test")
                .with_uid("test-device")
                .with_available_sample_rates(vec![44_100.0, 48_000.0])
                .with_zero_timestamp_period(480);
            params.validate().unwrap();
            let device = context
                .registry()
                .register(|id| Device::new(&context, id, ObjectId::PLUGIN, params))
                .unwrap();
            context.registry().activate(device).unwrap();
            Self {
                context,
                clock,
                device,
            }
        }

        fn device(&self) -> crate::registry::ObjectRef {
            self.context.registry().lookup(self.device).unwrap()
        }
    }

    fn as_device(pin: &crate::registry::ObjectRef) -> &Device {
        pin.downcast_ref::<Device>().unwrap()
    }

    #[test]
    fn test_basic_properties() {
        let fx = Fixture::new(None);
        let pin = fx.device();
        let get = |sel| pin.get_property(&PropertyAddress::global(sel), None).unwrap();
        assert_eq!(get(selector::DEVICE_UID), Value::String("test-device".into()));
        assert_eq!(get(selector::NAME), Value::String("Test".into()));
        assert_eq!(get(selector::TRANSPORT_TYPE), Value::U32(transport::VIRTUAL));
        assert_eq!(get(selector::NOMINAL_SAMPLE_RATE), Value::F64(48_000.0));
        assert_eq!(get(selector::DEVICE_IS_RUNNING), Value::U32(0));
        assert_eq!(get(selector::OWNER), Value::Object(ObjectId::PLUGIN));
        assert_eq!(
            get(selector::AVAILABLE_NOMINAL_SAMPLE_RATES),
            Value::RangeList(vec![ValueRange::point(44_100.0), ValueRange::point(48_000.0)])
        );
    }

    #[test]
    fn test_generated_uids() {
        let context = Arc::new(Context::new());
        let device = Device::new(&context, ObjectId(2), ObjectId::PLUGIN, DeviceParameters::default());
        assert!(!device.uid().is_empty());
        assert_ne!(device.uid(), device.model_uid());
    }

    #[test]
    fn test_streams_by_scope() {
        let fx = Fixture::new(None);
        let pin = fx.device();
        let device = as_device(&pin);
        let input = device.add_stream(StreamParameters::new(Direction::Input)).unwrap();
        let output = device.add_stream(StreamParameters::new(Direction::Output)).unwrap();

        let streams = |scope| {
            pin.get_property(&PropertyAddress::new(selector::STREAMS, scope, 0), None)
                .unwrap()
        };
        assert_eq!(streams(scope::INPUT), Value::ObjectList(vec![input]));
        assert_eq!(streams(scope::OUTPUT), Value::ObjectList(vec![output]));
        assert_eq!(streams(scope::GLOBAL), Value::ObjectList(vec![input, output]));
        assert_eq!(fx.context.registry().state(input), Some(Lifecycle::Active));
    }

    #[test]
    fn test_owned_objects_filtered_by_class() {
        let fx = Fixture::new(None);
        let pin = fx.device();
        let device = as_device(&pin);
        let stream = device.add_stream(StreamParameters::default()).unwrap();
        let volume = device.add_volume_control(VolumeParameters::default()).unwrap();
        let mute = device.add_mute_control(MuteParameters::default()).unwrap();

        let address = PropertyAddress::global(selector::OWNED_OBJECTS);
        assert_eq!(
            pin.get_property(&address, None),
            Ok(Value::ObjectList(vec![stream, volume, mute]))
        );
        assert_eq!(
            pin.get_property(&address, Some(&Value::U32List(vec![class::CONTROL]))),
            Ok(Value::ObjectList(vec![volume, mute]))
        );
        assert_eq!(
            pin.get_property(&address, Some(&Value::U32List(vec![class::STREAM]))),
            Ok(Value::ObjectList(vec![stream]))
        );
    }

    #[test]
    fn test_remove_children() {
        let fx = Fixture::new(None);
        let pin = fx.device();
        let device = as_device(&pin);
        let stream = device.add_stream(StreamParameters::default()).unwrap();
        let mute = device.add_mute_control(MuteParameters::default()).unwrap();

        device.remove_stream(stream).unwrap();
        device.remove_control(mute).unwrap();
        assert!(fx.context.registry().lookup(stream).is_none());
        assert!(fx.context.registry().lookup(mute).is_none());
        assert_eq!(
            device.remove_stream(stream),
            Err(Error::NotFound(Missing::Stream(stream)))
        );
    }

    #[test]
    fn test_unregister_retires_children() {
        let fx = Fixture::new(None);
        let stream = {
            let pin = fx.device();
            as_device(&pin).add_stream(StreamParameters::default()).unwrap()
        };
        fx.context.registry().unregister(fx.device).unwrap();
        assert!(fx.context.registry().lookup(stream).is_none());
        assert!(fx.context.registry().is_empty());
    }

    #[test]
    fn test_clients() {
        let fx = Fixture::new(None);
        let pin = fx.device();
        let device = as_device(&pin);
        let client = ClientInfo {
            client_id: 7,
            process_id: 42,
            is_native_endian: true,
            bundle_id: Some("com.example.player".into()),
        };
        device.add_client(client.clone()).unwrap();
        assert_eq!(device.client(7), Some(client.clone()));
        assert_eq!(device.remove_client(7), Ok(client));
        assert_eq!(device.remove_client(7), Err(Error::NotFound(Missing::Client(7))));
    }

    #[test]
    fn test_sample_rate_without_host_applies_immediately() {
        let fx = Fixture::new(None);
        let pin = fx.device();
        let device = as_device(&pin);
        let stream = device.add_stream(StreamParameters::default().with_available_formats(vec![
            crate::value::RangedFormat {
                format: crate::value::StreamFormat::float32(48_000.0, 2),
                rate_range: ValueRange::new(44_100.0, 48_000.0),
            },
        ]))
        .unwrap();

        pin.set_property(&PropertyAddress::global(selector::NOMINAL_SAMPLE_RATE), &Value::F64(44_100.0))
            .unwrap();
        assert_eq!(device.sample_rate(), 44_100.0);

        let stream = fx.context.registry().lookup(stream).unwrap();
        assert_eq!(stream.downcast_ref::<Stream>().unwrap().format().sample_rate, 44_100.0);
    }

    #[test]
    fn test_sample_rate_with_host_is_deferred() {
        let host = Arc::new(RecordingHost::default());
        let fx = Fixture::new(Some(host.clone()));
        let pin = fx.device();
        let device = as_device(&pin);

        device.request_sample_rate(44_100.0).unwrap();
        assert_eq!(device.sample_rate(), 48_000.0);
        let (target, action) = host.last_request().unwrap();
        assert_eq!(target, fx.device);

        device.perform_configuration_change(action).unwrap();
        assert_eq!(device.sample_rate(), 44_100.0);
        assert!(host
            .changed_selectors(fx.device)
            .contains(&selector::NOMINAL_SAMPLE_RATE));
        assert!(device.perform_configuration_change(action).is_err());
    }

    #[test]
    fn test_aborted_change_is_dropped() {
        let host = Arc::new(RecordingHost::default());
        let fx = Fixture::new(Some(host.clone()));
        let pin = fx.device();
        let device = as_device(&pin);

        device.request_sample_rate(44_100.0).unwrap();
        let (_, action) = host.last_request().unwrap();
        device.abort_configuration_change(action).unwrap();
        assert_eq!(device.sample_rate(), 48_000.0);
        assert_eq!(
            device.perform_configuration_change(action),
            Err(Error::NotFound(Missing::ConfigurationChange(action)))
        );
    }

    #[test]
    fn test_unavailable_sample_rate_rejected() {
        let fx = Fixture::new(None);
        let pin = fx.device();
        assert!(matches!(
            as_device(&pin).request_sample_rate(96_000.0),
            Err(Error::InvalidValue(_))
        ));
    }

    #[test]
    fn test_start_stop_io_counts_clients() {
        let fx = Fixture::new(None);
        let pin = fx.device();
        let device = as_device(&pin);

        assert_eq!(device.stop_io(1), Err(Error::NotRunning(fx.device)));
        device.start_io(1).unwrap();
        device.start_io(2).unwrap();
        device.stop_io(1).unwrap();
        assert!(device.is_running());
        device.stop_io(2).unwrap();
        assert!(!device.is_running());
        assert!(device.stop_io(2).is_err());
    }

    #[test]
    fn test_zero_timestamp_advances_by_period() {
        let fx = Fixture::new(None);
        let pin = fx.device();
        let device = as_device(&pin);
        assert_eq!(device.zero_timestamp(), Err(Error::NotRunning(fx.device)));

        device.start_io(1).unwrap();
        let first = device.zero_timestamp().unwrap();
        assert_eq!(first.sample_time, 0.0);
        assert_eq!(first.host_time, 1_000);

        // 480 frames at 48 kHz are 10 ms.
        fx.clock.advance(10_000_000);
        let second = device.zero_timestamp().unwrap();
        assert_eq!(second.sample_time, 480.0);
        assert_eq!(second.host_time, 1_000 + 10_000_000);
        assert_eq!(second.seed, first.seed);

        fx.clock.advance(9_999_999);
        assert_eq!(device.zero_timestamp().unwrap().sample_time, 480.0);
    }

    #[test]
    fn test_will_do_depends_on_streams() {
        let fx = Fixture::new(None);
        let pin = fx.device();
        let device = as_device(&pin);
        assert_eq!(device.will_do_io_operation(IoOperation::ReadInput), Ok((false, true)));
        device.add_stream(StreamParameters::new(Direction::Input)).unwrap();
        assert_eq!(device.will_do_io_operation(IoOperation::ReadInput), Ok((true, true)));
        assert_eq!(device.will_do_io_operation(IoOperation::WriteMix), Ok((false, true)));
        assert_eq!(device.will_do_io_operation(IoOperation::Cycle), Ok((false, true)));
    }

    #[test]
    fn test_read_input_defaults_to_silence() {
        let fx = Fixture::new(None);
        let pin = fx.device();
        let device = as_device(&pin);
        let stream_id = device.add_stream(StreamParameters::new(Direction::Input)).unwrap();
        let stream_pin = fx.context.registry().lookup(stream_id).unwrap();
        let stream = stream_pin.downcast_ref::<Stream>().unwrap();

        let mut buffer = vec![0xFFu8; stream.buffer_len(16)];
        let cycle = IoCycleInfo::default();
        assert_eq!(
            device.do_io_operation(1, stream, IoOperation::ReadInput, 16, &cycle, &mut buffer),
            Err(Error::NotRunning(fx.device))
        );

        device.start_io(1).unwrap();
        device
            .do_io_operation(1, stream, IoOperation::ReadInput, 16, &cycle, &mut buffer)
            .unwrap();
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_preferred_stereo_channels() {
        let fx = Fixture::new(None);
        let pin = fx.device();
        let address = PropertyAddress::global(selector::PREFERRED_CHANNELS_FOR_STEREO);
        pin.set_property(&address, &Value::U32List(vec![3, 4])).unwrap();
        assert_eq!(pin.get_property(&address, None), Ok(Value::U32List(vec![3, 4])));
        assert!(pin.set_property(&address, &Value::U32List(vec![1])).is_err());
        assert!(pin.set_property(&address, &Value::U32List(vec![0, 1])).is_err());
    }

    #[test]
    fn test_preferred_stereo_pair_never_torn() {
        let fx = Fixture::new(None);
        let pin = fx.device();
        let address = PropertyAddress::global(selector::PREFERRED_CHANNELS_FOR_STEREO);
        let stop = Arc::new(AtomicBool::new(false));

        let reader = {
            let pin = pin.clone();
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    let value = pin.get_property(&address, None).unwrap();
                    let pair = value.as_u32_list().unwrap();
                    assert!(pair == [1, 2] || pair == [7, 8], "torn pair {pair:?}");
                }
            })
        };

        for i in 0..2000 {
            let pair = if i % 2 == 0 { vec![7, 8] } else { vec![1, 2] };
            pin.set_property(&address, &Value::U32List(pair)).unwrap();
        }
        stop.store(true, Ordering::Release);
        reader.join().unwrap();
    }
}
