//! The call funnel between the host ABI and the object model.
//!
//! Every host call goes through a [`Dispatcher`] method. Each method opens
//! a [`CallContext`], pins the target object, decodes raw arguments,
//! invokes the object and encodes the result. The context closes the
//! tracer span and releases the pin on every exit path, panics included.
//!
//! Raw property data is plain bytes in the host's layout; see
//! [`convert`](crate::convert).

use std::sync::Arc;

use crate::context::Context;
use crate::convert::{self, ConversionError};
use crate::device::Device;
use crate::error::{Error, Missing, Result};
use crate::io::{ClientInfo, IoCycleInfo, IoOperation, ZeroTimestamp};
use crate::object::{Interface, Object, PropertySpec, Qualifier};
use crate::plugin::Plugin;
use crate::registry::ObjectRef;
use crate::status::Status;
use crate::stream::Stream;
use crate::tracer::{CallInfo, Operation};
use crate::types::{ObjectId, PropertyAddress};
use crate::value::Value;

// =============================================================================
// CallContext
// =============================================================================

/// Scope of one host call.
///
/// Opening it begins the tracer span. Dropping it ends the span with the
/// status recorded by [`CallContext::finish`] (unspecified if the call
/// never finished) and then releases the pinned object.
pub struct CallContext<'a> {
    context: &'a Context,
    info: CallInfo,
    status: Status,
    object: Option<ObjectRef>,
}

impl<'a> CallContext<'a> {
    pub fn open(context: &'a Context, info: CallInfo) -> Self {
        context.tracer().begin_span(&info);
        Self {
            context,
            info,
            status: Status::UNSPECIFIED,
            object: None,
        }
    }

    pub fn info(&self) -> &CallInfo {
        &self.info
    }

    /// Pin the call's target object for the rest of the call.
    pub fn pin(&mut self) -> Result<&ObjectRef> {
        let object = self.context.registry().get(self.info.object)?;
        Ok(self.object.insert(object))
    }

    /// Record the outcome of the call.
    pub fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        self.status = Status::of(&result);
        result
    }
}

impl Drop for CallContext<'_> {
    fn drop(&mut self) {
        self.context.tracer().end_span(&self.info, self.status);
        // The pin is released after the span closes.
        self.object.take();
    }
}

fn as_device(object: &ObjectRef) -> Result<&Device> {
    object
        .downcast_ref::<Device>()
        .ok_or(Error::NotFound(Missing::Device(object.id())))
}

/// The device behind an IO call. The target must answer the IO interface.
fn io_device(object: &ObjectRef) -> Result<&Device> {
    object
        .query_interface(Interface::Io)
        .map_err(|_| Error::NotFound(Missing::Device(object.id())))?;
    as_device(object)
}

fn as_plugin(object: &ObjectRef) -> Result<&Plugin> {
    object
        .downcast_ref::<Plugin>()
        .ok_or(Error::NotFound(Missing::Object(object.id())))
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Routes host calls to objects.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    context: Arc<Context>,
}

impl Dispatcher {
    pub fn new(context: Arc<Context>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    fn call(&self, operation: Operation, object: ObjectId) -> CallInfo {
        CallInfo::new(self.context.next_call_id(), operation, object)
    }

    /// Run `f` on the pinned target of `info` inside a call context.
    fn run<T>(&self, info: CallInfo, f: impl FnOnce(&ObjectRef) -> Result<T>) -> Result<T> {
        let mut call = CallContext::open(&self.context, info);
        let result = call.pin().and_then(f);
        call.finish(result)
    }

    /// Trace a call that has no target object to pin.
    pub fn trace<T>(&self, operation: Operation, object: ObjectId, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let call = CallContext::open(&self.context, self.call(operation, object));
        let result = f();
        call.finish(result)
    }

    fn property(object: &ObjectRef, address: &PropertyAddress) -> Result<PropertySpec> {
        object
            .find_property(address)
            .ok_or(Error::NotFound(Missing::Property(address.selector)))
    }

    /// Decode the qualifier a property expects.
    ///
    /// # Safety
    ///
    /// String-typed bytes must hold valid handles for the context's codec.
    unsafe fn qualifier(&self, spec: &PropertySpec, qualifier: &[u8], data: &[u8]) -> Result<Option<Value>> {
        let strings = self.context.strings();
        let value = match spec.qualifier {
            Qualifier::None => None,
            Qualifier::Optional(_) if qualifier.is_empty() => None,
            Qualifier::Optional(kind) | Qualifier::Required(kind) => {
                // SAFETY: forwarded from the caller.
                Some(unsafe { convert::decode(kind, qualifier, strings) }?)
            }
            Qualifier::InPlace => {
                let size = convert::element_size(spec.kind).unwrap_or(0);
                let input = data.get(..size).ok_or(ConversionError::BufferTooSmall {
                    needed: size,
                    available: data.len(),
                })?;
                // SAFETY: forwarded from the caller.
                Some(unsafe { convert::decode(spec.kind, input, strings) }?)
            }
        };
        Ok(value)
    }

    // -------------------------------------------------------------------------
    // Properties
    // -------------------------------------------------------------------------

    /// Whether `object` has the property. Unknown objects have none.
    pub fn has_property(&self, object: ObjectId, address: &PropertyAddress) -> bool {
        let info = self.call(Operation::HasProperty, object).with_address(*address);
        self.run(info, |obj| Ok(obj.has_property(address)))
            .unwrap_or(false)
    }

    pub fn is_property_settable(&self, object: ObjectId, address: &PropertyAddress) -> Result<bool> {
        let info = self
            .call(Operation::IsPropertySettable, object)
            .with_address(*address);
        self.run(info, |obj| {
            Ok(Self::property(obj, address)?.access.is_writable())
        })
    }

    /// Number of bytes the property currently occupies.
    ///
    /// # Safety
    ///
    /// String-typed qualifier bytes must hold valid handles for the
    /// context's string codec.
    pub unsafe fn get_property_data_size(
        &self,
        object: ObjectId,
        address: &PropertyAddress,
        qualifier: &[u8],
    ) -> Result<usize> {
        let info = self
            .call(Operation::GetPropertyDataSize, object)
            .with_address(*address);
        self.run(info, |obj| {
            let spec = Self::property(obj, address)?;
            if spec.qualifier == Qualifier::InPlace {
                return Ok(convert::element_size(spec.kind).unwrap_or(0));
            }
            // SAFETY: forwarded from the caller.
            let qualifier = unsafe { self.qualifier(&spec, qualifier, &[]) }?;
            let value = obj.get_property(address, qualifier.as_ref())?;
            Ok(convert::encoded_size(&value))
        })
    }

    /// Read a property into `out`, returning the number of bytes written.
    ///
    /// Lists are truncated to the elements that fit. String handles written
    /// to `out` belong to the caller.
    ///
    /// # Safety
    ///
    /// String-typed qualifier bytes, and for in-place properties the
    /// initial contents of `out`, must hold valid handles for the
    /// context's string codec.
    pub unsafe fn get_property_data(
        &self,
        object: ObjectId,
        address: &PropertyAddress,
        qualifier: &[u8],
        out: &mut [u8],
    ) -> Result<usize> {
        let info = self
            .call(Operation::GetPropertyData, object)
            .with_address(*address);
        self.run(info, |obj| {
            let spec = Self::property(obj, address)?;
            // SAFETY: forwarded from the caller.
            let qualifier = unsafe { self.qualifier(&spec, qualifier, out) }?;
            let value = obj.get_property(address, qualifier.as_ref())?;
            if value.kind() != spec.kind {
                log::error!(
                    "object {object} returned {} for a {} property",
                    value.kind().name(),
                    spec.kind.name()
                );
                return Err(Error::WrongType(ConversionError::KindMismatch {
                    expected: spec.kind,
                    actual: value.kind(),
                }));
            }
            Ok(convert::encode(&value, out, self.context.strings())?)
        })
    }

    /// Write a property from raw bytes.
    ///
    /// Access and the value's encoding are checked before the object sees
    /// the value. String handles in `data` stay owned by the caller.
    ///
    /// # Safety
    ///
    /// String-typed data must hold valid handles for the context's string
    /// codec.
    pub unsafe fn set_property_data(&self, object: ObjectId, address: &PropertyAddress, data: &[u8]) -> Result<()> {
        let info = self
            .call(Operation::SetPropertyData, object)
            .with_address(*address);
        self.run(info, |obj| {
            let spec = Self::property(obj, address)?;
            if !spec.access.is_writable() {
                return Err(Error::NotWritable(address.selector));
            }
            // SAFETY: forwarded from the caller.
            let value = unsafe { convert::decode(spec.kind, data, self.context.strings()) }?;
            obj.set_property(address, &value)
        })
    }

    // -------------------------------------------------------------------------
    // Plugin operations
    // -------------------------------------------------------------------------

    /// Devices are created by the driver, never by the host.
    pub fn create_device(&self, plugin: ObjectId) -> Result<ObjectId> {
        self.trace(Operation::CreateDevice, plugin, || {
            Err(Error::NotSupported("creating devices on request"))
        })
    }

    pub fn destroy_device(&self, plugin: ObjectId, device: ObjectId) -> Result<()> {
        let info = self.call(Operation::DestroyDevice, plugin);
        self.run(info, |obj| as_plugin(obj)?.remove_device(device))
    }

    // -------------------------------------------------------------------------
    // Device operations
    // -------------------------------------------------------------------------

    pub fn add_device_client(&self, device: ObjectId, client: ClientInfo) -> Result<()> {
        let info = self.call(Operation::AddDeviceClient, device);
        self.run(info, |obj| as_device(obj)?.add_client(client))
    }

    pub fn remove_device_client(&self, device: ObjectId, client_id: u32) -> Result<()> {
        let info = self.call(Operation::RemoveDeviceClient, device);
        self.run(info, |obj| as_device(obj)?.remove_client(client_id).map(drop))
    }

    pub fn perform_configuration_change(&self, device: ObjectId, action: u64) -> Result<()> {
        let info = self.call(Operation::PerformConfigurationChange, device);
        self.run(info, |obj| as_device(obj)?.perform_configuration_change(action))
    }

    pub fn abort_configuration_change(&self, device: ObjectId, action: u64) -> Result<()> {
        let info = self.call(Operation::AbortConfigurationChange, device);
        self.run(info, |obj| as_device(obj)?.abort_configuration_change(action))
    }

    pub fn start_io(&self, device: ObjectId, client_id: u32) -> Result<()> {
        let info = self.call(Operation::StartIo, device);
        self.run(info, |obj| io_device(obj)?.start_io(client_id))
    }

    pub fn stop_io(&self, device: ObjectId, client_id: u32) -> Result<()> {
        let info = self.call(Operation::StopIo, device);
        self.run(info, |obj| io_device(obj)?.stop_io(client_id))
    }

    pub fn get_zero_timestamp(&self, device: ObjectId) -> Result<ZeroTimestamp> {
        let info = self.call(Operation::GetZeroTimestamp, device);
        self.run(info, |obj| io_device(obj)?.zero_timestamp())
    }

    /// Returns (will do, in place).
    pub fn will_do_io_operation(&self, device: ObjectId, operation: u32) -> Result<(bool, bool)> {
        let info = self
            .call(Operation::WillDoIoOperation, device)
            .with_io_operation(operation);
        self.run(info, |obj| {
            let operation = IoOperation::from_code(operation)?;
            io_device(obj)?.will_do_io_operation(operation)
        })
    }

    pub fn begin_io_operation(
        &self,
        device: ObjectId,
        operation: u32,
        frames: u32,
        cycle: &IoCycleInfo,
    ) -> Result<()> {
        let info = self
            .call(Operation::BeginIoOperation, device)
            .with_io_operation(operation);
        self.run(info, |obj| {
            let operation = IoOperation::from_code(operation)?;
            io_device(obj)?.begin_io_operation(operation, frames, cycle)
        })
    }

    /// Run one IO operation on a stream of `device`.
    ///
    /// The stream must belong to the device and be active.
    #[allow(clippy::too_many_arguments)]
    pub fn do_io_operation(
        &self,
        device: ObjectId,
        stream: ObjectId,
        client_id: u32,
        operation: u32,
        frames: u32,
        cycle: &IoCycleInfo,
        buffer: &mut [u8],
    ) -> Result<()> {
        let info = self
            .call(Operation::DoIoOperation, device)
            .with_io_operation(operation);
        self.run(info, |obj| {
            let operation = IoOperation::from_code(operation)?;
            let device = io_device(obj)?;
            let pinned = self.stream_of(device, stream)?;
            let stream = pinned
                .downcast_ref::<Stream>()
                .ok_or(Error::NotFound(Missing::Stream(stream)))?;
            device.do_io_operation(client_id, stream, operation, frames, cycle, buffer)
        })
    }

    pub fn end_io_operation(
        &self,
        device: ObjectId,
        operation: u32,
        frames: u32,
        cycle: &IoCycleInfo,
    ) -> Result<()> {
        let info = self
            .call(Operation::EndIoOperation, device)
            .with_io_operation(operation);
        self.run(info, |obj| {
            let operation = IoOperation::from_code(operation)?;
            io_device(obj)?.end_io_operation(operation, frames, cycle)
        })
    }

    /// Pin an active stream owned by `device`.
    fn stream_of(&self, device: &Device, stream: ObjectId) -> Result<ObjectRef> {
        let pinned = self
            .context
            .registry()
            .get(stream)
            .map_err(|_| Error::NotFound(Missing::Stream(stream)))?;
        if pinned.owner() != device.id()
            || pinned.query_interface(Interface::Io).is_err()
            || pinned.downcast_ref::<Stream>().is_none()
        {
            return Err(Error::NotFound(Missing::Stream(stream)));
        }
        if !pinned.is_active() {
            return Err(Error::NotReady(stream));
        }
        Ok(pinned)
    }

    /// Size of the buffer the host passes for `frames` frames of `stream`.
    pub fn io_buffer_len(&self, stream: ObjectId, frames: u32) -> Result<usize> {
        let pinned = self
            .context
            .registry()
            .get(stream)
            .map_err(|_| Error::NotFound(Missing::Stream(stream)))?;
        let stream = pinned
            .downcast_ref::<Stream>()
            .ok_or(Error::NotFound(Missing::Stream(stream)))?;
        Ok(stream.buffer_len(frames))
    }
}
