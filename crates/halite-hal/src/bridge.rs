//! `extern "C"` trampolines behind the driver vtable.
//!
//! Each entry point recovers the [`Driver`] from the host's reference,
//! converts the raw arguments and forwards to the [`Dispatcher`]. Null
//! pointers are rejected here, panics never cross the boundary, and every
//! result is turned into a host status by [`Status`].
//!
//! [`Dispatcher`]: halite_core::Dispatcher

use std::ffi::c_void;

use halite_core::{ClientInfo, IoCycleInfo, ObjectId, PropertyAddress, Status};

use crate::driver::Driver;
use crate::sys::{
    self, AudioObjectID, AudioObjectPropertyAddress, Boolean, CFDictionaryRef, CFUUIDBytes, DriverInterface,
    DriverRef, HostRef, OSStatus, Pid, E_NOINTERFACE, HRESULT, S_OK, ULONG,
};

/// The vtable every [`Driver`] points at.
pub static DRIVER_INTERFACE: DriverInterface = DriverInterface {
    _reserved: std::ptr::null_mut(),
    query_interface: Some(query_interface),
    add_ref: Some(add_ref),
    release: Some(release),
    initialize: Some(initialize),
    create_device: Some(create_device),
    destroy_device: Some(destroy_device),
    add_device_client: Some(add_device_client),
    remove_device_client: Some(remove_device_client),
    perform_device_configuration_change: Some(perform_device_configuration_change),
    abort_device_configuration_change: Some(abort_device_configuration_change),
    has_property: Some(has_property),
    is_property_settable: Some(is_property_settable),
    get_property_data_size: Some(get_property_data_size),
    get_property_data: Some(get_property_data),
    set_property_data: Some(set_property_data),
    start_io: Some(start_io),
    stop_io: Some(stop_io),
    get_zero_timestamp: Some(get_zero_timestamp),
    will_do_io_operation: Some(will_do_io_operation),
    begin_io_operation: Some(begin_io_operation),
    do_io_operation: Some(do_io_operation),
    end_io_operation: Some(end_io_operation),
};

// =============================================================================
// Helpers
// =============================================================================

/// Resolve the driver and run `$body` behind `catch_unwind`.
///
/// Unknown references yield `$bad`, panics yield `$panicked`. The default
/// form is for entry points returning `OSStatus`.
macro_rules! with_driver {
    ($driver:expr, $bad:expr, $panicked:expr, |$handle:ident| $body:expr) => {{
        // SAFETY: the host passes back the reference it got from the
        // factory; anything else is rejected by the vtable check.
        let Some($handle) = (unsafe { Driver::from_ref($driver) }) else {
            log::warn!("call on unknown driver reference {:p}", $driver);
            return $bad;
        };
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| $body)) {
            Ok(value) => value,
            Err(_) => {
                log::error!("panic in driver entry point");
                $panicked
            }
        }
    }};
    ($driver:expr, |$handle:ident| $body:expr) => {
        with_driver!(
            $driver,
            Status::BAD_OBJECT.code(),
            Status::UNSPECIFIED.code(),
            |$handle| $body
        )
    };
}

fn status<T>(result: &halite_core::Result<T>) -> OSStatus {
    Status::of(result).code()
}

/// Store `value` through an out pointer, failing on null.
///
/// # Safety
///
/// `out` must be null or valid for writes.
unsafe fn write_out<T>(out: *mut T, value: T) -> OSStatus {
    if out.is_null() {
        log::warn!("null out pointer from host");
        return Status::ILLEGAL_OPERATION.code();
    }
    // SAFETY: non-null and writable per the caller.
    unsafe { out.write(value) };
    S_OK
}

/// # Safety
///
/// `address` must be null or point at a valid address struct.
unsafe fn read_address(address: *const AudioObjectPropertyAddress) -> Option<PropertyAddress> {
    // SAFETY: null or valid per the caller.
    let address = unsafe { address.as_ref() }?;
    Some(PropertyAddress::new(address.selector, address.scope, address.element))
}

/// # Safety
///
/// `data` must be null or valid for `len` bytes.
unsafe fn bytes<'a>(data: *const c_void, len: u32) -> &'a [u8] {
    if data.is_null() || len == 0 {
        &[]
    } else {
        // SAFETY: valid for `len` bytes per the caller.
        unsafe { std::slice::from_raw_parts(data as *const u8, len as usize) }
    }
}

/// # Safety
///
/// `data` must be null or valid for writes of `len` bytes.
unsafe fn bytes_mut<'a>(data: *mut c_void, len: usize) -> &'a mut [u8] {
    if data.is_null() || len == 0 {
        &mut []
    } else {
        // SAFETY: valid for `len` bytes per the caller.
        unsafe { std::slice::from_raw_parts_mut(data as *mut u8, len) }
    }
}

/// # Safety
///
/// `client` must be valid and its bundle id null or a live handle.
unsafe fn client_info(driver: &Driver, client: &sys::ClientInfo) -> ClientInfo {
    let bundle_id = if client.bundle_id.is_null() {
        None
    } else {
        // SAFETY: live handle per the caller.
        unsafe { driver.context().strings().decode(client.bundle_id) }.ok()
    };
    ClientInfo {
        client_id: client.client_id,
        process_id: client.process_id,
        is_native_endian: client.is_native_endian != 0,
        bundle_id,
    }
}

/// # Safety
///
/// `cycle` must be null or point at a valid cycle info.
unsafe fn cycle_info(cycle: *const sys::IoCycleInfo) -> IoCycleInfo {
    // SAFETY: null or valid per the caller.
    let Some(cycle) = (unsafe { cycle.as_ref() }) else {
        return IoCycleInfo::default();
    };
    IoCycleInfo {
        cycle_counter: cycle.cycle_counter,
        nominal_frames: cycle.nominal_io_buffer_frame_size,
        input_sample_time: cycle.input_time.sample_time,
        input_host_time: cycle.input_time.host_time,
        output_sample_time: cycle.output_time.sample_time,
        output_host_time: cycle.output_time.host_time,
    }
}

// =============================================================================
// IUnknown
// =============================================================================

unsafe extern "C" fn query_interface(driver: *mut c_void, uuid: CFUUIDBytes, out: *mut *mut c_void) -> HRESULT {
    let driver_ref = driver as DriverRef;
    with_driver!(driver_ref, E_NOINTERFACE, E_NOINTERFACE, |d| {
        if out.is_null() {
            log::warn!("QueryInterface without an out pointer");
            return E_NOINTERFACE;
        }
        let (result, value) = match d.query_interface(&uuid) {
            Ok(()) => (S_OK, driver),
            Err(_) => (E_NOINTERFACE, std::ptr::null_mut()),
        };
        // SAFETY: checked for null above; the host owns the slot.
        unsafe { out.write(value) };
        result
    })
}

unsafe extern "C" fn add_ref(driver: *mut c_void) -> ULONG {
    with_driver!(driver as DriverRef, 0, 0, |d| d.add_ref())
}

unsafe extern "C" fn release(driver: *mut c_void) -> ULONG {
    with_driver!(driver as DriverRef, 0, 0, |d| d.release())
}

// =============================================================================
// Plugin
// =============================================================================

unsafe extern "C" fn initialize(driver: DriverRef, host: HostRef) -> OSStatus {
    with_driver!(driver, |d| {
        // SAFETY: the host interface outlives the plugin.
        let result = unsafe { d.initialize(host) };
        status(&result)
    })
}

unsafe extern "C" fn create_device(
    driver: DriverRef,
    _description: CFDictionaryRef,
    _client: *const sys::ClientInfo,
    out_device: *mut AudioObjectID,
) -> OSStatus {
    with_driver!(driver, |d| match d.dispatcher().create_device(ObjectId::PLUGIN) {
        // SAFETY: null or writable per the host contract.
        Ok(id) => unsafe { write_out(out_device, id.get()) },
        Err(err) => status::<()>(&Err(err)),
    })
}

unsafe extern "C" fn destroy_device(driver: DriverRef, device: AudioObjectID) -> OSStatus {
    with_driver!(driver, |d| status(
        &d.dispatcher().destroy_device(ObjectId::PLUGIN, ObjectId(device))
    ))
}

// =============================================================================
// Device clients and configuration
// =============================================================================

unsafe extern "C" fn add_device_client(
    driver: DriverRef,
    device: AudioObjectID,
    client: *const sys::ClientInfo,
) -> OSStatus {
    with_driver!(driver, |d| {
        // SAFETY: null or valid per the host contract.
        let Some(client) = (unsafe { client.as_ref() }) else {
            return Status::ILLEGAL_OPERATION.code();
        };
        // SAFETY: the bundle id is a live handle for the duration of the call.
        let client = unsafe { client_info(d, client) };
        status(&d.dispatcher().add_device_client(ObjectId(device), client))
    })
}

unsafe extern "C" fn remove_device_client(
    driver: DriverRef,
    device: AudioObjectID,
    client: *const sys::ClientInfo,
) -> OSStatus {
    with_driver!(driver, |d| {
        // SAFETY: null or valid per the host contract.
        let Some(client) = (unsafe { client.as_ref() }) else {
            return Status::ILLEGAL_OPERATION.code();
        };
        status(
            &d.dispatcher()
                .remove_device_client(ObjectId(device), client.client_id),
        )
    })
}

unsafe extern "C" fn perform_device_configuration_change(
    driver: DriverRef,
    device: AudioObjectID,
    action: u64,
    _info: *mut c_void,
) -> OSStatus {
    with_driver!(driver, |d| status(
        &d.dispatcher()
            .perform_configuration_change(ObjectId(device), action)
    ))
}

unsafe extern "C" fn abort_device_configuration_change(
    driver: DriverRef,
    device: AudioObjectID,
    action: u64,
    _info: *mut c_void,
) -> OSStatus {
    with_driver!(driver, |d| status(
        &d.dispatcher()
            .abort_configuration_change(ObjectId(device), action)
    ))
}

// =============================================================================
// Properties
// =============================================================================

unsafe extern "C" fn has_property(
    driver: DriverRef,
    object: AudioObjectID,
    _client_pid: Pid,
    address: *const AudioObjectPropertyAddress,
) -> Boolean {
    with_driver!(driver, 0, 0, |d| {
        // SAFETY: null or valid per the host contract.
        let Some(address) = (unsafe { read_address(address) }) else {
            return 0;
        };
        Boolean::from(d.dispatcher().has_property(ObjectId(object), &address))
    })
}

unsafe extern "C" fn is_property_settable(
    driver: DriverRef,
    object: AudioObjectID,
    _client_pid: Pid,
    address: *const AudioObjectPropertyAddress,
    out_settable: *mut Boolean,
) -> OSStatus {
    with_driver!(driver, |d| {
        // SAFETY: null or valid per the host contract.
        let Some(address) = (unsafe { read_address(address) }) else {
            return Status::ILLEGAL_OPERATION.code();
        };
        match d.dispatcher().is_property_settable(ObjectId(object), &address) {
            // SAFETY: null or writable per the host contract.
            Ok(settable) => unsafe { write_out(out_settable, Boolean::from(settable)) },
            Err(err) => status::<()>(&Err(err)),
        }
    })
}

unsafe extern "C" fn get_property_data_size(
    driver: DriverRef,
    object: AudioObjectID,
    _client_pid: Pid,
    address: *const AudioObjectPropertyAddress,
    qualifier_size: u32,
    qualifier: *const c_void,
    out_size: *mut u32,
) -> OSStatus {
    with_driver!(driver, |d| {
        // SAFETY: null or valid per the host contract.
        let Some(address) = (unsafe { read_address(address) }) else {
            return Status::ILLEGAL_OPERATION.code();
        };
        // SAFETY: the qualifier is valid for `qualifier_size` bytes and
        // holds live handles.
        let result = unsafe {
            let qualifier = bytes(qualifier, qualifier_size);
            d.dispatcher()
                .get_property_data_size(ObjectId(object), &address, qualifier)
        };
        match result {
            // SAFETY: null or writable per the host contract.
            Ok(size) => unsafe { write_out(out_size, size as u32) },
            Err(err) => status::<()>(&Err(err)),
        }
    })
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn get_property_data(
    driver: DriverRef,
    object: AudioObjectID,
    _client_pid: Pid,
    address: *const AudioObjectPropertyAddress,
    qualifier_size: u32,
    qualifier: *const c_void,
    data_size: u32,
    out_size: *mut u32,
    out_data: *mut c_void,
) -> OSStatus {
    with_driver!(driver, |d| {
        // SAFETY: null or valid per the host contract.
        let Some(address) = (unsafe { read_address(address) }) else {
            return Status::ILLEGAL_OPERATION.code();
        };
        if out_data.is_null() || out_size.is_null() {
            log::warn!("GetPropertyData without output buffers");
            return Status::ILLEGAL_OPERATION.code();
        }
        // SAFETY: the host hands in `data_size` writable bytes and a
        // qualifier valid for `qualifier_size` bytes.
        let result = unsafe {
            let qualifier = bytes(qualifier, qualifier_size);
            let out = bytes_mut(out_data, data_size as usize);
            d.dispatcher()
                .get_property_data(ObjectId(object), &address, qualifier, out)
        };
        match result {
            // SAFETY: checked for null above.
            Ok(written) => unsafe { write_out(out_size, written as u32) },
            Err(err) => status::<()>(&Err(err)),
        }
    })
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn set_property_data(
    driver: DriverRef,
    object: AudioObjectID,
    _client_pid: Pid,
    address: *const AudioObjectPropertyAddress,
    _qualifier_size: u32,
    _qualifier: *const c_void,
    data_size: u32,
    data: *const c_void,
) -> OSStatus {
    with_driver!(driver, |d| {
        // SAFETY: null or valid per the host contract.
        let Some(address) = (unsafe { read_address(address) }) else {
            return Status::ILLEGAL_OPERATION.code();
        };
        // SAFETY: the data is valid for `data_size` bytes and holds live
        // handles.
        let result = unsafe {
            d.dispatcher()
                .set_property_data(ObjectId(object), &address, bytes(data, data_size))
        };
        status(&result)
    })
}

// =============================================================================
// IO
// =============================================================================

unsafe extern "C" fn start_io(driver: DriverRef, device: AudioObjectID, client_id: u32) -> OSStatus {
    with_driver!(driver, |d| status(
        &d.dispatcher().start_io(ObjectId(device), client_id)
    ))
}

unsafe extern "C" fn stop_io(driver: DriverRef, device: AudioObjectID, client_id: u32) -> OSStatus {
    with_driver!(driver, |d| status(
        &d.dispatcher().stop_io(ObjectId(device), client_id)
    ))
}

unsafe extern "C" fn get_zero_timestamp(
    driver: DriverRef,
    device: AudioObjectID,
    _client_id: u32,
    out_sample_time: *mut f64,
    out_host_time: *mut u64,
    out_seed: *mut u64,
) -> OSStatus {
    with_driver!(driver, |d| {
        if out_sample_time.is_null() || out_host_time.is_null() || out_seed.is_null() {
            return Status::ILLEGAL_OPERATION.code();
        }
        match d.dispatcher().get_zero_timestamp(ObjectId(device)) {
            Ok(zero) => {
                // SAFETY: all three checked for null above.
                unsafe {
                    out_sample_time.write(zero.sample_time);
                    out_host_time.write(zero.host_time);
                    out_seed.write(zero.seed);
                }
                S_OK
            }
            Err(err) => status::<()>(&Err(err)),
        }
    })
}

unsafe extern "C" fn will_do_io_operation(
    driver: DriverRef,
    device: AudioObjectID,
    _client_id: u32,
    operation: u32,
    out_will_do: *mut Boolean,
    out_in_place: *mut Boolean,
) -> OSStatus {
    with_driver!(driver, |d| {
        if out_will_do.is_null() || out_in_place.is_null() {
            return Status::ILLEGAL_OPERATION.code();
        }
        match d.dispatcher().will_do_io_operation(ObjectId(device), operation) {
            Ok((will_do, in_place)) => {
                // SAFETY: both checked for null above.
                unsafe {
                    out_will_do.write(Boolean::from(will_do));
                    out_in_place.write(Boolean::from(in_place));
                }
                S_OK
            }
            Err(err) => status::<()>(&Err(err)),
        }
    })
}

unsafe extern "C" fn begin_io_operation(
    driver: DriverRef,
    device: AudioObjectID,
    _client_id: u32,
    operation: u32,
    frames: u32,
    cycle: *const sys::IoCycleInfo,
) -> OSStatus {
    with_driver!(driver, |d| {
        // SAFETY: null or valid per the host contract.
        let cycle = unsafe { cycle_info(cycle) };
        status(
            &d.dispatcher()
                .begin_io_operation(ObjectId(device), operation, frames, &cycle),
        )
    })
}

#[allow(clippy::too_many_arguments)]
unsafe extern "C" fn do_io_operation(
    driver: DriverRef,
    device: AudioObjectID,
    stream: AudioObjectID,
    client_id: u32,
    operation: u32,
    frames: u32,
    cycle: *const sys::IoCycleInfo,
    main_buffer: *mut c_void,
    _secondary_buffer: *mut c_void,
) -> OSStatus {
    with_driver!(driver, |d| {
        // SAFETY: null or valid per the host contract.
        let cycle = unsafe { cycle_info(cycle) };
        // Unknown streams get an empty buffer; the dispatcher reports them.
        let len = d
            .dispatcher()
            .io_buffer_len(ObjectId(stream), frames)
            .unwrap_or(0);
        // SAFETY: the host's main buffer holds `frames` frames in the
        // stream's virtual format.
        let buffer = unsafe { bytes_mut(main_buffer, len) };
        status(&d.dispatcher().do_io_operation(
            ObjectId(device),
            ObjectId(stream),
            client_id,
            operation,
            frames,
            &cycle,
            buffer,
        ))
    })
}

unsafe extern "C" fn end_io_operation(
    driver: DriverRef,
    device: AudioObjectID,
    _client_id: u32,
    operation: u32,
    frames: u32,
    cycle: *const sys::IoCycleInfo,
) -> OSStatus {
    with_driver!(driver, |d| {
        // SAFETY: null or valid per the host contract.
        let cycle = unsafe { cycle_info(cycle) };
        status(
            &d.dispatcher()
                .end_io_operation(ObjectId(device), operation, frames, &cycle),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::test_support::{last_request, CHANGES, HOST};
    use crate::sys::{DRIVER_INTERFACE_UUID, IUNKNOWN_UUID};
    use halite_core::types::{operation, selector};
    use halite_core::{
        Context, Device, DeviceParameters, Plugin, PluginParameters, StreamParameters, VolumeParameters,
    };
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    const DEVICE: ObjectId = ObjectId(2);
    const STREAM: ObjectId = ObjectId(3);

    fn driver() -> Driver {
        Driver::with_context(PluginParameters::new("Halite"), Arc::new(Context::new())).with_setup(|plugin| {
            let id = plugin.add_device(
                DeviceParameters::new("Bridge")
                    .with_uid("bridge-device")
                    .with_available_sample_rates(vec![44_100.0, 48_000.0]),
            )?;
            let pin = plugin.device(id)?;
            if let Some(device) = pin.downcast_ref::<Device>() {
                device.add_stream(StreamParameters::default())?;
                device.add_volume_control(VolumeParameters::default())?;
            }
            Ok(())
        })
    }

    fn vtable() -> &'static DriverInterface {
        &DRIVER_INTERFACE
    }

    fn address(selector: u32) -> AudioObjectPropertyAddress {
        let global = PropertyAddress::global(selector);
        AudioObjectPropertyAddress {
            selector: global.selector,
            scope: global.scope,
            element: global.element,
        }
    }

    /// Query the driver interface the way the host does.
    fn connect(driver: &Driver) -> DriverRef {
        let mut out = std::ptr::null_mut();
        // SAFETY: valid driver and out pointer.
        let hr = unsafe {
            (vtable().query_interface.unwrap())(driver.as_driver_ref() as *mut c_void, DRIVER_INTERFACE_UUID, &mut out)
        };
        assert_eq!(hr, S_OK);
        out as DriverRef
    }

    #[test]
    fn test_query_interface_returns_driver() {
        let driver = driver();
        let first = connect(&driver);
        assert_eq!(first, driver.as_driver_ref());

        let mut out = std::ptr::null_mut();
        // SAFETY: valid driver and out pointer.
        let hr = unsafe { (vtable().query_interface.unwrap())(first as *mut c_void, IUNKNOWN_UUID, &mut out) };
        assert_eq!(hr, S_OK);
        assert_eq!(out as DriverRef, first);
    }

    #[test]
    fn test_unknown_interface() {
        let driver = driver();
        let mut out = 1usize as *mut c_void;
        // SAFETY: valid driver and out pointer.
        let hr = unsafe {
            (vtable().query_interface.unwrap())(
                driver.as_driver_ref() as *mut c_void,
                CFUUIDBytes::new([0xAB; 16]),
                &mut out,
            )
        };
        assert_eq!(hr, E_NOINTERFACE);
        assert!(out.is_null());
    }

    #[test]
    fn test_foreign_driver_rejected() {
        static OTHER: DriverInterface = DriverInterface {
            _reserved: std::ptr::null_mut(),
            query_interface: None,
            add_ref: None,
            release: None,
            initialize: None,
            create_device: None,
            destroy_device: None,
            add_device_client: None,
            remove_device_client: None,
            perform_device_configuration_change: None,
            abort_device_configuration_change: None,
            has_property: None,
            is_property_settable: None,
            get_property_data_size: None,
            get_property_data: None,
            set_property_data: None,
            start_io: None,
            stop_io: None,
            get_zero_timestamp: None,
            will_do_io_operation: None,
            begin_io_operation: None,
            do_io_operation: None,
            end_io_operation: None,
        };
        let mut fake: *const DriverInterface = &OTHER;
        let mut settable = 0;
        let addr = address(selector::NAME);
        // SAFETY: the trampolines only read the vtable pointer before
        // rejecting the reference.
        unsafe {
            assert_eq!(
                (vtable().start_io.unwrap())(&mut fake, 2, 1),
                Status::BAD_OBJECT.code()
            );
            assert_eq!(
                (vtable().is_property_settable.unwrap())(std::ptr::null_mut(), 1, 0, &addr, &mut settable),
                Status::BAD_OBJECT.code()
            );
            assert_eq!((vtable().has_property.unwrap())(&mut fake, 1, 0, &addr), 0);
        }
    }

    #[test]
    fn test_property_calls() {
        let driver = driver();
        let driver_ref = connect(&driver);
        let name = address(selector::NAME);

        // SAFETY: every pointer below is valid for the call.
        unsafe {
            assert_eq!((vtable().has_property.unwrap())(driver_ref, 1, 0, &name), 1);

            let mut size = 0u32;
            let status = (vtable().get_property_data_size.unwrap())(
                driver_ref,
                1,
                0,
                &name,
                0,
                std::ptr::null(),
                &mut size,
            );
            assert_eq!(status, S_OK);
            assert_eq!(size as usize, std::mem::size_of::<*const c_void>());

            let mut handle: *const c_void = std::ptr::null();
            let mut written = 0u32;
            let status = (vtable().get_property_data.unwrap())(
                driver_ref,
                1,
                0,
                &name,
                0,
                std::ptr::null(),
                size,
                &mut written,
                &mut handle as *mut *const c_void as *mut c_void,
            );
            assert_eq!(status, S_OK);
            assert_eq!(written, size);
            let strings = driver.context().strings();
            assert_eq!(strings.decode(handle).unwrap(), "Halite");
            strings.release(handle);

            let status = (vtable().get_property_data.unwrap())(
                driver_ref,
                1,
                0,
                &name,
                0,
                std::ptr::null(),
                size,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            );
            assert_eq!(status, Status::ILLEGAL_OPERATION.code());

            let unknown = address(u32::from_be_bytes(*b"zzzz"));
            let status = (vtable().get_property_data_size.unwrap())(
                driver_ref,
                1,
                0,
                &unknown,
                0,
                std::ptr::null(),
                &mut size,
            );
            assert_eq!(status, Status::UNKNOWN_PROPERTY.code());
        }
    }

    #[test]
    fn test_sample_rate_change_through_host() {
        let driver = driver();
        let driver_ref = connect(&driver);
        let rate = address(selector::NOMINAL_SAMPLE_RATE);

        // SAFETY: every pointer below is valid for the call; HOST is static.
        unsafe {
            assert_eq!((vtable().initialize.unwrap())(driver_ref, &HOST), S_OK);

            let mut settable = 0;
            let status =
                (vtable().is_property_settable.unwrap())(driver_ref, DEVICE.get(), 0, &rate, &mut settable);
            assert_eq!(status, S_OK);
            assert_eq!(settable, 1);

            let value = 44_100.0f64;
            let status = (vtable().set_property_data.unwrap())(
                driver_ref,
                DEVICE.get(),
                0,
                &rate,
                0,
                std::ptr::null(),
                8,
                &value as *const f64 as *const c_void,
            );
            assert_eq!(status, S_OK);
        }

        let action = last_request(DEVICE.get()).unwrap();
        let before = CHANGES.load(Ordering::SeqCst);
        // SAFETY: valid driver reference.
        let status = unsafe {
            (vtable().perform_device_configuration_change.unwrap())(driver_ref, DEVICE.get(), action, std::ptr::null_mut())
        };
        assert_eq!(status, S_OK);
        assert!(CHANGES.load(Ordering::SeqCst) > before);

        let pin = driver.context().registry().get(DEVICE).unwrap();
        assert_eq!(pin.downcast_ref::<Device>().unwrap().sample_rate(), 44_100.0);

        // SAFETY: valid driver reference.
        let status = unsafe {
            (vtable().abort_device_configuration_change.unwrap())(driver_ref, DEVICE.get(), action, std::ptr::null_mut())
        };
        assert_eq!(status, Status::ILLEGAL_OPERATION.code());
    }

    #[test]
    fn test_clients() {
        let driver = driver();
        let driver_ref = connect(&driver);
        let client = sys::ClientInfo {
            client_id: 7,
            process_id: 1234,
            is_native_endian: 1,
            bundle_id: std::ptr::null(),
        };
        // SAFETY: valid driver and client pointers.
        unsafe {
            assert_eq!((vtable().add_device_client.unwrap())(driver_ref, DEVICE.get(), &client), S_OK);
            assert_eq!((vtable().remove_device_client.unwrap())(driver_ref, DEVICE.get(), &client), S_OK);
            assert_eq!(
                (vtable().remove_device_client.unwrap())(driver_ref, DEVICE.get(), &client),
                Status::ILLEGAL_OPERATION.code()
            );
            assert_eq!(
                (vtable().add_device_client.unwrap())(driver_ref, DEVICE.get(), std::ptr::null()),
                Status::ILLEGAL_OPERATION.code()
            );
        }
    }

    #[test]
    fn test_create_and_destroy_device() {
        let driver = driver();
        let driver_ref = connect(&driver);
        let mut id = 0;
        // SAFETY: valid driver and out pointer.
        unsafe {
            assert_eq!(
                (vtable().create_device.unwrap())(driver_ref, std::ptr::null(), std::ptr::null(), &mut id),
                Status::UNSUPPORTED_OPERATION.code()
            );
            assert_eq!((vtable().destroy_device.unwrap())(driver_ref, DEVICE.get()), S_OK);
            assert_eq!(
                (vtable().destroy_device.unwrap())(driver_ref, DEVICE.get()),
                Status::BAD_DEVICE.code()
            );
        }
        let plugin = driver.context().registry().get(ObjectId::PLUGIN).unwrap();
        assert!(plugin.downcast_ref::<Plugin>().unwrap().devices().is_empty());
    }

    #[test]
    fn test_io_cycle() {
        let driver = driver();
        let driver_ref = connect(&driver);
        let frames = 512;
        let len = driver.dispatcher().io_buffer_len(STREAM, frames).unwrap();
        let mut buffer = vec![0u8; len];
        let cycle = sys::IoCycleInfo {
            cycle_counter: 1,
            nominal_io_buffer_frame_size: frames,
            ..Default::default()
        };

        // SAFETY: every pointer below is valid for the call.
        unsafe {
            assert_eq!(
                (vtable().begin_io_operation.unwrap())(driver_ref, DEVICE.get(), 1, operation::WRITE_MIX, frames, &cycle),
                Status::NOT_RUNNING.code()
            );
            assert_eq!((vtable().start_io.unwrap())(driver_ref, DEVICE.get(), 1), S_OK);

            let (mut sample_time, mut host_time, mut seed) = (0.0, 0, 0);
            assert_eq!(
                (vtable().get_zero_timestamp.unwrap())(
                    driver_ref,
                    DEVICE.get(),
                    1,
                    &mut sample_time,
                    &mut host_time,
                    &mut seed
                ),
                S_OK
            );
            assert!(host_time > 0);

            let (mut will_do, mut in_place) = (0, 0);
            assert_eq!(
                (vtable().will_do_io_operation.unwrap())(
                    driver_ref,
                    DEVICE.get(),
                    1,
                    operation::WRITE_MIX,
                    &mut will_do,
                    &mut in_place
                ),
                S_OK
            );
            assert_eq!((will_do, in_place), (1, 1));

            assert_eq!(
                (vtable().begin_io_operation.unwrap())(driver_ref, DEVICE.get(), 1, operation::WRITE_MIX, frames, &cycle),
                S_OK
            );
            assert_eq!(
                (vtable().do_io_operation.unwrap())(
                    driver_ref,
                    DEVICE.get(),
                    STREAM.get(),
                    1,
                    operation::WRITE_MIX,
                    frames,
                    &cycle,
                    buffer.as_mut_ptr() as *mut c_void,
                    std::ptr::null_mut()
                ),
                S_OK
            );
            assert_eq!(
                (vtable().do_io_operation.unwrap())(
                    driver_ref,
                    DEVICE.get(),
                    99,
                    1,
                    operation::WRITE_MIX,
                    frames,
                    &cycle,
                    buffer.as_mut_ptr() as *mut c_void,
                    std::ptr::null_mut()
                ),
                Status::BAD_STREAM.code()
            );
            assert_eq!(
                (vtable().end_io_operation.unwrap())(driver_ref, DEVICE.get(), 1, operation::WRITE_MIX, frames, &cycle),
                S_OK
            );
            assert_eq!((vtable().stop_io.unwrap())(driver_ref, DEVICE.get(), 1), S_OK);
            assert_eq!(
                (vtable().stop_io.unwrap())(driver_ref, DEVICE.get(), 1),
                Status::NOT_RUNNING.code()
            );
        }
    }
}
