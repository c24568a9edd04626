//! CFPlugIn factory entry point.

use std::ffi::c_void;
use std::sync::OnceLock;

use crate::driver::Driver;
use crate::sys::{CFUUIDBytes, PLUGIN_TYPE_UUID};

#[cfg(target_os = "macos")]
#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFUUIDGetUUIDBytes(uuid: *const c_void) -> CFUUIDBytes;
}

/// Bytes of a `CFUUIDRef`.
///
/// # Safety
///
/// `uuid` must be a live `CFUUIDRef`. Off macOS it must point at a
/// [`CFUUIDBytes`].
unsafe fn uuid_bytes(uuid: *const c_void) -> CFUUIDBytes {
    #[cfg(target_os = "macos")]
    {
        // SAFETY: live CFUUIDRef per the caller.
        unsafe { CFUUIDGetUUIDBytes(uuid) }
    }
    #[cfg(not(target_os = "macos"))]
    {
        // SAFETY: points at CFUUIDBytes per the caller.
        unsafe { *(uuid as *const CFUUIDBytes) }
    }
}

/// Body of the factory function generated by [`export_driver!`].
///
/// Builds the driver in `slot` on first use and returns its reference when
/// the host asks for the AudioServerPlugIn type. Any other type yields null.
///
/// # Safety
///
/// `requested_type` must be null or a live `CFUUIDRef`.
///
/// [`export_driver!`]: crate::export_driver
pub unsafe fn create_driver(
    slot: &'static OnceLock<Driver>,
    requested_type: *const c_void,
    build: impl FnOnce() -> Driver,
) -> *mut c_void {
    if requested_type.is_null() {
        return std::ptr::null_mut();
    }
    // SAFETY: live CFUUIDRef per the caller.
    let requested = unsafe { uuid_bytes(requested_type) };
    if requested != PLUGIN_TYPE_UUID {
        log::debug!("factory asked for unsupported type {:02x?}", requested.bytes);
        return std::ptr::null_mut();
    }
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| slot.get_or_init(build))) {
        Ok(driver) => driver.as_driver_ref() as *mut c_void,
        Err(_) => {
            log::error!("panic while building the driver");
            std::ptr::null_mut()
        }
    }
}

/// Export the CFPlugIn factory function for a driver.
///
/// `$factory` must match the `CFPlugInFactories` entry of the bundle's
/// `Info.plist`. `$build` is called once, on the first factory call, and
/// returns the [`Driver`](crate::Driver).
///
/// # Example
///
/// ```rust,ignore
/// use halite_hal::{export_driver, Driver};
/// use halite_core::PluginParameters;
///
/// export_driver!(HaliteDriverFactory, || Driver::new(PluginParameters::new("Acme")));
/// ```
#[macro_export]
macro_rules! export_driver {
    ($factory:ident, $build:expr) => {
        #[no_mangle]
        pub unsafe extern "C" fn $factory(
            _allocator: *const ::std::ffi::c_void,
            requested_type: *const ::std::ffi::c_void,
        ) -> *mut ::std::ffi::c_void {
            static DRIVER: ::std::sync::OnceLock<$crate::Driver> = ::std::sync::OnceLock::new();
            // SAFETY: the CFPlugIn loader passes a live CFUUIDRef.
            unsafe { $crate::entry::create_driver(&DRIVER, requested_type, $build) }
        }
    };
}

#[cfg(all(test, not(target_os = "macos")))]
mod tests {
    use super::*;
    use crate::sys::IUNKNOWN_UUID;
    use halite_core::{ObjectId, PluginParameters};

    crate::export_driver!(HaliteTestFactory, || Driver::new(PluginParameters::new("Test")));

    fn uuid_ptr(uuid: &CFUUIDBytes) -> *const c_void {
        uuid as *const CFUUIDBytes as *const c_void
    }

    #[test]
    fn test_factory_returns_one_driver() {
        // SAFETY: pointers to CFUUIDBytes stand in for CFUUIDRef off macOS.
        unsafe {
            let first = HaliteTestFactory(std::ptr::null(), uuid_ptr(&PLUGIN_TYPE_UUID));
            let second = HaliteTestFactory(std::ptr::null(), uuid_ptr(&PLUGIN_TYPE_UUID));
            assert!(!first.is_null());
            assert_eq!(first, second);

            let driver = Driver::from_ref(first as crate::sys::DriverRef).unwrap();
            driver.query_interface(&IUNKNOWN_UUID).unwrap();
            assert!(driver.context().registry().lookup(ObjectId::PLUGIN).is_some());
        }
    }

    #[test]
    fn test_factory_rejects_other_types() {
        static SLOT: OnceLock<Driver> = OnceLock::new();
        // SAFETY: pointers to CFUUIDBytes stand in for CFUUIDRef off macOS.
        unsafe {
            assert!(create_driver(&SLOT, uuid_ptr(&IUNKNOWN_UUID), || Driver::new(PluginParameters::default())).is_null());
            assert!(create_driver(&SLOT, std::ptr::null(), || Driver::new(PluginParameters::default())).is_null());
        }
        assert!(SLOT.get().is_none());
    }
}
