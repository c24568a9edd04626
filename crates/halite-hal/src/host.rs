//! Adapter from the host's C callback table to [`Host`].

use halite_core::{Error, Host, ObjectId, PropertyAddress, Result};

use crate::sys::{self, AudioObjectPropertyAddress, HostRef};

/// The host interface handed to `Initialize`.
///
/// The pointer itself must be kept: the host checks that callbacks receive
/// the same reference it passed in.
pub struct FfiHost {
    host: HostRef,
}

// SAFETY: the host interface is a static table owned by the audio server,
// valid for the lifetime of the plugin and callable from any thread.
unsafe impl Send for FfiHost {}
// SAFETY: see above; the table is never mutated.
unsafe impl Sync for FfiHost {}

impl FfiHost {
    /// Wrap a host reference. Returns `None` for null.
    ///
    /// # Safety
    ///
    /// `host` must stay valid for as long as the returned value is used.
    pub unsafe fn new(host: HostRef) -> Option<Self> {
        if host.is_null() {
            None
        } else {
            Some(Self { host })
        }
    }

    fn interface(&self) -> &sys::HostInterface {
        // SAFETY: non-null and valid per `new`'s contract.
        unsafe { &*self.host }
    }
}

impl Host for FfiHost {
    fn properties_changed(&self, object: ObjectId, addresses: &[PropertyAddress]) {
        let Some(callback) = self.interface().properties_changed else {
            return;
        };
        let addresses: Vec<AudioObjectPropertyAddress> = addresses
            .iter()
            .map(|a| AudioObjectPropertyAddress {
                selector: a.selector,
                scope: a.scope,
                element: a.element,
            })
            .collect();
        // SAFETY: the callback comes from the host's table and the slice
        // outlives the call.
        let status = unsafe {
            callback(
                self.host,
                object.get(),
                addresses.len() as u32,
                addresses.as_ptr(),
            )
        };
        if status != 0 {
            log::warn!("host rejected property change notification for object {object}: {status}");
        }
    }

    fn request_configuration_change(&self, device: ObjectId, action: u64) -> Result<()> {
        let callback = self
            .interface()
            .request_device_configuration_change
            .ok_or(Error::NotSupported("configuration change requests"))?;
        // SAFETY: the callback comes from the host's table.
        let status = unsafe { callback(self.host, device.get(), action, std::ptr::null_mut()) };
        if status == 0 {
            Ok(())
        } else {
            Err(Error::Host(status))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::ffi::c_void;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    pub static CHANGES: AtomicU32 = AtomicU32::new(0);
    /// `(device, action)` of every configuration change request.
    pub static REQUESTS: Mutex<Vec<(u32, u64)>> = Mutex::new(Vec::new());

    unsafe extern "C" fn properties_changed(
        _host: HostRef,
        _object: u32,
        count: u32,
        _addresses: *const AudioObjectPropertyAddress,
    ) -> sys::OSStatus {
        CHANGES.fetch_add(count, Ordering::SeqCst);
        0
    }

    unsafe extern "C" fn request_change(_host: HostRef, device: u32, action: u64, _info: *mut c_void) -> sys::OSStatus {
        REQUESTS.lock().unwrap().push((device, action));
        0
    }

    /// Last action requested for `device`.
    pub fn last_request(device: u32) -> Option<u64> {
        REQUESTS
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(d, _)| *d == device)
            .map(|(_, action)| *action)
    }

    /// A host table that counts callbacks.
    pub static HOST: sys::HostInterface = sys::HostInterface {
        properties_changed: Some(properties_changed),
        copy_from_storage: None,
        write_to_storage: None,
        delete_from_storage: None,
        request_device_configuration_change: Some(request_change),
    };
}
