//! Platform string handles.
//!
//! On macOS string-valued properties travel as `CFStringRef`. Elsewhere the
//! bridge falls back to C strings so the whole stack can be exercised in
//! tests.

use std::sync::Arc;

use halite_core::StringCodec;

#[cfg(target_os = "macos")]
pub use self::cf::CfStringCodec;

/// The codec the host expects on this platform.
pub fn platform_strings() -> Arc<dyn StringCodec> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(CfStringCodec)
    }
    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(halite_core::CStringCodec)
    }
}

#[cfg(target_os = "macos")]
mod cf {
    use std::ffi::c_void;
    use std::ptr::NonNull;

    use halite_core::{ConversionError, StringCodec};
    use objc2_core_foundation::{CFRetained, CFString};

    /// `CFStringRef` codec. Encoded handles carry +1 retain count, which
    /// the host takes over for property results.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct CfStringCodec;

    impl StringCodec for CfStringCodec {
        fn encode(&self, value: &str) -> Result<*const c_void, ConversionError> {
            let string = CFString::from_str(value);
            Ok(CFRetained::into_raw(string).as_ptr() as *const c_void)
        }

        unsafe fn decode(&self, handle: *const c_void) -> Result<String, ConversionError> {
            let Some(ptr) = NonNull::new(handle as *mut CFString) else {
                return Err(ConversionError::NullString);
            };
            // SAFETY: caller guarantees a live CFString borrowed for this call.
            let string = unsafe { ptr.as_ref() };
            Ok(string.to_string())
        }

        unsafe fn release(&self, handle: *const c_void) {
            if let Some(ptr) = NonNull::new(handle as *mut CFString) {
                // SAFETY: handle owns one retain from `encode`.
                drop(unsafe { CFRetained::from_raw(ptr) });
            }
        }
    }

}
