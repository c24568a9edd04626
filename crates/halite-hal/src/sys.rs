//! C-ABI mirror of the AudioServerPlugIn interface.
//!
//! Layouts follow `CoreAudio/AudioServerPlugIn.h`. They are declared by
//! hand so the crate builds and tests on every platform; only the opaque
//! CoreFoundation handles are platform specific at runtime.

#![allow(clippy::upper_case_acronyms)]

use std::ffi::c_void;

pub type OSStatus = i32;
pub type HRESULT = i32;
pub type ULONG = u32;
pub type Boolean = u8;
pub type AudioObjectID = u32;
pub type Pid = i32;

pub type CFStringRef = *const c_void;
pub type CFDictionaryRef = *const c_void;
pub type CFPropertyListRef = *const c_void;
pub type CFAllocatorRef = *const c_void;

/// `AudioServerPlugInDriverRef`: a pointer to the pointer to the vtable.
pub type DriverRef = *mut *const DriverInterface;
/// `AudioServerPlugInHostRef`.
pub type HostRef = *const HostInterface;

pub const S_OK: HRESULT = 0;
pub const E_NOINTERFACE: HRESULT = 0x8000_0004_u32 as i32;

// =============================================================================
// UUIDs
// =============================================================================

/// `CFUUIDBytes`, passed by value in `QueryInterface`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CFUUIDBytes {
    pub bytes: [u8; 16],
}

impl CFUUIDBytes {
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self { bytes }
    }
}

/// `IUnknownUUID`.
pub const IUNKNOWN_UUID: CFUUIDBytes = CFUUIDBytes::new([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46,
]);

/// `kAudioServerPlugInDriverInterfaceUUID`.
pub const DRIVER_INTERFACE_UUID: CFUUIDBytes = CFUUIDBytes::new([
    0xEE, 0xA5, 0x77, 0x3D, 0xCC, 0x43, 0x49, 0xF1, 0x8E, 0x00, 0x8F, 0x96, 0xE7, 0xD2, 0x3B, 0x17,
]);

/// `kAudioServerPlugInTypeUUID`.
pub const PLUGIN_TYPE_UUID: CFUUIDBytes = CFUUIDBytes::new([
    0x44, 0x3A, 0xBA, 0xB8, 0xE7, 0xB3, 0x49, 0x1A, 0xB9, 0x85, 0xBE, 0xB9, 0x18, 0x70, 0x30, 0xDB,
]);

// =============================================================================
// Plain structs
// =============================================================================

/// `AudioObjectPropertyAddress`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioObjectPropertyAddress {
    pub selector: u32,
    pub scope: u32,
    pub element: u32,
}

/// `SMPTETime`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SmpteTime {
    pub subframes: i16,
    pub subframe_divisor: i16,
    pub counter: u32,
    pub kind: u32,
    pub flags: u32,
    pub hours: i16,
    pub minutes: i16,
    pub seconds: i16,
    pub frames: i16,
}

/// `AudioTimeStamp`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioTimeStamp {
    pub sample_time: f64,
    pub host_time: u64,
    pub rate_scalar: f64,
    pub word_clock_time: u64,
    pub smpte_time: SmpteTime,
    pub flags: u32,
    pub reserved: u32,
}

/// `AudioServerPlugInClientInfo`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ClientInfo {
    pub client_id: u32,
    pub process_id: Pid,
    pub is_native_endian: Boolean,
    pub bundle_id: CFStringRef,
}

/// `AudioServerPlugInIOCycleInfo`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct IoCycleInfo {
    pub cycle_counter: u64,
    pub nominal_io_buffer_frame_size: u32,
    pub input_time: AudioTimeStamp,
    pub output_time: AudioTimeStamp,
    pub main_time: AudioTimeStamp,
    pub device_host_ticks_per_frame: f64,
}

// =============================================================================
// Host interface
// =============================================================================

/// `AudioServerPlugInHostInterface`, provided by the host in `Initialize`.
#[repr(C)]
pub struct HostInterface {
    pub properties_changed: Option<
        unsafe extern "C" fn(
            host: HostRef,
            object: AudioObjectID,
            count: u32,
            addresses: *const AudioObjectPropertyAddress,
        ) -> OSStatus,
    >,
    pub copy_from_storage:
        Option<unsafe extern "C" fn(host: HostRef, key: CFStringRef, out: *mut CFPropertyListRef) -> OSStatus>,
    pub write_to_storage:
        Option<unsafe extern "C" fn(host: HostRef, key: CFStringRef, data: CFPropertyListRef) -> OSStatus>,
    pub delete_from_storage: Option<unsafe extern "C" fn(host: HostRef, key: CFStringRef) -> OSStatus>,
    pub request_device_configuration_change: Option<
        unsafe extern "C" fn(host: HostRef, device: AudioObjectID, action: u64, info: *mut c_void) -> OSStatus,
    >,
}

// =============================================================================
// Driver interface
// =============================================================================

/// `AudioServerPlugInDriverInterface`.
#[repr(C)]
pub struct DriverInterface {
    pub _reserved: *mut c_void,
    pub query_interface:
        Option<unsafe extern "C" fn(driver: *mut c_void, uuid: CFUUIDBytes, out: *mut *mut c_void) -> HRESULT>,
    pub add_ref: Option<unsafe extern "C" fn(driver: *mut c_void) -> ULONG>,
    pub release: Option<unsafe extern "C" fn(driver: *mut c_void) -> ULONG>,
    pub initialize: Option<unsafe extern "C" fn(driver: DriverRef, host: HostRef) -> OSStatus>,
    pub create_device: Option<
        unsafe extern "C" fn(
            driver: DriverRef,
            description: CFDictionaryRef,
            client: *const ClientInfo,
            out_device: *mut AudioObjectID,
        ) -> OSStatus,
    >,
    pub destroy_device: Option<unsafe extern "C" fn(driver: DriverRef, device: AudioObjectID) -> OSStatus>,
    pub add_device_client:
        Option<unsafe extern "C" fn(driver: DriverRef, device: AudioObjectID, client: *const ClientInfo) -> OSStatus>,
    pub remove_device_client:
        Option<unsafe extern "C" fn(driver: DriverRef, device: AudioObjectID, client: *const ClientInfo) -> OSStatus>,
    pub perform_device_configuration_change: Option<
        unsafe extern "C" fn(driver: DriverRef, device: AudioObjectID, action: u64, info: *mut c_void) -> OSStatus,
    >,
    pub abort_device_configuration_change: Option<
        unsafe extern "C" fn(driver: DriverRef, device: AudioObjectID, action: u64, info: *mut c_void) -> OSStatus,
    >,
    pub has_property: Option<
        unsafe extern "C" fn(
            driver: DriverRef,
            object: AudioObjectID,
            client_pid: Pid,
            address: *const AudioObjectPropertyAddress,
        ) -> Boolean,
    >,
    pub is_property_settable: Option<
        unsafe extern "C" fn(
            driver: DriverRef,
            object: AudioObjectID,
            client_pid: Pid,
            address: *const AudioObjectPropertyAddress,
            out_settable: *mut Boolean,
        ) -> OSStatus,
    >,
    pub get_property_data_size: Option<
        unsafe extern "C" fn(
            driver: DriverRef,
            object: AudioObjectID,
            client_pid: Pid,
            address: *const AudioObjectPropertyAddress,
            qualifier_size: u32,
            qualifier: *const c_void,
            out_size: *mut u32,
        ) -> OSStatus,
    >,
    pub get_property_data: Option<
        unsafe extern "C" fn(
            driver: DriverRef,
            object: AudioObjectID,
            client_pid: Pid,
            address: *const AudioObjectPropertyAddress,
            qualifier_size: u32,
            qualifier: *const c_void,
            data_size: u32,
            out_size: *mut u32,
            out_data: *mut c_void,
        ) -> OSStatus,
    >,
    pub set_property_data: Option<
        unsafe extern "C" fn(
            driver: DriverRef,
            object: AudioObjectID,
            client_pid: Pid,
            address: *const AudioObjectPropertyAddress,
            qualifier_size: u32,
            qualifier: *const c_void,
            data_size: u32,
            data: *const c_void,
        ) -> OSStatus,
    >,
    pub start_io: Option<unsafe extern "C" fn(driver: DriverRef, device: AudioObjectID, client_id: u32) -> OSStatus>,
    pub stop_io: Option<unsafe extern "C" fn(driver: DriverRef, device: AudioObjectID, client_id: u32) -> OSStatus>,
    pub get_zero_timestamp: Option<
        unsafe extern "C" fn(
            driver: DriverRef,
            device: AudioObjectID,
            client_id: u32,
            out_sample_time: *mut f64,
            out_host_time: *mut u64,
            out_seed: *mut u64,
        ) -> OSStatus,
    >,
    pub will_do_io_operation: Option<
        unsafe extern "C" fn(
            driver: DriverRef,
            device: AudioObjectID,
            client_id: u32,
            operation: u32,
            out_will_do: *mut Boolean,
            out_in_place: *mut Boolean,
        ) -> OSStatus,
    >,
    pub begin_io_operation: Option<
        unsafe extern "C" fn(
            driver: DriverRef,
            device: AudioObjectID,
            client_id: u32,
            operation: u32,
            frames: u32,
            cycle: *const IoCycleInfo,
        ) -> OSStatus,
    >,
    pub do_io_operation: Option<
        unsafe extern "C" fn(
            driver: DriverRef,
            device: AudioObjectID,
            stream: AudioObjectID,
            client_id: u32,
            operation: u32,
            frames: u32,
            cycle: *const IoCycleInfo,
            main_buffer: *mut c_void,
            secondary_buffer: *mut c_void,
        ) -> OSStatus,
    >,
    pub end_io_operation: Option<
        unsafe extern "C" fn(
            driver: DriverRef,
            device: AudioObjectID,
            client_id: u32,
            operation: u32,
            frames: u32,
            cycle: *const IoCycleInfo,
        ) -> OSStatus,
    >,
}

// SAFETY: the vtable is immutable after construction; `_reserved` is
// always null and never dereferenced.
unsafe impl Sync for DriverInterface {}
