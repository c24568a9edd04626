//! # Halite
//!
//! Framework for user-space audio server drivers.
//!
//! A driver is a tree of objects (plugin, devices, streams and controls)
//! that the audio server inspects through properties and drives through
//! IO calls. Halite keeps that tree in a registry, answers property calls
//! from it and bridges the host's C interface to Rust.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use halite::prelude::*;
//!
//! fn build() -> Driver {
//!     Driver::new(PluginParameters::new("Acme")).with_setup(|plugin| {
//!         let id = plugin.add_device(DeviceParameters::new("Loopback"))?;
//!         let device = plugin.device(id)?;
//!         if let Some(device) = device.downcast_ref::<Device>() {
//!             device.add_stream(StreamParameters::default())?;
//!             device.add_volume_control(VolumeParameters::default())?;
//!         }
//!         Ok(())
//!     })
//! }
//!
//! export_driver!(AcmeDriverFactory, build);
//! ```

pub use halite_core as core;

#[cfg(feature = "hal")]
pub use halite_hal as hal;

#[cfg(feature = "hal")]
pub use halite_hal::export_driver;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use halite::prelude::*;
/// ```
pub mod prelude {
    pub use halite_core::{
        // Objects
        Device, DeviceParameters, MuteControl, MuteParameters, Plugin, PluginParameters, Stream,
        StreamParameters, VolumeControl, VolumeCurve, VolumeParameters,
        // Object model
        Object, ObjectId, ObjectRef, PropertyAddress, Registry,
        // Declarative setup
        DeviceConfig, DriverConfig,
        // IO
        ClientInfo, IoCycleInfo, IoOperation, IoRequestHandler, SilentIoHandler,
        // Formats
        ControlScope, Direction, SampleFormat, StreamFormat,
        // Infrastructure
        Context, Dispatcher, LogTracer, Tracer,
        // Errors
        Error, Result, Status,
    };

    #[cfg(feature = "hal")]
    pub use halite_hal::Driver;

    #[cfg(feature = "hal")]
    pub use halite_hal::export_driver;
}
