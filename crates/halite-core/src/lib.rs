//! # halite-core
//!
//! Platform-independent core of the Halite audio server driver framework.
//!
//! ## Architecture
//!
//! ```text
//! host call
//!     ↓
//! Dispatcher      (call context, tracing, argument conversion)
//!     ↓
//! Registry        (id lookup, pinning, lifecycle)
//!     ↓
//! Object          (Plugin / Device / Stream / VolumeControl / MuteControl)
//!     ↓
//! convert         (result encoding in the host's byte layout)
//! ```
//!
//! The host ABI itself lives in `halite-hal`. Everything here is testable
//! without an audio server.

pub mod config;
pub mod context;
pub mod convert;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod io;
pub mod mute;
pub mod object;
pub mod plugin;
pub mod registry;
pub mod status;
pub mod stream;
pub mod strings;
pub mod tracer;
pub mod types;
pub mod uid;
pub mod value;
pub mod volume;

pub use config::{ConfigError, DeviceConfig, DriverConfig};
pub use context::{Clock, Context, Host, MonotonicClock};
pub use convert::{CStringCodec, ConversionError, StringCodec};
pub use device::{Device, DeviceParameters};
pub use dispatcher::{CallContext, Dispatcher};
pub use error::{Error, Missing, Result};
pub use io::{ClientInfo, IoCycleInfo, IoOperation, IoRequestHandler, SilentIoHandler, ZeroTimestamp};
pub use mute::{MuteControl, MuteParameters};
pub use object::{Access, Interface, InterfaceBinding, Object, ObjectCore, PropertySpec, Qualifier};
pub use plugin::{Plugin, PluginParameters};
pub use registry::{Lifecycle, ObjectRef, Registry};
pub use status::Status;
pub use stream::{Stream, StreamParameters};
pub use tracer::{CallInfo, LogTracer, NoopTracer, Operation, Tracer};
pub use types::{ControlScope, Direction, ObjectId, PropertyAddress};
pub use value::{RangedFormat, SampleFormat, StreamFormat, Value, ValueKind, ValueRange};
pub use volume::{VolumeControl, VolumeCurve, VolumeParameters};
