//! # halite-hal
//!
//! AudioServerPlugIn binding for `halite-core`.
//!
//! ```text
//! CFPlugIn loader
//!     ↓
//! export_driver!  (factory function, one Driver per bundle)
//!     ↓
//! bridge          (static vtable, pointer checks, catch_unwind)
//!     ↓
//! Dispatcher      (halite-core)
//! ```
//!
//! The ABI is declared in [`sys`], so this crate builds and tests on any
//! platform. Only the string codec and the host clock use macOS APIs.

pub mod bridge;
pub mod clock;
pub mod driver;
pub mod entry;
pub mod host;
pub mod strings;
pub mod sys;

pub use bridge::DRIVER_INTERFACE;
pub use clock::platform_clock;
#[cfg(target_os = "macos")]
pub use clock::MachClock;
pub use driver::{Driver, SetupFn};
pub use host::FfiHost;
pub use strings::platform_strings;
#[cfg(target_os = "macos")]
pub use strings::CfStringCodec;
