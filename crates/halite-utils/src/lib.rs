//! Internal utilities for the Halite framework.
//!
//! Zero-dependency helpers shared by `halite-core` and `halite-hal`.

pub mod fourcc;

pub use fourcc::{code_to_string, FourCharCode};
