//! Error types for object, property and IO operations.

use crate::convert::ConversionError;
use crate::types::{ObjectId, PropertySelector};
use halite_utils::code_to_string;

/// What a `NotFound` error failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// No live object with this id.
    Object(ObjectId),
    /// The object exists but is not a device.
    Device(ObjectId),
    /// The object exists but is not a stream of the addressed device.
    Stream(ObjectId),
    /// The object does not have this property.
    Property(PropertySelector),
    /// The device does not know this client.
    Client(u32),
    /// No pending configuration change with this action id.
    ConfigurationChange(u64),
}

/// Errors returned by registry, object and dispatcher operations.
///
/// Every variant maps to exactly one host status code, see
/// [`Status`](crate::Status).
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Unknown object, selector, client or pending change.
    NotFound(Missing),
    /// The object does not implement the requested interface or operation.
    NotSupported(&'static str),
    /// The value has the wrong type or size for the property.
    WrongType(ConversionError),
    /// The value is well-formed but outside the property's domain.
    InvalidValue(String),
    /// The property cannot be read.
    NotReadable(PropertySelector),
    /// The property cannot be written.
    NotWritable(PropertySelector),
    /// The registry ran out of object ids. Fatal for the whole plugin.
    ReferenceExhausted,
    /// The object is being torn down.
    AlreadyRetiring(ObjectId),
    /// An object with this id is already registered.
    AlreadyRegistered(ObjectId),
    /// IO was stopped more often than started, or is not running.
    NotRunning(ObjectId),
    /// The object is not active yet, or its IO state is being reconfigured.
    NotReady(ObjectId),
    /// The stream format is not one of the advertised formats.
    UnsupportedFormat,
    /// A host callback failed with this status code.
    Host(i32),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(Missing::Object(id)) => write!(f, "no object with id {id}"),
            Self::NotFound(Missing::Device(id)) => write!(f, "object {id} is not a device"),
            Self::NotFound(Missing::Stream(id)) => write!(f, "object {id} is not a stream of this device"),
            Self::NotFound(Missing::Property(sel)) => {
                write!(f, "unknown property {}", code_to_string(*sel))
            }
            Self::NotFound(Missing::Client(id)) => write!(f, "unknown client {id}"),
            Self::NotFound(Missing::ConfigurationChange(action)) => {
                write!(f, "no pending configuration change {action}")
            }
            Self::NotSupported(what) => write!(f, "not supported: {what}"),
            Self::WrongType(err) => write!(f, "wrong type: {err}"),
            Self::InvalidValue(msg) => write!(f, "invalid value: {msg}"),
            Self::NotReadable(sel) => write!(f, "property {} is not readable", code_to_string(*sel)),
            Self::NotWritable(sel) => write!(f, "property {} is not writable", code_to_string(*sel)),
            Self::ReferenceExhausted => write!(f, "object ids exhausted"),
            Self::AlreadyRetiring(id) => write!(f, "object {id} is retiring"),
            Self::AlreadyRegistered(id) => write!(f, "object id {id} is already registered"),
            Self::NotRunning(id) => write!(f, "IO is not running on object {id}"),
            Self::NotReady(id) => write!(f, "object {id} is not ready"),
            Self::UnsupportedFormat => write!(f, "unsupported stream format"),
            Self::Host(code) => write!(f, "host call failed with status {}", code_to_string(*code as u32)),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::WrongType(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConversionError> for Error {
    fn from(err: ConversionError) -> Self {
        match err {
            ConversionError::InvalidString | ConversionError::UnknownCode(_) => {
                Self::InvalidValue(err.to_string())
            }
            other => Self::WrongType(other),
        }
    }
}

/// Result type for Halite operations.
pub type Result<T> = std::result::Result<T, Error>;
