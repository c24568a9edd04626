//! Host status codes.
//!
//! Every entry point the host calls returns a 32-bit status. `0` is success,
//! everything else is a four-character error code. [`Status`] is the only
//! place where [`Error`] variants are translated into those codes.

use crate::error::{Error, Missing};
use halite_utils::fourcc;

/// A host status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(pub i32);

impl Status {
    pub const OK: Self = Self(0);
    pub const NOT_RUNNING: Self = Self(fourcc!(b"stop") as i32);
    pub const UNSPECIFIED: Self = Self(fourcc!(b"what") as i32);
    pub const UNKNOWN_PROPERTY: Self = Self(fourcc!(b"who?") as i32);
    pub const BAD_PROPERTY_SIZE: Self = Self(fourcc!(b"!siz") as i32);
    pub const ILLEGAL_OPERATION: Self = Self(fourcc!(b"nope") as i32);
    pub const BAD_OBJECT: Self = Self(fourcc!(b"!obj") as i32);
    pub const BAD_DEVICE: Self = Self(fourcc!(b"!dev") as i32);
    pub const BAD_STREAM: Self = Self(fourcc!(b"!str") as i32);
    pub const UNSUPPORTED_OPERATION: Self = Self(fourcc!(b"unop") as i32);
    pub const NOT_READY: Self = Self(fourcc!(b"nrdy") as i32);
    pub const UNSUPPORTED_FORMAT: Self = Self(fourcc!(b"!dat") as i32);

    /// Raw code as returned to the host.
    pub const fn code(self) -> i32 {
        self.0
    }

    /// True for [`Status::OK`].
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Status of a finished operation.
    pub fn of<T>(result: &crate::Result<T>) -> Self {
        match result {
            Ok(_) => Self::OK,
            Err(err) => Self::from(err),
        }
    }
}

impl From<&Error> for Status {
    fn from(err: &Error) -> Self {
        match err {
            Error::NotFound(Missing::Object(_)) => Self::BAD_OBJECT,
            Error::NotFound(Missing::Device(_)) => Self::BAD_DEVICE,
            Error::NotFound(Missing::Stream(_)) => Self::BAD_STREAM,
            Error::NotFound(Missing::Property(_)) => Self::UNKNOWN_PROPERTY,
            Error::NotFound(Missing::Client(_) | Missing::ConfigurationChange(_)) => {
                Self::ILLEGAL_OPERATION
            }
            Error::NotSupported(_) => Self::UNSUPPORTED_OPERATION,
            Error::WrongType(_) => Self::BAD_PROPERTY_SIZE,
            Error::InvalidValue(_) => Self::ILLEGAL_OPERATION,
            Error::NotReadable(_) => Self::ILLEGAL_OPERATION,
            Error::NotWritable(_) => Self::UNSUPPORTED_OPERATION,
            Error::ReferenceExhausted => Self::UNSPECIFIED,
            Error::AlreadyRetiring(_) => Self::BAD_OBJECT,
            Error::AlreadyRegistered(_) => Self::ILLEGAL_OPERATION,
            Error::NotRunning(_) => Self::NOT_RUNNING,
            Error::NotReady(_) => Self::NOT_READY,
            Error::UnsupportedFormat => Self::UNSUPPORTED_FORMAT,
            Error::Host(code) => Self(*code),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&crate::strings::status_to_string(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConversionError;
    use crate::types::{selector, ObjectId};

    #[test]
    fn test_codes_match_host_values() {
        assert_eq!(Status::BAD_OBJECT.code(), 0x216F_626A);
        assert_eq!(Status::UNKNOWN_PROPERTY.code(), 0x77686F3F);
        assert!(Status::OK.is_ok());
        assert!(!Status::NOT_READY.is_ok());
    }

    #[test]
    fn test_error_mapping() {
        let cases = [
            (Error::NotFound(Missing::Object(ObjectId(9))), Status::BAD_OBJECT),
            (Error::NotFound(Missing::Property(selector::NAME)), Status::UNKNOWN_PROPERTY),
            (Error::NotSupported("create device"), Status::UNSUPPORTED_OPERATION),
            (
                Error::WrongType(ConversionError::SizeMismatch { expected: 4, actual: 2 }),
                Status::BAD_PROPERTY_SIZE,
            ),
            (Error::InvalidValue("too loud".into()), Status::ILLEGAL_OPERATION),
            (Error::NotWritable(selector::NAME), Status::UNSUPPORTED_OPERATION),
            (Error::NotRunning(ObjectId(2)), Status::NOT_RUNNING),
            (Error::UnsupportedFormat, Status::UNSUPPORTED_FORMAT),
        ];
        for (err, status) in cases {
            assert_eq!(Status::from(&err), status, "{err}");
        }
    }

    #[test]
    fn test_status_of_result() {
        assert_eq!(Status::of(&Ok::<_, Error>(5)), Status::OK);
        assert_eq!(
            Status::of::<()>(&Err(Error::ReferenceExhausted)),
            Status::UNSPECIFIED
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Status::OK.to_string(), "OK");
        assert_eq!(Status::BAD_OBJECT.to_string(), "BadObject");
    }
}
