//! Error types shared across the OETAS workspace.
//!
//! Parameter errors are configuration errors detected before any simulation
//! runs. Marshal errors come from the named-field persistence layer.

use std::error::Error;
use std::fmt;
use std::io;

/// Errors detected by [`CatalogParams::validate()`](crate::CatalogParams::validate).
#[derive(Clone, Debug, PartialEq)]
pub enum ParamError {
    /// A parameter is NaN or infinite.
    NotFinite {
        /// Name of the offending parameter.
        name: &'static str,
        /// The invalid value.
        value: f64,
    },
    /// A parameter that must be strictly positive is not.
    NotPositive {
        /// Name of the offending parameter.
        name: &'static str,
        /// The invalid value.
        value: f64,
    },
    /// Two parameters violate a required ordering.
    BadOrdering {
        /// Description of the violated ordering, e.g. `"mag_min_lo <= mag_min_hi"`.
        relation: &'static str,
    },
    /// An integer cap is zero.
    ZeroCap {
        /// Name of the offending cap.
        name: &'static str,
    },
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFinite { name, value } => {
                write!(f, "parameter {name} must be finite, got {value}")
            }
            Self::NotPositive { name, value } => {
                write!(f, "parameter {name} must be positive, got {value}")
            }
            Self::BadOrdering { relation } => {
                write!(f, "parameters violate required ordering {relation}")
            }
            Self::ZeroCap { name } => write!(f, "cap {name} must be at least 1"),
        }
    }
}

impl Error for ParamError {}

/// Errors from named-field marshaling and unmarshaling.
#[derive(Debug)]
pub enum MarshalError {
    /// An I/O error occurred during read or write.
    Io(io::Error),
    /// The stream does not start with the expected magic bytes.
    InvalidMagic,
    /// The object name in the stream is not the one requested.
    ObjectMismatch {
        /// Object name the reader asked for.
        expected: String,
        /// Object name found in the stream.
        found: String,
    },
    /// The object's format version is not supported by this build.
    UnsupportedVersion {
        /// Object name.
        object: String,
        /// The version found in the stream.
        found: u8,
    },
    /// A field name in the stream does not match the name requested.
    FieldMismatch {
        /// Field name the reader asked for.
        expected: String,
        /// Field name found in the stream.
        found: String,
    },
    /// A value was decoded but is not acceptable for its field.
    Malformed {
        /// Human-readable description of what went wrong.
        detail: String,
    },
}

impl fmt::Display for MarshalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidMagic => write!(f, "invalid magic bytes (expected b\"OETA\")"),
            Self::ObjectMismatch { expected, found } => {
                write!(f, "expected object '{expected}', found '{found}'")
            }
            Self::UnsupportedVersion { object, found } => {
                write!(f, "unsupported version {found} for object '{object}'")
            }
            Self::FieldMismatch { expected, found } => {
                write!(f, "expected field '{expected}', found '{found}'")
            }
            Self::Malformed { detail } => write!(f, "malformed data: {detail}"),
        }
    }
}

impl Error for MarshalError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for MarshalError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
