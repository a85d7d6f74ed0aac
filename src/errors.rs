use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use thiserror::Error;

/// The starting value for Alpaca error numbers.
const BASE: u16 = 0x400;
/// The starting value for driver-specific error numbers.
const DRIVER_BASE: u16 = 0x500;

/// Alpaca representation of an ASCOM error code.
///
/// These values are wire-visible in the `ErrorNumber` field of every
/// response and must not change.
#[derive(Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ASCOMErrorCode(u16);

impl ASCOMErrorCode {
    /// Generate an ASCOM error code from a zero-based driver error code.
    ///
    /// Driver-specific failures (transport errors, SDK errors, echo
    /// mismatches) all live in the `0x500`-based range.
    pub const fn new_for_driver(driver_code: u16) -> Self {
        Self(driver_code + DRIVER_BASE)
    }

    /// Get the driver-specific error code.
    ///
    /// Returns `Ok` with the `0`-based driver error code if this is a driver
    /// error, `Err` with the raw code otherwise.
    pub const fn as_driver_error(self) -> Result<u16, u16> {
        if self.0 >= DRIVER_BASE {
            Ok(self.0 - DRIVER_BASE)
        } else {
            Err(self.0)
        }
    }

    /// Get the raw error code.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Whether this code is in the reserved Alpaca range at all.
    pub const fn is_alpaca(self) -> bool {
        self.0 >= BASE
    }
}

/// ASCOM error: an integer code plus a human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("ASCOM error {code}: {message}")]
pub struct ASCOMError {
    /// Error number.
    #[serde(rename = "ErrorNumber")]
    pub code: ASCOMErrorCode,
    /// Error message.
    #[serde(rename = "ErrorMessage")]
    pub message: Cow<'static, str>,
}

impl ASCOMError {
    /// Create a new `ASCOMError` from the given error code and message.
    pub fn new(code: ASCOMErrorCode, message: impl std::fmt::Display) -> Self {
        Self {
            code,
            message: message.to_string().into(),
        }
    }
}

/// Result type for ASCOM methods.
pub type ASCOMResult<T = ()> = Result<T, ASCOMError>;

macro_rules! ascom_error_codes {
    ($(#[doc = $doc:literal] $vis:vis $name:ident = $value:literal,)*) => {
        impl ASCOMErrorCode {
            $(
                #[doc = $doc]
                $vis const $name: Self = Self($value);
            )*
        }

        impl std::fmt::Debug for ASCOMErrorCode {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match *self {
                    $(
                        Self::$name => f.write_str(stringify!($name)),
                    )*
                    _ => match self.as_driver_error() {
                        Ok(driver_code) => write!(f, "DRIVER_ERROR[{driver_code}]"),
                        Err(raw_code) => write!(f, "{raw_code:#X}"),
                    },
                }
            }
        }

        impl std::fmt::Display for ASCOMErrorCode {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Debug::fmt(self, f)
            }
        }

        #[allow(unused)]
        impl ASCOMError {
            $(
                #[doc = $doc]
                $vis const $name: Self = Self {
                    code: ASCOMErrorCode::$name,
                    message: Cow::Borrowed(ascom_error_codes!(@msg $name $doc)),
                };
            )*
        }
    };

    (@msg OK $doc:literal) => ("");
    (@msg $name:ident $doc:literal) => ($doc.trim_ascii());
}

ascom_error_codes! {
    /// Success.
    pub OK = 0,
    /// Property or method not implemented.
    pub NOT_IMPLEMENTED = 0x400,
    /// Invalid value.
    pub INVALID_VALUE = 0x401,
    /// A value has not been set.
    pub VALUE_NOT_SET = 0x402,
    /// The communications channel is not connected.
    pub NOT_CONNECTED = 0x407,
    /// The attempted operation is invalid because the mount is currently in a Parked state.
    pub INVALID_WHILE_PARKED = 0x408,
    /// The requested operation can not be undertaken at this time.
    pub INVALID_OPERATION = 0x40B,
    /// The requested action is not implemented in this driver.
    pub ACTION_NOT_IMPLEMENTED = 0x40C,
    /// Unspecified error.
    pub UNSPECIFIED = 0x4FF,
    /// Driver-level failure (transport, SDK or device firmware).
    pub DRIVER_ERROR = 0x500,
}

impl ASCOMError {
    /// Create a new "invalid operation" error with the specified message.
    pub fn invalid_operation(message: impl std::fmt::Display) -> Self {
        Self::new(ASCOMErrorCode::INVALID_OPERATION, message)
    }

    /// Create a new "invalid value" error with the specified message.
    pub fn invalid_value(message: impl std::fmt::Display) -> Self {
        Self::new(ASCOMErrorCode::INVALID_VALUE, message)
    }

    /// Create a new "not implemented" error with the specified message.
    pub fn not_implemented(message: impl std::fmt::Display) -> Self {
        Self::new(ASCOMErrorCode::NOT_IMPLEMENTED, message)
    }

    /// Create a new driver error with the specified message.
    pub fn driver_error(message: impl std::fmt::Display) -> Self {
        Self::new(ASCOMErrorCode::DRIVER_ERROR, message)
    }

    /// Create a new error with unspecified error code and the given message.
    pub fn unspecified(message: impl std::fmt::Display) -> Self {
        Self::new(ASCOMErrorCode::UNSPECIFIED, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_visible_codes() {
        assert_eq!(ASCOMErrorCode::NOT_IMPLEMENTED.raw(), 0x400);
        assert_eq!(ASCOMErrorCode::INVALID_VALUE.raw(), 0x401);
        assert_eq!(ASCOMErrorCode::NOT_CONNECTED.raw(), 0x407);
        assert_eq!(ASCOMErrorCode::INVALID_OPERATION.raw(), 0x40B);
        assert_eq!(ASCOMErrorCode::UNSPECIFIED.raw(), 0x4FF);
        assert_eq!(ASCOMErrorCode::DRIVER_ERROR.raw(), 0x500);
    }

    #[test]
    fn driver_code_roundtrip() {
        let code = ASCOMErrorCode::new_for_driver(7);
        assert_eq!(code.as_driver_error(), Ok(7));
        assert_eq!(ASCOMErrorCode::INVALID_VALUE.as_driver_error(), Err(0x401));
    }

    #[test]
    fn error_serializes_to_envelope_fields() {
        let json = serde_json::to_value(ASCOMError::invalid_value("out of range")).unwrap();
        assert_eq!(json["ErrorNumber"], 0x401);
        assert_eq!(json["ErrorMessage"], "out of range");
    }
}
