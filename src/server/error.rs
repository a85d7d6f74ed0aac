use crate::api::DeviceType;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use thiserror::Error;

/// HTTP-level request failures.
///
/// These short-circuit with a 400 before any device operation runs; domain
/// failures travel in-band in the JSON scaffold instead.
#[derive(Error, Debug)]
pub(crate) enum Error {
    #[error("Unsupported device_type: {ty}")]
    UnsupportedDeviceType { ty: String },

    #[error("There is no {ty} at {number}")]
    UnknownDeviceNumber { ty: DeviceType, number: String },

    #[error("Unknown action {device_type}/{action}")]
    UnknownAction {
        device_type: DeviceType,
        action: String,
    },
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_the_wire_contract() {
        assert_eq!(
            Error::UnsupportedDeviceType {
                ty: "dome".to_owned()
            }
            .to_string(),
            "Unsupported device_type: dome"
        );
        assert_eq!(
            Error::UnknownDeviceNumber {
                ty: DeviceType::Camera,
                number: "99".to_owned()
            }
            .to_string(),
            "There is no camera at 99"
        );
    }
}
