use super::transaction::{ResponseTransaction, ResponseWithTransaction};
use crate::api::{ImageBytesResponse, IMAGE_BYTES_TYPE};
use crate::{ASCOMError, ASCOMErrorCode, ASCOMResult};
use axum::response::IntoResponse;
use axum::Json;
use http::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Forces a payload under the `Value` key even when it serializes to an
/// object (scalars and arrays get there on their own via
/// [`OpaqueResponse::new`]).
#[derive(Debug, Serialize)]
pub(crate) struct ValueResponse<T> {
    #[serde(rename = "Value")]
    pub(crate) value: T,
}

/// A JSON response body as an opaque key/value map.
///
/// Scalar and array results are wrapped under the `Value` key; struct
/// results (e.g. the image-array object) splice their fields at the top
/// level of the envelope.
#[derive(Default, Debug, Serialize, Deserialize, Clone)]
#[serde(transparent)]
pub(crate) struct OpaqueResponse(serde_json::Map<String, serde_json::Value>);

impl OpaqueResponse {
    pub(crate) fn new<T: Debug + Serialize>(value: T) -> Self {
        let json = serde_json::to_value(&value).unwrap_or_else(|err| {
            // This should never happen, but if it does, log and return the error.
            tracing::error!(?value, %err, "Serialization failure");
            serde_json::to_value(ASCOMError {
                code: ASCOMErrorCode::UNSPECIFIED,
                message: format!("Failed to serialize {value:#?}: {err}").into(),
            })
            .expect("ASCOMError can never fail to serialize")
        });

        Self(match json {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            value => std::iter::once(("Value".to_owned(), value)).collect(),
        })
    }
}

/// Anything that can be emitted as an HTTP response once paired with the
/// transaction scaffold.
pub(crate) trait Response: Sized {
    fn into_axum(self, transaction: ResponseTransaction) -> axum::response::Response;
}

impl Response for OpaqueResponse {
    fn into_axum(self, transaction: ResponseTransaction) -> axum::response::Response {
        Json(ResponseWithTransaction {
            transaction,
            response: self,
        })
        .into_response()
    }
}

impl Response for ASCOMResult<OpaqueResponse> {
    fn into_axum(self, transaction: ResponseTransaction) -> axum::response::Response {
        #[derive(Debug, Serialize)]
        struct Repr {
            #[serde(flatten)]
            error: ASCOMError,
            #[serde(flatten)]
            value: OpaqueResponse,
        }

        let response = match self {
            Ok(value) => Repr {
                error: ASCOMError::new(ASCOMErrorCode::OK, ""),
                value,
            },
            Err(error) => {
                tracing::warn!(%error, "Alpaca method returned an error");
                Repr {
                    error,
                    value: OpaqueResponse::default(),
                }
            }
        };

        Json(ResponseWithTransaction {
            transaction,
            response,
        })
        .into_response()
    }
}

impl Response for ASCOMResult<ImageBytesResponse> {
    fn into_axum(self, transaction: ResponseTransaction) -> axum::response::Response {
        let body = match &self {
            Ok(ImageBytesResponse(image)) => image.to_image_bytes(
                transaction.client_transaction_id,
                transaction.server_transaction_id,
            ),
            Err(error) => {
                tracing::warn!(%error, "Alpaca method returned an error");
                crate::api::ImageArray::error_image_bytes(
                    error,
                    transaction.client_transaction_id,
                    transaction.server_transaction_id,
                )
            }
        };
        ([(CONTENT_TYPE, IMAGE_BYTES_TYPE)], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction() -> ResponseTransaction {
        ResponseTransaction {
            client_transaction_id: Some(5),
            server_transaction_id: 17,
            client_id: Some(2),
        }
    }

    #[test]
    fn scalar_results_are_wrapped_under_value() {
        let response = OpaqueResponse::new(3.5_f64);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["Value"], 3.5);
    }

    #[test]
    fn void_results_have_no_value_key() {
        let response = OpaqueResponse::new(());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }

    #[tokio::test]
    async fn success_envelope_has_zero_error_fields() {
        let response = Ok(OpaqueResponse::new(true)).into_axum(transaction());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ErrorNumber"], 0);
        assert_eq!(json["ErrorMessage"], "");
        assert_eq!(json["Value"], true);
        assert_eq!(json["ClientTransactionID"], 5);
        assert_eq!(json["ServerTransactionID"], 17);
        assert_eq!(json["ClientID"], 2);
    }

    #[tokio::test]
    async fn error_envelope_omits_value() {
        let response = ASCOMResult::<OpaqueResponse>::Err(ASCOMError::NOT_CONNECTED)
            .into_axum(transaction());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ErrorNumber"], 0x407);
        assert_eq!(json.get("Value"), None);
    }
}
