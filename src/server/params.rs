use super::case_insensitive_str::CaseInsensitiveStr;
use crate::{ASCOMError, ASCOMResult};
use axum::extract::{FromRequest, Request};
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::Form;
use indexmap::IndexMap;
use serde::Deserialize;

/// Scalar kinds accepted as request parameter values.
///
/// Coercion failures surface as in-band `INVALID_VALUE` errors, never as
/// HTTP-level failures.
pub(crate) trait ASCOMParam: Sized {
    fn from_string(name: &str, value: String) -> ASCOMResult<Self>;
}

impl ASCOMParam for String {
    fn from_string(_name: &str, value: String) -> ASCOMResult<Self> {
        Ok(value)
    }
}

impl ASCOMParam for bool {
    fn from_string(name: &str, value: String) -> ASCOMResult<Self> {
        // Only the exact literals are accepted on the wire.
        match value.as_str() {
            "True" => Ok(true),
            "False" => Ok(false),
            other => Err(ASCOMError::invalid_value(format_args!(
                "Parameter {name} must be \"True\" or \"False\", got {other:?}"
            ))),
        }
    }
}

macro_rules! numeric_param {
    ($($ty:ty),*) => {
        $(
            impl ASCOMParam for $ty {
                fn from_string(name: &str, value: String) -> ASCOMResult<Self> {
                    value.parse().map_err(|err| {
                        ASCOMError::invalid_value(format_args!(
                            "Invalid value {value:?} for parameter {name}: {err}"
                        ))
                    })
                }
            }
        )*
    };
}

numeric_param!(i32, u32, f64);

/// Case-insensitively keyed request parameters in arrival order.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub(crate) struct OpaqueParams(IndexMap<Box<CaseInsensitiveStr>, String>);

impl OpaqueParams {
    /// Extract an optional parameter; malformed values are an error.
    pub(crate) fn maybe_extract<T: ASCOMParam>(&mut self, name: &str) -> ASCOMResult<Option<T>> {
        self.0
            .shift_remove(AsRef::<CaseInsensitiveStr>::as_ref(name))
            .map(|value| T::from_string(name, value))
            .transpose()
    }

    /// Extract a required parameter.
    pub(crate) fn extract<T: ASCOMParam>(&mut self, name: &str) -> ASCOMResult<T> {
        self.maybe_extract(name)?.ok_or_else(|| {
            ASCOMError::invalid_value(format_args!("Missing parameter {name}"))
        })
    }
}

/// Parsed request parameters, tagged by HTTP method.
///
/// GET parameters come from the query string, PUT parameters from the
/// form-encoded body.
#[derive(Debug)]
pub(crate) enum ActionParams {
    Get(OpaqueParams),
    Put(OpaqueParams),
}

impl ActionParams {
    pub(crate) fn params(&mut self) -> &mut OpaqueParams {
        match self {
            Self::Get(params) | Self::Put(params) => params,
        }
    }
}

impl<S: Send + Sync> FromRequest<S> for ActionParams {
    type Rejection = axum::response::Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let Form(params) = Form::<OpaqueParams>::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        match method {
            Method::GET => Ok(Self::Get(params)),
            Method::PUT => Ok(Self::Put(params)),
            _ => Err((StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params_from_query(query: &str) -> OpaqueParams {
        OpaqueParams(
            query
                .split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    (Box::<str>::from(key).into(), value.to_owned())
                })
                .collect(),
        )
    }

    #[test]
    fn keys_are_case_insensitive() {
        let mut params = params_from_query("CLIENTID=7&numx=4");
        assert_eq!(params.extract::<u32>("ClientID").unwrap(), 7);
        assert_eq!(params.extract::<i32>("NumX").unwrap(), 4);
    }

    #[test]
    fn bool_literals_are_exact() {
        assert_eq!(bool::from_string("Light", "True".to_owned()).unwrap(), true);
        assert_eq!(
            bool::from_string("Light", "False".to_owned()).unwrap(),
            false
        );
        for bad in ["true", "false", "TRUE", "1", "yes", ""] {
            let err = bool::from_string("Light", bad.to_owned()).unwrap_err();
            assert_eq!(err.code, crate::ASCOMErrorCode::INVALID_VALUE);
        }
    }

    #[test]
    fn numeric_coercion_failure_is_invalid_value() {
        let mut params = params_from_query("Duration=abc");
        let err = params.extract::<f64>("Duration").unwrap_err();
        assert_eq!(err.code, crate::ASCOMErrorCode::INVALID_VALUE);
    }

    #[test]
    fn missing_parameter_is_invalid_value() {
        let mut params = params_from_query("");
        let err = params.extract::<i32>("Position").unwrap_err();
        assert_eq!(err.code, crate::ASCOMErrorCode::INVALID_VALUE);
    }
}
