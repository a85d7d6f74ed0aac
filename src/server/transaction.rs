use super::params::ActionParams;
use serde::Serialize;
use std::sync::Mutex;

/// The process-wide server transaction counter.
///
/// A single instance lives in the [`Server`](super::Server) and is bumped
/// exactly once per request, error paths included, so the ids emitted by one
/// process are strictly increasing.
#[derive(Debug, Default)]
pub(crate) struct TransactionCounter(Mutex<u32>);

impl TransactionCounter {
    pub(crate) const fn new() -> Self {
        Self(Mutex::new(0))
    }

    fn next(&self) -> u32 {
        let mut counter = self.0.lock().expect("transaction counter poisoned");
        *counter = counter.wrapping_add(1);
        *counter
    }
}

/// Client-supplied identity fields, extracted leniently.
///
/// A missing or malformed `ClientID`/`ClientTransactionID` is a warning,
/// not an error; the field is simply omitted from the response scaffold.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RequestTransaction {
    pub(crate) client_id: Option<u32>,
    pub(crate) client_transaction_id: Option<u32>,
}

impl RequestTransaction {
    pub(crate) fn extract(params: &mut ActionParams) -> Self {
        let mut extract_id = |name: &str| match params.params().maybe_extract::<u32>(name) {
            Ok(maybe_id) => maybe_id,
            Err(err) => {
                tracing::warn!(name, %err, "Ignoring malformed transaction field");
                None
            }
        };

        Self {
            client_id: extract_id("ClientID"),
            client_transaction_id: extract_id("ClientTransactionID"),
        }
    }
}

/// The transaction part of the response scaffold.
#[derive(Debug, Serialize, Clone, Copy)]
pub(crate) struct ResponseTransaction {
    #[serde(rename = "ClientTransactionID")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) client_transaction_id: Option<u32>,

    #[serde(rename = "ServerTransactionID")]
    pub(crate) server_transaction_id: u32,

    #[serde(rename = "ClientID")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) client_id: Option<u32>,
}

impl ResponseTransaction {
    pub(crate) fn new(counter: &TransactionCounter, request: RequestTransaction) -> Self {
        Self {
            client_transaction_id: request.client_transaction_id,
            server_transaction_id: counter.next(),
            client_id: request.client_id,
        }
    }
}

/// A response body paired with its transaction scaffold.
#[derive(Debug, Serialize)]
pub(crate) struct ResponseWithTransaction<T> {
    #[serde(flatten)]
    pub(crate) transaction: ResponseTransaction,
    #[serde(flatten)]
    pub(crate) response: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_is_strictly_increasing() {
        let counter = TransactionCounter::new();
        let first = counter.next();
        let second = counter.next();
        assert_eq!(second, first + 1);
    }

    #[test]
    fn scaffold_omits_missing_client_fields() {
        let counter = TransactionCounter::new();
        let transaction = ResponseTransaction::new(
            &counter,
            RequestTransaction {
                client_id: None,
                client_transaction_id: None,
            },
        );
        let json = serde_json::to_value(transaction).unwrap();
        assert_eq!(json.get("ClientTransactionID"), None);
        assert_eq!(json.get("ClientID"), None);
        assert_eq!(json["ServerTransactionID"], 1);
    }

    #[test]
    fn scaffold_echoes_client_fields() {
        let counter = TransactionCounter::new();
        let transaction = ResponseTransaction::new(
            &counter,
            RequestTransaction {
                client_id: Some(3),
                client_transaction_id: Some(42),
            },
        );
        let json = serde_json::to_value(transaction).unwrap();
        assert_eq!(json["ClientTransactionID"], 42);
        assert_eq!(json["ClientID"], 3);
    }
}
