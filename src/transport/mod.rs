//! Byte-oriented transports for serial line-protocol devices.
//!
//! Drivers are written against the [`Transport`] trait so protocol logic can
//! be exercised with a scripted transport in tests; the real implementation
//! is [`SerialTransport`].

mod serial;
pub use serial::{SerialConfig, SerialTransport};

use crate::ASCOMError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use thiserror::Error;

/// How much of a reply a command expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadExpectation {
    /// Read until the given stop byte arrives (stop byte included).
    Terminated(u8),
    /// Read exactly this many bytes.
    Exact(usize),
    /// Fire-and-forget: the device sends no reply at all.
    None,
}

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O failure on the underlying port.
    #[error("Serial port error: {0}")]
    Io(#[from] std::io::Error),

    /// The device stayed silent past the deadline.
    ///
    /// Drivers whose commands legitimately get no reply should send them
    /// with [`ReadExpectation::None`] instead of relying on this.
    #[error("Timed out after {timeout:?} waiting for a reply to {command:?}")]
    Timeout {
        /// The command awaiting a reply.
        command: String,
        /// The configured read deadline.
        timeout: Duration,
    },
}

impl From<TransportError> for ASCOMError {
    fn from(err: TransportError) -> Self {
        Self::driver_error(err)
    }
}

/// A byte-oriented command/response channel with exclusive access per
/// exchange.
///
/// A write and the read of its reply happen under one lock acquisition, so
/// concurrent callers can never interleave their traffic on the port.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Send `command` and collect the reply according to `read`.
    ///
    /// Returns the raw reply bytes; empty for [`ReadExpectation::None`].
    async fn exchange(
        &self,
        command: &[u8],
        read: ReadExpectation,
    ) -> Result<Vec<u8>, TransportError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{ReadExpectation, Transport, TransportError};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// One scripted exchange: the exact command expected and the reply (or
    /// timeout) to produce.
    #[derive(Debug)]
    pub(crate) enum Reply {
        Bytes(&'static [u8]),
        Silence,
    }

    /// Transport double that replays a fixed script and panics on any
    /// deviation, so driver tests pin the exact wire traffic.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedTransport {
        script: Mutex<VecDeque<(&'static [u8], Reply)>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(script: impl IntoIterator<Item = (&'static [u8], Reply)>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
            }
        }

        /// Asserts that the whole script was consumed.
        pub(crate) fn assert_drained(&self) {
            let script = self.script.lock().unwrap();
            assert!(
                script.is_empty(),
                "unsent commands remaining in script: {script:?}"
            );
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn exchange(
            &self,
            command: &[u8],
            read: ReadExpectation,
        ) -> Result<Vec<u8>, TransportError> {
            let (expected, reply) = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    panic!(
                        "unexpected command {:?}",
                        String::from_utf8_lossy(command)
                    )
                });
            assert_eq!(
                String::from_utf8_lossy(command),
                String::from_utf8_lossy(expected),
                "command does not match script"
            );
            match (reply, read) {
                (_, ReadExpectation::None) => Ok(Vec::new()),
                (Reply::Bytes(bytes), _) => Ok(bytes.to_vec()),
                (Reply::Silence, _) => Err(TransportError::Timeout {
                    command: String::from_utf8_lossy(command).into_owned(),
                    timeout: Duration::from_millis(250),
                }),
            }
        }
    }
}
