//! A module which contains the error type shared by all components of the library.

use thiserror::Error;

use crate::message::Case;

/// The errors a node can run into. Transport and storage failures are transient: they are reported
/// on the per-uid error stream and the pipeline which hit them keeps running, since another round
/// recovers from a lost message the same way it recovers from a network partition. Configuration
/// errors are fatal and refuse the node at `setup_bindings`.
#[derive(Error, Debug)]
pub enum PaxosError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("expected a {expected:?} message but got a {actual:?} one")]
    Shape { expected: Case, actual: Case },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("api error: {0}")]
    Api(String),
}

impl PaxosError {
    pub fn shape(expected: Case, actual: Case) -> Self {
        PaxosError::Shape { expected, actual }
    }

    /// Whether this error must refuse `setup_bindings` instead of being reported on the error
    /// stream.
    pub fn is_fatal(&self) -> bool {
        match self {
            PaxosError::Config(_) => true,
            _ => false,
        }
    }
}
