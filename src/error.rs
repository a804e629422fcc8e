//! Error type shared by the session, the REST client and the exporters.

use thiserror::Error;

use crate::models::RegisterStatus;

#[derive(Debug, Error)]
pub enum RegisterError {
    /// Malformed or missing input, caught before any request is issued.
    #[error("{0}")]
    Validation(String),

    /// The operation is not allowed in the register's current state.
    #[error("cannot {operation} while the register is {status}")]
    InvalidState {
        operation: &'static str,
        status: RegisterStatus,
    },

    /// The request never produced a response (connect failure, timeout, ...).
    #[error("{0}")]
    Network(String),

    /// The back office answered with a non-2xx status.
    #[error("{message} (HTTP {status})")]
    Server { status: u16, message: String },

    /// The response body was not what the endpoint promises.
    #[error("unexpected response from the back office: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegisterError {
    /// Text shown to the operator in a notification.
    ///
    /// Server-reported messages are passed through verbatim; everything else
    /// uses the `Display` form.
    pub fn user_message(&self) -> String {
        match self {
            RegisterError::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// `true` when no request was sent because the input or state was rejected
    /// locally.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            RegisterError::Validation(_) | RegisterError::InvalidState { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RegisterError>;
