use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use oscprims_codec::MalformedMessage;

use crate::handler::HandlerError;

/// Errors that can occur in client and server operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] oscprims_transport::TransportError),

    /// A handler pattern failed to compile.
    #[error("invalid address pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The client has no open endpoint.
    #[error("client is not connected")]
    NotConnected,

    /// Listening requires a running tokio runtime.
    #[error("no tokio runtime is available to run the receive loop")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, PeerError>;

/// A handler invocation that did not complete normally.
///
/// Faults are contained: other handlers for the same message and the
/// receive loop keep running.
#[derive(Debug, thiserror::Error)]
pub enum HandlerFault {
    /// The handler returned an error.
    #[error("handler for {pattern:?} failed on {address}: {source}")]
    Failed {
        pattern: String,
        address: String,
        #[source]
        source: HandlerError,
    },

    /// The handler panicked.
    #[error("handler for {pattern:?} panicked on {address}: {message}")]
    Panicked {
        pattern: String,
        address: String,
        message: String,
    },

    /// The handler task was cancelled before it finished.
    #[error("handler for {pattern:?} was cancelled on {address}")]
    Cancelled { pattern: String, address: String },
}

impl HandlerFault {
    /// Pattern of the handler that faulted.
    pub fn pattern(&self) -> &str {
        match self {
            HandlerFault::Failed { pattern, .. }
            | HandlerFault::Panicked { pattern, .. }
            | HandlerFault::Cancelled { pattern, .. } => pattern,
        }
    }

    /// Address of the message being handled.
    pub fn address(&self) -> &str {
        match self {
            HandlerFault::Failed { address, .. }
            | HandlerFault::Panicked { address, .. }
            | HandlerFault::Cancelled { address, .. } => address,
        }
    }
}

/// A failure observed by a listening server.
#[derive(Debug, Clone)]
pub enum ServerFailure {
    /// A datagram could not be decoded and was dropped.
    Malformed {
        from: SocketAddr,
        error: Arc<MalformedMessage>,
    },

    /// A handler faulted while processing a decoded message.
    Handler(Arc<HandlerFault>),
}

impl fmt::Display for ServerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerFailure::Malformed { from, error } => write!(f, "{error} (from {from})"),
            ServerFailure::Handler(fault) => write!(f, "{fault}"),
        }
    }
}
