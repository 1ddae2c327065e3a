use std::fmt;
use std::io;

use oscprims_codec::MalformedMessage;
use oscprims_peer::PeerError;
use oscprims_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Io(source) => io_error(context, source),
        other @ TransportError::Resolve { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {other}"))
        }
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::InvalidPattern(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn malformed_error(context: &str, err: MalformedMessage) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_to_exit_codes() {
        let err = io_error("bind", io::Error::from(io::ErrorKind::AddrInUse));
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.starts_with("bind: "));

        let err = io_error("send", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(err.code, PERMISSION_DENIED);
    }

    #[test]
    fn invalid_pattern_is_usage_error() {
        let regex_err = regex::Regex::new("(").unwrap_err();
        let err = peer_error("register", PeerError::InvalidPattern(regex_err));
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn malformed_input_is_data_invalid() {
        let err = oscprims_codec::decode_message(b"nope").unwrap_err();
        assert_eq!(malformed_error("decode", err).code, DATA_INVALID);
    }
}
