use thiserror::Error;

use crate::protocol::packet::ErrPayloadBytes;
use crate::protocol::response::ErrPayload;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // ─── Server-reported ─────────────────────────────────────────────────
    #[error("{0}")]
    Server(#[from] ErrPayload),
    // ─── Transport ───────────────────────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    // ─── Protocol ────────────────────────────────────────────────────────
    #[error("packet sequence mismatch: expected {expected}, got {got}")]
    SequenceNumberMismatch { expected: u8, got: u8 },
    #[error("message ended before the expected field")]
    IncompleteMessage,
    #[error("message carries bytes past the last field")]
    ExtraBytes,
    #[error("malformed protocol value: {0}")]
    ProtocolValue(String),
    #[error("unknown authentication plugin: {0}")]
    UnknownAuthPlugin(String),
    #[error("authentication plugin '{0}' requires a TLS connection")]
    AuthPluginRequiresSsl(String),
    #[error("server is unsupported: {0}")]
    ServerUnsupported(String),
    // ─── API misuse (detected before any I/O) ────────────────────────────
    #[error("statement expects {expected} parameters, {got} were supplied")]
    WrongNumParams { expected: usize, got: usize },
    #[error("statement is closed or was prepared on another connection")]
    StatementNotValid,
    #[error("a command was issued before the previous resultset was drained")]
    SyncViolation,
    // ─── Configuration ───────────────────────────────────────────────────
    #[error("bad configuration: {0}")]
    BadConfig(String),
}

impl<'a> From<ErrPayloadBytes<'a>> for Error {
    fn from(bytes: ErrPayloadBytes<'a>) -> Self {
        match ErrPayload::try_from(bytes) {
            Ok(err) => Error::Server(err),
            Err(err) => err,
        }
    }
}

impl From<core::convert::Infallible> for Error {
    fn from(err: core::convert::Infallible) -> Self {
        match err {}
    }
}

impl Error {
    /// Whether this error leaves the connection unusable.
    ///
    /// Server-reported errors and API misuse do not poison the connection;
    /// transport and protocol errors do.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Server(_)
                | Error::WrongNumParams { .. }
                | Error::StatementNotValid
                | Error::SyncViolation
                | Error::BadConfig(_)
        )
    }

    pub(crate) fn to_poison(&self) -> Option<Poison> {
        let poison = match self {
            Error::Io(err) => Poison::Io(err.kind(), err.to_string()),
            Error::SequenceNumberMismatch { expected, got } => Poison::SequenceNumberMismatch {
                expected: *expected,
                got: *got,
            },
            Error::IncompleteMessage => Poison::IncompleteMessage,
            Error::ExtraBytes => Poison::ExtraBytes,
            Error::ProtocolValue(info) => Poison::ProtocolValue(info.clone()),
            Error::UnknownAuthPlugin(name) => Poison::UnknownAuthPlugin(name.clone()),
            Error::AuthPluginRequiresSsl(name) => Poison::AuthPluginRequiresSsl(name.clone()),
            Error::ServerUnsupported(info) => Poison::ServerUnsupported(info.clone()),
            _ => return None,
        };
        Some(poison)
    }
}

/// A fatal error retained by the channel so every later operation fails the
/// same way the first one did.
#[derive(Debug, Clone)]
pub(crate) enum Poison {
    Io(std::io::ErrorKind, String),
    SequenceNumberMismatch { expected: u8, got: u8 },
    IncompleteMessage,
    ExtraBytes,
    ProtocolValue(String),
    UnknownAuthPlugin(String),
    AuthPluginRequiresSsl(String),
    ServerUnsupported(String),
}

impl From<&Poison> for Error {
    fn from(poison: &Poison) -> Self {
        match poison {
            Poison::Io(kind, info) => Error::Io(std::io::Error::new(*kind, info.clone())),
            Poison::SequenceNumberMismatch { expected, got } => Error::SequenceNumberMismatch {
                expected: *expected,
                got: *got,
            },
            Poison::IncompleteMessage => Error::IncompleteMessage,
            Poison::ExtraBytes => Error::ExtraBytes,
            Poison::ProtocolValue(info) => Error::ProtocolValue(info.clone()),
            Poison::UnknownAuthPlugin(name) => Error::UnknownAuthPlugin(name.clone()),
            Poison::AuthPluginRequiresSsl(name) => Error::AuthPluginRequiresSsl(name.clone()),
            Poison::ServerUnsupported(info) => Error::ServerUnsupported(info.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_not_fatal() {
        let err = Error::Server(ErrPayload {
            error_code: 1146,
            sql_state: "42S02".to_string(),
            message: "Table 'test.t' doesn't exist".to_string(),
        });
        assert!(!err.is_fatal());
        assert!(err.to_poison().is_none());
    }

    #[test]
    fn protocol_errors_poison_and_replay() {
        let err = Error::SequenceNumberMismatch {
            expected: 2,
            got: 5,
        };
        assert!(err.is_fatal());
        let poison = err.to_poison().unwrap();
        let replayed = Error::from(&poison);
        assert!(matches!(
            replayed,
            Error::SequenceNumberMismatch {
                expected: 2,
                got: 5
            }
        ));
    }

    #[test]
    fn api_misuse_does_not_poison() {
        assert!(Error::SyncViolation.to_poison().is_none());
        assert!(Error::WrongNumParams {
            expected: 2,
            got: 1
        }
        .to_poison()
        .is_none());
        assert!(Error::StatementNotValid.to_poison().is_none());
    }
}
