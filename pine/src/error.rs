use chainerror::*;
use std::io;

use crate::sansio::types::ErrorCode;

#[derive(Clone, PartialEq, Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("IO error")]
    Io(io::ErrorKind),
    #[error("Session allocation failed: {0}")]
    AllocationFailed(ErrorCode),
    #[error("Command failed! Function: {operation} Error: {code}")]
    CommandFailed {
        operation: &'static str,
        code: ErrorCode,
    },
    #[error("Invalid operand: '{0}'")]
    InvalidOperand(String),
    #[error("No reply in slot {0}")]
    SlotNotFound(usize),
    #[error("PINE: batch already open on this session")]
    AlreadyOpen,
    #[error("PINE: no batch open on this session")]
    BatchNotOpen,
    #[error("Transport error: {0}")]
    TransportError(ErrorCode),
    #[error("Emulator unreachable at '{0}'")]
    Unreachable(String),
    #[error("Invalid PINE address URI: '{0}'")]
    InvalidAddress(String),
}

impl ErrorKind {
    /// Classify an I/O error. Errors that mean the peer went away are
    /// connection losses, everything else stays a local I/O error.
    pub fn from_io(e: &io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => ErrorKind::TransportError(ErrorCode::NoConnection),
            kind => ErrorKind::Io(kind),
        }
    }
}

impl ChainErrorFrom<std::io::Error> for ErrorKind {
    fn chain_error_from(
        e: io::Error,
        line_filename: Option<String>,
    ) -> ChainError<Self> {
        ChainError::<_>::new(ErrorKind::from_io(&e), Some(Box::from(e)), line_filename)
    }
}

pub type Result<T> = ChainResult<T, ErrorKind>;
pub type Error = ChainError<ErrorKind>;

/// Creates an [`Error`] of the given kind, tagged with the current source location.
#[macro_export]
macro_rules! context {
    ($kind:expr) => {
        $crate::Error::new($kind, None, Some(format!("{}:{}: ", file!(), line!())))
    };
}

/// Closure for `map_err()`.
///
/// Without argument the cause is classified through `ChainErrorFrom`, with an
/// [`ErrorKind`] argument the cause is chained below that kind.
#[macro_export]
macro_rules! map_context {
    () => {
        |e| {
            <$crate::ErrorKind as ::chainerror::ChainErrorFrom<_>>::chain_error_from(
                e,
                Some(format!("{}:{}: ", file!(), line!())),
            )
        }
    };
    ($kind:expr) => {
        |e| $crate::Error::new($kind, Some(Box::from(e)), Some(format!("{}:{}: ", file!(), line!())))
    };
}
