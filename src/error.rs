use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// Builds [`crate::Error::NotRecorded`] for a replay query whose key was never captured.
///
/// ```rust, ignore
/// return Err(not_recorded!(Packet::GetMethodAttribs, key));
/// ```
macro_rules! not_recorded {
    ($packet:expr, $key:expr) => {
        crate::Error::NotRecorded {
            packet: $packet.into(),
            key: format!("{:?}", $key),
        }
    };
}

/// Coarse classification of [`Error`] values.
///
/// Replay drivers and archive tools branch on this rather than on individual variants: a
/// [`ErrorKind::NotRecorded`] during replay means capture and replay diverged, while a
/// [`ErrorKind::FormatError`] means the input itself is damaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A replay query asked for data that was never captured.
    NotRecorded,
    /// Corrupt or truncated `.mc` / `.mch` / `.mct` input.
    FormatError,
    /// A record parsed, but failed a consistency check (hash mismatch, stale index).
    IntegrityError,
    /// Operating system level I/O failure.
    Io,
    /// Invalid operator input such as a malformed `.mcl` list or a missing setting.
    UserInput,
    /// An exception code raised by the execution engine, propagated unchanged.
    EeException,
    /// Anything that leaves the engine unable to continue.
    Fatal,
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Format Errors
/// - [`Error::Malformed`] - Corrupted or invalid record structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of a buffer
///
/// ## Replay Errors
/// - [`Error::NotRecorded`] - Lookup miss: the query was never captured
/// - [`Error::EeException`] - The recorded EE call raised an exception
///
/// ## Integrity Errors
/// - [`Error::Integrity`] - A record failed verification
/// - [`Error::StaleToc`] - The table of contents does not describe the archive
///
/// ## User Input Errors
/// - [`Error::InvalidMcl`] - Malformed `.mcl` range list
/// - [`Error::InvalidArgument`] - Missing or inconsistent configuration
///
/// # Examples
///
/// ```rust
/// use superpmi::{Error, ErrorKind, MethodContext};
///
/// match MethodContext::from_bytes(&[0x00, 0x01]) {
///     Ok(_) => unreachable!(),
///     Err(e) => assert_eq!(e.kind(), ErrorKind::FormatError),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The record is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// A replay query for data that was never recorded.
    ///
    /// This is distinct from a recorded empty answer: it signals a divergence between the
    /// capture-time and replay-time environment, or a capture bug.
    #[error("No {packet} record for key {key}")]
    NotRecorded {
        /// Name of the packet that was queried
        packet: &'static str,
        /// Debug rendering of the key that was looked up
        key: String,
    },

    /// A method context failed an integrity check.
    #[error("Method context #{number} failed integrity check: {message}")]
    Integrity {
        /// 1-based number of the offending context within its archive
        number: u32,
        /// What went wrong
        message: String,
    },

    /// The table of contents was built for a different version of the archive.
    #[error("Stale table of contents - built for {expected} bytes, archive has {actual}")]
    StaleToc {
        /// Archive length recorded in the table of contents
        expected: u64,
        /// Actual archive length
        actual: u64,
    },

    /// A `.mcl` range list is malformed.
    #[error("Invalid .mcl list at line {line}: {message}")]
    InvalidMcl {
        /// 1-based line number of the offending entry
        line: usize,
        /// What went wrong
        message: String,
    },

    /// Invalid operator input.
    #[error("{0}")]
    InvalidArgument(String),

    /// An exception raised by the execution engine, re-raised on replay with the same code.
    #[error("EE exception 0x{0:08X}")]
    EeException(u32),

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,

    /// Unrecoverable engine state.
    #[error("Fatal - {0}")]
    Fatal(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

impl Error {
    /// Classifies this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Malformed { .. } | Error::OutOfBounds => ErrorKind::FormatError,
            Error::NotRecorded { .. } => ErrorKind::NotRecorded,
            Error::Integrity { .. } | Error::StaleToc { .. } => ErrorKind::IntegrityError,
            Error::FileError(_) => ErrorKind::Io,
            Error::InvalidMcl { .. } | Error::InvalidArgument(_) => ErrorKind::UserInput,
            Error::EeException(_) => ErrorKind::EeException,
            Error::LockError | Error::Fatal(_) | Error::Error(_) => ErrorKind::Fatal,
        }
    }

    /// Returns true for a replay lookup miss.
    #[must_use]
    pub fn is_not_recorded(&self) -> bool {
        self.kind() == ErrorKind::NotRecorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(malformed_error!("bad").kind(), ErrorKind::FormatError);
        assert_eq!(Error::OutOfBounds.kind(), ErrorKind::FormatError);
        assert_eq!(
            not_recorded!("GetMethodAttribs", 0x10_u64).kind(),
            ErrorKind::NotRecorded
        );
        assert_eq!(
            Error::StaleToc {
                expected: 1,
                actual: 2
            }
            .kind(),
            ErrorKind::IntegrityError
        );
        assert_eq!(
            Error::InvalidMcl {
                line: 1,
                message: String::new()
            }
            .kind(),
            ErrorKind::UserInput
        );
        assert_eq!(Error::EeException(5).kind(), ErrorKind::EeException);
        assert_eq!(Error::Fatal("x".into()).kind(), ErrorKind::Fatal);
    }

    #[test]
    fn malformed_carries_location() {
        let err = malformed_error!("Unknown packet {}", 7);
        match err {
            Error::Malformed {
                message,
                file,
                line,
            } => {
                assert_eq!(message, "Unknown packet 7");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            _ => panic!("expected Malformed"),
        }
    }

    #[test]
    fn not_recorded_display() {
        let err = not_recorded!("ResolveToken", (1_u32, 2_u32));
        assert_eq!(err.to_string(), "No ResolveToken record for key (1, 2)");
        assert!(err.is_not_recorded());
    }
}
