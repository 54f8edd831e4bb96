//! Error types returned at the lucid boundary.
use crate::format::Format;
use crate::model::GraphId;
use itertools::Itertools;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeErrorKind {
    /// The bytes do not start the way the format requires.
    MalformedHeader,
    /// A version field is outside the range this decoder understands.
    UnsupportedVersion,
    /// The input ends before a declared length or offset.
    Truncated,
    Malformed,
    MissingField,
    /// Nesting or size goes beyond a configured limit.
    LimitExceeded,
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            DecodeErrorKind::MalformedHeader => "malformed header",
            DecodeErrorKind::UnsupportedVersion => "unsupported version",
            DecodeErrorKind::Truncated => "truncated input",
            DecodeErrorKind::Malformed => "malformed content",
            DecodeErrorKind::MissingField => "missing field",
            DecodeErrorKind::LimitExceeded => "limit exceeded",
        };
        f.write_str(s)
    }
}

fn at_offset(offset: &Option<usize>) -> String {
    offset.map(|o| format!(" at offset {o}")).unwrap_or_default()
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {format} model, {kind}{}: {message}", at_offset(.offset))]
pub struct DecodeError {
    pub format: Format,
    pub kind: DecodeErrorKind,
    pub offset: Option<usize>,
    pub message: String,
}

impl DecodeError {
    pub fn new(format: Format, kind: DecodeErrorKind, message: impl Into<String>) -> DecodeError {
        DecodeError { format, kind, offset: None, message: message.into() }
    }

    pub fn malformed(format: Format, message: impl Into<String>) -> DecodeError {
        DecodeError::new(format, DecodeErrorKind::Malformed, message)
    }

    pub fn truncated(format: Format, message: impl Into<String>) -> DecodeError {
        DecodeError::new(format, DecodeErrorKind::Truncated, message)
    }

    pub fn missing(format: Format, field: impl fmt::Display) -> DecodeError {
        DecodeError::new(format, DecodeErrorKind::MissingField, format!("missing {field}"))
    }

    pub fn unsupported_version(format: Format, version: impl fmt::Display) -> DecodeError {
        DecodeError::new(
            format,
            DecodeErrorKind::UnsupportedVersion,
            format!("unsupported version {version}"),
        )
    }

    pub fn limit(format: Format, message: impl Into<String>) -> DecodeError {
        DecodeError::new(format, DecodeErrorKind::LimitExceeded, message)
    }

    /// Classifies a protobuf decoder failure from its message.
    ///
    /// `prost` 0.11 has no error kinds: running out of input reads "buffer underflow" and
    /// nesting past its limit reads "recursion limit reached". Both texts are pinned by the
    /// decoder tests of the protobuf formats, so a `prost` upgrade that rewords them fails there.
    pub fn protobuf(format: Format, error: impl fmt::Display) -> DecodeError {
        let message = error.to_string();
        let lower = message.to_ascii_lowercase();
        let kind = if lower.contains("underflow")
            || lower.contains("length exceeded")
            || lower.contains("unexpected end")
        {
            DecodeErrorKind::Truncated
        } else if lower.contains("recursion limit") {
            DecodeErrorKind::LimitExceeded
        } else {
            DecodeErrorKind::Malformed
        };
        DecodeError::new(format, kind, message)
    }

    pub fn at(mut self, offset: usize) -> DecodeError {
        self.offset = Some(offset);
        self
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;

pub trait DecodeResultExt: Sized {
    /// Prefixes the decode error message with what was being decoded.
    fn context(self, what: impl fmt::Display) -> Self;
}

impl<T> DecodeResultExt for DecodeResult<T> {
    fn context(self, what: impl fmt::Display) -> Self {
        self.map_err(|mut e| {
            e.message = format!("{what}: {}", e.message);
            e
        })
    }
}

impl<T> DecodeResultExt for Result<T, LucidError> {
    fn context(self, what: impl fmt::Display) -> Self {
        self.map_err(|e| match e {
            LucidError::Decode(mut e) => {
                e.message = format!("{what}: {}", e.message);
                LucidError::Decode(e)
            }
            other => other,
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LucidError {
    #[error("Unrecognized model format{}", .filename.as_ref().map(|f| format!(" for '{f}'")).unwrap_or_default())]
    UnrecognizedFormat { filename: Option<String> },
    #[error("Ambiguous model format, could be any of: {}", .candidates.iter().join(", "))]
    AmbiguousFormat { candidates: Vec<Format> },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Broken graph #{graph}, reference to {reference}: {reason}")]
    GraphIntegrity { graph: GraphId, reference: String, reason: String },
    #[error("Decoding cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] IoError),
}

/// An I/O failure while reading a model, compared by its kind.
#[derive(Error, Debug, Clone)]
#[error(transparent)]
pub struct IoError(pub Arc<std::io::Error>);

impl IoError {
    pub fn kind(&self) -> std::io::ErrorKind {
        self.0.kind()
    }
}

impl PartialEq for IoError {
    fn eq(&self, other: &IoError) -> bool {
        self.kind() == other.kind()
    }
}

impl From<std::io::Error> for LucidError {
    fn from(e: std::io::Error) -> LucidError {
        LucidError::Io(IoError(Arc::new(e)))
    }
}

impl LucidError {
    pub fn integrity(graph: GraphId, reference: impl Into<String>, reason: impl Into<String>) -> Self {
        LucidError::GraphIntegrity { graph, reference: reference.into(), reason: reason.into() }
    }

    /// The format the error was raised for, when one was selected.
    pub fn format(&self) -> Option<Format> {
        match self {
            LucidError::Decode(e) => Some(e.format),
            _ => None,
        }
    }

    /// True when the input is valid but beyond what lucid handles, false when it is corrupt.
    pub fn is_unsupported(&self) -> bool {
        match self {
            LucidError::UnrecognizedFormat { .. } | LucidError::AmbiguousFormat { .. } => true,
            LucidError::Decode(e) => e.kind == DecodeErrorKind::UnsupportedVersion,
            _ => false,
        }
    }
}

pub type LucidResult<T> = Result<T, LucidError>;

#[cfg(test)]
mod tests {
    use super::*;

    const FMT: Format = Format::new("demo", "Demo");

    #[test]
    fn display() {
        let e = DecodeError::truncated(FMT, "tensor data").at(12);
        assert_eq!(e.to_string(), "Invalid Demo model, truncated input at offset 12: tensor data");
        let e = LucidError::UnrecognizedFormat { filename: Some("a.bin".into()) };
        assert_eq!(e.to_string(), "Unrecognized model format for 'a.bin'");
    }

    #[test]
    fn protobuf_classification() {
        assert_eq!(
            DecodeError::protobuf(FMT, "failed to decode Protobuf message: buffer underflow").kind,
            DecodeErrorKind::Truncated
        );
        assert_eq!(
            DecodeError::protobuf(FMT, "failed to decode Protobuf message: recursion limit reached")
                .kind,
            DecodeErrorKind::LimitExceeded
        );
        assert_eq!(
            DecodeError::protobuf(FMT, "invalid wire type value: 7").kind,
            DecodeErrorKind::Malformed
        );
    }

    #[test]
    fn unsupported_vs_corrupt() {
        let unsupported: LucidError = DecodeError::unsupported_version(FMT, 99).into();
        assert!(unsupported.is_unsupported());
        assert_eq!(unsupported.format(), Some(FMT));
        let corrupt: LucidError = DecodeError::malformed(FMT, "bad").into();
        assert!(!corrupt.is_unsupported());
    }

    #[test]
    fn io_errors_keep_their_kind() {
        let e: LucidError = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file").into();
        assert!(matches!(&e, LucidError::Io(io) if io.kind() == std::io::ErrorKind::NotFound));
        assert_eq!(e.to_string(), "no such file");
        assert_eq!(e.format(), None);
        assert!(!e.is_unsupported());
    }

    #[test]
    fn context_prefixes() {
        let r: DecodeResult<()> = Err(DecodeError::missing(FMT, "graph"));
        assert_eq!(r.context("model").unwrap_err().message, "model: missing graph");
    }
}
