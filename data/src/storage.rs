use crate::datum::{Blob, Datum, DatumType};
use bytes::Bytes;
use itertools::Itertools;
use std::fmt;

/// Initializer payload, kept in the little-endian layout every supported format uses.
///
/// `Raw` usually shares the buffer the model was decoded from.
#[derive(Clone, PartialEq, Eq)]
pub enum Storage {
    Raw(Bytes),
    Strings(Vec<Blob>),
    /// Data living outside the model file. It is never read.
    External { location: String, offset: Option<u64>, length: Option<u64> },
}

impl Storage {
    pub fn raw(bytes: impl Into<Bytes>) -> Storage {
        Storage::Raw(bytes.into())
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Storage::Raw(b) => Some(b),
            _ => None,
        }
    }

    /// Payload size in bytes, as far as it is known.
    pub fn byte_len(&self) -> Option<u64> {
        match self {
            Storage::Raw(b) => Some(b.len() as u64),
            Storage::Strings(s) => Some(s.iter().map(|b| b.len() as u64).sum()),
            Storage::External { length, .. } => *length,
        }
    }

    /// Decodes at most `limit` values of type `T`.
    ///
    /// Returns None for non raw storage. Trailing bytes that do not make a full value are
    /// ignored.
    pub fn values<T: Datum>(&self, limit: usize) -> Option<Vec<T>> {
        let bytes = self.as_bytes()?;
        let size = std::mem::size_of::<T>();
        Some(bytes.chunks_exact(size).take(limit).map(T::read_le).collect())
    }

    fn render_values<T: Datum>(&self, limit: usize) -> Option<String> {
        let values = self.values::<T>(limit)?;
        let total = self.as_bytes()?.len() / std::mem::size_of::<T>();
        let mut s = values.iter().join(", ");
        if total > values.len() {
            s.push_str(", ...");
        }
        Some(format!("[{s}]"))
    }

    /// Short textual rendering of the first `limit` values, for display.
    pub fn render(&self, datum_type: DatumType, limit: usize) -> Option<String> {
        match self {
            Storage::Strings(strings) => {
                let mut s = strings.iter().take(limit).join(", ");
                if strings.len() > limit {
                    s.push_str(", ...");
                }
                Some(format!("[{s}]"))
            }
            Storage::External { .. } => None,
            Storage::Raw(_) => dispatch_copy!(Self::render_values(datum_type)(self, limit)).flatten(),
        }
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Storage::Raw(b) => write!(f, "Raw({} bytes)", b.len()),
            Storage::Strings(s) => write!(f, "Strings({} items)", s.len()),
            Storage::External { location, offset, length } => {
                write!(f, "External({location:?}, offset: {offset:?}, length: {length:?})")
            }
        }
    }
}
