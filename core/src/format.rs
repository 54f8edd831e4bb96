use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Tag of a serialization format.
///
/// The set is open: every decoder crate declares its own constant. Two tags are the same
/// format when their ids are equal.
#[derive(Clone, Copy, Debug)]
pub struct Format {
    /// Stable identifier (`onnx`, `tflite`...).
    pub id: &'static str,
    /// Human readable framework name.
    pub name: &'static str,
}

impl Format {
    pub const fn new(id: &'static str, name: &'static str) -> Format {
        Format { id, name }
    }
}

impl PartialEq for Format {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Format {}

impl Hash for Format {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialOrd for Format {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Format {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(other.id)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name)
    }
}
