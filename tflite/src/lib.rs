//! # lucid-tflite
//!
//! Decodes TensorFlow Lite (`TFL3`) flatbuffers into lucid's graph model.
//!
//! Builtin operator options are read through the `field` layout declared in the bundled
//! operator metadata, so supporting the options of a new builtin is a metadata change.
//! `If`, `While` and `CallOnce` keep their sub-graphs as graph references.

#[macro_use]
extern crate log;

pub mod model;
pub mod schema;

pub use model::Tflite;

use lucid_core::internal::*;

pub const TFLITE: Format = Format::new("tflite", "TensorFlow Lite");

pub fn tflite() -> Tflite {
    Tflite
}

impl Tflite {
    /// The operator table shipped with this crate.
    pub fn metadata(&self) -> FormatMetadata {
        FormatMetadata::parse(TFLITE, self.bundled_metadata().unwrap_or("[]")).unwrap_or_else(|e| {
            warn!("Bundled TensorFlow Lite metadata is malformed: {e}");
            FormatMetadata::empty(TFLITE)
        })
    }
}

pub mod prelude {
    pub use crate::{TFLITE, tflite};
    pub use lucid_core::internal::FormatMetadata;
    pub use lucid_core::prelude::*;
}
