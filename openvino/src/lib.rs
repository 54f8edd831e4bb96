//! # lucid-openvino
//!
//! Decodes OpenVINO IR network descriptions (the `.xml` half of an IR pair) into lucid's
//! graph model. Weights live in the companion `.bin` file and are not read: blob and
//! constant offsets are kept as attributes.

#[macro_use]
extern crate log;

pub mod ir;
pub mod model;
pub mod xml;

pub use model::Openvino;

use lucid_core::internal::*;

pub const OPENVINO: Format = Format::new("openvino", "OpenVINO IR");

pub fn openvino() -> Openvino {
    Openvino
}

impl Openvino {
    /// The operator table shipped with this crate.
    pub fn metadata(&self) -> FormatMetadata {
        FormatMetadata::parse(OPENVINO, self.bundled_metadata().unwrap_or("[]")).unwrap_or_else(|e| {
            warn!("Bundled OpenVINO metadata is malformed: {e}");
            FormatMetadata::empty(OPENVINO)
        })
    }
}

pub mod prelude {
    pub use crate::{OPENVINO, openvino};
    pub use lucid_core::internal::FormatMetadata;
    pub use lucid_core::prelude::*;
}
