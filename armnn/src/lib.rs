//! # lucid-armnn
//!
//! Decodes Arm NN serialized graphs (`ARMN` flatbuffers) into lucid's graph model.
//!
//! Every layer output slot is an anonymous tensor, named after its producing layer by the
//! graph builder. Input and output layers become the graph boundary, constant layers and the
//! weight tensors embedded in layer tables become initializers.

#[macro_use]
extern crate log;

pub mod model;
pub mod schema;

pub use model::Armnn;

use lucid_core::internal::*;

pub const ARMNN: Format = Format::new("armnn", "Arm NN");

pub fn armnn() -> Armnn {
    Armnn
}

impl Armnn {
    /// The layer table shipped with this crate.
    pub fn metadata(&self) -> FormatMetadata {
        FormatMetadata::parse(ARMNN, self.bundled_metadata().unwrap_or("[]")).unwrap_or_else(|e| {
            warn!("Bundled Arm NN metadata is malformed: {e}");
            FormatMetadata::empty(ARMNN)
        })
    }
}

pub mod prelude {
    pub use crate::{ARMNN, armnn};
    pub use lucid_core::internal::FormatMetadata;
    pub use lucid_core::prelude::*;
}
