//! # lucid-onnx
//!
//! Decodes ONNX `ModelProto` files into lucid's graph model.
//!
//! ```no_run
//! use lucid_onnx::prelude::*;
//!
//! let bytes = std::fs::read("model.onnx").unwrap();
//! let onnx = onnx();
//! let metadata = onnx.metadata();
//! let model = onnx
//!     .model_for_bytes(&bytes.into(), &metadata, &Options::default(), &Cancel::default())
//!     .unwrap();
//! println!("{} nodes", model.main().nodes().len());
//! ```
#[macro_use]
extern crate log;

pub mod model;
pub mod pb;
pub mod tensor;

pub use model::Onnx;

use lucid_core::internal::*;

pub const ONNX: Format = Format::new("onnx", "ONNX");

pub fn onnx() -> Onnx {
    Onnx
}

impl Onnx {
    /// The operator table shipped with this crate.
    pub fn metadata(&self) -> FormatMetadata {
        FormatMetadata::parse(ONNX, self.bundled_metadata().unwrap_or("[]")).unwrap_or_else(|e| {
            warn!("Bundled ONNX metadata is malformed: {e}");
            FormatMetadata::empty(ONNX)
        })
    }
}

pub mod prelude {
    pub use crate::{ONNX, onnx};
    pub use lucid_core::prelude::*;
    pub use lucid_core::internal::FormatMetadata;
}
