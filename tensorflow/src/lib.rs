//! # lucid-tensorflow
//!
//! Decodes frozen TensorFlow `GraphDef` files into lucid's graph model.
//!
//! ## Example
//!
//! ```
//! use lucid_tensorflow::prelude::*;
//! use lucid_tensorflow::tfpb::*;
//! use prost::Message;
//!
//! let bytes = graph()
//!     .node(node().name("x").op("Placeholder").attr("dtype", DataType::DtFloat))
//!     .node(node().name("y").op("Relu").input("x"))
//!     .encode_to_vec();
//!
//! let tf = tensorflow();
//! let model = tf
//!     .model_for_bytes(&bytes.into(), &tf.metadata(), &Options::default(), &Cancel::default())
//!     .unwrap();
//! assert_eq!(model.main().nodes().len(), 1);
//! ```

#[macro_use]
extern crate log;

pub mod model;
pub mod tensor;
pub mod tfpb;

pub use model::Tensorflow;

use lucid_core::internal::*;

pub const TENSORFLOW: Format = Format::new("tensorflow", "TensorFlow");

pub fn tensorflow() -> Tensorflow {
    Tensorflow
}

impl Tensorflow {
    /// The operator table shipped with this crate.
    pub fn metadata(&self) -> FormatMetadata {
        FormatMetadata::parse(TENSORFLOW, self.bundled_metadata().unwrap_or("[]")).unwrap_or_else(|e| {
            warn!("Bundled TensorFlow metadata is malformed: {e}");
            FormatMetadata::empty(TENSORFLOW)
        })
    }
}

pub mod prelude {
    pub use crate::{TENSORFLOW, tensorflow};
    pub use lucid_core::internal::FormatMetadata;
    pub use lucid_core::prelude::*;
}
