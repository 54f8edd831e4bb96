//! # lucid-data
//!
//! Element types, dimensions and raw tensor storage shared by every lucid decoder.
//!
//! Nothing here knows about a particular serialization format: decoders translate their
//! own type enums into `DatumType`, their own shape encodings into `Shape`, and hand weight
//! bytes over as `Storage`.

#[macro_use]
mod macros;

mod datum;
mod dim;
mod quant;
mod storage;

/// A Smallvec instantiation with 4 embeddable values.
///
/// Used for tensor dimensions, which are rarely longer than four.
pub type TVec<T> = smallvec::SmallVec<[T; 4]>;

pub use bytes;
pub use half::f16;

pub mod prelude {
    pub use crate::TVec;
    pub use crate::datum::{Blob, Datum, DatumType};
    pub use crate::dim::{Dim, Shape};
    pub use crate::quant::Quantization;
    pub use crate::storage::Storage;
    pub use crate::tvec;
    pub use half::f16;
}

pub mod internal {
    pub use crate::prelude::*;
    pub use bytes::Bytes;
    pub use smallvec as lucid_smallvec;
}
