//! # lucid-paddle
//!
//! Decodes PaddlePaddle inference programs (`__model__`, `*.pdmodel`) into lucid's graph
//! model. Each program block becomes a graph; `feed` and `fetch` operators become the
//! main graph's inputs and outputs.
//!
//! Parameters are stored in separate files and are not read: persistable variables come
//! out as initializers with external storage.

#[macro_use]
extern crate log;

pub mod model;
pub mod proto;

pub use model::Paddle;

use lucid_core::internal::*;

pub const PADDLE: Format = Format::new("paddle", "PaddlePaddle");

pub fn paddle() -> Paddle {
    Paddle
}

impl Paddle {
    /// The operator table shipped with this crate.
    pub fn metadata(&self) -> FormatMetadata {
        FormatMetadata::parse(PADDLE, self.bundled_metadata().unwrap_or("[]")).unwrap_or_else(|e| {
            warn!("Bundled PaddlePaddle metadata is malformed: {e}");
            FormatMetadata::empty(PADDLE)
        })
    }
}

pub mod prelude {
    pub use crate::{PADDLE, paddle};
    pub use lucid_core::internal::FormatMetadata;
    pub use lucid_core::prelude::*;
}
