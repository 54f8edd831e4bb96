//! # lucid
//!
//! One entry point over every lucid decoder. [`Lucid`] maps the format sniffed from a file
//! to its decoder, and decodes with the operator metadata of the process-wide registry.
//!
//! ```no_run
//! let model = lucid::open("mobilenet.onnx")?;
//! for node in model.main().nodes() {
//!     println!("{node}");
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! Decoding is synchronous and every type here is `Send + Sync`: independent files may be
//! decoded from as many threads as needed.

#[macro_use]
extern crate log;

use std::fmt::{self, Debug};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use anyhow::Context;
use bytes::Bytes;
use lucid_core::internal::*;
use lucid_core::sniff::sniff;

pub use lucid_armnn as armnn;
pub use lucid_onnx as onnx;
pub use lucid_openvino as openvino;
pub use lucid_paddle as paddle;
pub use lucid_tensorflow as tensorflow;
pub use lucid_tflite as tflite;

pub mod prelude {
    pub use crate::{Lucid, install_metadata, metadata, open};
    pub use lucid_armnn::ARMNN;
    pub use lucid_core::prelude::*;
    pub use lucid_onnx::ONNX;
    pub use lucid_openvino::OPENVINO;
    pub use lucid_paddle::PADDLE;
    pub use lucid_tensorflow::TENSORFLOW;
    pub use lucid_tflite::TFLITE;
}

/// lucid version tag
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

static METADATA: OnceLock<Arc<MetadataRegistry>> = OnceLock::new();

/// Every decoder lucid ships, in sniffing order.
fn builtin_decoders() -> Vec<Arc<dyn Decoder>> {
    vec![
        Arc::new(lucid_onnx::onnx()),
        Arc::new(lucid_tensorflow::tensorflow()),
        Arc::new(lucid_tflite::tflite()),
        Arc::new(lucid_armnn::armnn()),
        Arc::new(lucid_paddle::paddle()),
        Arc::new(lucid_openvino::openvino()),
    ]
}

/// A registry serving the tables compiled into `decoders`.
pub fn bundled_registry(decoders: &[Arc<dyn Decoder>]) -> MetadataRegistry {
    let mut bundled = Bundled::default();
    for decoder in decoders {
        if let Some(json) = decoder.metadata_table() {
            bundled = bundled.with(decoder.sniff_claim().format, json);
        }
    }
    MetadataRegistry::new(bundled, decoders.iter().map(|d| d.sniff_claim().format))
}

/// The process-wide metadata registry.
///
/// Unless [`install_metadata`] ran first, the first call creates a registry of the bundled
/// tables. The registry is read-only from then on, and each table loads on first lookup.
pub fn metadata() -> Arc<MetadataRegistry> {
    METADATA.get_or_init(|| Arc::new(bundled_registry(&builtin_decoders()))).clone()
}

/// Replaces the bundled tables with `registry` for the whole process.
///
/// Only possible before the first [`metadata`] call; the registry is handed back otherwise.
pub fn install_metadata(registry: Arc<MetadataRegistry>) -> Result<(), Arc<MetadataRegistry>> {
    METADATA.set(registry)
}

/// Sniffs and decodes a model file with the default [`Lucid`].
pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Model> {
    Lucid::default().open(path)
}

#[derive(Clone)]
pub struct Lucid {
    decoders: Vec<Arc<dyn Decoder>>,
    metadata: Arc<MetadataRegistry>,
    options: Options,
}

impl Default for Lucid {
    fn default() -> Lucid {
        Lucid { decoders: builtin_decoders(), metadata: metadata(), options: Options::default() }
    }
}

impl Debug for Lucid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lucid")
            .field("formats", &self.formats().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

impl Lucid {
    pub fn with_options(self, options: Options) -> Lucid {
        Lucid { options, ..self }
    }

    /// Registers a decoder, replacing the one already registered for its format.
    ///
    /// Operators of a new format are looked up in the registry given to
    /// [`Lucid::with_metadata`].
    pub fn with_framework(mut self, decoder: impl Decoder + 'static) -> Lucid {
        let format = decoder.sniff_claim().format;
        let decoder: Arc<dyn Decoder> = Arc::new(decoder);
        match self.decoders.iter().position(|d| d.sniff_claim().format == format) {
            Some(ix) => self.decoders[ix] = decoder,
            None => self.decoders.push(decoder),
        }
        self
    }

    pub fn with_metadata(self, metadata: Arc<MetadataRegistry>) -> Lucid {
        Lucid { metadata, ..self }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn metadata(&self) -> &MetadataRegistry {
        &self.metadata
    }

    pub fn formats(&self) -> impl Iterator<Item = Format> + '_ {
        self.decoders.iter().map(|d| d.sniff_claim().format)
    }

    pub fn decoder(&self, format: Format) -> Option<&dyn Decoder> {
        self.decoders.iter().find(|d| d.sniff_claim().format == format).map(|d| &**d)
    }

    /// Tells the format of `bytes`, looking at the first `sniff_window` bytes and the
    /// file name.
    pub fn sniff(&self, bytes: &[u8], filename: Option<&str>) -> LucidResult<Format> {
        sniff(self.decoders.iter().map(|d| d.sniff_claim()), bytes, filename, self.options.sniff_window)
    }

    pub fn decode(&self, bytes: impl Into<Bytes>, filename: Option<&str>) -> LucidResult<Model> {
        self.decode_with_cancel(bytes, filename, &Cancel::default())
    }

    pub fn decode_with_cancel(
        &self,
        bytes: impl Into<Bytes>,
        filename: Option<&str>,
        cancel: &Cancel,
    ) -> LucidResult<Model> {
        let bytes = bytes.into();
        let format = self.sniff(&bytes, filename)?;
        self.decode_as(format, &bytes, cancel)
    }

    /// Decodes `bytes` as `format`, skipping the sniffer.
    pub fn decode_as(&self, format: Format, bytes: &Bytes, cancel: &Cancel) -> LucidResult<Model> {
        let decoder = self
            .decoder(format)
            .ok_or_else(|| LucidError::UnrecognizedFormat { filename: None })?;
        let metadata = self.metadata.for_format(format);
        let model = decoder.decode(bytes, &metadata, &self.options, cancel)?;
        debug!("Decoded {format} model, {} graph(s)", model.graphs().len());
        Ok(model)
    }

    pub fn open(&self, path: impl AsRef<Path>) -> anyhow::Result<Model> {
        self.open_with_cancel(path, &Cancel::default())
    }

    pub fn open_with_cancel(&self, path: impl AsRef<Path>, cancel: &Cancel) -> anyhow::Result<Model> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).with_context(|| format!("Reading {}", path.display()))?;
        let filename = path.file_name().and_then(|f| f.to_str());
        let model = self
            .decode_with_cancel(bytes, filename, cancel)
            .with_context(|| format!("Decoding {}", path.display()))?;
        Ok(model)
    }
}
