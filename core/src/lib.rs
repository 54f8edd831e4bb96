//! # lucid-core
//!
//! The format-independent half of lucid: format sniffing, the framework trait each decoder
//! implements, the operator metadata registry, and the unified graph model every decoder
//! produces.
//!
//! A decoder crate parses its wire format into a *proto model*, lowers it to a
//! [`raw::RawModel`], and lets [`builder::build`] turn that into a checked [`model::Model`]:
//!
//! ```
//! use lucid_core::internal::*;
//!
//! let mut graph = RawGraph::default();
//! graph.inputs.push(ValueRef::named("x"));
//! graph.nodes.push(RawNode {
//!     op_type: "Relu".into(),
//!     inputs: vec![RawPort::named("x")],
//!     outputs: vec![RawPort::named("y")],
//!     ..RawNode::default()
//! });
//! graph.outputs.push(ValueRef::named("y"));
//! let raw = RawModel { graphs: vec![graph], ..RawModel::new(Format::new("demo", "Demo")) };
//!
//! let metadata = FormatMetadata::empty(raw.format);
//! let model = build(raw, &metadata, &Options::default(), &Cancel::default()).unwrap();
//! assert_eq!(model.main().nodes().len(), 1);
//! ```

#[macro_use]
extern crate derive_new;
#[macro_use]
extern crate log;

pub mod builder;
pub mod cancel;
pub mod errors;
pub mod flat;
pub mod format;
pub mod framework;
pub mod metadata;
pub mod model;
pub mod options;
pub mod raw;
pub mod sniff;

pub use lucid_data;

pub mod prelude {
    pub use crate::cancel::Cancel;
    pub use crate::errors::{DecodeError, DecodeErrorKind, IoError, LucidError, LucidResult};
    pub use crate::format::Format;
    pub use crate::framework::{Decoder, Framework};
    pub use crate::metadata::{MetadataRegistry, MetadataSource};
    pub use crate::model::{
        AttrValue, Attribute, Graph, GraphId, Model, Node, NodeId, OutletId, Port, Tensor,
        TensorId, TensorKind, TensorValue,
    };
    pub use crate::options::Options;
    pub use lucid_data::prelude::*;
}

pub mod internal {
    pub use crate::builder::build;
    pub use crate::errors::{DecodeResult, DecodeResultExt};
    pub use crate::flat::{schema_attributes, struct_field, voffset, AnyTable, FlatBuffer, InlineStruct, Table};
    pub use crate::framework::{LowerContext, ProtoModel};
    pub use crate::metadata::{
        AttributeSchema, Bundled, FormatMetadata, Lookup, OpDescriptor, PortSchema,
    };
    pub use crate::prelude::*;
    pub use crate::raw::{
        GraphRef, RawAttr, RawAttribute, RawGraph, RawModel, RawNode, RawPort, RawValue, ValueRef,
    };
    pub use crate::sniff::{Claim, Signature, Token};
    pub use itertools::Itertools;
    pub use lucid_data::internal::*;
    pub use std::borrow::Cow;
    pub use std::collections::HashMap;
    pub use std::sync::Arc;
}
