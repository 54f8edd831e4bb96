//! Normalized decoder output, before name resolution and checking.
//!
//! Decoders describe what they read in terms of names and indices, the way their formats
//! do. The builder resolves those references into a [`crate::model::Model`].
use crate::format::Format;
use lucid_data::prelude::*;

/// Reference from a node port or graph boundary to a value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueRef {
    /// By name, looked up in the current graph then in enclosing graphs.
    Named(String),
    /// By position in the graph's `values`.
    Index(usize),
    /// An optional input that was left out. It keeps its position.
    Absent,
}

impl ValueRef {
    pub fn named(name: impl Into<String>) -> ValueRef {
        ValueRef::Named(name.into())
    }

    /// Empty names mean absent, as in ONNX optional inputs.
    pub fn name_or_absent(name: &str) -> ValueRef {
        if name.is_empty() { ValueRef::Absent } else { ValueRef::Named(name.to_string()) }
    }

    /// Negative indices mean absent, as in TFLite.
    pub fn index_or_absent(index: i64) -> ValueRef {
        if index < 0 { ValueRef::Absent } else { ValueRef::Index(index as usize) }
    }
}

/// A declared value: type, shape, data.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawValue {
    pub name: Option<String>,
    pub datum_type: Option<DatumType>,
    pub shape: Option<Shape>,
    pub storage: Option<Storage>,
    pub quantization: Option<Quantization>,
}

impl RawValue {
    pub fn named(name: impl Into<String>) -> RawValue {
        RawValue { name: Some(name.into()), ..RawValue::default() }
    }

    pub fn with_type(self, datum_type: DatumType) -> RawValue {
        RawValue { datum_type: Some(datum_type), ..self }
    }

    pub fn with_shape(self, shape: Shape) -> RawValue {
        RawValue { shape: Some(shape), ..self }
    }

    pub fn with_storage(self, storage: Storage) -> RawValue {
        RawValue { storage: Some(storage), ..self }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawPort {
    pub parameter: Option<String>,
    pub value: ValueRef,
}

impl RawPort {
    pub fn named(name: impl Into<String>) -> RawPort {
        RawPort { parameter: None, value: ValueRef::named(name) }
    }

    pub fn index(index: usize) -> RawPort {
        RawPort { parameter: None, value: ValueRef::Index(index) }
    }

    pub fn of(value: ValueRef) -> RawPort {
        RawPort { parameter: None, value }
    }

    pub fn with_parameter(self, parameter: impl Into<String>) -> RawPort {
        RawPort { parameter: Some(parameter.into()), ..self }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum GraphRef {
    /// A graph nested in an attribute, built as a child of the current graph.
    Inline(Box<RawGraph>),
    /// One of the model's top-level graphs.
    Index(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub enum RawAttr {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Strings(Vec<String>),
    Bools(Vec<bool>),
    DataType(DatumType),
    Shape(Shape),
    Tensor(Box<RawValue>),
    Graph(GraphRef),
    Graphs(Vec<GraphRef>),
    /// A function or library graph, kept by name.
    Function(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawAttribute {
    pub name: String,
    pub value: RawAttr,
    /// Forced visibility. None lets the descriptor decide.
    pub visible: Option<bool>,
}

impl RawAttribute {
    pub fn new(name: impl Into<String>, value: RawAttr) -> RawAttribute {
        RawAttribute { name: name.into(), value, visible: None }
    }

    pub fn hidden(self) -> RawAttribute {
        RawAttribute { visible: Some(false), ..self }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawNode {
    pub op_type: String,
    pub name: Option<String>,
    pub domain: Option<String>,
    pub inputs: Vec<RawPort>,
    pub outputs: Vec<RawPort>,
    pub attributes: Vec<RawAttribute>,
    /// Names of nodes that must run before this one.
    pub control_inputs: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawGraph {
    pub name: Option<String>,
    /// Lexical parent among the model's top-level graphs.
    pub parent: Option<usize>,
    pub values: Vec<RawValue>,
    /// Type and shape hints for values that may be declared later (ONNX `value_info`).
    pub annotations: Vec<RawValue>,
    pub inputs: Vec<ValueRef>,
    pub outputs: Vec<ValueRef>,
    pub nodes: Vec<RawNode>,
    /// Names may be written more than once (Paddle in-place ops). Each write then creates a
    /// new tensor and later reads see the latest one.
    pub rebinding: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawModel {
    pub format: Format,
    pub producer: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub properties: Vec<(String, String)>,
    /// Graph 0 is the main graph.
    pub graphs: Vec<RawGraph>,
}

impl RawModel {
    pub fn new(format: Format) -> RawModel {
        RawModel {
            format,
            producer: None,
            version: None,
            description: None,
            properties: vec![],
            graphs: vec![],
        }
    }
}
