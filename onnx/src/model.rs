use crate::pb;
use crate::pb::attribute_proto::AttributeType;
use crate::tensor;
use lucid_core::internal::*;
use prost::Message;

/// Newest IR version this decoder knows about.
pub const MAX_IR_VERSION: i64 = 11;

#[derive(Clone)]
pub struct ParsingContext<'a> {
    pub lower: &'a LowerContext<'a>,
    pub model: &'a pb::ModelProto,
    pub parent_graphs: Vec<&'a pb::GraphProto>,
}

impl<'a> ParsingContext<'a> {
    pub fn parse_graph(&self, graph: &'a pb::GraphProto) -> LucidResult<RawGraph> {
        if self.parent_graphs.len() >= self.lower.options.max_graph_depth {
            return Err(DecodeError::limit(
                crate::ONNX,
                format!("graph {:?} nested deeper than {}", graph.name, self.lower.options.max_graph_depth),
            )
            .into());
        }
        let mut ctx = self.clone();
        ctx.parent_graphs.push(graph);
        let mut raw = RawGraph { name: non_empty(&graph.name), ..RawGraph::default() };
        for input in &graph.input {
            trace!("Input: {}", input.name);
            raw.values.push(tensor::value_info(input));
            raw.inputs.push(ValueRef::named(&input.name));
        }
        for init in &graph.initializer {
            let value = tensor::raw_value(init).context(format!("initializer {:?}", init.name))?;
            trace!("Initializer: {:?} {:?}", value.name, value.datum_type);
            raw.values.push(value);
        }
        raw.annotations = graph.value_info.iter().chain(graph.output.iter()).map(tensor::value_info).collect();
        for pbnode in &graph.node {
            self.lower.cancel.check()?;
            raw.nodes.push(ctx.parse_node(pbnode)?);
        }
        raw.outputs = graph.output.iter().map(|o| ValueRef::named(&o.name)).collect();
        Ok(raw)
    }

    fn parse_node(&self, pbnode: &'a pb::NodeProto) -> LucidResult<RawNode> {
        trace!("Creating node {:?} ({})", pbnode.name, pbnode.op_type);
        let mut attributes = Vec::with_capacity(pbnode.attribute.len());
        for attr in &pbnode.attribute {
            let value = self
                .parse_attribute(attr)
                .context(format!("attribute {:?} of node {:?}", attr.name, pbnode.name))?;
            match value {
                Some(value) => attributes.push(RawAttribute::new(&attr.name, value)),
                None => warn!("Skipping attribute {:?} of {:?}: unsupported type", attr.name, pbnode.name),
            }
        }
        let domain = non_empty(&pbnode.domain).filter(|d| d != "ai.onnx");
        Ok(RawNode {
            op_type: pbnode.op_type.clone(),
            name: non_empty(&pbnode.name),
            domain,
            inputs: pbnode.input.iter().map(|i| RawPort::of(ValueRef::name_or_absent(i))).collect(),
            outputs: pbnode.output.iter().map(|o| RawPort::of(ValueRef::name_or_absent(o))).collect(),
            attributes,
            control_inputs: vec![],
        })
    }

    fn parse_attribute(&self, attr: &'a pb::AttributeProto) -> LucidResult<Option<RawAttr>> {
        if !attr.ref_attr_name.is_empty() {
            return Ok(Some(RawAttr::String(format!("@{}", attr.ref_attr_name))));
        }
        let string = |s: &[u8]| String::from_utf8_lossy(s).into_owned();
        let value = match attribute_type(attr) {
            AttributeType::Float => RawAttr::Float(attr.f as f64),
            AttributeType::Int => RawAttr::Int(attr.i),
            AttributeType::String => RawAttr::String(string(&attr.s)),
            AttributeType::Floats => RawAttr::Floats(attr.floats.iter().map(|f| *f as f64).collect()),
            AttributeType::Ints => RawAttr::Ints(attr.ints.clone()),
            AttributeType::Strings => RawAttr::Strings(attr.strings.iter().map(|s| string(s)).collect()),
            AttributeType::Tensor => match &attr.t {
                Some(t) => RawAttr::Tensor(Box::new(tensor::raw_value(t)?)),
                None => return Err(DecodeError::missing(crate::ONNX, "tensor value").into()),
            },
            AttributeType::Graph => match &attr.g {
                Some(g) => RawAttr::Graph(GraphRef::Inline(Box::new(self.parse_graph(g)?))),
                None => return Err(DecodeError::missing(crate::ONNX, "graph value").into()),
            },
            AttributeType::Graphs => RawAttr::Graphs(
                attr.graphs
                    .iter()
                    .map(|g| Ok(GraphRef::Inline(Box::new(self.parse_graph(g)?))))
                    .collect::<LucidResult<_>>()?,
            ),
            AttributeType::TypeProto
            | AttributeType::Tensors
            | AttributeType::SparseTensor
            | AttributeType::SparseTensors
            | AttributeType::TypeProtos
            | AttributeType::Undefined => return Ok(None),
        };
        Ok(Some(value))
    }
}

/// Declared type, or the populated field for IR versions that did not declare it.
fn attribute_type(attr: &pb::AttributeProto) -> AttributeType {
    match AttributeType::from_i32(attr.r#type) {
        Some(t) if t != AttributeType::Undefined => t,
        _ if attr.t.is_some() => AttributeType::Tensor,
        _ if attr.g.is_some() => AttributeType::Graph,
        _ if !attr.floats.is_empty() => AttributeType::Floats,
        _ if !attr.ints.is_empty() => AttributeType::Ints,
        _ if !attr.strings.is_empty() => AttributeType::Strings,
        _ if !attr.graphs.is_empty() => AttributeType::Graphs,
        _ if !attr.s.is_empty() => AttributeType::String,
        _ if attr.f != 0.0 => AttributeType::Float,
        _ => AttributeType::Int,
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

impl ProtoModel for pb::ModelProto {
    fn lower(&self, lower: &LowerContext) -> LucidResult<RawModel> {
        let graph = self.graph.as_ref().ok_or_else(|| DecodeError::missing(crate::ONNX, "graph"))?;
        let ctx = ParsingContext { lower, model: self, parent_graphs: vec![] };
        let mut graphs = vec![ctx.parse_graph(graph)?];
        for function in &self.functions {
            lower.cancel.check()?;
            graphs.push(ctx.parse_function(function)?);
        }
        let mut properties = vec![];
        if !self.domain.is_empty() {
            properties.push(("domain".to_string(), self.domain.clone()));
        }
        if self.model_version != 0 {
            properties.push(("model_version".to_string(), self.model_version.to_string()));
        }
        for opset in &self.opset_import {
            let domain = if opset.domain.is_empty() { "ai.onnx" } else { opset.domain.as_str() };
            properties.push((format!("opset:{domain}"), opset.version.to_string()));
        }
        properties.extend(self.metadata_props.iter().map(|p| (p.key.clone(), p.value.clone())));
        let producer = match (self.producer_name.as_str(), self.producer_version.as_str()) {
            ("", _) => None,
            (name, "") => Some(name.to_string()),
            (name, version) => Some(format!("{name} {version}")),
        };
        Ok(RawModel {
            producer,
            version: Some(format!("ONNX v{}", self.ir_version)),
            description: non_empty(&self.doc_string),
            properties,
            graphs,
            ..RawModel::new(crate::ONNX)
        })
    }
}

impl<'a> ParsingContext<'a> {
    /// A model-local function is shown as its own top-level graph.
    fn parse_function(&self, function: &'a pb::FunctionProto) -> LucidResult<RawGraph> {
        let name = if function.domain.is_empty() {
            function.name.clone()
        } else {
            format!("{}.{}", function.domain, function.name)
        };
        let mut raw = RawGraph { name: Some(name), ..RawGraph::default() };
        raw.inputs = function.input.iter().map(ValueRef::named).collect();
        for pbnode in &function.node {
            self.lower.cancel.check()?;
            raw.nodes.push(self.parse_node(pbnode)?);
        }
        raw.outputs = function.output.iter().map(ValueRef::named).collect();
        Ok(raw)
    }
}

static CLAIM: Claim = Claim {
    format: crate::ONNX,
    signatures: &[Signature::At {
        offset: 0,
        tokens: &[Token::Byte(0x08), Token::Varint, Token::OneOf(&[0x12, 0x1a, 0x22, 0x28, 0x32, 0x3a, 0x42])],
    }],
    extensions: &["onnx", "pb"],
    filenames: &[],
};

#[derive(Clone, Debug, Default)]
pub struct Onnx;

impl Framework for Onnx {
    type ProtoModel = pb::ModelProto;

    fn claim(&self) -> &'static Claim {
        &CLAIM
    }

    fn bundled_metadata(&self) -> Option<&'static str> {
        Some(include_str!("onnx-metadata.json"))
    }

    fn proto_model_for_bytes(&self, bytes: &Bytes, _options: &Options) -> LucidResult<pb::ModelProto> {
        let model = pb::ModelProto::decode(bytes.clone()).map_err(|e| DecodeError::protobuf(crate::ONNX, e))?;
        if model.ir_version > MAX_IR_VERSION {
            return Err(DecodeError::unsupported_version(crate::ONNX, model.ir_version).into());
        }
        if model.graph.is_none() {
            return Err(DecodeError::missing(crate::ONNX, "graph").into());
        }
        Ok(model)
    }
}
