use crate::tensor;
use crate::tfpb::attr_value::Value;
use crate::tfpb::{AttrValue, FunctionDef, GraphDef, NodeDef};
use lucid_core::internal::*;
use prost::Message;
use std::collections::HashSet;

/// Operators that only exist for their side effects.
const NO_OUTPUT_OPS: &[&str] = &[
    "NoOp",
    "Assert",
    "Save",
    "SaveV2",
    "SaveSlices",
    "AssignVariableOp",
    "AssignAddVariableOp",
    "AssignSubVariableOp",
];

const PLACEHOLDER_OPS: &[&str] = &["Placeholder", "PlaceholderV2"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Input<'a> {
    Data(&'a str, usize),
    Control(&'a str),
}

/// Splits `node`, `node:k` and `^node`. Function bodies also use `node:arg:k`.
fn parse_input(input: &str) -> Input<'_> {
    if let Some(name) = input.strip_prefix('^') {
        return Input::Control(name);
    }
    match input.rsplit_once(':') {
        Some((head, slot)) => match slot.parse::<usize>() {
            Ok(slot) => Input::Data(head.split(':').next().unwrap_or(head), slot),
            Err(_) => Input::Data(head, 0),
        },
        None => Input::Data(input, 0),
    }
}

fn output_name(node: &str, slot: usize) -> String {
    if slot == 0 { node.to_string() } else { format!("{node}:{slot}") }
}

pub struct ParsingContext<'a> {
    pub lower: &'a LowerContext<'a>,
}

impl<'a> ParsingContext<'a> {
    fn parse_nodes(&self, nodes: &[NodeDef], raw: &mut RawGraph) -> LucidResult<Vec<String>> {
        let mut outputs_count: HashMap<&str, usize> = HashMap::new();
        let mut consumed: HashSet<(&str, usize)> = HashSet::new();
        for node in nodes {
            for input in &node.input {
                if let Input::Data(name, slot) = parse_input(input) {
                    let count = outputs_count.entry(name).or_default();
                    *count = (*count).max(slot + 1);
                    consumed.insert((name, slot));
                }
            }
        }
        let placeholders: HashSet<&str> =
            nodes.iter().filter(|n| PLACEHOLDER_OPS.contains(&n.op.as_str())).map(|n| n.name.as_str()).collect();

        let mut graph_outputs = vec![];
        for node in nodes {
            self.lower.cancel.check()?;
            if placeholders.contains(node.name.as_str()) {
                trace!("Input: {}", node.name);
                raw.values.push(placeholder(node));
                raw.inputs.push(ValueRef::named(&node.name));
                continue;
            }
            let minimum = if NO_OUTPUT_OPS.contains(&node.op.as_str()) { 0 } else { 1 };
            let count = outputs_count.get(node.name.as_str()).copied().unwrap_or(0).max(minimum);
            trace!("Creating node {} ({}) with {count} outputs", node.name, node.op);
            let parsed = self.parse_node(node, count, &placeholders, raw)?;
            raw.nodes.push(parsed);
            for slot in 0..count {
                if !consumed.contains(&(node.name.as_str(), slot)) {
                    graph_outputs.push(output_name(&node.name, slot));
                }
            }
        }
        Ok(graph_outputs)
    }

    fn parse_node(
        &self,
        node: &NodeDef,
        count: usize,
        placeholders: &HashSet<&str>,
        raw: &mut RawGraph,
    ) -> LucidResult<RawNode> {
        let mut inputs = vec![];
        let mut control_inputs = vec![];
        for input in &node.input {
            match parse_input(input) {
                Input::Data(name, slot) => inputs.push(RawPort::named(output_name(name, slot))),
                Input::Control(name) if placeholders.contains(name) => {
                    trace!("  dropping control dependency of {} on input {name}", node.name)
                }
                Input::Control(name) => control_inputs.push(name.to_string()),
            }
        }
        let mut attributes = vec![];
        for (name, value) in &node.attr {
            if name == "_output_shapes" {
                if let Some(Value::List(list)) = &value.value {
                    for (slot, shape) in list.shape.iter().enumerate().take(count) {
                        let hint = RawValue::named(output_name(&node.name, slot));
                        raw.annotations.push(RawValue { shape: tensor::shape(shape), ..hint });
                    }
                }
            }
            let Some(attr) = parse_attr(value) else {
                warn!("Skipping attribute {name:?} of {:?}: no value", node.name);
                continue;
            };
            if node.op == "Const" && name == "value" {
                if let RawAttr::Tensor(t) = &attr {
                    let hint = RawValue { datum_type: t.datum_type, shape: t.shape.clone(), ..RawValue::named(&node.name) };
                    raw.annotations.push(hint);
                }
            }
            let attribute = RawAttribute::new(name, attr);
            attributes.push(if name.starts_with('_') { attribute.hidden() } else { attribute });
        }
        Ok(RawNode {
            op_type: node.op.clone(),
            name: Some(node.name.clone()),
            domain: None,
            inputs,
            outputs: (0..count).map(|slot| RawPort::named(output_name(&node.name, slot))).collect(),
            attributes,
            control_inputs,
        })
    }

    fn parse_graph(&self, graph: &GraphDef) -> LucidResult<RawGraph> {
        let mut raw = RawGraph::default();
        let outputs = self.parse_nodes(&graph.node, &mut raw)?;
        raw.outputs = outputs.into_iter().map(ValueRef::named).collect();
        Ok(raw)
    }

    /// A library function becomes a top-level graph of its own.
    fn parse_function(&self, function: &FunctionDef) -> LucidResult<RawGraph> {
        let signature = function.signature.as_ref().ok_or_else(|| DecodeError::missing(crate::TENSORFLOW, "function signature"))?;
        let mut raw = RawGraph { name: Some(signature.name.clone()), ..RawGraph::default() };
        for arg in &signature.input_arg {
            let value = RawValue { datum_type: tensor::datum_type(arg.r#type), ..RawValue::named(&arg.name) };
            raw.values.push(value);
            raw.inputs.push(ValueRef::named(&arg.name));
        }
        self.parse_nodes(&function.node_def, &mut raw)?;
        for arg in &signature.output_arg {
            let output = match function.ret.get(&arg.name).map(|r| parse_input(r)) {
                Some(Input::Data(name, slot)) => ValueRef::named(output_name(name, slot)),
                _ => {
                    warn!("Function {} has no value for output {}", signature.name, arg.name);
                    continue;
                }
            };
            raw.outputs.push(output);
        }
        Ok(raw)
    }
}

fn placeholder(node: &NodeDef) -> RawValue {
    let datum_type = match node.attr.get("dtype").and_then(|a| a.value.as_ref()) {
        Some(Value::Type(t)) => tensor::datum_type(*t),
        _ => None,
    };
    let shape = match node.attr.get("shape").and_then(|a| a.value.as_ref()) {
        Some(Value::Shape(s)) => tensor::shape(s),
        _ => None,
    };
    RawValue { datum_type, shape, ..RawValue::named(&node.name) }
}

fn parse_attr(value: &AttrValue) -> Option<RawAttr> {
    let string = |s: &[u8]| String::from_utf8_lossy(s).into_owned();
    let attr = match &value.value {
        None => return None,
        Some(Value::S(s)) => RawAttr::String(string(s)),
        Some(Value::I(i)) => RawAttr::Int(*i),
        Some(Value::F(f)) => RawAttr::Float(*f as f64),
        Some(Value::B(b)) => RawAttr::Bool(*b),
        Some(Value::Type(t)) => match tensor::datum_type(*t) {
            Some(dt) => RawAttr::DataType(dt),
            None => RawAttr::Int(*t as i64),
        },
        Some(Value::Shape(s)) => match tensor::shape(s) {
            Some(shape) => RawAttr::Shape(shape),
            None => RawAttr::String("<unknown rank>".into()),
        },
        Some(Value::Tensor(t)) => RawAttr::Tensor(Box::new(tensor::raw_value(t))),
        Some(Value::Placeholder(p)) => RawAttr::String(format!("${p}")),
        Some(Value::Func(f)) => RawAttr::Function(f.name.clone()),
        Some(Value::List(list)) => {
            if !list.s.is_empty() {
                RawAttr::Strings(list.s.iter().map(|s| string(s)).collect())
            } else if !list.i.is_empty() {
                RawAttr::Ints(list.i.clone())
            } else if !list.f.is_empty() {
                RawAttr::Floats(list.f.iter().map(|f| *f as f64).collect())
            } else if !list.b.is_empty() {
                RawAttr::Bools(list.b.clone())
            } else if !list.r#type.is_empty() {
                RawAttr::Strings(
                    list.r#type
                        .iter()
                        .map(|t| tensor::datum_type(*t).map(|dt| dt.to_string()).unwrap_or_else(|| t.to_string()))
                        .collect(),
                )
            } else if !list.shape.is_empty() {
                RawAttr::Strings(
                    list.shape
                        .iter()
                        .map(|s| tensor::shape(s).map(|s| s.to_string()).unwrap_or_else(|| "?".into()))
                        .collect(),
                )
            } else if !list.func.is_empty() {
                RawAttr::Strings(list.func.iter().map(|f| f.name.clone()).collect())
            } else if !list.tensor.is_empty() {
                RawAttr::Strings(list.tensor.iter().map(|t| type_string(&tensor::raw_value(t))).collect())
            } else {
                RawAttr::Ints(vec![])
            }
        }
    };
    Some(attr)
}

fn type_string(value: &RawValue) -> String {
    let dt = value.datum_type.map(|dt| dt.to_string()).unwrap_or_else(|| "?".into());
    match &value.shape {
        Some(shape) => format!("{dt}{shape}"),
        None => dt,
    }
}

impl ProtoModel for GraphDef {
    fn lower(&self, lower: &LowerContext) -> LucidResult<RawModel> {
        let ctx = ParsingContext { lower };
        let mut graphs = vec![ctx.parse_graph(self)?];
        if let Some(library) = &self.library {
            for function in &library.function {
                lower.cancel.check()?;
                graphs.push(ctx.parse_function(function)?);
            }
        }
        let producer = self.versions.as_ref().map(|v| v.producer).filter(|p| *p != 0);
        let mut properties = vec![];
        if let Some(versions) = &self.versions {
            if versions.min_consumer != 0 {
                properties.push(("min_consumer".to_string(), versions.min_consumer.to_string()));
            }
        }
        let devices = self.node.iter().map(|n| n.device.as_str()).filter(|d| !d.is_empty()).unique().join(", ");
        if !devices.is_empty() {
            properties.push(("devices".to_string(), devices));
        }
        let version = match (producer, self.version) {
            (Some(p), _) => Some(format!("TensorFlow GraphDef (producer {p})")),
            (None, v) if v != 0 => Some(format!("TensorFlow GraphDef v{v}")),
            _ => None,
        };
        Ok(RawModel { version, properties, graphs, ..RawModel::new(crate::TENSORFLOW) })
    }
}

static CLAIM: Claim = Claim {
    format: crate::TENSORFLOW,
    signatures: &[Signature::At { offset: 0, tokens: &[Token::Byte(0x0a), Token::Varint, Token::Byte(0x0a)] }],
    extensions: &["pb", "graphdef"],
    filenames: &[],
};

#[derive(Clone, Debug, Default)]
pub struct Tensorflow;

impl Framework for Tensorflow {
    type ProtoModel = GraphDef;

    fn claim(&self) -> &'static Claim {
        &CLAIM
    }

    fn bundled_metadata(&self) -> Option<&'static str> {
        Some(include_str!("tf-metadata.json"))
    }

    fn proto_model_for_bytes(&self, bytes: &Bytes, _options: &Options) -> LucidResult<GraphDef> {
        let graph = GraphDef::decode(bytes.clone()).map_err(|e| DecodeError::protobuf(crate::TENSORFLOW, e))?;
        if graph.node.is_empty() && graph.library.is_none() {
            return Err(DecodeError::missing(crate::TENSORFLOW, "nodes").into());
        }
        Ok(graph)
    }
}
