//! Turns a decoder's [`RawModel`] into a checked [`Model`].
//!
//! Top-level graphs get the first arena slots, in declaration order, so index references
//! between them resolve. Inline graphs found in attributes are appended as they are met.
use crate::cancel::Cancel;
use crate::errors::{DecodeError, LucidError, LucidResult};
use crate::format::Format;
use crate::metadata::{AttributeSchema, FormatMetadata, Lookup, OpDescriptor, PortSchema};
use crate::model::*;
use crate::options::Options;
use crate::raw::*;
use lucid_data::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Name bindings of a graph that nested graphs may capture from.
type Scope<'s> = (GraphId, &'s HashMap<String, TensorId>);

pub fn build(
    raw: RawModel,
    metadata: &FormatMetadata,
    options: &Options,
    cancel: &Cancel,
) -> LucidResult<Model> {
    let RawModel { format, producer, version, description, properties, graphs } = raw;
    if graphs.is_empty() {
        return Err(DecodeError::missing(format, "graph").into());
    }
    let top = graphs.len();
    let parents = graphs.iter().map(|g| g.parent).collect::<Vec<_>>();
    let order = parent_first_order(&parents)?;
    let mut raws = graphs.into_iter().map(Some).collect::<Vec<_>>();
    let mut builder = Builder {
        format,
        metadata,
        options,
        cancel,
        top,
        arena: (0..top).map(|_| None).collect(),
    };
    let mut scopes: Vec<Option<HashMap<String, TensorId>>> = vec![None; top];
    for ix in order {
        cancel.check()?;
        let Some(raw) = raws[ix].take() else { continue };
        let mut chain: Vec<Scope> = vec![];
        let mut cursor = parents[ix];
        while let Some(p) = cursor {
            if let Some(names) = &scopes[p] {
                chain.push((GraphId(p), names));
            }
            cursor = parents[p];
        }
        chain.reverse();
        let names = builder.build_graph(GraphId(ix), raw, parents[ix].map(GraphId), 0, &chain)?;
        scopes[ix] = Some(names);
    }
    let mut graphs = builder
        .arena
        .into_iter()
        .enumerate()
        .map(|(ix, g)| {
            g.ok_or_else(|| LucidError::integrity(GraphId(ix), format!("graph {ix}"), "never built"))
        })
        .collect::<LucidResult<Vec<_>>>()?;
    fill_captured_facts(&mut graphs);
    let model = Model { format, producer, version, description, properties, graphs };
    model.check_integrity()?;
    debug!(
        "Built {} model: {} graph(s), {} node(s) in main graph",
        format,
        model.graphs().len(),
        model.main().nodes().len()
    );
    Ok(model)
}

/// Top-level graph indices, each after its parent.
fn parent_first_order(parents: &[Option<usize>]) -> LucidResult<Vec<usize>> {
    let mut done = vec![false; parents.len()];
    let mut order = Vec::with_capacity(parents.len());
    for (ix, parent) in parents.iter().enumerate() {
        if let Some(p) = parent {
            if *p >= parents.len() || *p == ix {
                return Err(LucidError::integrity(GraphId(ix), format!("parent graph {p}"), "no such graph"));
            }
        }
    }
    while order.len() < parents.len() {
        let before = order.len();
        for ix in 0..parents.len() {
            if !done[ix] && parents[ix].is_none_or(|p| done[p]) {
                done[ix] = true;
                order.push(ix);
            }
        }
        if order.len() == before {
            let ix = done.iter().position(|d| !d).unwrap_or(0);
            return Err(LucidError::integrity(GraphId(ix), "parent graph", "cyclic graph nesting"));
        }
    }
    Ok(order)
}

/// Captured tensors take the type and shape of the tensor they stand for.
fn fill_captured_facts(graphs: &mut [Graph]) {
    let mut updates = vec![];
    for (gix, graph) in graphs.iter().enumerate() {
        for tensor in graph.tensors() {
            let TensorKind::Captured { graph: mut owner, tensor: mut source } = tensor.kind else {
                continue;
            };
            for _ in 0..graphs.len() {
                let Some(outer) = graphs.get(owner.0).and_then(|g| g.tensor(source)) else { break };
                match outer.kind {
                    TensorKind::Captured { graph: g, tensor: t } => (owner, source) = (g, t),
                    _ => {
                        updates.push((gix, tensor.id, outer.datum_type, outer.shape.clone()));
                        break;
                    }
                }
            }
        }
    }
    for (gix, tid, datum_type, shape) in updates {
        let tensor = &mut graphs[gix].tensors[tid.0];
        tensor.datum_type = tensor.datum_type.or(datum_type);
        if tensor.shape.is_none() {
            tensor.shape = shape;
        }
    }
}

struct Builder<'a> {
    format: Format,
    metadata: &'a FormatMetadata,
    options: &'a Options,
    cancel: &'a Cancel,
    top: usize,
    arena: Vec<Option<Graph>>,
}

#[derive(Default)]
struct GraphState {
    id: GraphId,
    tensors: Vec<Tensor>,
    nodes: Vec<Node>,
    /// Current binding of each name.
    names: HashMap<String, TensorId>,
    /// Every tensor name in use, bound or shadowed.
    used: HashSet<String>,
    /// Tensors declared without a name, named once producers are known.
    anonymous: Vec<TensorId>,
    by_index: Vec<TensorId>,
    captures: HashMap<(GraphId, TensorId), TensorId>,
}

impl GraphState {
    fn unique_name(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut n = 0;
        while self.used.contains(&name) {
            n += 1;
            name = format!("{base}_{n}");
        }
        self.used.insert(name.clone());
        name
    }

    fn add_tensor(&mut self, name: Option<&str>, kind: TensorKind) -> TensorId {
        let id = TensorId(self.tensors.len());
        let name = match name {
            Some(name) => {
                let unique = self.unique_name(name);
                self.names.entry(name.to_string()).or_insert(id);
                unique
            }
            None => {
                self.anonymous.push(id);
                String::new()
            }
        };
        self.tensors.push(Tensor::new(id, name, kind));
        id
    }

    /// Creates a fresh tensor for a name written again, and makes it the current binding.
    fn rebind(&mut self, name: &str, previous: TensorId) -> TensorId {
        let id = TensorId(self.tensors.len());
        let unique = self.unique_name(name);
        let prev = &self.tensors[previous.0];
        let mut tensor = Tensor::new(id, unique, TensorKind::Intermediate);
        tensor.datum_type = prev.datum_type;
        tensor.shape = prev.shape.clone();
        tensor.quantization = prev.quantization.clone();
        self.tensors.push(tensor);
        self.names.insert(name.to_string(), id);
        id
    }
}

impl<'a> Builder<'a> {
    fn integrity(&self, graph: GraphId, reference: impl Into<String>, reason: &str) -> LucidError {
        LucidError::integrity(graph, reference, reason)
    }

    fn build_graph(
        &mut self,
        id: GraphId,
        raw: RawGraph,
        parent: Option<GraphId>,
        depth: usize,
        ancestors: &[Scope],
    ) -> LucidResult<HashMap<String, TensorId>> {
        trace!("Building graph {id} {:?} (parent: {parent:?})", raw.name);
        let RawGraph { name, values, annotations, inputs, outputs, nodes, rebinding, .. } = raw;
        let mut state = GraphState { id, ..GraphState::default() };

        for value in values {
            let tid = self.declare_value(&mut state, value)?;
            state.by_index.push(tid);
        }

        let mut graph_inputs = vec![];
        for input in &inputs {
            let tid = match input {
                ValueRef::Absent => continue,
                ValueRef::Named(n) => match state.names.get(n) {
                    Some(t) => *t,
                    None => state.add_tensor(Some(n), TensorKind::Input),
                },
                ValueRef::Index(_) => self.resolve_local(&state, input)?,
            };
            let tensor = &mut state.tensors[tid.0];
            if tensor.kind == TensorKind::Initializer {
                trace!("  input {} is an initializer", tensor.name);
                continue;
            }
            tensor.kind = TensorKind::Input;
            if !graph_inputs.contains(&tid) {
                graph_inputs.push(tid);
            }
        }

        state.nodes = nodes
            .iter()
            .enumerate()
            .map(|(ix, n)| {
                let mut node = Node::new(NodeId(ix), n.op_type.clone());
                node.name = n.name.clone();
                node.domain = n.domain.clone();
                node
            })
            .collect();
        let mut node_names = HashMap::new();
        for node in &state.nodes {
            if let Some(name) = &node.name {
                node_names.entry(name.clone()).or_insert(node.id);
            }
        }

        if !rebinding {
            for (ix, node) in nodes.iter().enumerate() {
                let ports = node
                    .outputs
                    .iter()
                    .enumerate()
                    .map(|(slot, port)| self.bind_output(&mut state, OutletId::new(NodeId(ix), slot), port, false))
                    .collect::<LucidResult<Vec<_>>>()?;
                state.nodes[ix].outputs = ports;
            }
        }

        for (ix, raw_node) in nodes.into_iter().enumerate() {
            self.cancel.check()?;
            let RawNode { op_type, inputs, outputs, attributes, control_inputs, .. } = raw_node;
            let mut ports = Vec::with_capacity(inputs.len());
            for port in inputs {
                let tensor = self.resolve(&mut state, &port.value, ancestors)?;
                ports.push(Port { parameter: port.parameter, tensor });
            }
            state.nodes[ix].inputs = ports;
            if rebinding {
                let ports = outputs
                    .iter()
                    .enumerate()
                    .map(|(slot, port)| self.bind_output(&mut state, OutletId::new(NodeId(ix), slot), port, true))
                    .collect::<LucidResult<Vec<_>>>()?;
                state.nodes[ix].outputs = ports;
            }

            let mut attrs = Vec::with_capacity(attributes.len());
            for attribute in attributes {
                let visible = attribute.visible;
                let value = {
                    let mut chain = ancestors.to_vec();
                    chain.push((id, &state.names));
                    self.attribute(id, attribute.value, depth, &chain)?
                };
                attrs.push((attribute.name, value, visible));
            }

            let mut controls = vec![];
            for control in control_inputs {
                match node_names.get(&control) {
                    Some(n) => controls.push(*n),
                    None => {
                        return Err(self.integrity(
                            id,
                            format!("control input {control:?} of {op_type}"),
                            "no node with that name",
                        ));
                    }
                }
            }

            let lookup = self.metadata.lookup(&op_type);
            let node = &mut state.nodes[ix];
            node.control_inputs = controls;
            node.attributes = attrs
                .into_iter()
                .map(|(name, value, visible)| described_attribute(lookup.descriptor(), name, value, visible))
                .collect();
            if let Lookup::Known(descriptor) = lookup {
                name_ports(&mut node.inputs, &descriptor.inputs);
                name_ports(&mut node.outputs, &descriptor.outputs);
                node.descriptor = Some(descriptor);
            } else {
                trace!("  no descriptor for {op_type}");
            }
            trace!("  {}", state.nodes[ix]);
        }

        let mut graph_outputs = vec![];
        for output in &outputs {
            if let Some(tid) = self.resolve(&mut state, output, ancestors)? {
                graph_outputs.push(tid);
            }
        }

        for hint in annotations {
            let Some(tid) = hint.name.as_ref().and_then(|n| state.names.get(n)) else {
                continue;
            };
            let tensor = &mut state.tensors[tid.0];
            if tensor.datum_type.is_none() {
                tensor.datum_type = hint.datum_type;
            }
            if tensor.shape.is_none() {
                tensor.shape = hint.shape;
            }
            if tensor.quantization.is_none() {
                tensor.quantization = hint.quantization;
            }
        }

        self.name_anonymous(&mut state);

        let graph = Graph {
            id,
            name,
            parent,
            nodes: state.nodes,
            tensors: state.tensors,
            inputs: graph_inputs,
            outputs: graph_outputs,
        };
        self.arena[id.0] = Some(graph);
        Ok(state.names)
    }

    fn declare_value(&self, state: &mut GraphState, value: RawValue) -> LucidResult<TensorId> {
        let RawValue { name, datum_type, shape, storage, quantization } = value;
        if let Some(shape) = &shape {
            if shape.rank() > self.options.max_tensor_rank {
                return Err(DecodeError::limit(
                    self.format,
                    format!("tensor {name:?} has rank {}", shape.rank()),
                )
                .into());
            }
        }
        if let Some(existing) = name.as_ref().and_then(|n| state.names.get(n)).copied() {
            // a second declaration of a name refines the first one
            let tensor = &mut state.tensors[existing.0];
            tensor.datum_type = tensor.datum_type.or(datum_type);
            tensor.shape = tensor.shape.take().or(shape);
            tensor.quantization = tensor.quantization.take().or(quantization);
            if storage.is_some() && tensor.storage.is_none() {
                tensor.kind = TensorKind::Initializer;
                tensor.storage = storage.filter(|_| self.options.load_tensor_data);
            }
            return Ok(existing);
        }
        let kind = if storage.is_some() { TensorKind::Initializer } else { TensorKind::Intermediate };
        let tid = state.add_tensor(name.as_deref(), kind);
        let tensor = &mut state.tensors[tid.0];
        tensor.datum_type = datum_type;
        tensor.shape = shape;
        tensor.quantization = quantization.filter(|q| !q.is_empty());
        tensor.storage = storage.filter(|_| self.options.load_tensor_data);
        Ok(tid)
    }

    fn resolve_local(&self, state: &GraphState, value: &ValueRef) -> LucidResult<TensorId> {
        match value {
            ValueRef::Named(n) => state
                .names
                .get(n)
                .copied()
                .ok_or_else(|| self.integrity(state.id, format!("value {n:?}"), "no value with that name")),
            ValueRef::Index(ix) => state.by_index.get(*ix).copied().ok_or_else(|| {
                self.integrity(state.id, format!("value #{ix}"), "value index out of range")
            }),
            ValueRef::Absent => Err(self.integrity(state.id, "absent value", "value is required")),
        }
    }

    /// Resolves a reference against the graph, then against enclosing graphs.
    fn resolve(
        &self,
        state: &mut GraphState,
        value: &ValueRef,
        ancestors: &[Scope],
    ) -> LucidResult<Option<TensorId>> {
        let name = match value {
            ValueRef::Absent => return Ok(None),
            ValueRef::Index(_) => return self.resolve_local(state, value).map(Some),
            ValueRef::Named(name) => name,
        };
        if let Some(t) = state.names.get(name) {
            return Ok(Some(*t));
        }
        for (graph, names) in ancestors.iter().rev() {
            if let Some(outer) = names.get(name) {
                let key = (*graph, *outer);
                if let Some(t) = state.captures.get(&key) {
                    return Ok(Some(*t));
                }
                let tid = state.add_tensor(Some(name), TensorKind::Captured { graph: *graph, tensor: *outer });
                state.captures.insert(key, tid);
                trace!("  captured {name:?} from graph {graph}");
                return Ok(Some(tid));
            }
        }
        Err(self.integrity(state.id, format!("value {name:?}"), "no value with that name in scope"))
    }

    fn bind_output(
        &self,
        state: &mut GraphState,
        outlet: OutletId,
        port: &RawPort,
        rebinding: bool,
    ) -> LucidResult<Port> {
        let existing = match &port.value {
            ValueRef::Absent => return Ok(Port { parameter: port.parameter.clone(), tensor: None }),
            ValueRef::Named(n) => state.names.get(n).copied(),
            ValueRef::Index(_) => Some(self.resolve_local(state, &port.value)?),
        };
        let tid = match existing {
            None => {
                let ValueRef::Named(n) = &port.value else { unreachable!() };
                state.add_tensor(Some(n), TensorKind::Intermediate)
            }
            Some(t) => {
                let tensor = &state.tensors[t.0];
                let written = tensor.producer.is_some()
                    || matches!(tensor.kind, TensorKind::Input | TensorKind::Captured { .. });
                match (&port.value, written) {
                    (_, false) => t,
                    (ValueRef::Named(n), true) if rebinding => state.rebind(n, t),
                    (value, true) => {
                        warn!("{value:?} is written by more than one node, keeping the first producer");
                        return Ok(Port { parameter: port.parameter.clone(), tensor: None });
                    }
                }
            }
        };
        let tensor = &mut state.tensors[tid.0];
        tensor.producer = Some(outlet);
        if tensor.kind == TensorKind::Initializer && tensor.storage.is_none() {
            tensor.kind = TensorKind::Intermediate;
        }
        Ok(Port { parameter: port.parameter.clone(), tensor: Some(tid) })
    }

    fn attribute(
        &mut self,
        graph: GraphId,
        value: RawAttr,
        depth: usize,
        scopes: &[Scope],
    ) -> LucidResult<AttrValue> {
        Ok(match value {
            RawAttr::Int(i) => AttrValue::Int(i),
            RawAttr::Float(f) => AttrValue::Float(f),
            RawAttr::Bool(b) => AttrValue::Bool(b),
            RawAttr::String(s) => AttrValue::String(s),
            RawAttr::Ints(v) => AttrValue::Ints(v),
            RawAttr::Floats(v) => AttrValue::Floats(v),
            RawAttr::Strings(v) => AttrValue::Strings(v),
            RawAttr::Bools(v) => AttrValue::Bools(v),
            RawAttr::DataType(dt) => AttrValue::DataType(dt),
            RawAttr::Shape(s) => AttrValue::Shape(s),
            RawAttr::Function(f) => AttrValue::Function(f),
            RawAttr::Tensor(value) => {
                let RawValue { name, datum_type, shape, storage, .. } = *value;
                let storage = storage.filter(|_| self.options.load_tensor_data);
                AttrValue::Tensor(Box::new(TensorValue { name, datum_type, shape, storage }))
            }
            RawAttr::Graph(g) => AttrValue::Graph(self.subgraph(graph, g, depth, scopes)?),
            RawAttr::Graphs(gs) => AttrValue::Graphs(
                gs.into_iter()
                    .map(|g| self.subgraph(graph, g, depth, scopes))
                    .collect::<LucidResult<_>>()?,
            ),
        })
    }

    fn subgraph(
        &mut self,
        parent: GraphId,
        graph: GraphRef,
        depth: usize,
        scopes: &[Scope],
    ) -> LucidResult<GraphId> {
        match graph {
            GraphRef::Index(ix) if ix < self.top => Ok(GraphId(ix)),
            GraphRef::Index(ix) => {
                Err(self.integrity(parent, format!("graph {ix}"), "graph index out of range"))
            }
            GraphRef::Inline(raw) => {
                if depth + 1 > self.options.max_graph_depth {
                    return Err(DecodeError::limit(
                        self.format,
                        format!("graphs nested deeper than {}", self.options.max_graph_depth),
                    )
                    .into());
                }
                let id = GraphId(self.arena.len());
                self.arena.push(None);
                self.build_graph(id, *raw, Some(parent), depth + 1, scopes)?;
                Ok(id)
            }
        }
    }

    fn name_anonymous(&self, state: &mut GraphState) {
        for tid in std::mem::take(&mut state.anonymous) {
            let base = match state.tensors[tid.0].producer {
                Some(outlet) => {
                    let node = &state.nodes[outlet.node.0];
                    match &node.name {
                        Some(name) if node.outputs.len() == 1 => name.clone(),
                        Some(name) => format!("{name}:{}", outlet.slot),
                        None => format!("tensor_{}", tid.0),
                    }
                }
                None => format!("tensor_{}", tid.0),
            };
            let name = state.unique_name(&base);
            state.tensors[tid.0].name = name;
        }
    }
}

/// Applies the operator schema to an attribute: value coercion and default visibility.
fn described_attribute(
    descriptor: Option<&Arc<OpDescriptor>>,
    name: String,
    value: AttrValue,
    visible: Option<bool>,
) -> Attribute {
    let schema = descriptor.and_then(|d| d.attribute(&name));
    let value = match schema {
        Some(schema) => coerce(value, schema),
        None => value,
    };
    let visible = visible.unwrap_or_else(|| match schema {
        Some(schema) if schema.visible == Some(false) => false,
        Some(AttributeSchema { default: Some(default), .. }) => !value.matches_default(default),
        _ => true,
    });
    Attribute { name, value, visible }
}

fn is_int_type(t: &str) -> bool {
    matches!(t, "int8" | "uint8" | "int16" | "uint16" | "int32" | "uint32" | "int64" | "uint64" | "int")
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Converts a raw attribute value to the type the schema declares, when it can.
pub fn coerce(value: AttrValue, schema: &AttributeSchema) -> AttrValue {
    let ty = schema.datum_type.as_deref().unwrap_or("");
    let enum_name = |i: i64| {
        schema.values.as_ref().and_then(|names| usize::try_from(i).ok().and_then(|ix| names.get(ix)))
    };
    match value {
        AttrValue::Int(i) if ty == "boolean" || ty == "bool" => AttrValue::Bool(i != 0),
        AttrValue::Int(i) if enum_name(i).is_some() => {
            AttrValue::Enum { value: i, name: enum_name(i).cloned().unwrap_or_default() }
        }
        AttrValue::Ints(v) if ty == "boolean[]" => AttrValue::Bools(v.into_iter().map(|i| i != 0).collect()),
        AttrValue::String(s) => {
            let parsed = if let Some(pos) = schema.values.as_ref().and_then(|v| v.iter().position(|n| *n == s)) {
                Some(AttrValue::Enum { value: pos as i64, name: s.clone() })
            } else if is_int_type(ty) {
                s.trim().parse().ok().map(AttrValue::Int)
            } else if ty == "float32" || ty == "float64" || ty == "float" {
                s.trim().parse().ok().map(AttrValue::Float)
            } else if ty == "boolean" || ty == "bool" {
                match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Some(AttrValue::Bool(true)),
                    "false" | "0" => Some(AttrValue::Bool(false)),
                    _ => None,
                }
            } else if ty.ends_with("[]") && is_int_type(&ty[..ty.len() - 2]) || ty == "shape" {
                split_list(&s).map(|p| p.parse().ok()).collect::<Option<Vec<i64>>>().map(AttrValue::Ints)
            } else if ty == "float32[]" || ty == "float64[]" || ty == "float[]" {
                split_list(&s).map(|p| p.parse().ok()).collect::<Option<Vec<f64>>>().map(AttrValue::Floats)
            } else if ty == "string[]" {
                Some(AttrValue::Strings(split_list(&s).map(String::from).collect()))
            } else {
                None
            };
            parsed.unwrap_or(AttrValue::String(s))
        }
        other => other,
    }
}

fn name_ports(ports: &mut [Port], schema: &[PortSchema]) {
    let Some(last) = schema.last() else { return };
    for (ix, port) in ports.iter_mut().enumerate() {
        if port.parameter.is_some() {
            continue;
        }
        port.parameter = match schema.get(ix) {
            Some(s) => Some(s.name.clone()),
            None if last.is_variadic() => Some(last.name.clone()),
            None => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FMT: Format = Format::new("demo", "Demo");

    fn setup_test_logger() {
        let _ = env_logger::Builder::from_env("LUCID_LOG").is_test(true).try_init();
    }

    fn metadata() -> FormatMetadata {
        FormatMetadata::parse(
            FMT,
            r#"[
                { "name": "Conv", "category": "Layer",
                  "attributes": [
                    { "name": "group", "type": "int64", "default": 1 },
                    { "name": "padding", "type": "int8", "values": ["SAME", "VALID"] },
                    { "name": "fused", "type": "boolean" },
                    { "name": "strides", "type": "int32[]" },
                    { "name": "internal", "visible": false } ],
                  "inputs": [ { "name": "X" }, { "name": "W" }, { "name": "B" } ],
                  "outputs": [ { "name": "Y" } ] },
                { "name": "Concat", "inputs": [ { "name": "inputs", "option": "variadic" } ] }
            ]"#,
        )
        .unwrap()
    }

    fn node(op: &str, inputs: &[&str], outputs: &[&str]) -> RawNode {
        RawNode {
            op_type: op.into(),
            inputs: inputs.iter().map(|i| RawPort::of(ValueRef::name_or_absent(i))).collect(),
            outputs: outputs.iter().map(|o| RawPort::of(ValueRef::name_or_absent(o))).collect(),
            ..RawNode::default()
        }
    }

    fn raw_model(graphs: Vec<RawGraph>) -> RawModel {
        RawModel { graphs, ..RawModel::new(FMT) }
    }

    fn run(raw: RawModel) -> LucidResult<Model> {
        setup_test_logger();
        build(raw, &metadata(), &Options::default(), &Cancel::default())
    }

    #[test]
    fn identity() {
        let graph = RawGraph {
            values: vec![RawValue::named("x").with_type(DatumType::F32).with_shape(Shape::from_signed([1, 3]))],
            inputs: vec![ValueRef::named("x")],
            nodes: vec![node("Identity", &["x"], &["y"])],
            outputs: vec![ValueRef::named("y")],
            ..RawGraph::default()
        };
        let model = run(raw_model(vec![graph])).unwrap();
        let g = model.main();
        assert_eq!(g.nodes().len(), 1);
        assert_eq!(g.tensors().iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(g.inputs(), &[TensorId(0)]);
        assert_eq!(g.outputs(), &[TensorId(1)]);
        assert_eq!(g.tensor(TensorId(1)).unwrap().producer, Some(OutletId::new(NodeId(0), 0)));
        assert!(g.nodes()[0].descriptor.is_none());
    }

    #[test]
    fn initializer_inputs_are_not_inputs() {
        let graph = RawGraph {
            values: vec![RawValue::named("w").with_storage(Storage::raw(vec![0u8; 4]))],
            inputs: vec![ValueRef::named("x"), ValueRef::named("w")],
            nodes: vec![node("Conv", &["x", "w", ""], &["y"])],
            outputs: vec![ValueRef::named("y")],
            ..RawGraph::default()
        };
        let model = run(raw_model(vec![graph])).unwrap();
        let g = model.main();
        assert_eq!(g.inputs().len(), 1);
        assert_eq!(g.tensor(g.inputs()[0]).unwrap().name, "x");
        assert!(g.tensor_by_name("w").unwrap().is_initializer());
        let conv = &g.nodes()[0];
        assert_eq!(conv.inputs[2].tensor, None);
        assert_eq!(conv.inputs.iter().map(|p| p.parameter.as_deref()).collect::<Vec<_>>(), vec![Some("X"), Some("W"), Some("B")]);
        assert_eq!(conv.outputs[0].parameter.as_deref(), Some("Y"));
        assert_eq!(conv.category(), Some("Layer"));
    }

    #[test]
    fn forward_references() {
        let graph = RawGraph {
            inputs: vec![ValueRef::named("x")],
            nodes: vec![node("Add", &["x", "b"], &["a"]), node("Relu", &["x"], &["b"])],
            outputs: vec![ValueRef::named("a")],
            ..RawGraph::default()
        };
        let model = run(raw_model(vec![graph])).unwrap();
        let g = model.main();
        let b = g.tensor_by_name("b").unwrap();
        assert_eq!(b.producer, Some(OutletId::new(NodeId(1), 0)));
        assert_eq!(g.nodes()[0].inputs[1].tensor, Some(b.id));
    }

    #[test]
    fn dangling_reference() {
        let graph = RawGraph {
            nodes: vec![node("Relu", &["ghost"], &["y"])],
            ..RawGraph::default()
        };
        match run(raw_model(vec![graph])) {
            Err(LucidError::GraphIntegrity { reference, .. }) => assert!(reference.contains("ghost")),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn inline_subgraph_captures_outer_values() {
        let body = RawGraph {
            nodes: vec![node("Add", &["w", "w"], &["z"])],
            outputs: vec![ValueRef::named("z"), ValueRef::named("x")],
            ..RawGraph::default()
        };
        let mut if_node = node("If", &["cond"], &["out"]);
        if_node.attributes.push(RawAttribute::new("then_branch", RawAttr::Graph(GraphRef::Inline(Box::new(body)))));
        let graph = RawGraph {
            values: vec![RawValue::named("w").with_storage(Storage::raw(vec![1u8]))],
            inputs: vec![ValueRef::named("cond"), ValueRef::named("x")],
            nodes: vec![if_node],
            outputs: vec![ValueRef::named("out")],
            ..RawGraph::default()
        };
        let model = run(raw_model(vec![graph])).unwrap();
        assert_eq!(model.graphs().len(), 2);
        let then = model.graph(GraphId(1)).unwrap();
        assert_eq!(then.parent(), Some(GraphId(0)));
        let w = then.tensor_by_name("w").unwrap();
        let outer_w = model.main().tensor_by_name("w").unwrap().id;
        assert_eq!(w.kind, TensorKind::Captured { graph: GraphId(0), tensor: outer_w });
        // captured once, used twice
        assert_eq!(then.tensors().iter().filter(|t| t.name.starts_with('w')).count(), 1);
        assert_eq!(then.outputs().len(), 2);
        assert_eq!(model.main().subgraphs(NodeId(0)), vec![GraphId(1)]);
    }

    #[test]
    fn depth_limit() {
        let mut graph = RawGraph { nodes: vec![node("Leaf", &[], &["leaf"])], ..RawGraph::default() };
        for _ in 0..4 {
            let mut n = node("Loop", &[], &[]);
            n.attributes.push(RawAttribute::new("body", RawAttr::Graph(GraphRef::Inline(Box::new(graph)))));
            graph = RawGraph { nodes: vec![n], ..RawGraph::default() };
        }
        let options = Options::default().with_max_graph_depth(3);
        let err = build(raw_model(vec![graph.clone()]), &metadata(), &options, &Cancel::default()).unwrap_err();
        assert!(matches!(err, LucidError::Decode(DecodeError { kind: crate::errors::DecodeErrorKind::LimitExceeded, .. })));
        let model = build(raw_model(vec![graph]), &metadata(), &Options::default(), &Cancel::default()).unwrap();
        assert_eq!(model.graphs().len(), 5);
    }

    #[test]
    fn rebinding_gives_fresh_tensors() {
        let graph = RawGraph {
            values: vec![RawValue::named("x").with_type(DatumType::F32)],
            inputs: vec![ValueRef::named("x")],
            nodes: vec![node("Scale", &["x"], &["x"]), node("Relu", &["x"], &["x"]), node("Exp", &["x"], &["y"])],
            outputs: vec![ValueRef::named("x"), ValueRef::named("y")],
            rebinding: true,
            ..RawGraph::default()
        };
        let model = run(raw_model(vec![graph])).unwrap();
        let g = model.main();
        assert_eq!(g.tensors().iter().map(|t| t.name.as_str()).collect::<Vec<_>>(), vec!["x", "x_1", "x_2", "y"]);
        assert_eq!(g.nodes()[1].inputs[0].tensor, Some(TensorId(1)));
        assert_eq!(g.nodes()[2].inputs[0].tensor, Some(TensorId(2)));
        assert_eq!(g.tensor(TensorId(2)).unwrap().datum_type, Some(DatumType::F32));
        assert_eq!(g.outputs(), &[TensorId(2), TensorId(3)]);
    }

    #[test]
    fn anonymous_tensors_are_named_after_producers() {
        let mut split = node("Split", &[], &[]);
        split.name = Some("split".into());
        split.outputs = vec![RawPort::index(0), RawPort::index(1)];
        let mut relu = node("Relu", &[], &[]);
        relu.name = Some("split".into());
        relu.inputs = vec![RawPort::index(0)];
        relu.outputs = vec![RawPort::index(2)];
        let graph = RawGraph {
            values: vec![RawValue::default(), RawValue::default(), RawValue::default(), RawValue::default()],
            nodes: vec![split, relu],
            outputs: vec![ValueRef::Index(2), ValueRef::Index(3)],
            ..RawGraph::default()
        };
        let model = run(raw_model(vec![graph])).unwrap();
        let names = model.main().tensors().iter().map(|t| t.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["split:0", "split:1", "split", "tensor_3"]);
    }

    #[test]
    fn attributes_follow_the_descriptor() {
        let mut conv = node("Conv", &["x"], &["y"]);
        conv.attributes = vec![
            RawAttribute::new("group", RawAttr::Int(1)),
            RawAttribute::new("padding", RawAttr::Int(1)),
            RawAttribute::new("fused", RawAttr::Int(1)),
            RawAttribute::new("strides", RawAttr::String("2, 2".into())),
            RawAttribute::new("internal", RawAttr::Int(3)),
            RawAttribute::new("forced", RawAttr::Int(3)).hidden(),
            RawAttribute::new("extra", RawAttr::Float(0.5)),
        ];
        let graph = RawGraph { inputs: vec![ValueRef::named("x")], nodes: vec![conv], ..RawGraph::default() };
        let model = run(raw_model(vec![graph])).unwrap();
        let conv = &model.main().nodes()[0];
        let attrs = conv.attributes.iter().map(|a| (a.name.as_str(), a.value.clone(), a.visible)).collect::<Vec<_>>();
        assert_eq!(
            attrs,
            vec![
                ("group", AttrValue::Int(1), false),
                ("padding", AttrValue::Enum { value: 1, name: "VALID".into() }, true),
                ("fused", AttrValue::Bool(true), true),
                ("strides", AttrValue::Ints(vec![2, 2]), true),
                ("internal", AttrValue::Int(3), false),
                ("forced", AttrValue::Int(3), false),
                ("extra", AttrValue::Float(0.5), true),
            ]
        );
    }

    #[test]
    fn variadic_ports() {
        let graph = RawGraph {
            inputs: vec![ValueRef::named("a"), ValueRef::named("b")],
            nodes: vec![node("Concat", &["a", "b", "a"], &["c"])],
            ..RawGraph::default()
        };
        let model = run(raw_model(vec![graph])).unwrap();
        let params = model.main().nodes()[0].inputs.iter().map(|p| p.parameter.clone()).collect::<Vec<_>>();
        assert_eq!(params, vec![Some("inputs".to_string()); 3]);
    }

    #[test]
    fn control_inputs_by_name() {
        let mut a = node("NoOp", &[], &[]);
        a.name = Some("init".into());
        let mut b = node("Relu", &["x"], &["y"]);
        b.control_inputs = vec!["init".into()];
        let mut c = node("Relu", &["y"], &["z"]);
        c.control_inputs = vec!["missing".into()];
        let graph = RawGraph { inputs: vec![ValueRef::named("x")], nodes: vec![a, b], ..RawGraph::default() };
        let model = run(raw_model(vec![graph.clone()])).unwrap();
        assert_eq!(model.main().nodes()[1].control_inputs, vec![NodeId(0)]);
        let mut broken = graph;
        broken.nodes.push(c);
        assert!(matches!(run(raw_model(vec![broken])), Err(LucidError::GraphIntegrity { .. })));
    }

    #[test]
    fn top_level_graphs_by_index_and_parent() {
        let mut while_node = node("WHILE", &["x"], &["y"]);
        while_node.attributes.push(RawAttribute::new("body", RawAttr::Graph(GraphRef::Index(1))));
        let main = RawGraph {
            inputs: vec![ValueRef::named("x")],
            nodes: vec![while_node],
            outputs: vec![ValueRef::named("y")],
            ..RawGraph::default()
        };
        let body = RawGraph {
            parent: Some(0),
            nodes: vec![node("Relu", &["x"], &["r"])],
            outputs: vec![ValueRef::named("r")],
            ..RawGraph::default()
        };
        let model = run(raw_model(vec![main.clone(), body])).unwrap();
        assert_eq!(model.main().nodes()[0].attribute("body"), Some(&AttrValue::Graph(GraphId(1))));
        assert!(matches!(model.graph(GraphId(1)).unwrap().tensor_by_name("x").unwrap().kind, TensorKind::Captured { .. }));

        let mut bad = main;
        bad.nodes[0].attributes[0].value = RawAttr::Graph(GraphRef::Index(7));
        assert!(matches!(run(raw_model(vec![bad])), Err(LucidError::GraphIntegrity { .. })));
    }

    #[test]
    fn cyclic_parents() {
        let a = RawGraph { parent: Some(1), ..RawGraph::default() };
        let b = RawGraph { parent: Some(0), ..RawGraph::default() };
        assert!(matches!(run(raw_model(vec![a, b])), Err(LucidError::GraphIntegrity { .. })));
    }

    #[test]
    fn cancelled() {
        let cancel = Cancel::default();
        cancel.cancel();
        let graph = RawGraph { nodes: vec![node("NoOp", &[], &[])], ..RawGraph::default() };
        assert_eq!(build(raw_model(vec![graph]), &metadata(), &Options::default(), &cancel).unwrap_err(), LucidError::Cancelled);
    }

    #[test]
    fn tensor_data_can_be_dropped() {
        let graph = RawGraph {
            values: vec![RawValue::named("w").with_storage(Storage::raw(vec![0u8; 16]))],
            ..RawGraph::default()
        };
        let options = Options::default().with_tensor_data(false);
        let model = build(raw_model(vec![graph]), &metadata(), &options, &Cancel::default()).unwrap();
        let w = model.main().tensor_by_name("w").unwrap();
        assert!(w.is_initializer());
        assert!(w.storage.is_none());
    }

    #[test]
    fn rank_limit() {
        let graph = RawGraph {
            values: vec![RawValue::named("x").with_shape(Shape::from_signed([1, 1, 1]))],
            ..RawGraph::default()
        };
        let options = Options::default().with_max_tensor_rank(2);
        assert!(build(raw_model(vec![graph]), &metadata(), &options, &Cancel::default()).is_err());
    }
}
