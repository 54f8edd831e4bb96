use crate::ir::{Body, Layer, Net, Port};

use lucid_core::internal::*;

const INPUT_LAYERS: &[&str] = &["Parameter", "Input"];
const OUTPUT_LAYERS: &[&str] = &["Result"];

/// Element type of a port, from either the legacy precision names (`FP32`) or the
/// element types of IR v10 and later (`f32`).
pub fn element_type(precision: &str) -> Option<DatumType> {
    let dt = match precision.to_ascii_lowercase().as_str() {
        "fp32" | "f32" => DatumType::F32,
        "fp16" | "f16" => DatumType::F16,
        "fp64" | "f64" => DatumType::F64,
        "bf16" => DatumType::BF16,
        "i4" => DatumType::I4,
        "i8" => DatumType::I8,
        "i16" => DatumType::I16,
        "i32" => DatumType::I32,
        "i64" => DatumType::I64,
        "u8" => DatumType::U8,
        "u16" => DatumType::U16,
        "u32" => DatumType::U32,
        "u64" => DatumType::U64,
        "bool" | "boolean" => DatumType::Bool,
        "string" => DatumType::String,
        _ => return None,
    };
    Some(dt)
}

/// `1,3,?,224`, with or without brackets.
fn parse_shape(s: &str) -> Shape {
    s.trim_matches(|c| matches!(c, '[' | ']' | '{' | '}' | ' '))
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(Dim::parse)
        .collect()
}

fn port_value(layer: &Layer, port: &Port) -> RawValue {
    let mut value = RawValue::default();
    let precision = port.precision.as_deref().or(layer.precision.as_deref());
    value.datum_type = precision.and_then(element_type);
    if !port.dims.is_empty() {
        value.shape = Some(port.dims.iter().map(|d| Dim::parse(d)).collect());
    }
    if INPUT_LAYERS.contains(&layer.layer_type.as_str()) {
        value.name = Some(layer.name.clone());
        let data = |key: &str| layer.data.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        if value.datum_type.is_none() {
            value.datum_type = data("element_type").and_then(element_type);
        }
        if value.shape.is_none() {
            value.shape = data("shape").map(parse_shape);
        }
    }
    value
}

pub struct ParsingContext<'a> {
    pub lower: &'a LowerContext<'a>,
}

impl ParsingContext<'_> {
    fn parse_body(&self, name: Option<String>, body: &Body) -> LucidResult<RawGraph> {
        let mut raw = RawGraph { name, ..RawGraph::default() };
        let mut outlets: HashMap<(&str, &str), usize> = HashMap::new();
        for layer in &body.layers {
            for port in &layer.outputs {
                outlets.insert((layer.id.as_str(), port.id.as_str()), raw.values.len());
                raw.values.push(port_value(layer, port));
            }
        }
        let mut sources: HashMap<(&str, &str), (&str, &str)> = HashMap::new();
        for edge in &body.edges {
            let target = (edge.to_layer.as_str(), edge.to_port.as_str());
            if sources.contains_key(&target) {
                warn!("Port {} of layer {} has more than one incoming edge", edge.to_port, edge.to_layer);
                continue;
            }
            sources.insert(target, (edge.from_layer.as_str(), edge.from_port.as_str()));
        }
        let source = |layer: &Layer, port: &str| -> LucidResult<ValueRef> {
            let Some(from) = sources.get(&(layer.id.as_str(), port)) else {
                warn!("Port {port} of layer {} is not connected", layer.name);
                return Ok(ValueRef::Absent);
            };
            match outlets.get(from) {
                Some(ix) => Ok(ValueRef::Index(*ix)),
                None => Err(LucidError::integrity(
                    GraphId(0),
                    format!("edge from layer {} port {} to {}", from.0, from.1, layer.name),
                    "no such output port",
                )),
            }
        };

        for layer in &body.layers {
            self.lower.cancel.check()?;
            let input_ports = self.input_ports(body, layer);
            if INPUT_LAYERS.contains(&layer.layer_type.as_str()) {
                for port in &layer.outputs {
                    raw.inputs.push(ValueRef::Index(outlets[&(layer.id.as_str(), port.id.as_str())]));
                }
                continue;
            }
            if OUTPUT_LAYERS.contains(&layer.layer_type.as_str()) {
                for port in input_ports {
                    raw.outputs.push(source(layer, port)?);
                }
                continue;
            }
            let inputs = input_ports
                .into_iter()
                .map(|port| source(layer, port).map(RawPort::of))
                .collect::<LucidResult<Vec<_>>>()?;
            let outputs = layer
                .outputs
                .iter()
                .map(|port| RawPort::index(outlets[&(layer.id.as_str(), port.id.as_str())]))
                .collect();
            trace!("Layer {} ({}): {} inputs", layer.name, layer.layer_type, inputs.len());
            raw.nodes.push(RawNode {
                op_type: layer.layer_type.clone(),
                name: Some(layer.name.clone()),
                domain: layer.version.clone(),
                inputs,
                outputs,
                attributes: self.attributes(layer)?,
                ..RawNode::default()
            });
        }
        Ok(raw)
    }

    /// Declared input ports, or the ports edges lead to when a legacy layer declares none.
    fn input_ports<'b>(&self, body: &'b Body, layer: &'b Layer) -> Vec<&'b str> {
        if !layer.inputs.is_empty() {
            return layer.inputs.iter().map(|p| p.id.as_str()).collect();
        }
        let mut ports = body
            .edges
            .iter()
            .filter(|e| e.to_layer == layer.id)
            .map(|e| e.to_port.as_str())
            .unique()
            .collect::<Vec<_>>();
        ports.sort_by_key(|p| (p.parse::<u64>().unwrap_or(u64::MAX), *p));
        ports
    }

    fn attributes(&self, layer: &Layer) -> LucidResult<Vec<RawAttribute>> {
        let mut attributes = layer
            .data
            .iter()
            .map(|(k, v)| RawAttribute::new(k, RawAttr::String(v.clone())))
            .collect::<Vec<_>>();
        if let Some(precision) = &layer.precision {
            attributes.push(RawAttribute::new("precision", RawAttr::String(precision.clone())));
        }
        for blob in &layer.blobs {
            let offset = blob.offset.map(|o| o.to_string()).unwrap_or_else(|| "?".into());
            let size = blob.size.map(|s| s.to_string()).unwrap_or_else(|| "?".into());
            attributes.push(RawAttribute::new(&blob.name, RawAttr::String(format!("offset: {offset}, size: {size}"))));
        }
        if let Some(body) = &layer.body {
            let graph = self.parse_body(Some(format!("{}/body", layer.name)), body)?;
            attributes.push(RawAttribute::new("body", RawAttr::Graph(GraphRef::Inline(Box::new(graph)))));
        }
        Ok(attributes)
    }
}

impl ProtoModel for Net {
    fn lower(&self, lower: &LowerContext) -> LucidResult<RawModel> {
        let ctx = ParsingContext { lower };
        let main = ctx.parse_body(self.name.clone(), &self.body)?;
        debug!("OpenVINO IR v{}: {} layers, {} edges", self.version, self.body.layers.len(), self.body.edges.len());
        Ok(RawModel {
            version: Some(format!("OpenVINO IR v{}", self.version)),
            properties: self.properties.clone(),
            graphs: vec![main],
            ..RawModel::new(crate::OPENVINO)
        })
    }
}

static CLAIM: Claim = Claim {
    format: crate::OPENVINO,
    signatures: &[Signature::Within(b"<net ")],
    extensions: &["xml"],
    filenames: &[],
};

#[derive(Clone, Debug, Default)]
pub struct Openvino;

impl Framework for Openvino {
    type ProtoModel = Net;

    fn claim(&self) -> &'static Claim {
        &CLAIM
    }

    fn bundled_metadata(&self) -> Option<&'static str> {
        Some(include_str!("openvino-metadata.json"))
    }

    fn proto_model_for_bytes(&self, bytes: &Bytes, _options: &Options) -> LucidResult<Net> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            DecodeError::malformed(crate::OPENVINO, "document is not UTF-8").at(e.valid_up_to())
        })?;
        Ok(Net::parse(text)?)
    }
}
