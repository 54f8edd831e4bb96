use crate::schema::{self, any_layer, base, bindable, const_data, const_tensor, graph, input_slot, layer_table, output_slot, tensor_info};
use lucid_core::internal::*;

/// `featureVersions` of the serialized graph.
mod feature_versions {
    pub const NAMES: &[&str] = &["bindingIdsScheme", "weightsLayoutScheme", "constantTensorsAsInputs"];
}

#[derive(Clone, Debug)]
pub struct ArmnnProtoModel {
    bytes: Bytes,
}

impl ArmnnProtoModel {
    fn new(bytes: Bytes) -> LucidResult<ArmnnProtoModel> {
        let proto = ArmnnProtoModel { bytes };
        let fb = proto.flat();
        if fb.identifier() != Some(&b"ARMN"[..]) {
            return Err(DecodeError::new(
                crate::ARMNN,
                DecodeErrorKind::MalformedHeader,
                "expected file identifier \"ARMN\"",
            )
            .at(4)
            .into());
        }
        fb.root::<schema::SerializedGraph>()?;
        Ok(proto)
    }

    fn flat(&self) -> FlatBuffer<'_> {
        FlatBuffer::new(&self.bytes, crate::ARMNN)
    }
}

struct Layer<'a> {
    tag: u8,
    op_type: String,
    table: Table<'a>,
    base: Table<'a>,
    index: u32,
    name: Option<&'a str>,
    binding_id: Option<i32>,
}

fn any_layer_entry<'a>(any: &Table<'a>) -> DecodeResult<Option<Layer<'a>>> {
    let Some((tag, table)) = any.union(any_layer::LAYER_TYPE, any_layer::LAYER)? else {
        return Ok(None);
    };
    let op_type = match schema::layer_name(tag) {
        Some(name) => name.to_string(),
        None => {
            warn!("Unknown Arm NN layer type {tag}");
            format!("Layer{tag}")
        }
    };
    let outer = table.table(layer_table::BASE)?.ok_or_else(|| DecodeError::missing(crate::ARMNN, "base"))?;
    let (base, binding_id) = if tag == schema::INPUT_LAYER || tag == schema::OUTPUT_LAYER {
        let base = outer.table(bindable::BASE)?.ok_or_else(|| DecodeError::missing(crate::ARMNN, "base.base"))?;
        (base, Some(outer.scalar::<i32>(bindable::BINDING_ID, 0)?))
    } else {
        (outer, None)
    };
    let index = base.scalar::<u32>(base::INDEX, 0)?;
    let name = base.str(base::NAME)?.filter(|n| !n.is_empty());
    Ok(Some(Layer { tag, op_type, table, base, index, name, binding_id }))
}

fn tensor_value(info: &Table) -> DecodeResult<RawValue> {
    let dims = info.scalars::<u32>(tensor_info::DIMENSIONS)?.unwrap_or_default();
    let dt = schema::data_type(info.scalar::<i8>(tensor_info::DATA_TYPE, 0)?);
    let quantization = match dt {
        Some((_, true)) => {
            let offset = info.scalar::<i32>(tensor_info::OFFSET, 0)? as i64;
            let scales = info.scalars::<f32>(tensor_info::SCALES)?.unwrap_or_default();
            if scales.len() > 1 {
                let axis = info.scalar::<u32>(tensor_info::QUANTIZATION_DIM, 0)? as usize;
                Some(Quantization { scale: scales, zero_point: vec![offset], axis: Some(axis), ..Quantization::default() })
            } else {
                Some(Quantization::per_tensor(info.scalar::<f32>(tensor_info::SCALE, 1.0)?, offset))
            }
        }
        _ => None,
    };
    Ok(RawValue {
        name: None,
        datum_type: dt.map(|(dt, _)| dt),
        shape: Some(dims.into_iter().map(|d| d as u64).collect()),
        storage: None,
        quantization,
    })
}

struct ParsingContext<'a> {
    lower: &'a LowerContext<'a>,
    bytes: &'a Bytes,
    raw: RawGraph,
    /// Value index of every (layer index, output slot).
    slots: HashMap<(u32, u32), usize>,
}

impl<'a> ParsingContext<'a> {
    fn const_tensor(&self, table: &Table) -> DecodeResult<RawValue> {
        let mut value = match table.table(const_tensor::INFO)? {
            Some(info) => tensor_value(&info)?,
            None => RawValue::default(),
        };
        if let Some((tag, data)) = table.union(const_tensor::DATA_TYPE, const_tensor::DATA)? {
            let values = match tag {
                const_data::BYTE => data.vector_bytes::<i8>(const_tensor::VALUES)?,
                const_data::SHORT => data.vector_bytes::<i16>(const_tensor::VALUES)?,
                const_data::INT => data.vector_bytes::<i32>(const_tensor::VALUES)?,
                const_data::LONG => data.vector_bytes::<i64>(const_tensor::VALUES)?,
                _ => {
                    warn!("Unknown constant tensor data type {tag}");
                    None
                }
            };
            if let Some(values) = values {
                value.storage = Some(Storage::Raw(self.bytes.slice_ref(values)));
            }
        }
        Ok(value)
    }

    fn declare(&mut self, value: RawValue) -> usize {
        self.raw.values.push(value);
        self.raw.values.len() - 1
    }

    fn declare_outputs(&mut self, layer: &Layer) -> DecodeResult<()> {
        let Some(slots) = layer.base.tables(base::OUTPUT_SLOTS)? else { return Ok(()) };
        for (ix, slot) in slots.iter().enumerate() {
            let mut value = match slot.table(output_slot::TENSOR_INFO)? {
                Some(info) => tensor_value(&info)?,
                None => RawValue::default(),
            };
            if layer.tag == schema::INPUT_LAYER || layer.tag == schema::CONSTANT_LAYER {
                value.name = layer.name.map(String::from);
            }
            if layer.tag == schema::CONSTANT_LAYER {
                if let Some(input) = layer.table.table(layer_table::CONSTANT)? {
                    let konst = self.const_tensor(&input)?;
                    value.storage = konst.storage;
                    value.datum_type = value.datum_type.or(konst.datum_type);
                }
            }
            let vix = self.declare(value);
            self.slots.insert((layer.index, ix as u32), vix);
        }
        Ok(())
    }

    fn connections(&self, layer: &Layer) -> LucidResult<Vec<ValueRef>> {
        let Some(slots) = layer.base.tables(base::INPUT_SLOTS)? else { return Ok(vec![]) };
        let mut refs = vec![];
        for slot in slots {
            let connection = slot
                .struct_bytes::<{ input_slot::CONNECTION_SIZE }>(input_slot::CONNECTION)?
                .ok_or_else(|| DecodeError::missing(crate::ARMNN, "connection"))?;
            let source = struct_field::<u32>(connection, 0).unwrap_or_default();
            let output = struct_field::<u32>(connection, 4).unwrap_or_default();
            let Some(vix) = self.slots.get(&(source, output)) else {
                return Err(LucidError::integrity(
                    GraphId(0),
                    format!("output slot {output} of layer {source}"),
                    "no such layer output",
                ));
            };
            refs.push(ValueRef::Index(*vix));
        }
        Ok(refs)
    }

    fn parse_layer(&mut self, layer: &Layer) -> LucidResult<RawNode> {
        let mut inputs = self.connections(layer)?.into_iter().map(RawPort::of).collect::<Vec<_>>();
        for (field, port) in schema::const_tensor_fields(layer.tag) {
            let Some(table) = layer.table.table(voffset(*field))? else { continue };
            let mut value = self.const_tensor(&table)?;
            value.name = Some(format!("{}/{port}", layer.name.unwrap_or(&layer.op_type)));
            let vix = self.declare(value);
            inputs.push(RawPort::index(vix).with_parameter(*port));
        }
        let mut attributes = vec![];
        if let Some(descriptor) = layer.table.table(layer_table::DESCRIPTOR)? {
            match self.lower.metadata.get(&layer.op_type) {
                Some(op) => attributes = schema_attributes(&descriptor, op)?,
                None => trace!("No descriptor schema for {}", layer.op_type),
            }
        }
        let slots = layer.base.tables(base::OUTPUT_SLOTS)?.map(|v| v.len()).unwrap_or(0);
        let outputs = (0..slots as u32)
            .filter_map(|slot| self.slots.get(&(layer.index, slot)))
            .map(|vix| RawPort::index(*vix))
            .collect();
        trace!("Creating node {} ({:?})", layer.op_type, layer.name);
        Ok(RawNode {
            op_type: layer.op_type.clone(),
            name: layer.name.map(String::from),
            inputs,
            outputs,
            attributes,
            ..RawNode::default()
        })
    }
}

/// Orders bound layers by the position of their binding id in `ids`, then by layer order.
fn bound(mut found: Vec<(Option<i32>, ValueRef)>, ids: &[i32]) -> Vec<ValueRef> {
    found.sort_by_key(|(id, _)| id.and_then(|id| ids.iter().position(|i| *i == id)).unwrap_or(usize::MAX));
    found.into_iter().map(|(_, v)| v).collect()
}

impl ProtoModel for ArmnnProtoModel {
    fn lower(&self, lower: &LowerContext) -> LucidResult<RawModel> {
        let root = self.flat().root::<schema::SerializedGraph>()?;
        let tables = root.tables(graph::LAYERS)?.ok_or_else(|| DecodeError::missing(crate::ARMNN, "layers"))?;
        let mut layers = vec![];
        for (ix, any) in tables.iter().enumerate() {
            match any_layer_entry(any).context(format!("layer #{ix}"))? {
                Some(l) => layers.push(l),
                None => warn!("Skipping empty layer #{ix}"),
            }
        }
        let ids = |vo| -> DecodeResult<Vec<i32>> {
            Ok(root.scalars::<i32>(vo)?.unwrap_or_default())
        };
        let (input_ids, output_ids) = (ids(graph::INPUT_IDS)?, ids(graph::OUTPUT_IDS)?);

        let mut ctx = ParsingContext { lower, bytes: &self.bytes, raw: RawGraph::default(), slots: HashMap::new() };
        for l in &layers {
            ctx.declare_outputs(l).context(format!("layer {:?}", l.op_type))?;
        }
        let (mut inputs, mut outputs) = (vec![], vec![]);
        for l in &layers {
            lower.cancel.check()?;
            match l.tag {
                schema::INPUT_LAYER => {
                    if let Some(vix) = ctx.slots.get(&(l.index, 0)) {
                        inputs.push((l.binding_id, ValueRef::Index(*vix)));
                    }
                }
                schema::OUTPUT_LAYER => {
                    outputs.extend(ctx.connections(l)?.into_iter().map(|v| (l.binding_id, v)));
                }
                schema::CONSTANT_LAYER => (),
                _ => {
                    let node = ctx.parse_layer(l)?;
                    ctx.raw.nodes.push(node);
                }
            }
        }
        ctx.raw.inputs = bound(inputs, &input_ids);
        ctx.raw.outputs = bound(outputs, &output_ids);

        let mut properties = vec![];
        if let Some(features) = root.table(graph::FEATURE_VERSIONS)? {
            for (ix, name) in feature_versions::NAMES.iter().enumerate() {
                if let Some(v) = features.opt_scalar::<u32>(voffset(ix))? {
                    properties.push((name.to_string(), v.to_string()));
                }
            }
        }
        Ok(RawModel {
            producer: Some("Arm NN".into()),
            properties,
            graphs: vec![ctx.raw],
            ..RawModel::new(crate::ARMNN)
        })
    }
}

static CLAIM: Claim = Claim {
    format: crate::ARMNN,
    signatures: &[Signature::At {
        offset: 4,
        tokens: &[Token::Byte(b'A'), Token::Byte(b'R'), Token::Byte(b'M'), Token::Byte(b'N')],
    }],
    extensions: &["armnn"],
    filenames: &[],
};

#[derive(Clone, Debug, Default)]
pub struct Armnn;

impl Framework for Armnn {
    type ProtoModel = ArmnnProtoModel;

    fn claim(&self) -> &'static Claim {
        &CLAIM
    }

    fn bundled_metadata(&self) -> Option<&'static str> {
        Some(include_str!("armnn-metadata.json"))
    }

    fn proto_model_for_bytes(&self, bytes: &Bytes, _options: &Options) -> LucidResult<ArmnnProtoModel> {
        ArmnnProtoModel::new(bytes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_follow_id_order() {
        let found = vec![
            (Some(7), ValueRef::Index(0)),
            (Some(3), ValueRef::Index(1)),
            (None, ValueRef::Index(2)),
        ];
        assert_eq!(bound(found, &[3, 7]), vec![ValueRef::Index(1), ValueRef::Index(0), ValueRef::Index(2)]);
    }
}
