use crate::schema::{self, buffer, metadata, model, operator, operator_code, options, quantization, subgraph, tensor};
use lucid_core::internal::*;
use std::collections::HashSet;

/// Newest schema version this decoder knows about.
pub const MAX_SCHEMA_VERSION: u32 = 3;

#[derive(Clone, Debug)]
pub struct TfliteProtoModel {
    bytes: Bytes,
}

impl TfliteProtoModel {
    fn new(bytes: Bytes) -> LucidResult<TfliteProtoModel> {
        let proto = TfliteProtoModel { bytes };
        let fb = proto.flat();
        if fb.identifier() != Some(&b"TFL3"[..]) {
            let found = fb.identifier().map(|id| String::from_utf8_lossy(id).into_owned());
            return Err(DecodeError::new(
                crate::TFLITE,
                DecodeErrorKind::MalformedHeader,
                format!("expected file identifier \"TFL3\", found {found:?}"),
            )
            .at(4)
            .into());
        }
        let version = fb.root::<schema::Model>()?.scalar::<u32>(model::VERSION, 0)?;
        if version > MAX_SCHEMA_VERSION {
            return Err(DecodeError::unsupported_version(crate::TFLITE, version).into());
        }
        Ok(proto)
    }

    fn flat(&self) -> FlatBuffer<'_> {
        FlatBuffer::new(&self.bytes, crate::TFLITE)
    }

    /// Buffer payloads, shared with the model bytes.
    fn buffers(&self, root: &Table) -> DecodeResult<Vec<Option<Bytes>>> {
        let Some(buffers) = root.tables(model::BUFFERS)? else { return Ok(vec![]) };
        let mut payloads = vec![];
        for table in buffers {
            let offset = table.scalar::<u64>(buffer::OFFSET, 0)? as usize;
            let size = table.scalar::<u64>(buffer::SIZE, 0)? as usize;
            let payload = if offset > 1 {
                let end = offset.checked_add(size).filter(|end| *end <= self.bytes.len());
                match end {
                    Some(end) => Some(self.bytes.slice(offset..end)),
                    None => {
                        return Err(DecodeError::truncated(crate::TFLITE, format!("buffer of {size} bytes")).at(offset));
                    }
                }
            } else {
                table.vector_bytes::<u8>(buffer::DATA)?.filter(|data| !data.is_empty()).map(|data| self.bytes.slice_ref(data))
            };
            payloads.push(payload);
        }
        Ok(payloads)
    }
}

struct ParsingContext<'a> {
    lower: &'a LowerContext<'a>,
    opcodes: Vec<OpCode>,
    buffers: Vec<Option<Bytes>>,
    graph_count: usize,
}

#[derive(Clone, Debug)]
struct OpCode {
    op_type: String,
    builtin: i32,
}

fn opcode(table: &Table) -> DecodeResult<OpCode> {
    let deprecated = table.scalar::<i8>(operator_code::DEPRECATED_BUILTIN_CODE, 0)? as i32;
    let builtin = table.scalar::<i32>(operator_code::BUILTIN_CODE, 0)?.max(deprecated);
    let op_type = if builtin == schema::CUSTOM {
        table.str(operator_code::CUSTOM_CODE)?.unwrap_or("Custom").to_string()
    } else {
        schema::builtin_name(builtin).unwrap_or_else(|| format!("Builtin{builtin}"))
    };
    Ok(OpCode { op_type, builtin })
}

fn quantization(table: &Table) -> DecodeResult<Option<Quantization>> {
    let floats = |vo| -> DecodeResult<Vec<f32>> { Ok(table.scalars::<f32>(vo)?.unwrap_or_default()) };
    let q = Quantization {
        scale: floats(quantization::SCALE)?,
        zero_point: table.scalars::<i64>(quantization::ZERO_POINT)?.unwrap_or_default(),
        min: floats(quantization::MIN)?,
        max: floats(quantization::MAX)?,
        axis: None,
    };
    if q.is_empty() {
        return Ok(None);
    }
    let axis = (q.scale.len() > 1).then(|| table.scalar::<i32>(quantization::QUANTIZED_DIMENSION, 0)).transpose()?;
    Ok(Some(Quantization { axis: axis.map(|a| a.max(0) as usize), ..q }))
}

impl<'a> ParsingContext<'a> {
    fn value(&self, table: &Table, names: &mut HashSet<String>, ix: usize) -> DecodeResult<RawValue> {
        let shape = match table.scalars::<i32>(tensor::SHAPE_SIGNATURE)? {
            Some(sig) if !sig.is_empty() => Some(sig),
            _ => table.scalars::<i32>(tensor::SHAPE)?,
        };
        let shape = shape.map(|dims| Shape::from_signed(dims.into_iter().map(i64::from)));
        let datum_type = schema::tensor_type(table.scalar::<i8>(tensor::TYPE, 0)?);
        let buffer = table.scalar::<u32>(tensor::BUFFER, 0)? as usize;
        let storage = match self.buffers.get(buffer) {
            Some(Some(bytes)) if buffer > 0 => Some(Storage::Raw(bytes.clone())),
            _ => None,
        };
        let name = match table.str(tensor::NAME)? {
            Some(name) if !name.is_empty() && names.insert(name.to_string()) => Some(name.to_string()),
            Some(name) if !name.is_empty() => {
                trace!("Tensor name {name:?} repeated at #{ix}");
                Some(format!("{name}#{ix}"))
            }
            _ => None,
        };
        let quantization = table.table(tensor::QUANTIZATION)?.map(|q| quantization(&q)).transpose()?.flatten();
        Ok(RawValue { name, datum_type, shape, storage, quantization })
    }

    fn indices(table: &Table, vo: u16) -> DecodeResult<Vec<ValueRef>> {
        let ixs = table.scalars::<i32>(vo)?.unwrap_or_default();
        Ok(ixs.into_iter().map(|ix| ValueRef::index_or_absent(ix as i64)).collect())
    }

    fn graph_ref(&self, options: &Table, vo: u16, what: &str) -> DecodeResult<RawAttr> {
        let ix = options.scalar::<i32>(vo, 0)?;
        if ix < 0 || ix as usize >= self.graph_count {
            return Err(DecodeError::malformed(crate::TFLITE, format!("{what} refers to subgraph {ix}")));
        }
        Ok(RawAttr::Graph(GraphRef::Index(ix as usize)))
    }

    fn parse_operator(&self, table: &Table) -> DecodeResult<RawNode> {
        let index = table.scalar::<u32>(operator::OPCODE_INDEX, 0)? as usize;
        let opcode = self
            .opcodes
            .get(index)
            .ok_or_else(|| DecodeError::malformed(crate::TFLITE, format!("operator code #{index} out of range")))?;
        let mut attributes = vec![];
        if let Some((tag, opts)) = table.union(operator::BUILTIN_OPTIONS_TYPE, operator::BUILTIN_OPTIONS)? {
            match tag {
                options::IF => {
                    attributes.push(RawAttribute::new("then_subgraph", self.graph_ref(&opts, voffset(0), "then")?));
                    attributes.push(RawAttribute::new("else_subgraph", self.graph_ref(&opts, voffset(1), "else")?));
                }
                options::WHILE => {
                    attributes.push(RawAttribute::new("cond_subgraph", self.graph_ref(&opts, voffset(0), "cond")?));
                    attributes.push(RawAttribute::new("body_subgraph", self.graph_ref(&opts, voffset(1), "body")?));
                }
                options::CALL_ONCE => {
                    attributes.push(RawAttribute::new("init_subgraph", self.graph_ref(&opts, voffset(0), "init")?));
                }
                _ => match self.lower.metadata.get(&opcode.op_type) {
                    Some(descriptor) => attributes.extend(schema_attributes(&opts, descriptor)?),
                    None => trace!("No schema for options of {}", opcode.op_type),
                },
            }
        }
        if let Some(bytes) = table.vector_bytes::<u8>(operator::CUSTOM_OPTIONS)? {
            let value = RawValue::default()
                .with_type(DatumType::U8)
                .with_shape(Shape::from_signed([bytes.len() as i64]))
                .with_storage(Storage::raw(bytes.to_vec()));
            attributes.push(RawAttribute::new("custom_options", RawAttr::Tensor(Box::new(value))));
        }
        trace!("Creating node {} (builtin {})", opcode.op_type, opcode.builtin);
        Ok(RawNode {
            op_type: opcode.op_type.clone(),
            inputs: Self::indices(table, operator::INPUTS)?.into_iter().map(RawPort::of).collect(),
            outputs: Self::indices(table, operator::OUTPUTS)?.into_iter().map(RawPort::of).collect(),
            attributes,
            ..RawNode::default()
        })
    }

    fn parse_subgraph(&self, table: &Table) -> LucidResult<RawGraph> {
        let mut raw = RawGraph { name: table.str(subgraph::NAME)?.map(String::from), ..RawGraph::default() };
        let mut names = HashSet::new();
        if let Some(tensors) = table.tables(subgraph::TENSORS)? {
            for (ix, t) in tensors.iter().enumerate() {
                raw.values.push(self.value(t, &mut names, ix).context(format!("tensor #{ix}"))?);
            }
        }
        raw.inputs = Self::indices(table, subgraph::INPUTS)?;
        raw.outputs = Self::indices(table, subgraph::OUTPUTS)?;
        if let Some(operators) = table.tables(subgraph::OPERATORS)? {
            for (ix, op) in operators.iter().enumerate() {
                self.lower.cancel.check()?;
                raw.nodes.push(self.parse_operator(op).context(format!("operator #{ix}"))?);
            }
        }
        Ok(raw)
    }
}

fn model_metadata(root: &Table, buffers: &[Option<Bytes>]) -> DecodeResult<Vec<(String, String)>> {
    let Some(entries) = root.tables(model::METADATA)? else { return Ok(vec![]) };
    let mut properties = vec![];
    for entry in entries {
        let Some(name) = entry.str(metadata::NAME)? else { continue };
        let buffer = entry.scalar::<u32>(metadata::BUFFER, 0)? as usize;
        let value = match buffers.get(buffer) {
            Some(Some(bytes)) => match std::str::from_utf8(bytes) {
                Ok(s) if s.trim_end_matches('\0').chars().all(|c| !c.is_control()) => {
                    s.trim_end_matches('\0').to_string()
                }
                _ => format!("{} bytes", bytes.len()),
            },
            _ => continue,
        };
        properties.push((name.to_string(), value));
    }
    Ok(properties)
}

impl ProtoModel for TfliteProtoModel {
    fn lower(&self, lower: &LowerContext) -> LucidResult<RawModel> {
        let root = self.flat().root::<schema::Model>()?;
        let version = root.scalar::<u32>(model::VERSION, 0)?;
        let buffers = self.buffers(&root)?;
        let opcodes = match root.tables(model::OPERATOR_CODES)? {
            Some(codes) => codes.iter().map(opcode).collect::<DecodeResult<Vec<_>>>()?,
            None => vec![],
        };
        let subgraphs = root
            .tables(model::SUBGRAPHS)?
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DecodeError::missing(crate::TFLITE, "subgraphs"))?;
        let ctx = ParsingContext { lower, opcodes, buffers, graph_count: subgraphs.len() };
        let mut graphs = vec![];
        for (ix, sub) in subgraphs.iter().enumerate() {
            lower.cancel.check()?;
            graphs.push(ctx.parse_subgraph(sub).context(format!("subgraph #{ix}"))?);
        }
        let properties = model_metadata(&root, &ctx.buffers)?;
        let description = root.str(model::DESCRIPTION)?.filter(|d| !d.is_empty()).map(String::from);
        Ok(RawModel {
            producer: description.clone(),
            version: Some(format!("TensorFlow Lite v{version}")),
            description,
            properties,
            graphs,
            ..RawModel::new(crate::TFLITE)
        })
    }
}

static CLAIM: Claim = Claim {
    format: crate::TFLITE,
    signatures: &[Signature::At {
        offset: 4,
        tokens: &[Token::Byte(b'T'), Token::Byte(b'F'), Token::Byte(b'L'), Token::Byte(b'3')],
    }],
    extensions: &["tflite", "lite"],
    filenames: &[],
};

#[derive(Clone, Debug, Default)]
pub struct Tflite;

impl Framework for Tflite {
    type ProtoModel = TfliteProtoModel;

    fn claim(&self) -> &'static Claim {
        &CLAIM
    }

    fn bundled_metadata(&self) -> Option<&'static str> {
        Some(include_str!("tflite-metadata.json"))
    }

    fn proto_model_for_bytes(&self, bytes: &Bytes, _options: &Options) -> LucidResult<TfliteProtoModel> {
        TfliteProtoModel::new(bytes.clone())
    }
}
