use crate::proto::op_desc::{Attr, Var};
use crate::proto::var_type::Type;
use crate::proto::{AttrType, BlockDesc, OpDesc, ProgramDesc, TensorDesc, VarDesc};
use lucid_core::internal::*;
use prost::Message;

/// Attributes Paddle adds for its own bookkeeping.
const INTERNAL_ATTRIBUTES: &[&str] =
    &["use_mkldnn", "use_cudnn", "op_callstack", "op_role", "op_role_var", "op_namescope", "is_test"];

fn datum_type(t: i32) -> Option<DatumType> {
    let dt = match Type::from_i32(t)? {
        Type::Bool => DatumType::Bool,
        Type::Int16 => DatumType::I16,
        Type::Int32 => DatumType::I32,
        Type::Int64 => DatumType::I64,
        Type::Fp16 => DatumType::F16,
        Type::Fp32 => DatumType::F32,
        Type::Fp64 => DatumType::F64,
        Type::SizeT => DatumType::U64,
        Type::Uint8 => DatumType::U8,
        Type::Int8 => DatumType::I8,
        Type::Bf16 => DatumType::BF16,
        Type::Complex64 => DatumType::C64,
        Type::Complex128 => DatumType::C128,
        _ => return None,
    };
    Some(dt)
}

/// Program versions pack `major * 10^6 + minor * 10^3 + patch`.
fn version_string(version: i64) -> Option<String> {
    (version > 0).then(|| {
        format!("PaddlePaddle v{}.{}.{}", version / 1_000_000, version / 1_000 % 1_000, version % 1_000)
    })
}

fn tensor_desc(var: &VarDesc) -> Option<&TensorDesc> {
    let t = &var.r#type;
    t.lod_tensor.as_ref().or(t.tensor_array.as_ref()).map(|d| &d.tensor).or(t.selected_rows.as_ref())
}

fn is_feed_or_fetch(var: &VarDesc) -> bool {
    var.r#type.r#type == Type::FeedMinibatch as i32 || var.r#type.r#type == Type::FetchList as i32
}

/// Moves the ports of `parameter` ahead of the others, keeping their order.
fn move_first(ports: &mut Vec<RawPort>, parameter: &str) {
    let (mut first, rest): (Vec<_>, Vec<_>) =
        ports.drain(..).partition(|p| p.parameter.as_deref() == Some(parameter));
    first.extend(rest);
    *ports = first;
}

fn ports(vars: &[Var]) -> Vec<RawPort> {
    vars.iter()
        .flat_map(|var| {
            var.arguments.iter().map(move |arg| RawPort::named(arg).with_parameter(&var.parameter))
        })
        .collect()
}

fn col(op: &OpDesc) -> Option<i32> {
    op.attrs.iter().find(|a| a.name == "col").and_then(|a| a.i)
}

pub struct ParsingContext<'a> {
    pub lower: &'a LowerContext<'a>,
    /// Block `idx` to position in the program.
    pub blocks: HashMap<i32, usize>,
}

impl<'a> ParsingContext<'a> {
    fn block_ref(&self, graph: usize, idx: i32) -> LucidResult<GraphRef> {
        self.blocks
            .get(&idx)
            .map(|pos| GraphRef::Index(*pos))
            .ok_or_else(|| LucidError::integrity(GraphId(graph), format!("block {idx}"), "no such block"))
    }

    fn parse_attr(&self, graph: usize, attr: &Attr) -> LucidResult<Option<RawAttr>> {
        let Some(attr_type) = AttrType::from_i32(attr.r#type) else {
            warn!("Skipping attribute {:?}: unknown type {}", attr.name, attr.r#type);
            return Ok(None);
        };
        let value = match attr_type {
            AttrType::Int => attr.i.map(|i| RawAttr::Int(i as i64)),
            AttrType::Long => attr.l.map(RawAttr::Int),
            AttrType::Float => attr.f.map(|f| RawAttr::Float(f as f64)),
            AttrType::Float64 => attr.float64.map(RawAttr::Float),
            AttrType::String => attr.s.clone().map(RawAttr::String),
            AttrType::Var => attr.var_name.clone().map(RawAttr::String),
            AttrType::Boolean => attr.b.map(RawAttr::Bool),
            AttrType::Ints => Some(RawAttr::Ints(attr.ints.iter().map(|i| *i as i64).collect())),
            AttrType::Longs => Some(RawAttr::Ints(attr.longs.clone())),
            AttrType::Floats => Some(RawAttr::Floats(attr.floats.iter().map(|f| *f as f64).collect())),
            AttrType::Float64s => Some(RawAttr::Floats(attr.float64s.clone())),
            AttrType::Strings => Some(RawAttr::Strings(attr.strings.clone())),
            AttrType::Vars => Some(RawAttr::Strings(attr.vars_name.clone())),
            AttrType::Booleans => Some(RawAttr::Bools(attr.bools.clone())),
            AttrType::Block => match attr.block_idx {
                Some(idx) => Some(RawAttr::Graph(self.block_ref(graph, idx)?)),
                None => None,
            },
            AttrType::Blocks => Some(RawAttr::Graphs(
                attr.blocks_idx.iter().map(|idx| self.block_ref(graph, *idx)).collect::<LucidResult<_>>()?,
            )),
        };
        if value.is_none() {
            warn!("Skipping attribute {:?}: no {attr_type:?} value", attr.name);
        }
        Ok(value)
    }

    fn parse_op(&self, graph: usize, op: &OpDesc) -> LucidResult<RawNode> {
        let mut inputs = ports(&op.inputs);
        move_first(&mut inputs, "X");
        move_first(&mut inputs, "Input");
        let mut outputs = ports(&op.outputs);
        move_first(&mut outputs, "Y");
        move_first(&mut outputs, "Out");
        let mut attributes = vec![];
        for attr in &op.attrs {
            let Some(value) = self.parse_attr(graph, attr)? else { continue };
            let attribute = RawAttribute::new(&attr.name, value);
            attributes.push(if INTERNAL_ATTRIBUTES.contains(&attr.name.as_str()) {
                attribute.hidden()
            } else {
                attribute
            });
        }
        Ok(RawNode { op_type: op.r#type.clone(), inputs, outputs, attributes, ..RawNode::default() })
    }

    fn parse_block(&self, pos: usize, block: &BlockDesc) -> LucidResult<RawGraph> {
        let parent = match block.parent_idx {
            p if p < 0 => None,
            p => Some(*self.blocks.get(&p).ok_or_else(|| {
                DecodeError::malformed(crate::PADDLE, format!("block {} has unknown parent {p}", block.idx))
            })?),
        };
        let mut raw = RawGraph {
            name: (pos != 0).then(|| format!("block_{}", block.idx)),
            parent,
            rebinding: true,
            ..RawGraph::default()
        };
        for var in &block.vars {
            if is_feed_or_fetch(var) {
                continue;
            }
            let mut value = RawValue::named(&var.name);
            if let Some(desc) = tensor_desc(var) {
                value.datum_type = datum_type(desc.data_type);
                value.shape = Some(Shape::from_signed(desc.dims.iter().copied()));
            }
            if var.persistable == Some(true) {
                // weights live in separate parameter files
                value.storage =
                    Some(Storage::External { location: var.name.clone(), offset: None, length: None });
            }
            raw.values.push(value);
        }

        let mut feeds = vec![];
        let mut fetches = vec![];
        for (ix, op) in block.ops.iter().enumerate() {
            self.lower.cancel.check()?;
            match op.r#type.as_str() {
                "feed" => {
                    let names = op.outputs.iter().flat_map(|v| v.arguments.iter());
                    feeds.extend(names.map(|n| (col(op).unwrap_or(ix as i32), n.clone())));
                }
                "fetch" => {
                    let names = op.inputs.iter().flat_map(|v| v.arguments.iter());
                    fetches.extend(names.map(|n| (col(op).unwrap_or(ix as i32), n.clone())));
                }
                _ => raw.nodes.push(self.parse_op(pos, op)?),
            }
        }
        feeds.sort_by_key(|(col, _)| *col);
        fetches.sort_by_key(|(col, _)| *col);
        raw.inputs = feeds.into_iter().map(|(_, n)| ValueRef::Named(n)).collect();
        raw.outputs = fetches.into_iter().map(|(_, n)| ValueRef::Named(n)).collect();
        trace!(
            "Block {}: {} ops, {} inputs, {} outputs",
            block.idx,
            raw.nodes.len(),
            raw.inputs.len(),
            raw.outputs.len()
        );
        Ok(raw)
    }
}

impl ProtoModel for ProgramDesc {
    fn lower(&self, lower: &LowerContext) -> LucidResult<RawModel> {
        let mut blocks = HashMap::new();
        for (pos, block) in self.blocks.iter().enumerate() {
            if blocks.insert(block.idx, pos).is_some() {
                return Err(DecodeError::malformed(crate::PADDLE, format!("block {} appears twice", block.idx)).into());
            }
        }
        let ctx = ParsingContext { lower, blocks };
        let graphs = self
            .blocks
            .iter()
            .enumerate()
            .map(|(pos, block)| ctx.parse_block(pos, block))
            .collect::<LucidResult<Vec<_>>>()?;
        let version = self.version.as_ref().and_then(|v| v.version).and_then(version_string);
        Ok(RawModel { version, graphs, ..RawModel::new(crate::PADDLE) })
    }
}

static CLAIM: Claim = Claim {
    format: crate::PADDLE,
    signatures: &[Signature::At { offset: 0, tokens: &[Token::Byte(0x0a), Token::Varint, Token::Byte(0x08)] }],
    extensions: &["pdmodel", "paddle"],
    filenames: &["__model__"],
};

#[derive(Clone, Debug, Default)]
pub struct Paddle;

impl Framework for Paddle {
    type ProtoModel = ProgramDesc;

    fn claim(&self) -> &'static Claim {
        &CLAIM
    }

    fn bundled_metadata(&self) -> Option<&'static str> {
        Some(include_str!("paddle-metadata.json"))
    }

    fn proto_model_for_bytes(&self, bytes: &Bytes, _options: &Options) -> LucidResult<ProgramDesc> {
        let program = ProgramDesc::decode(bytes.clone()).map_err(|e| DecodeError::protobuf(crate::PADDLE, e))?;
        if program.blocks.is_empty() {
            return Err(DecodeError::missing(crate::PADDLE, "blocks").into());
        }
        Ok(program)
    }
}
