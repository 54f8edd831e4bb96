//! Field layout of the TensorFlow Lite schema (`schema.fbs`), as vtable offsets.
//!
//! The unit structs are the table types checked by the flatbuffers verifier.
use flatbuffers::{ForwardsUOffset, InvalidFlatbuffer, Vector, Verifiable, Verifier};
use lucid_core::internal::*;

type Tables<'a, T> = ForwardsUOffset<Vector<'a, ForwardsUOffset<T>>>;
type Scalars<'a, T> = ForwardsUOffset<Vector<'a, T>>;
type Str<'a> = ForwardsUOffset<&'a str>;

pub struct Model;

impl Verifiable for Model {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<u32>("version", model::VERSION, false)?
            .visit_field::<Tables<OperatorCode>>("operator_codes", model::OPERATOR_CODES, false)?
            .visit_field::<Tables<SubGraph>>("subgraphs", model::SUBGRAPHS, false)?
            .visit_field::<Str>("description", model::DESCRIPTION, false)?
            .visit_field::<Tables<Buffer>>("buffers", model::BUFFERS, false)?
            .visit_field::<Tables<Metadata>>("metadata", model::METADATA, false)?
            .finish();
        Ok(())
    }
}

pub struct OperatorCode;

impl Verifiable for OperatorCode {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<i8>("deprecated_builtin_code", operator_code::DEPRECATED_BUILTIN_CODE, false)?
            .visit_field::<Str>("custom_code", operator_code::CUSTOM_CODE, false)?
            .visit_field::<i32>("version", operator_code::VERSION, false)?
            .visit_field::<i32>("builtin_code", operator_code::BUILTIN_CODE, false)?
            .finish();
        Ok(())
    }
}

pub struct SubGraph;

impl Verifiable for SubGraph {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<Tables<Tensor>>("tensors", subgraph::TENSORS, false)?
            .visit_field::<Scalars<i32>>("inputs", subgraph::INPUTS, false)?
            .visit_field::<Scalars<i32>>("outputs", subgraph::OUTPUTS, false)?
            .visit_field::<Tables<Operator>>("operators", subgraph::OPERATORS, false)?
            .visit_field::<Str>("name", subgraph::NAME, false)?
            .finish();
        Ok(())
    }
}

pub struct Tensor;

impl Verifiable for Tensor {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<Scalars<i32>>("shape", tensor::SHAPE, false)?
            .visit_field::<i8>("type", tensor::TYPE, false)?
            .visit_field::<u32>("buffer", tensor::BUFFER, false)?
            .visit_field::<Str>("name", tensor::NAME, false)?
            .visit_field::<ForwardsUOffset<QuantizationParameters>>("quantization", tensor::QUANTIZATION, false)?
            .visit_field::<Scalars<i32>>("shape_signature", tensor::SHAPE_SIGNATURE, false)?
            .finish();
        Ok(())
    }
}

pub struct QuantizationParameters;

impl Verifiable for QuantizationParameters {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<Scalars<f32>>("min", quantization::MIN, false)?
            .visit_field::<Scalars<f32>>("max", quantization::MAX, false)?
            .visit_field::<Scalars<f32>>("scale", quantization::SCALE, false)?
            .visit_field::<Scalars<i64>>("zero_point", quantization::ZERO_POINT, false)?
            .visit_field::<i32>("quantized_dimension", quantization::QUANTIZED_DIMENSION, false)?
            .finish();
        Ok(())
    }
}

pub struct Operator;

impl Verifiable for Operator {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<u32>("opcode_index", operator::OPCODE_INDEX, false)?
            .visit_field::<Scalars<i32>>("inputs", operator::INPUTS, false)?
            .visit_field::<Scalars<i32>>("outputs", operator::OUTPUTS, false)?
            .visit_field::<u8>("builtin_options_type", operator::BUILTIN_OPTIONS_TYPE, false)?
            .visit_field::<ForwardsUOffset<AnyTable>>("builtin_options", operator::BUILTIN_OPTIONS, false)?
            .visit_field::<Scalars<u8>>("custom_options", operator::CUSTOM_OPTIONS, false)?
            .finish();
        Ok(())
    }
}

pub struct Buffer;

impl Verifiable for Buffer {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<Scalars<u8>>("data", buffer::DATA, false)?
            .visit_field::<u64>("offset", buffer::OFFSET, false)?
            .visit_field::<u64>("size", buffer::SIZE, false)?
            .finish();
        Ok(())
    }
}

pub struct Metadata;

impl Verifiable for Metadata {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<Str>("name", metadata::NAME, false)?
            .visit_field::<u32>("buffer", metadata::BUFFER, false)?
            .finish();
        Ok(())
    }
}

pub mod model {
    use super::voffset;
    pub const VERSION: u16 = voffset(0);
    pub const OPERATOR_CODES: u16 = voffset(1);
    pub const SUBGRAPHS: u16 = voffset(2);
    pub const DESCRIPTION: u16 = voffset(3);
    pub const BUFFERS: u16 = voffset(4);
    pub const METADATA: u16 = voffset(6);
}

pub mod subgraph {
    use super::voffset;
    pub const TENSORS: u16 = voffset(0);
    pub const INPUTS: u16 = voffset(1);
    pub const OUTPUTS: u16 = voffset(2);
    pub const OPERATORS: u16 = voffset(3);
    pub const NAME: u16 = voffset(4);
}

pub mod tensor {
    use super::voffset;
    pub const SHAPE: u16 = voffset(0);
    pub const TYPE: u16 = voffset(1);
    pub const BUFFER: u16 = voffset(2);
    pub const NAME: u16 = voffset(3);
    pub const QUANTIZATION: u16 = voffset(4);
    pub const SHAPE_SIGNATURE: u16 = voffset(7);
}

pub mod quantization {
    use super::voffset;
    pub const MIN: u16 = voffset(0);
    pub const MAX: u16 = voffset(1);
    pub const SCALE: u16 = voffset(2);
    pub const ZERO_POINT: u16 = voffset(3);
    pub const QUANTIZED_DIMENSION: u16 = voffset(6);
}

pub mod operator {
    use super::voffset;
    pub const OPCODE_INDEX: u16 = voffset(0);
    pub const INPUTS: u16 = voffset(1);
    pub const OUTPUTS: u16 = voffset(2);
    pub const BUILTIN_OPTIONS_TYPE: u16 = voffset(3);
    pub const BUILTIN_OPTIONS: u16 = voffset(4);
    pub const CUSTOM_OPTIONS: u16 = voffset(5);
}

pub mod operator_code {
    use super::voffset;
    pub const DEPRECATED_BUILTIN_CODE: u16 = voffset(0);
    pub const CUSTOM_CODE: u16 = voffset(1);
    pub const VERSION: u16 = voffset(2);
    pub const BUILTIN_CODE: u16 = voffset(3);
}

pub mod buffer {
    use super::voffset;
    pub const DATA: u16 = voffset(0);
    /// Large models keep buffer data after the flatbuffer, at an absolute file offset.
    pub const OFFSET: u16 = voffset(1);
    pub const SIZE: u16 = voffset(2);
}

pub mod metadata {
    use super::voffset;
    pub const NAME: u16 = voffset(0);
    pub const BUFFER: u16 = voffset(1);
}

/// `BuiltinOptions` union tags with sub-graph references.
pub mod options {
    pub const IF: u8 = 92;
    pub const WHILE: u8 = 93;
    pub const CALL_ONCE: u8 = 103;
}

pub const CUSTOM: i32 = 32;

/// `BuiltinOperator` names, indexed by code.
pub const BUILTIN_OPERATORS: &[&str] = &[
    "ADD",
    "AVERAGE_POOL_2D",
    "CONCATENATION",
    "CONV_2D",
    "DEPTHWISE_CONV_2D",
    "DEPTH_TO_SPACE",
    "DEQUANTIZE",
    "EMBEDDING_LOOKUP",
    "FLOOR",
    "FULLY_CONNECTED",
    "HASHTABLE_LOOKUP",
    "L2_NORMALIZATION",
    "L2_POOL_2D",
    "LOCAL_RESPONSE_NORMALIZATION",
    "LOGISTIC",
    "LSH_PROJECTION",
    "LSTM",
    "MAX_POOL_2D",
    "MUL",
    "RELU",
    "RELU_N1_TO_1",
    "RELU6",
    "RESHAPE",
    "RESIZE_BILINEAR",
    "RNN",
    "SOFTMAX",
    "SPACE_TO_DEPTH",
    "SVDF",
    "TANH",
    "CONCAT_EMBEDDINGS",
    "SKIP_GRAM",
    "CALL",
    "CUSTOM",
    "EMBEDDING_LOOKUP_SPARSE",
    "PAD",
    "UNIDIRECTIONAL_SEQUENCE_RNN",
    "GATHER",
    "BATCH_TO_SPACE_ND",
    "SPACE_TO_BATCH_ND",
    "TRANSPOSE",
    "MEAN",
    "SUB",
    "DIV",
    "SQUEEZE",
    "UNIDIRECTIONAL_SEQUENCE_LSTM",
    "STRIDED_SLICE",
    "BIDIRECTIONAL_SEQUENCE_RNN",
    "EXP",
    "TOPK_V2",
    "SPLIT",
    "LOG_SOFTMAX",
    "DELEGATE",
    "BIDIRECTIONAL_SEQUENCE_LSTM",
    "CAST",
    "PRELU",
    "MAXIMUM",
    "ARG_MAX",
    "MINIMUM",
    "LESS",
    "NEG",
    "PADV2",
    "GREATER",
    "GREATER_EQUAL",
    "LESS_EQUAL",
    "SELECT",
    "SLICE",
    "SIN",
    "TRANSPOSE_CONV",
    "SPARSE_TO_DENSE",
    "TILE",
    "EXPAND_DIMS",
    "EQUAL",
    "NOT_EQUAL",
    "LOG",
    "SUM",
    "SQRT",
    "RSQRT",
    "SHAPE",
    "POW",
    "ARG_MIN",
    "FAKE_QUANT",
    "REDUCE_PROD",
    "REDUCE_MAX",
    "PACK",
    "LOGICAL_OR",
    "ONE_HOT",
    "LOGICAL_AND",
    "LOGICAL_NOT",
    "UNPACK",
    "REDUCE_MIN",
    "FLOOR_DIV",
    "REDUCE_ANY",
    "SQUARE",
    "ZEROS_LIKE",
    "FILL",
    "FLOOR_MOD",
    "RANGE",
    "RESIZE_NEAREST_NEIGHBOR",
    "LEAKY_RELU",
    "SQUARED_DIFFERENCE",
    "MIRROR_PAD",
    "ABS",
    "SPLIT_V",
    "UNIQUE",
    "CEIL",
    "REVERSE_V2",
    "ADD_N",
    "GATHER_ND",
    "COS",
    "WHERE",
    "RANK",
    "ELU",
    "REVERSE_SEQUENCE",
    "MATRIX_DIAG",
    "QUANTIZE",
    "MATRIX_SET_DIAG",
    "ROUND",
    "HARD_SWISH",
    "IF",
    "WHILE",
    "NON_MAX_SUPPRESSION_V4",
    "NON_MAX_SUPPRESSION_V5",
    "SCATTER_ND",
    "SELECT_V2",
    "DENSIFY",
    "SEGMENT_SUM",
    "BATCH_MATMUL",
    "PLACEHOLDER_FOR_GREATER_OP_CODES",
    "CUMSUM",
    "CALL_ONCE",
    "BROADCAST_TO",
    "RFFT2D",
    "CONV_3D",
    "IMAG",
    "REAL",
    "COMPLEX_ABS",
    "HASHTABLE",
    "HASHTABLE_FIND",
    "HASHTABLE_IMPORT",
    "HASHTABLE_SIZE",
    "REDUCE_ALL",
    "CONV_3D_TRANSPOSE",
    "VAR_HANDLE",
    "READ_VARIABLE",
    "ASSIGN_VARIABLE",
    "BROADCAST_ARGS",
    "RANDOM_STANDARD_NORMAL",
    "BUCKETIZE",
    "RANDOM_UNIFORM",
    "MULTINOMIAL",
    "GELU",
    "DYNAMIC_UPDATE_SLICE",
    "RELU_0_TO_1",
    "UNSORTED_SEGMENT_PROD",
    "UNSORTED_SEGMENT_MAX",
    "UNSORTED_SEGMENT_SUM",
    "ATAN2",
    "UNSORTED_SEGMENT_MIN",
    "SIGN",
    "BITCAST",
    "BITWISE_XOR",
    "RIGHT_SHIFT",
];

/// Operator type shown for a builtin code: `CONV_2D` becomes `Conv2D`.
pub fn builtin_name(code: i32) -> Option<String> {
    let name = BUILTIN_OPERATORS.get(usize::try_from(code).ok()?)?;
    Some(
        name.split('_')
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) if first.is_ascii_digit() => part.to_string(),
                    Some(first) => first.to_string() + &chars.as_str().to_ascii_lowercase(),
                    None => String::new(),
                }
            })
            .collect(),
    )
}

pub fn tensor_type(t: i8) -> Option<DatumType> {
    let dt = match t {
        0 => DatumType::F32,
        1 => DatumType::F16,
        2 => DatumType::I32,
        3 => DatumType::U8,
        4 => DatumType::I64,
        5 => DatumType::String,
        6 => DatumType::Bool,
        7 => DatumType::I16,
        8 => DatumType::C64,
        9 => DatumType::I8,
        10 => DatumType::F64,
        11 => DatumType::C128,
        12 => DatumType::U64,
        13 => DatumType::Resource,
        14 => DatumType::Variant,
        15 => DatumType::U32,
        16 => DatumType::U16,
        17 => DatumType::I4,
        18 => DatumType::BF16,
        _ => return None,
    };
    Some(dt)
}
