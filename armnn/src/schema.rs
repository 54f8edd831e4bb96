//! Field layout of the Arm NN serializer schema (`ArmnnSchema.fbs`).
use flatbuffers::{ForwardsUOffset, InvalidFlatbuffer, Vector, Verifiable, Verifier};
use lucid_core::internal::*;

/// Root table, checked down to each layer's base and slots.
pub struct SerializedGraph;

impl Verifiable for SerializedGraph {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<AnyLayer>>>>("layers", graph::LAYERS, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("inputIds", graph::INPUT_IDS, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, i32>>>("outputIds", graph::OUTPUT_IDS, false)?
            .visit_field::<ForwardsUOffset<AnyTable>>("featureVersions", graph::FEATURE_VERSIONS, false)?
            .finish();
        Ok(())
    }
}

pub struct AnyLayer;

impl Verifiable for AnyLayer {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_union::<u8, _>("layer_type", any_layer::LAYER_TYPE, "layer", any_layer::LAYER, false, |tag, v, pos| {
                match tag {
                    INPUT_LAYER | OUTPUT_LAYER => <ForwardsUOffset<BindableLayer>>::run_verifier(v, pos),
                    _ => <ForwardsUOffset<LayerTable>>::run_verifier(v, pos),
                }
            })?
            .finish();
        Ok(())
    }
}

/// Any member of the `Layer` union: only its base is known.
pub struct LayerTable;

impl Verifiable for LayerTable {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?.visit_field::<ForwardsUOffset<LayerBase>>("base", layer_table::BASE, false)?.finish();
        Ok(())
    }
}

/// `InputLayer` and `OutputLayer`, whose base is a `BindableLayerBase`.
pub struct BindableLayer;

impl Verifiable for BindableLayer {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?.visit_field::<ForwardsUOffset<BindableBase>>("base", layer_table::BASE, false)?.finish();
        Ok(())
    }
}

pub struct BindableBase;

impl Verifiable for BindableBase {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<LayerBase>>("base", bindable::BASE, false)?
            .visit_field::<i32>("layerBindingId", bindable::BINDING_ID, false)?
            .finish();
        Ok(())
    }
}

pub struct LayerBase;

impl Verifiable for LayerBase {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<u32>("index", base::INDEX, false)?
            .visit_field::<ForwardsUOffset<&str>>("layerName", base::NAME, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<InputSlot>>>>("inputSlots", base::INPUT_SLOTS, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, ForwardsUOffset<OutputSlot>>>>("outputSlots", base::OUTPUT_SLOTS, false)?
            .finish();
        Ok(())
    }
}

pub struct InputSlot;

impl Verifiable for InputSlot {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<u32>("index", input_slot::INDEX, false)?
            .visit_field::<InlineStruct<{ input_slot::CONNECTION_SIZE }>>("connection", input_slot::CONNECTION, false)?
            .finish();
        Ok(())
    }
}

pub struct OutputSlot;

impl Verifiable for OutputSlot {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<u32>("index", output_slot::INDEX, false)?
            .visit_field::<ForwardsUOffset<TensorInfo>>("tensorInfo", output_slot::TENSOR_INFO, false)?
            .finish();
        Ok(())
    }
}

pub struct TensorInfo;

impl Verifiable for TensorInfo {
    fn run_verifier(v: &mut Verifier, pos: usize) -> Result<(), InvalidFlatbuffer> {
        v.visit_table(pos)?
            .visit_field::<ForwardsUOffset<Vector<'_, u32>>>("dimensions", tensor_info::DIMENSIONS, false)?
            .visit_field::<i8>("dataType", tensor_info::DATA_TYPE, false)?
            .visit_field::<f32>("quantizationScale", tensor_info::SCALE, false)?
            .visit_field::<i32>("quantizationOffset", tensor_info::OFFSET, false)?
            .visit_field::<ForwardsUOffset<Vector<'_, f32>>>("quantizationScales", tensor_info::SCALES, false)?
            .visit_field::<u32>("quantizationDim", tensor_info::QUANTIZATION_DIM, false)?
            .finish();
        Ok(())
    }
}

pub mod graph {
    use super::voffset;
    pub const LAYERS: u16 = voffset(0);
    pub const INPUT_IDS: u16 = voffset(1);
    pub const OUTPUT_IDS: u16 = voffset(2);
    pub const FEATURE_VERSIONS: u16 = voffset(3);
}

/// The `AnyLayer` wrapper around the layer union.
pub mod any_layer {
    use super::voffset;
    pub const LAYER_TYPE: u16 = voffset(0);
    pub const LAYER: u16 = voffset(1);
}

/// Fields shared by every layer table.
pub mod layer_table {
    use super::voffset;
    pub const BASE: u16 = voffset(0);
    pub const DESCRIPTOR: u16 = voffset(1);
    /// `ConstantLayer` has no descriptor: its tensor takes the second field.
    pub const CONSTANT: u16 = voffset(1);
}

pub mod bindable {
    use super::voffset;
    pub const BASE: u16 = voffset(0);
    pub const BINDING_ID: u16 = voffset(1);
}

pub mod base {
    use super::voffset;
    pub const INDEX: u16 = voffset(0);
    pub const NAME: u16 = voffset(1);
    pub const INPUT_SLOTS: u16 = voffset(3);
    pub const OUTPUT_SLOTS: u16 = voffset(4);
}

pub mod input_slot {
    use super::voffset;
    pub const INDEX: u16 = voffset(0);
    /// `struct Connection { sourceLayerIndex: uint; outputSlotIndex: uint; }`
    pub const CONNECTION: u16 = voffset(1);
    pub const CONNECTION_SIZE: usize = 8;
}

pub mod output_slot {
    use super::voffset;
    pub const INDEX: u16 = voffset(0);
    pub const TENSOR_INFO: u16 = voffset(1);
}

pub mod tensor_info {
    use super::voffset;
    pub const DIMENSIONS: u16 = voffset(0);
    pub const DATA_TYPE: u16 = voffset(1);
    pub const SCALE: u16 = voffset(2);
    pub const OFFSET: u16 = voffset(3);
    pub const SCALES: u16 = voffset(4);
    pub const QUANTIZATION_DIM: u16 = voffset(5);
}

pub mod const_tensor {
    use super::voffset;
    pub const INFO: u16 = voffset(0);
    pub const DATA_TYPE: u16 = voffset(1);
    pub const DATA: u16 = voffset(2);
    /// The single `data` vector of `ByteData`, `ShortData`, `IntData` and `LongData`.
    pub const VALUES: u16 = voffset(0);
}

pub const INPUT_LAYER: u8 = 9;
pub const OUTPUT_LAYER: u8 = 11;
pub const CONSTANT_LAYER: u8 = 5;

/// `Layer` union members, from tag 1, without their `Layer` suffix.
pub const LAYERS: &[&str] = &[
    "Activation",
    "Addition",
    "BatchToSpaceNd",
    "BatchNormalization",
    "Constant",
    "Convolution2d",
    "DepthwiseConvolution2d",
    "FullyConnected",
    "Input",
    "Multiplication",
    "Output",
    "Permute",
    "Pooling2d",
    "Reshape",
    "Softmax",
    "SpaceToBatchNd",
    "Division",
    "Minimum",
    "Equal",
    "Maximum",
    "Normalization",
    "Pad",
    "Rsqrt",
    "Floor",
    "Greater",
    "ResizeBilinear",
    "Subtraction",
    "StridedSlice",
    "Gather",
    "Mean",
    "Merger",
    "L2Normalization",
    "Splitter",
    "DetectionPostProcess",
    "Lstm",
    "QuantizedLstm",
    "Quantize",
    "Dequantize",
    "Merge",
    "Switch",
    "Concat",
    "SpaceToDepth",
    "Prelu",
    "TransposeConvolution2d",
    "Resize",
    "Stack",
];

pub fn layer_name(tag: u8) -> Option<&'static str> {
    LAYERS.get((tag as usize).checked_sub(1)?).copied()
}

/// Constant tensors carried by a layer table next to its descriptor, as (field, port name).
pub fn const_tensor_fields(tag: u8) -> &'static [(usize, &'static str)] {
    match layer_name(tag) {
        Some("Convolution2d" | "DepthwiseConvolution2d" | "FullyConnected" | "TransposeConvolution2d") => {
            &[(2, "weights"), (3, "biases")]
        }
        Some("BatchNormalization") => &[(2, "mean"), (3, "variance"), (4, "beta"), (5, "gamma")],
        Some("DetectionPostProcess") => &[(2, "anchors")],
        _ => &[],
    }
}

/// Element type and whether values are quantized.
pub fn data_type(t: i8) -> Option<(DatumType, bool)> {
    let dt = match t {
        0 => (DatumType::F16, false),
        1 => (DatumType::F32, false),
        2 | 6 => (DatumType::U8, true),
        3 => (DatumType::I32, false),
        4 => (DatumType::Bool, false),
        5 | 7 => (DatumType::I16, true),
        8 | 9 => (DatumType::I8, true),
        10 => (DatumType::I64, false),
        _ => return None,
    };
    Some(dt)
}

/// `ConstTensorData` union members.
pub mod const_data {
    pub const BYTE: u8 = 1;
    pub const SHORT: u8 = 2;
    pub const INT: u8 = 3;
    pub const LONG: u8 = 4;
}
