use crate::tfpb::{DataType, TensorProto, TensorShapeProto};
use byteorder::{ByteOrder, LittleEndian};
use lucid_core::internal::*;
use std::convert::TryFrom;

/// Repeated fields holding a single value are broadcast up to this many elements.
pub const MAX_BROADCAST: u64 = 1_000_000;

impl TryFrom<DataType> for DatumType {
    type Error = DecodeError;
    fn try_from(t: DataType) -> DecodeResult<DatumType> {
        let dt = match t {
            DataType::DtBool => DatumType::Bool,
            DataType::DtUint8 | DataType::DtQuint8 => DatumType::U8,
            DataType::DtUint16 | DataType::DtQuint16 => DatumType::U16,
            DataType::DtUint32 => DatumType::U32,
            DataType::DtUint64 => DatumType::U64,
            DataType::DtInt8 | DataType::DtQint8 => DatumType::I8,
            DataType::DtInt16 | DataType::DtQint16 => DatumType::I16,
            DataType::DtInt32 | DataType::DtQint32 => DatumType::I32,
            DataType::DtInt64 => DatumType::I64,
            DataType::DtHalf => DatumType::F16,
            DataType::DtBfloat16 => DatumType::BF16,
            DataType::DtFloat => DatumType::F32,
            DataType::DtDouble => DatumType::F64,
            DataType::DtComplex64 => DatumType::C64,
            DataType::DtComplex128 => DatumType::C128,
            DataType::DtString => DatumType::String,
            DataType::DtResource => DatumType::Resource,
            DataType::DtVariant => DatumType::Variant,
            DataType::DtInvalid => {
                return Err(DecodeError::malformed(crate::TENSORFLOW, "invalid data type"));
            }
        };
        Ok(dt)
    }
}

/// Reference types (`DT_FLOAT_REF` and friends) are offset by 100.
pub fn datum_type(t: i32) -> Option<DatumType> {
    DataType::from_i32(t % 100).and_then(|t| DatumType::try_from(t).ok())
}

/// None for an unknown rank.
pub fn shape(t: &TensorShapeProto) -> Option<Shape> {
    if t.unknown_rank {
        return None;
    }
    Some(
        t.dim
            .iter()
            .map(|d| if d.size < 0 && !d.name.is_empty() { Dim::sym(&d.name) } else { Dim::from_signed(d.size) })
            .collect(),
    )
}

fn repeated<T: Clone>(values: &[T], volume: Option<u64>) -> Cow<'_, [T]> {
    match (values, volume) {
        ([one], Some(n)) if n > 1 && n <= MAX_BROADCAST => Cow::Owned(vec![one.clone(); n as usize]),
        _ => Cow::Borrowed(values),
    }
}

fn packed<T: Copy>(values: &[T], width: usize, write: fn(&[T], &mut [u8])) -> Vec<u8> {
    let mut bytes = vec![0; width * values.len()];
    write(values, &mut bytes);
    bytes
}

/// Storage of a tensor proto: `tensor_content` if present, else the typed `*_val` field.
fn storage(t: &TensorProto, dt: DatumType, volume: Option<u64>) -> Option<Storage> {
    if !t.tensor_content.is_empty() {
        return Some(Storage::Raw(t.tensor_content.clone()));
    }
    let bytes = match dt {
        DatumType::String => {
            let strings = repeated(&t.string_val, volume);
            return Some(Storage::Strings(strings.iter().map(|s| Blob(s.clone())).collect()));
        }
        DatumType::F32 | DatumType::C64 => {
            packed(&repeated(&t.float_val, volume), 4, LittleEndian::write_f32_into)
        }
        DatumType::F64 | DatumType::C128 => {
            packed(&repeated(&t.double_val, volume), 8, LittleEndian::write_f64_into)
        }
        DatumType::I64 => packed(&repeated(&t.int64_val, volume), 8, LittleEndian::write_i64_into),
        DatumType::U64 => packed(&repeated(&t.uint64_val, volume), 8, LittleEndian::write_u64_into),
        DatumType::U32 => packed(&repeated(&t.uint32_val, volume), 4, LittleEndian::write_u32_into),
        DatumType::I32 => packed(&repeated(&t.int_val, volume), 4, LittleEndian::write_i32_into),
        DatumType::F16 | DatumType::BF16 => {
            let narrowed = t.half_val.iter().map(|x| *x as u16).collect::<Vec<_>>();
            packed(&repeated(&narrowed, volume), 2, LittleEndian::write_u16_into)
        }
        DatumType::I16 | DatumType::U16 => {
            let narrowed = t.int_val.iter().map(|x| *x as u16).collect::<Vec<_>>();
            packed(&repeated(&narrowed, volume), 2, LittleEndian::write_u16_into)
        }
        DatumType::I8 | DatumType::U8 => {
            repeated(&t.int_val, volume).iter().map(|x| *x as u8).collect()
        }
        DatumType::Bool => repeated(&t.bool_val, volume).iter().map(|b| *b as u8).collect(),
        _ => return None,
    };
    Some(Storage::raw(bytes))
}

pub fn raw_value(t: &TensorProto) -> RawValue {
    let datum_type = datum_type(t.dtype);
    let shape = t.tensor_shape.as_ref().and_then(shape);
    let volume = shape.as_ref().and_then(|s| s.volume());
    let storage = datum_type.and_then(|dt| storage(t, dt, volume));
    RawValue { name: None, datum_type, shape, storage, quantization: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_types() {
        assert_eq!(datum_type(DataType::DtFloat as i32), Some(DatumType::F32));
        assert_eq!(datum_type(DataType::DtFloat as i32 + 100), Some(DatumType::F32));
        assert_eq!(datum_type(0), None);
        assert_eq!(datum_type(77), None);
    }

    #[test]
    fn single_value_is_broadcast() {
        let t = TensorProto {
            dtype: DataType::DtFloat as i32,
            tensor_shape: Some(TensorShapeProto::from_dims(&[2, 2])),
            float_val: vec![0.5],
            ..TensorProto::default()
        };
        let v = raw_value(&t);
        assert_eq!(v.shape.as_ref().map(|s| s.to_string()).as_deref(), Some("[2,2]"));
        assert_eq!(v.storage.unwrap().values::<f32>(10), Some(vec![0.5; 4]));
    }

    #[test]
    fn content_wins_over_repeated_fields() {
        let t = TensorProto {
            dtype: DataType::DtInt32 as i32,
            tensor_shape: Some(TensorShapeProto::from_dims(&[1])),
            tensor_content: Bytes::from_static(&[9, 0, 0, 0]),
            int_val: vec![1],
            ..TensorProto::default()
        };
        assert_eq!(raw_value(&t).storage.unwrap().values::<i32>(10), Some(vec![9]));
    }

    #[test]
    fn unknown_rank() {
        let t = TensorShapeProto { unknown_rank: true, ..TensorShapeProto::default() };
        assert_eq!(shape(&t), None);
        assert_eq!(shape(&TensorShapeProto::from_dims(&[-1, 3])).map(|s| s.to_string()).as_deref(), Some("[?,3]"));
    }
}
